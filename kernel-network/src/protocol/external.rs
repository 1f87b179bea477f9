/// A Tokio codec that transforms an `AsyncRead` into a `Stream` of
/// `Message`s.
pub mod codec;
/// A single enum representing every supported command name.
pub mod command;
/// Inventory items.
pub mod inv;
/// An enum of all supported message types.
pub mod message;
/// Newtype wrappers for primitive types.
pub mod types;

pub use codec::Codec;
pub use command::Command;
pub use inv::InventoryHash;
pub use message::{GetHeaders, Message, Version};
