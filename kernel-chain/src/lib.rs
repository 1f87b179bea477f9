//! Consensus-critical data structures for the Kernel chain.
//!
//! This crate contains the block and transaction data model, the canonical
//! wire serialization, hashing, script and address types, and the
//! difficulty/work arithmetic. Validation rules live in `kernel-consensus`;
//! persistence lives in `kernel-state`.

#![allow(clippy::unit_arg)]

pub mod amount;
pub mod block;
pub mod cached;
pub mod compactint;
pub mod parameters;
pub mod serialization;
pub mod transaction;
pub mod transparent;
pub mod work;

pub use serialization::{
    KernelDeserialize, KernelDeserializeInto, KernelSerialize, SerializationError,
};
