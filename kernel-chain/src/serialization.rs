//! Consensus-critical serialization.
//!
//! This module contains the `KernelSerialize` and `KernelDeserialize` traits,
//! analogs of the Serde `Serialize` and `Deserialize` traits but intended for
//! the canonical byte encoding that identifiers and proof-of-work are
//! computed over. All multi-byte integers are little-endian; variable-length
//! sequences carry a `CompactInt` prefix.

mod deserialize;
mod error;

pub mod sha256d;

use chrono::{DateTime, Utc};
use std::convert::TryFrom;

pub use deserialize::{KernelDeserialize, KernelDeserializeInto};
pub use error::SerializationError;

use crate::compactint::CompactInt;
use byteorder::{LittleEndian, WriteBytesExt};

pub trait KernelSerialize {
    fn kernel_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error>;

    fn kernel_serialize_to_vec(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut data = Vec::new();
        self.kernel_serialize(&mut data)?;
        Ok(data)
    }
}

impl KernelSerialize for bool {
    fn kernel_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(&[*self as u8])
    }
}

impl KernelSerialize for u8 {
    fn kernel_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(&[*self])
    }
}

impl KernelSerialize for u16 {
    fn kernel_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u16::<LittleEndian>(*self)
    }
}

impl KernelSerialize for u32 {
    fn kernel_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u32::<LittleEndian>(*self)
    }
}

impl KernelSerialize for u64 {
    fn kernel_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u64::<LittleEndian>(*self)
    }
}

impl KernelSerialize for u128 {
    fn kernel_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u128::<LittleEndian>(*self)
    }
}

impl KernelSerialize for i32 {
    fn kernel_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_i32::<LittleEndian>(*self)
    }
}

impl KernelSerialize for i64 {
    fn kernel_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_i64::<LittleEndian>(*self)
    }
}

impl KernelSerialize for DateTime<Utc> {
    fn kernel_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        // u32 times are valid until 2106; block verification rejects
        // anything a truncation here could produce.
        let time_u32 = u32::try_from(self.timestamp()).unwrap_or(std::u32::MAX);
        target.write_u32::<LittleEndian>(time_u32)
    }
}

impl KernelSerialize for [u8; 4] {
    fn kernel_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(self)
    }
}

impl KernelSerialize for [u8; 12] {
    fn kernel_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(self)
    }
}

impl KernelSerialize for [u8; 20] {
    fn kernel_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(self)
    }
}

impl KernelSerialize for [u8; 32] {
    fn kernel_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(self)
    }
}

impl<T> KernelSerialize for Vec<T>
where
    T: KernelSerialize,
{
    fn kernel_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        CompactInt::from(self.len()).kernel_serialize(&mut target)?;
        for item in self.iter() {
            item.kernel_serialize(&mut target)?
        }
        Ok(())
    }
}

impl KernelSerialize for String {
    fn kernel_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        CompactInt::from(self.len()).kernel_serialize(&mut target)?;
        target.write_all(self.as_bytes())?;
        Ok(())
    }
}

impl<T, U> KernelSerialize for (T, U)
where
    T: KernelSerialize,
    U: KernelSerialize,
{
    fn kernel_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        self.0.kernel_serialize(&mut target)?;
        self.1.kernel_serialize(&mut target)?;
        Ok(())
    }
}

impl<T: KernelSerialize> KernelSerialize for std::sync::Arc<T> {
    fn kernel_serialize<W: std::io::Write>(&self, writer: W) -> Result<(), std::io::Error> {
        T::kernel_serialize(self, writer)
    }
}
