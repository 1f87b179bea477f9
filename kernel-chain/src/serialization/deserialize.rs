use super::SerializationError;
use crate::compactint::CompactInt;
use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{DateTime, TimeZone, Utc};
use std::io::{self, Read};

type Result<R> = std::result::Result<R, SerializationError>;

pub trait KernelDeserialize {
    fn kernel_deserialize<R: io::Read>(reader: R) -> Result<Self>
    where
        Self: Sized;
}

/// Helper for deserializing more succinctly via type inference
pub trait KernelDeserializeInto {
    /// Deserialize based on type inference
    fn kernel_deserialize_into<T>(self) -> Result<T>
    where
        T: KernelDeserialize;
}

impl<R: io::Read> KernelDeserializeInto for R {
    fn kernel_deserialize_into<T>(self) -> Result<T>
    where
        T: KernelDeserialize,
    {
        T::kernel_deserialize(self)
    }
}

impl KernelDeserialize for bool {
    fn kernel_deserialize<R: io::Read>(mut reader: R) -> Result<bool> {
        let value = reader.read_u8()?;
        match value {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(SerializationError::Parse("Invalid bool")),
        }
    }
}

impl KernelDeserialize for u8 {
    fn kernel_deserialize<R: io::Read>(mut reader: R) -> Result<u8> {
        Ok(reader.read_u8()?)
    }
}

impl KernelDeserialize for u16 {
    fn kernel_deserialize<R: io::Read>(mut reader: R) -> Result<u16> {
        Ok(reader.read_u16::<LittleEndian>()?)
    }
}

impl KernelDeserialize for u32 {
    fn kernel_deserialize<R: io::Read>(mut reader: R) -> Result<u32> {
        Ok(reader.read_u32::<LittleEndian>()?)
    }
}

impl KernelDeserialize for u64 {
    fn kernel_deserialize<R: io::Read>(mut reader: R) -> Result<u64> {
        Ok(reader.read_u64::<LittleEndian>()?)
    }
}

impl KernelDeserialize for u128 {
    fn kernel_deserialize<R: io::Read>(mut reader: R) -> Result<u128> {
        Ok(reader.read_u128::<LittleEndian>()?)
    }
}

impl KernelDeserialize for i32 {
    fn kernel_deserialize<R: io::Read>(mut reader: R) -> Result<i32> {
        Ok(reader.read_i32::<LittleEndian>()?)
    }
}

impl KernelDeserialize for i64 {
    fn kernel_deserialize<R: io::Read>(mut reader: R) -> Result<i64> {
        Ok(reader.read_i64::<LittleEndian>()?)
    }
}

impl KernelDeserialize for DateTime<Utc> {
    fn kernel_deserialize<R: io::Read>(mut reader: R) -> Result<DateTime<Utc>> {
        Ok(Utc.timestamp(reader.read_u32::<LittleEndian>()? as i64, 0))
    }
}

impl<T> KernelDeserialize for Vec<T>
where
    T: KernelDeserialize,
{
    fn kernel_deserialize<R: io::Read>(mut reader: R) -> Result<Vec<T>> {
        let len = CompactInt::kernel_deserialize(&mut reader)?.value() as usize;
        // Limit preallocation to about 1000 items since blind preallocation
        // is a DOS vulnerability
        let blind_alloc_limit = 1024;
        let mut result: Vec<T> = Vec::with_capacity(std::cmp::min(len, blind_alloc_limit));
        for _ in 0..len {
            result.push(T::kernel_deserialize(&mut reader)?);
        }
        Ok(result)
    }
}

impl KernelDeserialize for String {
    fn kernel_deserialize<R: io::Read>(mut reader: R) -> Result<String> {
        let len = CompactInt::kernel_deserialize(&mut reader)?.value();
        let mut buf = Vec::new();
        reader.take(len).read_to_end(&mut buf)?;
        if buf.len() as u64 != len {
            return Err(SerializationError::Parse("string shorter than its prefix"));
        }
        String::from_utf8(buf).map_err(|_| SerializationError::Parse("invalid utf-8"))
    }
}

impl<T, U> KernelDeserialize for (T, U)
where
    T: KernelDeserialize,
    U: KernelDeserialize,
{
    fn kernel_deserialize<R: io::Read>(mut reader: R) -> Result<(T, U)> {
        Ok((
            T::kernel_deserialize(&mut reader)?,
            U::kernel_deserialize(&mut reader)?,
        ))
    }
}

impl<T> KernelDeserialize for std::sync::Arc<T>
where
    T: KernelDeserialize,
{
    fn kernel_deserialize<R: io::Read>(reader: R) -> Result<Self> {
        Ok(std::sync::Arc::new(T::kernel_deserialize(reader)?))
    }
}

macro_rules! impl_deserializable_byte_array {
    ($size:expr) => {
        impl KernelDeserialize for [u8; $size] {
            fn kernel_deserialize<R: io::Read>(mut reader: R) -> Result<[u8; $size]> {
                let mut result = [0u8; $size];
                reader.read_exact(&mut result)?;
                Ok(result)
            }
        }
    };
}

impl_deserializable_byte_array!(4);
impl_deserializable_byte_array!(12);
impl_deserializable_byte_array!(16);
impl_deserializable_byte_array!(20);
impl_deserializable_byte_array!(32);
