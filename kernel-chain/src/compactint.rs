//! The variable-length integer prefix used by the canonical encoding.

use crate::{KernelDeserialize, KernelSerialize, SerializationError};
use byteorder::{LittleEndian, WriteBytesExt};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactInt(u64);

impl CompactInt {
    pub fn new() -> CompactInt {
        CompactInt(0)
    }

    pub fn from(value: usize) -> CompactInt {
        CompactInt(value as u64)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// The number of bytes the encoding of `value` occupies (1, 3, 5 or 9).
    pub fn size(value: usize) -> usize {
        if value < 253 {
            1
        } else if value <= std::u16::MAX as usize {
            3
        } else if value <= std::u32::MAX as usize {
            5
        } else {
            9
        }
    }
}

impl Default for CompactInt {
    fn default() -> Self {
        CompactInt::new()
    }
}

impl KernelSerialize for CompactInt {
    fn kernel_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        if self.value() < 253 {
            target.write_all(&[self.value() as u8])
        } else if self.value() <= std::u16::MAX as u64 {
            target.write_all(&[253])?;
            target.write_u16::<LittleEndian>(self.value() as u16)
        } else if self.value() <= std::u32::MAX as u64 {
            target.write_all(&[254])?;
            target.write_u32::<LittleEndian>(self.value() as u32)
        } else {
            target.write_all(&[255])?;
            target.write_u64::<LittleEndian>(self.value())
        }
    }
}

impl KernelDeserialize for CompactInt {
    fn kernel_deserialize<R: std::io::Read>(
        mut target: R,
    ) -> Result<CompactInt, SerializationError> {
        let first = u8::kernel_deserialize(&mut target)?;
        if first < 253 {
            Ok(CompactInt::from(first as usize))
        } else if first == 253 {
            Ok(CompactInt::from(
                u16::kernel_deserialize(&mut target)? as usize
            ))
        } else if first == 254 {
            Ok(CompactInt::from(
                u32::kernel_deserialize(&mut target)? as usize
            ))
        } else {
            Ok(CompactInt(u64::kernel_deserialize(&mut target)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: u64) -> CompactInt {
        let encoded = CompactInt(value)
            .kernel_serialize_to_vec()
            .expect("serializing to a vec never fails");
        assert_eq!(encoded.len(), CompactInt::size(value as usize));
        CompactInt::kernel_deserialize(&encoded[..]).expect("round trip")
    }

    #[test]
    fn encodings_round_trip_at_width_boundaries() {
        for &value in &[
            0u64,
            1,
            252,
            253,
            0xffff,
            0x1_0000,
            0xffff_ffff,
            0x1_0000_0000,
            u64::max_value(),
        ] {
            assert_eq!(round_trip(value).value(), value);
        }
    }

    proptest::proptest! {
        #[test]
        fn arbitrary_values_round_trip(value in proptest::prelude::any::<u64>()) {
            proptest::prop_assert_eq!(round_trip(value).value(), value);
        }
    }
}
