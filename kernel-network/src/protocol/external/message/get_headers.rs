use kernel_chain::{block, KernelDeserialize, KernelSerialize, SerializationError};

/// A `getheaders` message.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct GetHeaders {
    /// The sender's best known block hash; the responder returns headers
    /// strictly after it on its main chain.
    pub start_block: block::Hash,
    /// The stop hash. `None` (all-zero on the wire) asks for as many
    /// headers as the responder will send.
    pub stop_hash: Option<block::Hash>,
}

impl GetHeaders {
    pub fn from_tip(start_block: block::Hash) -> GetHeaders {
        GetHeaders {
            start_block,
            stop_hash: None,
        }
    }
}

impl KernelDeserialize for GetHeaders {
    fn kernel_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let start_block = block::Hash::kernel_deserialize(&mut reader)?;
        let raw_stop_hash = block::Hash::kernel_deserialize(&mut reader)?;
        let stop_hash = if raw_stop_hash.is_zero() {
            None
        } else {
            Some(raw_stop_hash)
        };
        Ok(GetHeaders {
            start_block,
            stop_hash,
        })
    }
}

impl KernelSerialize for GetHeaders {
    fn kernel_serialize<W: std::io::Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        self.start_block.kernel_serialize(&mut target)?;
        match self.stop_hash {
            Some(hash) => hash.kernel_serialize(&mut target),
            None => [0u8; 32].kernel_serialize(&mut target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_stop_hash_means_none() {
        let msg = GetHeaders::from_tip(block::Hash([7; 32]));
        let bytes = msg.kernel_serialize_to_vec().unwrap();
        assert_eq!(bytes.len(), 64);
        let parsed = GetHeaders::kernel_deserialize(&bytes[..]).unwrap();
        assert_eq!(parsed, msg);
        assert_eq!(parsed.stop_hash, None);

        let with_stop = GetHeaders {
            start_block: block::Hash([7; 32]),
            stop_hash: Some(block::Hash([9; 32])),
        };
        let bytes = with_stop.kernel_serialize_to_vec().unwrap();
        assert_eq!(
            GetHeaders::kernel_deserialize(&bytes[..]).unwrap(),
            with_stop
        );
    }
}
