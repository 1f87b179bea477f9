//! SHA256d, a.k.a. double SHA-256: the hash function behind every identifier
//! and proof-of-work check on this chain.

use sha2::{Digest, Sha256};
use std::io;

/// An `io::Write` instance that produces a SHA256d digest of the bytes
/// written to it.
#[derive(Default)]
pub struct Writer {
    hash: Sha256,
}

impl Writer {
    /// Consume the Writer and produce the hash result.
    pub fn finish(self) -> [u8; 32] {
        let first = self.hash.finalize();
        let second = Sha256::digest(&first);
        let mut output = [0u8; 32];
        output.copy_from_slice(&second);
        output
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hash.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Compute the SHA256d digest of a byte slice.
pub fn digest(data: &[u8]) -> [u8; 32] {
    let mut writer = Writer::default();
    io::Write::write_all(&mut writer, data).expect("writing to a hasher is infallible");
    writer.finish()
}

/// A 4-byte checksum using truncated double-SHA256 (two rounds of SHA-256),
/// as used in message framing and base58check.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Checksum(pub [u8; 4]);

impl<'a> From<&'a [u8]> for Checksum {
    fn from(bytes: &'a [u8]) -> Self {
        let hash = digest(bytes);
        let mut checksum = [0u8; 4];
        checksum.copy_from_slice(&hash[0..4]);
        Self(checksum)
    }
}
