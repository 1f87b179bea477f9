//! The 12-byte zero-padded command names that identify message types on the
//! wire.

use std::fmt;

use kernel_chain::{KernelDeserialize, KernelSerialize, SerializationError};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Command {
    Version,
    Verack,
    Ping,
    Pong,
    GetAddr,
    Addr,
    GetHeaders,
    Headers,
    Inv,
    GetData,
    Block,
    Tx,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Version => "version",
            Command::Verack => "verack",
            Command::Ping => "ping",
            Command::Pong => "pong",
            Command::GetAddr => "getaddr",
            Command::Addr => "addr",
            Command::GetHeaders => "getheaders",
            Command::Headers => "headers",
            Command::Inv => "inv",
            Command::GetData => "getdata",
            Command::Block => "block",
            Command::Tx => "tx",
        }
    }

    /// The zero-padded wire form.
    pub fn bytes(&self) -> [u8; 12] {
        let mut bytes = [0u8; 12];
        let name = self.name().as_bytes();
        bytes[..name.len()].copy_from_slice(name);
        bytes
    }

    fn from_bytes(raw: &[u8; 12]) -> Option<Command> {
        let end = raw.iter().position(|&b| b == 0).unwrap_or(12);
        // Trailing padding must be all zeros.
        if raw[end..].iter().any(|&b| b != 0) {
            return None;
        }
        match &raw[..end] {
            b"version" => Some(Command::Version),
            b"verack" => Some(Command::Verack),
            b"ping" => Some(Command::Ping),
            b"pong" => Some(Command::Pong),
            b"getaddr" => Some(Command::GetAddr),
            b"addr" => Some(Command::Addr),
            b"getheaders" => Some(Command::GetHeaders),
            b"headers" => Some(Command::Headers),
            b"inv" => Some(Command::Inv),
            b"getdata" => Some(Command::GetData),
            b"block" => Some(Command::Block),
            b"tx" => Some(Command::Tx),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl KernelSerialize for Command {
    fn kernel_serialize<W: std::io::Write>(&self, mut writer: W) -> Result<(), std::io::Error> {
        writer.write_all(&self.bytes())
    }
}

impl KernelDeserialize for Command {
    fn kernel_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let raw = <[u8; 12]>::kernel_deserialize(&mut reader)?;
        Command::from_bytes(&raw).ok_or(SerializationError::Parse("unknown command name"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_command_round_trips() {
        for command in &[
            Command::Version,
            Command::Verack,
            Command::Ping,
            Command::Pong,
            Command::GetAddr,
            Command::Addr,
            Command::GetHeaders,
            Command::Headers,
            Command::Inv,
            Command::GetData,
            Command::Block,
            Command::Tx,
        ] {
            let bytes = command.kernel_serialize_to_vec().unwrap();
            assert_eq!(bytes.len(), 12);
            assert_eq!(Command::kernel_deserialize(&bytes[..]).unwrap(), *command);
        }
    }

    #[test]
    fn garbage_names_are_rejected() {
        assert!(Command::kernel_deserialize(&[0xffu8; 12][..]).is_err());
        // A valid name with nonzero padding is not a valid command.
        let mut sneaky = Command::Ping.bytes();
        sneaky[11] = 1;
        assert!(Command::kernel_deserialize(&sneaky[..]).is_err());
    }
}
