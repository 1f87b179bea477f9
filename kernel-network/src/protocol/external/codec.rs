//! A Tokio codec mapping byte streams to message streams.

use std::fmt;
use std::io::{Cursor, Write};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use kernel_chain::{
    block::{Block, Header},
    serialization::sha256d,
    transaction::Transaction,
    KernelDeserialize, KernelSerialize, SerializationError as Error,
};

use crate::constants;
use crate::meta_addr::MetaAddr;

use super::{
    command::Command,
    inv::InventoryHash,
    message::{GetHeaders, Message, Version},
    types::{Magic, Nonce},
};

/// The length of a message header: magic, command, length, checksum.
const HEADER_LEN: usize = 24usize;

/// A codec which produces messages from byte streams and vice versa.
pub struct Codec {
    builder: Builder,
    state: DecodeState,
}

/// A builder for specifying [`Codec`] options.
pub struct Builder {
    /// The network magic to use in encoding.
    magic: Magic,
    /// The maximum allowable message length.
    max_len: usize,
}

impl Codec {
    /// Return a builder for constructing a [`Codec`].
    pub fn builder() -> Builder {
        Builder {
            magic: constants::MAGIC,
            max_len: constants::MAX_PROTOCOL_MESSAGE_LEN,
        }
    }
}

impl Default for Codec {
    fn default() -> Self {
        Codec::builder().finish()
    }
}

impl Builder {
    /// Finalize the builder and return a [`Codec`].
    pub fn finish(self) -> Codec {
        Codec {
            builder: self,
            state: DecodeState::Head,
        }
    }

    /// Configure the codec for the given network magic.
    pub fn for_magic(mut self, magic: Magic) -> Self {
        self.magic = magic;
        self
    }

    /// Configure the codec's maximum accepted payload size, in bytes.
    #[allow(dead_code)]
    pub fn with_max_body_len(mut self, len: usize) -> Self {
        self.max_len = len;
        self
    }
}

// ======== Encoding =========

impl Encoder<Message> for Codec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        use Error::Parse;

        let mut body = Vec::new();
        self.write_body(&item, &mut body)?;

        if body.len() > self.builder.max_len {
            return Err(Parse("body length exceeded maximum size"));
        }

        let command = item.command();

        let mut header = [0u8; HEADER_LEN];
        let mut header_writer = Cursor::new(&mut header[..]);
        header_writer.write_all(&self.builder.magic.0[..])?;
        header_writer.write_all(&command.bytes())?;
        header_writer.write_u32::<LittleEndian>(body.len() as u32)?;
        header_writer.write_all(&sha256d::Checksum::from(&body[..]).0)?;

        dst.reserve(HEADER_LEN + body.len());
        dst.extend_from_slice(&header);
        dst.extend_from_slice(&body);

        Ok(())
    }
}

impl Codec {
    /// Write the body of the message into the given writer. This allows
    /// writing the message body prior to writing the header, so that the
    /// header can contain a checksum of the message body.
    fn write_body<W: Write>(&self, msg: &Message, mut writer: W) -> Result<(), Error> {
        match msg {
            Message::Version(version) => version.kernel_serialize(&mut writer)?,
            Message::Verack => { /* Empty payload -- no-op */ }
            Message::Ping(nonce) => nonce.kernel_serialize(&mut writer)?,
            Message::Pong(nonce) => nonce.kernel_serialize(&mut writer)?,
            Message::GetAddr => { /* Empty payload -- no-op */ }
            Message::Addr(addrs) => addrs.kernel_serialize(&mut writer)?,
            Message::GetHeaders(get_headers) => get_headers.kernel_serialize(&mut writer)?,
            Message::Headers(headers) => headers.kernel_serialize(&mut writer)?,
            Message::Inv(hashes) => hashes.kernel_serialize(&mut writer)?,
            Message::GetData(hashes) => hashes.kernel_serialize(&mut writer)?,
            Message::Block(block) => block.kernel_serialize(&mut writer)?,
            Message::Tx(transaction) => transaction.kernel_serialize(&mut writer)?,
        }
        Ok(())
    }
}

// ======== Decoding =========

enum DecodeState {
    Head,
    Body {
        body_len: usize,
        command: Command,
        checksum: sha256d::Checksum,
    },
}

impl fmt::Debug for DecodeState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeState::Head => write!(f, "DecodeState::Head"),
            DecodeState::Body {
                body_len,
                command,
                checksum,
            } => f
                .debug_struct("DecodeState::Body")
                .field("body_len", &body_len)
                .field("command", &command)
                .field("checksum", &checksum)
                .finish(),
        }
    }
}

impl Decoder for Codec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        use Error::Parse;
        match self.state {
            DecodeState::Head => {
                // First check that the src buffer contains an entire header.
                if src.len() < HEADER_LEN {
                    // Signal that decoding requires more data.
                    return Ok(None);
                }

                // Now that we know that src contains a header, split off the
                // header section.
                let header = src.split_to(HEADER_LEN);

                // Create a cursor over the header and parse its fields.
                let mut header_reader = Cursor::new(&header[..]);
                let magic = Magic(<[u8; 4]>::kernel_deserialize(&mut header_reader)?);
                let command = Command::kernel_deserialize(&mut header_reader)?;
                let body_len = header_reader.read_u32::<LittleEndian>()? as usize;
                let checksum =
                    sha256d::Checksum(<[u8; 4]>::kernel_deserialize(&mut header_reader)?);

                if magic != self.builder.magic {
                    return Err(Parse("supplied magic did not meet expectations"));
                }
                if body_len > self.builder.max_len {
                    return Err(Parse("body length exceeded maximum size"));
                }

                // Reserve buffer space for the expected body and the
                // following header.
                src.reserve(body_len + HEADER_LEN);

                self.state = DecodeState::Body {
                    body_len,
                    command,
                    checksum,
                };

                // Now that the state is updated, recurse to attempt body
                // decoding.
                self.decode(src)
            }
            DecodeState::Body {
                body_len,
                command,
                checksum,
            } => {
                if src.len() < body_len {
                    // Need to wait for the full body
                    return Ok(None);
                }

                // Now that we know we have the full body, split off the
                // body, and reset the decoder state for the next message.
                // Otherwise we will attempt to read the next header as the
                // current body.
                let body = src.split_to(body_len);
                self.state = DecodeState::Head;

                if checksum != sha256d::Checksum::from(&body[..]) {
                    return Err(Parse(
                        "supplied message checksum does not match computed checksum",
                    ));
                }

                let mut body_reader = Cursor::new(&body[..]);
                let msg = match command {
                    Command::Version => {
                        Message::Version(Version::kernel_deserialize(&mut body_reader)?)
                    }
                    Command::Verack => Message::Verack,
                    Command::Ping => Message::Ping(Nonce::kernel_deserialize(&mut body_reader)?),
                    Command::Pong => Message::Pong(Nonce::kernel_deserialize(&mut body_reader)?),
                    Command::GetAddr => Message::GetAddr,
                    Command::Addr => {
                        Message::Addr(Vec::<MetaAddr>::kernel_deserialize(&mut body_reader)?)
                    }
                    Command::GetHeaders => {
                        Message::GetHeaders(GetHeaders::kernel_deserialize(&mut body_reader)?)
                    }
                    Command::Headers => {
                        Message::Headers(Vec::<Header>::kernel_deserialize(&mut body_reader)?)
                    }
                    Command::Inv => Message::Inv(Vec::<InventoryHash>::kernel_deserialize(
                        &mut body_reader,
                    )?),
                    Command::GetData => Message::GetData(Vec::<InventoryHash>::kernel_deserialize(
                        &mut body_reader,
                    )?),
                    Command::Block => {
                        Message::Block(<Arc<Block>>::kernel_deserialize(&mut body_reader)?)
                    }
                    Command::Tx => {
                        Message::Tx(<Arc<Transaction>>::kernel_deserialize(&mut body_reader)?)
                    }
                };
                Ok(Some(msg))
            }
        }
    }
}
