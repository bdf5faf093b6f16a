//! The legacy message / message-set format this crate's core speaks (§3, §4.2 of
//! SPEC_FULL.md): `{crc32, magic, attributes, key, value}` per message, packed inline as
//! `{offset, message-size, message}` entries with no flexible/compact framing.
//!
//! Decoding tolerates a truncated trailing entry (the broker may cut a message set short
//! to respect a fetch size limit) by stopping the loop rather than erroring the whole
//! response, the same convention the teacher crate uses for its own record-batch decoder
//! (`protocol::primitives::Records::read` breaking out on `UnexpectedEof`).

use std::io::{Cursor, Read, Write};

use crc32fast::Hasher;

use super::traits::{ReadError, ReadType, WriteError, WriteType};

/// Current message format version. Only `0` (no timestamp field) is implemented; this
/// crate's core never needs message timestamps.
pub const MAGIC_BYTE: i8 = 0;

/// A single log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub magic: i8,
    pub attributes: i8,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
}

impl Message {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            magic: MAGIC_BYTE,
            attributes: 0,
            key: None,
            value: Some(value.into()),
        }
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    fn body(&self) -> Result<Vec<u8>, WriteError> {
        let mut buf = Vec::new();
        self.magic.write(&mut buf)?;
        self.attributes.write(&mut buf)?;
        self.key.write(&mut buf)?;
        self.value.write(&mut buf)?;
        Ok(buf)
    }

    fn crc(&self) -> Result<u32, WriteError> {
        let body = self.body()?;
        let mut hasher = Hasher::new();
        hasher.update(&body);
        Ok(hasher.finalize())
    }
}

impl<W: Write> WriteType<W> for Message {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        let body = self.body()?;
        let crc = {
            let mut hasher = Hasher::new();
            hasher.update(&body);
            hasher.finalize()
        };
        (crc as i32).write(writer)?;
        writer.write_all(&body)?;
        Ok(())
    }
}

/// A decoded message together with whether its CRC matched. A CRC mismatch does not
/// abort the whole message set (§4.2's robustness rule); it only marks this one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub offset: i64,
    pub message: Message,
    pub valid: bool,
}

/// A packed, length-prefixed sequence of `{offset, message-size, message}` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageSet(pub Vec<DecodedMessage>);

impl MessageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a message set from `(offset, message)` pairs the caller knows to be valid
    /// (e.g. ones it is about to encode and send), skipping CRC verification.
    pub fn from_messages(entries: Vec<(i64, Message)>) -> Self {
        Self(
            entries
                .into_iter()
                .map(|(offset, message)| DecodedMessage {
                    offset,
                    message,
                    valid: true,
                })
                .collect(),
        )
    }
}

impl<R: Read> ReadType<R> for MessageSet {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        // The message set is framed as an opaque NULLABLE_BYTES field at the call site
        // (inside a FetchResponsePartition / ProduceResponsePartition); by the time we get
        // here `reader` is positioned at the start of the packed entries and its length is
        // implicitly "however many bytes remain in the enclosing buffer", which callers
        // supply by handing us a `Cursor` sized to exactly that many bytes.
        let mut entries = Vec::new();

        loop {
            match read_one_entry(reader) {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => break,
                Err(ReadError::IO(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    // Trailing partial entry: the broker truncated the set to respect a
                    // fetch size limit. Drop it silently and return what decoded cleanly.
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Self(entries))
    }
}

/// Reads one `{offset, message-size, message}` entry. A truncated tail trips
/// `UnexpectedEof` either on the leading `offset`/`message-size` fields or inside
/// `read_exact` for the body; `MessageSet::read` catches either case and stops the loop.
fn read_one_entry<R: Read>(reader: &mut R) -> Result<Option<DecodedMessage>, ReadError> {
    let offset = i64::read(reader)?;
    let message_size = i32::read(reader)?;
    if message_size < 0 {
        return Err(ReadError::Malformed(
            format!("negative message size: {message_size}").into(),
        ));
    }
    let message_size = usize::try_from(message_size)?;

    let mut body = vec![0u8; message_size];
    reader.read_exact(&mut body)?;

    let mut cursor = Cursor::new(&body);
    let crc = i32::read(&mut cursor)? as u32;
    let magic = i8::read(&mut cursor)?;
    let attributes = i8::read(&mut cursor)?;
    let key = Option::<Vec<u8>>::read(&mut cursor)?;
    let value = Option::<Vec<u8>>::read(&mut cursor)?;

    let message = Message {
        magic,
        attributes,
        key,
        value,
    };
    let valid = message.crc().map(|computed| computed == crc).unwrap_or(false);

    Ok(Some(DecodedMessage {
        offset,
        message,
        valid,
    }))
}

impl<W: Write> WriteType<W> for MessageSet {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        for entry in &self.0 {
            entry.offset.write(writer)?;

            let mut body = Vec::new();
            entry.message.write(&mut body)?;

            let size = i32::try_from(body.len()).map_err(WriteError::Overflow)?;
            size.write(writer)?;
            writer.write_all(&body)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn message_roundtrip() {
        let set = MessageSet::from_messages(vec![(
            0,
            Message::new(b"hello".to_vec()).with_key(b"k".to_vec()),
        )]);

        let mut buf = Vec::new();
        set.write(&mut buf).unwrap();

        let got = MessageSet::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(got.0.len(), 1);
        assert!(got.0[0].valid);
        assert_eq!(got.0[0].message.value, Some(b"hello".to_vec()));
        assert_eq!(got.0[0].message.key, Some(b"k".to_vec()));
    }

    #[test]
    fn crc_mismatch_marks_only_that_record() {
        let set = MessageSet::from_messages(vec![
            (0, Message::new(b"one".to_vec())),
            (1, Message::new(b"two".to_vec())),
        ]);

        let mut buf = Vec::new();
        set.write(&mut buf).unwrap();

        // Flip a byte inside the first message's body (well past the 12-byte
        // offset+size header, inside the CRC'd region) to corrupt only record 0.
        let corrupt_at = 12 + 4 + 1 + 1 + 4; // skip header, crc, magic, attrs, key-len
        buf[corrupt_at] ^= 0xff;

        let got = MessageSet::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(got.0.len(), 2);
        assert!(!got.0[0].valid);
        assert!(got.0[1].valid);
    }

    #[test]
    fn truncated_trailing_entry_is_dropped() {
        let set = MessageSet::from_messages(vec![
            (0, Message::new(b"one".to_vec())),
            (1, Message::new(b"two".to_vec())),
        ]);

        let mut buf = Vec::new();
        set.write(&mut buf).unwrap();

        // Cut the buffer off partway through the second entry's message body.
        buf.truncate(buf.len() - 3);

        let got = MessageSet::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(got.0.len(), 1);
        assert_eq!(got.0[0].message.value, Some(b"one".to_vec()));
    }
}
