//! Primitive wire types for the non-flexible (legacy) protocol this crate implements.
//!
//! # References
//! - <https://kafka.apache.org/protocol#protocol_types>

use std::io::{Read, Write};

use super::traits::{ReadError, ReadType, WriteError, WriteType};

impl<R: Read> ReadType<R> for bool {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let mut buf = [0u8; 1];
        reader.read_exact(&mut buf)?;
        Ok(buf[0] != 0)
    }
}

impl<W: Write> WriteType<W> for bool {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        writer.write_all(&[u8::from(*self)])?;
        Ok(())
    }
}

impl<R: Read> ReadType<R> for i8 {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let mut buf = [0u8; 1];
        reader.read_exact(&mut buf)?;
        Ok(i8::from_be_bytes(buf))
    }
}

impl<W: Write> WriteType<W> for i8 {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        writer.write_all(&self.to_be_bytes())?;
        Ok(())
    }
}

impl<R: Read> ReadType<R> for i16 {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf)?;
        Ok(i16::from_be_bytes(buf))
    }
}

impl<W: Write> WriteType<W> for i16 {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        writer.write_all(&self.to_be_bytes())?;
        Ok(())
    }
}

impl<R: Read> ReadType<R> for i32 {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf)?;
        Ok(i32::from_be_bytes(buf))
    }
}

impl<W: Write> WriteType<W> for i32 {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        writer.write_all(&self.to_be_bytes())?;
        Ok(())
    }
}

impl<R: Read> ReadType<R> for i64 {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf)?;
        Ok(i64::from_be_bytes(buf))
    }
}

impl<W: Write> WriteType<W> for i64 {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        writer.write_all(&self.to_be_bytes())?;
        Ok(())
    }
}

/// Reads `len` octets into a freshly allocated buffer.
fn read_buf<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>, ReadError> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

// STRING: INT16 length followed by UTF-8 bytes. Never null.
impl<R: Read> ReadType<R> for String {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let len = i16::read(reader)?;
        let len = usize::try_from(len).map_err(|e| ReadError::Malformed(Box::new(e)))?;
        let buf = read_buf(reader, len)?;
        String::from_utf8(buf).map_err(|e| ReadError::Malformed(Box::new(e)))
    }
}

impl<W: Write> WriteType<W> for String {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        let len = i16::try_from(self.len()).map_err(WriteError::Overflow)?;
        len.write(writer)?;
        writer.write_all(self.as_bytes())?;
        Ok(())
    }
}

// NULLABLE_STRING: INT16 length (-1 = null) followed by UTF-8 bytes.
impl<R: Read> ReadType<R> for Option<String> {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let len = i16::read(reader)?;
        match len {
            l if l < -1 => Err(ReadError::Malformed(
                format!("invalid negative length for nullable string: {l}").into(),
            )),
            -1 => Ok(None),
            l => {
                let len = usize::try_from(l)?;
                let buf = read_buf(reader, len)?;
                let s = String::from_utf8(buf).map_err(|e| ReadError::Malformed(Box::new(e)))?;
                Ok(Some(s))
            }
        }
    }
}

impl<W: Write> WriteType<W> for Option<String> {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        match self {
            Some(s) => s.write(writer),
            None => (-1i16).write(writer),
        }
    }
}

// BYTES: INT32 length followed by the payload. Never null.
impl<R: Read> ReadType<R> for Vec<u8> {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let len = i32::read(reader)?;
        if len < 0 {
            return Err(ReadError::Malformed(
                format!("invalid length for bytes: {len}").into(),
            ));
        }
        read_buf(reader, usize::try_from(len)?)
    }
}

impl<W: Write> WriteType<W> for Vec<u8> {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        let len = i32::try_from(self.len()).map_err(WriteError::Overflow)?;
        len.write(writer)?;
        writer.write_all(self)?;
        Ok(())
    }
}

// NULLABLE_BYTES: INT32 length (-1 = null) followed by the payload.
impl<R: Read> ReadType<R> for Option<Vec<u8>> {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let len = i32::read(reader)?;
        match len {
            l if l < -1 => Err(ReadError::Malformed(
                format!("invalid negative length for nullable bytes: {l}").into(),
            )),
            -1 => Ok(None),
            l => Ok(Some(read_buf(reader, usize::try_from(l)?)?)),
        }
    }
}

impl<W: Write> WriteType<W> for Option<Vec<u8>> {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        match self {
            Some(buf) => buf.write(writer),
            None => (-1i32).write(writer),
        }
    }
}

// ARRAY<T>: INT32 count followed by the elements. Never null (callers that need a
// nullable array encode `-1` themselves, see `read_array`/`write_array` below).
//
// This is a pair of free functions rather than a blanket `impl<T> ReadType<R> for Vec<T>`
// because `Vec<u8>` above already has its own (BYTES, not ARRAY) wire representation and
// the two would overlap.
pub fn read_array<R, T>(reader: &mut R) -> Result<Vec<T>, ReadError>
where
    R: Read,
    T: ReadType<R>,
{
    let count = i32::read(reader)?;
    if count < 0 {
        return Err(ReadError::Malformed(
            format!("invalid negative array length: {count}").into(),
        ));
    }
    let count = usize::try_from(count)?;
    let mut items = Vec::with_capacity(count.min(1 << 20));
    for _ in 0..count {
        items.push(T::read(reader)?);
    }
    Ok(items)
}

pub fn write_array<W, T>(writer: &mut W, items: &[T]) -> Result<(), WriteError>
where
    W: Write,
    T: WriteType<W>,
{
    let count = i32::try_from(items.len()).map_err(WriteError::Overflow)?;
    count.write(writer)?;
    for item in items {
        item.write(writer)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn bool_roundtrip() {
        for v in [true, false] {
            let mut buf = Vec::new();
            v.write(&mut buf).unwrap();
            let got = bool::read(&mut Cursor::new(buf)).unwrap();
            assert_eq!(got, v);
        }
    }

    #[test]
    fn bool_any_nonzero_is_true() {
        for v in [1u8, 35, 255] {
            assert!(bool::read(&mut Cursor::new(vec![v])).unwrap());
        }
        assert!(!bool::read(&mut Cursor::new(vec![0])).unwrap());
    }

    #[test]
    fn i64_roundtrip() {
        for v in [0i64, 1, -1, i64::MAX, i64::MIN, 72340172838076673] {
            let mut buf = Vec::new();
            v.write(&mut buf).unwrap();
            assert_eq!(buf.len(), 8);
            let got = i64::read(&mut Cursor::new(buf)).unwrap();
            assert_eq!(got, v);
        }
    }

    #[test]
    fn string_roundtrip() {
        let s = "topic-name".to_string();
        let mut buf = Vec::new();
        s.write(&mut buf).unwrap();
        let got = String::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(got, s);
    }

    #[test]
    fn nullable_string_null() {
        let v: Option<String> = None;
        let mut buf = Vec::new();
        v.write(&mut buf).unwrap();
        assert_eq!(buf, [0xff, 0xff]);
        let got = Option::<String>::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(got, None);
    }

    #[test]
    fn nullable_bytes_null() {
        let v: Option<Vec<u8>> = None;
        let mut buf = Vec::new();
        v.write(&mut buf).unwrap();
        assert_eq!(buf, [0xff, 0xff, 0xff, 0xff]);
        let got = Option::<Vec<u8>>::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(got, None);
    }

    #[test]
    fn bytes_roundtrip() {
        let v = vec![1u8, 2, 3, 4, 5];
        let mut buf = Vec::new();
        v.write(&mut buf).unwrap();
        let got = Vec::<u8>::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(got, v);
    }
}
