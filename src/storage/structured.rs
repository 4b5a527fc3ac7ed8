//! Little-endian primitive codec used by the persisted index format.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{QuarryError, Result};

/// Writes fixed-size primitives and length-prefixed strings.
#[derive(Debug)]
pub struct StructWriter<W: Write> {
    writer: W,
    bytes_written: u64,
}

impl<W: Write> StructWriter<W> {
    pub fn new(writer: W) -> Self {
        StructWriter {
            writer,
            bytes_written: 0,
        }
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.writer.write_u8(value)?;
        self.bytes_written += 1;
        Ok(())
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8(value as u8)
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.writer.write_i32::<LittleEndian>(value)?;
        self.bytes_written += 4;
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.writer.write_u32::<LittleEndian>(value)?;
        self.bytes_written += 4;
        Ok(())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.writer.write_i64::<LittleEndian>(value)?;
        self.bytes_written += 8;
        Ok(())
    }

    /// Write a count as an `i32`, the width used by every section header.
    pub fn write_len(&mut self, len: usize) -> Result<()> {
        let len: i32 = len
            .try_into()
            .map_err(|_| QuarryError::format(format!("length {len} exceeds i32::MAX")))?;
        self.write_i32(len)
    }

    /// Write a UTF-8 string prefixed by its byte length.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_len(value.len())?;
        self.writer.write_all(value.as_bytes())?;
        self.bytes_written += value.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Reads what [`StructWriter`] wrote. Any short read surfaces as an
/// `UnexpectedEof` I/O error.
#[derive(Debug)]
pub struct StructReader<R: Read> {
    reader: R,
}

impl<R: Read> StructReader<R> {
    pub fn new(reader: R) -> Self {
        StructReader { reader }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.reader.read_u8()?)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(QuarryError::format(format!("invalid bool byte {other}"))),
        }
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.reader.read_i32::<LittleEndian>()?)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.reader.read_u32::<LittleEndian>()?)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.reader.read_i64::<LittleEndian>()?)
    }

    /// Read a count written by [`StructWriter::write_len`].
    pub fn read_len(&mut self) -> Result<usize> {
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| QuarryError::format(format!("negative length {len}")))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_len()?;
        let mut bytes = Vec::new();
        // `take` keeps a corrupt length from allocating more than the stream holds
        (&mut self.reader).take(len as u64).read_to_end(&mut bytes)?;
        if bytes.len() != len {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        String::from_utf8(bytes).map_err(|e| QuarryError::format(format!("invalid UTF-8: {e}")))
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_roundtrip() {
        let mut writer = StructWriter::new(Vec::new());
        writer.write_i32(-7).unwrap();
        writer.write_i64(i64::MIN).unwrap();
        writer.write_bool(true).unwrap();
        writer.write_string("héllo").unwrap();
        assert_eq!(writer.bytes_written(), 4 + 8 + 1 + 4 + 6);
        let bytes = writer.finish().unwrap();

        let mut reader = StructReader::new(bytes.as_slice());
        assert_eq!(reader.read_i32().unwrap(), -7);
        assert_eq!(reader.read_i64().unwrap(), i64::MIN);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_string().unwrap(), "héllo");
    }

    #[test]
    fn test_truncated_string_is_eof() {
        let mut writer = StructWriter::new(Vec::new());
        writer.write_string("truncate me").unwrap();
        let mut bytes = writer.finish().unwrap();
        bytes.truncate(8);

        let mut reader = StructReader::new(bytes.as_slice());
        let err = reader.read_string().unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn test_negative_length_is_rejected() {
        let mut writer = StructWriter::new(Vec::new());
        writer.write_i32(-1).unwrap();
        let bytes = writer.finish().unwrap();
        let mut reader = StructReader::new(bytes.as_slice());
        assert!(matches!(reader.read_len(), Err(QuarryError::Format(_))));
    }
}
