//! Big-endian binary primitives shared by the durable file formats and the
//! wire protocol. Strings are a u32 length followed by UTF-8 bytes.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

pub fn write_u32<W: Write>(w: &mut W, value: u32) -> Result<()> {
    w.write_u32::<BigEndian>(value)?;
    Ok(())
}

pub fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    r.read_u32::<BigEndian>()
        .map_err(|e| Error::Decode("u32", e))
}

pub fn write_i32<W: Write>(w: &mut W, value: i32) -> Result<()> {
    w.write_i32::<BigEndian>(value)?;
    Ok(())
}

pub fn read_i32<R: Read>(r: &mut R) -> Result<i32> {
    r.read_i32::<BigEndian>()
        .map_err(|e| Error::Decode("i32", e))
}

pub fn write_u8<W: Write>(w: &mut W, value: u8) -> Result<()> {
    w.write_u8(value)?;
    Ok(())
}

pub fn read_u8<R: Read>(r: &mut R) -> Result<u8> {
    r.read_u8().map_err(|e| Error::Decode("u8", e))
}

pub fn write_f64<W: Write>(w: &mut W, value: f64) -> Result<()> {
    w.write_f64::<BigEndian>(value)?;
    Ok(())
}

pub fn read_f64<R: Read>(r: &mut R) -> Result<f64> {
    r.read_f64::<BigEndian>()
        .map_err(|e| Error::Decode("f64", e))
}

pub fn write_bool<W: Write>(w: &mut W, value: bool) -> Result<()> {
    w.write_u8(value as u8)?;
    Ok(())
}

pub fn read_bool<R: Read>(r: &mut R) -> Result<bool> {
    let byte = r.read_u8().map_err(|e| Error::Decode("bool", e))?;
    Ok(byte != 0)
}

pub fn write_str<W: Write>(w: &mut W, value: &str) -> Result<()> {
    w.write_u32::<BigEndian>(value.len() as u32)?;
    w.write_all(value.as_bytes())?;
    Ok(())
}

pub fn read_str<R: Read>(r: &mut R) -> Result<String> {
    let len = r
        .read_u32::<BigEndian>()
        .map_err(|e| Error::Decode("string length", e))? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)
        .map_err(|e| Error::Decode("string bytes", e))?;
    String::from_utf8(buf).map_err(|e| {
        Error::Decode(
            "string utf8",
            io::Error::new(io::ErrorKind::InvalidData, e),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_str_round_trip() {
        let mut buf = Vec::new();
        write_str(&mut buf, "maçã").unwrap();
        write_str(&mut buf, "").unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_str(&mut cursor).unwrap(), "maçã");
        assert_eq!(read_str(&mut cursor).unwrap(), "");
    }

    #[test]
    fn test_scalar_round_trip() {
        let mut buf = Vec::new();
        write_u32(&mut buf, 42).unwrap();
        write_i32(&mut buf, -7).unwrap();
        write_f64(&mut buf, 19.99).unwrap();
        write_bool(&mut buf, true).unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_u32(&mut cursor).unwrap(), 42);
        assert_eq!(read_i32(&mut cursor).unwrap(), -7);
        assert_eq!(read_f64(&mut cursor).unwrap(), 19.99);
        assert!(read_bool(&mut cursor).unwrap());
    }

    #[test]
    fn test_truncated_string_is_decode_error() {
        let mut buf = Vec::new();
        write_u32(&mut buf, 100).unwrap(); // length claims 100 bytes, none follow

        let mut cursor = Cursor::new(buf);
        match read_str(&mut cursor) {
            Err(Error::Decode(field, _)) => assert_eq!(field, "string bytes"),
            other => panic!("expected decode error, got {:?}", other),
        }
    }
}
