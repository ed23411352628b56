//! Primitive types.
//!
//! # References
//! - <https://kafka.apache.org/protocol#protocol_types>

use std::io::{Read, Write};

use super::{
    traits::{ReadError, ReadType, WriteError, WriteType},
    vec_builder::VecBuilder,
};

impl<R: Read> ReadType<R> for bool {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let mut buf = [0u8; 1];
        reader.read_exact(&mut buf)?;
        match buf[0] {
            0 => Ok(false),
            _ => Ok(true),
        }
    }
}

impl<W: Write> WriteType<W> for bool {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        match self {
            true => Ok(writer.write_all(&[1])?),
            false => Ok(writer.write_all(&[0])?),
        }
    }
}

macro_rules! impl_int {
    ($t:ty, $n:expr) => {
        impl<R: Read> ReadType<R> for $t {
            fn read(reader: &mut R) -> Result<Self, ReadError> {
                let mut buf = [0u8; $n];
                reader.read_exact(&mut buf)?;
                Ok(<$t>::from_be_bytes(buf))
            }
        }

        impl<W: Write> WriteType<W> for $t {
            fn write(&self, writer: &mut W) -> Result<(), WriteError> {
                writer.write_all(&self.to_be_bytes())?;
                Ok(())
            }
        }
    };
}

impl_int!(i8, 1);
impl_int!(i16, 2);
impl_int!(i32, 4);
impl_int!(i64, 8);

fn read_str<R: Read>(reader: &mut R, len: usize) -> Result<String, ReadError> {
    let mut buf = VecBuilder::new(len);
    buf = buf.read_exact(reader)?;
    String::from_utf8(buf.into()).map_err(|e| ReadError::Malformed(Box::new(e)))
}

// STRING
impl<R: Read> ReadType<R> for String {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let len = i16::read(reader)?;
        let len = usize::try_from(len).map_err(|e| ReadError::Malformed(Box::new(e)))?;
        read_str(reader, len)
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

// NULLABLE_STRING
impl<R: Read> ReadType<R> for Option<String> {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let len = i16::read(reader)?;

        match len {
            l if l < -1 => Err(ReadError::Malformed(
                format!("Invalid negative length for nullable string: {}", l).into(),
            )),
            -1 => Ok(None),
            l => {
                let len = usize::try_from(l)?;
                Ok(Some(read_str(reader, len)?))
            }
        }
    }
}

impl<W: Write> WriteType<W> for Option<String> {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        match &self {
            Some(s) => s.write(writer),
            None => (-1i16).write(writer),
        }
    }
}

// BYTES
impl<R: Read> ReadType<R> for Vec<u8> {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let len = i32::read(reader)?;
        match len {
            l if l < 0 => Err(ReadError::Malformed(
                format!("Invalid length for bytes: {}", l).into(),
            )),
            l => {
                let len = usize::try_from(l)?;
                let mut buf = VecBuilder::new(len);
                buf = buf.read_exact(reader)?;
                Ok(buf.into())
            }
        }
    }
}

impl<W: Write> WriteType<W> for Vec<u8> {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        let l = i32::try_from(self.len()).map_err(WriteError::Overflow)?;
        l.write(writer)?;
        writer.write_all(self)?;
        Ok(())
    }
}

/// Reads an `ARRAY` of a primitive type, treating a null array as empty.
fn read_array<R, T>(reader: &mut R) -> Result<Vec<T>, ReadError>
where
    R: Read,
    T: ReadType<R>,
{
    let len = i32::read(reader)?;
    if len == -1 {
        return Ok(vec![]);
    }

    let len = usize::try_from(len)?;
    let mut res = VecBuilder::new(len);
    for _ in 0..len {
        res.push(T::read(reader)?);
    }

    Ok(res.into())
}

fn write_array<W, T>(writer: &mut W, items: &[T]) -> Result<(), WriteError>
where
    W: Write,
    T: WriteType<W>,
{
    let len = i32::try_from(items.len())?;
    len.write(writer)?;

    for elmt in items {
        elmt.write(writer)?;
    }

    Ok(())
}

// ARRAY<STRING>
impl<R: Read> ReadType<R> for Vec<String> {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        read_array(reader)
    }
}

impl<W: Write> WriteType<W> for Vec<String> {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        write_array(writer, self)
    }
}

// ARRAY<INT32>
impl<R: Read> ReadType<R> for Vec<i32> {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        read_array(reader)
    }
}

impl<W: Write> WriteType<W> for Vec<i32> {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        write_array(writer, self)
    }
}
