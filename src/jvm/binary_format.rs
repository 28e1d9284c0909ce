use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{ErrorKind, Read, Result};

/// Utility trait for serializing data inside class files
///
/// Class files have some peculiarities that make a dedicated trait more convenient than a general
/// purpose serialization framework:
///
///   - everything is big-endian
///   - tags are always `u8`
///   - when serializing a sequence, the length of the sequence is usually `u16`
///
pub trait Serialize: Sized {
    /// Serialize construct into a binary output stream
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()>;
}

/// Counterpart of [`Serialize`] for reading class file constructs back out of a byte stream
pub trait Deserialize: Sized {
    /// Read the construct from a binary input stream
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self>;
}

macro_rules! big_endian_impls {
    ($($typ:ty => $write:ident, $read:ident;)*) => {
        $(
            impl Serialize for $typ {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
                    writer.$write::<BigEndian>(*self)
                }
            }

            impl Deserialize for $typ {
                fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
                    reader.$read::<BigEndian>()
                }
            }
        )*
    };
}

big_endian_impls! {
    u16 => write_u16, read_u16;
    u32 => write_u32, read_u32;
    u64 => write_u64, read_u64;
    i16 => write_i16, read_i16;
    i32 => write_i32, read_i32;
    i64 => write_i64, read_i64;
    f32 => write_f32, read_f32;
    f64 => write_f64, read_f64;
}

impl Serialize for u8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(*self)
    }
}

impl Deserialize for u8 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        reader.read_u8()
    }
}

impl Serialize for i8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i8(*self)
    }
}

impl Deserialize for i8 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        reader.read_i8()
    }
}

/// Size in `u16` is the first thing serialized/deserialized
impl<A: Serialize> Serialize for Vec<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        (self.len() as u16).serialize(writer)?;
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
}

impl<A: Deserialize> Deserialize for Vec<A> {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        let len = u16::deserialize(reader)?;
        let mut elems = Vec::with_capacity(len as usize);
        for _ in 0..len {
            elems.push(A::deserialize(reader)?);
        }
        Ok(elems)
    }
}

/// Read exactly `len` raw bytes
///
/// `len` usually comes straight out of the input, so the buffer only grows as bytes arrive.
pub fn read_bytes<R: ReadBytesExt>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut bytes = vec![];
    reader.take(len as u64).read_to_end(&mut bytes)?;
    if bytes.len() != len {
        let msg = format!("Expected {} bytes, found {}", len, bytes.len());
        return Err(std::io::Error::new(ErrorKind::UnexpectedEof, msg));
    }
    Ok(bytes)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn big_endian_layout() {
        let mut out: Vec<u8> = vec![];
        0x1234u16.serialize(&mut out).unwrap();
        (-2i32).serialize(&mut out).unwrap();
        assert_eq!(out, vec![0x12, 0x34, 0xff, 0xff, 0xff, 0xfe]);

        let mut reader = Cursor::new(out);
        assert_eq!(u16::deserialize(&mut reader).unwrap(), 0x1234);
        assert_eq!(i32::deserialize(&mut reader).unwrap(), -2);
        assert!(u8::deserialize(&mut reader).is_err());
    }

    #[test]
    fn length_prefixed_sequences() {
        let mut out: Vec<u8> = vec![];
        vec![7u16, 9u16].serialize(&mut out).unwrap();
        assert_eq!(out, vec![0, 2, 0, 7, 0, 9]);
        let back: Vec<u16> = Deserialize::deserialize(&mut Cursor::new(out)).unwrap();
        assert_eq!(back, vec![7, 9]);
    }

    #[test]
    fn raw_bytes_must_all_be_present() {
        let mut reader = Cursor::new(vec![1, 2, 3, 4]);
        assert_eq!(read_bytes(&mut reader, 3).unwrap(), vec![1, 2, 3]);

        // Length prefix promising far more than the input holds
        let mut reader = Cursor::new(vec![1, 2, 3, 4]);
        let err = read_bytes(&mut reader, u32::MAX as usize).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }
}
