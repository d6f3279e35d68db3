//! Fixed-width record coding.
//!
//! Every stream is a packed sequence of fixed-width records in native byte
//! order; files are not portable across architectures. Records are plain
//! words so coding is a handful of `byteorder` reads and writes.

use std::io::{Read, Write};

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};

use strata_core::{Arc, CarriedRequest, IntercutRequest, Level, LevelInfo, Node, Ptr, Request, Target, Uid};

/// A fixed-width record that can be streamed to and from disk.
pub trait Record: Copy {
    /// Record width in bytes.
    const BYTES: usize;

    fn encode<W: Write>(&self, w: &mut W) -> std::io::Result<()>;
    fn decode<R: Read>(r: &mut R) -> std::io::Result<Self>;
}

fn write_ptr<W: Write>(w: &mut W, p: Ptr) -> std::io::Result<()> {
    w.write_u64::<NativeEndian>(p.raw())
}

fn read_ptr<R: Read>(r: &mut R) -> std::io::Result<Ptr> {
    Ok(Ptr::from_raw(r.read_u64::<NativeEndian>()?))
}

impl Record for Node {
    const BYTES: usize = 24;

    fn encode<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        write_ptr(w, self.uid.as_ptr())?;
        write_ptr(w, self.low)?;
        write_ptr(w, self.high)
    }

    fn decode<R: Read>(r: &mut R) -> std::io::Result<Self> {
        let uid = Uid::from_ptr(read_ptr(r)?);
        let low = read_ptr(r)?;
        let high = read_ptr(r)?;
        Ok(Node { uid, low, high })
    }
}

impl Record for Arc {
    const BYTES: usize = 16;

    fn encode<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        write_ptr(w, self.source)?;
        write_ptr(w, self.target)
    }

    fn decode<R: Read>(r: &mut R) -> std::io::Result<Self> {
        Ok(Arc { source: read_ptr(r)?, target: read_ptr(r)? })
    }
}

impl Record for LevelInfo {
    const BYTES: usize = 8;

    fn encode<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u64::<NativeEndian>(self.to_raw())
    }

    fn decode<R: Read>(r: &mut R) -> std::io::Result<Self> {
        Ok(LevelInfo::from_raw(r.read_u64::<NativeEndian>()?))
    }
}

impl Record for Request {
    const BYTES: usize = 24;

    fn encode<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        write_ptr(w, self.target.0)?;
        write_ptr(w, self.target.1)?;
        write_ptr(w, self.source)
    }

    fn decode<R: Read>(r: &mut R) -> std::io::Result<Self> {
        let a = read_ptr(r)?;
        let b = read_ptr(r)?;
        let source = read_ptr(r)?;
        Ok(Request { target: Target(a, b), source })
    }
}

impl Record for CarriedRequest {
    const BYTES: usize = 40;

    fn encode<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        write_ptr(w, self.target.0)?;
        write_ptr(w, self.target.1)?;
        write_ptr(w, self.carry[0])?;
        write_ptr(w, self.carry[1])?;
        write_ptr(w, self.source)
    }

    fn decode<R: Read>(r: &mut R) -> std::io::Result<Self> {
        let a = read_ptr(r)?;
        let b = read_ptr(r)?;
        let c0 = read_ptr(r)?;
        let c1 = read_ptr(r)?;
        let source = read_ptr(r)?;
        Ok(CarriedRequest { target: Target(a, b), carry: [c0, c1], source })
    }
}

impl Record for IntercutRequest {
    const BYTES: usize = 24;

    fn encode<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        write_ptr(w, self.source)?;
        write_ptr(w, self.target)?;
        w.write_u64::<NativeEndian>(self.level as u64)
    }

    fn decode<R: Read>(r: &mut R) -> std::io::Result<Self> {
        let source = read_ptr(r)?;
        let target = read_ptr(r)?;
        let level = r.read_u64::<NativeEndian>()? as Level;
        Ok(IntercutRequest { source, target, level })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn roundtrip<T: Record + PartialEq + std::fmt::Debug>(value: T) {
        let mut buf = Vec::new();
        value.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), T::BYTES);
        let back = T::decode(&mut Cursor::new(buf)).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn node_roundtrip() {
        roundtrip(Node::new(Uid::new(2, 7), Ptr::terminal(false), Ptr::internal(3, 0, false)));
        roundtrip(Node::terminal(true));
    }

    #[test]
    fn arc_roundtrip() {
        roundtrip(Arc::new(Ptr::internal(0, 0, true), Ptr::terminal(true)));
        roundtrip(Arc::new(Ptr::nil(), Ptr::internal(5, 1, false)));
    }

    #[test]
    fn level_info_roundtrip() {
        roundtrip(LevelInfo::new(17, 42));
    }

    #[test]
    fn request_roundtrip() {
        roundtrip(Request::new(
            Target::new(Ptr::internal(1, 0, false), Ptr::internal(1, 3, false)),
            Ptr::internal(0, 0, true),
        ));
        roundtrip(CarriedRequest::new(
            Target::new(Ptr::internal(1, 0, false), Ptr::internal(1, 3, false)),
            [Ptr::terminal(false), Ptr::internal(2, 0, false)],
            Ptr::nil(),
        ));
        roundtrip(IntercutRequest::new(Ptr::nil(), Ptr::terminal(true), 9));
    }
}
