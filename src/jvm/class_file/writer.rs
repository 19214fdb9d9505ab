use crate::jvm::class_file::{ConstantIndex, ConstantPool};
use crate::jvm::Error;
use byteorder::{BigEndian, ByteOrder};

/// Growable big-endian byte buffer used for every part of a class file
///
/// A writer optionally carries the constant pool that indices are written against. Writing an
/// index may insert brand new entries into that pool (for instance when a handle comes from the
/// source pool of a transformation), so a class is usually produced with two writers: the
/// "tail" writer gets the fields, methods, and attributes (and is the one that grows the pool),
/// then the "head" writer gets the version and the now complete pool.
pub struct BufWriter<'p> {
    bytes: Vec<u8>,
    len: usize,
    pool: Option<&'p mut ConstantPool>,
    source_pool: Option<&'p ConstantPool>,
}

const INITIAL_CAPACITY: usize = 64;

impl<'p> BufWriter<'p> {
    /// Writer without any constant pool context
    pub fn new() -> BufWriter<'p> {
        BufWriter {
            bytes: vec![0; INITIAL_CAPACITY],
            len: 0,
            pool: None,
            source_pool: None,
        }
    }

    /// Writer whose indices are written against the specified pool
    pub fn with_pool(pool: &'p mut ConstantPool) -> BufWriter<'p> {
        BufWriter {
            pool: Some(pool),
            ..BufWriter::new()
        }
    }

    /// Pool from which handles not belonging to the writer's pool get cloned
    pub fn with_source_pool(mut self, source_pool: &'p ConstantPool) -> BufWriter<'p> {
        self.source_pool = Some(source_pool);
        self
    }

    pub fn constant_pool(&mut self) -> Result<&mut ConstantPool, Error> {
        self.pool.as_deref_mut().ok_or(Error::NoConstantPool)
    }

    /// Number of bytes written so far
    pub fn size(&self) -> usize {
        self.len
    }

    /// Make sure there is room for `additional` more bytes
    ///
    /// The backing storage doubles until it is large enough and never shrinks.
    pub fn reserve_space(&mut self, additional: usize) {
        let needed = self.len + additional;
        if needed > self.bytes.len() {
            let mut capacity = self.bytes.len().max(INITIAL_CAPACITY);
            while capacity < needed {
                capacity *= 2;
            }
            self.bytes.resize(capacity, 0);
        }
    }

    /// Reserve `n` zeroed bytes to be patched later, returning their offset
    pub fn skip(&mut self, n: usize) -> usize {
        self.reserve_space(n);
        let offset = self.len;
        self.bytes[offset..offset + n].fill(0);
        self.len += n;
        offset
    }

    fn claim(&mut self, n: usize) -> &mut [u8] {
        self.reserve_space(n);
        let offset = self.len;
        self.len += n;
        &mut self.bytes[offset..offset + n]
    }

    pub fn write_u1(&mut self, value: u8) {
        self.claim(1)[0] = value;
    }

    pub fn write_u2(&mut self, value: u16) {
        BigEndian::write_u16(self.claim(2), value);
    }

    pub fn write_u4(&mut self, value: u32) {
        BigEndian::write_u32(self.claim(4), value);
    }

    pub fn write_u8(&mut self, value: u64) {
        BigEndian::write_u64(self.claim(8), value);
    }

    pub fn write_i1(&mut self, value: i8) {
        self.write_u1(value as u8);
    }

    pub fn write_i2(&mut self, value: i16) {
        BigEndian::write_i16(self.claim(2), value);
    }

    pub fn write_i4(&mut self, value: i32) {
        BigEndian::write_i32(self.claim(4), value);
    }

    pub fn write_i8(&mut self, value: i64) {
        BigEndian::write_i64(self.claim(8), value);
    }

    pub fn write_f4(&mut self, value: f32) {
        BigEndian::write_f32(self.claim(4), value);
    }

    pub fn write_f8(&mut self, value: f64) {
        BigEndian::write_f64(self.claim(8), value);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.claim(bytes.len()).copy_from_slice(bytes);
    }

    pub fn patch_u1(&mut self, offset: usize, value: u8) {
        self.bytes[offset] = value;
    }

    pub fn patch_u2(&mut self, offset: usize, value: u16) {
        BigEndian::write_u16(&mut self.bytes[offset..offset + 2], value);
    }

    pub fn patch_u4(&mut self, offset: usize, value: u32) {
        BigEndian::write_u32(&mut self.bytes[offset..offset + 4], value);
    }

    /// Overwrite already written bytes without moving the write position
    ///
    /// Only widths 1, 2, and 4 are meaningful. The offset must be inside the written region.
    pub fn patch(&mut self, offset: usize, width: usize, value: u32) {
        debug_assert!(offset + width <= self.len, "patching past the written region");
        match width {
            1 => self.patch_u1(offset, value as u8),
            2 => self.patch_u2(offset, value as u16),
            _ => self.patch_u4(offset, value),
        }
    }

    /// Raw index of a handle in this writer's pool, cloning the entry into the pool if needed
    pub fn resolve_index(&mut self, index: impl Into<ConstantIndex>) -> Result<u16, Error> {
        let source_pool = self.source_pool;
        self.constant_pool()?.resolve(index.into(), source_pool)
    }

    /// Write a constant pool index, cloning the entry into this writer's pool if needed
    pub fn write_index(&mut self, index: impl Into<ConstantIndex>) -> Result<(), Error> {
        let resolved = self.resolve_index(index)?;
        self.write_u2(resolved);
        Ok(())
    }

    /// Same as `write_index`, but absent entries are written as 0
    pub fn write_index_or_zero(
        &mut self,
        index: Option<impl Into<ConstantIndex>>,
    ) -> Result<(), Error> {
        match index {
            None => {
                self.write_u2(0);
                Ok(())
            }
            Some(index) => self.write_index(index),
        }
    }

    /// Write a `u4` length prefix followed by whatever `body` writes
    ///
    /// The length is patched in after the body, so the body is free to grow the pool.
    pub fn write_length_prefixed<T>(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let length_at = self.skip(4);
        let ret = body(self)?;
        let length = self.len - length_at - 4;
        self.patch_u4(length_at, length as u32);
        Ok(ret)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Exact-size copy of the written bytes
    pub fn into_bytes(self) -> Vec<u8> {
        let mut bytes = self.bytes;
        bytes.truncate(self.len);
        bytes.shrink_to_fit();
        bytes
    }
}

impl<'p> Default for BufWriter<'p> {
    fn default() -> Self {
        BufWriter::new()
    }
}

impl<'p> std::io::Write for BufWriter<'p> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.write_bytes(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Utility trait for serializing data inside class files
///
/// Java class files have some peculiarities that make it useful to define an extra trait:
///
///   - tags are always `u8`
///   - when serializing a sequence, the length of the sequence is usually `u16`
///   - indices into the constant pool may need to be resolved against the writer's pool
///
pub trait Serialize {
    fn serialize(&self, writer: &mut BufWriter) -> Result<(), Error>;
}

impl Serialize for u8 {
    fn serialize(&self, writer: &mut BufWriter) -> Result<(), Error> {
        writer.write_u1(*self);
        Ok(())
    }
}

impl Serialize for u16 {
    fn serialize(&self, writer: &mut BufWriter) -> Result<(), Error> {
        writer.write_u2(*self);
        Ok(())
    }
}

impl Serialize for u32 {
    fn serialize(&self, writer: &mut BufWriter) -> Result<(), Error> {
        writer.write_u4(*self);
        Ok(())
    }
}

/// Size in `u16` is the first thing serialized
impl<A: Serialize> Serialize for Vec<A> {
    fn serialize(&self, writer: &mut BufWriter) -> Result<(), Error> {
        writer.write_u2(self.len() as u16);
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn big_endian_writes() {
        let mut writer = BufWriter::new();
        writer.write_u1(0xCA);
        writer.write_u2(0xFEBA);
        writer.write_i4(-2);
        writer.write_f4(1.0);
        assert_eq!(
            writer.as_bytes(),
            &[0xCA, 0xFE, 0xBA, 0xFF, 0xFF, 0xFF, 0xFE, 0x3F, 0x80, 0x00, 0x00]
        );
        assert_eq!(writer.size(), 11);
    }

    #[test]
    fn growth_keeps_content() {
        let mut writer = BufWriter::new();
        for i in 0..1000u16 {
            writer.write_u2(i);
        }
        let bytes = writer.into_bytes();
        assert_eq!(bytes.len(), 2000, "exact size copy");
        assert_eq!(&bytes[1998..], &[0x03, 0xE7]);
    }

    #[test]
    fn patching_does_not_move_cursor() {
        let mut writer = BufWriter::new();
        writer.write_u1(1);
        let hole = writer.skip(2);
        writer.write_u1(4);
        writer.patch(hole, 2, 0x0203);
        assert_eq!(writer.size(), 4);
        assert_eq!(writer.as_bytes(), &[1, 2, 3, 4]);
    }

    #[test]
    fn length_prefix() {
        let mut writer = BufWriter::new();
        writer
            .write_length_prefixed(|w| {
                w.write_u8(7);
                Ok(())
            })
            .unwrap();
        assert_eq!(writer.as_bytes(), &[0, 0, 0, 8, 0, 0, 0, 0, 0, 0, 0, 7]);
    }

    #[test]
    fn index_without_pool() {
        let mut pool = ConstantPool::new();
        let idx = pool.utf8("Code").unwrap();
        let mut writer = BufWriter::new();
        assert!(matches!(
            writer.write_index(idx),
            Err(Error::NoConstantPool)
        ));
    }
}
