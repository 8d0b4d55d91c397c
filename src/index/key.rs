//! Binary index keys.
//!
//! A key is the minimum needed to materialize one row again without
//! walking the repository: usually where an object lives (packfile and
//! offset, or its hash when it is loose) plus whatever the row needs that
//! the object itself does not carry. Keys are zlib-compressed as a whole.
//!
//! Primitive encodings:
//!
//! ```text
//!   int64   zigzag, 8 bytes little-endian
//!   string  int64 length, then the utf-8 bytes
//!   hash    40 ascii hex bytes
//!   bool    1 byte
//! ```

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use git2::Oid;

use super::error::{IndexError, IndexResult};
use crate::storage::ObjectLocation;

const HASH_SIZE: usize = 40;

/// Accumulates the raw bytes of a key.
#[derive(Debug, Default)]
pub struct KeyWriter {
    buf: Vec<u8>,
}

impl KeyWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_int64(&mut self, n: i64) {
        let mut ux = (n as u64) << 1;
        if n < 0 {
            ux = !ux;
        }
        self.buf.extend_from_slice(&ux.to_le_bytes());
    }

    pub fn write_string(&mut self, s: &str) {
        self.write_int64(s.len() as i64);
        self.buf.extend_from_slice(s.as_bytes());
    }

    /// Write a hex hash, which must be exactly 40 characters.
    pub fn write_hash_hex(&mut self, hex: &str) -> IndexResult<()> {
        if hex.len() != HASH_SIZE {
            return Err(IndexError::InvalidHashSize(hex.len()));
        }
        self.buf.extend_from_slice(hex.as_bytes());
        Ok(())
    }

    pub fn write_hash(&mut self, oid: Oid) {
        self.buf.extend_from_slice(oid.to_string().as_bytes());
    }

    pub fn write_bool(&mut self, b: bool) {
        self.buf.push(u8::from(b));
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads the primitives of a raw key in order.
#[derive(Debug)]
pub struct KeyReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> KeyReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize, what: &'static str) -> IndexResult<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(IndexError::Truncated(what))?;
        let bytes = self.data.get(self.pos..end).ok_or(IndexError::Truncated(what))?;
        self.pos = end;
        Ok(bytes)
    }

    pub fn read_int64(&mut self) -> IndexResult<i64> {
        let bytes = self.take(8, "int64")?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        let ux = u64::from_le_bytes(raw);
        let mut x = (ux >> 1) as i64;
        if ux & 1 != 0 {
            x = !x;
        }
        Ok(x)
    }

    pub fn read_string(&mut self) -> IndexResult<String> {
        let size = self.read_int64()?;
        let size = usize::try_from(size).map_err(|_| IndexError::Truncated("string size"))?;
        let bytes = self.take(size, "string")?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn read_hash(&mut self) -> IndexResult<Oid> {
        let bytes = self.take(HASH_SIZE, "hash")?;
        let hex = std::str::from_utf8(bytes).map_err(|_| IndexError::InvalidHash(String::from_utf8_lossy(bytes).into()))?;
        Oid::from_str(hex).map_err(|_| IndexError::InvalidHash(hex.to_string()))
    }

    pub fn read_bool(&mut self) -> IndexResult<bool> {
        Ok(self.take(1, "bool")?[0] == 1)
    }
}

pub fn compress(data: &[u8]) -> IndexResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(IndexError::Compression)?;
    encoder.finish().map_err(IndexError::Compression)
}

pub fn decompress(data: &[u8]) -> IndexResult<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(IndexError::Compression)?;
    Ok(out)
}

/// A key with a fixed binary layout.
pub trait IndexKey: Sized {
    fn write_to(&self, w: &mut KeyWriter) -> IndexResult<()>;

    fn read_from(r: &mut KeyReader<'_>) -> IndexResult<Self>;

    /// Repository the key belongs to.
    fn repository(&self) -> &str;

    /// Encoded and compressed bytes.
    fn encode(&self) -> IndexResult<Vec<u8>> {
        let mut w = KeyWriter::new();
        self.write_to(&mut w)?;
        compress(&w.into_bytes())
    }

    fn decode(data: &[u8]) -> IndexResult<Self> {
        let raw = decompress(data)?;
        Self::read_from(&mut KeyReader::new(&raw))
    }
}

/// Location of an object: `offset` in `packfile`, or `hash` when the
/// object is loose (`offset` is then -1 and `packfile` zero).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackOffsetKey {
    pub repository: String,
    pub packfile: Oid,
    pub offset: i64,
    pub hash: Oid,
}

impl PackOffsetKey {
    pub fn new(repository: &str, location: ObjectLocation, hash: Oid) -> Self {
        let offset = location.offset();
        Self {
            repository: repository.to_string(),
            packfile: location.packfile(),
            offset,
            hash: if offset >= 0 { Oid::zero() } else { hash },
        }
    }

    pub fn is_packed(&self) -> bool {
        self.offset >= 0
    }
}

impl IndexKey for PackOffsetKey {
    fn write_to(&self, w: &mut KeyWriter) -> IndexResult<()> {
        w.write_string(&self.repository);
        w.write_hash(self.packfile);
        w.write_bool(self.is_packed());
        if self.is_packed() {
            w.write_int64(self.offset);
        } else {
            w.write_hash(self.hash);
        }
        Ok(())
    }

    fn read_from(r: &mut KeyReader<'_>) -> IndexResult<Self> {
        let repository = r.read_string()?;
        let packfile = r.read_hash()?;
        let (offset, hash) = if r.read_bool()? {
            (r.read_int64()?, Oid::zero())
        } else {
            (-1, r.read_hash()?)
        };
        Ok(Self {
            repository,
            packfile,
            offset,
            hash,
        })
    }

    fn repository(&self) -> &str {
        &self.repository
    }
}

/// An entry of a tree: where the tree lives and the entry's position in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntryKey {
    pub tree: PackOffsetKey,
    pub pos: i64,
}

impl IndexKey for TreeEntryKey {
    fn write_to(&self, w: &mut KeyWriter) -> IndexResult<()> {
        self.tree.write_to(w)?;
        w.write_int64(self.pos);
        Ok(())
    }

    fn read_from(r: &mut KeyReader<'_>) -> IndexResult<Self> {
        let tree = PackOffsetKey::read_from(r)?;
        let pos = r.read_int64()?;
        Ok(Self { tree, pos })
    }

    fn repository(&self) -> &str {
        &self.tree.repository
    }
}

/// A remote by configuration position, and the url position within it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteKey {
    pub repository: String,
    pub pos: i64,
    pub url_pos: i64,
}

impl IndexKey for RemoteKey {
    fn write_to(&self, w: &mut KeyWriter) -> IndexResult<()> {
        w.write_string(&self.repository);
        w.write_int64(self.pos);
        w.write_int64(self.url_pos);
        Ok(())
    }

    fn read_from(r: &mut KeyReader<'_>) -> IndexResult<Self> {
        Ok(Self {
            repository: r.read_string()?,
            pos: r.read_int64()?,
            url_pos: r.read_int64()?,
        })
    }

    fn repository(&self) -> &str {
        &self.repository
    }
}

/// A whole ref_commits row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefCommitKey {
    pub repository: String,
    pub commit: Oid,
    pub name: String,
    pub index: i64,
}

impl IndexKey for RefCommitKey {
    fn write_to(&self, w: &mut KeyWriter) -> IndexResult<()> {
        w.write_string(&self.repository);
        w.write_hash(self.commit);
        w.write_string(&self.name);
        w.write_int64(self.index);
        Ok(())
    }

    fn read_from(r: &mut KeyReader<'_>) -> IndexResult<Self> {
        Ok(Self {
            repository: r.read_string()?,
            commit: r.read_hash()?,
            name: r.read_string()?,
            index: r.read_int64()?,
        })
    }

    fn repository(&self) -> &str {
        &self.repository
    }
}

/// A file: the location of its blob plus path, mode, root tree and, for
/// commit_files, the commit it was reached from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileKey {
    pub repository: String,
    pub packfile: Oid,
    pub hash: Oid,
    pub offset: i64,
    pub name: String,
    pub mode: i64,
    pub tree: Oid,
    pub commit: Option<Oid>,
}

impl IndexKey for FileKey {
    fn write_to(&self, w: &mut KeyWriter) -> IndexResult<()> {
        w.write_string(&self.repository);
        w.write_hash(self.packfile);
        w.write_hash(self.hash);
        w.write_int64(self.offset);
        w.write_string(&self.name);
        w.write_int64(self.mode);
        w.write_hash(self.tree);
        w.write_bool(self.commit.is_some());
        if let Some(commit) = self.commit {
            w.write_hash(commit);
        }
        Ok(())
    }

    fn read_from(r: &mut KeyReader<'_>) -> IndexResult<Self> {
        let repository = r.read_string()?;
        let packfile = r.read_hash()?;
        let hash = r.read_hash()?;
        let offset = r.read_int64()?;
        let name = r.read_string()?;
        let mode = r.read_int64()?;
        let tree = r.read_hash()?;
        let commit = if r.read_bool()? { Some(r.read_hash()?) } else { None };
        Ok(Self {
            repository,
            packfile,
            hash,
            offset,
            name,
            mode,
            tree,
            commit,
        })
    }

    fn repository(&self) -> &str {
        &self.repository
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(hex: &str) -> Oid {
        Oid::from_str(hex).unwrap()
    }

    #[test]
    fn test_zigzag_layout() {
        let mut w = KeyWriter::new();
        w.write_int64(1);
        w.write_int64(-1);
        w.write_int64(i64::MIN);
        let bytes = w.into_bytes();
        assert_eq!(&bytes[..8], &[2, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&bytes[8..16], &[1, 0, 0, 0, 0, 0, 0, 0]);

        let mut r = KeyReader::new(&bytes);
        assert_eq!(r.read_int64().unwrap(), 1);
        assert_eq!(r.read_int64().unwrap(), -1);
        assert_eq!(r.read_int64().unwrap(), i64::MIN);
        assert!(matches!(r.read_int64(), Err(IndexError::Truncated("int64"))));
    }

    #[test]
    fn test_hash_size_checked() {
        let mut w = KeyWriter::new();
        assert!(matches!(w.write_hash_hex("abc"), Err(IndexError::InvalidHashSize(3))));
        w.write_hash_hex("ce013625030ba8dba906f756967f9e9ca394464a").unwrap();
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), 40);
        assert_eq!(
            KeyReader::new(&bytes).read_hash().unwrap(),
            oid("ce013625030ba8dba906f756967f9e9ca394464a")
        );
    }

    #[test]
    fn test_pack_offset_key_variants() {
        let packfile = oid("4b825dc642cb6eb9a060e54bf8d69288fbee4904");
        let hash = oid("ce013625030ba8dba906f756967f9e9ca394464a");

        let packed = PackOffsetKey::new("repo", ObjectLocation::Packed { packfile, offset: 12 }, hash);
        assert!(packed.is_packed());
        assert_eq!(packed.hash, Oid::zero());
        assert_eq!(PackOffsetKey::decode(&packed.encode().unwrap()).unwrap(), packed);

        let loose = PackOffsetKey::new("repo", ObjectLocation::Loose, hash);
        assert_eq!(loose.offset, -1);
        assert_eq!(loose.packfile, Oid::zero());
        let decoded = PackOffsetKey::decode(&loose.encode().unwrap()).unwrap();
        assert_eq!(decoded.hash, hash);
    }

    #[test]
    fn test_file_key_with_and_without_commit() {
        let mut key = FileKey {
            repository: "repo".into(),
            packfile: Oid::zero(),
            hash: oid("ce013625030ba8dba906f756967f9e9ca394464a"),
            offset: -1,
            name: "src/lib.rs".into(),
            mode: 0o100644,
            tree: oid("4b825dc642cb6eb9a060e54bf8d69288fbee4904"),
            commit: None,
        };
        let plain = key.encode().unwrap();
        key.commit = Some(oid("4b825dc642cb6eb9a060e54bf8d69288fbee4904"));
        let with_commit = key.encode().unwrap();

        assert_eq!(FileKey::decode(&with_commit).unwrap(), key);
        assert_eq!(FileKey::decode(&plain).unwrap().commit, None);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            RemoteKey::decode(b"not zlib"),
            Err(IndexError::Compression(_))
        ));

        let mut w = KeyWriter::new();
        w.write_string("repo");
        let short = compress(&w.into_bytes()).unwrap();
        assert!(matches!(RemoteKey::decode(&short), Err(IndexError::Truncated(_))));
    }
}
