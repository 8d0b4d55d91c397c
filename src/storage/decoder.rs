//! Random-access object decoding.
//!
//! [`PackReader`] decodes a single entry of an open packfile given its byte
//! offset, resolving OFS_DELTA and REF_DELTA chains iteratively.
//! [`ObjectDecoder`] keeps at most one reader open, keyed by repository and
//! packfile, and only reopens when a request targets another packfile.
//! Sequential index reads that stay in the same pack never reopen it.
//!
//! A decoder is not meant to be shared: every partition or worker owns its
//! own.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::ZlibDecoder;
use git2::Oid;

use super::errors::{StorageError, StorageResult};
use super::object::RawObject;
use super::packfile::{idx_path, loose_path, objects_dir, pack_path, PackIndex};
use super::pool::RepositoryPool;
use super::types::ObjectKind;

const PACK_SIGNATURE: &[u8; 4] = b"PACK";
const PACK_HEADER_SIZE: u64 = 12;
/// type/size varint (10 bytes max) followed by at most a 20 byte base id
const MAX_ENTRY_HEADER: usize = 32;
const MAX_DELTA_CHAIN: usize = 10_000;

#[derive(Debug, Clone, Copy)]
enum EntryKind {
    Base(ObjectKind),
    OfsDelta { base_offset: u64 },
    RefDelta { base: Oid },
}

#[derive(Debug, Clone, Copy)]
struct EntryHeader {
    kind: EntryKind,
    size: usize,
    data_start: u64,
}

/// An open packfile.
pub struct PackReader {
    path: PathBuf,
    idx_path: PathBuf,
    file: File,
    len: u64,
    index: Option<PackIndex>,
}

impl PackReader {
    /// Open the packfile and check its signature.
    pub fn open(objects_dir: &Path, packfile: &Oid) -> StorageResult<Self> {
        let path = pack_path(objects_dir, packfile);
        let mut file = File::open(&path)?;
        let len = file.metadata()?.len();

        let mut header = [0u8; PACK_HEADER_SIZE as usize];
        file.read_exact(&mut header).map_err(|_| StorageError::CorruptPack {
            path: path.clone(),
            offset: 0,
            reason: "missing header".into(),
        })?;
        let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if &header[..4] != PACK_SIGNATURE || !(version == 2 || version == 3) {
            return Err(StorageError::CorruptPack {
                path,
                offset: 0,
                reason: "bad signature or version".into(),
            });
        }

        Ok(Self {
            path,
            idx_path: idx_path(objects_dir, packfile),
            file,
            len,
            index: None,
        })
    }

    fn corrupt(&self, offset: u64, reason: impl Into<String>) -> StorageError {
        StorageError::CorruptPack {
            path: self.path.clone(),
            offset,
            reason: reason.into(),
        }
    }

    /// Decode the object whose entry starts at `offset`.
    pub fn decode_at(&mut self, offset: u64) -> StorageResult<RawObject> {
        // outermost delta first
        let mut deltas: Vec<Vec<u8>> = Vec::new();
        let mut current = offset;

        loop {
            if deltas.len() > MAX_DELTA_CHAIN {
                return Err(self.corrupt(offset, "delta chain too long"));
            }

            let header = self.entry_header(current)?;
            let payload = self.inflate(current, header.data_start, header.size)?;

            match header.kind {
                EntryKind::Base(kind) => {
                    let mut data = payload;
                    for delta in deltas.iter().rev() {
                        data = apply_delta(&data, delta)?;
                    }
                    return RawObject::new(kind, data);
                }
                EntryKind::OfsDelta { base_offset } => {
                    deltas.push(payload);
                    current = base_offset;
                }
                EntryKind::RefDelta { base } => {
                    deltas.push(payload);
                    current = self
                        .base_offset(&base)?
                        .ok_or_else(|| self.corrupt(current, format!("delta base {} not in pack", base)))?;
                }
            }
        }
    }

    fn base_offset(&mut self, base: &Oid) -> StorageResult<Option<u64>> {
        if self.index.is_none() {
            self.index = Some(PackIndex::open(&self.idx_path)?);
        }
        Ok(self.index.as_ref().and_then(|idx| idx.lookup(base)))
    }

    fn entry_header(&mut self, offset: u64) -> StorageResult<EntryHeader> {
        if offset < PACK_HEADER_SIZE {
            return Err(self.corrupt(offset, "offset inside pack header"));
        }
        self.file.seek(SeekFrom::Start(offset))?;

        let mut buf = [0u8; MAX_ENTRY_HEADER];
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        let buf = &buf[..filled];
        let byte = |pos: usize| buf.get(pos).copied().ok_or_else(|| self.corrupt(offset, "truncated entry header"));

        let mut pos = 0;
        let mut c = byte(pos)?;
        pos += 1;
        let type_bits = (c >> 4) & 0x07;
        let mut size = (c & 0x0f) as u64;
        let mut shift = 4;
        while c & 0x80 != 0 {
            c = byte(pos)?;
            pos += 1;
            if shift > 57 {
                return Err(self.corrupt(offset, "entry size overflow"));
            }
            size |= ((c & 0x7f) as u64) << shift;
            shift += 7;
        }

        let kind = match type_bits {
            1 => EntryKind::Base(ObjectKind::Commit),
            2 => EntryKind::Base(ObjectKind::Tree),
            3 => EntryKind::Base(ObjectKind::Blob),
            4 => EntryKind::Base(ObjectKind::Tag),
            6 => {
                c = byte(pos)?;
                pos += 1;
                let mut rel = (c & 0x7f) as u64;
                while c & 0x80 != 0 {
                    c = byte(pos)?;
                    pos += 1;
                    rel = rel
                        .checked_add(1)
                        .and_then(|r| r.checked_mul(128))
                        .map(|r| r | (c & 0x7f) as u64)
                        .ok_or_else(|| self.corrupt(offset, "delta base offset overflow"))?;
                }
                if rel == 0 || rel > offset {
                    return Err(self.corrupt(offset, "delta base offset out of range"));
                }
                EntryKind::OfsDelta {
                    base_offset: offset - rel,
                }
            }
            7 => {
                if pos + 20 > buf.len() {
                    return Err(self.corrupt(offset, "truncated delta base id"));
                }
                let base = Oid::from_bytes(&buf[pos..pos + 20])?;
                pos += 20;
                EntryKind::RefDelta { base }
            }
            other => return Err(self.corrupt(offset, format!("invalid object type {}", other))),
        };

        Ok(EntryHeader {
            kind,
            size: size as usize,
            data_start: offset + pos as u64,
        })
    }

    fn inflate(&mut self, offset: u64, start: u64, size: usize) -> StorageResult<Vec<u8>> {
        self.file.seek(SeekFrom::Start(start))?;
        // the header size is untrusted: reserve no more than the pack holds
        let remaining = self.len.saturating_sub(start);
        let capacity = size.min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let mut decoder = ZlibDecoder::new(BufReader::new(&mut self.file));
        let mut out = Vec::with_capacity(capacity);
        let read = decoder
            .by_ref()
            .take(size as u64)
            .read_to_end(&mut out)
            .map_err(|e| StorageError::Inflate(format!("{} at offset {}: {}", self.path.display(), offset, e)));
        drop(decoder);
        read?;
        if out.len() != size {
            return Err(self.corrupt(offset, format!("inflated {} bytes, expected {}", out.len(), size)));
        }
        Ok(out)
    }
}

/// Read and inflate a loose object.
pub fn read_loose(objects_dir: &Path, oid: &Oid) -> StorageResult<RawObject> {
    let path = loose_path(objects_dir, oid);
    let file = File::open(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => StorageError::ObjectNotFound(*oid),
        _ => StorageError::Io(e),
    })?;

    let mut raw = Vec::new();
    ZlibDecoder::new(BufReader::new(file))
        .read_to_end(&mut raw)
        .map_err(|e| StorageError::Inflate(format!("{}: {}", path.display(), e)))?;

    let malformed = |reason: &str| StorageError::MalformedObject {
        kind: "loose",
        oid: *oid,
        reason: reason.to_string(),
    };

    let nul = raw.iter().position(|&b| b == 0).ok_or_else(|| malformed("missing header"))?;
    let header = std::str::from_utf8(&raw[..nul]).map_err(|_| malformed("bad header"))?;
    let (kind, size) = header.split_once(' ').ok_or_else(|| malformed("bad header"))?;
    let kind = ObjectKind::from_name(kind).ok_or_else(|| malformed("unknown kind"))?;
    let size: usize = size.parse().map_err(|_| malformed("bad size"))?;

    let data = raw.split_off(nul + 1);
    if data.len() != size {
        return Err(malformed("size mismatch"));
    }

    let object = RawObject::new(kind, data)?;
    if object.oid != *oid {
        return Err(malformed("content does not match its id"));
    }
    Ok(object)
}

/// Apply a git delta to `base`.
pub fn apply_delta(base: &[u8], delta: &[u8]) -> StorageResult<Vec<u8>> {
    let err = |reason: &str| StorageError::Delta(reason.to_string());

    let mut pos = 0;
    let base_size = read_varint(delta, &mut pos).ok_or_else(|| err("truncated base size"))?;
    let result_size = read_varint(delta, &mut pos).ok_or_else(|| err("truncated result size"))?;
    if base_size != base.len() {
        return Err(err("base size mismatch"));
    }

    // every copy command takes at least one delta byte and copies at most
    // the whole base; every insert yields at most 0x7f bytes
    let max_result = delta
        .len()
        .checked_mul(base.len().max(0x7f))
        .ok_or_else(|| err("result size out of range"))?;
    if result_size > max_result {
        return Err(err("result size out of range"));
    }

    let mut out = Vec::with_capacity(result_size);
    while pos < delta.len() {
        let cmd = delta[pos];
        pos += 1;

        if cmd & 0x80 != 0 {
            let mut off = 0usize;
            let mut size = 0usize;
            for i in 0..4 {
                if cmd & (1 << i) != 0 {
                    let b = *delta.get(pos).ok_or_else(|| err("truncated copy offset"))?;
                    off |= (b as usize) << (8 * i);
                    pos += 1;
                }
            }
            for i in 0..3 {
                if cmd & (0x10 << i) != 0 {
                    let b = *delta.get(pos).ok_or_else(|| err("truncated copy size"))?;
                    size |= (b as usize) << (8 * i);
                    pos += 1;
                }
            }
            if size == 0 {
                size = 0x10000;
            }
            let end = off.checked_add(size).ok_or_else(|| err("copy out of range"))?;
            if end > base.len() {
                return Err(err("copy out of range"));
            }
            out.extend_from_slice(&base[off..end]);
        } else if cmd != 0 {
            let size = cmd as usize;
            if pos + size > delta.len() {
                return Err(err("truncated insert"));
            }
            out.extend_from_slice(&delta[pos..pos + size]);
            pos += size;
        } else {
            return Err(err("reserved command 0"));
        }

        if out.len() > result_size {
            return Err(err("result overrun"));
        }
    }

    if out.len() != result_size {
        return Err(err("result size mismatch"));
    }
    Ok(out)
}

fn read_varint(data: &[u8], pos: &mut usize) -> Option<usize> {
    let mut result = 0usize;
    let mut shift = 0;
    loop {
        let b = *data.get(*pos)?;
        *pos += 1;
        result |= ((b & 0x7f) as usize) << shift;
        if b & 0x80 == 0 {
            return Some(result);
        }
        shift += 7;
        if shift > 63 {
            return None;
        }
    }
}

struct OpenPack {
    repo_id: String,
    packfile: Oid,
    reader: PackReader,
}

/// Decodes objects by location, caching one open packfile.
pub struct ObjectDecoder {
    pool: Arc<RepositoryPool>,
    current: Option<OpenPack>,
    opens: usize,
}

impl ObjectDecoder {
    pub fn new(pool: Arc<RepositoryPool>) -> Self {
        Self {
            pool,
            current: None,
            opens: 0,
        }
    }

    /// Decode by index location: packed when `offset >= 0`, loose otherwise.
    pub fn decode(&mut self, repo_id: &str, packfile: Oid, offset: i64, hash: Oid) -> StorageResult<RawObject> {
        if offset >= 0 {
            self.decode_at(repo_id, packfile, offset as u64)
        } else {
            self.decode_loose(repo_id, hash)
        }
    }

    /// Decode the entry at `offset` of `packfile`, reusing the open reader
    /// when it is the same packfile of the same repository.
    pub fn decode_at(&mut self, repo_id: &str, packfile: Oid, offset: u64) -> StorageResult<RawObject> {
        let reuse = matches!(
            &self.current,
            Some(open) if open.repo_id == repo_id && open.packfile == packfile
        );

        if !reuse {
            // the previous reader is closed before the next one is opened
            self.current = None;
            let repo = self.pool.get(repo_id)?;
            let reader = PackReader::open(&objects_dir(repo.path()), &packfile)?;
            self.opens += 1;
            tracing::trace!(repo = repo_id, packfile = %packfile, "opened packfile");
            self.current = Some(OpenPack {
                repo_id: repo_id.to_string(),
                packfile,
                reader,
            });
        }

        match self.current.as_mut() {
            Some(open) => open.reader.decode_at(offset),
            None => Err(StorageError::CorruptPack {
                path: PathBuf::new(),
                offset,
                reason: "no open packfile".into(),
            }),
        }
    }

    pub fn decode_loose(&mut self, repo_id: &str, hash: Oid) -> StorageResult<RawObject> {
        let repo = self.pool.get(repo_id)?;
        read_loose(&objects_dir(repo.path()), &hash)
    }

    /// number of packfiles opened so far
    pub fn opens(&self) -> usize {
        self.opens
    }

    /// Whether a packfile is currently open.
    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// Release the open packfile, if any.
    pub fn close(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::packfile::{ObjectLocation, RepositoryIndex};
    use crate::test_support::{commit_files, init_repo, pack_repository, pool_with};
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_apply_delta() {
        let base = b"hello, world";
        // base size 12, result size 11: copy "hello" then insert " rust!"
        let mut delta = vec![12u8, 11u8];
        delta.extend_from_slice(&[0x80 | 0x10, 5]);
        delta.push(6);
        delta.extend_from_slice(b" rust!");
        assert_eq!(apply_delta(base, &delta).unwrap(), b"hello rust!");
    }

    #[test]
    fn test_apply_delta_rejects_bad_base() {
        let delta = vec![3u8, 1u8, 1, b'x'];
        let err = apply_delta(b"toolong", &delta).unwrap_err();
        assert!(err.is_corrupt());
    }

    #[test]
    fn test_apply_delta_rejects_oversized_result() {
        // base size 0, result size 1 << 56, then a single insert
        let mut delta = vec![0x00];
        delta.extend_from_slice(&[0x80; 8]);
        delta.extend_from_slice(&[0x01, 0x01, b'x']);
        let err = apply_delta(b"", &delta).unwrap_err();
        assert!(err.is_corrupt());
        assert!(err.to_string().contains("result size out of range"));
    }

    /// Write a single-entry pack holding `entry` at offset 12.
    fn single_entry_pack(entry: &[u8]) -> (TempDir, Oid) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("pack")).unwrap();
        let packfile = Oid::from_bytes(&[0x11; 20]).unwrap();

        let mut bytes = b"PACK".to_vec();
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.extend_from_slice(entry);
        std::fs::write(pack_path(dir.path(), &packfile), bytes).unwrap();
        (dir, packfile)
    }

    #[test]
    fn test_entry_size_larger_than_pack() {
        // blob entry claiming a size near 2^59 in front of a 3 byte stream
        let mut entry = vec![0xbf];
        entry.extend_from_slice(&[0xff; 7]);
        entry.push(0x3f);
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"abc").unwrap();
        entry.extend_from_slice(&encoder.finish().unwrap());

        let (dir, packfile) = single_entry_pack(&entry);
        let mut reader = PackReader::open(dir.path(), &packfile).unwrap();
        let err = reader.decode_at(PACK_HEADER_SIZE).unwrap_err();
        assert!(matches!(err, StorageError::CorruptPack { .. }), "{}", err);
    }

    #[test]
    fn test_ofs_delta_offset_overflow() {
        let mut entry = vec![0x60];
        entry.extend_from_slice(&[0xff; 12]);
        entry.push(0x00);

        let (dir, packfile) = single_entry_pack(&entry);
        let mut reader = PackReader::open(dir.path(), &packfile).unwrap();
        match reader.decode_at(PACK_HEADER_SIZE) {
            Err(StorageError::CorruptPack { offset, reason, .. }) => {
                assert_eq!(offset, PACK_HEADER_SIZE);
                assert!(reason.contains("overflow"), "{}", reason);
            }
            other => panic!("expected corrupt pack, got {:?}", other.map(|o| o.oid)),
        }
    }

    #[test]
    fn test_decode_packed_objects_match_libgit2() {
        let (dir, repo) = init_repo();
        let mut parent = Vec::new();
        let mut content = String::new();
        for i in 0..6 {
            // growing files make libgit2 emit deltas
            content.push_str(&format!("line {} of a file that keeps growing\n", i));
            let c = commit_files(&repo, &[("file.txt", content.as_bytes())], &format!("c{}", i), &parent);
            parent = vec![c];
        }
        pack_repository(&repo);

        let pool = pool_with(&[("repo", dir.path())]);
        let index = RepositoryIndex::open_path(dir.path()).unwrap();
        let mut decoder = ObjectDecoder::new(pool);
        let odb = repo.odb().unwrap();

        let pack = &index.packs()[0];
        let mut decoded = 0;
        for (oid, offset) in pack.index.entries() {
            let object = decoder.decode_at("repo", pack.packfile, offset).unwrap();
            let expected = odb.read(oid).unwrap();
            assert_eq!(object.oid, oid);
            assert_eq!(object.data, expected.data());
            decoded += 1;
        }
        assert!(decoded > 0);
        assert_eq!(decoder.opens(), 1);
    }

    #[test]
    fn test_decode_loose() {
        let (dir, repo) = init_repo();
        let blob = repo.blob(b"some loose bytes").unwrap();
        let pool = pool_with(&[("repo", dir.path())]);
        let mut decoder = ObjectDecoder::new(pool);

        let object = decoder.decode("repo", Oid::zero(), -1, blob).unwrap();
        assert_eq!(object.kind, ObjectKind::Blob);
        assert_eq!(object.data, b"some loose bytes");
        assert_eq!(decoder.opens(), 0);
    }

    #[test]
    fn test_decoder_reopens_only_on_pack_change() {
        let (dir_a, repo_a) = init_repo();
        let (dir_b, repo_b) = init_repo();
        let a1 = commit_files(&repo_a, &[("a", b"1")], "a1", &[]);
        let a2 = commit_files(&repo_a, &[("a", b"2")], "a2", &[a1]);
        let b1 = commit_files(&repo_b, &[("b", b"1")], "b1", &[]);
        pack_repository(&repo_a);
        pack_repository(&repo_b);

        let pool = pool_with(&[("a", dir_a.path()), ("b", dir_b.path())]);
        let idx_a = RepositoryIndex::open_path(dir_a.path()).unwrap();
        let idx_b = RepositoryIndex::open_path(dir_b.path()).unwrap();
        let mut decoder = ObjectDecoder::new(pool);

        let locate = |idx: &RepositoryIndex, oid| match idx.find(oid).unwrap() {
            ObjectLocation::Packed { packfile, offset } => (packfile, offset),
            ObjectLocation::Loose => panic!("expected packed object"),
        };

        let (pa, o1) = locate(&idx_a, a1);
        let (_, o2) = locate(&idx_a, a2);
        let (pb, ob) = locate(&idx_b, b1);

        decoder.decode_at("a", pa, o1).unwrap();
        decoder.decode_at("a", pa, o2).unwrap();
        assert_eq!(decoder.opens(), 1);

        decoder.decode_at("b", pb, ob).unwrap();
        assert_eq!(decoder.opens(), 2);

        decoder.decode_at("a", pa, o1).unwrap();
        assert_eq!(decoder.opens(), 3);

        decoder.close();
        decoder.decode_at("a", pa, o2).unwrap();
        assert_eq!(decoder.opens(), 4);
    }

    #[test]
    fn test_truncated_pack_fails() {
        let (dir, repo) = init_repo();
        let c = commit_files(&repo, &[("a", b"some content to compress")], "c", &[]);
        pack_repository(&repo);

        let index = RepositoryIndex::open_path(dir.path()).unwrap();
        let pack = index.packs()[0].packfile;
        let path = pack_path(index.objects_dir(), &pack);
        let len = std::fs::metadata(&path).unwrap().len();
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len / 2).unwrap();

        let pool = pool_with(&[("repo", dir.path())]);
        let mut decoder = ObjectDecoder::new(pool);
        let mut failures = 0;
        for (_, offset) in index.packs()[0].index.entries() {
            if decoder.decode_at("repo", pack, offset).is_err() {
                failures += 1;
            }
        }
        assert!(failures > 0);
        let _ = c;
    }
}
