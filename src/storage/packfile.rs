//! Packfile discovery and pack index (`.idx` v2) parsing.
//!
//! A [`RepositoryIndex`] is the per-repository list of packfiles with their
//! hash to offset tables, in discovery order, plus the loose object
//! directory used as a fallback. It is built once and read-only afterwards.
//!
//! # Index layout (v2)
//!
//! ```text
//! magic (ff 74 4f 63) | version (2) | fanout[256] (u32 BE)
//! oids[N] (20 bytes each, sorted)
//! crc32[N]
//! offsets[N] (u32 BE; MSB set => index into the 64-bit table)
//! large_offsets[M] (u64 BE)
//! pack checksum | index checksum
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use git2::Oid;

use super::errors::{StorageError, StorageResult};
use super::repository::Repository;

const IDX_MAGIC: [u8; 4] = [0xff, 0x74, 0x4f, 0x63];
const IDX_VERSION: u32 = 2;
const HEADER_SIZE: usize = 8;
const FANOUT_SIZE: usize = 256 * 4;
const OID_SIZE: usize = 20;
const TRAILER_SIZE: usize = 2 * OID_SIZE;
const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;

/// Where an object lives inside the object store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectLocation {
    Packed { packfile: Oid, offset: u64 },
    Loose,
}

impl ObjectLocation {
    /// packfile hash, zero for loose objects
    pub fn packfile(&self) -> Oid {
        match self {
            ObjectLocation::Packed { packfile, .. } => *packfile,
            ObjectLocation::Loose => Oid::zero(),
        }
    }

    /// byte offset in the packfile, -1 for loose objects
    pub fn offset(&self) -> i64 {
        match self {
            ObjectLocation::Packed { offset, .. } => *offset as i64,
            ObjectLocation::Loose => -1,
        }
    }
}

/// In-memory hash to offset table of one packfile.
#[derive(Debug, Clone)]
pub struct PackIndex {
    fanout: [u32; 256],
    oids: Vec<u8>,
    offsets: Vec<u64>,
}

impl PackIndex {
    /// Read and parse an index file from disk.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let data = fs::read(path)?;
        Self::parse(path, &data)
    }

    /// Parse the bytes of a version 2 index file.
    pub fn parse(path: &Path, data: &[u8]) -> StorageResult<Self> {
        let corrupt = |reason: &str| StorageError::CorruptIndex {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        if data.len() < HEADER_SIZE + FANOUT_SIZE + TRAILER_SIZE {
            return Err(corrupt("file too small"));
        }
        if data[..4] != IDX_MAGIC {
            return Err(corrupt("bad magic"));
        }
        let version = read_u32(data, 4);
        if version != IDX_VERSION {
            return Err(corrupt(&format!("unsupported version {}", version)));
        }

        let mut fanout = [0u32; 256];
        let mut prev = 0;
        for (i, slot) in fanout.iter_mut().enumerate() {
            let v = read_u32(data, HEADER_SIZE + i * 4);
            if v < prev {
                return Err(corrupt("fanout is not monotonic"));
            }
            *slot = v;
            prev = v;
        }
        let count = fanout[255] as usize;

        let oids_start = HEADER_SIZE + FANOUT_SIZE;
        let crc_start = oids_start + count * OID_SIZE;
        let offsets_start = crc_start + count * 4;
        let large_start = offsets_start + count * 4;
        let tables_end = data.len() - TRAILER_SIZE;
        if large_start > tables_end {
            return Err(corrupt("truncated tables"));
        }
        let large_len = tables_end - large_start;
        if large_len % 8 != 0 {
            return Err(corrupt("bad large offset table size"));
        }
        let large_count = large_len / 8;

        let mut offsets = Vec::with_capacity(count);
        for i in 0..count {
            let raw = read_u32(data, offsets_start + i * 4);
            if raw & LARGE_OFFSET_FLAG == 0 {
                offsets.push(raw as u64);
                continue;
            }
            let idx = (raw & !LARGE_OFFSET_FLAG) as usize;
            if idx >= large_count {
                return Err(corrupt("large offset out of bounds"));
            }
            offsets.push(read_u64(data, large_start + idx * 8));
        }

        Ok(Self {
            fanout,
            oids: data[oids_start..crc_start].to_vec(),
            offsets,
        })
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    fn oid_bytes(&self, i: usize) -> &[u8] {
        &self.oids[i * OID_SIZE..(i + 1) * OID_SIZE]
    }

    /// Offset of `oid` in the packfile, if present.
    pub fn lookup(&self, oid: &Oid) -> Option<u64> {
        let needle = oid.as_bytes();
        let first = needle[0] as usize;
        let mut lo = if first == 0 { 0 } else { self.fanout[first - 1] as usize };
        let mut hi = self.fanout[first] as usize;

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.oid_bytes(mid).cmp(needle) {
                std::cmp::Ordering::Equal => return Some(self.offsets[mid]),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        None
    }

    /// All `(oid, offset)` pairs in hash order.
    pub fn entries(&self) -> impl Iterator<Item = (Oid, u64)> + '_ {
        (0..self.len()).filter_map(move |i| {
            Oid::from_bytes(self.oid_bytes(i))
                .ok()
                .map(|oid| (oid, self.offsets[i]))
        })
    }
}

/// One discovered packfile with its parsed index.
#[derive(Debug, Clone)]
pub struct PackfileIndex {
    pub packfile: Oid,
    pub index: PackIndex,
}

/// Per-repository lookup structure over packs and loose objects.
#[derive(Debug, Clone)]
pub struct RepositoryIndex {
    objects_dir: PathBuf,
    packs: Vec<PackfileIndex>,
}

impl RepositoryIndex {
    /// Enumerate and parse every pack index of the repository.
    pub fn open(repo: &Repository) -> StorageResult<Self> {
        Self::open_path(repo.path())
    }

    pub fn open_path(path: &Path) -> StorageResult<Self> {
        let objects_dir = objects_dir(path);
        if !objects_dir.is_dir() {
            return Err(StorageError::ObjectsDirNotFound(objects_dir));
        }

        let mut packs = Vec::new();
        for packfile in find_packfiles(&objects_dir)? {
            let index = PackIndex::open(&idx_path(&objects_dir, &packfile))?;
            packs.push(PackfileIndex { packfile, index });
        }

        Ok(Self { objects_dir, packs })
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    pub fn packs(&self) -> &[PackfileIndex] {
        &self.packs
    }

    /// Locate `oid`, checking packs in discovery order and then the loose
    /// object directory.
    pub fn find(&self, oid: Oid) -> StorageResult<ObjectLocation> {
        for pack in &self.packs {
            if let Some(offset) = pack.index.lookup(&oid) {
                return Ok(ObjectLocation::Packed {
                    packfile: pack.packfile,
                    offset,
                });
            }
        }

        if loose_path(&self.objects_dir, &oid).is_file() {
            return Ok(ObjectLocation::Loose);
        }

        Err(StorageError::HashNotInIndex(oid))
    }
}

/// Object directory of a repository path: `<path>/.git/objects` for work
/// trees, `<path>/objects` for bare repositories.
pub fn objects_dir(path: &Path) -> PathBuf {
    let dot_git = path.join(".git");
    if dot_git.is_dir() {
        dot_git.join("objects")
    } else {
        path.join("objects")
    }
}

/// Hashes of all `pack-<hash>.pack` files, sorted by name. A missing pack
/// directory means there are no packs.
pub fn find_packfiles(objects_dir: &Path) -> StorageResult<Vec<Oid>> {
    let pack_dir = objects_dir.join("pack");
    let entries = match fs::read_dir(&pack_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    for entry in entries {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if name.starts_with("pack-") && name.ends_with(".pack") {
            names.push(name);
        }
    }
    names.sort();

    let mut packs = Vec::with_capacity(names.len());
    for name in names {
        let hex = &name["pack-".len()..name.len() - ".pack".len()];
        match Oid::from_str(hex) {
            Ok(oid) if hex.len() == 40 => packs.push(oid),
            _ => tracing::debug!(file = %name, "ignoring packfile with unexpected name"),
        }
    }
    Ok(packs)
}

pub fn pack_path(objects_dir: &Path, packfile: &Oid) -> PathBuf {
    objects_dir.join("pack").join(format!("pack-{}.pack", packfile))
}

pub fn idx_path(objects_dir: &Path, packfile: &Oid) -> PathBuf {
    objects_dir.join("pack").join(format!("pack-{}.idx", packfile))
}

pub fn loose_path(objects_dir: &Path, oid: &Oid) -> PathBuf {
    let hex = oid.to_string();
    objects_dir.join(&hex[..2]).join(&hex[2..])
}

fn read_u32(data: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

fn read_u64(data: &[u8], pos: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[pos..pos + 8]);
    u64::from_be_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{commit_files, init_repo, pack_repository};

    /// build a v2 index by hand for a few fake objects
    fn build_idx(objects: &mut [([u8; 20], u64)]) -> Vec<u8> {
        objects.sort_by(|a, b| a.0.cmp(&b.0));
        let mut out = Vec::new();
        out.extend_from_slice(&IDX_MAGIC);
        out.extend_from_slice(&IDX_VERSION.to_be_bytes());
        for b in 0..256usize {
            let n = objects.iter().filter(|(o, _)| (o[0] as usize) <= b).count() as u32;
            out.extend_from_slice(&n.to_be_bytes());
        }
        for (oid, _) in objects.iter() {
            out.extend_from_slice(oid);
        }
        for _ in objects.iter() {
            out.extend_from_slice(&0u32.to_be_bytes());
        }
        let mut large = Vec::new();
        for (_, offset) in objects.iter() {
            if *offset >= LARGE_OFFSET_FLAG as u64 {
                let idx = (large.len() as u32) | LARGE_OFFSET_FLAG;
                out.extend_from_slice(&idx.to_be_bytes());
                large.push(*offset);
            } else {
                out.extend_from_slice(&(*offset as u32).to_be_bytes());
            }
        }
        for offset in large {
            out.extend_from_slice(&offset.to_be_bytes());
        }
        out.extend_from_slice(&[0u8; TRAILER_SIZE]);
        out
    }

    #[test]
    fn test_parse_and_lookup() {
        let mut objects = [([0x10; 20], 12u64), ([0x00; 20], 100), ([0xff; 20], 5_000_000_000)];
        let data = build_idx(&mut objects);
        let idx = PackIndex::parse(Path::new("t.idx"), &data).unwrap();

        assert_eq!(idx.len(), 3);
        assert_eq!(idx.lookup(&Oid::from_bytes(&[0x10; 20]).unwrap()), Some(12));
        assert_eq!(idx.lookup(&Oid::from_bytes(&[0x00; 20]).unwrap()), Some(100));
        assert_eq!(idx.lookup(&Oid::from_bytes(&[0xff; 20]).unwrap()), Some(5_000_000_000));
        assert_eq!(idx.lookup(&Oid::from_bytes(&[0x11; 20]).unwrap()), None);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        let mut objects = [([0x10; 20], 12u64)];
        let mut data = build_idx(&mut objects);

        let err = PackIndex::parse(Path::new("t.idx"), &data[..100]).unwrap_err();
        assert!(err.is_corrupt());

        data[0] = 0;
        let err = PackIndex::parse(Path::new("t.idx"), &data).unwrap_err();
        assert!(err.is_corrupt());
    }

    #[test]
    fn test_find_packed_and_loose() {
        let (dir, repo) = init_repo();
        let c1 = commit_files(&repo, &[("a", b"1")], "one", &[]);
        pack_repository(&repo);
        // written after packing, so it stays loose
        let loose = repo.blob(b"loose content").unwrap();

        let index = RepositoryIndex::open_path(dir.path()).unwrap();
        assert_eq!(index.packs().len(), 1);

        let packed = index.find(c1).unwrap();
        assert!(matches!(packed, ObjectLocation::Packed { .. }));
        assert!(packed.offset() > 0);
        assert_eq!(packed.packfile(), index.packs()[0].packfile);

        let location = index.find(loose).unwrap();
        assert_eq!(location, ObjectLocation::Loose);
        assert_eq!(location.offset(), -1);
        assert!(location.packfile().is_zero());

        let missing = Oid::from_bytes(&[0x42; 20]).unwrap();
        assert!(index.find(missing).unwrap_err().is_not_found());
    }

    #[test]
    fn test_missing_objects_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = RepositoryIndex::open_path(dir.path()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_no_pack_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("objects")).unwrap();
        let index = RepositoryIndex::open_path(dir.path()).unwrap();
        assert!(index.packs().is_empty());
    }
}
