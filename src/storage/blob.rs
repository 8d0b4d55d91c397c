//! Blob content policy.

use crate::config::BlobsConfig;

/// how many leading bytes are inspected when sniffing for binary content
const SNIFF_LEN: usize = 8000;

/// A blob counts as binary when a NUL byte shows up early in it.
pub fn is_binary(data: &[u8]) -> bool {
    data.iter().take(SNIFF_LEN).any(|&b| b == 0)
}

/// Content a blob row carries: the bytes when they were asked for and the
/// blob is small enough and not binary (unless binary is allowed), else an
/// empty byte string.
pub fn row_content(data: Vec<u8>, read_content: bool, cfg: &BlobsConfig) -> Vec<u8> {
    if !read_content || data.len() > cfg.max_size {
        return Vec::new();
    }
    if !cfg.allow_binary && is_binary(&data) {
        return Vec::new();
    }
    data
}

/// Whether content must be fetched at all for a blob of `size` bytes.
pub fn wants_content(size: usize, read_content: bool, cfg: &BlobsConfig) -> bool {
    read_content && size <= cfg.max_size
}
