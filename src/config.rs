//! Environment driven configuration.
//!
//! Only a few knobs exist; they are read once when a [`Session`] is built
//! and then passed explicitly to every cursor.
//!
//! [`Session`]: crate::session::Session

const B: usize = 1;
const KIB: usize = 1024 * B;
const MIB: usize = 1024 * KIB;

/// maximum blob size (in MiB) whose content is loaded into rows
pub const BLOBS_MAX_SIZE_KEY: &str = "GITBASE_BLOBS_MAX_SIZE";

/// when present, binary blobs also get their content loaded
pub const BLOBS_ALLOW_BINARY_KEY: &str = "GITBASE_BLOBS_ALLOW_BINARY";

/// when present, sessions built from the environment skip git errors
pub const SKIP_GIT_ERRORS_KEY: &str = "GITBASE_SKIP_GIT_ERRORS";

const DEFAULT_BLOBS_MAX_SIZE_MIB: i64 = 5;

/// Read an integer variable, falling back to `default` when unset or invalid.
pub fn get_int_env(key: &str, default: i64) -> i64 {
    match std::env::var(key) {
        Ok(val) if !val.is_empty() => val.parse().unwrap_or(default),
        _ => default,
    }
}

/// A boolean variable is true as soon as it is set, whatever its value.
pub fn get_bool_env(key: &str, default: bool) -> bool {
    if std::env::var_os(key).is_some() {
        return true;
    }
    default
}

pub fn get_string_env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Rules for loading blob content into rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobsConfig {
    /// blobs larger than this (in bytes) get empty content
    pub max_size: usize,
    /// load content of blobs that look binary
    pub allow_binary: bool,
}

impl Default for BlobsConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_BLOBS_MAX_SIZE_MIB as usize * MIB,
            allow_binary: false,
        }
    }
}

impl BlobsConfig {
    pub fn from_env() -> Self {
        let mib = get_int_env(BLOBS_MAX_SIZE_KEY, DEFAULT_BLOBS_MAX_SIZE_MIB).max(0) as usize;
        Self {
            max_size: mib.saturating_mul(MIB),
            allow_binary: get_bool_env(BLOBS_ALLOW_BINARY_KEY, false),
        }
    }

    pub fn max_size(mut self, bytes: usize) -> Self {
        self.max_size = bytes;
        self
    }

    pub fn allow_binary(mut self, allow: bool) -> Self {
        self.allow_binary = allow;
        self
    }
}
