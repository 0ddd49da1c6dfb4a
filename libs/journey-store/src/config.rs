//! Store configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Guard against replacing a large document with a near-empty one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeGuard {
    /// Guard only applies when the previous file is larger than this.
    pub min_previous_bytes: u64,
    /// Replacement must be at least this fraction of the previous size.
    pub min_ratio: f64,
}

impl Default for SizeGuard {
    fn default() -> Self {
        Self {
            min_previous_bytes: 10_000,
            min_ratio: 0.10,
        }
    }
}

impl SizeGuard {
    /// Guard that never rejects.
    pub fn disabled() -> Self {
        Self {
            min_previous_bytes: u64::MAX,
            min_ratio: 0.0,
        }
    }

    /// Whether replacing `previous` bytes with `next` bytes should be refused.
    pub fn rejects(&self, previous: u64, next: u64) -> bool {
        previous > self.min_previous_bytes && (next as f64) < (previous as f64) * self.min_ratio
    }
}

/// Configuration shared by every store opened from the same data root.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root under which `<user>/<language>/` directories live.
    pub data_root: PathBuf,
    /// How long to wait for a file lock or a busy database.
    pub lock_timeout: Duration,
    pub size_guard: SizeGuard,
    /// Hour of day (0-23) when a new study day begins.
    pub daily_reset_hour: u32,
}

impl StoreConfig {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            lock_timeout: Duration::from_secs(5),
            size_guard: SizeGuard::default(),
            daily_reset_hour: 0,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_daily_reset_hour(mut self, hour: u32) -> Self {
        self.daily_reset_hour = hour.min(23);
        self
    }

    /// Directory holding one user's data for one language.
    pub fn journey_dir(&self, user: &str, language: &str) -> PathBuf {
        journey_dir(&self.data_root, user, language)
    }
}

/// `<root>/<user>/<language>` with both identifiers escaped.
pub fn journey_dir(root: &Path, user: &str, language: &str) -> PathBuf {
    root.join(path_component(user)).join(path_component(language))
}

/// Escape an opaque identifier into a single safe path component.
///
/// ASCII alphanumerics, `-` and `_` pass through; every other byte becomes
/// `%XX`, so distinct identifiers never collide and `..` cannot escape.
pub fn path_component(id: &str) -> String {
    if id.is_empty() {
        return "%".to_string();
    }
    let mut out = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

/// Reverse of [`path_component`]. Returns `None` for malformed input.
pub fn decode_path_component(component: &str) -> Option<String> {
    if component == "%" {
        return Some(String::new());
    }
    let bytes = component.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = component.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
