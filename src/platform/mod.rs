use std::path::{Path, PathBuf};

/// Platform-specific filesystem concerns behind a common interface so call
/// sites stay free of `#[cfg]` blocks.
pub trait Platform {
    /// Set restrictive *directory* permissions (0o700 on Unix, no-op on Windows).
    fn restrict_dir_permissions(path: &Path);

    /// Set restrictive *file* permissions (0o600 on Unix, no-op on Windows).
    fn restrict_file_permissions(path: &Path);

    /// Root data directory holding `swarm.db` and `config.toml`.
    /// Unix: `~/.agent-swarm`, Windows: `%APPDATA%\agent-swarm`.
    fn data_dir() -> PathBuf;
}

pub const DATA_DIR_ENV: &str = "SWARM_DATA_DIR";

/// `$SWARM_DATA_DIR` wins over the platform default when set and non-empty.
pub(crate) fn resolve_data_dir(default: PathBuf) -> PathBuf {
    match std::env::var(DATA_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => default,
    }
}

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::NativePlatform;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::NativePlatform;
