use std::path::{Path, PathBuf};

pub const DATA_DIR_ENV: &str = "BLASTR_DATA_DIR";

/// Platform-specific operations abstracted behind a common interface.
/// Each OS provides its own `NativePlatform` implementation so call sites
/// remain free of `#[cfg]` blocks.
pub trait Platform {
    /// Set restrictive *directory* permissions (0o700 on Unix, no-op on Windows).
    fn restrict_dir_permissions(path: &Path);

    /// Set restrictive *file* permissions (0o600 on Unix, no-op on Windows).
    fn restrict_file_permissions(path: &Path);

    /// Conventional home for blastr state when no override is set.
    /// Unix: `~/.blastr`, Windows: `%APPDATA%\blastr`.
    fn default_data_dir() -> Option<PathBuf>;

    /// Root data directory: `$BLASTR_DATA_DIR`, else the platform default,
    /// else `./.blastr`.
    fn data_dir() -> PathBuf {
        resolve_data_dir(
            std::env::var_os(DATA_DIR_ENV).map(PathBuf::from),
            Self::default_data_dir(),
        )
    }
}

pub fn resolve_data_dir(env_override: Option<PathBuf>, default: Option<PathBuf>) -> PathBuf {
    env_override
        .filter(|p| !p.as_os_str().is_empty())
        .or(default)
        .unwrap_or_else(|| PathBuf::from(".blastr"))
}

/// Creates the data directory (owner-only on unix) and returns it.
pub fn ensure_data_dir() -> std::io::Result<PathBuf> {
    let dir = NativePlatform::data_dir();
    std::fs::create_dir_all(&dir)?;
    NativePlatform::restrict_dir_permissions(&dir);
    Ok(dir)
}

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::NativePlatform;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::NativePlatform;
