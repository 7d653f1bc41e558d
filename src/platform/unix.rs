use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use super::Platform;

pub struct NativePlatform;

impl Platform for NativePlatform {
    fn restrict_dir_permissions(path: &Path) {
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700));
    }

    fn restrict_file_permissions(path: &Path) {
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }

    fn default_data_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".blastr"))
    }
}
