use std::path::{Path, PathBuf};

use super::Platform;

pub struct NativePlatform;

impl Platform for NativePlatform {
    fn restrict_dir_permissions(_path: &Path) {
        // Windows uses ACLs; no simple equivalent to Unix mode bits.
    }

    fn restrict_file_permissions(_path: &Path) {
        // Windows uses ACLs; no simple equivalent to Unix mode bits.
    }

    fn default_data_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|appdata| appdata.join("blastr"))
    }
}
