use file_id::FileId;
use std::fs;
use std::path::{Path, PathBuf};

/// Physical identity of a file: its symlink-free path plus the platform
/// file key (device+inode on POSIX, volume serial+file index on Windows).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIdentity {
    pub canonical: Option<PathBuf>,
    pub key: Option<u128>,
}

impl FileIdentity {
    pub fn of(path: &Path) -> Self {
        Self { canonical: fs::canonicalize(path).ok(), key: get_file_key(path) }
    }

    /// True when both identities refer to the same underlying file.
    pub fn same_file(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (&self.canonical, &other.canonical)
            && a == b
        {
            return true;
        }
        matches!((self.key, other.key), (Some(a), Some(b)) if a == b)
    }
}

/// Packs the platform file id into one 128-bit key.
pub fn get_file_key(path: &Path) -> Option<u128> {
    #[cfg(not(any(unix, windows)))]
    {
        let _ = path;
        return None;
    }

    #[cfg(any(unix, windows))]
    {
        let id = {
            #[cfg(unix)]
            {
                file_id::get_file_id(path).ok()?
            }
            #[cfg(windows)]
            {
                file_id::get_high_res_file_id(path).ok()?
            }
        };

        Some(match id {
            FileId::Inode { device_id, inode_number } => ((device_id as u128) << 64) | (inode_number as u128),
            FileId::LowRes { volume_serial_number, file_index } => {
                ((volume_serial_number as u128) << 64) | (file_index as u128)
            }
            FileId::HighRes { volume_serial_number, file_id } => file_id ^ ((volume_serial_number as u128) << 64),
        })
    }
}
