// Local-file byte stream

use crate::ByteStream;
use brook_core::{PlayerError, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Byte stream over a local file. Length is known up front from metadata;
/// `reconnect` is a plain seek.
pub struct FileByteStream {
    path: PathBuf,
    file: File,
    length: u64,
}

impl FileByteStream {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| {
            PlayerError::FileSystem(format!("failed to open {}: {}", path.display(), e))
        })?;
        let length = file
            .metadata()
            .map_err(|e| {
                PlayerError::FileSystem(format!("failed to stat {}: {}", path.display(), e))
            })?
            .len();
        log::debug!("opened {} ({} bytes)", path.display(), length);
        Ok(Self { path, file, length })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteStream for FileByteStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.file.read(buf).map_err(|e| {
            PlayerError::FileSystem(format!("read from {} failed: {}", self.path.display(), e))
        })
    }

    fn length(&self) -> Option<u64> {
        Some(self.length)
    }

    fn reconnect(&mut self, offset: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset)).map_err(|e| {
            PlayerError::FileSystem(format!("seek in {} failed: {}", self.path.display(), e))
        })?;
        Ok(())
    }
}
