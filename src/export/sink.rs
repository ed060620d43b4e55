//! Output media for decoded leaf parts.

use std::fs::{File, OpenOptions, Permissions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{MimeError, Result};
use crate::export::namer::numbered_name;

/// Default permissions of written files: owner read/write, others read.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Destination for decoded parts. One call per leaf.
pub trait PartSink {
    /// Store `data` under `name` and return the name actually used, which
    /// differs from `name` when the medium already holds that name.
    ///
    /// An error means nothing usable was stored.
    fn write_part(&mut self, name: &str, data: &[u8]) -> Result<String>;
}

/// Writes each part as a new regular file in a directory.
///
/// Existing entries are never opened for writing: a taken name is bumped
/// to `stem-N.ext` until a free one is found.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
    mode: u32,
}

impl DirectorySink {
    /// Create the sink, creating `dir` if needed.
    pub fn create(dir: impl Into<PathBuf>, mode: u32) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| MimeError::io(&dir, e))?;
        Ok(Self { dir, mode })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create a file that did not exist before, starting from `name`.
    fn create_unused(&self, name: &str) -> Result<(String, PathBuf, File)> {
        let mut candidate = name.to_string();
        let mut n = 0u64;
        loop {
            let path = self.dir.join(&candidate);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((candidate, path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(path = %path.display(), "Name taken on disk, trying the next one");
                    n += 1;
                    candidate = numbered_name(name, n);
                }
                Err(e) => return Err(MimeError::io(&path, e)),
            }
        }
    }
}

impl PartSink for DirectorySink {
    fn write_part(&mut self, name: &str, data: &[u8]) -> Result<String> {
        let (written_name, path, mut file) = self.create_unused(name)?;
        let written = write_contents(&mut file, data, self.mode);
        drop(file);
        match written {
            Ok(()) => Ok(written_name),
            Err(e) => {
                // the file was created by this call, a half-written one must not stay
                let _ = std::fs::remove_file(&path);
                Err(MimeError::io(&path, e))
            }
        }
    }
}

fn write_contents(file: &mut File, data: &[u8], mode: u32) -> std::io::Result<()> {
    file.write_all(data)?;
    file.flush()?;
    apply_mode(file, mode)
}

#[cfg(unix)]
fn apply_mode(file: &File, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn apply_mode(file: &File, mode: u32) -> std::io::Result<()> {
    let mut permissions: Permissions = file.metadata()?.permissions();
    permissions.set_readonly(mode & 0o200 == 0);
    file.set_permissions(permissions)
}

/// Keeps every part in memory, in write order.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub parts: Vec<(String, Vec<u8>)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content stored under `name`.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data.as_slice())
    }
}

impl PartSink for MemorySink {
    fn write_part(&mut self, name: &str, data: &[u8]) -> Result<String> {
        self.parts.push((name.to_string(), data.to_vec()));
        Ok(name.to_string())
    }
}

/// Accepts and discards everything (dry runs).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl PartSink for NullSink {
    fn write_part(&mut self, name: &str, _data: &[u8]) -> Result<String> {
        Ok(name.to_string())
    }
}
