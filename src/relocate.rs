// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Relocation executor
//!
//! Moves one file into a category directory. The destination name never
//! overwrites an existing file: `name.ext` becomes `name (1).ext`,
//! `name (2).ext` and so on, checked against the filesystem each time.
//!
//! Files are committed under their final name with a hard link followed by
//! removal of the old name, so a name claimed by someone else in the
//! meantime is never replaced. A plain rename is tried first. When that is
//! not possible (another filesystem, or [`TransferMode::Copy`]) the file is
//! streamed into a hidden staging file next to the destination, verified by
//! length (and BLAKE3 digest when enabled), committed the same way, and only
//! then is the source deleted. A failed copy removes the staging file and never touches the
//! source.
//!
//! Errors never escape [`Relocator::relocate`]; they become a
//! [`TransferOutcome`].

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Upper bound on `name (n).ext` attempts
const MAX_COLLISION_SUFFIX: u32 = 10_000;

const COPY_BUFFER_SIZE: usize = 256 * 1024;

const STAGING_SUFFIX: &str = ".partial";

/// How files are transferred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    /// Rename, falling back to copy+verify+delete
    #[default]
    Auto,
    /// Always copy+verify+delete
    Copy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMethod {
    Renamed,
    Copied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    DestinationUnwritable,
    Verification,
    Io,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransferStatus {
    Success { method: TransferMethod },
    Skipped { reason: String },
    Failed { kind: FailureKind, reason: String },
}

/// Result of one relocation
#[derive(Debug, Clone, Serialize)]
pub struct TransferOutcome {
    pub source: PathBuf,
    /// Final path on success, the target directory otherwise
    pub destination: PathBuf,
    pub category: Option<String>,
    #[serde(flatten)]
    pub status: TransferStatus,
    pub timestamp: DateTime<Local>,
}

impl TransferOutcome {
    pub fn new(source: PathBuf, destination: PathBuf, status: TransferStatus) -> Self {
        Self {
            source,
            destination,
            category: None,
            status,
            timestamp: Local::now(),
        }
    }

    pub fn failed(source: PathBuf, destination: PathBuf, kind: FailureKind, reason: String) -> Self {
        Self::new(source, destination, TransferStatus::Failed { kind, reason })
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, TransferStatus::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, TransferStatus::Failed { .. })
    }

    pub fn file_name(&self) -> Cow<'_, str> {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| self.source.to_string_lossy())
    }
}

impl fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let timestamp = self.timestamp.format("%Y-%m-%d %H:%M:%S");
        match &self.status {
            TransferStatus::Success { method } => {
                let how = match method {
                    TransferMethod::Renamed => "renamed",
                    TransferMethod::Copied => "copied",
                };
                write!(
                    f,
                    "{} | moved '{}' to '{}' ({})",
                    timestamp,
                    self.file_name(),
                    self.destination.display(),
                    how
                )
            }
            TransferStatus::Skipped { reason } => {
                write!(f, "{} | skipped '{}': {}", timestamp, self.file_name(), reason)
            }
            TransferStatus::Failed { reason, .. } => write!(
                f,
                "{} | error moving '{}' to '{}': {}",
                timestamp,
                self.file_name(),
                self.destination.display(),
                reason
            ),
        }
    }
}

/// Internal failure taxonomy, converted to a [`TransferStatus`] at the boundary
#[derive(Error, Debug)]
pub enum RelocateError {
    #[error("source vanished before it could be moved")]
    SourceMissing,

    #[error("source is not a regular file")]
    NotAFile,

    #[error("source has no file name")]
    NoFileName,

    #[error("destination unwritable ({}): {source}", .path.display())]
    DestinationUnwritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no free name for {} after {attempts} attempts", .candidate.display())]
    NoFreeName { candidate: PathBuf, attempts: u32 },

    #[error("copy verification failed: {0}")]
    Verification(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl RelocateError {
    fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn status(&self) -> TransferStatus {
        let reason = self.to_string();
        match self {
            Self::SourceMissing | Self::NotAFile | Self::NoFileName => {
                TransferStatus::Skipped { reason }
            }
            Self::DestinationUnwritable { .. } | Self::NoFreeName { .. } => TransferStatus::Failed {
                kind: FailureKind::DestinationUnwritable,
                reason,
            },
            Self::Verification(_) => TransferStatus::Failed {
                kind: FailureKind::Verification,
                reason,
            },
            Self::Io { .. } => TransferStatus::Failed {
                kind: FailureKind::Io,
                reason,
            },
        }
    }
}

/// Errors writing at the destination that mean "cannot write there"
fn is_unwritable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::PermissionDenied
            | io::ErrorKind::StorageFull
            | io::ErrorKind::ReadOnlyFilesystem
    )
}

fn destination_error(path: &Path, err: io::Error) -> RelocateError {
    if is_unwritable(&err) {
        RelocateError::DestinationUnwritable {
            path: path.to_path_buf(),
            source: err,
        }
    } else {
        RelocateError::io(format!("failed writing {}", path.display()), err)
    }
}

fn source_error(path: &Path, err: io::Error) -> RelocateError {
    if err.kind() == io::ErrorKind::NotFound {
        RelocateError::SourceMissing
    } else {
        RelocateError::io(format!("failed reading {}", path.display()), err)
    }
}

/// First free path for `file_name` in `dir`
///
/// Tries `file_name`, then `stem (1).ext`, `stem (2).ext`, ... Every
/// candidate is checked on disk; broken symlinks count as taken.
pub fn unique_destination(dir: &Path, file_name: &OsStr) -> Result<PathBuf, RelocateError> {
    let first = dir.join(file_name);
    if is_free(&first)? {
        return Ok(first);
    }

    let name = Path::new(file_name);
    let stem = name.file_stem().unwrap_or(file_name);
    let extension = name.extension();

    for n in 1..=MAX_COLLISION_SUFFIX {
        let candidate = dir.join(numbered_name(stem, extension, n));
        if is_free(&candidate)? {
            return Ok(candidate);
        }
    }

    Err(RelocateError::NoFreeName {
        candidate: first,
        attempts: MAX_COLLISION_SUFFIX,
    })
}

fn numbered_name(stem: &OsStr, extension: Option<&OsStr>, n: u32) -> OsString {
    let mut name = stem.to_os_string();
    name.push(format!(" ({})", n));
    if let Some(ext) = extension {
        name.push(".");
        name.push(ext);
    }
    name
}

fn is_free(path: &Path) -> Result<bool, RelocateError> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(destination_error(path, e)),
    }
}

enum PlaceError {
    Naming(RelocateError),
    Io { path: PathBuf, err: io::Error },
}

/// Move `from` to the first free name for `file_name` in `dir`
///
/// A hard link fails with `AlreadyExists` when the name was claimed after it
/// was checked, so the next candidate is tried instead of replacing the
/// newcomer. Filesystems without hard links fall back to a rename.
fn place_without_clobber(from: &Path, dir: &Path, file_name: &OsStr) -> Result<PathBuf, PlaceError> {
    for _ in 0..MAX_COLLISION_SUFFIX {
        let candidate = unique_destination(dir, file_name).map_err(PlaceError::Naming)?;

        match fs::hard_link(from, &candidate) {
            Ok(()) => match fs::remove_file(from) {
                Ok(()) => return Ok(candidate),
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(candidate),
                Err(e) => {
                    if let Err(cleanup) = fs::remove_file(&candidate) {
                        warn!("Failed to remove link {:?} after error: {}", candidate, cleanup);
                    }
                    return Err(PlaceError::Io {
                        path: from.to_path_buf(),
                        err: e,
                    });
                }
            },
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!("{:?} was taken concurrently, trying the next name", candidate);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(PlaceError::Io { path: candidate, err: e });
            }
            Err(e) => {
                debug!("Hard link to {:?} unavailable ({}), renaming", candidate, e);
                return match fs::rename(from, &candidate) {
                    Ok(()) => Ok(candidate),
                    Err(err) => Err(PlaceError::Io { path: candidate, err }),
                };
            }
        }
    }

    Err(PlaceError::Naming(RelocateError::NoFreeName {
        candidate: dir.join(file_name),
        attempts: MAX_COLLISION_SUFFIX,
    }))
}

/// Staging file that is deleted on drop unless committed
struct Staging {
    path: PathBuf,
    armed: bool,
}

impl Staging {
    /// Create a hidden, never-before-used staging file next to the destination
    fn create(dir: &Path, file_name: &OsStr) -> Result<(Self, File), RelocateError> {
        let pid = std::process::id();
        for attempt in 0..MAX_COLLISION_SUFFIX {
            let mut name = OsString::from(".");
            name.push(file_name);
            name.push(format!(".{}-{}{}", pid, attempt, STAGING_SUFFIX));
            let path = dir.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((Self { path, armed: true }, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(destination_error(&path, e)),
            }
        }
        Err(RelocateError::NoFreeName {
            candidate: dir.join(file_name),
            attempts: MAX_COLLISION_SUFFIX,
        })
    }

    fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed partial copy {:?}", self.path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove partial copy {:?}: {}", self.path, e),
        }
    }
}

/// Moves single files into directories
#[derive(Debug, Clone, Default)]
pub struct Relocator {
    mode: TransferMode,
    verify_hash: bool,
}

impl Relocator {
    pub fn new(mode: TransferMode, verify_hash: bool) -> Self {
        Self { mode, verify_hash }
    }

    pub fn mode(&self) -> TransferMode {
        self.mode
    }

    /// Move `source` into `destination_dir`, creating the directory if needed
    pub fn relocate(&self, source: &Path, destination_dir: &Path) -> TransferOutcome {
        match self.try_relocate(source, destination_dir) {
            Ok((destination, method)) => TransferOutcome::new(
                source.to_path_buf(),
                destination,
                TransferStatus::Success { method },
            ),
            Err(e) => {
                debug!("Relocation of {:?} did not complete: {}", source, e);
                TransferOutcome::new(source.to_path_buf(), destination_dir.to_path_buf(), e.status())
            }
        }
    }

    fn try_relocate(
        &self,
        source: &Path,
        destination_dir: &Path,
    ) -> Result<(PathBuf, TransferMethod), RelocateError> {
        let file_name = source.file_name().ok_or(RelocateError::NoFileName)?;

        let metadata = fs::metadata(source).map_err(|e| source_error(source, e))?;
        if !metadata.is_file() {
            return Err(RelocateError::NotAFile);
        }

        // create_dir_all tolerates the directory appearing concurrently
        fs::create_dir_all(destination_dir)
            .map_err(|e| destination_error(destination_dir, e))?;

        if self.mode == TransferMode::Auto {
            match place_without_clobber(source, destination_dir, file_name) {
                Ok(destination) => return Ok((destination, TransferMethod::Renamed)),
                Err(PlaceError::Naming(e)) => return Err(e),
                Err(PlaceError::Io { err, .. })
                    if err.kind() == io::ErrorKind::NotFound && !source.exists() =>
                {
                    return Err(RelocateError::SourceMissing);
                }
                Err(PlaceError::Io { path, err }) => {
                    debug!("Rename {:?} -> {:?} failed ({}), copying instead", source, path, err);
                }
            }
        }

        let reader = File::open(source).map_err(|e| source_error(source, e))?;
        self.copy_then_delete(source, reader, destination_dir, file_name)
    }

    /// Copy `reader` (the contents of `source`) into `destination_dir`, then
    /// delete `source`
    fn copy_then_delete<R: Read>(
        &self,
        source: &Path,
        mut reader: R,
        destination_dir: &Path,
        file_name: &OsStr,
    ) -> Result<(PathBuf, TransferMethod), RelocateError> {
        let (staging, file) = Staging::create(destination_dir, file_name)?;

        let mut writer = BufWriter::with_capacity(COPY_BUFFER_SIZE, file);
        let copied = stream_copy(&mut reader, &mut writer, source, &staging.path)?;

        writer.flush().map_err(|e| destination_error(&staging.path, e))?;
        let file = writer
            .into_inner()
            .map_err(|e| destination_error(&staging.path, e.into_error()))?;
        file.sync_all()
            .map_err(|e| destination_error(&staging.path, e))?;
        drop(file);

        self.verify(source, &staging.path, copied)?;

        let destination = match place_without_clobber(&staging.path, destination_dir, file_name) {
            Ok(destination) => destination,
            Err(PlaceError::Naming(e)) => return Err(e),
            Err(PlaceError::Io { path, err }) => return Err(destination_error(&path, err)),
        };
        staging.commit();

        match fs::remove_file(source) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Source {:?} was removed by someone else during copy", source);
            }
            Err(e) => {
                // Keep a single visible copy: the untouched source
                if let Err(cleanup) = fs::remove_file(&destination) {
                    warn!("Failed to remove copy {:?} after error: {}", destination, cleanup);
                }
                return Err(RelocateError::io(
                    format!("copied but could not remove source {}", source.display()),
                    e,
                ));
            }
        }

        Ok((destination, TransferMethod::Copied))
    }

    fn verify(
        &self,
        source: &Path,
        staged: &Path,
        copied: u64,
    ) -> Result<(), RelocateError> {
        let source_len = fs::metadata(source)
            .map_err(|e| source_error(source, e))?
            .len();
        if copied != source_len {
            return Err(RelocateError::Verification(format!(
                "copied {} bytes but source has {}",
                copied, source_len
            )));
        }

        let staged_len = fs::metadata(staged)
            .map_err(|e| destination_error(staged, e))?
            .len();
        if staged_len != source_len {
            return Err(RelocateError::Verification(format!(
                "destination has {} bytes, expected {}",
                staged_len, source_len
            )));
        }

        if self.verify_hash {
            let expected = hash_file(source).map_err(|e| source_error(source, e))?;
            let actual = hash_file(staged).map_err(|e| destination_error(staged, e))?;
            if expected != actual {
                return Err(RelocateError::Verification(format!(
                    "digest mismatch: expected {}, got {}",
                    expected.to_hex(),
                    actual.to_hex()
                )));
            }
        }

        Ok(())
    }
}

fn stream_copy<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    source: &Path,
    staged: &Path,
) -> Result<u64, RelocateError> {
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(source_error(source, e)),
        };
        writer
            .write_all(&buf[..n])
            .map_err(|e| destination_error(staged, e))?;
        total += n as u64;
    }
    Ok(total)
}

fn hash_file(path: &Path) -> io::Result<blake3::Hash> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize())
}
