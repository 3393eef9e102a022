//! Staging directories and size-bounded zip artifacts.
//!
//! Archives are deterministic: entries go in sorted path order with a fixed
//! timestamp, so the same staged tree always yields the same bytes.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{PackageError, PackageResult};

/// Hard ceiling for a deployable code artifact (250 MiB).
pub const MAX_ARTIFACT_BYTES: u64 = 250 * 1024 * 1024;

/// Directory and file names never copied into staging.
const SKIPPED_NAMES: &[&str] = &[
    ".git",
    ".venv",
    "__pycache__",
    "node_modules",
    ".agentcore",
    ".pytest_cache",
    ".mypy_cache",
];

/// Output of a successful pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactResult {
    pub artifact_path: PathBuf,
    pub size_bytes: u64,
    pub staging_path: PathBuf,
    /// SHA-256 of the artifact bytes, hex encoded.
    pub sha256: String,
}

/// Stages a directory, zips it, and enforces the size ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveBuilder {
    limit_bytes: u64,
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self {
            limit_bytes: MAX_ARTIFACT_BYTES,
        }
    }
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit_bytes: u64) -> Self {
        Self { limit_bytes }
    }

    pub fn limit_bytes(&self) -> u64 {
        self.limit_bytes
    }

    /// Remove `dir` entirely and recreate it empty.
    pub fn reset_dir(&self, dir: &Path) -> PackageResult<()> {
        match fs::remove_dir_all(dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(PackageError::io(dir, e)),
        }
        fs::create_dir_all(dir).map_err(|e| PackageError::io(dir, e))
    }

    /// Copy `src` into `dst`, skipping build caches, VCS metadata, compiled
    /// bytecode, and anything under `dst` itself. Returns the number of files copied.
    pub fn copy_tree(&self, src: &Path, dst: &Path) -> PackageResult<u64> {
        if !src.is_dir() {
            return Err(PackageError::MissingProjectFile {
                path: src.to_path_buf(),
            });
        }
        let mut copied = 0u64;
        let walker = WalkDir::new(src)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_skipped(entry.path(), dst));

        for entry in walker {
            let entry = entry?;
            let rel = match entry.path().strip_prefix(src) {
                Ok(rel) if !rel.as_os_str().is_empty() => rel,
                _ => continue,
            };
            let target = dst.join(rel);
            let file_type = entry.file_type();
            if file_type.is_dir() {
                fs::create_dir_all(&target).map_err(|e| PackageError::io(&target, e))?;
            } else if file_type.is_file() || entry.path().is_file() {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(|e| PackageError::io(parent, e))?;
                }
                fs::copy(entry.path(), &target).map_err(|e| PackageError::io(entry.path(), e))?;
                copied += 1;
            } else {
                debug!(path = %entry.path().display(), "skipping non-file entry");
            }
        }
        Ok(copied)
    }

    /// Zip the contents of `dir` (not `dir` itself) into `out`.
    pub fn zip_dir(&self, dir: &Path, out: &Path) -> PackageResult<()> {
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent).map_err(|e| PackageError::io(parent, e))?;
        }
        let file = File::create(out).map_err(|e| PackageError::io(out, e))?;
        let mut zip = ZipWriter::new(BufWriter::new(file));
        let base = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default());

        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry?;
            let rel = match entry.path().strip_prefix(dir) {
                Ok(rel) if !rel.as_os_str().is_empty() => rel,
                _ => continue,
            };
            let name = zip_name(rel);
            if entry.file_type().is_dir() {
                zip.add_directory(format!("{name}/"), base.unix_permissions(0o755))?;
            } else if entry.path().is_file() {
                let mode = file_mode(entry.path());
                zip.start_file(name, base.unix_permissions(mode))?;
                let mut source =
                    File::open(entry.path()).map_err(|e| PackageError::io(entry.path(), e))?;
                io::copy(&mut source, &mut zip).map_err(|e| PackageError::io(entry.path(), e))?;
            }
        }

        let mut writer = zip.finish()?;
        io::Write::flush(&mut writer).map_err(|e| PackageError::io(out, e))?;
        Ok(())
    }

    /// Size of `artifact`, failing if it exceeds the ceiling.
    pub fn enforce_limit(&self, artifact: &Path) -> PackageResult<u64> {
        let actual = fs::metadata(artifact)
            .map_err(|e| PackageError::io(artifact, e))?
            .len();
        if actual > self.limit_bytes {
            return Err(PackageError::ArtifactTooLarge {
                limit: self.limit_bytes,
                actual,
            });
        }
        Ok(actual)
    }

    /// Zip `staging` to `artifact`, measure it, and fingerprint it.
    pub fn build(&self, staging: &Path, artifact: &Path) -> PackageResult<ArtifactResult> {
        self.zip_dir(staging, artifact)?;
        let size_bytes = self.enforce_limit(artifact)?;
        let sha256 = sha256_file(artifact)?;
        Ok(ArtifactResult {
            artifact_path: artifact.to_path_buf(),
            size_bytes,
            staging_path: staging.to_path_buf(),
            sha256,
        })
    }
}

fn is_skipped(path: &Path, staging: &Path) -> bool {
    if path.starts_with(staging) {
        return true;
    }
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    SKIPPED_NAMES.contains(&name) || name.ends_with(".pyc")
}

fn zip_name(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(unix)]
fn file_mode(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o777)
        .unwrap_or(0o644)
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> u32 {
    0o644
}

fn sha256_file(path: &Path) -> PackageResult<String> {
    let mut file = File::open(path).map_err(|e| PackageError::io(path, e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| PackageError::io(path, e))?;
    Ok(hex::encode(hasher.finalize()))
}
