//! Rewrites Windows-style interpreter lines in installed console scripts.
//!
//! The installer writes entry-point scripts with the host's interpreter path.
//! When packaging on Windows those point at `python.exe` with CRLF endings;
//! the target runtime is Linux, so they become `#!/usr/bin/env python3`.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{PackageError, PackageResult};

pub const LINUX_PYTHON_SHEBANG: &str = "#!/usr/bin/env python3";

/// Rewrite scripts under `<staging>/bin`. Returns how many files changed.
pub fn rewrite_script_shebangs(staging: &Path) -> PackageResult<usize> {
    let bin = staging.join("bin");
    if !bin.is_dir() {
        return Ok(0);
    }

    let mut rewritten = 0;
    let entries = fs::read_dir(&bin).map_err(|e| PackageError::io(&bin, e))?;
    for entry in entries {
        let path = entry.map_err(|e| PackageError::io(&bin, e))?.path();
        if !path.is_file() {
            continue;
        }
        let bytes = fs::read(&path).map_err(|e| PackageError::io(&path, e))?;
        let Ok(text) = std::str::from_utf8(&bytes) else {
            continue;
        };
        if let Some(fixed) = linux_script(text) {
            fs::write(&path, fixed).map_err(|e| PackageError::io(&path, e))?;
            debug!(script = %path.display(), "rewrote interpreter line");
            rewritten += 1;
        }
    }
    Ok(rewritten)
}

/// The Linux form of `script`, or `None` if it needs no change.
pub fn linux_script(script: &str) -> Option<String> {
    let first = script.lines().next()?;
    if !first.starts_with("#!") {
        return None;
    }
    let windows_style =
        first.contains('\\') || first.to_ascii_lowercase().contains(".exe") || first.ends_with('\r');
    if !windows_style || !first.to_ascii_lowercase().contains("python") {
        return None;
    }

    let rest = script.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
    Some(format!("{LINUX_PYTHON_SHEBANG}\n{}", rest.replace("\r\n", "\n")))
}
