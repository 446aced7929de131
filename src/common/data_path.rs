// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use std::path::{Path, PathBuf};

const DATA_DIR_ENV: &str = "DATA_DIR";

fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}

fn env_data_dir() -> Option<String> {
    std::env::var(DATA_DIR_ENV)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve the active data directory: explicit argument, then `DATA_DIR`,
/// then cwd-relative `./data`.
pub fn resolve_data_dir(explicit_data_dir: Option<&str>) -> PathBuf {
    if let Some(dir) = explicit_data_dir
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .or_else(env_data_dir)
    {
        return absolute(PathBuf::from(dir));
    }
    absolute(PathBuf::from("data"))
}

/// Resolve a state/audit file path. Absolute paths pass through; relative
/// paths land under the active data directory.
pub fn resolve_data_path(raw_path: &str, explicit_data_dir: Option<&str>) -> PathBuf {
    let as_path = PathBuf::from(raw_path);
    if as_path.is_absolute() {
        return as_path;
    }
    let rel = Path::new(raw_path)
        .strip_prefix("data")
        .map(PathBuf::from)
        .unwrap_or(as_path);
    resolve_data_dir(explicit_data_dir).join(rel)
}
