//! Buffer path listings over the working tree.

use std::path::Path;

use ignore::WalkBuilder;
use quire_types::BufferPath;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::StoreResult;

const GIT_DIR: &str = ".git";

/// Every buffer path at or below `root`, sorted.
///
/// Honors `.gitignore` rules and never descends into `.git`. A `root` that
/// names a single file yields just that path; a missing root yields nothing.
/// Files whose names cannot be buffer paths are logged and skipped.
pub fn walk_buffer_paths(workdir: &Path, root: &BufferPath) -> StoreResult<Vec<BufferPath>> {
    let start = root.to_fs_path(workdir);
    if !start.exists() {
        return Ok(Vec::new());
    }

    let walker = WalkBuilder::new(&start)
        .hidden(false)
        .git_ignore(true)
        .git_exclude(true)
        .git_global(false)
        .require_git(false)
        .filter_entry(|entry| entry.file_name() != GIT_DIR)
        .build();

    let mut paths = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(workdir) else {
            continue;
        };
        match BufferPath::from_relative_fs_path(relative) {
            Ok(path) => paths.push(path),
            Err(e) => warn!(path = %relative.display(), error = %e, "skipping unaddressable file"),
        }
    }
    paths.sort();
    Ok(paths)
}

/// Every buffer path in the working copy.
pub fn list_all_buffer_paths(workdir: &Path) -> StoreResult<Vec<BufferPath>> {
    walk_buffer_paths(workdir, &BufferPath::root())
}

/// Immediate children of `prefix` (files and directories), sorted.
///
/// With `content_substring`, files whose content does not contain the
/// substring are dropped; directories are always kept.
pub fn list_directory(
    workdir: &Path,
    prefix: &BufferPath,
    content_substring: Option<&str>,
) -> StoreResult<Vec<BufferPath>> {
    let dir = prefix.to_fs_path(workdir);
    let mut children = Vec::new();

    for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if name == GIT_DIR {
            continue;
        }
        if let Some(needle) = content_substring {
            if entry.file_type().is_file() {
                let content = std::fs::read(entry.path())?;
                if !String::from_utf8_lossy(&content).contains(needle) {
                    continue;
                }
            }
        }
        match prefix.join(name) {
            Ok(child) => children.push(child),
            Err(e) => warn!(prefix = %prefix, error = %e, "skipping unaddressable entry"),
        }
    }

    children.sort();
    debug!(prefix = %prefix, count = children.len(), "listed directory");
    Ok(children)
}
