//! Directory walker: produces a [`FileIndex`] of [`FileRecord`]s for one
//! side of a sync, hashing only the algorithms the config's identity
//! tuples actually need.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

use crate::hash::Hasher;
use crate::index::FileIndex;
use crate::record::{Attribute, AttrValue, FileRecord};
use crate::snapshot::{HashCacheEntry, STATE_DIR};

#[derive(Error, Debug)]
pub enum WalkError {
    #[error("failed to read directory {0}: {1}")]
    DirectoryRead(String, String),

    #[error("invalid exclude pattern '{0}': {1}")]
    InvalidExclude(String, String),

    #[error(transparent)]
    Index(#[from] crate::index::IndexError),
}

/// Walk `root`, applying `excludes` (shell-glob patterns, same grammar as
/// `.gitignore` overrides) and hashing with every algorithm named in
/// `hash_algorithms`. Always excludes the crate's own state directory.
///
/// `hash_cache` is consulted before hashing each file: a cached entry whose
/// `(path, size, mtime)` matches and which already carries every algorithm
/// in `hash_algorithms` is reused instead of re-reading the file. Pass an
/// empty slice to force a full rehash (e.g. when `use_hash_db` is off).
///
/// `copy_symlinks_as_links` controls how symlinks are seen: when `true` the
/// walker does not follow them, and each symlink is recorded as its own
/// record carrying a `symlink_target` instead of file content; when `false`
/// the walker follows them and a symlinked file is indistinguishable from a
/// regular one.
pub fn walk_tree(
    root: &Path,
    excludes: &[String],
    hash_algorithms: &BTreeSet<String>,
    hash_cache: &[HashCacheEntry],
    copy_symlinks_as_links: bool,
) -> Result<FileIndex, WalkError> {
    let mut overrides = OverrideBuilder::new(root);
    overrides
        .add(&format!("!/{STATE_DIR}/"))
        .map_err(|e| WalkError::InvalidExclude(STATE_DIR.to_string(), e.to_string()))?;
    for pattern in excludes {
        let glob = to_gitignore_override(pattern);
        overrides.add(&glob).map_err(|e| WalkError::InvalidExclude(pattern.clone(), e.to_string()))?;
    }
    let overrides = overrides
        .build()
        .map_err(|e| WalkError::InvalidExclude("(build)".to_string(), e.to_string()))?;

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(false)
        .git_exclude(false)
        .follow_links(!copy_symlinks_as_links)
        .overrides(overrides)
        .build();

    let paths: Mutex<Vec<std::path::PathBuf>> = Mutex::new(Vec::new());
    for entry in walker {
        let entry = entry.map_err(|e| WalkError::DirectoryRead(root.display().to_string(), e.to_string()))?;
        let file_type = entry.file_type();
        let wanted = file_type.map(|t| t.is_file()).unwrap_or(false)
            || (copy_symlinks_as_links && file_type.map(|t| t.is_symlink()).unwrap_or(false));
        if wanted {
            paths.lock().unwrap().push(entry.path().to_path_buf());
        }
    }
    let paths = paths.into_inner().unwrap();

    let cache_by_key: HashMap<(&str, u64, u64), &HashCacheEntry> =
        hash_cache.iter().map(|e| ((e.path.as_str(), e.size, e.mtime.to_bits()), e)).collect();

    let records: Vec<FileRecord> = {
        use rayon::prelude::*;
        let results: Result<Vec<FileRecord>, WalkError> = paths
            .par_iter()
            .map(|path| file_record(root, path, hash_algorithms, &cache_by_key))
            .collect();
        results?
    };

    Ok(FileIndex::from_records(records)?)
}

/// Walk `root` the same way `walk_tree` does, returning the absolute paths
/// of directories that were leaf-empty (no files and no subdirectories
/// survived exclusion) — the `empty_dirs` half of the snapshot store, kept
/// separate from `FileIndex` since `FileRecord` models files, not dirs.
pub fn collect_empty_dirs(root: &Path, excludes: &[String]) -> Result<Vec<String>, WalkError> {
    let mut overrides = OverrideBuilder::new(root);
    overrides
        .add(&format!("!/{STATE_DIR}/"))
        .map_err(|e| WalkError::InvalidExclude(STATE_DIR.to_string(), e.to_string()))?;
    for pattern in excludes {
        let glob = to_gitignore_override(pattern);
        overrides.add(&glob).map_err(|e| WalkError::InvalidExclude(pattern.clone(), e.to_string()))?;
    }
    let overrides = overrides
        .build()
        .map_err(|e| WalkError::InvalidExclude("(build)".to_string(), e.to_string()))?;

    let walker = WalkBuilder::new(root).hidden(false).git_ignore(false).git_exclude(false).overrides(overrides).build();

    let mut dirs: Vec<std::path::PathBuf> = Vec::new();
    let mut occupied_parents: std::collections::BTreeSet<std::path::PathBuf> = std::collections::BTreeSet::new();
    for entry in walker {
        let entry = entry.map_err(|e| WalkError::DirectoryRead(root.display().to_string(), e.to_string()))?;
        if let Some(parent) = entry.path().parent() {
            occupied_parents.insert(parent.to_path_buf());
        }
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) && entry.path() != root {
            dirs.push(entry.path().to_path_buf());
        }
    }

    Ok(dirs
        .into_iter()
        .filter(|d| !occupied_parents.contains(d))
        .map(|d| d.display().to_string())
        .collect())
}

fn file_record(
    root: &Path,
    path: &Path,
    hash_algorithms: &BTreeSet<String>,
    hash_cache: &HashMap<(&str, u64, u64), &HashCacheEntry>,
) -> Result<FileRecord, WalkError> {
    let symlink_meta = path
        .symlink_metadata()
        .map_err(|e| WalkError::DirectoryRead(path.display().to_string(), e.to_string()))?;
    let is_symlink = symlink_meta.file_type().is_symlink();

    // A symlink's own metadata (not the target's) is what identifies it
    // across runs, since the target may be missing or may itself change.
    let metadata = if is_symlink { symlink_meta } else {
        path.metadata().map_err(|e| WalkError::DirectoryRead(path.display().to_string(), e.to_string()))?
    };

    let rel = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/");

    let mut mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    if mtime == 0.0 {
        // A file with no readable mtime sorts as "future" rather than
        // colliding with genuinely untouched files at epoch zero.
        mtime = crate::snapshot::SnapshotStore::now_epoch_secs() + 3600.0;
    }

    let mut rec = FileRecord::new(rel, metadata.len(), mtime);

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        rec.ino = metadata.ino();
    }

    if let Ok(created) = metadata.created() {
        if let Ok(d) = created.duration_since(std::time::UNIX_EPOCH) {
            rec.birthtime = d.as_secs_f64();
        }
    }

    if is_symlink {
        rec.symlink_target = std::fs::read_link(path).ok().map(|t| t.to_string_lossy().replace('\\', "/"));
    }

    if !is_symlink && !hash_algorithms.is_empty() {
        let cached = hash_cache
            .get(&(rec.path.as_str(), rec.size, rec.mtime.to_bits()))
            .filter(|entry| hash_algorithms.iter().all(|a| entry.hashes.contains_key(a)));

        if let Some(entry) = cached {
            for algo in hash_algorithms {
                rec.hashes.insert(algo.clone(), entry.hashes[algo].clone());
            }
        } else {
            let mut hasher = Hasher::new();
            hasher.hash_file(path).map_err(|e| WalkError::DirectoryRead(path.display().to_string(), e.to_string()))?;
            let digest = hasher.finalize().to_string();
            for algo in hash_algorithms {
                rec.hashes.insert(algo.clone(), digest.clone());
            }
        }
    }

    Ok(rec)
}

/// Collect the hash algorithm names a config's identity tuples actually
/// reference, so the walker only hashes what's needed.
pub fn required_hash_algorithms(attr_lists: &[&[Attribute]]) -> BTreeSet<String> {
    let mut set = BTreeSet::new();
    for list in attr_lists {
        for attr in *list {
            if let Attribute::Hash(algo) = attr {
                set.insert(algo.clone());
            }
        }
    }
    set
}

/// Translate the tool's own exclude grammar (`foo/` = dir, `/foo` =
/// root-anchored, else basename-matched glob) into an `ignore` crate
/// override pattern, which already follows `.gitignore` conventions
/// closely enough that only the anchoring needs adjusting.
fn to_gitignore_override(pattern: &str) -> String {
    if pattern.starts_with('/') {
        format!("!{pattern}")
    } else if pattern.ends_with('/') {
        format!("!**/{pattern}**")
    } else {
        format!("!**/{pattern}")
    }
}

/// Build a standalone matcher for the tool's own exclude grammar, usable
/// against a loaded-from-disk snapshot rather than a live directory walk
/// (so `ignore::WalkBuilder`, which only walks, doesn't apply).
///
/// Unlike `to_gitignore_override`, this uses plain (non-negated)
/// `.gitignore` semantics directly, since here a match simply means
/// "excluded" with no whitelist/override inversion involved.
pub fn build_exclude_matcher(root: &Path, excludes: &[String]) -> Result<Gitignore, WalkError> {
    let mut builder = GitignoreBuilder::new(root);
    for pattern in excludes {
        let glob = if pattern.starts_with('/') {
            pattern.clone()
        } else if pattern.ends_with('/') {
            format!("**/{pattern}**")
        } else {
            format!("**/{pattern}")
        };
        builder.add_line(None, &glob).map_err(|e| WalkError::InvalidExclude(pattern.clone(), e.to_string()))?;
    }
    builder.build().map_err(|e| WalkError::InvalidExclude("(build)".to_string(), e.to_string()))
}

/// Drop every record in `index` whose tree-relative path matches the
/// exclude matcher, so a file that's newly excluded from the config
/// doesn't linger in a loaded-from-disk old snapshot and get classified
/// as deleted.
pub fn filter_excluded(index: &mut FileIndex, root: &Path, matcher: &Gitignore) {
    let doomed: Vec<String> = index
        .iter()
        .filter(|rec| {
            let full = root.join(&rec.path);
            matcher.matched(&full, false).is_ignore()
        })
        .map(|rec| rec.path.clone())
        .collect();
    for path in doomed {
        index.remove(&[(Attribute::Path, AttrValue::Str(path))]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn walks_plain_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.txt"), b"world").unwrap();

        let idx = walk_tree(dir.path(), &[], &BTreeSet::new(), &[], false).unwrap();
        assert_eq!(idx.len(), 2);
        assert!(idx.contains_path("a.txt"));
        assert!(idx.contains_path("sub/b.txt"));
    }

    #[test]
    fn excludes_state_dir() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(STATE_DIR)).unwrap();
        fs::write(dir.path().join(STATE_DIR).join("config"), b"x").unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();

        let idx = walk_tree(dir.path(), &[], &BTreeSet::new(), &[], false).unwrap();
        assert_eq!(idx.len(), 1);
        assert!(idx.contains_path("a.txt"));
    }

    #[test]
    fn excludes_glob_pattern() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        fs::write(dir.path().join("b.tmp"), b"scratch").unwrap();

        let idx = walk_tree(dir.path(), &["*.tmp".to_string()], &BTreeSet::new(), &[], false).unwrap();
        assert_eq!(idx.len(), 1);
        assert!(idx.contains_path("a.txt"));
    }

    #[test]
    fn cached_hash_is_reused_when_path_size_mtime_match() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let metadata = fs::metadata(dir.path().join("a.txt")).unwrap();
        let mtime = metadata.modified().unwrap().duration_since(std::time::UNIX_EPOCH).unwrap().as_secs_f64();

        let mut algos = BTreeSet::new();
        algos.insert("content".to_string());

        let cache = vec![HashCacheEntry {
            path: "a.txt".to_string(),
            size: metadata.len(),
            mtime,
            hashes: [("content".to_string(), "stale-but-trusted".to_string())].into_iter().collect(),
        }];

        let idx = walk_tree(dir.path(), &[], &algos, &cache, false).unwrap();
        assert_eq!(idx.get_by_path("a.txt").unwrap().hashes.get("content").unwrap(), "stale-but-trusted");
    }

    #[test]
    fn mismatched_cache_entry_is_rehashed() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();

        let mut algos = BTreeSet::new();
        algos.insert("content".to_string());

        let cache = vec![HashCacheEntry {
            path: "a.txt".to_string(),
            size: 999,
            mtime: 1.0,
            hashes: [("content".to_string(), "stale".to_string())].into_iter().collect(),
        }];

        let idx = walk_tree(dir.path(), &[], &algos, &cache, false).unwrap();
        assert_ne!(idx.get_by_path("a.txt").unwrap().hashes.get("content").unwrap(), "stale");
    }

    #[test]
    #[cfg(unix)]
    fn symlink_is_tracked_as_a_link_when_copy_symlinks_as_links_is_true() {
        use std::os::unix::fs::symlink;

        let dir = tempdir().unwrap();
        fs::write(dir.path().join("target.txt"), b"hello").unwrap();
        symlink("target.txt", dir.path().join("link.txt")).unwrap();

        let idx = walk_tree(dir.path(), &[], &BTreeSet::new(), &[], true).unwrap();
        assert_eq!(idx.len(), 2);
        let link = idx.get_by_path("link.txt").unwrap();
        assert_eq!(link.symlink_target.as_deref(), Some("target.txt"));
        assert!(link.hashes.is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn symlink_is_dereferenced_when_copy_symlinks_as_links_is_false() {
        use std::os::unix::fs::symlink;

        let dir = tempdir().unwrap();
        fs::write(dir.path().join("target.txt"), b"hello").unwrap();
        symlink("target.txt", dir.path().join("link.txt")).unwrap();

        let idx = walk_tree(dir.path(), &[], &BTreeSet::new(), &[], false).unwrap();
        let link = idx.get_by_path("link.txt").unwrap();
        assert_eq!(link.symlink_target, None);
        assert_eq!(link.size, 5);
    }

    #[test]
    fn filter_excluded_drops_matching_old_snapshot_rows() {
        let dir = tempdir().unwrap();
        let mut idx = FileIndex::new();
        idx.insert(FileRecord::new("keep.txt", 10, 1.0)).unwrap();
        idx.insert(FileRecord::new("drop.tmp", 10, 1.0)).unwrap();

        let matcher = build_exclude_matcher(dir.path(), &["*.tmp".to_string()]).unwrap();
        filter_excluded(&mut idx, dir.path(), &matcher);

        assert!(idx.contains_path("keep.txt"));
        assert!(!idx.contains_path("drop.tmp"));
    }

    #[test]
    fn collect_empty_dirs_finds_only_leaf_empty_directories() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        fs::create_dir(dir.path().join("occupied")).unwrap();
        fs::write(dir.path().join("occupied/file.txt"), b"x").unwrap();

        let empty = collect_empty_dirs(dir.path(), &[]).unwrap();
        assert_eq!(empty.len(), 1);
        assert!(empty[0].ends_with("empty"));
    }

    #[test]
    fn required_hash_algorithms_collects_from_attr_lists() {
        let prev = vec![Attribute::Ino, Attribute::Hash("sha1".into())];
        let mv = vec![Attribute::Hash("sha1".into()), Attribute::Birthtime];
        let set = required_hash_algorithms(&[&prev, &mv]);
        assert_eq!(set.len(), 1);
        assert!(set.contains("sha1"));
    }
}
