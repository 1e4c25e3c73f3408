//! Sync driver: orchestrates a full run — walk, load, classify, reconcile,
//! apply, transfer, persist — across the six CLI-exposed modes.

use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

use crate::apply::{ApplyError, LocalApplier, TransferAdapter};
use crate::classify::classify;
use crate::config::Config;
use crate::index::FileIndex;
use crate::log::Logger;
use crate::reconcile::reconcile;
use crate::snapshot::{hash_cache_from_index, timestamp_now, SnapshotError, SnapshotStore};
use crate::walk::{build_exclude_matcher, collect_empty_dirs, filter_excluded, required_hash_algorithms, walk_tree, WalkError};

#[derive(Error, Debug)]
pub enum DriverError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Walk(#[from] WalkError),
    #[error(transparent)]
    Apply(#[from] ApplyError),
    #[error("hook command failed: {0}")]
    Hook(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Sync,
    Push { all: bool },
    Pull { all: bool },
}

pub struct RunOptions {
    pub mode: Mode,
    pub dry_run: bool,
    pub backup_override: Option<bool>,
}

pub struct RunReport {
    pub moved_a: usize,
    pub moved_b: usize,
    pub deleted_a: usize,
    pub deleted_b: usize,
    pub transferred_a2b: usize,
    pub transferred_b2a: usize,
    pub diagnostics: Vec<String>,
}

/// Run one full sync over `root_a` (the local path) with `config`
/// describing `path_b` (a local peer path; remote transport is modeled by
/// `SshRsyncAdapter` but this driver only wires up the local case, since
/// that's the part of the contract the core crate can exercise end to end).
pub fn run(root_a: &Path, config: &Config, opts: &RunOptions, log: &Logger) -> Result<RunReport, DriverError> {
    run_hook(root_a, &config.pre_sync_bash, log)?;

    let store_a = SnapshotStore::new(root_a);
    let path_b = PathBuf::from(&config.path_b);
    let store_b = SnapshotStore::new(&path_b);

    let hash_algos = required_hash_algorithms(&[
        &config.prev_attributes_a,
        &config.move_attributes_a,
        &config.prev_attributes_b,
        &config.move_attributes_b,
    ]);

    let hash_cache_a = if config.use_hash_db { store_a.load_hash_db()? } else { Vec::new() };
    let hash_cache_b = if config.use_hash_db { store_b.load_hash_db()? } else { Vec::new() };

    log.section("Scanning both sides");
    let (mut new_a, mut new_b) = std::thread::scope(|scope| {
        let a_handle = scope.spawn(|| walk_tree(root_a, &config.excludes, &hash_algos, &hash_cache_a, config.copy_symlinks_as_links));
        let b_handle = scope.spawn(|| walk_tree(&path_b, &config.excludes, &hash_algos, &hash_cache_b, config.copy_symlinks_as_links));
        (a_handle.join().expect("walk thread A panicked"), b_handle.join().expect("walk thread B panicked"))
    });
    let mut new_a = new_a?;
    let mut new_b = new_b?;

    let mut old_a = store_a.load_side("A")?;
    let mut old_b = store_b.load_side("B")?;
    let last_run = store_a.load_last_run()?;

    // A path newly named in `excludes` since the last run must not surface
    // as a delete: drop it from the loaded snapshot too, not just the live
    // walk, so it's invisible to classification on both sides.
    let exclude_matcher_a = build_exclude_matcher(root_a, &config.excludes)?;
    let exclude_matcher_b = build_exclude_matcher(&path_b, &config.excludes)?;
    filter_excluded(&mut old_a, root_a, &exclude_matcher_a);
    filter_excluded(&mut old_b, &path_b, &exclude_matcher_b);

    apply_mode_transform(opts.mode, &mut new_a, &mut new_b, &old_a, &old_b);

    log.section("Classifying changes");
    let report_a = classify(&mut old_a, &mut new_a, &config.prev_attributes_a, &config.move_attributes_a);
    let report_b = classify(&mut old_b, &mut new_b, &config.prev_attributes_b, &config.move_attributes_b);
    for dup in report_a.duplicates.iter().chain(report_b.duplicates.iter()) {
        log.warn(format!("ambiguous identity on attributes {:?} at '{}': first match wins", dup.attrs, dup.path));
    }
    for hint in report_a.rename_hints.iter().chain(report_b.rename_hints.iter()) {
        log.info(format!(
            "'{}' is new; did you mean '{}' (similarity {:.2})?",
            hint.new_path, hint.old_path, hint.score
        ));
    }

    let mut effective_config = config.clone();
    if let Some(b) = opts.backup_override {
        effective_config.backup = b;
    }
    if matches!(opts.mode, Mode::Push { all: true } | Mode::Pull { all: true }) {
        effective_config.mod_conflict = crate::config::ModConflict::Newer;
    }

    log.section("Reconciling");
    let recon = reconcile(&mut new_a, &mut new_b, &old_a, &old_b, last_run, &effective_config);
    for diag in &recon.diagnostics {
        log.warn(diag);
    }

    let report = RunReport {
        moved_a: recon.queue_a.iter().filter(|a| matches!(a, crate::reconcile::Action::Move { .. })).count(),
        moved_b: recon.queue_b.iter().filter(|a| matches!(a, crate::reconcile::Action::Move { .. })).count(),
        deleted_a: recon.queue_a.iter().filter(|a| matches!(a, crate::reconcile::Action::Delete { .. })).count(),
        deleted_b: recon.queue_b.iter().filter(|a| matches!(a, crate::reconcile::Action::Delete { .. })).count(),
        transferred_a2b: recon.transfer_a2b.len(),
        transferred_b2a: recon.transfer_b2a.len(),
        diagnostics: recon.diagnostics.clone(),
    };

    if opts.dry_run {
        log.info("Dry run: no changes applied");
        return Ok(report);
    }

    let run_ts = timestamp_now();
    let applier_a = LocalApplier::new(root_a, effective_config.backup, run_ts.clone());
    let applier_b = LocalApplier::new(&path_b, effective_config.backup, run_ts);

    log.section("Applying queues");
    applier_a.apply_queue(&recon.queue_a)?;
    applier_b.apply_queue(&recon.queue_b)?;

    log.section("Transferring files");
    applier_b.transfer(root_a, &recon.transfer_b2a, &recon.transfer_a2b)?;

    store_a.save_side("A", &new_a)?;
    store_b.save_side("B", &new_b)?;
    store_a.save_last_run(SnapshotStore::now_epoch_secs())?;
    store_a.save_empty_dirs(&collect_empty_dirs(root_a, &config.excludes)?)?;
    store_b.save_empty_dirs(&collect_empty_dirs(&path_b, &config.excludes)?)?;
    if config.use_hash_db {
        store_a.save_hash_db(&hash_cache_from_index(&new_a))?;
        store_b.save_hash_db(&hash_cache_from_index(&new_b))?;
    }

    run_hook(root_a, &config.post_sync_bash, log)?;

    Ok(report)
}

/// `push`/`pull` pretend one side is unchanged before classification, so
/// every difference propagates as a one-directional transfer instead of
/// being reconciled bidirectionally.
fn apply_mode_transform(mode: Mode, new_a: &mut FileIndex, new_b: &mut FileIndex, old_a: &FileIndex, old_b: &FileIndex) {
    match mode {
        Mode::Sync => {},
        Mode::Push { all } => {
            *new_b = clone_index(old_b);
            if all {
                touch_all_mtimes(new_a);
            }
        },
        Mode::Pull { all } => {
            *new_a = clone_index(old_a);
            if all {
                touch_all_mtimes(new_b);
            }
        },
    }
}

fn clone_index(idx: &FileIndex) -> FileIndex {
    FileIndex::from_records(idx.iter().cloned().collect()).expect("cloned index has no duplicate paths")
}

fn touch_all_mtimes(idx: &mut FileIndex) {
    let now = SnapshotStore::now_epoch_secs();
    for rec in idx.iter_mut() {
        rec.mtime = now;
    }
}

pub fn reset(root_a: &Path, config: &Config, backup: bool, log: &Logger) -> Result<(), DriverError> {
    let store_a = SnapshotStore::new(root_a);
    let path_b = PathBuf::from(&config.path_b);
    let store_b = SnapshotStore::new(&path_b);

    let hash_algos = required_hash_algorithms(&[
        &config.prev_attributes_a,
        &config.move_attributes_a,
        &config.prev_attributes_b,
        &config.move_attributes_b,
    ]);

    let hash_cache_a = if config.use_hash_db { store_a.load_hash_db()? } else { Vec::new() };
    let hash_cache_b = if config.use_hash_db { store_b.load_hash_db()? } else { Vec::new() };

    let new_a = walk_tree(root_a, &config.excludes, &hash_algos, &hash_cache_a, config.copy_symlinks_as_links)?;
    let new_b = walk_tree(&path_b, &config.excludes, &hash_algos, &hash_cache_b, config.copy_symlinks_as_links)?;

    if backup {
        let ts = timestamp_now();
        store_a.backup_side_snapshot("A", &ts)?;
        store_b.backup_side_snapshot("B", &ts)?;
    }

    store_a.save_side("A", &new_a)?;
    store_b.save_side("B", &new_b)?;
    store_a.save_last_run(SnapshotStore::now_epoch_secs())?;
    store_a.save_empty_dirs(&collect_empty_dirs(root_a, &config.excludes)?)?;
    store_b.save_empty_dirs(&collect_empty_dirs(&path_b, &config.excludes)?)?;
    if config.use_hash_db {
        store_a.save_hash_db(&hash_cache_from_index(&new_a))?;
        store_b.save_hash_db(&hash_cache_from_index(&new_b))?;
    }

    log.info(format!("Reset tracking: {} files on A, {} files on B", new_a.len(), new_b.len()));
    Ok(())
}

pub fn init(root_a: &Path, config: &Config) -> Result<(), DriverError> {
    let store_a = SnapshotStore::new(root_a);
    store_a.init()?;
    std::fs::write(store_a.config_path(), config.to_template())
        .map_err(|source| SnapshotError::Write { path: store_a.config_path().display().to_string(), source })?;

    // A local peer path needs its own state directory too, since `run`
    // and `reset` write snapshots directly under it. A remote peer
    // reached through `SshRsyncAdapter` sets this up on its own side.
    let path_b = PathBuf::from(&config.path_b);
    if path_b.is_dir() {
        SnapshotStore::new(&path_b).init()?;
    }

    Ok(())
}

fn run_hook(root: &Path, script: &str, log: &Logger) -> Result<(), DriverError> {
    if script.trim().is_empty() {
        return Ok(());
    }
    log.info(format!("Running hook: {script}"));
    let status = Command::new("bash")
        .arg("-c")
        .arg(script)
        .current_dir(root)
        .status()
        .map_err(|e| DriverError::Hook(e.to_string()))?;
    if !status.success() {
        return Err(DriverError::Hook(format!("hook exited with {status}")));
    }
    Ok(())
}
