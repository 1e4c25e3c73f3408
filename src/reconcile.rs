//! Reconciler: turns two independently classified indices into per-side
//! action queues and a pair of transfer lists.
//!
//! Runs in three phases, in order: deletions, moves (applied theoretically
//! to the in-memory indices as they're decided), then transfers.

use std::collections::BTreeSet;

use crate::config::{Config, ModConflict, MoveConflict};
use crate::index::FileIndex;
use crate::record::{AttrValue, Attribute};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Action {
    Move { src: String, dst: String },
    Backup { path: String },
    Delete { path: String },
}

#[derive(Debug, Default)]
pub struct Reconciliation {
    pub queue_a: Vec<Action>,
    pub queue_b: Vec<Action>,
    pub transfer_a2b: Vec<String>,
    pub transfer_b2a: Vec<String>,
    pub diagnostics: Vec<String>,
}

/// Run all three reconciliation phases. `new_a`/`new_b` are mutated in
/// place to reflect theoretically-applied moves; `old_a`/`old_b` carry the
/// previous run's `deleted` flags computed by `classify`.
pub fn reconcile(
    new_a: &mut FileIndex,
    new_b: &mut FileIndex,
    old_a: &FileIndex,
    old_b: &FileIndex,
    last_run: f64,
    config: &Config,
) -> Reconciliation {
    let mut r = Reconciliation::default();

    phase1_deletions(new_a, new_b, old_a, config, Side::A, &mut r);
    phase1_deletions(new_b, new_a, old_b, config, Side::B, &mut r);

    phase2_moves(new_a, new_b, config, &mut r);

    phase3_transfers(new_a, new_b, last_run, config, &mut r);

    if !config.backup {
        r.queue_a.retain(|a| !matches!(a, Action::Backup { .. }));
        r.queue_b.retain(|a| !matches!(a, Action::Backup { .. }));
    }

    r
}

#[derive(Clone, Copy)]
enum Side {
    A,
    B,
}

/// Phase 1: for every deletion on `deleted_side`'s old snapshot, decide
/// whether to queue a delete on `peer_new`'s side or to cancel it because
/// the peer has independent activity at that path.
fn phase1_deletions(
    deleted_new: &FileIndex,
    peer_new: &mut FileIndex,
    deleted_old: &FileIndex,
    config: &Config,
    deleted_side: Side,
    r: &mut Reconciliation,
) {
    let deleted_paths: Vec<String> =
        deleted_old.iter().filter(|rec| rec.deleted).map(|rec| rec.path.clone()).collect();

    for path in deleted_paths {
        let Some(peer_rec) = peer_new.get_by_path(&path) else {
            continue;
        };

        if peer_rec.newmod || peer_rec.moved || peer_rec.new {
            r.diagnostics.push(format!(
                "delete/modify conflict at '{path}': peer has pending activity, keeping and re-transferring"
            ));
            match deleted_side {
                Side::A => r.transfer_b2a.push(path),
                Side::B => r.transfer_a2b.push(path),
            }
            continue;
        }

        if config.check_new_on_delete {
            if let Some(replacement) = deleted_new.get_by_path(&path) {
                if replacement.new {
                    r.diagnostics.push(format!(
                        "'{path}' deleted but a new file now occupies the path; treating as overwrite, not delete"
                    ));
                    continue;
                }
            }
        }

        let queue_action = Action::Delete { path: path.clone() };
        match deleted_side {
            Side::A => r.queue_b.push(queue_action),
            Side::B => r.queue_a.push(queue_action),
        }
        peer_new.remove(&[(Attribute::Path, AttrValue::Str(path))]);
    }
}

/// Phase 2: reconcile every moved-from path seen on either side.
fn phase2_moves(new_a: &mut FileIndex, new_b: &mut FileIndex, config: &Config, r: &mut Reconciliation) {
    let mut prev_paths: BTreeSet<String> = BTreeSet::new();
    for rec in new_a.iter().filter(|rec| rec.moved) {
        if let Some(p) = &rec.prev_path {
            prev_paths.insert(p.clone());
        }
    }
    for rec in new_b.iter().filter(|rec| rec.moved) {
        if let Some(p) = &rec.prev_path {
            prev_paths.insert(p.clone());
        }
    }

    for prev_path in prev_paths {
        // A record still occupying `prev_path`, whether it moved there from
        // elsewhere (shouldn't happen, but falls out of the match below as
        // unmoved) or is a moved record whose `prev_path` stamp points back
        // to it. An untouched record sitting at `prev_path` (path unchanged)
        // matches on `rec.path`; classify.rs also stamps such a record's
        // `prev_path` to its own path, so either condition finds it.
        let a_dest = new_a
            .iter()
            .find(|rec| rec.path == prev_path || rec.prev_path.as_deref() == Some(prev_path.as_str()))
            .map(|rec| rec.path.clone());
        let b_dest = new_b
            .iter()
            .find(|rec| rec.path == prev_path || rec.prev_path.as_deref() == Some(prev_path.as_str()))
            .map(|rec| rec.path.clone());

        match (a_dest, b_dest) {
            (None, None) => {},
            (Some(_), None) | (None, Some(_)) => {
                // One side moved (or still sits unmoved); the other has
                // nothing at `prev_path` at all, so there's nothing to
                // follow or reconcile.
            },
            (Some(dest_a), Some(dest_b)) => {
                let a_moved = dest_a != prev_path;
                let b_moved = dest_b != prev_path;
                match (a_moved, b_moved) {
                    (false, false) => {},
                    (true, false) => queue_move(new_a, new_b, Side::B, &prev_path, &dest_a, r),
                    (false, true) => queue_move(new_a, new_b, Side::A, &prev_path, &dest_b, r),
                    (true, true) if dest_a == dest_b => {
                        // Both sides independently moved to the same place.
                    },
                    (true, true) => {
                        let (follow_side, src, dst) = match config.move_conflict {
                            MoveConflict::A => (Side::B, prev_path.clone(), dest_a.clone()),
                            MoveConflict::B => (Side::A, prev_path.clone(), dest_b.clone()),
                        };
                        queue_move(new_a, new_b, follow_side, &src, &dst, r);
                    },
                }
            },
        }
    }
}

/// Queue a move on `follow_side` from `src` to `dst`, applying it
/// theoretically to that side's index so later phases see the new path.
fn queue_move(new_a: &mut FileIndex, new_b: &mut FileIndex, follow_side: Side, src: &str, dst: &str, r: &mut Reconciliation) {
    let (index, queue) = match follow_side {
        Side::A => (&mut *new_a, &mut r.queue_a),
        Side::B => (&mut *new_b, &mut r.queue_b),
    };

    if index.contains_path(dst) {
        r.diagnostics.push(format!(
            "move conflict: destination '{dst}' already occupied on the follower side, treating as modify"
        ));
        index.update(&[(Attribute::Path, AttrValue::Str(dst.to_string()))], |rec| {
            rec.newmod = true;
        });
        index.update(&[(Attribute::Path, AttrValue::Str(src.to_string()))], |rec| {
            rec.newmod = true;
        });
        return;
    }

    if let Some(mut rec) = index.remove_path(src) {
        rec.path = dst.to_string();
        let _ = index.insert(rec);
    }

    queue.push(Action::Move { src: src.to_string(), dst: dst.to_string() });
}

/// Phase 3: reconcile every path present on at least one side after
/// phases 1 and 2 have settled deletions and moves.
fn phase3_transfers(new_a: &FileIndex, new_b: &FileIndex, last_run: f64, config: &Config, r: &mut Reconciliation) {
    let mut paths: BTreeSet<String> = BTreeSet::new();
    paths.extend(new_a.iter().map(|rec| rec.path.clone()));
    paths.extend(new_b.iter().map(|rec| rec.path.clone()));

    for path in paths {
        let a = new_a.get_by_path(&path);
        let b = new_b.get_by_path(&path);

        match (a, b) {
            (Some(a), None) => {
                if !a.new {
                    r.diagnostics.push(format!("'{path}' present only on A and not marked new; transferring anyway"));
                }
                r.transfer_a2b.push(path);
            },
            (None, Some(b)) => {
                if !b.new {
                    r.diagnostics.push(format!("'{path}' present only on B and not marked new; transferring anyway"));
                }
                r.transfer_b2a.push(path);
            },
            (None, None) => {},
            (Some(a), Some(b)) => {
                if (a.mtime - b.mtime).abs() <= config.mod_resolution {
                    continue;
                }

                let a_changed = a.newmod || a.moved;
                let b_changed = b.newmod || b.moved;
                let a_changed_since_last = a_changed && a.mtime > last_run;
                let b_changed_since_last = b_changed && b.mtime > last_run;

                if a_changed_since_last && !b_changed_since_last {
                    r.queue_b.push(Action::Backup { path: path.clone() });
                    r.transfer_a2b.push(path);
                    continue;
                }
                if b_changed_since_last && !a_changed_since_last {
                    r.queue_a.push(Action::Backup { path: path.clone() });
                    r.transfer_b2a.push(path);
                    continue;
                }

                resolve_mod_conflict(&path, a.mtime, b.mtime, config, r);
            },
        }
    }
}

fn resolve_mod_conflict(path: &str, mtime_a: f64, mtime_b: f64, config: &Config, r: &mut Reconciliation) {
    match config.mod_conflict {
        ModConflict::A => {
            r.queue_b.push(Action::Backup { path: path.to_string() });
            r.transfer_a2b.push(path.to_string());
        },
        ModConflict::B => {
            r.queue_a.push(Action::Backup { path: path.to_string() });
            r.transfer_b2a.push(path.to_string());
        },
        ModConflict::Newer => {
            if mtime_a >= mtime_b {
                r.queue_b.push(Action::Backup { path: path.to_string() });
                r.transfer_a2b.push(path.to_string());
            } else {
                r.queue_a.push(Action::Backup { path: path.to_string() });
                r.transfer_b2a.push(path.to_string());
            }
        },
        ModConflict::NewerTag => {
            let (winner_to, loser_name, loser_to) = if mtime_a >= mtime_b {
                (&mut r.transfer_a2b, &config.name_b, &mut r.transfer_b2a)
            } else {
                (&mut r.transfer_b2a, &config.name_a, &mut r.transfer_a2b)
            };
            winner_to.push(path.to_string());
            let tagged = format!("{path}.{loser_name}");
            loser_to.push(tagged);
            r.diagnostics.push(format!("'{path}' tagged as '{path}.{loser_name}' on conflict loser side"));
        },
        ModConflict::Both => {
            let tagged_a = format!("{path}.{}", config.name_a);
            let tagged_b = format!("{path}.{}", config.name_b);
            r.transfer_a2b.push(tagged_a);
            r.transfer_b2a.push(tagged_b);
            r.diagnostics.push(format!(
                "'{path}' modified on both sides: both renamed and transferred both ways"
            ));
        },
    }
}
