//! Change classifier: labels every new-side record as untouched, modified
//! in place, moved (possibly also modified), or new, against the previous
//! run's snapshot for the same side.

use std::path::Path;

use crate::index::FileIndex;
use crate::record::{AttrValue, Attribute};
use crate::similarity::path_similarity;

/// A weak "did you mean this file?" pairing between a `new`-classified
/// record and a still-`deleted` old one, surfaced when no identity
/// attribute matched but the paths look like the same file under a
/// rename the configured move attributes didn't catch (e.g. a rename
/// combined with an ino/hash change outside `move_attrs`).
#[derive(Debug, Clone)]
pub struct RenameHint {
    pub new_path: String,
    pub old_path: String,
    pub score: f64,
}

/// Below this score a path pairing is noise, not a hint.
const RENAME_HINT_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone)]
pub struct DuplicateIdentity {
    pub attrs: Vec<Attribute>,
    pub path: String,
}

#[derive(Debug, Default)]
pub struct ClassifyReport {
    pub untouched: usize,
    pub modified: usize,
    pub moved: usize,
    pub new: usize,
    pub duplicates: Vec<DuplicateIdentity>,
    pub rename_hints: Vec<RenameHint>,
}

/// Classify every record in `new` against `old`, mutating both in place.
///
/// `old` and `new` are reindexed before returning so later lookups see the
/// updated `deleted`/classification attributes.
pub fn classify(
    old: &mut FileIndex,
    new: &mut FileIndex,
    prev_attrs: &[Attribute],
    move_attrs: &[Attribute],
) -> ClassifyReport {
    let mut report = ClassifyReport::default();

    for rec in new.iter_mut() {
        rec.reset_classification();
    }
    for rec in old.iter_mut() {
        rec.deleted = true;
    }
    old.reindex();
    new.reindex();

    // Matching happens path-at-a-time so we can mutate `old` as we go
    // without racing the index we're also reading.
    let new_paths: Vec<String> = new.iter().map(|r| r.path.clone()).collect();

    for path in new_paths {
        let (size, mtime, ino, birthtime, hashes) = {
            let rec = new.get_by_path(&path).expect("path just listed from new");
            (rec.size, rec.mtime, rec.ino, rec.birthtime, rec.hashes.clone())
        };

        let identity_pairs = |attrs: &[Attribute]| -> Vec<(Attribute, AttrValue)> {
            attrs
                .iter()
                .map(|a| {
                    let v = match a {
                        Attribute::Path => AttrValue::Str(path.clone()),
                        Attribute::Size => AttrValue::Int(size),
                        Attribute::Mtime => AttrValue::Int(mtime.to_bits()),
                        Attribute::Ino => AttrValue::Int(ino),
                        Attribute::Birthtime => AttrValue::Int(birthtime.to_bits()),
                        Attribute::Hash(algo) => hashes
                            .get(algo)
                            .map(|h| AttrValue::Str(h.clone()))
                            .unwrap_or(AttrValue::None),
                        other => unreachable!("{other} is not an identity attribute"),
                    };
                    (a.clone(), v)
                })
                .collect()
        };

        // Rule 1: untouched — prev_attrs + mtime all match.
        let mut untouched_attrs = prev_attrs.to_vec();
        untouched_attrs.push(Attribute::Mtime);
        let untouched_pairs = identity_pairs(&untouched_attrs);
        let untouched_matches: Vec<String> =
            old.by_eq_all(&untouched_pairs).map(|r| r.path.clone()).collect();

        if let Some(old_path) = untouched_matches.first() {
            if untouched_matches.len() > 1 {
                report.duplicates.push(DuplicateIdentity { attrs: untouched_attrs.clone(), path: path.clone() });
            }
            new.update(&[(Attribute::Path, AttrValue::Str(path.clone()))], |r| {
                r.untouched = true;
                r.prev_path = Some(path.clone());
            });
            old.update(&[(Attribute::Path, AttrValue::Str(old_path.clone()))], |r| {
                r.deleted = false;
            });
            report.untouched += 1;
            continue;
        }

        // Rule 2: modified in place — prev_attrs match, mtime differs.
        let prev_pairs = identity_pairs(prev_attrs);
        let prev_matches: Vec<String> = old.by_eq_all(&prev_pairs).map(|r| r.path.clone()).collect();

        if let Some(old_path) = prev_matches.first() {
            if prev_matches.len() > 1 {
                report.duplicates.push(DuplicateIdentity { attrs: prev_attrs.to_vec(), path: path.clone() });
            }
            new.update(&[(Attribute::Path, AttrValue::Str(path.clone()))], |r| {
                r.newmod = true;
                r.prev_path = Some(path.clone());
            });
            old.update(&[(Attribute::Path, AttrValue::Str(old_path.clone()))], |r| {
                r.deleted = false;
            });
            report.modified += 1;
            continue;
        }

        // Rule 3: moved — move_attrs match (possibly also modified).
        let move_pairs = identity_pairs(move_attrs);
        let move_matches: Vec<(String, f64)> =
            old.by_eq_all(&move_pairs).map(|r| (r.path.clone(), r.mtime)).collect();

        if let Some((old_path, old_mtime)) = move_matches.first().cloned() {
            if move_matches.len() > 1 {
                report.duplicates.push(DuplicateIdentity { attrs: move_attrs.to_vec(), path: path.clone() });
            }
            let also_modified = old_mtime != mtime;
            new.update(&[(Attribute::Path, AttrValue::Str(path.clone()))], |r| {
                r.moved = true;
                r.prev_path = Some(old_path.clone());
                if also_modified {
                    r.newmod = true;
                }
            });
            old.update(&[(Attribute::Path, AttrValue::Str(old_path.clone()))], |r| {
                r.deleted = false;
            });
            report.moved += 1;
            continue;
        }

        // Rule 4: new.
        new.update(&[(Attribute::Path, AttrValue::Str(path.clone()))], |r| {
            r.new = true;
            r.newmod = true;
        });
        report.new += 1;
    }

    old.reindex();
    new.reindex();

    report.rename_hints = rename_hints(old, new);

    report
}

/// Pair each `new`-classified record against the still-`deleted` old
/// records by path similarity, keeping the best match above
/// `RENAME_HINT_THRESHOLD` for each new record (if any).
fn rename_hints(old: &FileIndex, new: &FileIndex) -> Vec<RenameHint> {
    let candidates: Vec<&str> = old.iter().filter(|r| r.deleted).map(|r| r.path.as_str()).collect();
    if candidates.is_empty() {
        return Vec::new();
    }

    new.iter()
        .filter(|r| r.new)
        .filter_map(|r| {
            candidates
                .iter()
                .map(|&old_path| (old_path, path_similarity(Path::new(&r.path), Path::new(old_path))))
                .filter(|(_, score)| *score >= RENAME_HINT_THRESHOLD)
                .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
                .map(|(old_path, score)| RenameHint { new_path: r.path.clone(), old_path: old_path.to_string(), score })
        })
        .collect()
}
