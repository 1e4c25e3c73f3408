//! Indexed container of [`FileRecord`]s with O(1) attribute lookups.
//!
//! Every attribute named in a config's `prev_attributes`/`move_attributes`
//! tuple gets its own secondary index the first time it's queried, so the
//! classifier and reconciler never fall back to a linear scan over the
//! whole tree to answer "is there a record with this identity".

use ahash::AHashMap;
use thiserror::Error;

use crate::record::{AttrValue, Attribute, FileRecord};

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("duplicate path in index: {0}")]
    DuplicatePath(String),
}

/// A boolean combinator over attribute-equality tests.
///
/// Replaces the original tool's operator-overloaded query objects with an
/// explicit tree the index can evaluate by set intersection/union rather
/// than by scanning every record.
#[derive(Debug, Clone)]
pub enum Predicate {
    Eq(Attribute, AttrValue),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn eq(attr: Attribute, value: impl Into<AttrValue>) -> Self {
        Predicate::Eq(attr, value.into())
    }
}

/// A set of [`FileRecord`]s, indexed by attribute for fast lookup.
///
/// Slots are never physically removed once inserted; `remove` tombstones a
/// slot so outstanding indices referencing its position stay valid, and
/// `iter()` skips tombstones. This mirrors the original tool's
/// `_list[ix] = None` removal strategy, which keeps attribute indices
/// (which store integer slot positions) from needing renumbering.
#[derive(Debug, Default)]
pub struct FileIndex {
    slots: Vec<Option<FileRecord>>,
    by_path: AHashMap<String, usize>,
    secondary: AHashMap<Attribute, AHashMap<AttrValue, Vec<usize>>>,
}

impl FileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<FileRecord>) -> Result<Self, IndexError> {
        let mut idx = Self::new();
        for r in records {
            idx.insert(r)?;
        }
        Ok(idx)
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    pub fn insert(&mut self, record: FileRecord) -> Result<usize, IndexError> {
        if self.by_path.contains_key(&record.path) {
            return Err(IndexError::DuplicatePath(record.path.clone()));
        }
        let ix = self.slots.len();
        self.by_path.insert(record.path.clone(), ix);
        self.slots.push(Some(record));
        self.reindex_slot(ix);
        Ok(ix)
    }

    pub fn get_by_path(&self, path: &str) -> Option<&FileRecord> {
        self.by_path.get(path).and_then(|&ix| self.slots[ix].as_ref())
    }

    pub fn get_by_path_mut(&mut self, path: &str) -> Option<&mut FileRecord> {
        if let Some(&ix) = self.by_path.get(path) {
            self.slots[ix].as_mut()
        } else {
            None
        }
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.by_path.contains_key(path)
    }

    /// Iterate live records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut FileRecord> {
        self.slots.iter_mut().filter_map(|s| s.as_mut())
    }

    /// Records whose `attr` equals `value`, in insertion order.
    pub fn by_eq<'a>(
        &'a self,
        attr: &Attribute,
        value: &AttrValue,
    ) -> Box<dyn Iterator<Item = &'a FileRecord> + 'a> {
        match self.secondary.get(attr).and_then(|m| m.get(value)) {
            Some(ixs) => Box::new(ixs.iter().filter_map(move |&ix| self.slots[ix].as_ref())),
            None => Box::new(std::iter::empty()),
        }
    }

    /// Records matching every `(attribute, value)` pair, via index
    /// intersection rather than a full scan.
    pub fn by_eq_all<'a>(
        &'a self,
        pairs: &[(Attribute, AttrValue)],
    ) -> Box<dyn Iterator<Item = &'a FileRecord> + 'a> {
        let matched = self.find_ixs(pairs);
        Box::new(matched.into_iter().filter_map(move |ix| self.slots[ix].as_ref()))
    }

    /// Slot indices of every live record matching every `(attribute,
    /// value)` pair, smallest index set intersected against the rest.
    fn find_ixs(&self, pairs: &[(Attribute, AttrValue)]) -> Vec<usize> {
        if pairs.is_empty() {
            return Vec::new();
        }
        let mut sets: Vec<&Vec<usize>> = Vec::with_capacity(pairs.len());
        for (attr, value) in pairs {
            match self.secondary.get(attr).and_then(|m| m.get(value)) {
                Some(ixs) => sets.push(ixs),
                None => return Vec::new(),
            }
        }
        sets.sort_by_key(|v| v.len());
        let (smallest, rest) = sets.split_first().unwrap();
        smallest.iter().copied().filter(|ix| rest.iter().all(|set| set.contains(ix))).collect()
    }

    pub fn contains(&self, pairs: &[(Attribute, AttrValue)]) -> bool {
        self.by_eq_all(pairs).next().is_some()
    }

    pub fn matches(&self, predicate: &Predicate) -> Vec<usize> {
        self.eval(predicate)
    }

    fn eval(&self, predicate: &Predicate) -> Vec<usize> {
        match predicate {
            Predicate::Eq(attr, value) => self
                .secondary
                .get(attr)
                .and_then(|m| m.get(value))
                .cloned()
                .unwrap_or_default(),
            Predicate::And(preds) => {
                let mut sets: Vec<Vec<usize>> = preds.iter().map(|p| self.eval(p)).collect();
                sets.sort_by_key(|v| v.len());
                let mut iter = sets.into_iter();
                let Some(first) = iter.next() else { return Vec::new() };
                iter.fold(first, |acc, set| {
                    acc.into_iter().filter(|ix| set.contains(ix)).collect()
                })
            },
            Predicate::Or(preds) => {
                let mut seen = std::collections::BTreeSet::new();
                for p in preds {
                    seen.extend(self.eval(p));
                }
                seen.into_iter().collect()
            },
            Predicate::Not(inner) => {
                let excluded: std::collections::BTreeSet<usize> = self.eval(inner).into_iter().collect();
                self.slots
                    .iter()
                    .enumerate()
                    .filter_map(|(ix, s)| s.as_ref().map(|_| ix))
                    .filter(|ix| !excluded.contains(ix))
                    .collect()
            },
        }
    }

    /// Update every record matching `pairs`, applying `patch` and
    /// re-indexing. Returns the number of records updated.
    pub fn update(
        &mut self,
        pairs: &[(Attribute, AttrValue)],
        patch: impl Fn(&mut FileRecord),
    ) -> usize {
        let matched = self.find_ixs(pairs);

        for &ix in &matched {
            self.deindex_slot(ix);
        }
        for &ix in &matched {
            if let Some(rec) = self.slots[ix].as_mut() {
                let old_path = rec.path.clone();
                patch(rec);
                if rec.path != old_path {
                    self.by_path.remove(&old_path);
                    self.by_path.insert(rec.path.clone(), ix);
                }
            }
            self.reindex_slot(ix);
        }
        matched.len()
    }

    /// Remove every record matching `pairs` (tombstoned, not compacted).
    /// Returns the number removed.
    pub fn remove(&mut self, pairs: &[(Attribute, AttrValue)]) -> usize {
        let matched = self.find_ixs(pairs);
        for &ix in &matched {
            self.deindex_slot(ix);
            if let Some(rec) = self.slots[ix].take() {
                self.by_path.remove(&rec.path);
            }
        }
        matched.len()
    }

    pub fn remove_path(&mut self, path: &str) -> Option<FileRecord> {
        let ix = self.by_path.remove(path)?;
        self.deindex_slot(ix);
        self.slots[ix].take()
    }

    /// Rebuild all secondary indices from the live records. Needed after
    /// a batch of direct `iter_mut()` mutations that bypassed `update`.
    pub fn reindex(&mut self) {
        self.secondary.clear();
        for ix in 0..self.slots.len() {
            self.reindex_slot(ix);
        }
    }

    fn reindex_slot(&mut self, ix: usize) {
        let Some(rec) = self.slots[ix].as_ref() else { return };
        let attrs = Self::indexable_attrs(rec);
        for (attr, value) in attrs {
            self.secondary.entry(attr).or_default().entry(value).or_default().push(ix);
        }
    }

    fn deindex_slot(&mut self, ix: usize) {
        let Some(rec) = self.slots[ix].as_ref() else { return };
        let attrs = Self::indexable_attrs(rec);
        for (attr, value) in attrs {
            if let Some(m) = self.secondary.get_mut(&attr) {
                if let Some(v) = m.get_mut(&value) {
                    v.retain(|&x| x != ix);
                }
            }
        }
    }

    fn indexable_attrs(rec: &FileRecord) -> Vec<(Attribute, AttrValue)> {
        let mut out = vec![
            (Attribute::Path, rec.attr(&Attribute::Path)),
            (Attribute::Size, rec.attr(&Attribute::Size)),
            (Attribute::Mtime, rec.attr(&Attribute::Mtime)),
            (Attribute::Ino, rec.attr(&Attribute::Ino)),
            (Attribute::Birthtime, rec.attr(&Attribute::Birthtime)),
            (Attribute::Moved, rec.attr(&Attribute::Moved)),
            (Attribute::Newmod, rec.attr(&Attribute::Newmod)),
            (Attribute::New, rec.attr(&Attribute::New)),
            (Attribute::Untouched, rec.attr(&Attribute::Untouched)),
            (Attribute::Deleted, rec.attr(&Attribute::Deleted)),
        ];
        if let Some(prev) = &rec.prev_path {
            out.push((Attribute::PrevPath, AttrValue::Str(prev.clone())));
        }
        for algo in rec.hashes.keys() {
            out.push((Attribute::Hash(algo.clone()), rec.attr(&Attribute::Hash(algo.clone()))));
        }
        out
    }
}
