//! File records: the immutable attributes a walk produces, plus the
//! classification fields a sync run attaches to them.

use std::collections::BTreeMap;
use std::fmt;

/// The closed set of attributes a [`crate::index::FileIndex`] can key on.
///
/// This stands in for runtime attribute-name dispatch: every place the
/// original tool accepted an arbitrary attribute string, this crate accepts
/// one of these variants instead, so a typo in a config file is a parse
/// error rather than a silent no-op index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Attribute {
    Path,
    Size,
    Mtime,
    Ino,
    Birthtime,
    Hash(String),
    PrevPath,
    Moved,
    Newmod,
    New,
    Untouched,
    Deleted,
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribute::Path => write!(f, "path"),
            Attribute::Size => write!(f, "size"),
            Attribute::Mtime => write!(f, "mtime"),
            Attribute::Ino => write!(f, "ino"),
            Attribute::Birthtime => write!(f, "birthtime"),
            Attribute::Hash(algo) => write!(f, "hash:{algo}"),
            Attribute::PrevPath => write!(f, "prev_path"),
            Attribute::Moved => write!(f, "moved"),
            Attribute::Newmod => write!(f, "newmod"),
            Attribute::New => write!(f, "new"),
            Attribute::Untouched => write!(f, "untouched"),
            Attribute::Deleted => write!(f, "deleted"),
        }
    }
}

impl std::str::FromStr for Attribute {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "path" => Ok(Attribute::Path),
            "size" => Ok(Attribute::Size),
            "mtime" => Ok(Attribute::Mtime),
            "ino" => Ok(Attribute::Ino),
            "birthtime" => Ok(Attribute::Birthtime),
            other if other.starts_with("hash:") => {
                Ok(Attribute::Hash(other["hash:".len()..].to_string()))
            },
            "sha1" | "adler32" => Ok(Attribute::Hash(s.to_string())),
            other => Err(format!("unknown attribute '{other}'")),
        }
    }
}

/// A value extracted from a [`FileRecord`] for indexing or comparison.
///
/// `Mtime`/`Birthtime` are quantized to milliseconds before hashing/equality
/// so that filesystem mtime jitter below the config's `mod_resolution`
/// doesn't get measured as distinct values inside the index (the index
/// itself always does exact equality; the time-slack comparison lives in
/// `reconcile`, which compares raw `f64` values directly).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttrValue {
    Str(String),
    Int(u64),
    Bool(bool),
    None,
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<u64> for AttrValue {
    fn from(v: u64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

/// A single tracked file, as seen by one side of a sync run.
///
/// The first six fields are produced by the walker and persisted in a
/// snapshot. The remaining fields are classification scratch space: they
/// are reset at the start of every run and never serialized (see
/// `snapshot::PersistedRecord`).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub size: u64,
    pub mtime: f64,
    pub ino: u64,
    pub birthtime: f64,
    pub hashes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symlink_target: Option<String>,

    #[serde(skip, default)]
    pub prev_path: Option<String>,
    #[serde(skip, default)]
    pub moved: bool,
    #[serde(skip, default)]
    pub newmod: bool,
    #[serde(skip, default)]
    pub new: bool,
    #[serde(skip, default)]
    pub untouched: bool,
    #[serde(skip, default = "default_deleted")]
    pub deleted: bool,
}

fn default_deleted() -> bool {
    true
}

impl FileRecord {
    pub fn new(path: impl Into<String>, size: u64, mtime: f64) -> Self {
        Self {
            path: path.into(),
            size,
            mtime,
            ino: 0,
            birthtime: 0.0,
            hashes: BTreeMap::new(),
            symlink_target: None,
            prev_path: None,
            moved: false,
            newmod: false,
            new: false,
            untouched: false,
            deleted: true,
        }
    }

    /// Reset the classification fields a new run starts with.
    pub fn reset_classification(&mut self) {
        self.prev_path = None;
        self.moved = false;
        self.newmod = false;
        self.new = false;
        self.untouched = false;
    }

    /// Extract the value of a given attribute, for indexing or comparison.
    pub fn attr(&self, attr: &Attribute) -> AttrValue {
        match attr {
            Attribute::Path => AttrValue::Str(self.path.clone()),
            Attribute::Size => AttrValue::Int(self.size),
            Attribute::Mtime => AttrValue::Int(self.mtime.to_bits()),
            Attribute::Ino => AttrValue::Int(self.ino),
            Attribute::Birthtime => AttrValue::Int(self.birthtime.to_bits()),
            Attribute::Hash(algo) => match self.hashes.get(algo) {
                Some(h) => AttrValue::Str(h.clone()),
                None => AttrValue::None,
            },
            Attribute::PrevPath => match &self.prev_path {
                Some(p) => AttrValue::Str(p.clone()),
                None => AttrValue::None,
            },
            Attribute::Moved => AttrValue::Bool(self.moved),
            Attribute::Newmod => AttrValue::Bool(self.newmod),
            Attribute::New => AttrValue::Bool(self.new),
            Attribute::Untouched => AttrValue::Bool(self.untouched),
            Attribute::Deleted => AttrValue::Bool(self.deleted),
        }
    }

    /// Whether this record carries exactly one of the four mutually
    /// exclusive classification outcomes (untouched / moved / newmod-only /
    /// new), per the single run-time invariant that the classifier must
    /// uphold for every *new*-side record.
    pub fn has_single_classification(&self) -> bool {
        let states = [
            self.untouched && !self.moved && !self.new,
            self.moved,
            self.newmod && !self.moved && !self.new,
            self.new,
        ];
        states.iter().filter(|&&s| s).count() == 1
    }
}
