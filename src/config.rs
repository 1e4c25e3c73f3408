//! Typed configuration, loaded from a `.pyco-sync/config` key=value file.
//!
//! The original tool evaluates its config file as Python source. Executing
//! arbitrary code to load settings isn't an idiomatic or safe pattern in a
//! Rust CLI, so this parses a flat, restricted grammar instead: one
//! `key = value` assignment per line, `#` comments, list values written
//! `a, b, c`.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::record::Attribute;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read { path: String, #[source] source: std::io::Error },

    #[error("unknown config key '{0}' on line {1}")]
    UnknownKey(String, usize),

    #[error("invalid value for '{key}' on line {line}: {reason}")]
    InvalidValue { key: String, line: usize, reason: String },

    #[error("missing required config key '{0}'")]
    MissingRequired(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModConflict {
    A,
    B,
    Newer,
    NewerTag,
    Both,
}

impl FromStr for ModConflict {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(ModConflict::A),
            "B" => Ok(ModConflict::B),
            "newer" => Ok(ModConflict::Newer),
            "newer_tag" => Ok(ModConflict::NewerTag),
            "both" => Ok(ModConflict::Both),
            other => Err(format!("expected one of A, B, newer, newer_tag, both; got '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveConflict {
    A,
    B,
}

impl FromStr for MoveConflict {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(MoveConflict::A),
            "B" => Ok(MoveConflict::B),
            other => Err(format!("expected A or B; got '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub name_a: String,
    pub name_b: String,
    pub path_b: String,
    pub userhost: String,
    pub ssh_port: u16,
    pub remote_program: String,

    pub move_attributes_a: Vec<Attribute>,
    pub prev_attributes_a: Vec<Attribute>,
    pub move_attributes_b: Vec<Attribute>,
    pub prev_attributes_b: Vec<Attribute>,

    pub move_conflict: MoveConflict,
    pub mod_conflict: ModConflict,
    pub mod_resolution: f64,

    pub copy_symlinks_as_links: bool,
    pub backup: bool,
    pub rsync_checksum: bool,
    pub check_new_on_delete: bool,
    pub use_hash_db: bool,

    pub excludes: Vec<String>,
    pub pre_sync_bash: String,
    pub post_sync_bash: String,
    pub git_exclude: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name_a: "machineA".into(),
            name_b: "machineB".into(),
            path_b: String::new(),
            userhost: String::new(),
            ssh_port: 22,
            remote_program: "duo".into(),
            move_attributes_a: vec![Attribute::Ino, Attribute::Birthtime],
            prev_attributes_a: vec![Attribute::Ino, Attribute::Path],
            move_attributes_b: vec![Attribute::Ino, Attribute::Birthtime],
            prev_attributes_b: vec![Attribute::Ino, Attribute::Path],
            move_conflict: MoveConflict::A,
            mod_conflict: ModConflict::Both,
            mod_resolution: 2.5,
            copy_symlinks_as_links: true,
            backup: true,
            rsync_checksum: false,
            check_new_on_delete: true,
            use_hash_db: true,
            excludes: vec![".DS_Store".into(), ".git/".into(), "Thumbs.db".into()],
            pre_sync_bash: String::new(),
            post_sync_bash: String::new(),
            git_exclude: false,
        }
    }
}

impl Config {
    /// Load from a `.pyco-sync/config` file, starting from defaults and
    /// overriding anything the file specifies.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let raw = parse_keyvalues(text)?;
        let mut cfg = Config::default();

        for (lineno, key, value) in raw {
            match key.as_str() {
                "nameA" => cfg.name_a = value,
                "nameB" => cfg.name_b = value,
                "pathB" => cfg.path_b = value,
                "userhost" => cfg.userhost = value,
                "ssh_port" => cfg.ssh_port = parse_num(&key, lineno, &value)?,
                "remote_program" => cfg.remote_program = value,
                "move_attributesA" => cfg.move_attributes_a = parse_attrs(&key, lineno, &value)?,
                "prev_attributesA" => cfg.prev_attributes_a = parse_attrs(&key, lineno, &value)?,
                "move_attributesB" => cfg.move_attributes_b = parse_attrs(&key, lineno, &value)?,
                "prev_attributesB" => cfg.prev_attributes_b = parse_attrs(&key, lineno, &value)?,
                "move_conflict" => {
                    cfg.move_conflict = value.parse().map_err(|reason| ConfigError::InvalidValue {
                        key: key.clone(),
                        line: lineno,
                        reason,
                    })?
                },
                "mod_conflict" => {
                    cfg.mod_conflict = value.parse().map_err(|reason| ConfigError::InvalidValue {
                        key: key.clone(),
                        line: lineno,
                        reason,
                    })?
                },
                "mod_resolution" => cfg.mod_resolution = parse_num(&key, lineno, &value)?,
                "copy_symlinks_as_links" => cfg.copy_symlinks_as_links = parse_bool(&key, lineno, &value)?,
                "backup" => cfg.backup = parse_bool(&key, lineno, &value)?,
                "rsync_checksum" => cfg.rsync_checksum = parse_bool(&key, lineno, &value)?,
                "check_new_on_delete" => cfg.check_new_on_delete = parse_bool(&key, lineno, &value)?,
                "use_hash_db" => cfg.use_hash_db = parse_bool(&key, lineno, &value)?,
                "excludes" => cfg.excludes = split_list(&value),
                "pre_sync_bash" => cfg.pre_sync_bash = value,
                "post_sync_bash" => cfg.post_sync_bash = value,
                "git_exclude" => cfg.git_exclude = parse_bool(&key, lineno, &value)?,
                other => return Err(ConfigError::UnknownKey(other.to_string(), lineno)),
            }
        }

        Ok(cfg)
    }

    /// Render this config back to the `key = value` file format, for `init`.
    pub fn to_template(&self) -> String {
        format!(
            "# duosync configuration\nnameA = {}\nnameB = {}\npathB = {}\nuserhost = {}\nssh_port = {}\n\
             move_attributesA = {}\nprev_attributesA = {}\nmove_attributesB = {}\nprev_attributesB = {}\n\
             move_conflict = {}\nmod_conflict = {}\nmod_resolution = {}\nbackup = {}\n\
             check_new_on_delete = {}\nuse_hash_db = {}\nexcludes = {}\n",
            self.name_a,
            self.name_b,
            self.path_b,
            self.userhost,
            self.ssh_port,
            fmt_attrs(&self.move_attributes_a),
            fmt_attrs(&self.prev_attributes_a),
            fmt_attrs(&self.move_attributes_b),
            fmt_attrs(&self.prev_attributes_b),
            fmt_move_conflict(self.move_conflict),
            fmt_mod_conflict(self.mod_conflict),
            self.mod_resolution,
            self.backup,
            self.check_new_on_delete,
            self.use_hash_db,
            self.excludes.join(", "),
        )
    }
}

impl fmt::Display for ModConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(fmt_mod_conflict(*self))
    }
}

fn fmt_mod_conflict(c: ModConflict) -> &'static str {
    match c {
        ModConflict::A => "A",
        ModConflict::B => "B",
        ModConflict::Newer => "newer",
        ModConflict::NewerTag => "newer_tag",
        ModConflict::Both => "both",
    }
}

fn fmt_move_conflict(c: MoveConflict) -> &'static str {
    match c {
        MoveConflict::A => "A",
        MoveConflict::B => "B",
    }
}

fn fmt_attrs(attrs: &[Attribute]) -> String {
    attrs.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ")
}

fn parse_num<T: FromStr>(key: &str, line: usize, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        line,
        reason: format!("'{value}' is not a number"),
    })
}

fn parse_bool(key: &str, line: usize, value: &str) -> Result<bool, ConfigError> {
    match value.trim() {
        "True" | "true" => Ok(true),
        "False" | "false" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            line,
            reason: format!("'{other}' is not a boolean"),
        }),
    }
}

fn parse_attrs(key: &str, line: usize, value: &str) -> Result<Vec<Attribute>, ConfigError> {
    split_list(value)
        .into_iter()
        .map(|s| {
            s.parse().map_err(|reason| ConfigError::InvalidValue {
                key: key.to_string(),
                line,
                reason,
            })
        })
        .collect()
}

fn split_list(value: &str) -> Vec<String> {
    let trimmed = value.trim().trim_start_matches('[').trim_end_matches(']');
    trimmed
        .split(',')
        .map(|s| s.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_keyvalues(text: &str) -> Result<Vec<(usize, String, String)>, ConfigError> {
    let mut out = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let lineno = i + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else { continue };
        out.push((lineno, key.trim().to_string(), value.trim().to_string()));
    }
    Ok(out)
}

/// Find `.pyco-sync/` by walking up from `start`, mirroring the original
/// tool's marker-directory search.
pub fn find_root(start: &Path) -> Option<std::path::PathBuf> {
    let mut dir = start.canonicalize().ok()?;
    loop {
        if dir.join(".pyco-sync").is_dir() {
            return Some(dir);
        }
        if !dir.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let text = "nameB = machineB\npathB = /tmp/remote\nmod_conflict = newer\n";
        let cfg = Config::parse(text).unwrap();
        assert_eq!(cfg.name_b, "machineB");
        assert_eq!(cfg.path_b, "/tmp/remote");
        assert_eq!(cfg.mod_conflict, ModConflict::Newer);
        assert_eq!(cfg.backup, true);
    }

    #[test]
    fn rejects_unknown_key() {
        let text = "bogus_key = 1\n";
        let err = Config::parse(text).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey(_, 1)));
    }

    #[test]
    fn parses_attribute_lists() {
        let text = "move_attributesA = ino, size\n";
        let cfg = Config::parse(text).unwrap();
        assert_eq!(cfg.move_attributes_a, vec![Attribute::Ino, Attribute::Size]);
    }

    #[test]
    fn rejects_bad_mod_conflict() {
        let text = "mod_conflict = sideways\n";
        let err = Config::parse(text).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let text = "# a comment\n\nbackup = False\n";
        let cfg = Config::parse(text).unwrap();
        assert_eq!(cfg.backup, false);
    }

    #[test]
    fn excludes_parse_as_list() {
        let text = "excludes = .git/, *.tmp, build/\n";
        let cfg = Config::parse(text).unwrap();
        assert_eq!(cfg.excludes, vec![".git/", "*.tmp", "build/"]);
    }
}
