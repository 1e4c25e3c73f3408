//! Run logger: prints to stdout (unless silenced) and mirrors every line
//! to a timestamped file under `.pyco-sync/logs/`.

use owo_colors::OwoColorize;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct Logger {
    silent: bool,
    file: Option<Mutex<File>>,
}

impl Logger {
    /// A logger that writes nowhere but stdout (or nothing, if `silent`).
    pub fn stdout_only(silent: bool) -> Self {
        Self { silent, file: None }
    }

    /// A logger that also mirrors to `logs_dir/<run-timestamp>.log`.
    pub fn with_file(silent: bool, logs_dir: &Path, timestamp: &str) -> io::Result<Self> {
        fs::create_dir_all(logs_dir)?;
        let path: PathBuf = logs_dir.join(format!("{timestamp}.log"));
        let file = File::create(path)?;
        Ok(Self { silent, file: Some(Mutex::new(file)) })
    }

    fn write_file(&self, line: &str) {
        if let Some(file) = &self.file {
            let mut f = file.lock().unwrap();
            let _ = writeln!(f, "{line}");
        }
    }

    pub fn info(&self, line: impl AsRef<str>) {
        let line = line.as_ref();
        if !self.silent {
            println!("{line}");
        }
        self.write_file(line);
    }

    pub fn warn(&self, line: impl AsRef<str>) {
        let line = line.as_ref();
        if !self.silent {
            println!("{}", format!("WARNING: {line}").yellow());
        }
        self.write_file(&format!("WARNING: {line}"));
    }

    pub fn error(&self, line: impl AsRef<str>) {
        let line = line.as_ref();
        eprintln!("{}", format!("Error: {line}").red());
        self.write_file(&format!("ERROR: {line}"));
    }

    pub fn section(&self, title: impl AsRef<str>) {
        let title = title.as_ref();
        if !self.silent {
            println!("{}", title.bold().cyan());
        }
        self.write_file(title);
    }
}
