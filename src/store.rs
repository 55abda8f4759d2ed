use color_eyre::eyre::{
    Result,
    WrapErr,
};
use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
};
use tracing::warn;

/// Persistent key/value storage for the session credential and identity.
///
/// Implementations must never propagate storage failures upward: a broken
/// backing file degrades to absent reads and no-op writes so the session
/// layer only ever sees "present" or "absent".
pub trait CredentialStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
    fn remove(&mut self, key: &str);
}

pub fn default_session_file() -> Result<PathBuf> {
    let home = std::env::var("HOME").wrap_err("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".twentyone").join("session.json"))
}

pub fn resolve_session_file(path: Option<&str>) -> Result<PathBuf> {
    match path {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw);
            Ok(PathBuf::from(expanded.into_owned()))
        }
        None => default_session_file(),
    }
}

/// Single-file JSON store, one flat string map per file.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_all(&self) -> HashMap<String, String> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), %err, "failed to read session file");
                }
                return HashMap::new();
            }
        };
        match serde_json::from_slice(&data) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "session file is not valid JSON");
                HashMap::new()
            }
        }
    }

    fn write_all(&self, entries: &HashMap<String, String>) {
        if let Some(dir) = self.path.parent() {
            if let Err(err) = fs::create_dir_all(dir) {
                warn!(dir = %dir.display(), %err, "failed to create session directory");
                return;
            }
        }
        let data = match serde_json::to_vec_pretty(entries) {
            Ok(data) => data,
            Err(err) => {
                warn!(%err, "failed to encode session file");
                return;
            }
        };
        if let Err(err) = fs::write(&self.path, data) {
            warn!(path = %self.path.display(), %err, "failed to write session file");
        }
    }
}

impl CredentialStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.read_all().get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        let mut entries = self.read_all();
        entries.insert(key.to_owned(), value.to_owned());
        self.write_all(&entries);
    }

    fn remove(&mut self, key: &str) {
        let mut entries = self.read_all();
        if entries.remove(key).is_some() || self.path.exists() {
            self.write_all(&entries);
        }
    }
}

/// In-memory store for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            entries: entries.into_iter().collect(),
        }
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_owned(), value.to_owned());
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }
}
