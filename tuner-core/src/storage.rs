//! # Storage Module
//!
//! Key/value persistence for user settings. The tuner only stores the reference pitch, as a
//! stringified float, but the collaborator is a plain string map.

use anyhow::{Context, Result};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Storage key of the reference pitch.
pub const REFERENCE_PITCH_KEY: &str = "reference-pitch";

/// Settings persistence collaborator.
pub trait Storage {
    /// Returns the stored value, or `None` when the key was never saved.
    fn load(&self, key: &str) -> Option<String>;

    /// Stores a value under `key`.
    fn save(&mut self, key: &str, value: &str) -> Result<()>;
}

/// In-memory storage. Clones share the same map, so a caller can keep a handle to inspect what
/// a component saved.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Rc<RefCell<BTreeMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a storage pre-filled with one entry.
    pub fn with_entry(key: &str, value: &str) -> Self {
        let storage = Self::default();
        storage
            .entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        storage
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }
}

impl Storage for MemoryStorage {
    fn load(&self, key: &str) -> Option<String> {
        self.get(key)
    }

    fn save(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Storage backed by a JSON file holding a flat string map.
///
/// The whole map is read when opening and rewritten on every save.
#[derive(Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl JsonFileStorage {
    /// Opens the file at `path`. A missing file starts an empty map; a file that exists but
    /// cannot be read or parsed is an error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = if path.exists() {
            let mut file = File::open(&path)
                .with_context(|| format!("Failed to open settings file: {}", path.display()))?;
            let mut data = String::new();
            file.read_to_string(&mut data)?;
            serde_json::from_str(&data)
                .with_context(|| format!("Failed to parse settings file: {}", path.display()))?
        } else {
            BTreeMap::new()
        };

        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for JsonFileStorage {
    fn load(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn save(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());

        let json_string = serde_json::to_string_pretty(&self.entries)?;
        let mut file = File::create(&self.path)
            .with_context(|| format!("Failed to write settings file: {}", self.path.display()))?;
        file.write_all(json_string.as_bytes())?;
        Ok(())
    }
}
