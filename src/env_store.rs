//! Credential dotfile store.
//!
//! Values live in a flat `KEY=VALUE` dotfile. On load, entries are applied
//! the way `dotenv` does it: a variable already present in the server's
//! environment wins. Saving merges non-empty submitted values into the
//! file (existing key order kept, new keys appended) and makes them live
//! for every run started afterwards.
//!
//! Live values are kept in an in-process overlay that is passed to each
//! child process, rather than mutating the server's own environment while
//! other threads may be reading it.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::{info, warn};

use crate::{AppError, Result};

/// Dotfile-backed credential values.
#[derive(Debug)]
pub struct EnvStore {
    path: PathBuf,
    live: RwLock<BTreeMap<String, String>>,
}

impl EnvStore {
    /// Load the dotfile at `path`; a missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file exists but cannot be read.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let live = read_entries(&path)?
            .into_iter()
            .filter(|(key, _)| env::var_os(key).is_none())
            .collect();
        Ok(Self {
            path,
            live: RwLock::new(live),
        })
    }

    /// Path of the backing dotfile.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current value of `key`: saved or dotfile value first, then the
    /// server's environment.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.read_live()
            .get(key)
            .cloned()
            .or_else(|| env::var(key).ok())
    }

    /// Variables to add to a child process's inherited environment.
    #[must_use]
    pub fn child_env(&self) -> Vec<(String, String)> {
        self.read_live()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Merge `submitted` into the dotfile and the live overlay.
    ///
    /// Entries whose value is empty or whitespace-only are ignored, so an
    /// empty form field never clears a stored credential. Returns the
    /// number of keys written.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for a malformed key, or
    /// `AppError::Io` if the dotfile cannot be read or rewritten.
    pub fn save<I, K, V>(&self, submitted: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let updates: Vec<(String, String)> = submitted
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(_, v)| !v.trim().is_empty())
            .collect();

        if let Some((key, _)) = updates.iter().find(|(k, _)| !is_valid_key(k)) {
            return Err(AppError::Validation(format!(
                "invalid environment variable name: {key:?}"
            )));
        }
        if updates.is_empty() {
            return Ok(0);
        }

        let mut entries = read_entries(&self.path)?;
        for (key, value) in &updates {
            match entries.iter_mut().find(|(k, _)| k == key) {
                Some(entry) => entry.1.clone_from(value),
                None => entries.push((key.clone(), value.clone())),
            }
        }
        write_entries(&self.path, &entries)?;

        let mut live = self
            .live
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for (key, value) in updates.iter().cloned() {
            live.insert(key, value);
        }
        drop(live);

        info!(path = %self.path.display(), count = updates.len(), "environment values saved");
        Ok(updates.len())
    }

    fn read_live(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, String>> {
        self.live
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Read dotfile entries in file order. A missing file yields no entries;
/// unparseable lines are logged and skipped.
///
/// # Errors
///
/// Returns `AppError::Io` if the file exists but cannot be opened.
pub fn read_entries(path: &Path) -> Result<Vec<(String, String)>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let iter = dotenvy::from_path_iter(path)
        .map_err(|err| AppError::Io(format!("failed to read {}: {err}", path.display())))?;

    let mut entries: Vec<(String, String)> = Vec::new();
    for item in iter {
        match item {
            Ok((key, value)) => match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = value,
                None => entries.push((key, value)),
            },
            Err(err) => warn!(path = %path.display(), %err, "skipping malformed dotfile line"),
        }
    }
    Ok(entries)
}

/// Atomically rewrite the dotfile with `entries`.
fn write_entries(path: &Path, entries: &[(String, String)]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)
        .map_err(|err| AppError::Io(format!("failed to create {}: {err}", dir.display())))?;

    let mut body = String::new();
    for (key, value) in entries {
        body.push_str(key);
        body.push('=');
        body.push_str(&quote_value(value));
        body.push('\n');
    }

    let mut temp = tempfile::NamedTempFile::new_in(&dir)
        .map_err(|err| AppError::Io(format!("failed to create temp file: {err}")))?;
    temp.write_all(body.as_bytes())
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|err| AppError::Io(format!("failed to write {}: {err}", path.display())))?;
    temp.persist(path)
        .map_err(|err| AppError::Io(format!("failed to replace {}: {err}", path.display())))?;
    Ok(())
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Quote `value` so the dotfile parser reads it back verbatim.
fn quote_value(value: &str) -> String {
    let plain = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./:@+,%".contains(c));
    if plain {
        value.to_owned()
    } else if !value.contains('\'') && !value.contains('\n') {
        format!("'{value}'")
    } else {
        let mut quoted = String::with_capacity(value.len() + 2);
        quoted.push('"');
        for c in value.chars() {
            match c {
                '"' | '\\' | '$' => {
                    quoted.push('\\');
                    quoted.push(c);
                }
                '\n' => quoted.push_str("\\n"),
                _ => quoted.push(c),
            }
        }
        quoted.push('"');
        quoted
    }
}
