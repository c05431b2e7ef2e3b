//! Registry helper.
//!
//! Wraps string-valued reads and writes under one hive. Reads degrade to
//! `None` on any failure; writes report an [`Outcome`].

use crate::adapter::Outcome;
use std::collections::HashMap;
use std::sync::Mutex;

/// Backend trait for registry access
pub trait RegistryBackend: Send + Sync {
    /// Read a string value; `None` for a missing key, missing value or any
    /// access failure
    fn get_string(&self, path: &str, value: &str) -> Option<String>;

    /// Write a string value, creating the key if needed
    fn set_string(&self, path: &str, value: &str, data: &str) -> Outcome;

    /// Delete a value
    fn delete_value(&self, path: &str, value: &str) -> Outcome;
}

/// In-memory registry backend
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    values: Mutex<HashMap<(String, String), String>>,
}

impl MemoryRegistry {
    /// Create an empty in-memory registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-seeded with `(path, value, data)` entries
    pub fn with_values<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, S, S)>,
        S: Into<String>,
    {
        let values = entries
            .into_iter()
            .map(|(p, v, d)| ((p.into(), v.into()), d.into()))
            .collect();
        Self {
            values: Mutex::new(values),
        }
    }
}

impl RegistryBackend for MemoryRegistry {
    fn get_string(&self, path: &str, value: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap()
            .get(&(path.to_string(), value.to_string()))
            .cloned()
    }

    fn set_string(&self, path: &str, value: &str, data: &str) -> Outcome {
        self.values
            .lock()
            .unwrap()
            .insert((path.to_string(), value.to_string()), data.to_string());
        Outcome::ok()
    }

    fn delete_value(&self, path: &str, value: &str) -> Outcome {
        match self
            .values
            .lock()
            .unwrap()
            .remove(&(path.to_string(), value.to_string()))
        {
            Some(_) => Outcome::ok(),
            None => Outcome::failed(format!("Value '{value}' not found under '{path}'")),
        }
    }
}

/// Registry backend over HKEY_LOCAL_MACHINE
#[cfg(windows)]
pub struct WindowsRegistry;

#[cfg(windows)]
impl WindowsRegistry {
    /// Create a backend rooted at HKEY_LOCAL_MACHINE
    pub fn new() -> Self {
        Self
    }
}

#[cfg(windows)]
impl Default for WindowsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(windows)]
impl RegistryBackend for WindowsRegistry {
    fn get_string(&self, path: &str, value: &str) -> Option<String> {
        use winreg::RegKey;
        use winreg::enums::HKEY_LOCAL_MACHINE;

        let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
        let key = hklm.open_subkey(path).ok()?;
        key.get_value::<String, _>(value).ok()
    }

    fn set_string(&self, path: &str, value: &str, data: &str) -> Outcome {
        use winreg::RegKey;
        use winreg::enums::HKEY_LOCAL_MACHINE;

        let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
        let (key, _) = match hklm.create_subkey(path) {
            Ok(pair) => pair,
            Err(e) => return Outcome::failed(e.to_string()),
        };
        match key.set_value(value, &data.to_string()) {
            Ok(()) => Outcome::ok(),
            Err(e) => Outcome::failed(e.to_string()),
        }
    }

    fn delete_value(&self, path: &str, value: &str) -> Outcome {
        use winreg::RegKey;
        use winreg::enums::{HKEY_LOCAL_MACHINE, KEY_SET_VALUE};

        let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
        let key = match hklm.open_subkey_with_flags(path, KEY_SET_VALUE) {
            Ok(key) => key,
            Err(e) => return Outcome::failed(e.to_string()),
        };
        match key.delete_value(value) {
            Ok(()) => Outcome::ok(),
            Err(e) => Outcome::failed(e.to_string()),
        }
    }
}
