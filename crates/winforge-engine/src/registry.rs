//! Registry store seam
//!
//! All registry access goes through `RegistryStore` so the engine can be
//! exercised on any platform and so policy/environment writes are testable.
//! `WindowsRegistry` backs onto the live registry; `MemoryRegistry` is the
//! in-process double used by tests, dry runs, and non-Windows builds.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use winforge_core::types::{RegistryChange, RegistryDataType, RegistryHive};
use winforge_core::utils::expand_env_tokens;

use crate::errlog::ErrorLog;
use crate::error::{EngineError, Result};

/// A typed registry value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryValue {
    String(String),
    ExpandableString(String),
    MultiString(Vec<String>),
    Dword(u32),
    Qword(u64),
    Binary(Vec<u8>),
}

impl RegistryValue {
    /// String content for the two string-typed variants
    pub fn as_string(&self) -> Option<&str> {
        match self {
            RegistryValue::String(value) | RegistryValue::ExpandableString(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_dword(&self) -> Option<u32> {
        match self {
            RegistryValue::Dword(value) => Some(*value),
            _ => None,
        }
    }
}

/// Registry access used by the engine
///
/// `set_value` creates the key implicitly; `set_values` performs one batched
/// write against a single opened key.
pub trait RegistryStore: Send + Sync {
    fn create_key(&self, hive: RegistryHive, path: &str) -> Result<()>;

    fn set_value(
        &self,
        hive: RegistryHive,
        path: &str,
        name: &str,
        value: &RegistryValue,
    ) -> Result<()>;

    fn set_values(
        &self,
        hive: RegistryHive,
        path: &str,
        values: &[(String, RegistryValue)],
    ) -> Result<()>;

    fn get_value(&self, hive: RegistryHive, path: &str, name: &str)
        -> Result<Option<RegistryValue>>;

    fn list_values(&self, hive: RegistryHive, path: &str) -> Result<Vec<(String, RegistryValue)>>;

    fn list_subkeys(&self, hive: RegistryHive, path: &str) -> Result<Vec<String>>;
}

/// In-memory registry double
///
/// Key paths compare case-insensitively, like the real registry.
#[derive(Default)]
pub struct MemoryRegistry {
    keys: Mutex<HashMap<(RegistryHive, String), BTreeMap<String, RegistryValue>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(path: &str) -> String {
        path.trim_matches('\\').to_lowercase()
    }
}

impl RegistryStore for MemoryRegistry {
    fn create_key(&self, hive: RegistryHive, path: &str) -> Result<()> {
        self.keys
            .lock()
            .unwrap()
            .entry((hive, Self::normalize(path)))
            .or_default();
        Ok(())
    }

    fn set_value(
        &self,
        hive: RegistryHive,
        path: &str,
        name: &str,
        value: &RegistryValue,
    ) -> Result<()> {
        self.keys
            .lock()
            .unwrap()
            .entry((hive, Self::normalize(path)))
            .or_default()
            .insert(name.to_string(), value.clone());
        Ok(())
    }

    fn set_values(
        &self,
        hive: RegistryHive,
        path: &str,
        values: &[(String, RegistryValue)],
    ) -> Result<()> {
        let mut keys = self.keys.lock().unwrap();
        let entry = keys.entry((hive, Self::normalize(path))).or_default();
        for (name, value) in values {
            entry.insert(name.clone(), value.clone());
        }
        Ok(())
    }

    fn get_value(
        &self,
        hive: RegistryHive,
        path: &str,
        name: &str,
    ) -> Result<Option<RegistryValue>> {
        Ok(self
            .keys
            .lock()
            .unwrap()
            .get(&(hive, Self::normalize(path)))
            .and_then(|values| values.get(name))
            .cloned())
    }

    fn list_values(&self, hive: RegistryHive, path: &str) -> Result<Vec<(String, RegistryValue)>> {
        Ok(self
            .keys
            .lock()
            .unwrap()
            .get(&(hive, Self::normalize(path)))
            .map(|values| {
                values
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_subkeys(&self, hive: RegistryHive, path: &str) -> Result<Vec<String>> {
        let prefix = format!("{}\\", Self::normalize(path));
        let keys = self.keys.lock().unwrap();

        let mut subkeys = BTreeSet::new();
        for (stored_hive, stored_path) in keys.keys() {
            if *stored_hive != hive {
                continue;
            }
            if let Some(rest) = stored_path.strip_prefix(&prefix) {
                if let Some(first) = rest.split('\\').next() {
                    if !first.is_empty() {
                        subkeys.insert(first.to_string());
                    }
                }
            }
        }

        Ok(subkeys.into_iter().collect())
    }
}

/// Live registry access through the Windows API
#[cfg(windows)]
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsRegistry;

#[cfg(windows)]
mod windows_impl {
    use super::*;
    use winreg::enums::{
        HKEY_CLASSES_ROOT, HKEY_CURRENT_CONFIG, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, HKEY_USERS,
        KEY_READ,
    };
    use winreg::{RegKey, RegValue as RawValue};

    fn root(hive: RegistryHive) -> RegKey {
        let handle = match hive {
            RegistryHive::ClassesRoot => HKEY_CLASSES_ROOT,
            RegistryHive::CurrentUser => HKEY_CURRENT_USER,
            RegistryHive::LocalMachine => HKEY_LOCAL_MACHINE,
            RegistryHive::Users => HKEY_USERS,
            RegistryHive::CurrentConfig => HKEY_CURRENT_CONFIG,
        };
        RegKey::predef(handle)
    }

    fn registry_err(err: std::io::Error) -> EngineError {
        EngineError::registry(err.to_string())
    }

    fn encode_utf16(value: &str) -> Vec<u8> {
        value
            .encode_utf16()
            .chain(std::iter::once(0))
            .flat_map(|unit| unit.to_le_bytes())
            .collect()
    }

    fn write_value(key: &RegKey, name: &str, value: &RegistryValue) -> std::io::Result<()> {
        use winreg::enums::RegType;

        match value {
            RegistryValue::String(text) => key.set_value(name, text),
            RegistryValue::Dword(number) => key.set_value(name, number),
            RegistryValue::Qword(number) => key.set_value(name, number),
            RegistryValue::ExpandableString(text) => key.set_raw_value(
                name,
                &RawValue {
                    bytes: encode_utf16(text),
                    vtype: RegType::REG_EXPAND_SZ,
                },
            ),
            RegistryValue::MultiString(entries) => {
                let mut bytes = Vec::new();
                for entry in entries {
                    bytes.extend(encode_utf16(entry));
                }
                bytes.extend([0, 0]);
                key.set_raw_value(
                    name,
                    &RawValue {
                        bytes,
                        vtype: RegType::REG_MULTI_SZ,
                    },
                )
            }
            RegistryValue::Binary(bytes) => key.set_raw_value(
                name,
                &RawValue {
                    bytes: bytes.clone(),
                    vtype: RegType::REG_BINARY,
                },
            ),
        }
    }

    fn decode_value(raw: &RawValue) -> Option<RegistryValue> {
        use winreg::enums::RegType;

        let decode_utf16 = |bytes: &[u8]| {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
                .trim_end_matches('\0')
                .to_string()
        };

        match raw.vtype {
            RegType::REG_SZ => Some(RegistryValue::String(decode_utf16(&raw.bytes))),
            RegType::REG_EXPAND_SZ => Some(RegistryValue::ExpandableString(decode_utf16(&raw.bytes))),
            RegType::REG_MULTI_SZ => {
                let joined = decode_utf16(&raw.bytes);
                Some(RegistryValue::MultiString(
                    joined
                        .split('\0')
                        .filter(|entry| !entry.is_empty())
                        .map(str::to_string)
                        .collect(),
                ))
            }
            RegType::REG_DWORD => raw
                .bytes
                .get(..4)
                .map(|bytes| u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
                .map(RegistryValue::Dword),
            RegType::REG_QWORD => raw.bytes.get(..8).map(|bytes| {
                RegistryValue::Qword(u64::from_le_bytes([
                    bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
                ]))
            }),
            RegType::REG_BINARY => Some(RegistryValue::Binary(raw.bytes.clone())),
            _ => None,
        }
    }

    impl RegistryStore for WindowsRegistry {
        fn create_key(&self, hive: RegistryHive, path: &str) -> Result<()> {
            root(hive).create_subkey(path).map_err(registry_err)?;
            Ok(())
        }

        fn set_value(
            &self,
            hive: RegistryHive,
            path: &str,
            name: &str,
            value: &RegistryValue,
        ) -> Result<()> {
            let (key, _) = root(hive).create_subkey(path).map_err(registry_err)?;
            write_value(&key, name, value).map_err(registry_err)
        }

        fn set_values(
            &self,
            hive: RegistryHive,
            path: &str,
            values: &[(String, RegistryValue)],
        ) -> Result<()> {
            let (key, _) = root(hive).create_subkey(path).map_err(registry_err)?;
            for (name, value) in values {
                write_value(&key, name, value).map_err(registry_err)?;
            }
            Ok(())
        }

        fn get_value(
            &self,
            hive: RegistryHive,
            path: &str,
            name: &str,
        ) -> Result<Option<RegistryValue>> {
            let key = match root(hive).open_subkey_with_flags(path, KEY_READ) {
                Ok(key) => key,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(err) => return Err(registry_err(err)),
            };

            match key.get_raw_value(name) {
                Ok(raw) => Ok(decode_value(&raw)),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(err) => Err(registry_err(err)),
            }
        }

        fn list_values(
            &self,
            hive: RegistryHive,
            path: &str,
        ) -> Result<Vec<(String, RegistryValue)>> {
            let key = match root(hive).open_subkey_with_flags(path, KEY_READ) {
                Ok(key) => key,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(err) => return Err(registry_err(err)),
            };

            let mut values = Vec::new();
            for entry in key.enum_values() {
                let (name, raw) = entry.map_err(registry_err)?;
                if let Some(value) = decode_value(&raw) {
                    values.push((name, value));
                }
            }
            Ok(values)
        }

        fn list_subkeys(&self, hive: RegistryHive, path: &str) -> Result<Vec<String>> {
            let key = match root(hive).open_subkey_with_flags(path, KEY_READ) {
                Ok(key) => key,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(err) => return Err(registry_err(err)),
            };

            key.enum_keys()
                .collect::<std::io::Result<Vec<String>>>()
                .map_err(registry_err)
        }
    }
}

/// The platform's default registry store
pub fn platform_registry() -> Arc<dyn RegistryStore> {
    #[cfg(windows)]
    {
        Arc::new(WindowsRegistry)
    }
    #[cfg(not(windows))]
    {
        Arc::new(MemoryRegistry::new())
    }
}

/// Convert a configured registry change's data into a typed value
///
/// REG_SZ data resolves `%VAR%` tokens at apply time; numeric and binary
/// conversions were already shape-checked at configuration load.
pub fn convert_change_data(change: &RegistryChange) -> Result<RegistryValue> {
    let value = match change.data_type {
        RegistryDataType::String => RegistryValue::String(expand_env_tokens(&change.data)),
        RegistryDataType::ExpandableString => RegistryValue::ExpandableString(change.data.clone()),
        RegistryDataType::MultiString => RegistryValue::MultiString(
            change
                .data
                .split('\n')
                .map(|entry| entry.trim_end_matches('\r').to_string())
                .filter(|entry| !entry.is_empty())
                .collect(),
        ),
        RegistryDataType::Dword => RegistryValue::Dword(
            change
                .data
                .trim()
                .parse::<u32>()
                .map_err(|_| EngineError::registry(format!("invalid DWORD data: {}", change.data)))?,
        ),
        RegistryDataType::Qword => RegistryValue::Qword(
            change
                .data
                .trim()
                .parse::<u64>()
                .map_err(|_| EngineError::registry(format!("invalid QWORD data: {}", change.data)))?,
        ),
        RegistryDataType::Binary => RegistryValue::Binary(
            hex::decode(change.data.trim())
                .map_err(|err| EngineError::registry(format!("invalid binary data: {}", err)))?,
        ),
    };

    Ok(value)
}

/// Applies configured registry edits with per-edit failure isolation
pub struct RegistryEditor {
    store: Arc<dyn RegistryStore>,
    error_log: ErrorLog,
}

impl RegistryEditor {
    pub fn new(store: Arc<dyn RegistryStore>, error_log: ErrorLog) -> Self {
        Self { store, error_log }
    }

    /// Apply every configured change; individual failures are logged and
    /// skipped so one bad edit never blocks the rest of a category.
    pub fn apply_changes(&self, changes: &IndexMap<String, Vec<RegistryChange>>) {
        for (category, entries) in changes {
            for change in entries {
                if let Err(err) = self.apply_one(change) {
                    tracing::warn!(
                        category = %category,
                        key = %change.key,
                        error = %err,
                        "registry change failed"
                    );
                    self.error_log.append(
                        &format!("registry change: {}\\{}", change.hive, change.key),
                        &err.to_string(),
                    );
                }
            }
            tracing::info!(category = %category, "applied registry changes");
        }
    }

    fn apply_one(&self, change: &RegistryChange) -> Result<()> {
        let value = convert_change_data(change)?;
        self.store
            .set_value(change.hive, &change.key, &change.value_name, &value)
    }
}
