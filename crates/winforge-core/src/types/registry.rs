//! Registry edit types
//!
//! Hives and value types are closed enums so an invalid configuration fails
//! at load time instead of mid-run with a partial set of edits applied.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A Windows registry hive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistryHive {
    #[serde(rename = "HKEY_CLASSES_ROOT")]
    ClassesRoot,
    #[serde(rename = "HKEY_CURRENT_USER")]
    CurrentUser,
    #[serde(rename = "HKEY_LOCAL_MACHINE")]
    LocalMachine,
    #[serde(rename = "HKEY_USERS")]
    Users,
    #[serde(rename = "HKEY_CURRENT_CONFIG")]
    CurrentConfig,
}

impl std::fmt::Display for RegistryHive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RegistryHive::ClassesRoot => "HKEY_CLASSES_ROOT",
            RegistryHive::CurrentUser => "HKEY_CURRENT_USER",
            RegistryHive::LocalMachine => "HKEY_LOCAL_MACHINE",
            RegistryHive::Users => "HKEY_USERS",
            RegistryHive::CurrentConfig => "HKEY_CURRENT_CONFIG",
        };
        f.write_str(name)
    }
}

/// Declared type of a registry value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryDataType {
    #[serde(rename = "REG_SZ")]
    String,
    #[serde(rename = "REG_EXPAND_SZ")]
    ExpandableString,
    #[serde(rename = "REG_MULTI_SZ")]
    MultiString,
    #[serde(rename = "REG_DWORD")]
    Dword,
    #[serde(rename = "REG_QWORD")]
    Qword,
    #[serde(rename = "REG_BINARY")]
    Binary,
}

impl std::fmt::Display for RegistryDataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RegistryDataType::String => "REG_SZ",
            RegistryDataType::ExpandableString => "REG_EXPAND_SZ",
            RegistryDataType::MultiString => "REG_MULTI_SZ",
            RegistryDataType::Dword => "REG_DWORD",
            RegistryDataType::Qword => "REG_QWORD",
            RegistryDataType::Binary => "REG_BINARY",
        };
        f.write_str(name)
    }
}

/// A single registry edit from the provisioning plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryChange {
    #[serde(default)]
    pub description: String,

    pub hive: RegistryHive,

    /// Key path below the hive, backslash-separated
    pub key: String,

    /// Value name; an empty string targets the key's default value
    #[serde(rename = "value")]
    pub value_name: String,

    /// Raw data, converted to `type` at apply time. REG_SZ data may embed
    /// `%VAR%` tokens resolved then; REG_MULTI_SZ entries are
    /// newline-separated; REG_BINARY data is hex.
    pub data: String,

    #[serde(rename = "type")]
    pub data_type: RegistryDataType,
}

impl RegistryChange {
    /// Check that `data` is convertible to the declared `type`
    pub fn validate(&self) -> Result<()> {
        match self.data_type {
            RegistryDataType::Dword => {
                self.data.trim().parse::<u32>().map_err(|_| {
                    Error::invalid_registry_data(&self.value_name, "REG_DWORD", &self.data)
                })?;
            }
            RegistryDataType::Qword => {
                self.data.trim().parse::<u64>().map_err(|_| {
                    Error::invalid_registry_data(&self.value_name, "REG_QWORD", &self.data)
                })?;
            }
            RegistryDataType::Binary => {
                let data = self.data.trim();
                let is_hex = data.len() % 2 == 0
                    && data.chars().all(|character| character.is_ascii_hexdigit());
                if !is_hex {
                    return Err(Error::invalid_registry_data(
                        &self.value_name,
                        "REG_BINARY",
                        &self.data,
                    ));
                }
            }
            RegistryDataType::String
            | RegistryDataType::ExpandableString
            | RegistryDataType::MultiString => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(data_type: RegistryDataType, data: &str) -> RegistryChange {
        RegistryChange {
            description: String::new(),
            hive: RegistryHive::CurrentUser,
            key: r"Software\Test".to_string(),
            value_name: "Value".to_string(),
            data: data.to_string(),
            data_type,
        }
    }

    #[test]
    fn test_hive_round_trip() {
        let json = r#""HKEY_LOCAL_MACHINE""#;
        let hive: RegistryHive = serde_json::from_str(json).unwrap();
        assert_eq!(hive, RegistryHive::LocalMachine);
        assert_eq!(serde_json::to_string(&hive).unwrap(), json);
    }

    #[test]
    fn test_unknown_hive_rejected() {
        let result: std::result::Result<RegistryHive, _> =
            serde_json::from_str(r#""HKEY_DYN_DATA""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_dword_validation() {
        assert!(change(RegistryDataType::Dword, "42").validate().is_ok());
        assert!(change(RegistryDataType::Dword, "0").validate().is_ok());
        assert!(change(RegistryDataType::Dword, "not-a-number")
            .validate()
            .is_err());
        assert!(change(RegistryDataType::Dword, "-1").validate().is_err());
    }

    #[test]
    fn test_qword_validation() {
        assert!(change(RegistryDataType::Qword, "4294967296")
            .validate()
            .is_ok());
        assert!(change(RegistryDataType::Qword, "x").validate().is_err());
    }

    #[test]
    fn test_binary_validation() {
        assert!(change(RegistryDataType::Binary, "deadbeef")
            .validate()
            .is_ok());
        assert!(change(RegistryDataType::Binary, "abc").validate().is_err());
        assert!(change(RegistryDataType::Binary, "zz").validate().is_err());
    }

    #[test]
    fn test_string_data_always_valid() {
        assert!(change(RegistryDataType::String, "%USERPROFILE%\\tools")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_change_from_json() {
        let json = r#"{
            "description": "Show file extensions",
            "hive": "HKEY_CURRENT_USER",
            "key": "Software\\Microsoft\\Windows\\CurrentVersion\\Explorer\\Advanced",
            "value": "HideFileExt",
            "data": "0",
            "type": "REG_DWORD"
        }"#;
        let change: RegistryChange = serde_json::from_str(json).unwrap();

        assert_eq!(change.hive, RegistryHive::CurrentUser);
        assert_eq!(change.value_name, "HideFileExt");
        assert_eq!(change.data_type, RegistryDataType::Dword);
        assert!(change.validate().is_ok());
    }
}
