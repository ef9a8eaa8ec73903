//! Vendor MAC-prefix table. Loaded once from a JSON resource shaped as
//! `{"vendors": {"<Brand>": {"prefixes": {"<6-hex>": "<model>"}}}}` and
//! inverted into a prefix lookup.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::error::{Result, SnifferError};

#[derive(Debug, Deserialize)]
struct VendorFile {
    vendors: BTreeMap<String, VendorSection>,
}

#[derive(Debug, Deserialize)]
struct VendorSection {
    #[serde(default)]
    prefixes: BTreeMap<String, String>,
}

/// Result of a prefix lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VendorMatch<'a> {
    Matched { brand: &'a str, model: &'a str },
    NoMatch,
}

#[derive(Debug, Clone)]
struct VendorEntry {
    brand: String,
    model: String,
}

#[derive(Debug, Default, Clone)]
pub struct VendorDatabase {
    by_prefix: HashMap<String, VendorEntry>,
}

impl VendorDatabase {
    /// An empty table: every lookup is `NoMatch`.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: VendorFile = serde_json::from_str(json)
            .map_err(|e| SnifferError::Configuration(format!("malformed vendor database: {}", e)))?;

        let mut by_prefix: HashMap<String, VendorEntry> = HashMap::new();
        for (brand, section) in file.vendors {
            for (raw_prefix, model) in section.prefixes {
                let Some(prefix) = normalize_prefix(&raw_prefix) else {
                    warn!(brand = %brand, prefix = %raw_prefix, "skipping invalid vendor prefix");
                    continue;
                };
                if let Some(existing) = by_prefix.get(&prefix) {
                    warn!(
                        prefix = %prefix,
                        kept = %existing.brand,
                        ignored = %brand,
                        "vendor prefix listed under more than one brand"
                    );
                    continue;
                }
                by_prefix.insert(
                    prefix,
                    VendorEntry {
                        brand: brand.clone(),
                        model,
                    },
                );
            }
        }

        Ok(Self { by_prefix })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            SnifferError::Configuration(format!(
                "cannot read vendor database {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&json)
    }

    /// Load the table, degrading to an empty one when the resource is missing
    /// or malformed. Startup never fails because of the vendor table.
    pub fn load_or_empty(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::from_path(path) {
            Ok(db) => {
                info!(path = %path.display(), prefixes = db.len(), "vendor database loaded");
                db
            }
            Err(e) => {
                error!(error = %e, "OUI matching disabled");
                Self::empty()
            }
        }
    }

    /// Look up a 6-hex-digit prefix (case and separators ignored).
    pub fn lookup(&self, prefix: &str) -> VendorMatch<'_> {
        let Some(prefix) = normalize_prefix(prefix) else {
            return VendorMatch::NoMatch;
        };
        match self.by_prefix.get(&prefix) {
            Some(entry) => VendorMatch::Matched {
                brand: &entry.brand,
                model: &entry.model,
            },
            None => VendorMatch::NoMatch,
        }
    }

    pub fn len(&self) -> usize {
        self.by_prefix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_prefix.is_empty()
    }
}

fn normalize_prefix(raw: &str) -> Option<String> {
    let hex: String = raw
        .chars()
        .filter(|c| *c != ':' && *c != '-')
        .collect::<String>()
        .to_ascii_uppercase();
    if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(hex)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "vendors": {
            "Ubiquiti": {"prefixes": {"0418D6": "Unifi Series", "74:83:c2": "airMAX"}},
            "Mimosa": {"prefixes": {"20B5C6": "C5x/B5x Series", "7483C2": "Mimosa Device"}},
            "Mikrotik": {"prefixes": {"000C42": "RouterBoard Series", "XYZ": "bogus"}}
        }
    }"#;

    #[test]
    fn test_lookup_present_prefix() {
        let db = VendorDatabase::from_json_str(SAMPLE).unwrap();
        assert_eq!(
            db.lookup("0418D6"),
            VendorMatch::Matched {
                brand: "Ubiquiti",
                model: "Unifi Series"
            }
        );
        assert_eq!(
            db.lookup("000c42"),
            VendorMatch::Matched {
                brand: "Mikrotik",
                model: "RouterBoard Series"
            }
        );
    }

    #[test]
    fn test_lookup_absent_prefix() {
        let db = VendorDatabase::from_json_str(SAMPLE).unwrap();
        assert_eq!(db.lookup("AABBCC"), VendorMatch::NoMatch);
        assert_eq!(db.lookup("not hex"), VendorMatch::NoMatch);
    }

    #[test]
    fn test_conflicting_prefix_keeps_first_brand() {
        let db = VendorDatabase::from_json_str(SAMPLE).unwrap();
        // "Mimosa" sorts before "Ubiquiti"
        assert_eq!(
            db.lookup("7483C2"),
            VendorMatch::Matched {
                brand: "Mimosa",
                model: "Mimosa Device"
            }
        );
        // Invalid "XYZ" skipped, conflicting duplicate skipped
        assert_eq!(db.len(), 4);
    }

    #[test]
    fn test_malformed_json_is_configuration_error() {
        let err = VendorDatabase::from_json_str("{\"vendors\": [").unwrap_err();
        assert!(matches!(err, SnifferError::Configuration(_)));
    }

    #[test]
    fn test_missing_file_degrades_to_empty() {
        let db = VendorDatabase::load_or_empty("/nonexistent/vendors.json");
        assert!(db.is_empty());
        assert_eq!(db.lookup("0418D6"), VendorMatch::NoMatch);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let db = VendorDatabase::load_or_empty(file.path());
        assert_eq!(db.len(), 4);
    }

    #[test]
    fn test_shipped_vendor_file_parses() {
        let json = include_str!("../vendors.json");
        let db = VendorDatabase::from_json_str(json).unwrap();
        assert_eq!(
            db.lookup("0418D6"),
            VendorMatch::Matched {
                brand: "Ubiquiti",
                model: "Unifi Series"
            }
        );
    }
}
