//! Vendor status-code translation.
//!
//! Each console reports component health and running state as numeric
//! codes private to its vendor. The mapping to readable labels is an
//! externally maintained JSON document, injected at construction — it is
//! not compiled into the binary, because the tables change with firmware
//! releases and are corrected by hand.
//!
//! The source document is laid out the way the vendors publish it, one
//! object per enum category mapping canonical label → vendor code:
//!
//! ```json
//! {
//!   "HEALTH_STATUS_E": { "NORMAL": 1, "FAULT": 2, "DEGRADED": 5 },
//!   "RUNNING_STATUS_E": { "ONLINE": "27", "OFFLINE": "28" }
//! }
//! ```
//!
//! Lookups go the other way (code → label), so the table is inverted once
//! at load time. Translation is total: an unmapped code resolves to
//! [`UNKNOWN_LABEL`], never an error — a table lagging a firmware update
//! must not abort a collection pass.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::error::Error;

/// Sentinel label for codes the table does not cover.
pub const UNKNOWN_LABEL: &str = "unknown";

/// An inverted, read-only vendor enum table: category → code → label.
#[derive(Debug, Clone, Default)]
pub struct EnumTable {
    categories: HashMap<String, HashMap<String, String>>,
}

impl EnumTable {
    /// A table with no entries; every translation yields the sentinel.
    /// For vendors that report health as plain words rather than codes.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse and invert a vendor enum document.
    pub fn from_json_str(raw: &str) -> Result<Self, Error> {
        let doc: HashMap<String, HashMap<String, serde_json::Value>> =
            serde_json::from_str(raw).map_err(|e| Error::InvalidEnumTable(e.to_string()))?;

        let mut categories = HashMap::with_capacity(doc.len());
        for (category, entries) in doc {
            let mut by_code = HashMap::with_capacity(entries.len());
            for (label, code) in entries {
                by_code.insert(code_key(&category, &code)?, label);
            }
            categories.insert(category, by_code);
        }
        Ok(Self { categories })
    }

    /// Load a vendor enum document from disk.
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Translate a vendor code within a category.
    ///
    /// Total: unknown categories and unmapped codes yield
    /// [`UNKNOWN_LABEL`] (logged at debug level).
    pub fn translate(&self, category: &str, vendor_code: &str) -> &str {
        match self
            .categories
            .get(category)
            .and_then(|table| table.get(vendor_code))
        {
            Some(label) => label,
            None => {
                debug!(category, vendor_code, "no enum mapping, using sentinel");
                UNKNOWN_LABEL
            }
        }
    }

    /// Number of categories in the table.
    pub fn category_count(&self) -> usize {
        self.categories.len()
    }
}

/// Vendor codes appear as JSON strings or numbers; both key the same way.
fn code_key(category: &str, code: &serde_json::Value) -> Result<String, Error> {
    match code {
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(Error::InvalidEnumTable(format!(
            "category {category}: unsupported code value {other}"
        ))),
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"{
        "HEALTH_STATUS_E": { "NORMAL": 1, "FAULT": 2, "DEGRADED": 5 },
        "RUNNING_STATUS_E": { "ONLINE": "27", "OFFLINE": "28" }
    }"#;

    #[test]
    fn translates_numeric_codes() {
        let table = EnumTable::from_json_str(TABLE).unwrap();
        assert_eq!(table.translate("HEALTH_STATUS_E", "1"), "NORMAL");
        assert_eq!(table.translate("HEALTH_STATUS_E", "5"), "DEGRADED");
    }

    #[test]
    fn translates_string_codes() {
        let table = EnumTable::from_json_str(TABLE).unwrap();
        assert_eq!(table.translate("RUNNING_STATUS_E", "27"), "ONLINE");
    }

    #[test]
    fn unmapped_code_yields_sentinel() {
        let table = EnumTable::from_json_str(TABLE).unwrap();
        assert_eq!(table.translate("HEALTH_STATUS_E", "999"), UNKNOWN_LABEL);
    }

    #[test]
    fn unknown_category_yields_sentinel() {
        let table = EnumTable::from_json_str(TABLE).unwrap();
        assert_eq!(table.translate("NO_SUCH_CATEGORY", "1"), UNKNOWN_LABEL);
    }

    #[test]
    fn empty_table_is_total() {
        let table = EnumTable::empty();
        assert_eq!(table.translate("HEALTH_STATUS_E", "1"), UNKNOWN_LABEL);
    }

    #[test]
    fn malformed_document_is_a_load_error() {
        assert!(matches!(
            EnumTable::from_json_str("[1, 2, 3]"),
            Err(Error::InvalidEnumTable(_))
        ));
    }

    #[test]
    fn non_scalar_code_is_a_load_error() {
        let raw = r#"{ "HEALTH_STATUS_E": { "NORMAL": [1] } }"#;
        assert!(matches!(
            EnumTable::from_json_str(raw),
            Err(Error::InvalidEnumTable(_))
        ));
    }
}
