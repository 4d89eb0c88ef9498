//! The canonical, vendor-independent result schema.
//!
//! Every driver — whatever its console speaks — fills one of these per
//! collection pass. Downstream monitoring consumes the serialized form
//! and never sees vendor field names or numeric status codes.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

// ── Vendor ───────────────────────────────────────────────────────────

/// The supported console families.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Vendor {
    /// Synchronous JSON REST console (OceanStor DeviceManager style).
    Huawei,
    /// Asynchronous WebSocket RPC console (Storage Center / DSM style).
    Dell,
    /// Synchronous HTTP JSON-RPC console (Storwize V7000 style).
    IbmV7000,
}

// ── Components ───────────────────────────────────────────────────────

/// Kind of hardware or logical component a health entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ComponentKind {
    StoragePool,
    Disk,
    Volume,
    Fan,
    PowerSupply,
    FcPort,
    Controller,
    Enclosure,
    Node,
    Host,
}

/// Health record for one component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub kind: ComponentKind,
    /// Canonical health label (`"unknown"` when the vendor code is
    /// unmapped).
    pub health: String,
    /// Canonical running-state label, for consoles that report one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running_state: Option<String>,
    /// Component-level capacity, where the console reports it
    /// (pools, disks, volumes). Bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_bytes: Option<i64>,
}

impl ComponentHealth {
    pub fn new(kind: ComponentKind, id: impl Into<String>, health: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            kind,
            health: health.into(),
            running_state: None,
            total_bytes: None,
            free_bytes: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn running(mut self, state: impl Into<String>) -> Self {
        self.running_state = Some(state.into());
        self
    }

    pub fn sized(mut self, total_bytes: i64, free_bytes: Option<i64>) -> Self {
        self.total_bytes = Some(total_bytes);
        self.free_bytes = free_bytes;
        self
    }
}

// ── Capacity ─────────────────────────────────────────────────────────

/// Array-level capacity totals, normalized to bytes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapacitySummary {
    pub total_bytes: i64,
    pub used_bytes: i64,
    pub free_bytes: i64,
    /// Subscribed (thin-provisioned) capacity, for consoles that expose it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribed_bytes: Option<i64>,
}

// ── Performance ──────────────────────────────────────────────────────

/// One performance-counter sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerfSample {
    /// The measured object (vendor id, stable within one console).
    pub object_id: String,
    /// The vendor's resource class for the object (`"lun"`, `"disk"`, ...).
    pub object_kind: String,
    /// Counter name or vendor counter id.
    pub metric: String,
    pub value: f64,
}

// ── ArrayReport ──────────────────────────────────────────────────────

/// The accumulated record for one array: one collection pass, one report.
///
/// Owned and mutated by exactly one driver; never shared across drivers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayReport {
    pub vendor: Vendor,
    /// Console-reported array identity (serial number, device id).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub array_id: Option<String>,
    /// Product model label, where the console reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub capacity: CapacitySummary,
    pub components: Vec<ComponentHealth>,
    pub performance: Vec<PerfSample>,
}

impl ArrayReport {
    pub fn new(vendor: Vendor) -> Self {
        Self {
            vendor,
            array_id: None,
            model: None,
            capacity: CapacitySummary::default(),
            components: Vec::new(),
            performance: Vec::new(),
        }
    }

    /// Components of one kind, for consumers and tests.
    pub fn components_of(&self, kind: ComponentKind) -> impl Iterator<Item = &ComponentHealth> {
        self.components.iter().filter(move |c| c.kind == kind)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn vendor_parses_from_config_strings() {
        assert_eq!(Vendor::from_str("huawei").unwrap(), Vendor::Huawei);
        assert_eq!(Vendor::from_str("DELL").unwrap(), Vendor::Dell);
        assert_eq!(Vendor::from_str("ibm_v7000").unwrap(), Vendor::IbmV7000);
        assert!(Vendor::from_str("netapp").is_err());
    }

    #[test]
    fn report_serializes_without_empty_options() {
        let mut report = ArrayReport::new(Vendor::Huawei);
        report.components.push(
            ComponentHealth::new(ComponentKind::StoragePool, "0", "NORMAL").running("ONLINE"),
        );

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["vendor"], "huawei");
        assert_eq!(value["components"][0]["kind"], "storage_pool");
        assert_eq!(value["components"][0]["health"], "NORMAL");
        assert_eq!(value["components"][0]["running_state"], "ONLINE");
        // Unset optionals are omitted entirely.
        assert!(value["components"][0].get("name").is_none());
        assert!(value.get("array_id").is_none());
    }

    #[test]
    fn components_of_filters_by_kind() {
        let mut report = ArrayReport::new(Vendor::Dell);
        report
            .components
            .push(ComponentHealth::new(ComponentKind::Disk, "d1", "Up"));
        report
            .components
            .push(ComponentHealth::new(ComponentKind::Enclosure, "e1", "Up"));
        report
            .components
            .push(ComponentHealth::new(ComponentKind::Disk, "d2", "Down"));

        assert_eq!(report.components_of(ComponentKind::Disk).count(), 2);
        assert_eq!(report.components_of(ComponentKind::Fan).count(), 0);
    }
}
