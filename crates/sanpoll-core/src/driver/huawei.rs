//! Driver for the OceanStor DeviceManager console (synchronous JSON REST).
//!
//! Everything lives under `/deviceManager/rest/{deviceId}/...`; the
//! device id comes back from the login call, and the login URL itself
//! uses the console's `xxxxx` bootstrap placeholder. Business status
//! rides inside the 200 response as `error.code`: `"0"` is success and
//! `"-401"` is the authorization-expired code — the only code that may
//! invalidate the cached session.

use reqwest::Method;
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

use sanpoll_api::{ApiClient, EnumTable, Session, SessionStore, SessionToken, TransportConfig};

use crate::config::{ArrayConfig, Credentials};
use crate::driver::{array_at, classify_business, i64_at, login_error, str_at, string_at};
use crate::error::CoreError;
use crate::model::{ArrayReport, CapacitySummary, ComponentHealth, ComponentKind, PerfSample, Vendor};

const REST_PREFIX: &str = "/deviceManager/rest";
/// Login URL device-id placeholder accepted by the console.
const BOOTSTRAP_DEVICE_ID: &str = "xxxxx";
/// Business code signalling an expired authorization.
const AUTH_EXPIRED_CODE: &str = "-401";

const HEALTH_CATEGORY: &str = "HEALTH_STATUS_E";
const RUNNING_CATEGORY: &str = "RUNNING_STATUS_E";
const PRODUCT_CATEGORY: &str = "PRODUCT_MODE_E";

/// Counter ids: total/read/write IOPS, max IOPS, read/write bandwidth.
const PERF_DATA_IDS: &str = "22,25,28,307,23,26";
/// Disk domains do not report max IOPS.
const PERF_DATA_IDS_NO_MAX: &str = "22,25,28,23,26";

const SECTOR_SIZE_FALLBACK: i64 = 512;

pub struct HuaweiDriver {
    client: ApiClient,
    enums: EnumTable,
    credentials: Credentials,
    device_id: Option<String>,
    sector_size: i64,
}

impl HuaweiDriver {
    pub fn new(config: &ArrayConfig) -> Result<Self, CoreError> {
        let session = Arc::new(Session::new(SessionStore::new(&config.session_file)));
        let transport = TransportConfig {
            timeout: config.timeout,
        };
        let client = ApiClient::new(config.url.clone(), session, &transport)?;
        let enums = match &config.enum_table {
            Some(path) => EnumTable::from_path(path)?,
            None => EnumTable::empty(),
        };
        Ok(Self {
            client,
            enums,
            credentials: config.credentials.clone(),
            device_id: None,
            sector_size: SECTOR_SIZE_FALLBACK,
        })
    }

    /// One full collection pass.
    pub async fn collect(&mut self) -> Result<ArrayReport, CoreError> {
        if !self.client.session().restore().await? {
            debug!("no cached session, logging in");
            self.login().await?;
        }

        let mut report = ArrayReport::new(Vendor::Huawei);
        report.array_id = self.device_id.clone();

        if let Err(e) = self.collect_capacity(&mut report).await {
            if e.is_auth_expired() {
                return Err(e);
            }
            warn!(error = %e, "capacity collection failed");
        }

        for (resource, kind) in [
            ("storagepool", ComponentKind::StoragePool),
            ("fan", ComponentKind::Fan),
            ("power", ComponentKind::PowerSupply),
            ("fc_port", ComponentKind::FcPort),
        ] {
            if let Err(e) = self.collect_components(&mut report, resource, kind).await {
                if e.is_auth_expired() {
                    return Err(e);
                }
                warn!(resource, error = %e, "component collection failed");
            }
        }

        if let Err(e) = self.collect_performance(&mut report).await {
            if e.is_auth_expired() {
                return Err(e);
            }
            warn!(error = %e, "performance collection failed");
        }

        Ok(report)
    }

    // ── Login ────────────────────────────────────────────────────────

    async fn login(&mut self) -> Result<(), CoreError> {
        let url = self
            .client
            .url(&format!("{REST_PREFIX}/{BOOTSTRAP_DEVICE_ID}/login"))?;
        let body = json!({
            "scope": 0,
            "username": self.credentials.username,
            "password": self.credentials.password.expose_secret(),
            "isEncrypt": true,
            "loginMode": 3,
        });

        let resp = self
            .client
            .send_unauthenticated(self.client.request(Method::POST, url).json(&body))
            .await
            .map_err(login_error)?;

        let cookies = resp.cookie_pairs();
        let Some(cookie) = cookies.first() else {
            return Err(CoreError::AuthenticationFailed {
                message: "login response carried no session cookie".into(),
            });
        };

        let payload = resp.json()?;
        self.device_id = string_at(&payload, "/data/deviceid");

        self.client
            .session()
            .establish(SessionToken::new(cookie.clone()))
            .await?;
        info!(device_id = ?self.device_id, "console login succeeded");
        Ok(())
    }

    // ── Request plumbing ─────────────────────────────────────────────

    fn device(&self) -> &str {
        self.device_id.as_deref().unwrap_or(BOOTSTRAP_DEVICE_ID)
    }

    /// The console rejects cached GETs; `t` is its cache-buster.
    fn resource_url(&self, resource: &str) -> String {
        let t = chrono::Utc::now().timestamp_millis();
        format!("{REST_PREFIX}/{}/{resource}?t={t}", self.device())
    }

    /// Authenticated GET with business-status classification.
    async fn fetch(&self, path_and_query: &str) -> Result<Value, CoreError> {
        let url = self.client.url(path_and_query)?;
        let resp = self.client.get(url).await?;
        let payload = resp.json()?;

        let Some(code) = string_at(&payload, "/error/code") else {
            return Err(CoreError::Payload {
                message: format!("{path_and_query}: response carried no error.code"),
            });
        };
        if code != "0" {
            let message = str_at(&payload, "/error/description")
                .unwrap_or_default()
                .to_owned();
            return Err(classify_business(
                self.client.session(),
                AUTH_EXPIRED_CODE,
                &code,
                message,
            )
            .await
            .into());
        }
        Ok(payload)
    }

    // ── Capacity ─────────────────────────────────────────────────────

    async fn collect_capacity(&mut self, report: &mut ArrayReport) -> Result<(), CoreError> {
        debug!("collecting capacity");

        // Free capacity still sitting in disk domains is raw, not usable;
        // the console's own dashboard moves it from "used" to "unused".
        let diskpool = self.fetch(&self.resource_url("diskpool")).await?;
        let diskpool_free: i64 = array_at(&diskpool, "/data")
            .iter()
            .filter_map(|p| i64_at(p, "/FREECAPACITY"))
            .sum();

        let system = self.fetch(&self.resource_url("system/")).await?;
        if let Some(sector) = i64_at(&system, "/data/SECTORSIZE") {
            self.sector_size = sector;
        }
        if let Some(mode) = string_at(&system, "/data/PRODUCTMODE") {
            let label = self.enums.translate(PRODUCT_CATEGORY, &mode);
            report.model = Some(if label == sanpoll_api::UNKNOWN_LABEL {
                mode
            } else {
                label.to_owned()
            });
        }

        let used_raw = i64_at(&system, "/data/MEMBERDISKSCAPACITY").unwrap_or(0);
        let unused_raw = i64_at(&system, "/data/FREEDISKSCAPACITY").unwrap_or(0);
        let used_sectors = used_raw - diskpool_free;
        let unused_sectors = unused_raw + diskpool_free;

        // Pool-level accounting feeds the subscribed figure.
        let pools = self.fetch(&self.resource_url("storagepool")).await?;
        let mut subscribed_sectors = 0i64;
        for pool in array_at(&pools, "/data") {
            match str_at(pool, "/USAGETYPE") {
                Some("1") => {
                    subscribed_sectors += i64_at(pool, "/LUNCONFIGEDCAPACITY").unwrap_or(0);
                }
                Some("2") => {
                    subscribed_sectors += i64_at(pool, "/TOTALFSCAPACITY").unwrap_or(0);
                }
                _ => {}
            }
        }

        let sector = self.sector_size;
        report.capacity = CapacitySummary {
            total_bytes: (used_sectors + unused_sectors) * sector,
            used_bytes: used_sectors * sector,
            free_bytes: unused_sectors * sector,
            subscribed_bytes: Some(subscribed_sectors * sector),
        };
        Ok(())
    }

    // ── Components ───────────────────────────────────────────────────

    async fn collect_components(
        &self,
        report: &mut ArrayReport,
        resource: &str,
        kind: ComponentKind,
    ) -> Result<(), CoreError> {
        debug!(resource, "collecting component health");
        let payload = self.fetch(&self.resource_url(resource)).await?;
        for item in array_at(&payload, "/data") {
            if let Some(component) = self.component_from(kind, item) {
                report.components.push(component);
            }
        }
        Ok(())
    }

    fn component_from(&self, kind: ComponentKind, item: &Value) -> Option<ComponentHealth> {
        let id = string_at(item, "/ID")?;
        let health_code = string_at(item, "/HEALTHSTATUS").unwrap_or_default();
        let mut component = ComponentHealth::new(
            kind,
            id,
            self.enums.translate(HEALTH_CATEGORY, &health_code),
        );
        if let Some(name) = str_at(item, "/NAME") {
            component = component.named(name);
        }
        if let Some(running) = string_at(item, "/RUNNINGSTATUS") {
            component = component.running(self.enums.translate(RUNNING_CATEGORY, &running));
        }
        if kind == ComponentKind::StoragePool {
            if let Some(total) = i64_at(item, "/USERTOTALCAPACITY") {
                let free = i64_at(item, "/USERFREECAPACITY");
                component = component.sized(
                    total * self.sector_size,
                    free.map(|f| f * self.sector_size),
                );
            }
        }
        Some(component)
    }

    // ── Performance ──────────────────────────────────────────────────
    //
    // List-then-detail: every resource class is listed first, then one
    // counter call per object. The calls are independent; a failed
    // object is skipped.

    async fn collect_performance(&self, report: &mut ArrayReport) -> Result<(), CoreError> {
        for resource in ["fc_port", "disk", "diskpool", "lun"] {
            let listing = self.fetch(&self.resource_url(resource)).await?;
            let uuids: Vec<String> = array_at(&listing, "/data")
                .iter()
                .filter_map(|item| {
                    let object_type = string_at(item, "/TYPE")?;
                    let id = string_at(item, "/ID")?;
                    Some(format!("{object_type}:{id}"))
                })
                .collect();

            let data_ids = if resource == "diskpool" {
                PERF_DATA_IDS_NO_MAX
            } else {
                PERF_DATA_IDS
            };

            for uuid in uuids {
                match self.fetch_counters(resource, &uuid, data_ids).await {
                    Ok(samples) => report.performance.extend(samples),
                    Err(e) if e.is_auth_expired() => return Err(e),
                    Err(e) => {
                        warn!(resource, uuid = %uuid, error = %e, "counter collection failed");
                    }
                }
            }
        }
        Ok(())
    }

    async fn fetch_counters(
        &self,
        resource: &str,
        uuid: &str,
        data_ids: &str,
    ) -> Result<Vec<PerfSample>, CoreError> {
        let path = format!(
            "{REST_PREFIX}/{}/performace_statistic/cur_statistic_data\
             ?CMO_STATISTIC_UUID={uuid}&CMO_STATISTIC_DATA_ID_LIST={data_ids}&timeConversion=1",
            self.device()
        );
        let payload = self.fetch(&path).await?;

        // One row per object: the counter values come back as a comma
        // list aligned with the requested data-id list.
        let Some(row) = array_at(&payload, "/data").first() else {
            return Ok(Vec::new());
        };
        let Some(values) = str_at(row, "/CMO_STATISTIC_DATA_LIST") else {
            debug!(uuid, "counter row carried no data list");
            return Ok(Vec::new());
        };

        let samples = data_ids
            .split(',')
            .zip(values.split(','))
            .filter_map(|(metric, raw)| {
                let value: f64 = raw.trim().parse().ok()?;
                Some(PerfSample {
                    object_id: uuid.to_owned(),
                    object_kind: resource.to_owned(),
                    metric: metric.to_owned(),
                    value,
                })
            })
            .collect();
        Ok(samples)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
