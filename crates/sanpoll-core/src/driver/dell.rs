//! Driver for the Storage Center console (asynchronous WebSocket RPC).
//!
//! Login is plain HTTP: the first GET seeds the manager session cookie,
//! the login POST authenticates it, and that same cookie is the token we
//! cache. Data collection then runs over one persistent `/messages`
//! channel: every call is an envelope with a correlation id, replies
//! arrive in any order, and the hardware inventory fans out — one disk
//! call per enclosure discovered by the overview call, all outstanding
//! concurrently.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use reqwest::Method;
use secrecy::ExposeSecret;
use serde_json::Value;
use tracing::{debug, info, warn};

use sanpoll_api::{
    ApiClient, CorrelationId, EnumTable, IdAllocator, RpcChannel, RpcEnvelope, Session,
    SessionStore, SessionToken, TransportConfig,
};

use crate::config::{ArrayConfig, Credentials};
use crate::driver::{array_at, i64_at, login_error, str_at, string_at};
use crate::error::CoreError;
use crate::model::{ArrayReport, ComponentHealth, ComponentKind, PerfSample, Vendor};

const PLUGIN_ID: &str = "sc";
/// The manager session cookie seeded before login.
const SESSION_COOKIE: &str = "DellStorageManagerSession";
const STATUS_CATEGORY: &str = "OBJECT_STATUS_E";

// The summary calls are numbered statically, the way the console's own
// UI issues them; the allocator takes over from 4 for the fan-out.
const ID_CAPACITY: u64 = 1;
const ID_STORAGE_TYPES: u64 = 2;
const ID_HARDWARE: u64 = 3;
const FIRST_DYNAMIC_ID: u64 = 4;

pub struct DellDriver {
    client: ApiClient,
    enums: EnumTable,
    credentials: Credentials,
    ws_url: url::Url,
    call_timeout: Duration,
    serial_number: Option<String>,
}

impl DellDriver {
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
        let ws_url = config.ws_endpoint()?.join("messages").map_err(|e| {
            CoreError::Config {
                message: format!("invalid WebSocket endpoint: {e}"),
            }
        })?;
        Ok(Self {
            client,
            enums,
            credentials: config.credentials.clone(),
            ws_url,
            call_timeout: config.call_timeout,
            serial_number: None,
        })
    }

    /// One full collection pass.
    pub async fn collect(&mut self) -> Result<ArrayReport, CoreError> {
        if !self.client.session().restore().await? {
            debug!("no cached session, logging in");
            self.login().await?;
        }

        // The serial number keys every RPC call; a 401 here means the
        // cached cookie is dead and the pass is over.
        self.load_context().await?;

        let mut report = ArrayReport::new(Vendor::Dell);
        report.array_id = self.serial_number.clone();

        let token = self
            .client
            .session()
            .current()
            .await
            .ok_or(CoreError::SessionExpired)?;
        let channel = RpcChannel::connect(&self.ws_url, Some(token.as_str()))
            .await
            .map_err(CoreError::from)?;

        // The channel must come down on every exit path, or the reader
        // task would outlive the pass.
        let result = self.collect_over_channel(&channel, &mut report).await;
        channel.close().await;
        result?;

        Ok(report)
    }

    // ── Login & context ──────────────────────────────────────────────

    async fn login(&self) -> Result<(), CoreError> {
        // Seed the manager session cookie.
        let base = self.client.base_url().clone();
        let seed = self
            .client
            .send_unauthenticated(self.client.request(Method::GET, base))
            .await
            .map_err(login_error)?;

        let cookie = seed
            .cookie_pairs()
            .into_iter()
            .find(|pair| pair.starts_with(SESSION_COOKIE))
            .ok_or_else(|| CoreError::AuthenticationFailed {
                message: "console did not seed a manager session cookie".into(),
            })?;

        // Authenticate the seeded cookie; it becomes the cached token.
        let login_url = self.client.url("/login")?;
        self.client
            .send_unauthenticated(
                self.client
                    .request(Method::POST, login_url)
                    .header(reqwest::header::COOKIE, &cookie)
                    .form(&[
                        ("username", self.credentials.username.as_str()),
                        ("password", self.credentials.password.expose_secret()),
                        ("rememberMe", "on"),
                    ]),
            )
            .await
            .map_err(login_error)?;

        self.client
            .session()
            .establish(SessionToken::new(cookie))
            .await?;
        info!("console login succeeded");
        Ok(())
    }

    async fn load_context(&mut self) -> Result<(), CoreError> {
        let url = self.client.url("/session/context")?;
        let resp = self.client.get(url).await?;
        let payload = resp.json()?;
        self.serial_number = string_at(&payload, "/pluginData/api/user/scSerialNumber");
        if self.serial_number.is_none() {
            return Err(CoreError::Payload {
                message: "session context carried no serial number".into(),
            });
        }
        Ok(())
    }

    // ── RPC collection ───────────────────────────────────────────────

    async fn collect_over_channel(
        &self,
        channel: &RpcChannel,
        report: &mut ArrayReport,
    ) -> Result<(), CoreError> {
        let serial = self.serial_number.clone().unwrap_or_default();
        let ids = IdAllocator::seeded(FIRST_DYNAMIC_ID);

        // The three summary calls go out together and resolve in
        // whatever order the console answers.
        let (capacity, storage_types, hardware) = futures_util::join!(
            self.call(
                channel,
                CorrelationId::from(ID_CAPACITY),
                RpcEnvelope::new(PLUGIN_ID, "StorageCenterSummaryService", "getCapacityData")
                    .arg(serial.as_str()),
            ),
            self.call(
                channel,
                CorrelationId::from(ID_STORAGE_TYPES),
                RpcEnvelope::new(PLUGIN_ID, "StorageTypeService", "listStorageTypes")
                    .arg(serial.as_str()),
            ),
            self.call(
                channel,
                CorrelationId::from(ID_HARDWARE),
                RpcEnvelope::new(PLUGIN_ID, "StorageCenterService", "getHardwareOverview")
                    .arg(serial.as_str()),
            ),
        );

        match capacity {
            Ok(payload) => Self::accumulate_capacity(report, &payload),
            Err(e) if e.is_auth_expired() => return Err(e),
            Err(e) => warn!(error = %e, "capacity call failed"),
        }
        match storage_types {
            Ok(payload) => self.accumulate_pools(report, &payload),
            Err(e) if e.is_auth_expired() => return Err(e),
            Err(e) => warn!(error = %e, "storage type call failed"),
        }

        let enclosures = match hardware {
            Ok(payload) => self.accumulate_enclosures(report, &payload),
            Err(e) if e.is_auth_expired() => return Err(e),
            Err(e) => {
                warn!(error = %e, "hardware overview call failed");
                Vec::new()
            }
        };

        // Fan-out: one disk call per enclosure, all outstanding at once.
        let mut disk_calls = Vec::with_capacity(enclosures.len());
        for enclosure_index in &enclosures {
            let envelope = RpcEnvelope::new(PLUGIN_ID, "DiskService", "getHardwareDisks")
                .arg(serial.as_str())
                .arg(enclosure_index.as_str());
            disk_calls.push(self.call(channel, ids.next_id(), envelope));
        }
        for outcome in join_all(disk_calls).await {
            match outcome {
                Ok(payload) => self.accumulate_items(report, &payload, ComponentKind::Disk),
                Err(e) if e.is_auth_expired() => return Err(e),
                Err(e) => warn!(error = %e, "disk call failed"),
            }
        }

        // Controller ports.
        match self
            .call(
                channel,
                ids.next_id(),
                RpcEnvelope::new(PLUGIN_ID, "ControllerService", "getControllerPorts")
                    .arg(serial.as_str()),
            )
            .await
        {
            Ok(payload) => self.accumulate_items(report, &payload, ComponentKind::FcPort),
            Err(e) if e.is_auth_expired() => return Err(e),
            Err(e) => warn!(error = %e, "controller port call failed"),
        }

        // Real-time counters.
        let stamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
        match self
            .call(
                channel,
                ids.next_id(),
                RpcEnvelope::new(PLUGIN_ID, "RealTimeDataService", "gatherStatsInformation")
                    .arg(stamp)
                    .arg(serial.as_str()),
            )
            .await
        {
            Ok(payload) => Self::accumulate_stats(report, &payload),
            Err(e) if e.is_auth_expired() => return Err(e),
            Err(e) => warn!(error = %e, "realtime stats call failed"),
        }

        Ok(())
    }

    async fn call(
        &self,
        channel: &RpcChannel,
        id: CorrelationId,
        envelope: RpcEnvelope,
    ) -> Result<Value, CoreError> {
        let pending = channel.call(id, &envelope).await?;
        let reply = pending.wait(self.call_timeout).await?;
        Ok(reply)
    }

    // ── Payload accumulation ─────────────────────────────────────────

    fn accumulate_capacity(report: &mut ArrayReport, payload: &Value) {
        for slice in array_at(payload, "/result/chartData") {
            let Some(value) = i64_at(slice, "/value") else {
                continue;
            };
            match str_at(slice, "/seriesColorId") {
                Some("UsedSpace") => report.capacity.used_bytes = value,
                Some("FreeSpace") => report.capacity.free_bytes = value,
                _ => {}
            }
        }
        if let Some(total) = i64_at(payload, "/result/totalSpace/bytes") {
            report.capacity.total_bytes = total;
        } else {
            report.capacity.total_bytes =
                report.capacity.used_bytes + report.capacity.free_bytes;
        }
    }

    fn accumulate_pools(&self, report: &mut ArrayReport, payload: &Value) {
        for pool in array_at(payload, "/result") {
            let Some(id) = string_at(pool, "/instanceId").or_else(|| string_at(pool, "/name"))
            else {
                continue;
            };
            let mut used = None;
            let mut free = None;
            for slice in array_at(pool, "/sizeChartData") {
                match str_at(slice, "/seriesColorId") {
                    Some("UsedSpace") => used = i64_at(slice, "/value"),
                    Some("FreeSpace") => free = i64_at(slice, "/value"),
                    _ => {}
                }
            }
            let total = i64_at(pool, "/allocatedSpace/bytes")
                .unwrap_or(used.unwrap_or(0) + free.unwrap_or(0));

            let mut component =
                ComponentHealth::new(ComponentKind::StoragePool, id, self.status_label(pool));
            if let Some(name) = str_at(pool, "/name") {
                component = component.named(name);
            }
            component = component.sized(total, free);
            report.components.push(component);
        }
    }

    /// Record enclosure health and hand back the indexes for the disk
    /// fan-out.
    fn accumulate_enclosures(&self, report: &mut ArrayReport, payload: &Value) -> Vec<String> {
        let mut indexes = Vec::new();
        for enclosure in array_at(payload, "/result/enclosureList") {
            let Some(id) = string_at(enclosure, "/instanceId") else {
                continue;
            };
            let mut component = ComponentHealth::new(
                ComponentKind::Enclosure,
                id,
                self.status_label(enclosure),
            );
            if let Some(name) = str_at(enclosure, "/name") {
                component = component.named(name);
            }
            if let Some(state) = str_at(enclosure, "/status/enumName") {
                component = component.running(state);
            }
            report.components.push(component);

            if let Some(index) = string_at(enclosure, "/index") {
                indexes.push(index);
            }
        }
        indexes
    }

    /// Disks and ports share the `result.items` shape.
    fn accumulate_items(&self, report: &mut ArrayReport, payload: &Value, kind: ComponentKind) {
        for item in array_at(payload, "/result/items") {
            let Some(id) = string_at(item, "/instanceId") else {
                continue;
            };
            let mut component = ComponentHealth::new(kind, id, self.status_label(item));
            if let Some(name) = str_at(item, "/name") {
                component = component.named(name);
            }
            if let Some(state) = str_at(item, "/status/enumName") {
                component = component.running(state);
            }
            report.components.push(component);
        }
    }

    /// Counter rows carry a vendor object class and a map of values; only
    /// the classes downstream monitoring graphs are kept.
    fn accumulate_stats(report: &mut ArrayReport, payload: &Value) {
        for row in array_at(payload, "/result/data") {
            let Some(obj_type) = str_at(row, "/objType") else {
                continue;
            };
            let object_kind = match obj_type {
                "ScVolume" => "volume",
                "ScDisk" => "disk",
                "ScFibreChannelFaultDomain" => "fc_port",
                _ => continue,
            };
            let object_id = string_at(row, "/instanceId").unwrap_or_else(|| obj_type.to_owned());

            // `values` is a JSON object, or a string holding one.
            let values = match row.get("values") {
                Some(Value::Object(map)) => Value::Object(map.clone()),
                Some(Value::String(raw)) => match serde_json::from_str(raw) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        debug!(error = %e, "undecodable stats row skipped");
                        continue;
                    }
                },
                _ => continue,
            };
            if let Value::Object(map) = values {
                for (metric, raw) in map {
                    let Some(value) = raw.as_f64() else { continue };
                    report.performance.push(PerfSample {
                        object_id: object_id.clone(),
                        object_kind: object_kind.to_owned(),
                        metric,
                        value,
                    });
                }
            }
        }
    }

    /// Numeric status enums go through the vendor table; the console also
    /// sends its own display name, which wins over the sentinel.
    fn status_label(&self, item: &Value) -> String {
        if let Some(code) = string_at(item, "/status/enum") {
            let label = self.enums.translate(STATUS_CATEGORY, &code);
            if label != sanpoll_api::UNKNOWN_LABEL {
                return label.to_owned();
            }
        }
        str_at(item, "/status/enumName")
            .unwrap_or(sanpoll_api::UNKNOWN_LABEL)
            .to_owned()
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use serde_json::json;

    fn driver(dir: &tempfile::TempDir) -> DellDriver {
        let config = ArrayConfig::new(
            Vendor::Dell,
            "https://10.3.20.16".parse().unwrap(),
            Credentials {
                username: "admin".into(),
                password: SecretString::from("secret".to_owned()),
            },
            dir.path().join("dell.session"),
        );
        DellDriver::new(&config).unwrap()
    }

    #[test]
    fn ws_url_targets_the_messages_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let d = driver(&dir);
        assert_eq!(d.ws_url.as_str(), "wss://10.3.20.16/messages");
    }

    #[test]
    fn capacity_reply_fills_the_summary() {
        let dir = tempfile::tempdir().unwrap();
        let _d = driver(&dir);
        let mut report = ArrayReport::new(Vendor::Dell);

        let payload = json!({
            "correlationId": "1",
            "result": {
                "chartData": [
                    { "seriesColorId": "UsedSpace", "value": "6000", "caption": "5.5 TB" },
                    { "seriesColorId": "FreeSpace", "value": 4000, "caption": "3.6 TB" }
                ],
                "totalSpace": { "bytes": 10000, "displayString": "9.1 TB" }
            }
        });
        DellDriver::accumulate_capacity(&mut report, &payload);

        assert_eq!(report.capacity.used_bytes, 6000);
        assert_eq!(report.capacity.free_bytes, 4000);
        assert_eq!(report.capacity.total_bytes, 10000);
    }

    #[test]
    fn enclosure_reply_yields_components_and_indexes() {
        let dir = tempfile::tempdir().unwrap();
        let d = driver(&dir);
        let mut report = ArrayReport::new(Vendor::Dell);

        let payload = json!({
            "result": {
                "enclosureList": [
                    {
                        "name": "Enclosure - 1",
                        "index": "1",
                        "instanceId": "101",
                        "status": { "enum": "1", "enumName": "Up" }
                    },
                    {
                        "name": "Enclosure - 2",
                        "index": "2",
                        "instanceId": "102",
                        "status": { "enum": "2", "enumName": "Degraded" }
                    }
                ]
            }
        });
        let indexes = d.accumulate_enclosures(&mut report, &payload);

        assert_eq!(indexes, vec!["1".to_owned(), "2".to_owned()]);
        assert_eq!(
            report.components_of(ComponentKind::Enclosure).count(),
            2
        );
        // No enum table loaded: the console's display name stands in.
        assert_eq!(report.components[0].health, "Up");
    }

    #[test]
    fn stats_reply_unpacks_stringified_values() {
        let dir = tempfile::tempdir().unwrap();
        let _d = driver(&dir);
        let mut report = ArrayReport::new(Vendor::Dell);

        let payload = json!({
            "result": {
                "data": [
                    {
                        "objType": "ScVolume",
                        "instanceId": "v1",
                        "values": "{\"readIops\": 120.5, \"writeIops\": 33}"
                    },
                    {
                        "objType": "ScServerFolder",
                        "values": { "ignored": 1 }
                    }
                ]
            }
        });
        DellDriver::accumulate_stats(&mut report, &payload);

        assert_eq!(report.performance.len(), 2);
        assert!(report.performance.iter().all(|s| s.object_kind == "volume"));
        let read = report
            .performance
            .iter()
            .find(|s| s.metric == "readIops")
            .unwrap();
        assert!((read.value - 120.5).abs() < f64::EPSILON);
    }

    #[test]
    fn status_label_prefers_table_then_enum_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = driver(&dir);
        d.enums = EnumTable::from_json_str(r#"{ "OBJECT_STATUS_E": { "UP": 1 } }"#).unwrap();

        let mapped = json!({ "status": { "enum": "1", "enumName": "Up" } });
        assert_eq!(d.status_label(&mapped), "UP");

        let unmapped = json!({ "status": { "enum": "9", "enumName": "Degraded" } });
        assert_eq!(d.status_label(&unmapped), "Degraded");

        let bare = json!({ "status": {} });
        assert_eq!(d.status_label(&bare), sanpoll_api::UNKNOWN_LABEL);
    }
}
