//! Driver for the Storwize V7000 console (synchronous HTTP JSON-RPC).
//!
//! Login is a two-step form flow: a GET against the login page seeds the
//! pre-auth cookies, then — after a short console-enforced delay — the
//! credentials go up as a form POST carrying those cookies. The cookies
//! worth keeping from the reply are `_auth` and `JSESSIONID`; joined,
//! they are the cached token.
//!
//! Data collection is unary: every call is a POST to `/RPCAdapter` with
//! an `application/json-rpc` body naming the server-side RPC class and
//! method. One legacy grid endpoint (`/VDiskGridDataHandler`) serves the
//! volume inventory as a form POST instead.

use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, COOKIE};
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use sanpoll_api::{ApiClient, EnumTable, Session, SessionStore, SessionToken, TransportConfig};

use crate::config::{ArrayConfig, Credentials};
use crate::driver::{f64_at, i64_at, login_error, string_at};
use crate::error::CoreError;
use crate::model::{ArrayReport, ComponentHealth, ComponentKind, PerfSample, Vendor};

const RPC_REQUEST_CLAZZ: &str = "com.ibm.evo.rpc.RPCRequest";
const CLUSTER_RPC: &str = "com.ibm.svc.gui.logic.ClusterRPC";
const POOLS_RPC: &str = "com.ibm.svc.gui.logic.PoolsRPC";
const HOSTS_RPC: &str = "com.ibm.svc.gui.logic.HostsRPC";
const PHYSICAL_RPC: &str = "com.ibm.svc.gui.logic.PhysicalRPC";

/// Cookies that make up the session.
const SESSION_COOKIES: [&str; 2] = ["_auth", "JSESSIONID"];
/// Numeric-state grids go through the vendor table under this category.
const STATE_CATEGORY: &str = "OBJECT_STATE_E";

pub struct IbmDriver {
    client: ApiClient,
    enums: EnumTable,
    credentials: Credentials,
    pre_login_delay: Duration,
}

impl IbmDriver {
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
            pre_login_delay: config.pre_login_delay,
        })
    }

    /// One full collection pass.
    pub async fn collect(&mut self) -> Result<ArrayReport, CoreError> {
        if !self.client.session().restore().await? {
            debug!("no cached session, logging in");
            self.login().await?;
        }

        let mut report = ArrayReport::new(Vendor::IbmV7000);

        if let Err(e) = self.collect_system(&mut report).await {
            if e.is_auth_expired() {
                return Err(e);
            }
            warn!(error = %e, "system capacity call failed");
        }
        if let Err(e) = self.collect_pools(&mut report).await {
            if e.is_auth_expired() {
                return Err(e);
            }
            warn!(error = %e, "pool call failed");
        }
        if let Err(e) = self.collect_cluster_stats(&mut report).await {
            if e.is_auth_expired() {
                return Err(e);
            }
            warn!(error = %e, "cluster stats call failed");
        }
        if let Err(e) = self.collect_node_stats(&mut report).await {
            if e.is_auth_expired() {
                return Err(e);
            }
            warn!(error = %e, "node stats call failed");
        }
        if let Err(e) = self.collect_hosts(&mut report).await {
            if e.is_auth_expired() {
                return Err(e);
            }
            warn!(error = %e, "host call failed");
        }
        if let Err(e) = self.collect_drives(&mut report).await {
            if e.is_auth_expired() {
                return Err(e);
            }
            warn!(error = %e, "drive call failed");
        }
        if let Err(e) = self.collect_volumes(&mut report).await {
            if e.is_auth_expired() {
                return Err(e);
            }
            warn!(error = %e, "volume grid call failed");
        }

        Ok(report)
    }

    // ── Login ────────────────────────────────────────────────────────

    async fn login(&self) -> Result<(), CoreError> {
        // Seed JSESSIONID and the sync token from the login page.
        let login_url = self.client.url("/login")?;
        let seed = self
            .client
            .send_unauthenticated(self.client.request(Method::GET, login_url.clone()))
            .await
            .map_err(login_error)?;
        let seed_cookies = seed.cookie_pairs().join(";");

        // The console throttles immediate login POSTs ("too many
        // requests"); one fixed delay is all it takes.
        tokio::time::sleep(self.pre_login_delay).await;

        let resp = self
            .client
            .send_unauthenticated(
                self.client
                    .request(Method::POST, login_url)
                    .header(COOKIE, seed_cookies)
                    .form(&[
                        ("login", self.credentials.username.as_str()),
                        ("password", self.credentials.password.expose_secret()),
                        ("tzoffset", "-480"),
                    ]),
            )
            .await
            .map_err(login_error)?;

        let token: Vec<String> = resp
            .cookie_pairs()
            .into_iter()
            .filter(|pair| {
                SESSION_COOKIES
                    .iter()
                    .any(|name| pair.starts_with(&format!("{name}=")))
            })
            .collect();
        if token.is_empty() {
            return Err(CoreError::AuthenticationFailed {
                message: "login response carried no session cookies".into(),
            });
        }

        self.client
            .session()
            .establish(SessionToken::new(token.join(";")))
            .await?;
        info!("console login succeeded");
        Ok(())
    }

    // ── RPC plumbing ─────────────────────────────────────────────────

    /// `POST /RPCAdapter` with a json-rpc body; returns the `result`
    /// member (or the whole payload for responses without one).
    async fn rpc(
        &self,
        method_clazz: &str,
        method_name: &str,
        method_args: Value,
    ) -> Result<Value, CoreError> {
        let body = json!({
            "clazz": RPC_REQUEST_CLAZZ,
            "methodClazz": method_clazz,
            "methodName": method_name,
            "methodArgs": method_args,
        });
        debug!(method = method_name, "RPC call");

        let url = self.client.url("/RPCAdapter")?;
        let resp = self
            .client
            .send(
                self.client
                    .request(Method::POST, url)
                    .header(CONTENT_TYPE, "application/json-rpc")
                    .body(body.to_string()),
            )
            .await?;

        let payload = resp.json()?;
        Ok(payload.get("result").cloned().unwrap_or(payload))
    }

    // ── Collection steps ─────────────────────────────────────────────

    async fn collect_system(&self, report: &mut ArrayReport) -> Result<(), CoreError> {
        let result = self
            .rpc(CLUSTER_RPC, "getClusterSystemBytes", json!([]))
            .await?;

        let total = first_i64(&result, &["/total", "/totalCapacity", "/physicalCapacity"]);
        let used = first_i64(&result, &["/used", "/usedCapacity", "/physicalUsedCapacity"]);
        let free = first_i64(&result, &["/free", "/freeCapacity", "/physicalFreeCapacity"]);

        match (total, used, free) {
            (Some(t), Some(u), f) => {
                report.capacity.total_bytes = t;
                report.capacity.used_bytes = u;
                report.capacity.free_bytes = f.unwrap_or(t - u);
            }
            (Some(t), None, Some(f)) => {
                report.capacity.total_bytes = t;
                report.capacity.used_bytes = t - f;
                report.capacity.free_bytes = f;
            }
            (Some(t), None, None) => {
                report.capacity.total_bytes = t;
            }
            (None, Some(u), Some(f)) => {
                report.capacity.total_bytes = u + f;
                report.capacity.used_bytes = u;
                report.capacity.free_bytes = f;
            }
            _ => {
                debug!("system reply carried no recognizable capacity figures");
            }
        }
        Ok(())
    }

    async fn collect_pools(&self, report: &mut ArrayReport) -> Result<(), CoreError> {
        let result = self.rpc(POOLS_RPC, "getPools", json!([])).await?;
        for pool in list_of(&result, &["", "/pools"]) {
            let Some(id) = string_at(pool, "/id").or_else(|| string_at(pool, "/name")) else {
                continue;
            };
            let mut component = ComponentHealth::new(
                ComponentKind::StoragePool,
                id,
                self.state_label(pool, &["/status", "/state"]),
            );
            if let Some(name) = string_at(pool, "/name") {
                component = component.named(name);
            }
            if let Some(total) = first_i64(pool, &["/capacity", "/totalCapacity"]) {
                component =
                    component.sized(total, first_i64(pool, &["/freeCapacity", "/free_capacity"]));
            }
            report.components.push(component);
        }
        Ok(())
    }

    async fn collect_cluster_stats(&self, report: &mut ArrayReport) -> Result<(), CoreError> {
        let result = self.rpc(CLUSTER_RPC, "getClusterStats", json!([])).await?;
        report
            .performance
            .extend(stat_samples(&result, "system", "cluster"));
        Ok(())
    }

    async fn collect_node_stats(&self, report: &mut ArrayReport) -> Result<(), CoreError> {
        // One call covers the first node pair; the console aggregates.
        let result = self.rpc(CLUSTER_RPC, "getNodeStats", json!([1])).await?;
        report
            .performance
            .extend(stat_samples(&result, "node", "node-1"));
        Ok(())
    }

    async fn collect_hosts(&self, report: &mut ArrayReport) -> Result<(), CoreError> {
        let result = self.rpc(HOSTS_RPC, "getHosts", json!([])).await?;
        for host in list_of(&result, &["", "/hosts"]) {
            let Some(id) = string_at(host, "/id").or_else(|| string_at(host, "/name")) else {
                continue;
            };
            let mut component = ComponentHealth::new(
                ComponentKind::Host,
                id,
                self.state_label(host, &["/status", "/state"]),
            );
            if let Some(name) = string_at(host, "/name") {
                component = component.named(name);
            }
            report.components.push(component);
        }
        Ok(())
    }

    async fn collect_drives(&self, report: &mut ArrayReport) -> Result<(), CoreError> {
        let result = self
            .rpc(PHYSICAL_RPC, "getInternalDriveInfo", json!([]))
            .await?;
        for drive in list_of(&result, &["", "/drives"]) {
            let Some(id) = string_at(drive, "/id") else {
                continue;
            };
            let mut component = ComponentHealth::new(
                ComponentKind::Disk,
                id,
                self.state_label(drive, &["/status", "/state"]),
            );
            if let Some(usage) = string_at(drive, "/use") {
                component = component.running(usage);
            }
            if let Some(capacity) = first_i64(drive, &["/capacity", "/capacityBytes"]) {
                component = component.sized(capacity, None);
            }
            report.components.push(component);
        }
        Ok(())
    }

    /// Volumes come from a legacy grid handler, not the RPC adapter.
    async fn collect_volumes(&self, report: &mut ArrayReport) -> Result<(), CoreError> {
        let panel_key = chrono::Utc::now().timestamp_millis().to_string();
        let url = self.client.url("/VDiskGridDataHandler")?;
        let resp = self
            .client
            .post_form(
                url,
                &[
                    ("panelKey", panel_key.as_str()),
                    ("extendedMDiskInfo", "false"),
                    ("password", "0"),
                    ("tzoffset", "40"),
                ],
            )
            .await?;

        let payload = resp.json()?;
        for volume in list_of(&payload, &["/rows", "/vdisks", "/data"]) {
            let Some(id) = string_at(volume, "/id").or_else(|| string_at(volume, "/name")) else {
                continue;
            };
            let mut component = ComponentHealth::new(
                ComponentKind::Volume,
                id,
                self.state_label(volume, &["/status", "/state"]),
            );
            if let Some(name) = string_at(volume, "/name") {
                component = component.named(name);
            }
            if let Some(capacity) = first_i64(volume, &["/capacity", "/capacityBytes"]) {
                component = component.sized(capacity, None);
            }
            report.components.push(component);
        }
        Ok(())
    }

    /// The console mostly reports states as words (`"online"`); numeric
    /// codes from the legacy grids go through the vendor table.
    fn state_label(&self, item: &Value, pointers: &[&str]) -> String {
        for pointer in pointers {
            if let Some(raw) = string_at(item, pointer) {
                if raw.is_empty() {
                    continue;
                }
                if raw.bytes().all(|b| b.is_ascii_digit()) {
                    return self.enums.translate(STATE_CATEGORY, &raw).to_owned();
                }
                return raw;
            }
        }
        sanpoll_api::UNKNOWN_LABEL.to_owned()
    }
}

// ── Payload helpers ──────────────────────────────────────────────────

fn first_i64(value: &Value, pointers: &[&str]) -> Option<i64> {
    pointers.iter().find_map(|p| i64_at(value, p))
}

/// The first pointer that holds an array; `""` means the value itself.
fn list_of<'a>(value: &'a Value, pointers: &[&str]) -> &'a [Value] {
    for pointer in pointers {
        let candidate = if pointer.is_empty() {
            Some(value)
        } else {
            value.pointer(pointer)
        };
        if let Some(array) = candidate.and_then(Value::as_array) {
            return array.as_slice();
        }
    }
    &[]
}

/// Stats rows: `{stat_name, stat_current}` (CLI naming) or
/// `{name, current}` depending on firmware.
fn stat_samples(result: &Value, object_kind: &str, default_object: &str) -> Vec<PerfSample> {
    list_of(result, &["", "/stats"])
        .iter()
        .filter_map(|row| {
            let metric =
                string_at(row, "/stat_name").or_else(|| string_at(row, "/name"))?;
            let value =
                f64_at(row, "/stat_current").or_else(|| f64_at(row, "/current"))?;
            let object_id = string_at(row, "/node_id")
                .or_else(|| string_at(row, "/nodeId"))
                .unwrap_or_else(|| default_object.to_owned());
            Some(PerfSample {
                object_id,
                object_kind: object_kind.to_owned(),
                metric,
                value,
            })
        })
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────
