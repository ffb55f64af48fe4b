//! Client for the management (BPL) API.

use std::collections::BTreeSet;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::client::{build_url, http_client, BPL_PREFIX};
use crate::config::Config;
use crate::error::{ArchiverError, Result};
use crate::types::{ApplianceInfo, PvDetail, PvStatus, PvTypeInfo};
use crate::validation::{validate_pv_name, validate_pv_pattern};

/// Client for PV-set queries and archiving lifecycle operations.
#[derive(Debug, Clone)]
pub struct ArchiverMgmtClient {
    client: Client,
    base_url: String,
}

/// Archiving parameters accepted by `archivePV`. Unset fields leave the
/// appliance's policy defaults in force.
#[derive(Debug, Clone, Default)]
pub struct ArchiveOptions {
    pub sampling_period: Option<f64>,
    pub sampling_method: Option<SamplingMethod>,
    pub controlling_pv: Option<String>,
    pub policy: Option<String>,
    pub appliance: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMethod {
    Scan,
    Monitor,
}

impl SamplingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scan => "SCAN",
            Self::Monitor => "MONITOR",
        }
    }
}

impl ArchiverMgmtClient {
    /// Creates a client pointed at the configured management URL.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_url(config.admin_url(), config)
    }

    /// Creates a client with an explicit base URL, taking the timeout
    /// from the configuration.
    pub fn with_url(url: impl Into<String>, config: &Config) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout)?,
            base_url: url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.base_url
    }

    /// Repoints the client. Not guarded against concurrent in-flight use.
    pub fn set_url(&mut self, url: impl Into<String>) {
        self.base_url = url.into().trim_end_matches('/').to_string();
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        subject: Option<&str>,
    ) -> Result<T> {
        let url = build_url(&self.base_url, &format!("{BPL_PREFIX}/{endpoint}"), params)?;
        debug!(url = %url, "management request");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ArchiverError::transport(subject, e))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            if let Some(pv) = subject {
                return Err(ArchiverError::InvalidPv { pv: pv.to_string() });
            }
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ArchiverError::retrieval_status(
                subject,
                format!("server returned {} for {}: {}", status, url, body.trim()),
                status.as_u16(),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ArchiverError::transport(subject, e))?;
        serde_json::from_slice(&bytes).map_err(|e| ArchiverError::Retrieval {
            pv: subject.map(str::to_owned),
            message: format!("undecodable response body: {e}"),
            status: None,
            source: None,
        })
    }

    /// Lists archived PVs, optionally narrowed by a glob pattern and a
    /// result limit (the appliance applies its own default of 500 when
    /// no limit is passed).
    pub async fn get_all_pvs(
        &self,
        pattern: Option<&str>,
        limit: Option<u32>,
    ) -> Result<BTreeSet<String>> {
        let limit_value = limit.map(|l| l.to_string());
        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(pattern) = pattern {
            validate_pv_pattern(pattern)?;
            params.push(("pv", pattern));
        }
        if let Some(limit) = &limit_value {
            params.push(("limit", limit));
        }
        let names: Vec<String> = self.get_json("getAllPVs", &params, None).await?;
        Ok(names.into_iter().collect())
    }

    /// Identity and component URLs of the appliance.
    pub async fn get_appliance_info(&self) -> Result<ApplianceInfo> {
        self.get_json("getApplianceInfo", &[], None).await
    }

    /// Archiving status for a list of PV names or patterns, flattened.
    pub async fn get_pv_status(&self, pvs: &[String]) -> Result<Vec<PvStatus>> {
        let mut all = Vec::new();
        for pv in pvs {
            validate_pv_pattern(pv)?;
            let mut batch: Vec<PvStatus> =
                self.get_json("getPVStatus", &[("pv", pv)], Some(pv)).await?;
            all.append(&mut batch);
        }
        Ok(all)
    }

    /// Archiving parameters (the appliance's "PVTypeInfo") for one PV.
    pub async fn get_pv_type_info(&self, pv: &str) -> Result<PvTypeInfo> {
        validate_pv_name(pv)?;
        self.get_json("getPVTypeInfo", &[("pv", pv)], Some(pv)).await
    }

    /// Low-level detail rows for one PV.
    pub async fn get_pv_details(&self, pv: &str) -> Result<Vec<PvDetail>> {
        validate_pv_name(pv)?;
        self.get_json("getPVDetails", &[("pv", pv)], Some(pv)).await
    }

    /// Names of the data stores holding samples for one PV.
    pub async fn get_stores_for_pv(&self, pv: &str) -> Result<Vec<String>> {
        validate_pv_name(pv)?;
        self.get_json("getStoresForPV", &[("pv", pv)], Some(pv)).await
    }

    /// Submits a PV for archiving.
    pub async fn archive_pv(&self, pv: &str, options: &ArchiveOptions) -> Result<()> {
        validate_pv_name(pv)?;
        let period = options.sampling_period.map(|p| p.to_string());
        let mut params: Vec<(&str, &str)> = vec![("pv", pv)];
        if let Some(period) = &period {
            params.push(("samplingperiod", period));
        }
        if let Some(method) = options.sampling_method {
            params.push(("samplingmethod", method.as_str()));
        }
        if let Some(controlling) = &options.controlling_pv {
            params.push(("controllingPV", controlling));
        }
        if let Some(policy) = &options.policy {
            params.push(("policy", policy));
        }
        if let Some(appliance) = &options.appliance {
            params.push(("appliance", appliance));
        }
        let reply: JsonValue = self.get_json("archivePV", &params, Some(pv)).await?;
        check_mgmt_reply("archive", pv, &reply)
    }

    /// Pauses archiving of a PV.
    pub async fn pause_pv(&self, pv: &str) -> Result<()> {
        self.lifecycle("pauseArchivingPV", "pause", pv).await
    }

    /// Resumes archiving of a paused PV.
    pub async fn resume_pv(&self, pv: &str) -> Result<()> {
        self.lifecycle("resumeArchivingPV", "resume", pv).await
    }

    /// Aborts a pending archive request.
    pub async fn abort_pv(&self, pv: &str) -> Result<()> {
        self.lifecycle("abortArchivingPV", "abort", pv).await
    }

    async fn lifecycle(&self, endpoint: &str, op: &str, pv: &str) -> Result<()> {
        validate_pv_name(pv)?;
        let reply: JsonValue = self.get_json(endpoint, &[("pv", pv)], Some(pv)).await?;
        check_mgmt_reply(op, pv, &reply)
    }
}

/// Interprets the appliance's per-PV management reply. Success is either
/// `status: "ok"` or the "request submitted" acknowledgement; anything
/// else, including a `validation` message, is a Management error.
fn check_mgmt_reply(op: &str, pv: &str, reply: &JsonValue) -> Result<()> {
    let entry = match reply {
        JsonValue::Array(items) => items
            .iter()
            .find(|item| item.get("pvName").and_then(JsonValue::as_str) == Some(pv))
            .or_else(|| items.first()),
        other => Some(other),
    };
    let Some(entry) = entry else {
        return Err(ArchiverError::management(op, pv, "empty reply from server"));
    };
    if let Some(message) = entry.get("validation").and_then(JsonValue::as_str) {
        return Err(ArchiverError::management(op, pv, message));
    }
    let status = entry.get("status").and_then(JsonValue::as_str).unwrap_or("");
    if status.eq_ignore_ascii_case("ok") || status.to_ascii_lowercase().contains("submitted") {
        Ok(())
    } else if status.is_empty() {
        Err(ArchiverError::management(
            op,
            pv,
            format!("unrecognized reply: {entry}"),
        ))
    } else {
        Err(ArchiverError::management(op, pv, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ok_object_reply_is_success() {
        let reply = json!({"status": "ok", "desc": "Successfully paused the archiving of PV TST:pv"});
        assert!(check_mgmt_reply("pause", "TST:pv", &reply).is_ok());
    }

    #[test]
    fn submitted_array_reply_is_success() {
        let reply = json!([{"pvName": "TST:pv", "status": "Archive request submitted"}]);
        assert!(check_mgmt_reply("archive", "TST:pv", &reply).is_ok());
    }

    #[test]
    fn array_reply_matches_on_pv_name() {
        let reply = json!([
            {"pvName": "OTHER:pv", "status": "Archive request submitted"},
            {"pvName": "TST:pv", "status": "Already submitted"}
        ]);
        // "Already submitted" still acknowledges the request
        assert!(check_mgmt_reply("archive", "TST:pv", &reply).is_ok());
    }

    #[test]
    fn validation_message_becomes_management_error() {
        let reply = json!({"validation": "Unable to parse PV name"});
        let err = check_mgmt_reply("archive", "TST:pv", &reply).unwrap_err();
        match err {
            ArchiverError::Management { op, pv, message } => {
                assert_eq!(op, "archive");
                assert_eq!(pv, "TST:pv");
                assert_eq!(message, "Unable to parse PV name");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn unexpected_status_becomes_management_error() {
        let reply = json!({"status": "Trying to pause PV that is not being archived"});
        let err = check_mgmt_reply("pause", "TST:pv", &reply).unwrap_err();
        assert!(err.to_string().contains("not being archived"));
    }

    #[test]
    fn reply_without_status_is_reported_verbatim() {
        let reply = json!({"something": "else"});
        let err = check_mgmt_reply("resume", "TST:pv", &reply).unwrap_err();
        assert!(err.to_string().contains("unrecognized reply"));
    }
}
