//! Client for the data-retrieval API.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::client::{build_url, format_instant, http_client, RETRIEVAL_PREFIX};
use crate::config::Config;
use crate::error::{ArchiverError, Result};
use crate::types::{Point, TimeRange, TimeSeries};
use crate::validation::{validate_pv_name, validate_time_range};

/// Client for time-series retrieval.
///
/// Holds no state beyond the HTTP connection pool and the base URL, so
/// repeating an identical call against an unchanged server returns
/// identical results. `set_url` carries no concurrent-mutation guarantee;
/// do not call it while requests are in flight.
#[derive(Debug, Clone)]
pub struct ArchiverDataClient {
    client: Client,
    base_url: String,
    default_window: Duration,
}

/// Outcome of a multi-PV retrieval: per-PV series for the fetches that
/// succeeded, per-PV errors for those that did not. One PV's failure
/// never aborts or contaminates the others.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub series: BTreeMap<String, TimeSeries>,
    pub failures: BTreeMap<String, ArchiverError>,
}

impl BatchResult {
    /// True when every requested PV produced a series.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// True when no PV produced a series.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

impl ArchiverDataClient {
    /// Creates a client pointed at the configured data-retrieval URL.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_url(config.data_url(), config)
    }

    /// Creates a client with an explicit base URL, taking timeout and
    /// window defaults from the configuration.
    pub fn with_url(url: impl Into<String>, config: &Config) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout)?,
            base_url: url.into().trim_end_matches('/').to_string(),
            default_window: config.default_window,
        })
    }

    pub fn url(&self) -> &str {
        &self.base_url
    }

    /// Repoints the client. Not guarded against concurrent in-flight use.
    pub fn set_url(&mut self, url: impl Into<String>) {
        self.base_url = url.into().trim_end_matches('/').to_string();
    }

    /// Retrieves the archived samples of one PV.
    ///
    /// `range = None` requests the recent window configured as
    /// `cli.get.default_window` (one hour unless overridden).
    pub async fn get_data(&self, pv: &str, range: Option<TimeRange>) -> Result<TimeSeries> {
        validate_pv_name(pv)?;
        let range = range.unwrap_or_else(|| TimeRange::recent(self.default_window));
        validate_time_range(&range)?;

        let from = format_instant(range.start);
        let to = format_instant(range.end);
        let url = build_url(
            &self.base_url,
            &format!("{RETRIEVAL_PREFIX}/getData.json"),
            &[("pv", pv), ("from", &from), ("to", &to)],
        )?;
        debug!(url = %url, "fetching data");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ArchiverError::transport(Some(pv), e))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ArchiverError::InvalidPv { pv: pv.to_string() });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ArchiverError::retrieval_status(
                Some(pv),
                format!("server returned {} for {}: {}", status, url, body.trim()),
                status.as_u16(),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ArchiverError::transport(Some(pv), e))?;
        let series: Vec<TimeSeries> = serde_json::from_slice(&bytes).map_err(|e| {
            ArchiverError::retrieval(pv, format!("undecodable response body: {e}"))
        })?;
        let series = series
            .into_iter()
            .next()
            .ok_or_else(|| ArchiverError::retrieval(pv, "server returned no dataset"))?;
        if !series.is_monotonic() {
            return Err(ArchiverError::retrieval(
                pv,
                "server returned out-of-order samples",
            ));
        }
        Ok(series)
    }

    /// Retrieves several PVs over the same range, concurrently and
    /// independently. Partial failures land in `BatchResult::failures`
    /// under the failing PV's name.
    pub async fn get_data_many(&self, pvs: &[String], range: Option<TimeRange>) -> BatchResult {
        let fetches = pvs.iter().map(|pv| {
            let pv = pv.clone();
            async move {
                let result = self.get_data(&pv, range).await;
                (pv, result)
            }
        });

        let mut batch = BatchResult::default();
        for (pv, result) in join_all(fetches).await {
            match result {
                Ok(series) => {
                    debug!(pv = %pv, points = series.len(), "fetched series");
                    batch.series.insert(pv, series);
                }
                Err(err) => {
                    warn!(pv = %pv, error = %err, "dropping PV from batch");
                    batch.failures.insert(pv, err);
                }
            }
        }
        batch
    }

    /// Returns, for each PV, the latest sample at or before `at`.
    /// PVs the appliance knows nothing about are absent from the map.
    pub async fn get_data_at_time(
        &self,
        pvs: &[String],
        at: DateTime<Utc>,
    ) -> Result<BTreeMap<String, Point>> {
        if pvs.is_empty() {
            return Err(ArchiverError::invalid_request("no PVs specified"));
        }
        for pv in pvs {
            validate_pv_name(pv)?;
        }

        let at_formatted = format_instant(at);
        let url = build_url(
            &self.base_url,
            &format!("{RETRIEVAL_PREFIX}/getDataAtTime"),
            &[("at", &at_formatted)],
        )?;
        debug!(url = %url, pvs = pvs.len(), "fetching point-in-time data");

        let response = self
            .client
            .post(url.clone())
            .json(pvs)
            .send()
            .await
            .map_err(|e| ArchiverError::transport(None, e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ArchiverError::retrieval_status(
                None,
                format!("server returned {} for {}: {}", status, url, body.trim()),
                status.as_u16(),
            ));
        }
        response
            .json()
            .await
            .map_err(|e| ArchiverError::transport(None, e))
    }
}
