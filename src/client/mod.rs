//! HTTP clients for the appliance's retrieval and management APIs.

mod data;
mod mgmt;

pub use data::{ArchiverDataClient, BatchResult};
pub use mgmt::{ArchiveOptions, ArchiverMgmtClient, SamplingMethod};

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use url::Url;

use crate::error::{ArchiverError, Result};

/// Path prefix of the data-retrieval API.
pub(crate) const RETRIEVAL_PREFIX: &str = "retrieval/data";

/// Path prefix of the management (BPL) API.
pub(crate) const BPL_PREFIX: &str = "mgmt/bpl";

pub(crate) fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ArchiverError::invalid_request(format!("failed to build HTTP client: {e}")))
}

/// Builds an endpoint URL with properly encoded query parameters.
pub(crate) fn build_url(base: &str, path: &str, params: &[(&str, &str)]) -> Result<Url> {
    let mut url = Url::parse(&format!("{}/{}", base.trim_end_matches('/'), path))
        .map_err(|e| ArchiverError::invalid_request(format!("invalid URL '{base}': {e}")))?;
    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params);
    }
    Ok(url)
}

/// Formats an instant the way the appliance expects: RFC 3339 with
/// millisecond precision and a `-00:00` offset suffix.
pub(crate) fn format_instant(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace('Z', "-00:00")
}
