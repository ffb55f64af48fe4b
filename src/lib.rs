//! Client library for the EPICS Archiver Appliance HTTP APIs.
//!
//! Two clients: [`ArchiverDataClient`] for time-series retrieval and
//! [`ArchiverMgmtClient`] for PV-set queries and archiving lifecycle
//! operations. Both default their base URL from the site configuration
//! resolved by [`config::resolve`].

pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod types;
pub mod validation;

pub use client::{ArchiveOptions, ArchiverDataClient, ArchiverMgmtClient, BatchResult, SamplingMethod};
pub use config::{Config, ConfigError};
pub use error::{ArchiverError, Result};
pub use types::{
    ApplianceInfo, Meta, Point, PointValue, PvDetail, PvStatus, PvTypeInfo, TimeRange, TimeSeries,
};
