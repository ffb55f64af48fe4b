//! Renders retrieved time-series into printable output formats.

use std::fmt::Write as _;

use chrono::{TimeZone, Utc};

use crate::error::{ArchiverError, Result};
use crate::types::TimeSeries;

/// Renders series as CSV with one row per sample.
pub fn to_csv(series: &[&TimeSeries]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record(["timestamp", "pv", "val", "severity", "status"])
        .map_err(|e| ArchiverError::Render(format!("failed to write CSV header: {e}")))?;

    for ts in series {
        for point in &ts.points {
            wtr.write_record([
                format_timestamp(point.timestamp_millis()),
                ts.pv().to_string(),
                point.val.to_string(),
                point.severity.to_string(),
                point.status.to_string(),
            ])
            .map_err(|e| ArchiverError::Render(format!("failed to write CSV record: {e}")))?;
        }
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| ArchiverError::Render(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ArchiverError::Render(e.to_string()))
}

/// Renders series as pretty-printed JSON, mirroring the wire layout.
pub fn to_json(series: &[&TimeSeries]) -> Result<String> {
    serde_json::to_string_pretty(series).map_err(|e| ArchiverError::Render(e.to_string()))
}

/// Renders series as a human-readable table, one block per PV.
pub fn to_table(series: &[&TimeSeries]) -> Result<String> {
    let mut output = String::new();

    for ts in series {
        writeln!(output, "PV: {}", ts.pv()).map_err(render_err)?;
        if let Some(egu) = &ts.meta.egu {
            writeln!(output, "Units: {egu}").map_err(render_err)?;
        }
        writeln!(output, "Samples: {}", ts.len()).map_err(render_err)?;
        writeln!(output).map_err(render_err)?;
        writeln!(output, "{:<28}{:>16}  {:>8}  {:>6}", "Timestamp", "Value", "Sevr", "Stat")
            .map_err(render_err)?;

        for point in &ts.points {
            writeln!(
                output,
                "{:<28}{:>16}  {:>8}  {:>6}",
                format_timestamp(point.timestamp_millis()),
                point.val.to_string(),
                point.severity,
                point.status
            )
            .map_err(render_err)?;
        }
        writeln!(output).map_err(render_err)?;
    }

    Ok(output)
}

fn render_err(e: std::fmt::Error) -> ArchiverError {
    ArchiverError::Render(e.to_string())
}

fn format_timestamp(ms: i64) -> String {
    match Utc.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        None => format!("{ms}ms"),
    }
}
