use super::{csv_reader, read_file};
use crate::builder::{RttSample, WeightTable};
use crate::persistence;
use crate::topology::AnchorId;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Columns: `target, msm_id, origin, timestamp, rtt`.
pub fn parse_rtt_samples(content: &str) -> Result<Vec<RttSample>> {
    csv_reader(content)
        .deserialize::<RttSample>()
        .map(|row| row.map_err(anyhow::Error::from))
        .collect()
}

pub fn load_rtt_samples(path: &Path) -> Result<Vec<RttSample>> {
    let samples = parse_rtt_samples(&read_file(path)?)
        .with_context(|| format!("Invalid RTT sample table: {:?}", path))?;
    info!("loaded {} rtt samples from {:?}", samples.len(), path);
    Ok(samples)
}

#[derive(Debug, Deserialize)]
struct WeightRow {
    a: AnchorId,
    b: AnchorId,
    weight: f64,
}

/// Columns: `a, b, weight`; repeated pairs keep the smallest weight.
pub fn parse_weights(content: &str) -> Result<WeightTable> {
    let mut table = WeightTable::new();
    for row in csv_reader(content).deserialize() {
        let row: WeightRow = row?;
        table.observe(row.a, row.b, row.weight);
    }
    Ok(table)
}

/// Dispatches on extension: `.csv`, `.json`, anything else is bincode.
pub fn load_weight_table(path: &Path) -> Result<WeightTable> {
    let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

    let table = match extension {
        "csv" => parse_weights(&read_file(path)?)?,
        "json" => persistence::load_json(path)?,
        _ => persistence::load_bincode(path)?,
    };
    info!("loaded {} weighted pairs from {:?}", table.len(), path);
    Ok(table)
}
