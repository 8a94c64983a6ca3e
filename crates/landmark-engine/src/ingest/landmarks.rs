use super::{csv_reader, read_file};
use crate::attributes::{AnchorAttributes, AnchorMeta};
use crate::geo::{self, Coordinates};
use crate::seed::Query;
use crate::topology::AnchorId;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct LandmarkRow {
    pid: AnchorId,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    asn: Option<String>,
    #[serde(default)]
    continent: Option<String>,
}

/// Anchor coordinates plus their categorical metadata.
#[derive(Debug, Clone, Default)]
pub struct Landmarks {
    pub locations: HashMap<AnchorId, Coordinates>,
    pub attributes: AnchorAttributes,
}

/// Columns: `pid, latitude, longitude` and optionally `country, city, asn, continent`.
/// A missing continent is derived from the country code.
pub fn parse_landmarks(content: &str) -> Result<Landmarks> {
    let mut landmarks = Landmarks::default();
    for row in csv_reader(content).deserialize() {
        let row: LandmarkRow = row?;
        landmarks
            .locations
            .insert(row.pid, Coordinates::new(row.latitude, row.longitude));
        // without a continent column the continent follows the country
        let continent = row.continent.filter(|c| !c.is_empty()).or_else(|| {
            row.country
                .as_deref()
                .and_then(geo::continent_of)
                .map(str::to_string)
        });
        landmarks.attributes.insert(
            row.pid,
            AnchorMeta {
                city: row.city,
                country: row.country,
                asn: row.asn,
                continent,
            },
        );
    }
    Ok(landmarks)
}

pub fn load_landmarks(path: &Path) -> Result<Landmarks> {
    let landmarks = parse_landmarks(&read_file(path)?)
        .with_context(|| format!("Invalid landmark table: {:?}", path))?;
    info!("loaded {} landmarks from {:?}", landmarks.locations.len(), path);
    Ok(landmarks)
}

/// Anchor ids from the header of the geolocation result table: every column
/// except the first (query) and the last (final verdict).
pub fn parse_anchor_universe(content: &str) -> Result<Vec<AnchorId>> {
    let mut rdr = csv_reader(content);
    let headers = rdr.headers()?.clone();
    let columns: Vec<&str> = headers.iter().collect();
    if columns.len() < 3 {
        anyhow::bail!("expected at least 3 columns, found {}", columns.len());
    }
    columns[1..columns.len() - 1]
        .iter()
        .map(|c| {
            c.parse::<AnchorId>()
                .with_context(|| format!("Invalid anchor id column: {:?}", c))
        })
        .collect()
}

pub fn load_anchor_universe(path: &Path) -> Result<Vec<AnchorId>> {
    parse_anchor_universe(&read_file(path)?)
        .with_context(|| format!("Invalid result table: {:?}", path))
}

#[derive(Debug, Deserialize)]
struct CountryCodeRow {
    #[serde(rename = "ISO_A3")]
    iso3: String,
    #[serde(rename = "ISO_A2")]
    iso2: String,
}

/// ISO 3166 alpha-3 -> alpha-2, from `ISO_A3, ISO_A2` columns.
pub fn parse_country_codes(content: &str) -> Result<HashMap<String, String>> {
    let mut codes = HashMap::new();
    for row in csv_reader(content).deserialize() {
        let row: CountryCodeRow = row?;
        codes.insert(row.iso3, row.iso2);
    }
    Ok(codes)
}

pub fn load_country_codes(path: &Path) -> Result<HashMap<String, String>> {
    parse_country_codes(&read_file(path)?)
        .with_context(|| format!("Invalid country code table: {:?}", path))
}

const REFERENCE_META_COLUMNS: [&str; 4] = ["addr", "pid", "longitude", "latitude"];

/// Per-country distance from each anchor to the country's reference point.
/// Columns: `addr, pid, longitude, latitude` followed by one column per ISO
/// alpha-3 code. Empty or unparsable cells are skipped.
pub fn parse_reference_distances(content: &str) -> Result<HashMap<String, Vec<(AnchorId, f64)>>> {
    let mut rdr = csv_reader(content);
    let headers = rdr.headers()?.clone();
    let pid_col = headers
        .iter()
        .position(|h| h == "pid")
        .context("missing pid column")?;

    let mut distances: HashMap<String, Vec<(AnchorId, f64)>> = HashMap::new();
    for record in rdr.records() {
        let record = record?;
        let pid: AnchorId = record
            .get(pid_col)
            .unwrap_or_default()
            .parse()
            .with_context(|| format!("Invalid pid in row {:?}", record.position()))?;

        for (column, value) in headers.iter().zip(record.iter()) {
            if REFERENCE_META_COLUMNS.contains(&column) {
                continue;
            }
            match value.parse::<f64>() {
                Ok(d) if d.is_finite() => {
                    distances.entry(column.to_string()).or_default().push((pid, d))
                }
                _ => debug!("skipping distance {:?} for {} / {}", value, pid, column),
            }
        }
    }
    Ok(distances)
}

pub fn load_reference_distances(path: &Path) -> Result<HashMap<String, Vec<(AnchorId, f64)>>> {
    parse_reference_distances(&read_file(path)?)
        .with_context(|| format!("Invalid reference distance table: {:?}", path))
}

#[derive(Debug, Deserialize)]
struct QueryRow {
    ip: String,
    claimed_country_iso3: String,
}

/// Queries from `ip, claimed_country_iso3` columns; other columns are ignored.
pub fn parse_queries(content: &str) -> Result<Vec<Query>> {
    csv_reader(content)
        .deserialize()
        .map(|row| -> Result<Query> {
            let row: QueryRow = row?;
            Ok(Query::new(row.ip, row.claimed_country_iso3))
        })
        .collect()
}

pub fn load_queries(path: &Path) -> Result<Vec<Query>> {
    parse_queries(&read_file(path)?).with_context(|| format!("Invalid query table: {:?}", path))
}
