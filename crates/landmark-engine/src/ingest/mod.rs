//! CSV and binary loaders for the artifacts produced outside the ranking core.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub mod landmarks;
pub mod measurements;

pub use landmarks::{
    load_anchor_universe, load_country_codes, load_landmarks, load_queries,
    load_reference_distances, Landmarks,
};
pub use measurements::{load_rtt_samples, load_weight_table};

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read file: {:?}", path))
}

fn csv_reader(content: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes())
}
