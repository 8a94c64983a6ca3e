use crate::attributes::Category;
use crate::error::{RankError, Result};
use crate::growth::SnapshotSeries;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Run key used by drivers that produce a single series.
pub const GLOBAL_RUN: &str = "global";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Bincode,
    Json,
}

impl SnapshotFormat {
    /// `.json` means JSON; anything else is bincode.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Bincode,
        }
    }
}

impl FromStr for SnapshotFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bin" | "bincode" => Ok(Self::Bincode),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown snapshot format: {}", other)),
        }
    }
}

pub fn save_bincode<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = bincode::serialize(value)?;
    fs::write(path, data)?;
    Ok(())
}

pub fn load_bincode<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read(path)?;
    Ok(bincode::deserialize(&data)?)
}

pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content)?;
    Ok(())
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn save<T: Serialize>(path: &Path, value: &T, format: SnapshotFormat) -> Result<()> {
    match format {
        SnapshotFormat::Bincode => save_bincode(path, value),
        SnapshotFormat::Json => save_json(path, value),
    }
}

pub fn load<T: DeserializeOwned>(path: &Path, format: SnapshotFormat) -> Result<T> {
    match format {
        SnapshotFormat::Bincode => load_bincode(path),
        SnapshotFormat::Json => load_json(path),
    }
}

/// Everything one ranking invocation produced: run key -> snapshot series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotArchive {
    pub policy: String,
    pub diversity: Option<Category>,
    pub generated_at: String, // RFC 3339
    pub runs: BTreeMap<String, SnapshotSeries>,
}

impl SnapshotArchive {
    pub fn new(policy: &str, diversity: Option<Category>) -> Self {
        Self {
            policy: policy.to_string(),
            diversity,
            generated_at: chrono::Utc::now().to_rfc3339(),
            runs: BTreeMap::new(),
        }
    }

    pub fn single(policy: &str, diversity: Option<Category>, series: SnapshotSeries) -> Self {
        let mut archive = Self::new(policy, diversity);
        archive.runs.insert(GLOBAL_RUN.to_string(), series);
        archive
    }

    pub fn global(&self) -> Option<&SnapshotSeries> {
        self.runs.get(GLOBAL_RUN)
    }

    pub fn save_to_file(&self, path: &Path, format: SnapshotFormat) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        save(path, self, format)?;
        info!("💾 {} run(s) saved to {}", self.runs.len(), path.display());
        Ok(())
    }

    pub fn load_from_file(path: &Path, format: SnapshotFormat) -> Result<Self> {
        if !path.exists() {
            return Err(RankError::InvalidArgument(format!(
                "snapshot archive not found: {}",
                path.display()
            )));
        }
        let archive: Self = load(path, format)?;
        info!("📂 {} run(s) loaded from {}", archive.runs.len(), path.display());
        Ok(archive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_follows_extension() {
        assert_eq!(SnapshotFormat::from_path(Path::new("a/b.json")), SnapshotFormat::Json);
        assert_eq!(SnapshotFormat::from_path(Path::new("a/b.JSON")), SnapshotFormat::Json);
        assert_eq!(SnapshotFormat::from_path(Path::new("a/b.bin")), SnapshotFormat::Bincode);
        assert_eq!(SnapshotFormat::from_path(Path::new("a/b")), SnapshotFormat::Bincode);
    }

    #[test]
    fn missing_archive_is_an_error() {
        let err = SnapshotArchive::load_from_file(
            Path::new("/nonexistent/landmark/archive.bin"),
            SnapshotFormat::Bincode,
        )
        .unwrap_err();
        assert!(matches!(err, RankError::InvalidArgument(_)));
    }
}
