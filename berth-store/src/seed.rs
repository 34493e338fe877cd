use berth_core::{CoachClass, Quota, Train};
use serde::Deserialize;
use std::path::Path;

/// Reference data loaded at startup: trains plus the inventory each class gets per run.
#[derive(Debug, Deserialize, Clone)]
pub struct SeedData {
    pub trains: Vec<Train>,
    #[serde(default)]
    pub inventory: Vec<InventoryTemplate>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InventoryTemplate {
    pub train_number: String,
    pub coach_class: CoachClass,
    pub quotas: Vec<QuotaSeats>,
    #[serde(default)]
    pub rac_capacity: u32,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct QuotaSeats {
    pub quota: Quota,
    pub seats: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("cannot read seed file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed seed file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("inventory template names unknown train {0}")]
    UnknownTrain(String),
}

impl InventoryTemplate {
    pub fn capacities(&self) -> Vec<(Quota, u32)> {
        self.quotas.iter().map(|q| (q.quota, q.seats)).collect()
    }
}

impl SeedData {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
            path: display.clone(),
            source,
        })?;
        Self::parse(&raw).map_err(|err| match err {
            SeedError::Parse { source, .. } => SeedError::Parse { path: display, source },
            other => other,
        })
    }

    pub fn parse(raw: &str) -> Result<Self, SeedError> {
        let data: SeedData = serde_json::from_str(raw).map_err(|source| SeedError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
        for template in &data.inventory {
            if !data.trains.iter().any(|t| t.number == template.train_number) {
                return Err(SeedError::UnknownTrain(template.train_number.clone()));
            }
        }
        Ok(data)
    }
}
