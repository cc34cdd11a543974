//! Configuration du système

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use batid::MatchThresholds;

/// Configuration principale
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Seuils de la politique de décision de l'inspecteur
    #[serde(default)]
    pub thresholds: MatchThresholds,

    /// Taille des lots de claim
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Âge (minutes) au-delà duquel un claim sans décision est périmé
    #[serde(default = "default_stale_claim_minutes")]
    pub stale_claim_minutes: i64,

    /// Utilisateur auquel sont attribuées les mutations de l'inspecteur
    #[serde(default = "default_inspector_user")]
    pub inspector_user: String,
}

fn default_batch_size() -> i64 {
    1000
}

fn default_stale_claim_minutes() -> i64 {
    60
}

fn default_inspector_user() -> String {
    "inspector".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            thresholds: MatchThresholds::default(),
            batch_size: default_batch_size(),
            stale_claim_minutes: default_stale_claim_minutes(),
            inspector_user: default_inspector_user(),
        }
    }
}

impl Config {
    /// Charge une configuration depuis un fichier
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config JSON")
    }
}
