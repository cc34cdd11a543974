//! Décisions d'inspection typées
//!
//! La décision d'un inspecteur sur un candidat appartient à une énumération
//! fermée. Le variant porte le détail utile à l'audit (cible d'une mise à
//! jour, motif d'un refus, cibles d'un conflit de fusion) et se sérialise en
//! deux colonnes: `decision` (discriminant) et `decision_detail` (JSONB).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::BatidError;

/// Valeurs admises pour la colonne `decision`
pub const DECISION_KINDS: &[&str] = &["creation", "update", "refusal", "merge_conflict"];

/// Décision d'inspection sur un candidat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    /// Aucun bâtiment existant ne correspond: un identifiant public
    /// frais est frappé
    Creation,
    /// Le candidat recouvre suffisamment un unique bâtiment existant
    Update {
        /// Identifiant public du bâtiment mis à jour
        target: Uuid,
    },
    /// Taux de couverture ambigu: mis en attente de revue manuelle
    Refusal {
        /// Motif du refus (taux observé, etc.)
        reason: String,
    },
    /// Le candidat recouvre plusieurs bâtiments: la fusion automatique
    /// n'est pas supportée, résolution manuelle requise
    MergeConflict {
        /// Identifiants publics des bâtiments recouverts
        targets: Vec<Uuid>,
    },
}

impl Decision {
    /// Discriminant persisté (colonne `decision`)
    pub fn kind(&self) -> &'static str {
        match self {
            Decision::Creation => "creation",
            Decision::Update { .. } => "update",
            Decision::Refusal { .. } => "refusal",
            Decision::MergeConflict { .. } => "merge_conflict",
        }
    }

    /// La décision entraîne-t-elle une mutation du registre?
    pub fn mutates_ledger(&self) -> bool {
        matches!(self, Decision::Creation | Decision::Update { .. })
    }

    /// Vérifie qu'un discriminant appartient à l'énumération fermée
    pub fn validate_kind(kind: &str) -> Result<(), BatidError> {
        if DECISION_KINDS.contains(&kind) {
            Ok(())
        } else {
            Err(BatidError::InvalidDecision(kind.to_string()))
        }
    }

    /// Reconstruit une décision depuis les colonnes persistées
    pub fn from_columns(kind: &str, detail: Option<&serde_json::Value>) -> Result<Self, BatidError> {
        Self::validate_kind(kind)?;
        let mut value = detail.cloned().unwrap_or_else(|| serde_json::json!({}));
        if let Some(obj) = value.as_object_mut() {
            obj.insert("kind".to_string(), serde_json::json!(kind));
        }
        serde_json::from_value(value).map_err(|e| BatidError::InvalidDecision(e.to_string()))
    }

    /// Détail à persister en JSONB (sans le discriminant)
    pub fn detail(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).expect("decision serializes to object");
        if let Some(obj) = value.as_object_mut() {
            obj.remove("kind");
        }
        value
    }
}
