//! Types d'erreurs pour le registre des bâtiments

use thiserror::Error;

/// Erreurs pouvant survenir lors de la réconciliation et du versioning
#[derive(Debug, Error)]
pub enum BatidError {
    /// Entrée invalide: aucune mutation appliquée, l'appelant corrige
    #[error("Validation error: {0}")]
    Validation(String),

    /// Violation de contrainte en base: la transaction est annulée,
    /// le candidat reste non réclamé pour retry
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Collision de claim avec un autre worker: retenter sur un autre batch
    #[error("Lock contention while claiming batch: {0}")]
    LockContention(String),

    /// Le rollback écraserait une mutation postérieure non liée
    #[error("Conflict on building {rnb_id}: {reason}")]
    Conflict { rnb_id: String, reason: String },

    /// Statut inconnu ou transition interdite
    #[error("Invalid status transition from {from:?} to {to}")]
    InvalidTransition { from: Option<String>, to: String },

    /// Décision hors de l'énumération fermée
    #[error("Invalid inspection decision: {0}")]
    InvalidDecision(String),

    /// Géométrie inexploitable pour l'appariement
    #[error("Invalid geometry for {entity_id}: {reason}")]
    InvalidGeometry { entity_id: String, reason: String },

    /// Panne d'infrastructure: propagée à la politique de retry de l'appelant
    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}

impl BatidError {
    /// Crée une erreur de validation
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    /// Crée une erreur de conflit de rollback
    pub fn conflict(rnb_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Conflict {
            rnb_id: rnb_id.into(),
            reason: reason.into(),
        }
    }

    /// Crée une erreur de géométrie invalide
    pub fn invalid_geometry(entity_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            entity_id: entity_id.into(),
            reason: reason.into(),
        }
    }
}
