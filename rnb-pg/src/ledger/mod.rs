//! Registre bitemporel des bâtiments
//!
//! Vue courante (`rnb.batiments`) + historique append-only
//! (`rnb.batiments_histo`). Toute mutation passe par l'opération
//! write-through de [`write`]: fermeture de l'intervalle de la ligne
//! courante, copie conforme vers l'historique, écriture de la nouvelle
//! ligne courante estampillée d'un événement. Il n'y a pas de trigger:
//! l'historisation est explicite dans le chemin d'écriture.

pub mod backfill;
pub mod invariant;
pub mod read;
pub mod write;

pub use write::{EventStamp, NewVersion, WriteGrant};

use batid::EventKind;

/// Acteur système des backfills de réparation
pub const BACKFILL_ACTOR: &str = "backfill";

/// Construit un grant de création avec un événement frais
pub fn creation_grant(user: &str) -> WriteGrant {
    WriteGrant::new(EventKind::Creation, user)
}

/// Construit un grant de mise à jour avec un événement frais
pub fn update_grant(user: &str) -> WriteGrant {
    WriteGrant::new(EventKind::Update, user)
}

/// Construit un grant de désactivation avec un événement frais
pub fn deactivation_grant(user: &str) -> WriteGrant {
    WriteGrant::new(EventKind::Deactivation, user)
}
