//! Types de données du registre des bâtiments

use chrono::{DateTime, Utc};
use geo::Geometry;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{BatidError, BuildingStatus, Decision};

/// Nature d'un événement de mutation du registre
///
/// Chaque mutation (ligne courante + ligne d'historique) est estampillée
/// d'un identifiant d'événement et d'une de ces natures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Création d'un bâtiment (identifiant public frais)
    Creation,
    /// Mise à jour de la géométrie ou des attributs
    Update,
    /// Désactivation logique (jamais de suppression physique)
    Deactivation,
}

impl EventKind {
    /// Représentation persistée (colonne `event_kind`)
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Creation => "creation",
            EventKind::Update => "update",
            EventKind::Deactivation => "deactivation",
        }
    }

    /// Parse une valeur persistée
    pub fn parse(value: &str) -> Result<Self, BatidError> {
        match value {
            "creation" => Ok(EventKind::Creation),
            "update" => Ok(EventKind::Update),
            "deactivation" => Ok(EventKind::Deactivation),
            other => Err(BatidError::validation(format!(
                "unknown event kind: {other}"
            ))),
        }
    }
}

/// Référence croisée vers une source externe, avec fenêtre de validité
///
/// Un même bâtiment peut être connu du cadastre, de la base adresse
/// nationale et de la base nationale des bâtiments sous des identifiants
/// différents, chacun valable sur une période donnée.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Tag de la source (ex: "bdtopo", "ban", "bdnb")
    pub source: String,
    /// Identifiant du bâtiment dans la source
    pub external_id: String,
    /// Début de validité de la référence
    pub valid_from: DateTime<Utc>,
    /// Fin de validité (None = toujours valable)
    #[serde(default)]
    pub valid_to: Option<DateTime<Utc>>,
}

/// Vue courante d'un bâtiment (une ligne de `rnb.batiments`)
#[derive(Debug, Clone)]
pub struct Building {
    /// Identifiant public stable, jamais réutilisé
    pub rnb_id: Uuid,
    /// Emprise au sol (Polygon ou MultiPolygon)
    pub geometry: Geometry,
    /// Hash normalisé de la géométrie (None sur les lignes legacy)
    pub geometry_hash: Option<[u8; 32]>,
    /// Statut de cycle de vie (None sur les lignes legacy)
    pub status: Option<BuildingStatus>,
    /// Faux après un événement de désactivation
    pub active: bool,
    /// Événement propriétaire de cette version
    pub event_id: Option<Uuid>,
    /// Nature de l'événement propriétaire
    pub event_kind: Option<EventKind>,
    /// Utilisateur à l'origine de l'événement
    pub event_user: Option<String>,
    /// Clés d'adresses associées
    pub addresses: Vec<String>,
    /// Références croisées vers les sources externes
    pub source_refs: Vec<SourceRef>,
    /// Début de l'intervalle de validité système (intervalle ouvert)
    pub valid_from: DateTime<Utc>,
}

/// Version passée d'un bâtiment (une ligne de `rnb.batiments_histo`)
///
/// Immuable une fois écrite. Pour un identifiant donné, les intervalles
/// `[valid_from, valid_to)` se suivent sans trou ni chevauchement.
#[derive(Debug, Clone)]
pub struct BuildingSnapshot {
    /// État du bâtiment sur l'intervalle
    pub building: Building,
    /// Fin de l'intervalle de validité (intervalle fermé)
    pub valid_to: DateTime<Utc>,
}

/// Géométrie provisoire en attente de réconciliation
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Identifiant de staging
    pub id: i64,
    /// Géométrie candidate (Polygon ou MultiPolygon)
    pub geometry: Geometry,
    /// Tag de la source amont
    pub source: String,
    /// Identifiant du candidat dans la source
    pub source_id: String,
    /// Clés d'adresses portées par le candidat
    pub address_keys: Vec<String>,
    /// Stamp de claim (None = non réclamé)
    pub claim_stamp: Option<String>,
    /// Date du claim
    pub claimed_at: Option<DateTime<Utc>>,
    /// Décision d'inspection (None tant que non traité)
    pub decision: Option<Decision>,
    /// Date de création par l'importateur
    pub created_at: DateTime<Utc>,
}
