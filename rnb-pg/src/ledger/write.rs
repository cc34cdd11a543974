//! Opération write-through du registre
//!
//! Chaque mutation (création, mise à jour, désactivation logique) est
//! capturée exactement une fois dans l'historique et attribuée à un
//! événement. La suppression physique n'existe pas: un bâtiment disparu
//! est désactivé, son historique reste contigu.
//!
//! L'écriture exige un [`WriteGrant`], jeton de capacité construit au
//! point d'appel: il remplace tout drapeau ambiant autorisant les
//! écritures "dangereuses" et porte l'estampille d'événement partagée
//! par toutes les lignes mutées par la même opération logique.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use deadpool_postgres::Transaction;
use geo::Geometry;
use tracing::debug;
use uuid::Uuid;

use batid::{geometry_hash, Building, BuildingStatus, EventKind, SourceRef};

use crate::db::{geom, SCHEMA, SRID};

use super::read;

/// Estampille d'événement portée par chaque ligne mutée
#[derive(Debug, Clone)]
pub struct EventStamp {
    /// Identifiant de l'événement (fourni par l'appelant ou frais)
    pub event_id: Uuid,
    /// Nature de l'événement
    pub kind: EventKind,
    /// Utilisateur à l'origine de l'opération
    pub user: String,
}

/// Jeton de capacité pour écrire dans le registre
///
/// Construit explicitement au point d'appel et passé par référence aux
/// opérations d'écriture d'une même opération logique. Le champ est privé:
/// impossible d'écrire dans le ledger sans passer par ce constructeur.
#[derive(Debug)]
pub struct WriteGrant {
    stamp: EventStamp,
}

impl WriteGrant {
    /// Grant avec un identifiant d'événement frais
    pub fn new(kind: EventKind, user: &str) -> Self {
        Self::with_event_id(kind, user, Uuid::new_v4())
    }

    /// Grant rattaché à un événement fourni par l'appelant
    pub fn with_event_id(kind: EventKind, user: &str, event_id: Uuid) -> Self {
        Self {
            stamp: EventStamp {
                event_id,
                kind,
                user: user.to_string(),
            },
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.stamp.event_id
    }

    pub fn kind(&self) -> EventKind {
        self.stamp.kind
    }

    pub fn user(&self) -> &str {
        &self.stamp.user
    }
}

/// Nouvelle version d'un bâtiment à écrire dans la vue courante
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub geometry: Geometry,
    pub status: Option<BuildingStatus>,
    pub active: bool,
    pub addresses: Vec<String>,
    pub source_refs: Vec<SourceRef>,
}

impl NewVersion {
    /// Version reprenant l'état d'un bâtiment existant
    pub fn from_building(building: &Building) -> Self {
        Self {
            geometry: building.geometry.clone(),
            status: building.status,
            active: building.active,
            addresses: building.addresses.clone(),
            source_refs: building.source_refs.clone(),
        }
    }
}

/// Crée un bâtiment: identifiant public frais, jamais réutilisé
///
/// Première version: pas de ligne d'historique à fermer.
pub async fn create_building(
    tx: &Transaction<'_>,
    grant: &WriteGrant,
    version: &NewVersion,
) -> Result<Uuid> {
    let rnb_id = Uuid::new_v4();
    let now = Utc::now();
    insert_current(tx, grant, rnb_id, version, now).await?;

    debug!(
        rnb_id = %rnb_id,
        event_id = %grant.event_id(),
        "Building created"
    );
    Ok(rnb_id)
}

/// Met à jour un bâtiment existant via le write-through
///
/// Ferme l'intervalle de la ligne courante, la copie telle quelle (plus
/// `valid_to`) dans l'historique, puis écrit la nouvelle version.
pub async fn update_building(
    tx: &Transaction<'_>,
    grant: &WriteGrant,
    rnb_id: Uuid,
    version: &NewVersion,
) -> Result<()> {
    let prior = read::current_for_update(tx, rnb_id)
        .await?
        .ok_or_else(|| batid::BatidError::validation(format!("unknown building {rnb_id}")))?;

    let now = later_than(prior.valid_from);
    close_into_history(tx, rnb_id, now).await?;
    replace_current(tx, grant, rnb_id, version, now).await?;

    debug!(
        rnb_id = %rnb_id,
        event_id = %grant.event_id(),
        kind = grant.kind().as_str(),
        "Building version written"
    );
    Ok(())
}

/// Désactive logiquement un bâtiment (jamais de DELETE une fois historisé)
pub async fn deactivate_building(
    tx: &Transaction<'_>,
    grant: &WriteGrant,
    rnb_id: Uuid,
) -> Result<()> {
    let prior = read::current_for_update(tx, rnb_id)
        .await?
        .ok_or_else(|| batid::BatidError::validation(format!("unknown building {rnb_id}")))?;

    let mut version = NewVersion::from_building(&prior);
    version.active = false;

    let now = later_than(prior.valid_from);
    close_into_history(tx, rnb_id, now).await?;
    replace_current(tx, grant, rnb_id, &version, now).await?;

    debug!(rnb_id = %rnb_id, event_id = %grant.event_id(), "Building deactivated");
    Ok(())
}

/// Les intervalles doivent rester strictement ordonnés même si l'horloge
/// retourne un instant égal à `valid_from` de la version précédente
fn later_than(prior: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > prior {
        now
    } else {
        prior + chrono::Duration::microseconds(1)
    }
}

/// Copie la ligne courante, intervalle fermé à `valid_to`, dans l'historique
async fn close_into_history(
    tx: &Transaction<'_>,
    rnb_id: Uuid,
    valid_to: DateTime<Utc>,
) -> Result<()> {
    let sql = format!(
        "INSERT INTO {schema}.batiments_histo \
         (rnb_id, geometry, geometry_hash, statut, actif, \
          event_id, event_kind, event_user, addresses, source_refs, valid_from, valid_to) \
         SELECT rnb_id, geometry, geometry_hash, statut, actif, \
                event_id, event_kind, event_user, addresses, source_refs, valid_from, $2 \
         FROM {schema}.batiments WHERE rnb_id = $1",
        schema = SCHEMA
    );

    let inserted = tx
        .execute(&sql, &[&rnb_id, &valid_to])
        .await
        .context("Failed to append prior version to history")?;

    if inserted != 1 {
        anyhow::bail!("expected exactly one current row for {rnb_id}, found {inserted}");
    }
    Ok(())
}

async fn insert_current(
    tx: &Transaction<'_>,
    grant: &WriteGrant,
    rnb_id: Uuid,
    version: &NewVersion,
    valid_from: DateTime<Utc>,
) -> Result<()> {
    let ewkb = geom::to_ewkb(&version.geometry, SRID)?;
    let hash = geometry_hash(&version.geometry).to_vec();
    let source_refs =
        serde_json::to_value(&version.source_refs).context("Failed to serialize source refs")?;
    let status = version.status.map(|s| s.as_str());

    let sql = format!(
        "INSERT INTO {schema}.batiments \
         (rnb_id, geometry, geometry_hash, statut, actif, \
          event_id, event_kind, event_user, addresses, source_refs, valid_from) \
         VALUES ($1, ST_GeomFromEWKB($2), $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        schema = SCHEMA
    );

    tx.execute(
        &sql,
        &[
            &rnb_id,
            &ewkb,
            &hash,
            &status,
            &version.active,
            &grant.event_id(),
            &grant.kind().as_str(),
            &grant.user(),
            &version.addresses,
            &source_refs,
            &valid_from,
        ],
    )
    .await
    .context("Failed to insert current building row")?;

    Ok(())
}

async fn replace_current(
    tx: &Transaction<'_>,
    grant: &WriteGrant,
    rnb_id: Uuid,
    version: &NewVersion,
    valid_from: DateTime<Utc>,
) -> Result<()> {
    let ewkb = geom::to_ewkb(&version.geometry, SRID)?;
    let hash = geometry_hash(&version.geometry).to_vec();
    let source_refs =
        serde_json::to_value(&version.source_refs).context("Failed to serialize source refs")?;
    let status = version.status.map(|s| s.as_str());

    let sql = format!(
        "UPDATE {schema}.batiments SET \
         geometry = ST_GeomFromEWKB($2), geometry_hash = $3, statut = $4, actif = $5, \
         event_id = $6, event_kind = $7, event_user = $8, addresses = $9, \
         source_refs = $10, valid_from = $11, updated_at = NOW() \
         WHERE rnb_id = $1",
        schema = SCHEMA
    );

    tx.execute(
        &sql,
        &[
            &rnb_id,
            &ewkb,
            &hash,
            &status,
            &version.active,
            &grant.event_id(),
            &grant.kind().as_str(),
            &grant.user(),
            &version.addresses,
            &source_refs,
            &valid_from,
        ],
    )
    .await
    .context("Failed to replace current building row")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_carries_fresh_event() {
        let a = WriteGrant::new(EventKind::Creation, "inspector");
        let b = WriteGrant::new(EventKind::Creation, "inspector");
        assert_ne!(a.event_id(), b.event_id());
        assert_eq!(a.kind(), EventKind::Creation);
        assert_eq!(a.user(), "inspector");
    }

    #[test]
    fn test_grant_accepts_caller_event() {
        let event_id = Uuid::new_v4();
        let grant = WriteGrant::with_event_id(EventKind::Update, "admin", event_id);
        assert_eq!(grant.event_id(), event_id);
    }

    #[test]
    fn test_later_than_is_strictly_increasing() {
        let prior = Utc::now() + chrono::Duration::seconds(10);
        let next = later_than(prior);
        assert!(next > prior);
    }
}
