//! Application des statuts de cycle de vie côté base
//!
//! Deux opérations: la transition explicite d'un bâtiment (avec statut
//! "constructed" synthétique inséré au besoin) et le job de rattrapage
//! qui pose le statut par défaut sur les bâtiments actifs sans statut.

use anyhow::{Context, Result};
use deadpool_postgres::Pool;
use tracing::{debug, info};
use uuid::Uuid;

use batid::{transition_plan, BuildingStatus, EventKind};

use crate::db::SCHEMA;
use crate::ledger::{read, write, NewVersion, WriteGrant};

/// Acteur système du job de statut par défaut
pub const STATUS_JOB_ACTOR: &str = "status-backfill";

/// Statut posé par le job de rattrapage
pub const DEFAULT_STATUS: BuildingStatus = BuildingStatus::Constructed;

/// Fait passer un bâtiment au statut cible
///
/// La séquence calculée par [`transition_plan`] s'applique en une seule
/// transaction sous un seul événement: chaque statut intermédiaire
/// produit sa propre version, mais l'opération logique reste une.
/// Idempotent: re-viser le statut courant ne produit aucune version.
pub async fn transition_status(
    pool: &Pool,
    rnb_id: Uuid,
    target: BuildingStatus,
    user: &str,
) -> Result<usize> {
    let history = read::get_history(pool, rnb_id).await?;
    let past_statuses: Vec<BuildingStatus> = history
        .iter()
        .filter_map(|snapshot| snapshot.building.status)
        .collect();

    let mut client = pool.get().await?;
    let tx = client
        .transaction()
        .await
        .context("Failed to open status transaction")?;

    let current = read::current_for_update(&tx, rnb_id)
        .await?
        .ok_or_else(|| batid::BatidError::validation(format!("unknown building {rnb_id}")))?;

    let plan = transition_plan(current.status, &past_statuses, target);
    if plan.is_empty() {
        debug!(rnb_id = %rnb_id, status = %target, "Status already current, no-op");
        return Ok(0);
    }

    let grant = WriteGrant::new(EventKind::Update, user);
    let mut version = NewVersion::from_building(&current);
    let steps = plan.len();
    for status in plan {
        version.status = Some(status);
        write::update_building(&tx, &grant, rnb_id, &version).await?;
    }

    tx.commit()
        .await
        .context("Failed to commit status transition")?;

    info!(rnb_id = %rnb_id, status = %target, steps, "Status transition applied");
    Ok(steps)
}

/// Pose le statut par défaut sur les bâtiments actifs sans statut
///
/// Lots avec saut de verrous, relançable: une seconde passe ne trouve
/// plus rien et retourne 0. Toutes les versions d'une même passe
/// partagent le même événement.
pub async fn assign_default_status(pool: &Pool, batch_size: i64) -> Result<u64> {
    let grant = WriteGrant::new(EventKind::Update, STATUS_JOB_ACTOR);
    let mut total = 0u64;

    loop {
        let batch = next_unset_batch(pool, batch_size).await?;
        if batch.is_empty() {
            break;
        }

        for rnb_id in &batch {
            let mut client = pool.get().await?;
            let tx = client
                .transaction()
                .await
                .context("Failed to open default-status transaction")?;

            let current = match read::current_for_update(&tx, *rnb_id).await? {
                // Déjà traité ou désactivé entre la sélection et le verrou
                Some(b) if b.status.is_none() && b.active => b,
                _ => continue,
            };

            let mut version = NewVersion::from_building(&current);
            version.status = Some(DEFAULT_STATUS);
            write::update_building(&tx, &grant, *rnb_id, &version).await?;

            tx.commit()
                .await
                .context("Failed to commit default status")?;
            total += 1;
        }

        debug!(batch = batch.len(), "Default status batch done");
    }

    info!(
        assigned = total,
        status = %DEFAULT_STATUS,
        "Default status job done"
    );
    Ok(total)
}

/// Prochain lot de bâtiments actifs sans statut, verrous sautés
async fn next_unset_batch(pool: &Pool, batch_size: i64) -> Result<Vec<Uuid>> {
    let client = pool.get().await?;
    let sql = format!(
        "SELECT rnb_id FROM {SCHEMA}.batiments \
         WHERE statut IS NULL AND actif \
         ORDER BY row_id LIMIT $1 \
         FOR UPDATE SKIP LOCKED"
    );

    let rows = client
        .query(&sql, &[&batch_size])
        .await
        .context("Failed to select buildings without status")?;

    Ok(rows.iter().map(|row| row.get("rnb_id")).collect())
}
