//! Backfills de réparation du registre
//!
//! Deux passes idempotentes, en lots avec saut de verrous, relançables
//! sans coordination: complétion des métadonnées d'événement manquantes
//! sur les lignes legacy, et conversion des suppressions physiques
//! passées en lignes de désactivation.

use anyhow::{Context, Result};
use deadpool_postgres::Pool;
use tracing::{debug, info};

use crate::db::SCHEMA;

use super::BACKFILL_ACTOR;

/// Taille de lot par défaut des backfills
pub const DEFAULT_BATCH_SIZE: i64 = 1000;

/// Complète les métadonnées d'événement manquantes
///
/// Chaque ligne legacy (event_id NULL) reçoit un événement synthétique
/// frais de nature `creation`, attribué à l'acteur système. Les lignes
/// verrouillées par une transaction concurrente sont sautées et reprises
/// au lot suivant. Une seconde passe ne touche aucune ligne.
pub async fn backfill_event_metadata(pool: &Pool, batch_size: i64) -> Result<u64> {
    let mut total = 0;
    for table in ["batiments", "batiments_histo"] {
        let touched = backfill_table_events(pool, table, batch_size).await?;
        info!(table, rows = touched, "Event metadata backfilled");
        total += touched;
    }
    Ok(total)
}

async fn backfill_table_events(pool: &Pool, table: &str, batch_size: i64) -> Result<u64> {
    let sql = format!(
        "UPDATE {schema}.{table} SET \
         event_id = gen_random_uuid(), event_kind = 'creation', event_user = $1 \
         WHERE row_id IN ( \
             SELECT row_id FROM {schema}.{table} \
             WHERE event_id IS NULL \
             ORDER BY row_id LIMIT $2 \
             FOR UPDATE SKIP LOCKED \
         )",
        schema = SCHEMA,
        table = table,
    );

    let mut total = 0u64;
    loop {
        let client = pool.get().await?;
        let touched = client
            .execute(&sql, &[&BACKFILL_ACTOR, &batch_size])
            .await
            .with_context(|| format!("Failed to backfill events in {table}"))?;

        if touched == 0 {
            break;
        }
        total += touched;
        debug!(table, batch = touched, "Event backfill batch done");
    }

    Ok(total)
}

/// Convertit les suppressions physiques passées en désactivations
///
/// Un identifiant présent dans l'historique mais absent de la vue
/// courante trahit un DELETE d'avant le write-through. On réinsère une
/// ligne courante désactivée, copie de la dernière version connue, dont
/// `valid_from` reprend le `valid_to` de cette version pour garder
/// l'historique contigu. Idempotent: la ligne réinsérée fait disparaître
/// l'identifiant du prédicat.
pub async fn backfill_hard_deletes(pool: &Pool, batch_size: i64) -> Result<u64> {
    let sql = format!(
        "INSERT INTO {schema}.batiments \
         (rnb_id, geometry, geometry_hash, statut, actif, \
          event_id, event_kind, event_user, addresses, source_refs, valid_from) \
         SELECT h.rnb_id, h.geometry, h.geometry_hash, h.statut, FALSE, \
                gen_random_uuid(), 'deactivation', $1, h.addresses, h.source_refs, h.valid_to \
         FROM {schema}.batiments_histo h \
         JOIN ( \
             SELECT rnb_id, MAX(valid_to) AS valid_to \
             FROM {schema}.batiments_histo \
             WHERE rnb_id NOT IN (SELECT rnb_id FROM {schema}.batiments) \
             GROUP BY rnb_id \
             ORDER BY rnb_id LIMIT $2 \
         ) last ON last.rnb_id = h.rnb_id AND last.valid_to = h.valid_to \
         ON CONFLICT (rnb_id) DO NOTHING",
        schema = SCHEMA,
    );

    let mut total = 0u64;
    loop {
        let client = pool.get().await?;
        let touched = client
            .execute(&sql, &[&BACKFILL_ACTOR, &batch_size])
            .await
            .context("Failed to backfill hard-deleted buildings")?;

        if touched == 0 {
            break;
        }
        total += touched;
        debug!(batch = touched, "Hard-delete backfill batch done");
    }

    if total > 0 {
        info!(rows = total, "Hard deletes converted to deactivations");
    }
    Ok(total)
}
