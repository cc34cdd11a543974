//! Annulation des mutations d'un utilisateur sur une fenêtre temporelle
//!
//! Le rollback ne réécrit jamais l'historique: chaque événement annulé
//! produit une nouvelle version qui restaure l'état précédent, attribuée
//! à l'acteur système de rollback. Un événement de création s'annule par
//! une désactivation, jamais par une suppression physique.
//!
//! Toute la fenêtre s'annule dans une seule transaction: si un bâtiment
//! visé a été muté depuis par quelqu'un d'autre, le rollback entier
//! échoue en conflit plutôt que d'écraser silencieusement ce travail.

use std::collections::{BTreeMap, HashSet};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use deadpool_postgres::{Pool, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use batid::BatidError;

use crate::db::SCHEMA;
use crate::ledger::{self, read, write, NewVersion};

/// Acteur système auquel sont attribuées les versions de rollback
pub const ROLLBACK_ACTOR: &str = "rollback";

/// Bilan d'un rollback
#[derive(Debug, Default)]
pub struct RollbackReport {
    /// Événements distincts trouvés dans la fenêtre
    pub events_found: usize,
    /// Versions annulées (restaurations + désactivations); un événement
    /// partagé entre plusieurs bâtiments compte une fois par bâtiment
    pub versions_undone: usize,
    /// Bâtiments touchés
    pub buildings_touched: usize,
    /// Créations annulées par désactivation
    pub deactivations: usize,
}

/// Un événement de mutation retrouvé dans la fenêtre
#[derive(Debug, Clone)]
struct EventRow {
    event_id: Option<Uuid>,
    valid_from: DateTime<Utc>,
}

/// Annule les mutations d'un utilisateur dont `valid_from` tombe dans
/// `[from, to)`
///
/// Le conflit est vérifié avant toute écriture: pour chaque bâtiment
/// touché, toute version postérieure au plus ancien événement annulé
/// doit provenir d'un événement collecté ou d'un rollback antérieur.
/// Sinon, la transaction entière est abandonnée.
pub async fn rollback_window(
    pool: &Pool,
    user: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<RollbackReport> {
    if to <= from {
        return Err(BatidError::validation(format!(
            "empty rollback window: {from} .. {to}"
        ))
        .into());
    }

    let mut client = pool.get().await?;
    let tx = client
        .transaction()
        .await
        .context("Failed to open rollback transaction")?;

    let per_building = collect_events(&tx, user, from, to).await?;
    let mut report = RollbackReport {
        events_found: per_building
            .values()
            .flatten()
            .map(|e| e.event_id)
            .collect::<HashSet<_>>()
            .len(),
        ..Default::default()
    };
    if per_building.is_empty() {
        info!(user, %from, %to, "No events to roll back");
        tx.commit().await.context("Failed to commit rollback")?;
        return Ok(report);
    }

    info!(
        user,
        %from,
        %to,
        buildings = per_building.len(),
        events = report.events_found,
        "Rolling back window"
    );

    for (rnb_id, events) in &per_building {
        undo_building(&tx, *rnb_id, events, &mut report).await?;
        report.buildings_touched += 1;
    }

    tx.commit().await.context("Failed to commit rollback")?;
    info!(
        user,
        undone = report.versions_undone,
        deactivations = report.deactivations,
        "Rollback done"
    );
    Ok(report)
}

/// Collecte les événements de l'utilisateur, par bâtiment, du plus
/// récent au plus ancien
///
/// La mutation la plus récente d'un bâtiment vit dans la table courante,
/// les précédentes dans l'historique: les deux tables sont balayées.
async fn collect_events(
    tx: &Transaction<'_>,
    user: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<BTreeMap<Uuid, Vec<EventRow>>> {
    let sql = format!(
        "SELECT rnb_id, event_id, valid_from FROM {SCHEMA}.batiments \
         WHERE event_user = $1 AND valid_from >= $2 AND valid_from < $3 \
         UNION ALL \
         SELECT rnb_id, event_id, valid_from FROM {SCHEMA}.batiments_histo \
         WHERE event_user = $1 AND valid_from >= $2 AND valid_from < $3 \
         ORDER BY valid_from DESC"
    );

    let rows = tx
        .query(&sql, &[&user, &from, &to])
        .await
        .context("Failed to collect events to roll back")?;

    let mut per_building: BTreeMap<Uuid, Vec<EventRow>> = BTreeMap::new();
    for row in &rows {
        let rnb_id: Uuid = row.get("rnb_id");
        per_building.entry(rnb_id).or_default().push(EventRow {
            event_id: row.get("event_id"),
            valid_from: row.get("valid_from"),
        });
    }
    Ok(per_building)
}

/// Annule les événements d'un bâtiment, du plus récent au plus ancien
async fn undo_building(
    tx: &Transaction<'_>,
    rnb_id: Uuid,
    events: &[EventRow],
    report: &mut RollbackReport,
) -> Result<()> {
    // Verrouille la ligne courante pour toute la durée de l'annulation
    if read::current_for_update(tx, rnb_id).await?.is_none() {
        return Err(
            BatidError::Integrity(format!("building {rnb_id} has events but no current row"))
                .into(),
        );
    }

    // Conflit: toute version depuis le plus ancien événement annulé doit
    // provenir d'un événement collecté ou d'un rollback antérieur. Un
    // événement étranger intercalé dans la fenêtre, ou postérieur à
    // elle, serait écrasé par la restauration.
    let oldest = events
        .last()
        .ok_or_else(|| BatidError::Integrity(format!("no events collected for {rnb_id}")))?;
    let collected: HashSet<Option<Uuid>> = events.iter().map(|e| e.event_id).collect();

    let sql = format!(
        "SELECT event_id, event_user FROM {SCHEMA}.batiments \
         WHERE rnb_id = $1 AND valid_from >= $2 \
         UNION ALL \
         SELECT event_id, event_user FROM {SCHEMA}.batiments_histo \
         WHERE rnb_id = $1 AND valid_from >= $2"
    );
    let rows = tx
        .query(&sql, &[&rnb_id, &oldest.valid_from])
        .await
        .context("Failed to check for interleaved events")?;

    for row in &rows {
        let event_id: Option<Uuid> = row.get("event_id");
        let event_user: Option<String> = row.get("event_user");
        if !collected.contains(&event_id) && event_user.as_deref() != Some(ROLLBACK_ACTOR) {
            return Err(BatidError::Conflict {
                rnb_id: rnb_id.to_string(),
                reason: format!(
                    "event {event_id:?} by {event_user:?} mutated the building since {}",
                    oldest.valid_from
                ),
            }
            .into());
        }
    }

    for event in events {
        match read::history_closed_at(tx, rnb_id, event.valid_from).await? {
            Some(prior) => {
                let grant = ledger::update_grant(ROLLBACK_ACTOR);
                let version = NewVersion::from_building(&prior);
                write::update_building(tx, &grant, rnb_id, &version).await?;
                debug!(rnb_id = %rnb_id, undone = ?event.event_id, "Prior version restored");
            }
            // Pas de version remplacée: l'événement était une création
            None => {
                let grant = ledger::deactivation_grant(ROLLBACK_ACTOR);
                write::deactivate_building(tx, &grant, rnb_id).await?;
                report.deactivations += 1;
                debug!(rnb_id = %rnb_id, undone = ?event.event_id, "Creation undone by deactivation");
            }
        }
        report.versions_undone += 1;
    }

    Ok(())
}
