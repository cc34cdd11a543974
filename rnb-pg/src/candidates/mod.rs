//! Staging des candidats: dépôt, claim par lot, décision, balayage
//!
//! Le claim est une seule instruction UPDATE avec sous-requête
//! `FOR UPDATE SKIP LOCKED`: deux inspecteurs concurrents obtiennent des
//! lots disjoints sans se bloquer. Claim et décision sont deux
//! transactions distinctes; un claim sans décision ne revient dans le
//! flux que par le balayage explicite des claims périmés.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use deadpool_postgres::{Pool, Transaction};
use geo::Geometry;
use tokio_postgres::error::SqlState;
use tracing::{debug, info};

use batid::{BatidError, Candidate, Decision};

use crate::db::{geom, SCHEMA, SRID};

/// Candidat à déposer dans le staging
#[derive(Debug, Clone)]
pub struct NewCandidate {
    pub geometry: Geometry,
    pub source: String,
    pub source_id: String,
    pub address_keys: Vec<String>,
}

/// Dépose un candidat, retourne son identifiant de staging
pub async fn insert_candidate(pool: &Pool, candidate: &NewCandidate) -> Result<i64> {
    let client = pool.get().await?;
    let ewkb = geom::to_ewkb(&candidate.geometry, SRID)?;

    let sql = format!(
        "INSERT INTO {SCHEMA}.candidats (geometry, source, source_id, address_keys) \
         VALUES (ST_GeomFromEWKB($1), $2, $3, $4) RETURNING id"
    );

    let row = client
        .query_one(
            &sql,
            &[
                &ewkb,
                &candidate.source,
                &candidate.source_id,
                &candidate.address_keys,
            ],
        )
        .await
        .context("Failed to insert candidate")?;

    Ok(row.get(0))
}

/// Réclame un lot de candidats non traités pour un inspecteur
///
/// Une seule instruction: les lignes déjà verrouillées par un claim
/// concurrent sont sautées, jamais attendues. Retourne le nombre de
/// candidats obtenus; le lot se relit ensuite via [`load_batch`].
pub async fn claim_batch(pool: &Pool, claim_stamp: &str, batch_size: i64) -> Result<u64> {
    let client = pool.get().await?;

    let sql = format!(
        "UPDATE {SCHEMA}.candidats SET claim_stamp = $1, claimed_at = NOW() \
         WHERE id IN ( \
             SELECT id FROM {SCHEMA}.candidats \
             WHERE claim_stamp IS NULL AND decision IS NULL \
             ORDER BY id LIMIT $2 \
             FOR UPDATE SKIP LOCKED \
         )"
    );

    let claimed = client
        .execute(&sql, &[&claim_stamp, &batch_size])
        .await
        .map_err(map_contention)
        .context("Failed to claim candidate batch")?;

    debug!(claim_stamp, claimed, "Candidate batch claimed");
    Ok(claimed)
}

/// Relit les candidats d'un claim, ordonnés par identifiant
pub async fn load_batch(pool: &Pool, claim_stamp: &str) -> Result<Vec<Candidate>> {
    let client = pool.get().await?;

    let sql = format!(
        "SELECT id, ST_AsBinary(geometry) AS geom_wkb, source, source_id, address_keys, \
                claim_stamp, claimed_at, decision, decision_detail, created_at \
         FROM {SCHEMA}.candidats \
         WHERE claim_stamp = $1 AND decision IS NULL \
         ORDER BY id"
    );

    let rows = client
        .query(&sql, &[&claim_stamp])
        .await
        .context("Failed to load claimed candidates")?;

    rows.iter().map(row_to_candidate).collect()
}

/// Enregistre la décision d'inspection d'un candidat
///
/// Rejouer la même décision est un no-op (`Ok(false)`); une décision
/// différente sur un candidat déjà décidé est une erreur de validation.
pub async fn record_decision(
    tx: &Transaction<'_>,
    candidate_id: i64,
    decision: &Decision,
) -> Result<bool> {
    let sql = format!(
        "SELECT decision, decision_detail FROM {SCHEMA}.candidats WHERE id = $1 FOR UPDATE"
    );
    let row = tx
        .query_opt(&sql, &[&candidate_id])
        .await
        .context("Failed to lock candidate for decision")?
        .ok_or_else(|| BatidError::validation(format!("unknown candidate {candidate_id}")))?;

    let existing_kind: Option<String> = row.get("decision");
    if let Some(kind) = existing_kind {
        let detail: Option<serde_json::Value> = row.get("decision_detail");
        let existing = Decision::from_columns(&kind, detail.as_ref())?;
        if existing == *decision {
            debug!(candidate_id, kind = decision.kind(), "Decision replayed, no-op");
            return Ok(false);
        }
        return Err(BatidError::validation(format!(
            "candidate {candidate_id} already decided as {kind}, refusing {}",
            decision.kind()
        ))
        .into());
    }

    let sql = format!(
        "UPDATE {SCHEMA}.candidats SET decision = $2, decision_detail = $3 WHERE id = $1"
    );
    tx.execute(&sql, &[&candidate_id, &decision.kind(), &decision.detail()])
        .await
        .context("Failed to record decision")?;

    Ok(true)
}

/// Requalifie les claims périmés sans décision
///
/// Aucun retour automatique dans le flux: seule cette passe explicite
/// efface le claim des candidats réclamés avant `cutoff` et jamais
/// décidés, par exemple après le crash d'un inspecteur.
pub async fn sweep_stale_claims(pool: &Pool, cutoff: DateTime<Utc>) -> Result<u64> {
    let client = pool.get().await?;

    let sql = format!(
        "UPDATE {SCHEMA}.candidats SET claim_stamp = NULL, claimed_at = NULL \
         WHERE decision IS NULL AND claim_stamp IS NOT NULL AND claimed_at < $1"
    );

    let swept = client
        .execute(&sql, &[&cutoff])
        .await
        .context("Failed to sweep stale claims")?;

    if swept > 0 {
        info!(swept, cutoff = %cutoff, "Stale claims requeued");
    }
    Ok(swept)
}

/// Candidats restant à traiter (ni réclamés ni décidés)
pub async fn pending_count(pool: &Pool) -> Result<i64> {
    let client = pool.get().await?;
    let sql = format!(
        "SELECT COUNT(*) FROM {SCHEMA}.candidats WHERE claim_stamp IS NULL AND decision IS NULL"
    );
    let row = client
        .query_one(&sql, &[])
        .await
        .context("Failed to count pending candidates")?;
    Ok(row.get(0))
}

fn row_to_candidate(row: &tokio_postgres::Row) -> Result<Candidate> {
    let id: i64 = row.get("id");
    let wkb: Vec<u8> = row.get("geom_wkb");
    let geometry =
        geom::from_wkb(&wkb).with_context(|| format!("Invalid candidate geometry for {id}"))?;

    let decision_kind: Option<String> = row.get("decision");
    let decision = decision_kind
        .map(|kind| {
            let detail: Option<serde_json::Value> = row.get("decision_detail");
            Decision::from_columns(&kind, detail.as_ref())
        })
        .transpose()?;

    Ok(Candidate {
        id,
        geometry,
        source: row.get("source"),
        source_id: row.get("source_id"),
        address_keys: row.get("address_keys"),
        claim_stamp: row.get("claim_stamp"),
        claimed_at: row.get("claimed_at"),
        decision,
        created_at: row.get("created_at"),
    })
}

/// Requalifie les échecs de sérialisation et les deadlocks en erreur de
/// contention, que l'appelant peut choisir de rejouer
fn map_contention(err: tokio_postgres::Error) -> anyhow::Error {
    let contended = matches!(
        err.code(),
        Some(code)
            if *code == SqlState::T_R_SERIALIZATION_FAILURE
                || *code == SqlState::T_R_DEADLOCK_DETECTED
    );
    if contended {
        BatidError::LockContention(err.to_string()).into()
    } else {
        err.into()
    }
}
