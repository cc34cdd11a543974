//! Inspecteur: réconciliation des candidats contre le registre
//!
//! Une passe = claim d'un lot, appariement géométrique hors transaction,
//! puis une transaction courte par candidat qui scelle ensemble la
//! mutation du registre et la décision. Si la transaction échoue,
//! ni l'une ni l'autre ne survit: le candidat reste réclamé et le
//! balayage des claims périmés le remettra dans le flux.

use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use deadpool_postgres::Pool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use batid::{
    classify, cover_ratio, geometry_hash, Candidate, Decision, MatchScore, MatchThresholds,
    SourceRef,
};

use crate::candidates;
use crate::ledger::{self, read, write, NewVersion};
use crate::report::{InspectionError, InspectionReport};

/// Inspecteur d'une passe de réconciliation
pub struct Inspector {
    pool: Pool,
    thresholds: MatchThresholds,
    user: String,
}

impl Inspector {
    pub fn new(pool: Pool, thresholds: MatchThresholds, user: &str) -> Self {
        Self {
            pool,
            thresholds,
            user: user.to_string(),
        }
    }

    /// Réclame puis traite un lot de candidats
    ///
    /// Les erreurs par candidat sont collectées dans le rapport, jamais
    /// propagées: un candidat invalide ne bloque pas le reste du lot.
    pub async fn run_batch(&self, claim_stamp: &str, batch_size: i64) -> Result<InspectionReport> {
        let started = Instant::now();
        let mut report = InspectionReport::new(claim_stamp);

        let claimed = candidates::claim_batch(&self.pool, claim_stamp, batch_size).await?;
        report.candidates_claimed = claimed as usize;
        if claimed == 0 {
            info!(claim_stamp, "No pending candidates");
            report.finalize();
            return Ok(report);
        }

        let batch = candidates::load_batch(&self.pool, claim_stamp).await?;
        info!(claim_stamp, count = batch.len(), "Inspecting candidate batch");

        for candidate in &batch {
            match self.inspect_candidate(candidate).await {
                Ok((decision, unchanged)) => {
                    report.record_decision(&candidate.source, &decision, unchanged);
                }
                Err(e) => {
                    warn!(
                        candidate_id = candidate.id,
                        source = %candidate.source,
                        "Candidate inspection failed: {e:#}"
                    );
                    report.record_error(InspectionError {
                        source: Some(candidate.source.clone()),
                        candidate_id: Some(candidate.id),
                        message: format!("{e:#}"),
                    });
                }
            }
        }

        report.set_duration(started.elapsed());
        report.finalize();
        info!(claim_stamp, "{}", report.summary());
        Ok(report)
    }

    /// Apparie un candidat et scelle décision + mutation
    ///
    /// Retourne la décision et un drapeau "géométrie inchangée" (mise à
    /// jour enregistrée sans réécrire de version).
    async fn inspect_candidate(&self, candidate: &Candidate) -> Result<(Decision, bool)> {
        let neighbours = read::find_intersecting_active(&self.pool, &candidate.geometry).await?;

        let candidate_tag = candidate.id.to_string();
        let mut scores = Vec::with_capacity(neighbours.len());
        for building in &neighbours {
            let ratio = cover_ratio(&candidate_tag, &candidate.geometry, &building.geometry)?;
            scores.push(MatchScore {
                rnb_id: building.rnb_id,
                ratio,
            });
        }

        let decision = classify(&scores, &self.thresholds);
        debug!(
            candidate_id = candidate.id,
            neighbours = neighbours.len(),
            kind = decision.kind(),
            "Candidate classified"
        );

        let mut client = self.pool.get().await?;
        let tx = client
            .transaction()
            .await
            .context("Failed to open decision transaction")?;

        let unchanged = match &decision {
            Decision::Creation => {
                let grant = ledger::creation_grant(&self.user);
                let version = NewVersion {
                    geometry: candidate.geometry.clone(),
                    status: None,
                    active: true,
                    addresses: candidate.address_keys.clone(),
                    source_refs: vec![source_ref_of(candidate)],
                };
                write::create_building(&tx, &grant, &version).await?;
                false
            }
            Decision::Update { target } => self.apply_update(&tx, candidate, *target).await?,
            // Refus et conflit de fusion ne mutent jamais le registre
            Decision::Refusal { .. } | Decision::MergeConflict { .. } => false,
        };

        candidates::record_decision(&tx, candidate.id, &decision).await?;
        tx.commit()
            .await
            .context("Failed to commit decision transaction")?;

        Ok((decision, unchanged))
    }

    /// Applique une mise à jour, en sautant l'écriture d'une nouvelle
    /// version si le hash géométrique n'a pas bougé
    async fn apply_update(
        &self,
        tx: &deadpool_postgres::Transaction<'_>,
        candidate: &Candidate,
        target: Uuid,
    ) -> Result<bool> {
        let current = read::current_for_update(tx, target)
            .await?
            .ok_or_else(|| batid::BatidError::validation(format!("unknown building {target}")))?;

        let new_hash = geometry_hash(&candidate.geometry);
        if current.geometry_hash == Some(new_hash) {
            debug!(rnb_id = %target, candidate_id = candidate.id, "Geometry unchanged, decision only");
            return Ok(true);
        }

        let mut version = NewVersion::from_building(&current);
        version.geometry = candidate.geometry.clone();
        for key in &candidate.address_keys {
            if !version.addresses.contains(key) {
                version.addresses.push(key.clone());
            }
        }
        version.source_refs.push(source_ref_of(candidate));

        let grant = ledger::update_grant(&self.user);
        write::update_building(tx, &grant, target, &version).await?;
        Ok(false)
    }
}

fn source_ref_of(candidate: &Candidate) -> SourceRef {
    SourceRef {
        source: candidate.source.clone(),
        external_id: candidate.source_id.clone(),
        valid_from: Utc::now(),
        valid_to: None,
    }
}
