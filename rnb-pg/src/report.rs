//! Rapport d'inspection avec graceful degradation
//!
//! Ce module fournit des structures pour collecter et afficher
//! les résultats d'une passe d'inspection avec erreurs détaillées.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use batid::Decision;

/// Statut global de la passe d'inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InspectionStatus {
    /// Passe réussie sans erreur
    Success,
    /// Passe réussie avec des erreurs non-fatales
    PartialSuccess,
    /// Passe échouée
    Failed,
}

/// Erreur d'inspection avec contexte
#[derive(Debug, Clone, Serialize)]
pub struct InspectionError {
    /// Source amont du candidat (optionnel)
    pub source: Option<String>,
    /// Identifiant de staging du candidat (optionnel)
    pub candidate_id: Option<i64>,
    /// Message d'erreur
    pub message: String,
}

/// Statistiques par source amont
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceStats {
    /// Créations de bâtiments
    pub creations: usize,
    /// Mises à jour de bâtiments
    pub updates: usize,
    /// Mises à jour sans changement géométrique
    pub unchanged: usize,
    /// Refus (taux de couverture ambigu)
    pub refusals: usize,
    /// Conflits de fusion remontés
    pub merge_conflicts: usize,
    /// Candidats en erreur
    pub errors: usize,
}

impl SourceStats {
    pub fn total(&self) -> usize {
        self.creations + self.updates + self.unchanged + self.refusals + self.merge_conflicts
    }
}

/// Rapport complet d'une passe d'inspection
#[derive(Debug, Clone, Serialize)]
pub struct InspectionReport {
    /// Stamp de claim de la passe
    pub claim_stamp: String,
    /// Durée de la passe
    pub duration_secs: f64,
    /// Statut global
    pub status: InspectionStatus,

    // Compteurs globaux
    /// Candidats réclamés
    pub candidates_claimed: usize,
    /// Candidats décidés
    pub candidates_decided: usize,
    /// Créations de bâtiments
    pub creations: usize,
    /// Mises à jour de bâtiments
    pub updates: usize,
    /// Mises à jour sans changement géométrique
    pub unchanged: usize,
    /// Refus
    pub refusals: usize,
    /// Conflits de fusion
    pub merge_conflicts: usize,
    /// Candidats skippés pour cause d'erreur
    pub candidates_skipped: usize,

    /// Statistiques par source amont
    pub by_source: HashMap<String, SourceStats>,

    /// Liste des erreurs
    pub errors: Vec<InspectionError>,
}

impl Default for InspectionReport {
    fn default() -> Self {
        Self {
            claim_stamp: String::new(),
            duration_secs: 0.0,
            status: InspectionStatus::Success,
            candidates_claimed: 0,
            candidates_decided: 0,
            creations: 0,
            updates: 0,
            unchanged: 0,
            refusals: 0,
            merge_conflicts: 0,
            candidates_skipped: 0,
            by_source: HashMap::new(),
            errors: Vec::new(),
        }
    }
}

impl InspectionReport {
    /// Crée un nouveau rapport pour un claim
    pub fn new(claim_stamp: &str) -> Self {
        Self {
            claim_stamp: claim_stamp.to_string(),
            ..Default::default()
        }
    }

    /// Enregistre une décision prise sur un candidat
    ///
    /// `unchanged` marque une mise à jour dont la géométrie n'a pas bougé
    /// (décision enregistrée, registre non muté).
    pub fn record_decision(&mut self, source: &str, decision: &Decision, unchanged: bool) {
        self.candidates_decided += 1;
        let stats = self.by_source.entry(source.to_string()).or_default();

        match decision {
            Decision::Creation => {
                self.creations += 1;
                stats.creations += 1;
            }
            Decision::Update { .. } if unchanged => {
                self.unchanged += 1;
                stats.unchanged += 1;
            }
            Decision::Update { .. } => {
                self.updates += 1;
                stats.updates += 1;
            }
            Decision::Refusal { .. } => {
                self.refusals += 1;
                stats.refusals += 1;
            }
            Decision::MergeConflict { .. } => {
                self.merge_conflicts += 1;
                stats.merge_conflicts += 1;
            }
        }
    }

    /// Enregistre un candidat en erreur
    pub fn record_error(&mut self, error: InspectionError) {
        self.candidates_skipped += 1;
        if let Some(ref source) = error.source {
            self.by_source.entry(source.clone()).or_default().errors += 1;
        }
        self.errors.push(error);
    }

    /// Définit la durée de la passe
    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    /// Détermine le statut final basé sur les erreurs
    pub fn finalize(&mut self) {
        let has_errors = !self.errors.is_empty();
        let has_success = self.candidates_decided > 0;

        self.status = if has_errors && has_success {
            InspectionStatus::PartialSuccess
        } else if has_errors {
            InspectionStatus::Failed
        } else {
            InspectionStatus::Success
        };
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("INSPECTION REPORT - Claim {}", self.claim_stamp);
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Duration: {:.2}s", self.duration_secs);

        println!("\n--- SUMMARY ---");
        println!(
            "Candidates: {} claimed, {} decided, {} skipped",
            self.candidates_claimed, self.candidates_decided, self.candidates_skipped
        );
        println!(
            "Decisions: {} creations, {} updates, {} unchanged, {} refusals, {} merge conflicts",
            self.creations, self.updates, self.unchanged, self.refusals, self.merge_conflicts
        );

        if !self.by_source.is_empty() {
            println!("\n--- BY SOURCE ---");
            let mut sources: Vec<_> = self.by_source.iter().collect();
            sources.sort_by_key(|(k, _)| k.as_str());
            for (source, stats) in sources {
                println!(
                    "  {}: {} creations, {} updates, {} unchanged, {} refusals, {} conflicts, {} errors",
                    source,
                    stats.creations,
                    stats.updates,
                    stats.unchanged,
                    stats.refusals,
                    stats.merge_conflicts,
                    stats.errors
                );
            }
        }

        if !self.errors.is_empty() {
            println!("\n--- ERRORS ({}) ---", self.errors.len());
            for e in self.errors.iter().take(20) {
                let location = match (&e.source, e.candidate_id) {
                    (Some(s), Some(id)) => format!("[{}:{}]", s, id),
                    (Some(s), None) => format!("[{}]", s),
                    (None, Some(id)) => format!("[{}]", id),
                    _ => String::new(),
                };
                println!("  {} {}", location, e.message);
            }
            if self.errors.len() > 20 {
                println!("  ... and {} more", self.errors.len() - 20);
            }
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        format!(
            "{}: {} creations, {} updates, {} unchanged, {} refusals, {} conflicts, {} errors",
            self.claim_stamp,
            self.creations,
            self.updates,
            self.unchanged,
            self.refusals,
            self.merge_conflicts,
            self.errors.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_inspection_report_default() {
        let report = InspectionReport::default();
        assert_eq!(report.status, InspectionStatus::Success);
        assert_eq!(report.candidates_decided, 0);
    }

    #[test]
    fn test_record_decision() {
        let mut report = InspectionReport::new("run-1");
        report.record_decision("bdtopo", &Decision::Creation, false);
        report.record_decision("bdtopo", &Decision::Creation, false);
        report.record_decision(
            "bdnb",
            &Decision::Update {
                target: Uuid::new_v4(),
            },
            false,
        );

        assert_eq!(report.candidates_decided, 3);
        assert_eq!(report.creations, 2);
        assert_eq!(report.updates, 1);
        assert_eq!(report.by_source.get("bdtopo").unwrap().creations, 2);
        assert_eq!(report.by_source.get("bdnb").unwrap().updates, 1);
    }

    #[test]
    fn test_unchanged_update_counted_apart() {
        let mut report = InspectionReport::new("run-1");
        report.record_decision(
            "bdtopo",
            &Decision::Update {
                target: Uuid::new_v4(),
            },
            true,
        );

        assert_eq!(report.updates, 0);
        assert_eq!(report.unchanged, 1);
    }

    #[test]
    fn test_record_error() {
        let mut report = InspectionReport::new("run-1");
        report.record_error(InspectionError {
            source: Some("bdtopo".to_string()),
            candidate_id: Some(42),
            message: "Invalid geometry".to_string(),
        });

        assert_eq!(report.candidates_skipped, 1);
        assert_eq!(report.by_source.get("bdtopo").unwrap().errors, 1);
    }

    #[test]
    fn test_finalize_partial_success() {
        let mut report = InspectionReport::new("run-1");
        report.record_decision("bdtopo", &Decision::Creation, false);
        report.record_error(InspectionError {
            source: None,
            candidate_id: None,
            message: "Error".to_string(),
        });
        report.finalize();

        assert_eq!(report.status, InspectionStatus::PartialSuccess);
    }

    #[test]
    fn test_finalize_failed() {
        let mut report = InspectionReport::new("run-1");
        report.record_error(InspectionError {
            source: None,
            candidate_id: None,
            message: "Fatal".to_string(),
        });
        report.finalize();

        assert_eq!(report.status, InspectionStatus::Failed);
    }

    #[test]
    fn test_summary() {
        let mut report = InspectionReport::new("run-1");
        report.creations = 100;
        report.updates = 50;

        let summary = report.summary();
        assert!(summary.contains("run-1"));
        assert!(summary.contains("100 creations"));
    }

    #[test]
    fn test_source_stats_total() {
        let stats = SourceStats {
            creations: 10,
            updates: 5,
            unchanged: 3,
            refusals: 2,
            merge_conflicts: 1,
            errors: 4,
        };
        assert_eq!(stats.total(), 21);
    }
}
