//! Vérification des invariants temporels de l'historique
//!
//! Pour chaque bâtiment, les intervalles `[valid_from, valid_to)` de
//! l'historique doivent se suivre sans trou ni chevauchement, et le
//! dernier `valid_to` doit coïncider avec le `valid_from` de la ligne
//! courante.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::SCHEMA;

/// Anomalie détectée sur l'historique d'un bâtiment
#[derive(Debug, Clone, PartialEq)]
pub enum TilingFault {
    /// Deux intervalles consécutifs se chevauchent ou laissent un trou
    Discontinuity {
        prior_valid_to: DateTime<Utc>,
        next_valid_from: DateTime<Utc>,
    },
    /// Un intervalle d'historique est inversé (valid_to < valid_from)
    InvertedInterval { valid_from: DateTime<Utc> },
    /// Le dernier intervalle clos ne rejoint pas la ligne courante
    DetachedCurrent {
        last_valid_to: DateTime<Utc>,
        current_valid_from: DateTime<Utc>,
    },
    /// Historique présent mais aucune ligne courante
    MissingCurrent,
}

/// Bilan d'une passe de vérification
#[derive(Debug, Default)]
pub struct TilingReport {
    /// Bâtiments examinés
    pub checked: u64,
    /// Anomalies par bâtiment
    pub faults: Vec<(Uuid, TilingFault)>,
}

impl TilingReport {
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}

/// Vérifie le pavage temporel de tout l'historique
pub async fn check_history_tiling(pool: &Pool) -> Result<TilingReport> {
    let client = pool.get().await?;

    let sql = format!(
        "SELECT h.rnb_id, \
                array_agg(h.valid_from ORDER BY h.valid_from) AS starts, \
                array_agg(h.valid_to ORDER BY h.valid_from) AS ends, \
                MIN(c.valid_from) AS current_from \
         FROM {schema}.batiments_histo h \
         LEFT JOIN {schema}.batiments c ON c.rnb_id = h.rnb_id \
         GROUP BY h.rnb_id",
        schema = SCHEMA,
    );

    let rows = client
        .query(&sql, &[])
        .await
        .context("Failed to scan history intervals")?;

    let mut report = TilingReport::default();
    for row in &rows {
        let rnb_id: Uuid = row.get("rnb_id");
        let starts: Vec<DateTime<Utc>> = row.get("starts");
        let ends: Vec<DateTime<Utc>> = row.get("ends");
        let current_from: Option<DateTime<Utc>> = row.get("current_from");

        report.checked += 1;
        for fault in verify_intervals(&starts, &ends, current_from) {
            warn!(rnb_id = %rnb_id, fault = ?fault, "History tiling fault");
            report.faults.push((rnb_id, fault));
        }
    }

    info!(
        checked = report.checked,
        faults = report.faults.len(),
        "History tiling check done"
    );
    Ok(report)
}

/// Vérifie une suite d'intervalles déjà triés par `valid_from`
fn verify_intervals(
    starts: &[DateTime<Utc>],
    ends: &[DateTime<Utc>],
    current_from: Option<DateTime<Utc>>,
) -> Vec<TilingFault> {
    let mut faults = Vec::new();

    for (start, end) in starts.iter().zip(ends) {
        if end < start {
            faults.push(TilingFault::InvertedInterval { valid_from: *start });
        }
    }

    for window in 0..starts.len().saturating_sub(1) {
        let prior_end = ends[window];
        let next_start = starts[window + 1];
        if prior_end != next_start {
            faults.push(TilingFault::Discontinuity {
                prior_valid_to: prior_end,
                next_valid_from: next_start,
            });
        }
    }

    match (ends.last(), current_from) {
        (Some(last_end), Some(current_from)) => {
            if *last_end != current_from {
                faults.push(TilingFault::DetachedCurrent {
                    last_valid_to: *last_end,
                    current_valid_from: current_from,
                });
            }
        }
        (Some(_), None) => faults.push(TilingFault::MissingCurrent),
        _ => {}
    }

    faults
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_contiguous_history_is_clean() {
        let starts = [ts(0), ts(10), ts(20)];
        let ends = [ts(10), ts(20), ts(30)];
        let faults = verify_intervals(&starts, &ends, Some(ts(30)));
        assert!(faults.is_empty());
    }

    #[test]
    fn test_gap_between_intervals() {
        let starts = [ts(0), ts(15)];
        let ends = [ts(10), ts(20)];
        let faults = verify_intervals(&starts, &ends, Some(ts(20)));
        assert_eq!(
            faults,
            vec![TilingFault::Discontinuity {
                prior_valid_to: ts(10),
                next_valid_from: ts(15),
            }]
        );
    }

    #[test]
    fn test_overlap_between_intervals() {
        let starts = [ts(0), ts(5)];
        let ends = [ts(10), ts(20)];
        let faults = verify_intervals(&starts, &ends, Some(ts(20)));
        assert!(matches!(faults[0], TilingFault::Discontinuity { .. }));
    }

    #[test]
    fn test_current_must_continue_history() {
        let starts = [ts(0)];
        let ends = [ts(10)];
        let faults = verify_intervals(&starts, &ends, Some(ts(12)));
        assert_eq!(
            faults,
            vec![TilingFault::DetachedCurrent {
                last_valid_to: ts(10),
                current_valid_from: ts(12),
            }]
        );
    }

    #[test]
    fn test_history_without_current_row() {
        let faults = verify_intervals(&[ts(0)], &[ts(10)], None);
        assert_eq!(faults, vec![TilingFault::MissingCurrent]);
    }

    #[test]
    fn test_inverted_interval() {
        let faults = verify_intervals(&[ts(10)], &[ts(5)], Some(ts(5)));
        assert!(faults.contains(&TilingFault::InvertedInterval { valid_from: ts(10) }));
    }
}
