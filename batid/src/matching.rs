//! Appariement géométrique des candidats contre le registre
//!
//! Le score d'un couple (candidat, bâtiment) est le taux de couverture:
//! aire de l'intersection divisée par l'aire du candidat. La classification
//! applique la politique de décision dans l'ordre, sans jamais arrondir un
//! taux ambigu vers une création ou une mise à jour.

use geo::{Area, BooleanOps, Geometry, Intersects};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::footprint;
use crate::{BatidError, Decision};

/// Seuils de la politique de décision
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MatchThresholds {
    /// Taux minimal pour une mise à jour (et pour un conflit de fusion)
    pub update: f64,
    /// Taux maximal pour considérer un recouvrement comme négligeable
    pub creation: f64,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            update: 0.85,
            creation: 0.10,
        }
    }
}

/// Score d'appariement d'un candidat contre un bâtiment actif
#[derive(Debug, Clone, PartialEq)]
pub struct MatchScore {
    /// Identifiant public du bâtiment
    pub rnb_id: Uuid,
    /// Taux de couverture dans [0, 1]
    pub ratio: f64,
}

/// Calcule le taux de couverture d'un candidat sur un bâtiment
///
/// `ratio = area(intersection) / area(candidate)`.
///
/// Cas limite défini explicitement: un candidat d'aire nulle (géométrie
/// dégénérée) obtient un taux de 1.0 contre tout bâtiment qu'il touche,
/// et 0.0 sinon. Jamais de division par zéro.
pub fn cover_ratio(
    candidate_id: &str,
    candidate: &Geometry,
    building: &Geometry,
) -> Result<f64, BatidError> {
    let cand = footprint(candidate_id, candidate)?;
    let bldg = footprint("building", building)?;

    let cand_area = cand.unsigned_area();
    if cand_area == 0.0 {
        return Ok(if cand.intersects(&bldg) { 1.0 } else { 0.0 });
    }

    let intersection = cand.intersection(&bldg);
    Ok((intersection.unsigned_area() / cand_area).clamp(0.0, 1.0))
}

/// Classifie un candidat d'après ses scores contre les bâtiments actifs
/// dont l'emprise intersecte la sienne
///
/// Politique, appliquée dans l'ordre:
/// 1. taux ≥ seuil update contre exactement un bâtiment ⇒ mise à jour;
/// 2. taux ≥ seuil update contre deux bâtiments ou plus ⇒ conflit de
///    fusion (la fusion automatique n'est pas supportée);
/// 3. tous les taux ≤ seuil création, ou aucun recouvrement ⇒ création;
/// 4. sinon (taux intermédiaire) ⇒ refus, en attente de revue.
pub fn classify(scores: &[MatchScore], thresholds: &MatchThresholds) -> Decision {
    let mut strong: Vec<&MatchScore> = scores
        .iter()
        .filter(|s| s.ratio >= thresholds.update)
        .collect();
    // Ordre déterministe pour l'audit du conflit
    strong.sort_by(|a, b| {
        b.ratio
            .partial_cmp(&a.ratio)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.rnb_id.cmp(&b.rnb_id))
    });

    match strong.len() {
        1 => Decision::Update {
            target: strong[0].rnb_id,
        },
        n if n >= 2 => Decision::MergeConflict {
            targets: strong.iter().map(|s| s.rnb_id).collect(),
        },
        _ => {
            let best = scores
                .iter()
                .map(|s| s.ratio)
                .fold(0.0_f64, |acc, r| acc.max(r));

            if best <= thresholds.creation {
                Decision::Creation
            } else {
                Decision::Refusal {
                    reason: format!(
                        "ambiguous cover ratio {best:.3} (between {} and {})",
                        thresholds.creation, thresholds.update
                    ),
                }
            }
        }
    }
}
