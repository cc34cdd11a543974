//! Cycle de vie des statuts de bâtiment
//!
//! Les statuts forment une énumération fermée, partitionnée en familles de
//! capacités (avant construction, construit, en évolution, inutilisable,
//! démoli). La politique de transition impose qu'un passage vers un statut
//! post-construction sur un bâtiment sans statut "constructed" antérieur
//! insère d'abord un statut "constructed" synthétique.

use serde::{Deserialize, Serialize};

use crate::BatidError;

/// Statut de cycle de vie d'un bâtiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildingStatus {
    /// Projet de construction (non visible publiquement)
    ConstructionProject,
    /// Chantier en cours
    OngoingConstruction,
    /// Bâtiment construit
    Constructed,
    /// Modification en cours (rénovation lourde, surélévation, etc.)
    OngoingChange,
    /// Bâtiment inutilisable (ruine, sinistre)
    NotUsable,
    /// Bâtiment démoli
    Demolished,
}

impl BuildingStatus {
    /// Toutes les valeurs de l'énumération, dans l'ordre du cycle de vie
    pub const ALL: &'static [BuildingStatus] = &[
        BuildingStatus::ConstructionProject,
        BuildingStatus::OngoingConstruction,
        BuildingStatus::Constructed,
        BuildingStatus::OngoingChange,
        BuildingStatus::NotUsable,
        BuildingStatus::Demolished,
    ];

    /// Représentation persistée (colonne `statut`)
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildingStatus::ConstructionProject => "construction_project",
            BuildingStatus::OngoingConstruction => "ongoing_construction",
            BuildingStatus::Constructed => "constructed",
            BuildingStatus::OngoingChange => "ongoing_change",
            BuildingStatus::NotUsable => "not_usable",
            BuildingStatus::Demolished => "demolished",
        }
    }

    /// Parse une valeur persistée
    pub fn parse(value: &str) -> Result<Self, BatidError> {
        match value {
            "construction_project" => Ok(BuildingStatus::ConstructionProject),
            "ongoing_construction" => Ok(BuildingStatus::OngoingConstruction),
            "constructed" => Ok(BuildingStatus::Constructed),
            "ongoing_change" => Ok(BuildingStatus::OngoingChange),
            "not_usable" => Ok(BuildingStatus::NotUsable),
            "demolished" => Ok(BuildingStatus::Demolished),
            other => Err(BatidError::InvalidTransition {
                from: None,
                to: other.to_string(),
            }),
        }
    }

    /// Famille avant-construction (projet, chantier)
    pub fn is_pre_construction(&self) -> bool {
        matches!(
            self,
            BuildingStatus::ConstructionProject | BuildingStatus::OngoingConstruction
        )
    }

    /// Famille post-construction: suppose l'existence préalable du bâtiment
    pub fn is_post_construction(&self) -> bool {
        matches!(
            self,
            BuildingStatus::OngoingChange | BuildingStatus::NotUsable | BuildingStatus::Demolished
        )
    }

    /// Visible dans les vues publiques du registre
    pub fn is_public(&self) -> bool {
        !matches!(self, BuildingStatus::ConstructionProject)
    }
}

impl std::str::FromStr for BuildingStatus {
    type Err = BatidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BuildingStatus::parse(s)
    }
}

impl std::fmt::Display for BuildingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calcule la séquence de statuts à appliquer pour atteindre `target`
///
/// Déterministe et idempotent:
/// - si le statut courant est déjà `target`, ne rien faire;
/// - si `target` est post-construction et qu'aucun statut "constructed"
///   n'apparaît dans l'historique, insérer un "constructed" synthétique
///   avant `target`;
/// - sinon appliquer `target` directement.
pub fn transition_plan(
    current: Option<BuildingStatus>,
    history: &[BuildingStatus],
    target: BuildingStatus,
) -> Vec<BuildingStatus> {
    if current == Some(target) {
        return Vec::new();
    }

    let has_constructed = current == Some(BuildingStatus::Constructed)
        || history.contains(&BuildingStatus::Constructed);

    if target.is_post_construction() && !has_constructed {
        vec![BuildingStatus::Constructed, target]
    } else {
        vec![target]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        for status in BuildingStatus::ALL {
            assert_eq!(BuildingStatus::parse(status.as_str()).unwrap(), *status);
        }
    }

    #[test]
    fn test_parse_unknown_rejected() {
        assert!(BuildingStatus::parse("under_water").is_err());
        assert!(BuildingStatus::parse("").is_err());
    }

    #[test]
    fn test_capability_families() {
        assert!(BuildingStatus::ConstructionProject.is_pre_construction());
        assert!(BuildingStatus::OngoingConstruction.is_pre_construction());
        assert!(!BuildingStatus::Constructed.is_pre_construction());

        assert!(BuildingStatus::OngoingChange.is_post_construction());
        assert!(BuildingStatus::NotUsable.is_post_construction());
        assert!(BuildingStatus::Demolished.is_post_construction());
        assert!(!BuildingStatus::Constructed.is_post_construction());
    }

    #[test]
    fn test_public_visibility() {
        assert!(!BuildingStatus::ConstructionProject.is_public());
        assert!(BuildingStatus::Constructed.is_public());
        assert!(BuildingStatus::Demolished.is_public());
    }

    #[test]
    fn test_transition_plan_direct() {
        let plan = transition_plan(
            Some(BuildingStatus::Constructed),
            &[BuildingStatus::Constructed],
            BuildingStatus::Demolished,
        );
        assert_eq!(plan, vec![BuildingStatus::Demolished]);
    }

    #[test]
    fn test_transition_plan_synthetic_constructed() {
        // Démolition d'un bâtiment jamais marqué construit:
        // un "constructed" synthétique est inséré d'abord
        let plan = transition_plan(None, &[], BuildingStatus::Demolished);
        assert_eq!(
            plan,
            vec![BuildingStatus::Constructed, BuildingStatus::Demolished]
        );
    }

    #[test]
    fn test_transition_plan_idempotent() {
        let plan = transition_plan(
            Some(BuildingStatus::Demolished),
            &[BuildingStatus::Constructed, BuildingStatus::Demolished],
            BuildingStatus::Demolished,
        );
        assert!(plan.is_empty(), "re-running a transition must be a no-op");
    }

    #[test]
    fn test_transition_plan_constructed_in_history_only() {
        // Le bâtiment est passé par "constructed" dans le passé:
        // pas de statut synthétique
        let plan = transition_plan(
            Some(BuildingStatus::NotUsable),
            &[BuildingStatus::Constructed, BuildingStatus::NotUsable],
            BuildingStatus::Demolished,
        );
        assert_eq!(plan, vec![BuildingStatus::Demolished]);
    }
}
