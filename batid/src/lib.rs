//! # batid
//!
//! Modèle de domaine du registre national des bâtiments.
//!
//! ## Features
//!
//! - Cycle de vie des statuts de bâtiment et politique de transition
//! - Décisions d'inspection typées (création, mise à jour, refus, conflit de fusion)
//! - Appariement géométrique par taux de couverture (`geo`)
//! - Hash de géométrie normalisé pour la détection de changement
//!
//! Ce crate est volontairement sans dépendance base de données: les types
//! définis ici circulent entre les importateurs, l'inspecteur et le registre
//! PostGIS (`rnb-pg`).

pub mod decision;
pub mod error;
pub mod geometry;
pub mod matching;
pub mod status;
pub mod types;

pub use decision::Decision;
pub use error::BatidError;
pub use geometry::{footprint, geometry_hash};
pub use matching::{classify, cover_ratio, MatchScore, MatchThresholds};
pub use status::{transition_plan, BuildingStatus};
pub use types::{Building, BuildingSnapshot, Candidate, EventKind, SourceRef};
