//! # rnb-pg
//!
//! Registre national des bâtiments sur PostGIS: staging des candidats,
//! inspection géométrique, registre bitemporel et rollback.
//!
//! ## Features
//!
//! - Registre courant + historique append-only (valid_from/valid_to)
//! - Claim de candidats par lot sans contention (SKIP LOCKED)
//! - Appariement par taux de couverture et politique de décision fermée
//! - Rollback par utilisateur et fenêtre temporelle, avec détection de conflit
//! - Backfills de réparation idempotents
//!
//! ## Usage CLI
//!
//! ```bash
//! # Créer le schéma
//! rnb-pg init
//!
//! # Inspecter un lot de candidats
//! rnb-pg inspect --batch 500 --user inspector
//!
//! # Annuler les mutations d'un utilisateur
//! rnb-pg rollback --user import-bot --from 2026-08-01T00:00:00Z --to 2026-08-02T00:00:00Z
//! ```

pub mod candidates;
pub mod chain;
pub mod cli;
pub mod config;
pub mod db;
pub mod inspect;
pub mod ledger;
pub mod report;
pub mod rollback;
pub mod status;

pub use config::Config;
pub use db::pool::{create_pool, DatabaseConfig};
pub use inspect::Inspector;
pub use report::{InspectionReport, InspectionStatus};
