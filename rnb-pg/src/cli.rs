//! Définition et implémentation des commandes CLI
//!
//! - `init`: création du schéma et des tables
//! - `inspect`: claim + réconciliation d'un lot de candidats
//! - `sweep`: remise dans le flux des claims périmés
//! - `rollback`: annulation des mutations d'un utilisateur sur une fenêtre
//! - `pipeline`: chaîne complète balayage → inspection → statuts
//! - `backfill-events` / `backfill-deactivations`: réparation du registre
//! - `assign-status` / `set-status`: statuts de cycle de vie
//! - `show`: lecture d'un bâtiment (GeoJSON) et de son historique
//! - `check-history`: vérification du pavage temporel

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Args, Subcommand};
use tracing::info;
use uuid::Uuid;

use batid::BuildingStatus;

use crate::candidates;
use crate::chain::{ImportChain, LogDispatcher, LogNotifier, TaskDispatcher};
use crate::config::Config;
use crate::db::pool::{create_pool, test_connection, DatabaseConfig};
use crate::db::schema;
use crate::inspect::Inspector;
use crate::ledger::{backfill, invariant, read};
use crate::rollback;
use crate::status;

/// Options de connexion PostgreSQL communes à toutes les commandes
#[derive(Args, Debug)]
pub struct DatabaseArgs {
    /// PostgreSQL host (défaut : env PGHOST / localhost)
    #[arg(long)]
    host: Option<String>,

    /// PostgreSQL port (défaut : env PGPORT / 5432)
    #[arg(long)]
    port: Option<u16>,

    /// PostgreSQL database name (défaut : env PGDATABASE / rnb)
    #[arg(long)]
    database: Option<String>,

    /// PostgreSQL user (défaut : env PGUSER / postgres)
    #[arg(long)]
    user: Option<String>,

    /// PostgreSQL password (défaut : env PGPASSWORD)
    #[arg(long)]
    password: Option<String>,

    /// SSL mode: disable, prefer, require (défaut : env PGSSLMODE / disable)
    #[arg(long)]
    ssl: Option<String>,
}

impl DatabaseArgs {
    /// Configuration finale: environnement puis surcharges CLI
    fn resolve(&self) -> DatabaseConfig {
        let mut config = DatabaseConfig::from_env();
        if let Some(ref host) = self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(ref database) = self.database {
            config.dbname = database.clone();
        }
        if let Some(ref user) = self.user {
            config.user = user.clone();
        }
        if let Some(ref password) = self.password {
            config.password = Some(password.clone());
        }
        if let Some(ref ssl) = self.ssl {
            if let Ok(mode) = ssl.parse() {
                config.ssl_mode = mode;
            }
        }
        config
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the registry schema and tables
    Init {
        /// Drop schema before creating it
        #[arg(long)]
        drop_schema: bool,

        #[command(flatten)]
        db: DatabaseArgs,
    },

    /// Claim and reconcile a batch of candidates
    Inspect {
        /// Path to a JSON config (thresholds, batch size)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Batch size override
        #[arg(long)]
        batch: Option<i64>,

        /// User the inspector mutations are attributed to
        #[arg(long)]
        user: Option<String>,

        /// Claim stamp (défaut : identifiant frais)
        #[arg(long)]
        claim_stamp: Option<String>,

        /// Write the inspection report to a JSON file
        #[arg(long)]
        report: Option<PathBuf>,

        #[command(flatten)]
        db: DatabaseArgs,
    },

    /// Run the full import chain: sweep, inspect, assign default statuses
    Pipeline {
        /// Path to a JSON config (thresholds, batch size)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Batch size override
        #[arg(long)]
        batch: Option<i64>,

        /// User the inspector mutations are attributed to
        #[arg(long)]
        user: Option<String>,

        #[command(flatten)]
        db: DatabaseArgs,
    },

    /// Requeue stale claims that never reached a decision
    Sweep {
        /// Claim age in minutes beyond which it is considered stale
        #[arg(long)]
        max_age_minutes: Option<i64>,

        /// Path to a JSON config
        #[arg(long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        db: DatabaseArgs,
    },

    /// Undo a user's mutations over a time window
    Rollback {
        /// User whose mutations are undone
        #[arg(long)]
        user: String,

        /// Window start (RFC 3339, inclusive)
        #[arg(long)]
        from: String,

        /// Window end (RFC 3339, exclusive)
        #[arg(long)]
        to: String,

        #[command(flatten)]
        db: DatabaseArgs,
    },

    /// Stamp legacy rows missing event metadata
    BackfillEvents {
        /// Batch size
        #[arg(long, default_value_t = backfill::DEFAULT_BATCH_SIZE)]
        batch: i64,

        #[command(flatten)]
        db: DatabaseArgs,
    },

    /// Convert past hard deletes into deactivation rows
    BackfillDeactivations {
        /// Batch size
        #[arg(long, default_value_t = backfill::DEFAULT_BATCH_SIZE)]
        batch: i64,

        #[command(flatten)]
        db: DatabaseArgs,
    },

    /// Assign the default status to active buildings without one
    AssignStatus {
        /// Batch size
        #[arg(long, default_value_t = backfill::DEFAULT_BATCH_SIZE)]
        batch: i64,

        #[command(flatten)]
        db: DatabaseArgs,
    },

    /// Transition one building to a target status
    SetStatus {
        /// Public building identifier
        #[arg(long)]
        rnb_id: Uuid,

        /// Target status (construction_project, ongoing_construction,
        /// constructed, ongoing_change, not_usable, demolished)
        #[arg(long)]
        status: BuildingStatus,

        /// User the mutation is attributed to
        #[arg(long)]
        user: String,

        #[command(flatten)]
        db: DatabaseArgs,
    },

    /// Print one building as GeoJSON with its version count
    Show {
        /// Public building identifier
        #[arg(long)]
        rnb_id: Uuid,

        #[command(flatten)]
        db: DatabaseArgs,
    },

    /// Verify that history intervals tile without gap or overlap
    CheckHistory {
        #[command(flatten)]
        db: DatabaseArgs,
    },
}

/// Exécute une commande
pub async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Init { drop_schema, db } => {
            let pool = connect(&db).await?;
            schema::create_schema(&pool, drop_schema).await?;
            println!("Registry schema ready");
            Ok(())
        }

        Commands::Inspect {
            config,
            batch,
            user,
            claim_stamp,
            report,
            db,
        } => {
            let config = load_config(config.as_deref())?;
            let batch_size = batch.unwrap_or(config.batch_size);
            let user = user.unwrap_or(config.inspector_user);
            let claim_stamp =
                claim_stamp.unwrap_or_else(|| format!("inspect-{}", Uuid::new_v4()));

            let pool = connect(&db).await?;
            let inspector = Inspector::new(pool, config.thresholds, &user);
            let inspection = inspector.run_batch(&claim_stamp, batch_size).await?;

            inspection.display();
            if let Some(path) = report {
                inspection.save_to_file(&path)?;
                println!("Report saved to {}", path.display());
            }
            Ok(())
        }

        Commands::Pipeline {
            config,
            batch,
            user,
            db,
        } => {
            let config = load_config(config.as_deref())?;
            let batch_size = batch.unwrap_or(config.batch_size);
            let user = user.unwrap_or(config.inspector_user);
            let cutoff = Utc::now() - Duration::minutes(config.stale_claim_minutes);
            let claim_stamp = format!("pipeline-{}", Uuid::new_v4());

            let pool = connect(&db).await?;
            let sweep_pool = pool.clone();
            let inspect_pool = pool.clone();
            let status_pool = pool.clone();
            let thresholds = config.thresholds;

            ImportChain::new(Box::new(LogNotifier))
                .stage(
                    "sweep",
                    Box::pin(async move {
                        candidates::sweep_stale_claims(&sweep_pool, cutoff).await?;
                        Ok(())
                    }),
                )
                .stage(
                    "inspect",
                    Box::pin(async move {
                        let inspector = Inspector::new(inspect_pool, thresholds, &user);
                        let inspection = inspector.run_batch(&claim_stamp, batch_size).await?;
                        inspection.display();
                        Ok(())
                    }),
                )
                .stage(
                    "assign-status",
                    Box::pin(async move {
                        status::assign_default_status(&status_pool, batch_size).await?;
                        Ok(())
                    }),
                )
                .run()
                .await?;

            LogDispatcher.dispatch("refresh-public-views");
            Ok(())
        }

        Commands::Sweep {
            max_age_minutes,
            config,
            db,
        } => {
            let config = load_config(config.as_deref())?;
            let max_age = max_age_minutes.unwrap_or(config.stale_claim_minutes);
            let cutoff = Utc::now() - Duration::minutes(max_age);

            let pool = connect(&db).await?;
            let swept = candidates::sweep_stale_claims(&pool, cutoff).await?;
            println!("Requeued {swept} stale claims (older than {max_age} min)");
            Ok(())
        }

        Commands::Rollback { user, from, to, db } => {
            let from = parse_rfc3339(&from)?;
            let to = parse_rfc3339(&to)?;

            let pool = connect(&db).await?;
            let result = rollback::rollback_window(&pool, &user, from, to).await?;
            println!(
                "Rolled back {} versions on {} buildings ({} creations undone by deactivation)",
                result.versions_undone, result.buildings_touched, result.deactivations
            );
            Ok(())
        }

        Commands::BackfillEvents { batch, db } => {
            let pool = connect(&db).await?;
            let touched = backfill::backfill_event_metadata(&pool, batch).await?;
            println!("Stamped {touched} rows with event metadata");
            Ok(())
        }

        Commands::BackfillDeactivations { batch, db } => {
            let pool = connect(&db).await?;
            let touched = backfill::backfill_hard_deletes(&pool, batch).await?;
            println!("Converted {touched} hard deletes into deactivations");
            Ok(())
        }

        Commands::AssignStatus { batch, db } => {
            let pool = connect(&db).await?;
            let assigned = status::assign_default_status(&pool, batch).await?;
            println!(
                "Assigned default status '{}' to {assigned} buildings",
                status::DEFAULT_STATUS
            );
            Ok(())
        }

        Commands::SetStatus {
            rnb_id,
            status: target,
            user,
            db,
        } => {
            let pool = connect(&db).await?;
            let steps = status::transition_status(&pool, rnb_id, target, &user).await?;
            if steps == 0 {
                println!("Building {rnb_id} already has status '{target}'");
            } else {
                println!("Building {rnb_id} transitioned to '{target}' ({steps} versions)");
            }
            Ok(())
        }

        Commands::Show { rnb_id, db } => {
            let pool = connect(&db).await?;
            let building = read::get_current(&pool, rnb_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Unknown building {rnb_id}"))?;

            let feature = read::building_to_feature(&building);
            println!("{}", serde_json::to_string_pretty(&feature)?);

            let history = read::get_history(&pool, rnb_id).await?;
            println!("{} prior versions", history.len());
            Ok(())
        }

        Commands::CheckHistory { db } => {
            let pool = connect(&db).await?;
            let report = invariant::check_history_tiling(&pool).await?;
            if report.is_clean() {
                println!("History tiling OK ({} buildings checked)", report.checked);
                Ok(())
            } else {
                for (rnb_id, fault) in &report.faults {
                    println!("FAULT {rnb_id}: {fault:?}");
                }
                anyhow::bail!(
                    "{} tiling faults on {} buildings",
                    report.faults.len(),
                    report.checked
                );
            }
        }
    }
}

/// Connecte à PostgreSQL et vérifie la connexion
async fn connect(args: &DatabaseArgs) -> Result<deadpool_postgres::Pool> {
    let config = args.resolve();
    info!(
        host = %config.host,
        port = config.port,
        database = %config.dbname,
        user = %config.user,
        ssl = ?config.ssl_mode,
        "Connecting to PostgreSQL"
    );

    let pool = create_pool(&config).await?;
    test_connection(&pool).await?;
    Ok(pool)
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Ok(Config::default()),
    }
}

fn parse_rfc3339(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid RFC 3339 timestamp: '{value}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rfc3339_valid() {
        assert!(parse_rfc3339("2026-08-30T12:00:00Z").is_ok());
        assert!(parse_rfc3339("2026-08-30T12:00:00+02:00").is_ok());
    }

    #[test]
    fn test_parse_rfc3339_invalid() {
        assert!(parse_rfc3339("2026-08-30").is_err());
        assert!(parse_rfc3339("yesterday").is_err());
        assert!(parse_rfc3339("").is_err());
    }

    #[test]
    fn test_parse_rfc3339_normalizes_to_utc() {
        let dt = parse_rfc3339("2026-08-30T12:00:00+02:00").unwrap();
        assert_eq!(dt, parse_rfc3339("2026-08-30T10:00:00Z").unwrap());
    }
}
