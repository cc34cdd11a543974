//! Création du schéma du registre
//!
//! Trois tables: le registre courant (`batiments`), l'historique append-only
//! (`batiments_histo`) et le staging des candidats (`candidats`). Les
//! énumérations fermées (statut, nature d'événement, décision) sont aussi
//! garanties par contraintes CHECK côté base.

use anyhow::{Context, Result};
use deadpool_postgres::Pool;
use tracing::{info, warn};

use super::{SCHEMA, SRID};

/// Colonnes communes aux tables courante et historique, dans l'ordre
/// utilisé par le write-through du ledger
pub const LEDGER_COLUMNS: &str = "rnb_id, geometry, geometry_hash, statut, actif, \
     event_id, event_kind, event_user, addresses, source_refs, valid_from";

/// Crée le schéma, les tables et les index
pub async fn create_schema(pool: &Pool, drop_existing: bool) -> Result<()> {
    let client = pool.get().await?;

    if drop_existing {
        client
            .execute(&format!("DROP SCHEMA IF EXISTS {} CASCADE", SCHEMA), &[])
            .await
            .context("Failed to drop schema")?;
    }

    client
        .execute(&format!("CREATE SCHEMA IF NOT EXISTS {}", SCHEMA), &[])
        .await
        .context("Failed to create schema")?;

    // Activer PostGIS si nécessaire (peut nécessiter des droits superuser).
    // Si l'extension existe déjà mais que l'utilisateur ne peut pas la
    // (re)créer, on dégrade gracieusement.
    match client
        .execute("CREATE EXTENSION IF NOT EXISTS postgis", &[])
        .await
    {
        Ok(_) => {}
        Err(e) => {
            warn!("CREATE EXTENSION postgis failed (will check if already installed): {e}");
            let exists = client
                .query_opt("SELECT 1 FROM pg_extension WHERE extname = 'postgis'", &[])
                .await
                .context("Failed to check pg_extension")?
                .is_some();
            if !exists {
                return Err(anyhow::anyhow!(
                    "PostGIS extension is not installed and could not be created: {e}"
                ));
            }
        }
    }

    create_ledger_tables(&client).await?;
    create_candidates_table(&client).await?;
    create_indexes(&client).await?;

    info!(schema = SCHEMA, "Registry schema ready");
    Ok(())
}

async fn create_ledger_tables(client: &deadpool_postgres::Object) -> Result<()> {
    let statut_check = "statut IS NULL OR statut IN ('construction_project', \
         'ongoing_construction', 'constructed', 'ongoing_change', 'not_usable', 'demolished')";
    let event_kind_check =
        "event_kind IS NULL OR event_kind IN ('creation', 'update', 'deactivation')";

    // Vue courante: exactement une ligne (intervalle ouvert) par rnb_id
    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {schema}.batiments (
            row_id BIGSERIAL PRIMARY KEY,
            rnb_id UUID NOT NULL,
            geometry geometry(Geometry, {srid}),
            geometry_hash BYTEA,
            statut TEXT,
            actif BOOLEAN NOT NULL DEFAULT TRUE,
            event_id UUID,
            event_kind TEXT,
            event_user TEXT,
            addresses TEXT[] NOT NULL DEFAULT '{{}}',
            source_refs JSONB NOT NULL DEFAULT '[]',
            valid_from TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            created_at TIMESTAMPTZ DEFAULT NOW(),
            updated_at TIMESTAMPTZ DEFAULT NOW(),
            CONSTRAINT batiments_rnb_id_unique UNIQUE (rnb_id),
            CONSTRAINT batiments_statut CHECK ({statut_check}),
            CONSTRAINT batiments_event_kind CHECK ({event_kind_check})
        )
        "#,
        schema = SCHEMA,
        srid = SRID,
        statut_check = statut_check,
        event_kind_check = event_kind_check,
    );
    client
        .execute(&sql, &[])
        .await
        .context("Failed to create batiments table")?;

    // Historique append-only: jamais d'UPDATE ni de DELETE après insertion
    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {schema}.batiments_histo (
            row_id BIGSERIAL PRIMARY KEY,
            rnb_id UUID NOT NULL,
            geometry geometry(Geometry, {srid}),
            geometry_hash BYTEA,
            statut TEXT,
            actif BOOLEAN NOT NULL DEFAULT TRUE,
            event_id UUID,
            event_kind TEXT,
            event_user TEXT,
            addresses TEXT[] NOT NULL DEFAULT '{{}}',
            source_refs JSONB NOT NULL DEFAULT '[]',
            valid_from TIMESTAMPTZ NOT NULL,
            valid_to TIMESTAMPTZ NOT NULL,
            created_at TIMESTAMPTZ DEFAULT NOW(),
            CONSTRAINT batiments_histo_interval CHECK (valid_to >= valid_from),
            CONSTRAINT batiments_histo_statut CHECK ({statut_check}),
            CONSTRAINT batiments_histo_event_kind CHECK ({event_kind_check})
        )
        "#,
        schema = SCHEMA,
        srid = SRID,
        statut_check = statut_check,
        event_kind_check = event_kind_check,
    );
    client
        .execute(&sql, &[])
        .await
        .context("Failed to create batiments_histo table")?;

    Ok(())
}

async fn create_candidates_table(client: &deadpool_postgres::Object) -> Result<()> {
    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {schema}.candidats (
            id BIGSERIAL PRIMARY KEY,
            geometry geometry(Geometry, {srid}),
            source TEXT NOT NULL,
            source_id TEXT NOT NULL,
            address_keys TEXT[] NOT NULL DEFAULT '{{}}',
            claim_stamp TEXT,
            claimed_at TIMESTAMPTZ,
            decision TEXT,
            decision_detail JSONB,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CONSTRAINT candidats_decision CHECK (
                decision IS NULL OR decision IN
                ('creation', 'update', 'refusal', 'merge_conflict')
            )
        )
        "#,
        schema = SCHEMA,
        srid = SRID,
    );
    client
        .execute(&sql, &[])
        .await
        .context("Failed to create candidats table")?;

    Ok(())
}

async fn create_indexes(client: &deadpool_postgres::Object) -> Result<()> {
    let indexes = [
        // Index spatiaux
        format!(
            "CREATE INDEX IF NOT EXISTS idx_batiments_geom ON {}.batiments USING GIST (geometry)",
            SCHEMA
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_candidats_geom ON {}.candidats USING GIST (geometry)",
            SCHEMA
        ),
        // Lookup des versions d'un bâtiment
        format!(
            "CREATE INDEX IF NOT EXISTS idx_histo_rnb_id ON {}.batiments_histo (rnb_id, valid_from)",
            SCHEMA
        ),
        // Rollback: recherche par (utilisateur, fenêtre temporelle)
        format!(
            "CREATE INDEX IF NOT EXISTS idx_histo_user_from ON {}.batiments_histo (event_user, valid_from)",
            SCHEMA
        ),
        // Claim: seuls les candidats non réclamés non décidés sont visés
        format!(
            "CREATE INDEX IF NOT EXISTS idx_candidats_unclaimed ON {}.candidats (id) \
             WHERE claim_stamp IS NULL AND decision IS NULL",
            SCHEMA
        ),
        // Backfill des métadonnées d'événement manquantes
        format!(
            "CREATE INDEX IF NOT EXISTS idx_batiments_no_event ON {}.batiments (row_id) \
             WHERE event_id IS NULL",
            SCHEMA
        ),
    ];

    for sql in &indexes {
        client
            .execute(sql.as_str(), &[])
            .await
            .with_context(|| format!("Failed to create index: {sql}"))?;
    }

    Ok(())
}
