//! Lectures du registre: par identifiant public, par emprise spatiale
//!
//! Les lectures d'appariement se font hors verrou, sur un snapshot
//! cohérent; seul `current_for_update` verrouille, à l'usage exclusif du
//! write-through et du rollback.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use deadpool_postgres::{Pool, Transaction};
use geo::Geometry;
use tokio_postgres::Row;
use uuid::Uuid;

use batid::{Building, BuildingSnapshot, BuildingStatus, EventKind, SourceRef};

use crate::db::{geom, SCHEMA, SRID};

/// Colonnes sélectionnées pour reconstruire un [`Building`]
const SELECT_COLS: &str = "rnb_id, ST_AsBinary(geometry) AS geom_wkb, geometry_hash, \
     statut, actif, event_id, event_kind, event_user, addresses, source_refs, valid_from";

/// Lit la vue courante d'un bâtiment
pub async fn get_current(pool: &Pool, rnb_id: Uuid) -> Result<Option<Building>> {
    let client = pool.get().await?;
    let sql = format!(
        "SELECT {SELECT_COLS} FROM {SCHEMA}.batiments WHERE rnb_id = $1"
    );

    let row = client
        .query_opt(&sql, &[&rnb_id])
        .await
        .context("Failed to read current building")?;

    row.as_ref().map(row_to_building).transpose()
}

/// Lit et verrouille la ligne courante d'un bâtiment (FOR UPDATE)
pub async fn current_for_update(tx: &Transaction<'_>, rnb_id: Uuid) -> Result<Option<Building>> {
    let sql = format!(
        "SELECT {SELECT_COLS} FROM {SCHEMA}.batiments WHERE rnb_id = $1 FOR UPDATE"
    );

    let row = tx
        .query_opt(&sql, &[&rnb_id])
        .await
        .context("Failed to lock current building")?;

    row.as_ref().map(row_to_building).transpose()
}

/// Lit l'historique d'un bâtiment, intervalles ordonnés par début
pub async fn get_history(pool: &Pool, rnb_id: Uuid) -> Result<Vec<BuildingSnapshot>> {
    let client = pool.get().await?;
    let sql = format!(
        "SELECT {SELECT_COLS}, valid_to FROM {SCHEMA}.batiments_histo \
         WHERE rnb_id = $1 ORDER BY valid_from"
    );

    let rows = client
        .query(&sql, &[&rnb_id])
        .await
        .context("Failed to read building history")?;

    rows.iter()
        .map(|row| {
            let building = row_to_building(row)?;
            let valid_to: DateTime<Utc> = row.get("valid_to");
            Ok(BuildingSnapshot { building, valid_to })
        })
        .collect()
}

/// Recherche par boîte englobante (lon/lat min, lon/lat max)
pub async fn find_in_bbox(
    pool: &Pool,
    bbox: [f64; 4],
    only_active: bool,
) -> Result<Vec<Building>> {
    let client = pool.get().await?;
    let active_clause = if only_active { "AND actif" } else { "" };
    let sql = format!(
        "SELECT {SELECT_COLS} FROM {SCHEMA}.batiments \
         WHERE geometry && ST_MakeEnvelope($1, $2, $3, $4, {SRID}) {active_clause}"
    );

    let rows = client
        .query(&sql, &[&bbox[0], &bbox[1], &bbox[2], &bbox[3]])
        .await
        .context("Failed to query buildings by bbox")?;

    rows.iter().map(row_to_building).collect()
}

/// Version d'historique d'un bâtiment fermée exactement à `valid_to`
///
/// C'est l'état que l'événement commençant à cet instant a remplacé;
/// absent pour un événement de création.
pub async fn history_closed_at(
    tx: &Transaction<'_>,
    rnb_id: Uuid,
    valid_to: DateTime<Utc>,
) -> Result<Option<Building>> {
    let sql = format!(
        "SELECT {SELECT_COLS} FROM {SCHEMA}.batiments_histo \
         WHERE rnb_id = $1 AND valid_to = $2"
    );

    let row = tx
        .query_opt(&sql, &[&rnb_id, &valid_to])
        .await
        .context("Failed to read replaced history version")?;

    row.as_ref().map(row_to_building).transpose()
}

/// Bâtiments actifs dont l'emprise intersecte la géométrie donnée
///
/// Utilisé par l'inspecteur: lecture sans verrou sur snapshot cohérent.
pub async fn find_intersecting_active(pool: &Pool, geometry: &Geometry) -> Result<Vec<Building>> {
    let client = pool.get().await?;
    let ewkb = geom::to_ewkb(geometry, SRID)?;
    let sql = format!(
        "SELECT {SELECT_COLS} FROM {SCHEMA}.batiments \
         WHERE actif \
           AND geometry && ST_GeomFromEWKB($1) \
           AND ST_Intersects(geometry, ST_GeomFromEWKB($1))"
    );

    let rows = client
        .query(&sql, &[&ewkb])
        .await
        .context("Failed to query intersecting buildings")?;

    rows.iter().map(row_to_building).collect()
}

/// Représentation GeoJSON d'un bâtiment pour les lectures exposées
pub fn building_to_feature(building: &Building) -> geojson::Feature {
    let mut properties = geojson::JsonObject::new();
    properties.insert("rnb_id".into(), building.rnb_id.to_string().into());
    properties.insert(
        "statut".into(),
        building
            .status
            .map(|s| s.as_str().into())
            .unwrap_or(serde_json::Value::Null),
    );
    properties.insert("actif".into(), building.active.into());
    properties.insert(
        "addresses".into(),
        serde_json::to_value(&building.addresses).unwrap_or_default(),
    );

    geojson::Feature {
        bbox: None,
        geometry: Some(geom::to_geojson(&building.geometry)),
        id: Some(geojson::feature::Id::String(building.rnb_id.to_string())),
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Reconstruit un [`Building`] depuis une ligne SQL
pub(crate) fn row_to_building(row: &Row) -> Result<Building> {
    let rnb_id: Uuid = row.get("rnb_id");
    let wkb: Vec<u8> = row.get("geom_wkb");
    let geometry = geom::from_wkb(&wkb)
        .with_context(|| format!("Invalid stored geometry for {rnb_id}"))?;

    let geometry_hash: Option<Vec<u8>> = row.get("geometry_hash");
    let geometry_hash = geometry_hash.and_then(|bytes| <[u8; 32]>::try_from(bytes).ok());

    let status: Option<String> = row.get("statut");
    let status = status
        .map(|s| BuildingStatus::parse(&s))
        .transpose()
        .with_context(|| format!("Invalid stored status for {rnb_id}"))?;

    let event_kind: Option<String> = row.get("event_kind");
    let event_kind = event_kind
        .map(|k| EventKind::parse(&k))
        .transpose()
        .with_context(|| format!("Invalid stored event kind for {rnb_id}"))?;

    let source_refs: Option<serde_json::Value> = row.get("source_refs");
    let source_refs: Vec<SourceRef> = match source_refs {
        Some(value) if !value.is_null() => serde_json::from_value(value)
            .with_context(|| format!("Invalid stored source refs for {rnb_id}"))?,
        _ => Vec::new(),
    };

    Ok(Building {
        rnb_id,
        geometry,
        geometry_hash,
        status,
        active: row.get("actif"),
        event_id: row.get("event_id"),
        event_kind,
        event_user: row.get("event_user"),
        addresses: row.get("addresses"),
        source_refs,
        valid_from: row.get("valid_from"),
    })
}
