//! Tests d'intégration PostgreSQL
//!
//! Ces tests nécessitent une base PostgreSQL/PostGIS disponible.
//! Configuration via variables d'environnement:
//! - PGHOST, PGPORT, PGUSER, PGPASSWORD, PGDATABASE
//!
//! Exécution:
//! ```bash
//! # Avec PostgreSQL local
//! cargo test --test postgres_integration -- --ignored --test-threads=1
//!
//! # Avec Docker
//! docker run -d --name postgres-test -e POSTGRES_PASSWORD=test -p 5432:5432 postgis/postgis
//! PGPASSWORD=test cargo test --test postgres_integration -- --ignored --test-threads=1
//! ```

use anyhow::Result;
use chrono::{Duration, Utc};
use deadpool_postgres::Pool;
use geo::{Geometry, LineString, Polygon};
use uuid::Uuid;

use batid::{BuildingStatus, EventKind, MatchThresholds};
use rnb_pg::candidates::{self, NewCandidate};
use rnb_pg::db::{pool, schema};
use rnb_pg::inspect::Inspector;
use rnb_pg::ledger::{self, backfill, invariant, read, write, NewVersion, WriteGrant};
use rnb_pg::{rollback, status};

/// Crée un pool de connexions de test
async fn create_test_pool() -> Result<Pool> {
    let config = pool::DatabaseConfig::from_env();
    let pool = pool::create_pool(&config).await?;
    pool::test_connection(&pool).await?;
    Ok(pool)
}

/// Recrée le schéma du registre à blanc
async fn setup(pool: &Pool) -> Result<()> {
    schema::create_schema(pool, true).await
}

/// Carré axis-aligned de côté `size` ancré en (x0, y0)
fn square(x0: f64, y0: f64, size: f64) -> Geometry {
    Geometry::Polygon(Polygon::new(
        LineString::from(vec![
            (x0, y0),
            (x0 + size, y0),
            (x0 + size, y0 + size),
            (x0, y0 + size),
            (x0, y0),
        ]),
        vec![],
    ))
}

/// Crée un bâtiment actif et retourne son identifiant public
async fn create_building(pool: &Pool, geometry: Geometry, user: &str) -> Result<Uuid> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let grant = ledger::creation_grant(user);
    let version = NewVersion {
        geometry,
        status: None,
        active: true,
        addresses: vec![],
        source_refs: vec![],
    };
    let rnb_id = write::create_building(&tx, &grant, &version).await?;
    tx.commit().await?;
    Ok(rnb_id)
}

/// Test de connexion basique
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_database_connection() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    let client = pool.get().await.expect("Failed to get client");

    let row = client
        .query_one("SELECT 1 as test", &[])
        .await
        .expect("Query failed");
    let value: i32 = row.get("test");
    assert_eq!(value, 1);
}

/// Test de création du schéma
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_schema_creation() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    setup(&pool).await.expect("Failed to setup schema");

    let client = pool.get().await.expect("Failed to get client");
    let tables = client
        .query(
            "SELECT table_name FROM information_schema.tables WHERE table_schema = 'rnb'",
            &[],
        )
        .await
        .expect("Failed to query tables");

    let table_names: Vec<String> = tables.iter().map(|r| r.get(0)).collect();

    assert!(table_names.contains(&"batiments".to_string()));
    assert!(table_names.contains(&"batiments_histo".to_string()));
    assert!(table_names.contains(&"candidats".to_string()));
}

/// Deux claims concurrents obtiennent des lots disjoints
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_concurrent_claims_are_disjoint() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    setup(&pool).await.expect("Failed to setup schema");

    for i in 0..20 {
        candidates::insert_candidate(
            &pool,
            &NewCandidate {
                geometry: square(i as f64 * 10.0, 0.0, 1.0),
                source: "bdtopo".into(),
                source_id: format!("BAT-{i}"),
                address_keys: vec![],
            },
        )
        .await
        .expect("Failed to insert candidate");
    }

    let (a, b) = tokio::join!(
        candidates::claim_batch(&pool, "worker-a", 12),
        candidates::claim_batch(&pool, "worker-b", 12),
    );
    let (a, b) = (a.expect("claim a failed"), b.expect("claim b failed"));
    assert_eq!(a + b, 20, "every candidate must be claimed exactly once");

    let batch_a = candidates::load_batch(&pool, "worker-a").await.unwrap();
    let batch_b = candidates::load_batch(&pool, "worker-b").await.unwrap();
    assert_eq!(batch_a.len() as u64, a);
    assert_eq!(batch_b.len() as u64, b);

    for candidate in &batch_a {
        assert!(
            !batch_b.iter().any(|other| other.id == candidate.id),
            "candidate {} claimed by both workers",
            candidate.id
        );
    }
}

/// Une mise à jour ferme l'intervalle précédent exactement au début du nouveau
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_update_closes_prior_interval() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    setup(&pool).await.expect("Failed to setup schema");

    let rnb_id = create_building(&pool, square(0.0, 0.0, 10.0), "editor")
        .await
        .expect("Failed to create building");

    {
        let mut client = pool.get().await.unwrap();
        let tx = client.transaction().await.unwrap();
        let current = read::current_for_update(&tx, rnb_id).await.unwrap().unwrap();

        let mut version = NewVersion::from_building(&current);
        version.geometry = square(0.0, 0.0, 12.0);
        let grant = ledger::update_grant("editor");
        write::update_building(&tx, &grant, rnb_id, &version)
            .await
            .expect("Update failed");
        tx.commit().await.unwrap();
    }

    let current = read::get_current(&pool, rnb_id).await.unwrap().unwrap();
    let history = read::get_history(&pool, rnb_id).await.unwrap();

    assert_eq!(history.len(), 1);
    assert_eq!(
        history[0].valid_to, current.valid_from,
        "prior interval must close exactly where the new one opens"
    );
    assert_eq!(history[0].building.geometry, square(0.0, 0.0, 10.0));
    assert_eq!(current.geometry, square(0.0, 0.0, 12.0));
    assert_eq!(current.event_kind, Some(EventKind::Update));

    let tiling = invariant::check_history_tiling(&pool).await.unwrap();
    assert!(tiling.is_clean(), "tiling faults: {:?}", tiling.faults);
}

/// Le rollback restaure l'état antérieur comme nouvelle version
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_rollback_restores_prior_state() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    setup(&pool).await.expect("Failed to setup schema");

    let rnb_id = create_building(&pool, square(0.0, 0.0, 10.0), "owner")
        .await
        .expect("Failed to create building");

    // Mutation à annuler, attribuée à un autre utilisateur
    {
        let mut client = pool.get().await.unwrap();
        let tx = client.transaction().await.unwrap();
        let current = read::current_for_update(&tx, rnb_id).await.unwrap().unwrap();

        let mut version = NewVersion::from_building(&current);
        version.geometry = square(50.0, 50.0, 3.0);
        version.status = Some(BuildingStatus::NotUsable);
        let grant = ledger::update_grant("vandal");
        write::update_building(&tx, &grant, rnb_id, &version)
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    let from = Utc::now() - Duration::hours(1);
    let to = Utc::now() + Duration::hours(1);
    let result = rollback::rollback_window(&pool, "vandal", from, to)
        .await
        .expect("Rollback failed");
    assert_eq!(result.events_found, 1);
    assert_eq!(result.versions_undone, 1);
    assert_eq!(result.buildings_touched, 1);

    let current = read::get_current(&pool, rnb_id).await.unwrap().unwrap();
    assert_eq!(current.geometry, square(0.0, 0.0, 10.0));
    assert_eq!(current.status, None);
    assert_eq!(
        current.event_user.as_deref(),
        Some(rollback::ROLLBACK_ACTOR),
        "restored version must be attributed to the rollback actor"
    );

    // L'historique n'est jamais réécrit: la version annulée y reste
    let history = read::get_history(&pool, rnb_id).await.unwrap();
    assert_eq!(history.len(), 2);

    let tiling = invariant::check_history_tiling(&pool).await.unwrap();
    assert!(tiling.is_clean(), "tiling faults: {:?}", tiling.faults);
}

/// Annuler une création désactive le bâtiment, sans suppression physique
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_rollback_of_creation_deactivates() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    setup(&pool).await.expect("Failed to setup schema");

    let rnb_id = create_building(&pool, square(0.0, 0.0, 5.0), "import-bot")
        .await
        .expect("Failed to create building");

    let from = Utc::now() - Duration::hours(1);
    let to = Utc::now() + Duration::hours(1);
    let result = rollback::rollback_window(&pool, "import-bot", from, to)
        .await
        .expect("Rollback failed");
    assert_eq!(result.deactivations, 1);

    let current = read::get_current(&pool, rnb_id).await.unwrap().unwrap();
    assert!(!current.active, "creation must be undone by deactivation");
    assert_eq!(current.event_kind, Some(EventKind::Deactivation));
}

/// Un rollback en conflit n'écrit rien
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_rollback_conflict_aborts_everything() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    setup(&pool).await.expect("Failed to setup schema");

    let rnb_id = create_building(&pool, square(0.0, 0.0, 10.0), "owner")
        .await
        .expect("Failed to create building");

    // Mutation de la fenêtre, puis mutation postérieure d'un tiers
    for (user, size) in [("vandal", 3.0), ("someone-else", 7.0)] {
        let mut client = pool.get().await.unwrap();
        let tx = client.transaction().await.unwrap();
        let current = read::current_for_update(&tx, rnb_id).await.unwrap().unwrap();
        let mut version = NewVersion::from_building(&current);
        version.geometry = square(0.0, 0.0, size);
        let grant = WriteGrant::new(EventKind::Update, user);
        write::update_building(&tx, &grant, rnb_id, &version)
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    let before = read::get_current(&pool, rnb_id).await.unwrap().unwrap();
    let from = Utc::now() - Duration::hours(1);
    let to = Utc::now() + Duration::hours(1);

    let err = rollback::rollback_window(&pool, "vandal", from, to)
        .await
        .expect_err("rollback must fail on conflict");
    assert!(
        err.downcast_ref::<batid::BatidError>()
            .map(|e| matches!(e, batid::BatidError::Conflict { .. }))
            .unwrap_or(false),
        "unexpected error: {err:#}"
    );

    let after = read::get_current(&pool, rnb_id).await.unwrap().unwrap();
    assert_eq!(after.event_id, before.event_id, "nothing must be written");
}

/// Un événement étranger intercalé entre deux mutations annulées fait
/// échouer le rollback, même si la ligne courante porte le bon événement
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_rollback_rejects_interleaved_foreign_event() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    setup(&pool).await.expect("Failed to setup schema");

    let rnb_id = create_building(&pool, square(0.0, 0.0, 10.0), "owner")
        .await
        .expect("Failed to create building");

    // vandal, puis un tiers, puis vandal à nouveau: la ligne courante
    // porte le dernier événement du vandal, mais le restaurer pas à pas
    // écraserait le travail du tiers
    for (user, size) in [("vandal", 3.0), ("surveyor", 7.0), ("vandal", 4.0)] {
        let mut client = pool.get().await.unwrap();
        let tx = client.transaction().await.unwrap();
        let current = read::current_for_update(&tx, rnb_id).await.unwrap().unwrap();
        let mut version = NewVersion::from_building(&current);
        version.geometry = square(0.0, 0.0, size);
        let grant = WriteGrant::new(EventKind::Update, user);
        write::update_building(&tx, &grant, rnb_id, &version)
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    let before = read::get_current(&pool, rnb_id).await.unwrap().unwrap();
    let from = Utc::now() - Duration::hours(1);
    let to = Utc::now() + Duration::hours(1);

    let err = rollback::rollback_window(&pool, "vandal", from, to)
        .await
        .expect_err("interleaved foreign event must abort the rollback");
    assert!(
        err.downcast_ref::<batid::BatidError>()
            .map(|e| matches!(e, batid::BatidError::Conflict { .. }))
            .unwrap_or(false),
        "unexpected error: {err:#}"
    );

    let after = read::get_current(&pool, rnb_id).await.unwrap().unwrap();
    assert_eq!(after.event_id, before.event_id, "nothing must be written");
    assert_eq!(after.geometry, square(0.0, 0.0, 4.0));
}

/// Un événement partagé entre plusieurs bâtiments compte pour un
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_rollback_counts_shared_event_once() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    setup(&pool).await.expect("Failed to setup schema");

    let a = create_building(&pool, square(0.0, 0.0, 5.0), "import-bot")
        .await
        .unwrap();
    let b = create_building(&pool, square(20.0, 0.0, 5.0), "import-bot")
        .await
        .unwrap();

    // Le job de statut estampille tout son passage d'un seul événement
    let assigned = status::assign_default_status(&pool, 100).await.unwrap();
    assert_eq!(assigned, 2);

    let from = Utc::now() - Duration::hours(1);
    let to = Utc::now() + Duration::hours(1);
    let result = rollback::rollback_window(&pool, status::STATUS_JOB_ACTOR, from, to)
        .await
        .expect("Rollback failed");

    assert_eq!(result.events_found, 1, "one shared event, not one per row");
    assert_eq!(result.versions_undone, 2);
    assert_eq!(result.buildings_touched, 2);

    for rnb_id in [a, b] {
        let current = read::get_current(&pool, rnb_id).await.unwrap().unwrap();
        assert_eq!(current.status, None, "assigned status must be undone");
    }
}

/// Le backfill des métadonnées d'événement est idempotent
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_event_backfill_idempotent() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    setup(&pool).await.expect("Failed to setup schema");

    // Ligne legacy sans événement, insérée sous le write-through
    let client = pool.get().await.unwrap();
    client
        .execute(
            "INSERT INTO rnb.batiments (rnb_id, actif, valid_from) VALUES ($1, TRUE, NOW())",
            &[&Uuid::new_v4()],
        )
        .await
        .expect("Failed to insert legacy row");
    drop(client);

    let first = backfill::backfill_event_metadata(&pool, 100).await.unwrap();
    assert_eq!(first, 1);

    let second = backfill::backfill_event_metadata(&pool, 100).await.unwrap();
    assert_eq!(second, 0, "second pass must touch nothing");

    let client = pool.get().await.unwrap();
    let row = client
        .query_one(
            "SELECT event_id, event_kind, event_user FROM rnb.batiments",
            &[],
        )
        .await
        .unwrap();
    let event_id: Option<Uuid> = row.get("event_id");
    let event_user: Option<String> = row.get("event_user");
    assert!(event_id.is_some());
    assert_eq!(event_user.as_deref(), Some(ledger::BACKFILL_ACTOR));
}

/// Le job de statut par défaut est idempotent
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_default_status_job_idempotent() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    setup(&pool).await.expect("Failed to setup schema");

    let rnb_id = create_building(&pool, square(0.0, 0.0, 5.0), "import-bot")
        .await
        .expect("Failed to create building");

    let first = status::assign_default_status(&pool, 100).await.unwrap();
    assert_eq!(first, 1);

    let second = status::assign_default_status(&pool, 100).await.unwrap();
    assert_eq!(second, 0, "rerun must assign nothing");

    let current = read::get_current(&pool, rnb_id).await.unwrap().unwrap();
    assert_eq!(current.status, Some(BuildingStatus::Constructed));
}

/// Une transition post-construction insère un "constructed" synthétique
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_status_transition_synthetic_constructed() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    setup(&pool).await.expect("Failed to setup schema");

    let rnb_id = create_building(&pool, square(0.0, 0.0, 5.0), "import-bot")
        .await
        .expect("Failed to create building");

    let steps = status::transition_status(&pool, rnb_id, BuildingStatus::Demolished, "admin")
        .await
        .expect("Transition failed");
    assert_eq!(steps, 2, "constructed must be inserted before demolished");

    let current = read::get_current(&pool, rnb_id).await.unwrap().unwrap();
    assert_eq!(current.status, Some(BuildingStatus::Demolished));

    let history = read::get_history(&pool, rnb_id).await.unwrap();
    let statuses: Vec<_> = history.iter().map(|s| s.building.status).collect();
    assert!(statuses.contains(&Some(BuildingStatus::Constructed)));

    // Idempotence
    let again = status::transition_status(&pool, rnb_id, BuildingStatus::Demolished, "admin")
        .await
        .unwrap();
    assert_eq!(again, 0);
}

/// L'inspection d'un candidat sans voisin crée un bâtiment
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_inspection_creates_building() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    setup(&pool).await.expect("Failed to setup schema");

    candidates::insert_candidate(
        &pool,
        &NewCandidate {
            geometry: square(0.0, 0.0, 2.0),
            source: "bdtopo".into(),
            source_id: "BAT-1".into(),
            address_keys: vec!["addr-1".into()],
        },
    )
    .await
    .unwrap();

    let inspector = Inspector::new(pool.clone(), MatchThresholds::default(), "inspector");
    let report = inspector.run_batch("run-1", 10).await.unwrap();
    assert_eq!(report.creations, 1);
    assert_eq!(report.errors.len(), 0);

    let buildings = read::find_in_bbox(&pool, [-1.0, -1.0, 3.0, 3.0], true)
        .await
        .unwrap();
    assert_eq!(buildings.len(), 1);
    assert_eq!(buildings[0].addresses, vec!["addr-1".to_string()]);
    assert_eq!(buildings[0].source_refs[0].external_id, "BAT-1");
}

/// Un candidat recouvrant presque entièrement un bâtiment, avec une
/// géométrie différente, le met à jour: une version d'historique, la
/// géométrie courante devient celle du candidat
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_inspection_updates_matched_building() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    setup(&pool).await.expect("Failed to setup schema");

    let rnb_id = create_building(&pool, square(0.0, 0.0, 10.0), "owner")
        .await
        .unwrap();

    // Couverture 100/110.25 ≈ 0.91, au-dessus du seuil de mise à jour
    let candidate_id = candidates::insert_candidate(
        &pool,
        &NewCandidate {
            geometry: square(0.0, 0.0, 10.5),
            source: "bdtopo".into(),
            source_id: "BAT-5".into(),
            address_keys: vec!["addr-5".into()],
        },
    )
    .await
    .unwrap();

    let inspector = Inspector::new(pool.clone(), MatchThresholds::default(), "inspector");
    let report = inspector.run_batch("run-update", 10).await.unwrap();
    assert_eq!(report.updates, 1);
    assert_eq!(report.creations, 0);
    assert_eq!(report.errors.len(), 0);

    let current = read::get_current(&pool, rnb_id).await.unwrap().unwrap();
    assert_eq!(current.geometry, square(0.0, 0.0, 10.5));
    assert_eq!(current.event_kind, Some(EventKind::Update));
    assert_eq!(current.event_user.as_deref(), Some("inspector"));
    assert!(current.addresses.contains(&"addr-5".to_string()));
    assert!(
        current.source_refs.iter().any(|r| r.external_id == "BAT-5"),
        "candidate source ref must be merged"
    );

    let history = read::get_history(&pool, rnb_id).await.unwrap();
    assert_eq!(history.len(), 1, "update must close exactly one version");
    assert_eq!(history[0].building.geometry, square(0.0, 0.0, 10.0));

    let client = pool.get().await.unwrap();
    let row = client
        .query_one(
            "SELECT decision FROM rnb.candidats WHERE id = $1",
            &[&candidate_id],
        )
        .await
        .unwrap();
    let decision: Option<String> = row.get("decision");
    assert_eq!(decision.as_deref(), Some("update"));
}

/// Un conflit de fusion ne mute jamais le registre
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_merge_conflict_mutates_nothing() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    setup(&pool).await.expect("Failed to setup schema");

    // Deux bâtiments qui recouvrent entièrement le candidat
    let a = create_building(&pool, square(-1.0, -1.0, 4.0), "owner")
        .await
        .unwrap();
    let b = create_building(&pool, square(-2.0, -2.0, 6.0), "owner")
        .await
        .unwrap();

    let candidate_id = candidates::insert_candidate(
        &pool,
        &NewCandidate {
            geometry: square(0.0, 0.0, 1.0),
            source: "bdtopo".into(),
            source_id: "BAT-9".into(),
            address_keys: vec![],
        },
    )
    .await
    .unwrap();

    let inspector = Inspector::new(pool.clone(), MatchThresholds::default(), "inspector");
    let report = inspector.run_batch("run-conflict", 10).await.unwrap();
    assert_eq!(report.merge_conflicts, 1);
    assert_eq!(report.creations + report.updates, 0);

    for rnb_id in [a, b] {
        let history = read::get_history(&pool, rnb_id).await.unwrap();
        assert!(history.is_empty(), "no version must be written");
    }

    let client = pool.get().await.unwrap();
    let row = client
        .query_one(
            "SELECT decision FROM rnb.candidats WHERE id = $1",
            &[&candidate_id],
        )
        .await
        .unwrap();
    let decision: Option<String> = row.get("decision");
    assert_eq!(decision.as_deref(), Some("merge_conflict"));
}

/// Un candidat identique à l'existant enregistre la décision sans version
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_unchanged_geometry_skips_version() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    setup(&pool).await.expect("Failed to setup schema");

    let rnb_id = create_building(&pool, square(0.0, 0.0, 5.0), "owner")
        .await
        .unwrap();

    candidates::insert_candidate(
        &pool,
        &NewCandidate {
            geometry: square(0.0, 0.0, 5.0),
            source: "bdtopo".into(),
            source_id: "BAT-2".into(),
            address_keys: vec![],
        },
    )
    .await
    .unwrap();

    let inspector = Inspector::new(pool.clone(), MatchThresholds::default(), "inspector");
    let report = inspector.run_batch("run-unchanged", 10).await.unwrap();
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.updates, 0);

    let history = read::get_history(&pool, rnb_id).await.unwrap();
    assert!(history.is_empty(), "identical geometry must not version");
}

/// Le balayage ne requalifie que les claims périmés
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_sweep_requeues_only_stale_claims() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    setup(&pool).await.expect("Failed to setup schema");

    for i in 0..4 {
        candidates::insert_candidate(
            &pool,
            &NewCandidate {
                geometry: square(i as f64 * 10.0, 0.0, 1.0),
                source: "bdtopo".into(),
                source_id: format!("BAT-{i}"),
                address_keys: vec![],
            },
        )
        .await
        .unwrap();
    }

    let claimed = candidates::claim_batch(&pool, "crashed-worker", 4)
        .await
        .unwrap();
    assert_eq!(claimed, 4);

    // Cutoff dans le passé: aucun claim n'est encore périmé
    let untouched = candidates::sweep_stale_claims(&pool, Utc::now() - Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(untouched, 0);

    // Cutoff dans le futur: tous les claims sans décision reviennent
    let swept = candidates::sweep_stale_claims(&pool, Utc::now() + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(swept, 4);

    let reclaimed = candidates::claim_batch(&pool, "fresh-worker", 10)
        .await
        .unwrap();
    assert_eq!(reclaimed, 4, "swept candidates must be claimable again");
}
