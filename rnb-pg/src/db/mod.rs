//! Accès PostgreSQL/PostGIS (pool, schéma, conversions géométriques)

pub mod geom;
pub mod pool;
pub mod schema;

pub use pool::{create_pool, DatabaseConfig, SslMode};

/// Schéma PostgreSQL du registre
pub const SCHEMA: &str = "rnb";

/// SRID des géométries persistées (WGS84)
pub const SRID: u32 = 4326;
