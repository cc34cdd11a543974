//! Pool de connexions PostgreSQL du registre
//!
//! Les workers d'inspection sont des processus indépendants sans mémoire
//! partagée: claims, décisions et écritures du registre se coordonnent
//! entièrement par la base. Le pool est la seule ressource process-locale,
//! dimensionné petit (8) puisqu'un worker ne tient que quelques
//! transactions courtes à la fois.
//!
//! La configuration suit la convention libpq (`PGHOST`, `PGPORT`,
//! `PGDATABASE`, `PGUSER`, `PGPASSWORD`, `PGSSLMODE`), surchargée par les
//! options CLI.

use anyhow::{Context, Result};
use deadpool_postgres::{Config, Pool, PoolConfig, Runtime, Timeouts};
use std::time::Duration;
use tokio_postgres::NoTls;
use tokio_postgres_rustls::MakeRustlsConnect;

/// Mode SSL pour la connexion PostgreSQL
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SslMode {
    /// Connexion en clair (défaut, bases locales et CI)
    #[default]
    Disable,
    /// TLS négocié si le serveur le propose, clair sinon
    Prefer,
    /// TLS obligatoire (bases managées)
    Require,
}

impl std::str::FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disable" | "off" | "false" | "no" => Ok(SslMode::Disable),
            "prefer" => Ok(SslMode::Prefer),
            "require" | "on" | "true" | "yes" => Ok(SslMode::Require),
            _ => Err(format!(
                "Invalid SSL mode: {}. Use: disable, prefer, require",
                s
            )),
        }
    }
}

/// Paramètres de connexion à la base du registre
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: Option<String>,
    pub pool_size: usize,
    pub ssl_mode: SslMode,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5432,
            dbname: "rnb".into(),
            user: "postgres".into(),
            password: None,
            pool_size: 8,
            ssl_mode: SslMode::Disable,
        }
    }
}

impl DatabaseConfig {
    /// Charge la configuration depuis les variables d'environnement libpq
    /// (plus `POOL_SIZE`), avec les défauts du poste de dev pour le reste
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("PGHOST").unwrap_or_else(|_| "localhost".into()),
            port: std::env::var("PGPORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("PGDATABASE").unwrap_or_else(|_| "rnb".into()),
            user: std::env::var("PGUSER").unwrap_or_else(|_| "postgres".into()),
            password: std::env::var("PGPASSWORD").ok(),
            pool_size: std::env::var("POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8),
            ssl_mode: std::env::var("PGSSLMODE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
        }
    }
}

/// Connecteur TLS adossé aux racines webpki (bases managées avec
/// certificat public; pas de certificat client)
fn make_tls_connector() -> Result<MakeRustlsConnect> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(MakeRustlsConnect::new(config))
}

/// Crée le pool de connexions du registre
///
/// Les timeouts sont courts: un worker qui n'obtient pas de connexion
/// doit échouer vite et laisser son lot revenir par le balayage plutôt
/// que de le garder réclamé.
pub async fn create_pool(config: &DatabaseConfig) -> Result<Pool> {
    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.dbname = Some(config.dbname.clone());
    cfg.user = Some(config.user.clone());
    cfg.password = config.password.clone();
    cfg.application_name = Some("rnb-pg".into());

    cfg.pool = Some(PoolConfig {
        max_size: config.pool_size,
        timeouts: Timeouts {
            wait: Some(Duration::from_secs(30)),
            create: Some(Duration::from_secs(10)),
            recycle: Some(Duration::from_secs(30)),
        },
        ..Default::default()
    });

    match config.ssl_mode {
        SslMode::Disable => {
            cfg.ssl_mode = Some(deadpool_postgres::SslMode::Disable);
            cfg.create_pool(Some(Runtime::Tokio1), NoTls)
                .context("Failed to create database pool")
        }
        SslMode::Prefer => {
            cfg.ssl_mode = Some(deadpool_postgres::SslMode::Prefer);
            let tls = make_tls_connector()?;
            cfg.create_pool(Some(Runtime::Tokio1), tls)
                .context("Failed to create database pool with TLS")
        }
        SslMode::Require => {
            cfg.ssl_mode = Some(deadpool_postgres::SslMode::Require);
            let tls = make_tls_connector()?;
            cfg.create_pool(Some(Runtime::Tokio1), tls)
                .context("Failed to create database pool with TLS")
        }
    }
}

/// Aller-retour minimal pour vérifier la connexion avant de travailler
pub async fn test_connection(pool: &Pool) -> Result<()> {
    let client = pool
        .get()
        .await
        .context("Failed to get connection from pool")?;
    client
        .execute("SELECT 1", &[])
        .await
        .context("Connection test failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssl_mode_parsing() {
        assert_eq!("disable".parse::<SslMode>().unwrap(), SslMode::Disable);
        assert_eq!("PREFER".parse::<SslMode>().unwrap(), SslMode::Prefer);
        assert_eq!("require".parse::<SslMode>().unwrap(), SslMode::Require);
        assert!("tls13".parse::<SslMode>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = DatabaseConfig::default();
        assert_eq!(config.dbname, "rnb");
        assert_eq!(config.port, 5432);
        assert_eq!(config.ssl_mode, SslMode::Disable);
    }
}
