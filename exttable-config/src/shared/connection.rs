use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::shared::ValidationError;

const COMMON_DATESTYLE: &str = "ISO";
const COMMON_CLIENT_ENCODING: &str = "UTF8";
const COMMON_TIMEZONE: &str = "UTC";

const APP_NAME_MIGRATIONS: &str = "exttable_updater_migrations";
const APP_NAME_STORES: &str = "exttable_updater_stores";

/// Session settings applied to every connection opened by a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgSessionOptions {
    pub statement_timeout_ms: u32,
    pub lock_timeout_ms: u32,
    pub application_name: &'static str,
}

impl PgSessionOptions {
    /// Long statement timeout, since migrations may rewrite tables.
    pub const MIGRATIONS: PgSessionOptions = PgSessionOptions {
        statement_timeout_ms: 300_000,
        lock_timeout_ms: 10_000,
        application_name: APP_NAME_MIGRATIONS,
    };

    /// Descriptor and staging store traffic.
    pub const STORES: PgSessionOptions = PgSessionOptions {
        statement_timeout_ms: 30_000,
        lock_timeout_ms: 10_000,
        application_name: APP_NAME_STORES,
    };

    pub fn to_key_value_pairs(&self) -> Vec<(String, String)> {
        vec![
            ("datestyle".to_owned(), COMMON_DATESTYLE.to_owned()),
            ("client_encoding".to_owned(), COMMON_CLIENT_ENCODING.to_owned()),
            ("timezone".to_owned(), COMMON_TIMEZONE.to_owned()),
            (
                "statement_timeout".to_owned(),
                self.statement_timeout_ms.to_string(),
            ),
            ("lock_timeout".to_owned(), self.lock_timeout_ms.to_string()),
            (
                "application_name".to_owned(),
                self.application_name.to_owned(),
            ),
        ]
    }
}

/// Connection settings for the Postgres database backing the descriptor and staging stores.
#[derive(Debug, Clone, Deserialize)]
pub struct PgConnectionConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub username: String,
    pub password: Option<SecretString>,
    #[serde(default = "TlsConfig::disabled")]
    pub tls: TlsConfig,
}

impl PgConnectionConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.tls.validate()
    }

    /// Builds `sqlx` connect options targeting the configured database.
    pub fn connect_options(&self, session: &PgSessionOptions) -> PgConnectOptions {
        let ssl_mode = if self.tls.enabled {
            PgSslMode::VerifyFull
        } else {
            PgSslMode::Prefer
        };

        let mut options = PgConnectOptions::new_without_pgpass()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .database(&self.name)
            .ssl_mode(ssl_mode)
            .options(session.to_key_value_pairs());

        if self.tls.enabled {
            options = options.ssl_root_cert_from_pem(self.tls.trusted_root_certs.clone().into_bytes());
        }

        if let Some(password) = &self.password {
            options = options.password(password.expose_secret());
        }

        options
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub trusted_root_certs: String,
    pub enabled: bool,
}

impl TlsConfig {
    pub fn disabled() -> Self {
        Self {
            trusted_root_certs: String::new(),
            enabled: false,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.trusted_root_certs.trim().is_empty() {
            return Err(ValidationError::MissingTrustedRootCerts);
        }

        Ok(())
    }
}
