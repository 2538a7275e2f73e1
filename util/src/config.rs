//! Global application configuration manager.
//!
//! `AppConfig` is a lazily initialized, globally accessible singleton containing
//! runtime configuration values loaded from environment variables. The free
//! functions at the bottom of this module are the accessors the rest of the
//! workspace uses.

use std::env;
use std::sync::{OnceLock, RwLock};

/// Represents the complete application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub project_name: String,
    pub log_level: String,
    pub log_file: String,
    pub log_to_stdout: bool,
    pub database_path: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_duration_minutes: u64,
    pub token_validity_minutes: i64,
    pub lateness_grace_minutes: i64,
    pub geofence_radius_meters: f64,
    pub risk_threshold_high: f64,
    pub risk_threshold_medium: f64,
}

/// Lazily-initialized, thread-safe singleton instance of `AppConfig`.
static CONFIG_INSTANCE: OnceLock<RwLock<AppConfig>> = OnceLock::new();

impl AppConfig {
    /// Loads the configuration from `.env` and environment variables.
    ///
    /// Panics if required variables are missing or improperly formatted.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            env: env::var("APP_ENV").unwrap_or_else(|_| "development".into()),
            project_name: env::var("PROJECT_NAME").unwrap_or_else(|_| "classtrack".into()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "api=info".into()),
            log_file: env::var("LOG_FILE").unwrap_or_else(|_| "api.log".into()),
            log_to_stdout: env::var("LOG_TO_STDOUT").unwrap_or_else(|_| "false".into()) == "true",
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "data/classtrack.db".into()),
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".into())
                .parse()
                .expect("PORT must be a valid port number"),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| "classtrack-dev-secret".into()),
            jwt_duration_minutes: env::var("JWT_DURATION_MINUTES")
                .unwrap_or_else(|_| "60".into())
                .parse()
                .expect("JWT_DURATION_MINUTES must be an integer"),
            token_validity_minutes: env::var("TOKEN_VALIDITY_MINUTES")
                .unwrap_or_else(|_| "15".into())
                .parse()
                .expect("TOKEN_VALIDITY_MINUTES must be an integer"),
            lateness_grace_minutes: env::var("LATENESS_GRACE_MINUTES")
                .unwrap_or_else(|_| "10".into())
                .parse()
                .expect("LATENESS_GRACE_MINUTES must be an integer"),
            geofence_radius_meters: env::var("GEOFENCE_RADIUS_METERS")
                .unwrap_or_else(|_| "100".into())
                .parse()
                .expect("GEOFENCE_RADIUS_METERS must be a number"),
            risk_threshold_high: env::var("RISK_THRESHOLD_HIGH")
                .unwrap_or_else(|_| "75".into())
                .parse()
                .expect("RISK_THRESHOLD_HIGH must be a number"),
            risk_threshold_medium: env::var("RISK_THRESHOLD_MEDIUM")
                .unwrap_or_else(|_| "85".into())
                .parse()
                .expect("RISK_THRESHOLD_MEDIUM must be a number"),
        }
    }

    /// Returns a shared reference to the global configuration.
    pub fn global() -> std::sync::RwLockReadGuard<'static, AppConfig> {
        CONFIG_INSTANCE
            .get_or_init(|| RwLock::new(AppConfig::from_env()))
            .read()
            .expect("Failed to acquire AppConfig read lock")
    }

    /// Reloads the configuration from environment variables.
    ///
    /// Useful in tests to clear overrides.
    pub fn reset() {
        if let Some(lock) = CONFIG_INSTANCE.get() {
            let mut guard = lock.write().unwrap();
            *guard = AppConfig::from_env();
        }
    }

    fn set_field<F>(setter: F)
    where
        F: FnOnce(&mut AppConfig),
    {
        let lock = CONFIG_INSTANCE.get_or_init(|| RwLock::new(AppConfig::from_env()));
        let mut guard = lock
            .write()
            .expect("Failed to acquire AppConfig write lock");
        setter(&mut guard);
    }

    pub fn set_env(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.env = value.into());
    }

    pub fn set_database_path(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.database_path = value.into());
    }

    pub fn set_jwt_secret(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.jwt_secret = value.into());
    }

    pub fn set_token_validity_minutes(value: i64) {
        AppConfig::set_field(|cfg| cfg.token_validity_minutes = value);
    }

    pub fn set_lateness_grace_minutes(value: i64) {
        AppConfig::set_field(|cfg| cfg.lateness_grace_minutes = value);
    }

    pub fn set_geofence_radius_meters(value: f64) {
        AppConfig::set_field(|cfg| cfg.geofence_radius_meters = value);
    }
}

pub fn env() -> String {
    AppConfig::global().env.clone()
}

pub fn project_name() -> String {
    AppConfig::global().project_name.clone()
}

pub fn log_level() -> String {
    AppConfig::global().log_level.clone()
}

pub fn log_file() -> String {
    AppConfig::global().log_file.clone()
}

pub fn log_to_stdout() -> bool {
    AppConfig::global().log_to_stdout
}

pub fn database_path() -> String {
    AppConfig::global().database_path.clone()
}

pub fn host() -> String {
    AppConfig::global().host.clone()
}

pub fn port() -> u16 {
    AppConfig::global().port
}

pub fn jwt_secret() -> String {
    AppConfig::global().jwt_secret.clone()
}

pub fn jwt_duration_minutes() -> u64 {
    AppConfig::global().jwt_duration_minutes
}

pub fn token_validity_minutes() -> i64 {
    AppConfig::global().token_validity_minutes
}

pub fn lateness_grace_minutes() -> i64 {
    AppConfig::global().lateness_grace_minutes
}

pub fn geofence_radius_meters() -> f64 {
    AppConfig::global().geofence_radius_meters
}

pub fn risk_threshold_high() -> f64 {
    AppConfig::global().risk_threshold_high
}

pub fn risk_threshold_medium() -> f64 {
    AppConfig::global().risk_threshold_medium
}
