use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Supabase,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "supabase" => Ok(StorageBackend::Supabase),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub storage_backend: StorageBackend,
    pub bind_address: String,
    pub min_appointment_minutes: i64,
    pub max_appointment_minutes: i64,
    /// One of `earliest`, `latest` or `reject`; applied to local times that occur twice.
    pub ambiguous_local_time: String,
    pub default_currency: String,
    pub status_write_retries: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_role_key: String::new(),
            storage_backend: StorageBackend::Memory,
            bind_address: "0.0.0.0:3000".to_string(),
            min_appointment_minutes: 1,
            max_appointment_minutes: 600,
            ambiguous_local_time: "earliest".to_string(),
            default_currency: "USD".to_string(),
            status_write_retries: 3,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            storage_backend: parse_var("STORAGE_BACKEND", defaults.storage_backend),
            bind_address: env::var("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            min_appointment_minutes: parse_var("MIN_APPOINTMENT_MINUTES", defaults.min_appointment_minutes),
            max_appointment_minutes: parse_var("MAX_APPOINTMENT_MINUTES", defaults.max_appointment_minutes),
            ambiguous_local_time: env::var("AMBIGUOUS_LOCAL_TIME").unwrap_or(defaults.ambiguous_local_time),
            default_currency: env::var("DEFAULT_CURRENCY").unwrap_or(defaults.default_currency),
            status_write_retries: parse_var("STATUS_WRITE_RETRIES", defaults.status_write_retries),
        };

        if config.storage_backend == StorageBackend::Supabase && !config.is_supabase_configured() {
            warn!("Supabase storage selected but SUPABASE_* variables are incomplete");
        }

        config
    }

    pub fn is_supabase_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_service_role_key.is_empty()
    }
}

fn parse_var<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match env::var(name) {
        Ok(raw) => parse_or_default(name, &raw, default),
        Err(_) => default,
    }
}

fn parse_or_default<T>(name: &str, raw: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    raw.trim().parse().unwrap_or_else(|_| {
        warn!("{} has invalid value '{}', using default {:?}", name, raw, default);
        default
    })
}
