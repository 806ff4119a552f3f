use std::env;
use std::str::FromStr;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_CLINIC_OPEN: &str = "07:00";
pub const DEFAULT_CLINIC_CLOSE: &str = "17:00";
pub const DEFAULT_BUFFER_MINUTES: i64 = 10;
pub const DEFAULT_SLOT_STEP_MINUTES: i64 = 15;
pub const DEFAULT_SERVER_PORT: u16 = 3000;

/// Where appointments are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Supabase,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "supabase" => Ok(StoreBackend::Supabase),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown appointment store '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_key: String,
    pub supabase_jwt_secret: String,
    pub store_backend: StoreBackend,
    pub clinic_open: NaiveTime,
    pub clinic_close: NaiveTime,
    pub default_buffer_minutes: i64,
    pub slot_step_minutes: i64,
    pub server_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_key: String::new(),
            supabase_jwt_secret: String::new(),
            store_backend: StoreBackend::Memory,
            clinic_open: parse_clock(DEFAULT_CLINIC_OPEN).unwrap_or(NaiveTime::MIN),
            clinic_close: parse_clock(DEFAULT_CLINIC_CLOSE).unwrap_or(NaiveTime::MIN),
            default_buffer_minutes: DEFAULT_BUFFER_MINUTES,
            slot_step_minutes: DEFAULT_SLOT_STEP_MINUTES,
            server_port: DEFAULT_SERVER_PORT,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let mut config = Self {
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
            supabase_service_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, falling back to anon key");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            store_backend: defaults.store_backend,
            clinic_open: env_clock("CLINIC_OPEN_TIME", defaults.clinic_open),
            clinic_close: env_clock("CLINIC_CLOSE_TIME", defaults.clinic_close),
            default_buffer_minutes: env_positive("DEFAULT_BUFFER_MINUTES", defaults.default_buffer_minutes),
            slot_step_minutes: env_positive("SLOT_STEP_MINUTES", defaults.slot_step_minutes),
            server_port: env::var("SERVER_PORT")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(defaults.server_port),
        };

        if config.supabase_service_key.is_empty() {
            config.supabase_service_key = config.supabase_anon_key.clone();
        }

        if config.clinic_open >= config.clinic_close {
            warn!(
                "Clinic hours {}-{} are empty, using {}-{}",
                config.clinic_open, config.clinic_close, DEFAULT_CLINIC_OPEN, DEFAULT_CLINIC_CLOSE
            );
            config.clinic_open = defaults.clinic_open;
            config.clinic_close = defaults.clinic_close;
        }

        config.store_backend = match env::var("APPOINTMENT_STORE") {
            Ok(raw) => raw.parse().unwrap_or_else(|e: String| {
                warn!("{}, using memory store", e);
                StoreBackend::Memory
            }),
            Err(_) if config.is_configured() => StoreBackend::Supabase,
            Err(_) => StoreBackend::Memory,
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }
}

/// Parses a `HH:MM` (or `HH:MM:SS`) clock reading.
pub fn parse_clock(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

fn env_clock(key: &str, default: NaiveTime) -> NaiveTime {
    match env::var(key) {
        Ok(raw) => parse_clock(&raw).unwrap_or_else(|| {
            warn!("{} has invalid value '{}', using {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

fn env_positive(key: &str, default: i64) -> i64 {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<i64>() {
            Ok(value) if value > 0 => value,
            _ => {
                warn!("{} must be a positive integer, got '{}', using {}", key, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}
