use std::env;
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::str::FromStr;
use tracing::warn;

/// Longest slot step or appointment length accepted: one day.
pub const MINUTES_PER_DAY: i64 = 1_440;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub supabase_service_role_key: String,
    pub slot_step_minutes: i64,
    pub appointment_duration_minutes: i64,
    pub store_timeout_ms: u64,
    pub practice_utc_offset_minutes: i32,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
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
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            slot_step_minutes: parse_in_range("SLOT_STEP_MINUTES", 30, 1..=MINUTES_PER_DAY),
            appointment_duration_minutes: parse_in_range("APPOINTMENT_DURATION_MINUTES", 30, 1..=MINUTES_PER_DAY),
            store_timeout_ms: parse_in_range("STORE_TIMEOUT_MS", 5_000, 1..=300_000),
            practice_utc_offset_minutes: parse_in_range("PRACTICE_UTC_OFFSET_MINUTES", 0, -720..=840),
            port: parse_or_default("API_PORT", 3000),
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

    /// Token used by the scheduling stores. Falls back to the anon key when
    /// no service role key is provided.
    pub fn store_token(&self) -> &str {
        if self.supabase_service_role_key.is_empty() {
            &self.supabase_anon_key
        } else {
            &self.supabase_service_role_key
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            supabase_service_role_key: String::new(),
            slot_step_minutes: 30,
            appointment_duration_minutes: 30,
            store_timeout_ms: 5_000,
            practice_utc_offset_minutes: 0,
            port: 3000,
        }
    }
}

fn parse_or_default<T: FromStr + Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => parse_value(key, &raw, default),
        Err(_) => default,
    }
}

fn parse_in_range<T: FromStr + Display + PartialOrd>(key: &str, default: T, range: RangeInclusive<T>) -> T {
    match env::var(key) {
        Ok(raw) => bounded_value(key, &raw, default, range),
        Err(_) => default,
    }
}

fn parse_value<T: FromStr + Display>(key: &str, raw: &str, default: T) -> T {
    raw.trim().parse().unwrap_or_else(|_| {
        warn!("{} has invalid value '{}', using default {}", key, raw, default);
        default
    })
}

fn bounded_value<T: FromStr + Display + PartialOrd>(key: &str, raw: &str, default: T, range: RangeInclusive<T>) -> T {
    match raw.trim().parse::<T>() {
        Ok(value) if range.contains(&value) => value,
        Ok(value) => {
            warn!(
                "{} value {} is outside {}..={}, using default {}",
                key, value, range.start(), range.end(), default
            );
            default
        }
        Err(_) => {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }
    }
}
