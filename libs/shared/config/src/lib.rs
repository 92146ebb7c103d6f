use std::env;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Backing store for prescription records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrescriptionStoreKind {
    Memory,
    Supabase,
}

impl FromStr for PrescriptionStoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in_memory" | "in-memory" => Ok(Self::Memory),
            "supabase" | "postgrest" => Ok(Self::Supabase),
            other => Err(format!("unknown prescription store: {}", other)),
        }
    }
}

impl fmt::Display for PrescriptionStoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Supabase => write!(f, "supabase"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub supabase_service_role_key: Option<String>,
    pub prescription_store: PrescriptionStoreKind,
    pub prescription_signing_secret: String,
    pub insurance_default_provider: String,
    pub signaling_channel_capacity: usize,
    pub server_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let supabase_jwt_secret = env::var("SUPABASE_JWT_SECRET")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_JWT_SECRET not set, using empty value");
                String::new()
            });

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
                .ok()
                .filter(|key| !key.is_empty()),
            prescription_store: env::var("PRESCRIPTION_STORE")
                .ok()
                .and_then(|value| {
                    value.parse().map_err(|e| warn!("{}, using memory", e)).ok()
                })
                .unwrap_or(PrescriptionStoreKind::Memory),
            prescription_signing_secret: env::var("PRESCRIPTION_SIGNING_SECRET")
                .unwrap_or_else(|_| {
                    warn!("PRESCRIPTION_SIGNING_SECRET not set, falling back to SUPABASE_JWT_SECRET");
                    supabase_jwt_secret.clone()
                }),
            insurance_default_provider: env::var("INSURANCE_DEFAULT_PROVIDER")
                .unwrap_or_else(|_| "BLUE_CROSS".to_string()),
            signaling_channel_capacity: env::var("SIGNALING_CHANNEL_CAPACITY")
                .ok()
                .and_then(|value| value.parse().ok())
                .filter(|capacity: &usize| *capacity > 0)
                .unwrap_or(64),
            server_port: env::var("PORT")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(3000),
            supabase_jwt_secret,
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        if config.prescription_store == PrescriptionStoreKind::Supabase
            && !config.is_database_configured()
        {
            warn!("PRESCRIPTION_STORE=supabase but Supabase is not configured");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_jwt_secret.is_empty()
            && !self.prescription_signing_secret.is_empty()
    }

    pub fn is_database_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_kind_parsing() {
        assert_eq!("memory".parse::<PrescriptionStoreKind>().unwrap(), PrescriptionStoreKind::Memory);
        assert_eq!("Supabase".parse::<PrescriptionStoreKind>().unwrap(), PrescriptionStoreKind::Supabase);
        assert!("mongo".parse::<PrescriptionStoreKind>().is_err());
    }
}
