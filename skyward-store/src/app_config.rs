use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_tax_rate")]
    pub tax_rate: Decimal,
    #[serde(default = "default_service_fee")]
    pub service_fee: Decimal,
    #[serde(default = "default_otp_ttl")]
    pub otp_ttl_seconds: u64,
    #[serde(default = "default_flow_ttl")]
    pub flow_ttl_seconds: u64,
}

fn default_tax_rate() -> Decimal { Decimal::new(12, 2) }
fn default_service_fee() -> Decimal { Decimal::new(2500, 2) }
fn default_otp_ttl() -> u64 { 600 }
fn default_flow_ttl() -> u64 { 1800 }

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            tax_rate: default_tax_rate(),
            service_fee: default_service_fee(),
            otp_ttl_seconds: default_otp_ttl(),
            flow_ttl_seconds: default_flow_ttl(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
    /// Echo issued OTP codes in API responses. Development only.
    #[serde(default)]
    pub expose_otp: bool,
    #[serde(default = "default_hash_cost")]
    pub password_hash_cost: u32,
}

fn default_hash_cost() -> u32 { 12 }

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Empty selects the in-memory store
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    #[serde(default)]
    pub url: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `SKYWARD__AUTH__JWT_SECRET=...` sets `auth.jwt_secret`
            .add_source(config::Environment::with_prefix("SKYWARD").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_rules_defaults() {
        let rules = BusinessRules::default();
        assert_eq!(rules.tax_rate, Decimal::new(12, 2));
        assert_eq!(rules.service_fee, Decimal::new(2500, 2));
        assert_eq!(rules.otp_ttl_seconds, 600);
    }

    #[test]
    fn test_decimal_strings_deserialize() {
        let rules: BusinessRules = serde_json::from_str(r#"{"tax_rate": "0.07", "service_fee": "10.50"}"#).unwrap();
        assert_eq!(rules.tax_rate, Decimal::new(7, 2));
        assert_eq!(rules.service_fee, Decimal::new(1050, 2));
        assert_eq!(rules.flow_ttl_seconds, 1800);
    }
}
