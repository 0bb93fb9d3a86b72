use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::app_config::BusinessRules;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

#[derive(sqlx::FromRow)]
struct RuleRow {
    rule_key: String,
    rule_value: Value,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlay rows of `business_rules` (`{"value": ...}`) on the file defaults.
    pub async fn fetch_business_rules(&self, defaults: BusinessRules) -> Result<BusinessRules, sqlx::Error> {
        let rows: Vec<RuleRow> = sqlx::query_as("SELECT rule_key, rule_value FROM business_rules")
            .fetch_all(&self.pool)
            .await?;

        let mut rules = defaults;
        for row in rows {
            apply_rule(&mut rules, &row.rule_key, &row.rule_value);
        }

        Ok(rules)
    }
}

fn apply_rule(rules: &mut BusinessRules, key: &str, raw: &Value) {
    let Some(v) = raw.get("value") else {
        warn!("Business rule {} has no \"value\" field, ignoring", key);
        return;
    };

    match key {
        "tax_rate" => {
            if let Some(d) = as_decimal(v) {
                rules.tax_rate = d;
            }
        }
        "service_fee" => {
            if let Some(d) = as_decimal(v) {
                rules.service_fee = d;
            }
        }
        "otp_ttl_seconds" => {
            if let Some(u) = v.as_u64() {
                rules.otp_ttl_seconds = u;
            }
        }
        "flow_ttl_seconds" => {
            if let Some(u) = v.as_u64() {
                rules.flow_ttl_seconds = u;
            }
        }
        _ => {}
    }
}

/// Accepts `"0.12"` as well as `0.12`
fn as_decimal(v: &Value) -> Option<Decimal> {
    match v {
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rules_overlay() {
        let mut rules = BusinessRules::default();

        apply_rule(&mut rules, "tax_rate", &json!({"value": "0.07"}));
        apply_rule(&mut rules, "service_fee", &json!({"value": 30}));
        apply_rule(&mut rules, "otp_ttl_seconds", &json!({"value": 300}));
        apply_rule(&mut rules, "unknown", &json!({"value": 1}));
        apply_rule(&mut rules, "flow_ttl_seconds", &json!({"nope": 1}));

        assert_eq!(rules.tax_rate, Decimal::new(7, 2));
        assert_eq!(rules.service_fee, Decimal::from(30));
        assert_eq!(rules.otp_ttl_seconds, 300);
        assert_eq!(rules.flow_ttl_seconds, 1800);
    }
}
