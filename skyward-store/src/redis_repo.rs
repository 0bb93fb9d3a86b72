use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use skyward_core::clock::Clock;
use skyward_core::identity::{FlowKind, FlowToken};
use skyward_core::repository::FlowStore;
use skyward_core::{CoreError, CoreResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::internal;

/// Flow tokens as Redis hashes under `flow:{token}`, expired by Redis itself.
#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
    clock: Arc<dyn Clock>,
}

impl RedisClient {
    pub fn new(connection_string: &str, clock: Arc<dyn Clock>) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client, clock })
    }

    async fn connection(&self) -> CoreResult<redis::aio::MultiplexedConnection> {
        self.client.get_multiplexed_async_connection().await.map_err(internal)
    }
}

fn flow_key(token: &str) -> String {
    format!("flow:{}", token)
}

fn to_fields(flow: &FlowToken) -> Vec<(&'static str, String)> {
    vec![
        ("kind", flow.kind.as_str().to_string()),
        ("subject", flow.subject.clone()),
        ("payload", flow.payload.to_string()),
        ("expires_at", flow.expires_at.to_rfc3339()),
    ]
}

fn from_fields(token: &str, mut fields: HashMap<String, String>) -> CoreResult<FlowToken> {
    let mut take = |name: &str| {
        fields
            .remove(name)
            .ok_or_else(|| CoreError::InternalError(format!("Flow {} is missing field {}", token, name)))
    };

    let kind: FlowKind = take("kind")?.parse()?;
    let subject = take("subject")?;
    let payload: serde_json::Value = serde_json::from_str(&take("payload")?).map_err(internal)?;
    let expires_at = DateTime::parse_from_rfc3339(&take("expires_at")?)
        .map_err(internal)?
        .with_timezone(&Utc);

    Ok(FlowToken {
        token: token.to_string(),
        kind,
        subject,
        payload,
        expires_at,
    })
}

#[async_trait]
impl FlowStore for RedisClient {
    async fn put_flow(&self, flow: &FlowToken) -> CoreResult<()> {
        let ttl = (flow.expires_at - self.clock.now()).num_seconds().max(1);
        let key = flow_key(&flow.token);
        let mut conn = self.connection().await?;

        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(&key, &to_fields(flow))
            .ignore()
            .expire(&key, ttl)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(internal)?;

        debug!("Flow {} stored ({}s)", flow.kind.as_str(), ttl);
        Ok(())
    }

    async fn get_flow(&self, token: &str) -> CoreResult<Option<FlowToken>> {
        let mut conn = self.connection().await?;
        let fields: HashMap<String, String> = conn.hgetall(flow_key(token)).await.map_err(internal)?;

        if fields.is_empty() {
            return Ok(None);
        }

        let flow = from_fields(token, fields)?;
        // Redis TTLs are second-granular; the stored expiry is authoritative
        if flow.is_expired(self.clock.now()) {
            return Ok(None);
        }
        Ok(Some(flow))
    }

    async fn remove_flow(&self, token: &str) -> CoreResult<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.del(flow_key(token)).await.map_err(internal)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_fields_round_trip() {
        let flow = FlowToken::new(
            FlowKind::PassengerDraft,
            "K3M9QZ".to_string(),
            serde_json::json!([{"first_name": "Ana"}]),
            Utc::now() + Duration::minutes(30),
        );

        let fields: HashMap<String, String> =
            to_fields(&flow).into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        let restored = from_fields(&flow.token, fields).unwrap();

        assert_eq!(restored.kind, FlowKind::PassengerDraft);
        assert_eq!(restored.subject, "K3M9QZ");
        assert_eq!(restored.payload[0]["first_name"], "Ana");
    }

    #[test]
    fn test_missing_field_is_internal_error() {
        let result = from_fields("abc", HashMap::new());
        assert!(matches!(result, Err(CoreError::InternalError(_))));
    }
}
