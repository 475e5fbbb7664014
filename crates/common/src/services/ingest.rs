//! Event ingestion service
//!
//! Handles the collector workflow:
//! 1. Resolve the write key to an app
//! 2. Apply the app's per-second limit
//! 3. Parse, hash and validate the body
//! 4. Persist the event with a server-assigned timestamp

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::analytics::revenue::DEFAULT_CURRENCY;
use crate::auth::WriteKeyAuthenticator;
use crate::config::IngestConfig;
use crate::db::models::EventType;
use crate::db::{AnalyticsStore, NewEvent};
use crate::errors::{AppError, Result};
use crate::hashing::{is_hash, HashedIdentity};
use crate::metrics::{record_event_ingested, record_ingest_rejection};
use crate::ratelimit::WriteKeyLimiter;

/// Response body for an accepted event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReceipt {
    pub success: bool,
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

pub struct IngestService {
    store: Arc<dyn AnalyticsStore>,
    authenticator: WriteKeyAuthenticator,
    limiter: Arc<WriteKeyLimiter>,
    max_body_bytes: usize,
}

impl IngestService {
    pub fn new(
        store: Arc<dyn AnalyticsStore>,
        limiter: Arc<WriteKeyLimiter>,
        config: &IngestConfig,
    ) -> Self {
        Self {
            authenticator: WriteKeyAuthenticator::new(store.clone()),
            store,
            limiter,
            max_body_bytes: config.max_body_bytes,
        }
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Run the full pipeline for one request body
    pub async fn ingest(
        &self,
        write_key: Option<&str>,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<IngestReceipt> {
        let start = Instant::now();

        let result = self.run(write_key, body, now).await;

        match &result {
            Ok(receipt) => {
                tracing::debug!(
                    event_id = %receipt.event_id,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Event ingested"
                );
            }
            Err(e) => record_ingest_rejection(rejection_reason(e)),
        }

        result
    }

    async fn run(
        &self,
        write_key: Option<&str>,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<IngestReceipt> {
        let projection = self.authenticator.authenticate(write_key).await?;
        let app = &projection.app;

        self.limiter
            .check_at(app.id, app.rate_limit(), now.timestamp().max(0) as u64)
            .await?;

        if body.len() > self.max_body_bytes {
            return Err(AppError::PayloadTooLarge {
                size: body.len(),
                limit: self.max_body_bytes,
            });
        }

        let event = parse_event(app.id, body, now)?;
        let kind = event.event_type;

        let stored = self.store.insert_event(event).await?;
        record_event_ingested(kind.as_str());

        Ok(IngestReceipt {
            success: true,
            event_id: stored.id,
            timestamp: stored.timestamp_utc(),
        })
    }
}

fn rejection_reason(error: &AppError) -> &'static str {
    match error {
        AppError::Unauthorized { .. } | AppError::InvalidWriteKey => "auth",
        AppError::RateLimited { .. } => "rate_limited",
        AppError::Validation { .. } | AppError::PayloadTooLarge { .. } => "validation",
        _ => "storage",
    }
}

/// Collector body. Every field is optional at the type level so a value of
/// the wrong JSON type can be traced back to its key.
#[derive(Debug, Default, Deserialize, Validate)]
struct EventPayload {
    #[validate(
        required(message = "event is required"),
        custom(function = "validate_event_type")
    )]
    event: Option<String>,

    #[validate(length(max = 200, message = "name must be at most 200 characters"))]
    name: Option<String>,

    properties: Option<Map<String, Value>>,

    prompt: Option<String>,

    #[validate(custom(function = "validate_hash"))]
    prompt_hash: Option<String>,

    user_id: Option<String>,

    #[validate(custom(function = "validate_hash"))]
    user_hash: Option<String>,

    #[validate(length(max = 2000, message = "error_message must be at most 2000 characters"))]
    error_message: Option<String>,

    #[validate(range(min = 0.0, message = "latency_ms must be a number >= 0"))]
    latency_ms: Option<f64>,

    #[validate(range(min = 0.0, message = "revenue must be a number >= 0"))]
    revenue: Option<f64>,

    #[validate(custom(function = "validate_currency"))]
    currency: Option<String>,
}

/// Reporting order when several fields fail
const FIELD_ORDER: [&str; 8] = [
    "event",
    "name",
    "prompt_hash",
    "user_hash",
    "error_message",
    "latency_ms",
    "revenue",
    "currency",
];

fn validate_event_type(value: &str) -> std::result::Result<(), ValidationError> {
    value.parse::<EventType>().map(|_| ()).map_err(|_| {
        ValidationError::new("event_type").with_message(
            "event must be one of invoked, completed, error, converted, custom".into(),
        )
    })
}

fn validate_hash(value: &str) -> std::result::Result<(), ValidationError> {
    if is_hash(value) {
        Ok(())
    } else {
        Err(ValidationError::new("hash")
            .with_message("hash must be a lowercase hex SHA-256 digest".into()))
    }
}

fn validate_currency(value: &str) -> std::result::Result<(), ValidationError> {
    let code = value.trim();
    if code.len() == 3 && code.bytes().all(|b| b.is_ascii_alphabetic()) {
        Ok(())
    } else {
        Err(ValidationError::new("currency").with_message("currency must be a 3-letter code".into()))
    }
}

/// First failing field in payload order
fn first_invalid(errors: ValidationErrors) -> AppError {
    let found = {
        let fields = errors.field_errors();
        FIELD_ORDER.iter().find_map(|field| {
            let errs = fields.get(*field)?;
            let message = errs
                .first()
                .and_then(|e| e.message.as_ref())
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("{} is invalid", field));
            Some((*field, message))
        })
    };

    match found {
        Some((field, message)) => AppError::invalid_field(field, message),
        None => errors.into(),
    }
}

/// Key whose value alone fails to deserialize
fn mistyped_field(fields: &Map<String, Value>) -> Option<&str> {
    fields
        .iter()
        .find(|(key, value)| {
            let single = Value::Object(Map::from_iter([((*key).clone(), (*value).clone())]));
            EventPayload::deserialize(&single).is_err()
        })
        .map(|(key, _)| key.as_str())
}

/// Parse and validate a collector body into an event for `app_id`.
///
/// Raw `prompt` and `user_id` values are hashed here and dropped; they never
/// leave this function. The first invalid field is reported.
pub fn parse_event(app_id: Uuid, body: &[u8], now: DateTime<Utc>) -> Result<NewEvent> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| AppError::invalid_field("body", "Body must be valid JSON"))?;

    let Value::Object(fields) = &value else {
        return Err(AppError::invalid_field("body", "Body must be a JSON object"));
    };

    let payload = EventPayload::deserialize(&value).map_err(|e| {
        let field = mistyped_field(fields).unwrap_or("body");
        AppError::invalid_field(field, format!("{} has the wrong type: {}", field, e))
    })?;
    payload.validate().map_err(first_invalid)?;

    let event_type = payload
        .event
        .as_deref()
        .and_then(|kind| kind.parse::<EventType>().ok())
        .ok_or_else(|| AppError::invalid_field("event", "event is required"))?;

    let identity = pair_identity(
        payload.prompt,
        payload.prompt_hash,
        payload.user_id,
        payload.user_hash,
    )?;

    let currency = match payload.currency {
        Some(code) => Some(code.trim().to_ascii_uppercase()),
        None => payload.revenue.map(|_| DEFAULT_CURRENCY.to_string()),
    };

    Ok(NewEvent {
        app_id,
        event_type,
        event_name: payload.name,
        properties: Value::Object(payload.properties.unwrap_or_default()),
        prompt_hash: identity.prompt_hash,
        user_hash: identity.user_hash,
        error_message: payload.error_message,
        latency_ms: payload.latency_ms.map(|ms| ms.round() as i64),
        revenue: payload.revenue,
        currency,
        timestamp: now,
    })
}

/// Hash raw identifiers or accept pre-hashed ones, never both
fn pair_identity(
    prompt: Option<String>,
    prompt_hash: Option<String>,
    user_id: Option<String>,
    user_hash: Option<String>,
) -> Result<HashedIdentity> {
    if is_present(&prompt) && prompt_hash.is_some() {
        return Err(AppError::invalid_field(
            "prompt_hash",
            "send either prompt or prompt_hash, not both",
        ));
    }
    if is_present(&user_id) && user_hash.is_some() {
        return Err(AppError::invalid_field(
            "user_hash",
            "send either user_id or user_hash, not both",
        ));
    }

    let hashed = HashedIdentity::from_raw(prompt, user_id);
    Ok(HashedIdentity {
        prompt_hash: hashed.prompt_hash.or(prompt_hash),
        user_hash: hashed.user_hash.or(user_hash),
    })
}

fn is_present(raw: &Option<String>) -> bool {
    raw.as_deref().is_some_and(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::generate_write_key;
    use crate::db::models::AppCategory;
    use crate::db::MemoryStore;
    use crate::hashing::hash_identifier;
    use crate::plans::Plan;
    use crate::ErrorCode;
    use chrono::TimeZone;
    use serde_json::json;

    struct Harness {
        store: Arc<MemoryStore>,
        service: IngestService,
        key: String,
    }

    async fn harness(rate_limit: i32) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let org = store.insert_org("Acme", Plan::Free).await;
        let key = generate_write_key();
        store
            .insert_app(org.id, "Helper", AppCategory::Productivity, &key, rate_limit)
            .await;
        let service = IngestService::new(
            store.clone(),
            Arc::new(WriteKeyLimiter::new()),
            &IngestConfig::default(),
        );
        Harness { store, service, key }
    }

    fn body(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    fn field_of(err: &AppError) -> Option<&str> {
        match err {
            AppError::Validation { field, .. } => field.as_deref(),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_raw_identifiers_are_hashed_before_storage() {
        let h = harness(100).await;
        let now = Utc::now();

        let receipt = h
            .service
            .ingest(
                Some(&h.key),
                &body(json!({
                    "event": "invoked",
                    "prompt": "Summarize my inbox",
                    "user_id": "alice@example.com",
                    "latency_ms": 41.6
                })),
                now,
            )
            .await
            .unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.timestamp, now);

        let stored = h.store.all_events().await;
        assert_eq!(stored.len(), 1);
        let event = &stored[0];
        assert_eq!(event.prompt_hash.as_deref(), Some(hash_identifier("Summarize my inbox").as_str()));
        assert_eq!(event.user_hash.as_deref(), Some(hash_identifier("alice@example.com").as_str()));
        assert_eq!(event.latency_ms, Some(42));

        let serialized = serde_json::to_string(event).unwrap();
        assert!(!serialized.contains("Summarize"));
        assert!(!serialized.contains("alice"));
    }

    #[tokio::test]
    async fn test_auth_runs_before_validation() {
        let h = harness(100).await;
        let err = h
            .service
            .ingest(Some("gk_bad"), b"not json", Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidWriteKey);

        let err = h.service.ingest(None, b"{}", Utc::now()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unauthenticated);
        assert!(h.store.all_events().await.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_applies_per_app() {
        let h = harness(2).await;
        let payload = body(json!({"event": "custom"}));
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap();

        for _ in 0..2 {
            h.service.ingest(Some(&h.key), &payload, now).await.unwrap();
        }
        let err = h.service.ingest(Some(&h.key), &payload, now).await.unwrap_err();
        assert!(matches!(err, AppError::RateLimited { limit: 2 }));
        assert_eq!(err.code(), ErrorCode::RateLimitExceeded);
        assert_eq!(h.store.all_events().await.len(), 2);

        // The next second opens a fresh window
        let later = now + chrono::Duration::seconds(1);
        h.service.ingest(Some(&h.key), &payload, later).await.unwrap();
    }

    #[test]
    fn test_wrong_json_type_names_its_field() {
        let app = Uuid::new_v4();
        let err = parse_event(app, &body(json!({"event": "invoked", "name": 7})), Utc::now())
            .unwrap_err();
        assert_eq!(field_of(&err), Some("name"));

        let err = parse_event(app, &body(json!({"event": ["invoked"]})), Utc::now()).unwrap_err();
        assert_eq!(field_of(&err), Some("event"));
    }

    #[test]
    fn test_validation_reports_first_bad_field() {
        let app = Uuid::new_v4();
        let now = Utc::now();
        let cases = vec![
            (json!([1, 2]), "body"),
            (json!({}), "event"),
            (json!({"event": "clicked"}), "event"),
            (json!({"event": "invoked", "name": "x".repeat(201)}), "name"),
            (json!({"event": "invoked", "properties": [1]}), "properties"),
            (json!({"event": "invoked", "prompt": "a", "prompt_hash": "0".repeat(64)}), "prompt_hash"),
            (json!({"event": "invoked", "user_hash": "not-a-hash"}), "user_hash"),
            (json!({"event": "invoked", "user_id": "u", "user_hash": "a".repeat(64)}), "user_hash"),
            (json!({"event": "error", "error_message": "e".repeat(2001)}), "error_message"),
            (json!({"event": "invoked", "latency_ms": -1}), "latency_ms"),
            (json!({"event": "converted", "revenue": "9.99"}), "revenue"),
            (json!({"event": "converted", "revenue": 5, "currency": "EURO"}), "currency"),
        ];

        for (payload, field) in cases {
            let err = parse_event(app, &body(payload.clone()), now).unwrap_err();
            assert_eq!(field_of(&err), Some(field), "payload: {}", payload);
            assert_eq!(err.code(), ErrorCode::ValidationError);
        }
    }

    #[test]
    fn test_currency_defaults_only_with_revenue() {
        let app = Uuid::new_v4();
        let now = Utc::now();

        let paid = parse_event(app, &body(json!({"event": "converted", "revenue": 9.5})), now).unwrap();
        assert_eq!(paid.currency.as_deref(), Some(DEFAULT_CURRENCY));

        let eur = parse_event(
            app,
            &body(json!({"event": "converted", "revenue": 3, "currency": "eur"})),
            now,
        )
        .unwrap();
        assert_eq!(eur.currency.as_deref(), Some("EUR"));

        let plain = parse_event(app, &body(json!({"event": "completed"})), now).unwrap();
        assert_eq!(plain.currency, None);
        assert_eq!(plain.properties, json!({}));
    }

    #[test]
    fn test_prehashed_identifiers_pass_through() {
        let hash = hash_identifier("user-9");
        let event = parse_event(
            Uuid::new_v4(),
            &body(json!({"event": "invoked", "user_hash": hash, "properties": {"source": "web"}})),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(event.user_hash.as_deref(), Some(hash.as_str()));
        assert_eq!(event.properties["source"], "web");
    }
}
