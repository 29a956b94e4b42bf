//! Wire shape of inbound telemetry batches and the structural gate in front of persistence.
//!
//! The request structs are deliberately loose (every field optional) so that a
//! malformed batch yields one validation report listing every offending field,
//! instead of failing on the first missing key during deserialization.
//! Everything past [`validate_batch`] works on [`ValidatedEvent`].

use chrono::{DateTime, Utc};
use common::domain::{DomainError, DomainResult};
use garde::Validate;
use serde::Deserialize;

/// Body of `POST /v1/telemetry/readings`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TelemetryBatchRequest {
    #[garde(length(min = 1), dive)]
    pub events: Vec<TelemetryEventRequest>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEventRequest {
    #[garde(required, length(min = 1))]
    pub event_id: Option<String>,
    #[garde(skip)]
    pub trace_id: Option<String>,
    #[garde(required, length(min = 1))]
    pub tenant_id: Option<String>,
    #[garde(required, length(min = 1))]
    pub device_id: Option<String>,
    #[garde(required, length(min = 1))]
    pub event_type: Option<String>,
    #[serde(alias = "ts")]
    #[garde(required, custom(parseable_instant))]
    pub timestamp: Option<String>,
    #[garde(skip)]
    pub farm_id: Option<String>,
    #[garde(skip)]
    pub barn_id: Option<String>,
    #[garde(required, dive)]
    pub payload: Option<EventPayloadRequest>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EventPayloadRequest {
    #[garde(skip)]
    pub metric: Option<String>,
    #[garde(required, custom(number_or_string))]
    pub value: Option<serde_json::Value>,
    #[garde(skip)]
    pub unit: Option<String>,
}

fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn parseable_instant(value: &Option<String>, _ctx: &()) -> garde::Result {
    match value {
        Some(raw) if parse_instant(raw).is_none() => Err(garde::Error::new(
            "must be an RFC 3339 / ISO-8601 instant",
        )),
        _ => Ok(()),
    }
}

fn number_or_string(value: &Option<serde_json::Value>, _ctx: &()) -> garde::Result {
    match value {
        None | Some(serde_json::Value::Number(_)) | Some(serde_json::Value::String(_)) => Ok(()),
        Some(_) => Err(garde::Error::new("must be a number or a numeric string")),
    }
}

/// Metric value as it arrived on the wire
///
/// Strings pass the structural gate; whether they hold a usable decimal is
/// decided per event so one bad value cannot sink the batch.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl MetricValue {
    /// The value as a finite decimal, if it has one
    pub fn to_decimal(&self) -> Option<f64> {
        let value = match self {
            MetricValue::Number(n) => *n,
            MetricValue::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }

    fn raw(&self) -> String {
        match self {
            MetricValue::Number(n) => n.to_string(),
            MetricValue::Text(s) => s.clone(),
        }
    }
}

/// Reading carried by an event
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingPayload {
    pub metric: Option<String>,
    pub value: MetricValue,
    pub unit: Option<String>,
}

/// An event that passed structural validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedEvent {
    pub event_id: String,
    pub trace_id: Option<String>,
    pub tenant_id: String,
    pub farm_id: Option<String>,
    pub barn_id: Option<String>,
    pub device_id: String,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub reading: ReadingPayload,
}

impl ValidatedEvent {
    /// `payload.metric` when present, otherwise the event type
    pub fn metric_type(&self) -> &str {
        self.reading
            .metric
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.event_type)
    }

    /// Decimal metric value, or `InvalidMetricValue` for this event
    pub fn metric_value(&self) -> DomainResult<f64> {
        self.reading
            .value
            .to_decimal()
            .ok_or_else(|| DomainError::InvalidMetricValue {
                event_id: self.event_id.clone(),
                value: self.reading.value.raw(),
            })
    }
}

fn missing(field: &str) -> DomainError {
    DomainError::ValidationError(vec![format!("{}: value is missing", field)])
}

impl TryFrom<TelemetryEventRequest> for ValidatedEvent {
    type Error = DomainError;

    fn try_from(request: TelemetryEventRequest) -> Result<Self, Self::Error> {
        let payload = request.payload.ok_or_else(|| missing("payload"))?;
        let value = match payload.value.ok_or_else(|| missing("payload.value"))? {
            serde_json::Value::Number(n) => MetricValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => MetricValue::Text(s),
            other => MetricValue::Text(other.to_string()),
        };
        let timestamp = request.timestamp.ok_or_else(|| missing("timestamp"))?;
        let occurred_at = parse_instant(&timestamp).ok_or_else(|| {
            DomainError::ValidationError(vec![format!(
                "timestamp: '{}' is not a valid instant",
                timestamp
            )])
        })?;

        Ok(ValidatedEvent {
            event_id: request.event_id.ok_or_else(|| missing("event_id"))?,
            trace_id: request.trace_id,
            tenant_id: request.tenant_id.ok_or_else(|| missing("tenant_id"))?,
            farm_id: request.farm_id,
            barn_id: request.barn_id,
            device_id: request.device_id.ok_or_else(|| missing("device_id"))?,
            event_type: request.event_type.ok_or_else(|| missing("event_type"))?,
            occurred_at,
            reading: ReadingPayload {
                metric: payload.metric,
                value,
                unit: payload.unit,
            },
        })
    }
}

/// Validate a whole batch before anything is persisted
///
/// Fails with every offending field path if any event is malformed, or if the
/// batch exceeds `max_batch_size`.
pub fn validate_batch(
    request: TelemetryBatchRequest,
    max_batch_size: usize,
) -> DomainResult<Vec<ValidatedEvent>> {
    if request.events.len() > max_batch_size {
        return Err(DomainError::ValidationError(vec![format!(
            "events: batch of {} exceeds the maximum of {}",
            request.events.len(),
            max_batch_size
        )]));
    }

    common::garde::validate_wire_struct(&request)?;

    request
        .events
        .into_iter()
        .map(ValidatedEvent::try_from)
        .collect()
}
