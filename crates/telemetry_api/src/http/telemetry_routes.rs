//! `/v1/telemetry` routes
//!
//! Query parameters arrive as raw strings and are parsed here so that every
//! malformed parameter produces a 400 naming the parameter.

use crate::domain::{
    IngestionMetricsSnapshot, QueryAggregatesInput, QueryReadingsInput, TelemetryBatchRequest,
};
use crate::http::{ApiError, ApiResult, AppState};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use common::domain::{Aggregate, AggregateWindow, RawReading};
use serde::{Deserialize, Serialize};

pub fn telemetry_routes() -> Router<AppState> {
    Router::new()
        .route("/readings", get(query_readings).post(ingest_readings))
        .route("/aggregates", get(query_aggregates))
        .route("/metrics", get(ingestion_metrics))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub ingested_count: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReadingsQueryParams {
    pub tenant_id: Option<String>,
    pub device_id: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AggregatesQueryParams {
    pub tenant_id: Option<String>,
    pub window: Option<String>,
    pub device_id: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadingResponse {
    pub id: String,
    pub tenant_id: String,
    pub farm_id: Option<String>,
    pub barn_id: Option<String>,
    pub device_id: String,
    pub metric_type: String,
    pub metric_value: f64,
    pub unit: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
}

impl From<RawReading> for ReadingResponse {
    fn from(r: RawReading) -> Self {
        Self {
            id: r.id,
            tenant_id: r.tenant_id,
            farm_id: r.farm_id,
            barn_id: r.barn_id,
            device_id: r.device_id,
            metric_type: r.metric_type,
            metric_value: r.metric_value,
            unit: r.unit,
            occurred_at: r.occurred_at,
            ingested_at: r.ingested_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadingsResponse {
    pub readings: Vec<ReadingResponse>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AggregateResponse {
    pub id: String,
    pub tenant_id: String,
    pub device_id: String,
    pub window: String,
    pub bucket_start_at: DateTime<Utc>,
    pub bucket_end_at: DateTime<Utc>,
    pub metric_type: String,
    pub avg_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub count: i64,
}

impl From<Aggregate> for AggregateResponse {
    fn from(a: Aggregate) -> Self {
        Self {
            id: a.id,
            tenant_id: a.tenant_id,
            device_id: a.device_id,
            window: a.window.as_str().to_string(),
            bucket_start_at: a.bucket_start_at,
            bucket_end_at: a.bucket_end_at,
            metric_type: a.metric_type,
            avg_value: a.avg_value,
            min_value: a.min_value,
            max_value: a.max_value,
            count: a.count,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AggregatesResponse {
    pub aggregates: Vec<AggregateResponse>,
    pub count: usize,
}

async fn ingest_readings(
    State(state): State<AppState>,
    body: Result<Json<TelemetryBatchRequest>, JsonRejection>,
) -> ApiResult<Json<IngestResponse>> {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            state.metrics.record_rejected_batch();
            return Err(rejection.into());
        }
    };

    let result = state.ingestion_service.ingest_batch(request).await?;

    Ok(Json(IngestResponse {
        ingested_count: result.ingested_count,
    }))
}

async fn query_readings(
    State(state): State<AppState>,
    params: Result<Query<ReadingsQueryParams>, QueryRejection>,
) -> ApiResult<Json<ReadingsResponse>> {
    let Query(params) = params?;

    let input = QueryReadingsInput {
        tenant_id: required(params.tenant_id, "tenant_id")?,
        device_id: params.device_id,
        start_time: parse_instant(params.start_time, "start_time")?,
        end_time: parse_instant(params.end_time, "end_time")?,
        limit: parse_limit(params.limit)?,
    };

    let readings = state.query_service.query_readings(input).await?;
    let readings: Vec<ReadingResponse> = readings.into_iter().map(Into::into).collect();

    Ok(Json(ReadingsResponse {
        count: readings.len(),
        readings,
    }))
}

async fn query_aggregates(
    State(state): State<AppState>,
    params: Result<Query<AggregatesQueryParams>, QueryRejection>,
) -> ApiResult<Json<AggregatesResponse>> {
    let Query(params) = params?;

    let window: AggregateWindow = required(params.window, "window")?.parse()?;
    let input = QueryAggregatesInput {
        tenant_id: required(params.tenant_id, "tenant_id")?,
        window,
        device_id: params.device_id,
        start_time: parse_instant(params.start_time, "start_time")?,
        end_time: parse_instant(params.end_time, "end_time")?,
        limit: parse_limit(params.limit)?,
    };

    let aggregates = state.query_service.query_aggregates(input).await?;
    let aggregates: Vec<AggregateResponse> = aggregates.into_iter().map(Into::into).collect();

    Ok(Json(AggregatesResponse {
        count: aggregates.len(),
        aggregates,
    }))
}

async fn ingestion_metrics(State(state): State<AppState>) -> Json<IngestionMetricsSnapshot> {
    Json(state.metrics.snapshot())
}

fn required(value: Option<String>, name: &str) -> ApiResult<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ApiError::bad_request(format!("{} is required", name))),
    }
}

fn parse_instant(value: Option<String>, name: &str) -> ApiResult<Option<DateTime<Utc>>> {
    value
        .map(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|_| {
                    ApiError::bad_request(format!("{} '{}' is not an ISO-8601 instant", name, raw))
                })
        })
        .transpose()
}

fn parse_limit(value: Option<String>) -> ApiResult<Option<u32>> {
    value
        .map(|raw| {
            raw.parse::<u32>()
                .map_err(|_| ApiError::bad_request(format!("limit '{}' is not a positive integer", raw)))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_instant() {
        assert!(parse_instant(None, "start_time").unwrap().is_none());
        assert!(parse_instant(Some("2025-01-01T00:00:00Z".to_string()), "start_time")
            .unwrap()
            .is_some());
        let err = parse_instant(Some("yesterday".to_string()), "start_time").unwrap_err();
        assert!(err.to_string().contains("start_time"));
    }

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit(Some("25".to_string())).unwrap(), Some(25));
        assert!(parse_limit(Some("-1".to_string())).is_err());
        assert!(parse_limit(Some("ten".to_string())).is_err());
    }

    #[test]
    fn test_required_rejects_empty() {
        assert!(required(Some(String::new()), "tenant_id").is_err());
        assert!(required(None, "tenant_id").is_err());
        assert_eq!(required(Some("t1".to_string()), "tenant_id").unwrap(), "t1");
    }
}
