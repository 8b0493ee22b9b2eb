use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use geoproof_core::{decode_hex, GeoCell, PublicInputs};
use geoproof_ledger::SubmissionRecord;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::RelayError;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelRequest {
    /// Hex-encoded prover identity
    pub prover_id: String,
    pub proof_hex: Option<String>,
    pub public_inputs_hex: Option<String>,
    pub geohash7: String,
    pub review: ReviewBody,
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewBody {
    pub categories: Vec<String>,
    pub rating: i64,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct LabelQuery {
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellCenter {
    pub lat: f64,
    pub lon: f64,
}

/// Wire form of a stored record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelView {
    pub prover_id: String,
    pub geohash7: String,
    pub categories: BTreeSet<String>,
    pub rating: u8,
    pub text: String,
    pub timestamp: i64,
    pub expires_at: Option<i64>,
    pub proof_hex: Option<String>,
    pub public_inputs_hex: Option<String>,
    pub center: CellCenter,
}

impl From<SubmissionRecord> for LabelView {
    fn from(record: SubmissionRecord) -> Self {
        let center = record.geo_cell.bounds().center();
        LabelView {
            prover_id: hex::encode(&record.prover_id),
            geohash7: record.geo_cell.as_str().to_string(),
            categories: record.categories,
            rating: record.rating,
            text: record.text,
            timestamp: record.timestamp_unix,
            expires_at: record.expires_at_unix,
            proof_hex: record.proof_bytes.map(|b| format!("0x{}", hex::encode(b))),
            public_inputs_hex: record
                .public_input_bytes
                .map(|b| format!("0x{}", hex::encode(b))),
            center: CellCenter {
                lat: center.latitude,
                lon: center.longitude,
            },
        }
    }
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Result<Json<Value>, StatusCode> {
    let records = state
        .ledger
        .lock()
        .await
        .len()
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    Ok(Json(json!({
        "status": "healthy",
        "service": "geoproof-relay",
        "records": records,
        "startedAt": state.started_at.to_rfc3339(),
        "timestamp": Utc::now().to_rfc3339()
    })))
}

pub async fn submit_label(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LabelRequest>, JsonRejection>,
) -> Result<Json<Value>, RelayError> {
    let Json(request) = payload.map_err(|e| RelayError::MalformedRequest(e.body_text()))?;
    let record = build_record(request, state.config.ledger.geo_cell_precision)?;
    let geo_cell = record.geo_cell.clone();

    let receipt = state.ledger.lock().await.submit(record)?;

    info!(
        id = receipt.id,
        geo_cell = %geo_cell,
        superseded = receipt.superseded,
        proof_backed = receipt.public_input_hash.is_some(),
        "Label accepted"
    );

    Ok(Json(json!({
        "status": "accepted",
        "id": receipt.id,
        "geohash7": geo_cell.as_str(),
        "superseded": receipt.superseded,
        "publicInputHash": receipt.public_input_hash.map(|h| h.to_hex()),
    })))
}

pub async fn list_labels(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LabelQuery>,
) -> Result<Json<Value>, RelayError> {
    let prefix = query.prefix.as_deref().filter(|p| !p.is_empty());
    let records = state.ledger.lock().await.query(prefix)?;
    debug!(prefix = ?prefix, count = records.len(), "Labels listed");

    let data: Vec<LabelView> = records.into_iter().map(LabelView::from).collect();
    Ok(Json(json!({ "data": data })))
}

/// Turn a request into a record, checking the claimed cell against the
/// public inputs when they are present.
fn build_record(request: LabelRequest, precision: usize) -> Result<SubmissionRecord, RelayError> {
    let prover_id =
        decode_hex(&request.prover_id).map_err(|e| RelayError::invalid("proverId", e))?;
    let geo_cell = GeoCell::parse(&request.geohash7, precision)
        .map_err(|e| RelayError::invalid("geohash7", e))?;

    let proof_bytes = request
        .proof_hex
        .as_deref()
        .map(decode_hex)
        .transpose()
        .map_err(|e| RelayError::invalid("proofHex", e))?;
    let public_input_bytes = request
        .public_inputs_hex
        .as_deref()
        .map(decode_hex)
        .transpose()
        .map_err(|e| RelayError::invalid("publicInputsHex", e))?;

    if let Some(bytes) = &public_input_bytes {
        let inputs =
            PublicInputs::decode(bytes).map_err(|e| RelayError::invalid("publicInputsHex", e))?;
        let derived = GeoCell::from_public_inputs(&inputs, precision)
            .map_err(|e| RelayError::invalid("publicInputsHex", e))?;
        if derived != geo_cell {
            return Err(RelayError::GeohashMismatch {
                claimed: geo_cell.as_str().to_string(),
                derived: derived.as_str().to_string(),
            });
        }
    }

    let rating = u8::try_from(request.review.rating).map_err(|_| {
        RelayError::invalid("rating", format!("{} out of range", request.review.rating))
    })?;

    Ok(SubmissionRecord {
        prover_id,
        geo_cell,
        categories: request.review.categories.into_iter().collect(),
        rating,
        text: request.review.text,
        timestamp_unix: Utc::now().timestamp(),
        proof_bytes,
        public_input_bytes,
        expires_at_unix: request.expires_at,
    })
}
