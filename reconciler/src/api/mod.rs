// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

mod error;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::Router;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Json, Path, Query, State};
use axum::routing::{get, post};
use promo_core::chain::ChainId;
use promo_core::promotion::{PromoDuration, PromotionKind, Tier};
use promo_core::records::ActivatedPromotion;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::reconciliation::{
    AutoDetectRequest, InstructionRequest, ReconcileError, Reconciled, Reconciler,
    ReconciliationResult,
};

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub reconciler: Reconciler,
}

#[derive(Debug, Deserialize)]
struct InstructionsRequest {
    user_id: String,
    target: String,
    kind: String,
    #[serde(default)]
    duration_hours: Option<u32>,
    #[serde(default)]
    duration_days: Option<u32>,
    #[serde(default)]
    tier: Option<String>,
    chain: String,
}

#[derive(Debug, Serialize)]
struct InstructionsResponse {
    ok: bool,
    pending_payment_id: i64,
    chain: ChainId,
    recipient_address: String,
    // Base units as a decimal string; wei amounts overflow JSON numbers.
    amount: String,
    human_readable_amount: String,
    expires_at_ms: u64,
}

#[derive(Debug, Deserialize)]
struct ValidateRequest {
    user_id: String,
    tx_id: String,
}

#[derive(Debug, Deserialize)]
struct ProcessRequest {
    tx_id: String,
}

#[derive(Debug, Deserialize)]
struct AutoRequest {
    user_id: String,
    target: String,
    kind: String,
    #[serde(default)]
    tier: Option<String>,
    tx_id: String,
}

#[derive(Debug, Deserialize)]
struct ActiveQuery {
    target: String,
    #[serde(default)]
    kind: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReconciledResponse {
    ok: bool,
    status: &'static str,
    tx_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pending_payment_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    promotion: Option<PromotionView>,
}

#[derive(Debug, Serialize)]
struct PromotionView {
    id: i64,
    user_id: String,
    target: String,
    kind: PromotionKind,
    tier: Tier,
    chain: ChainId,
    amount: String,
    human_readable_amount: String,
    start_time_ms: u64,
    end_time_ms: u64,
    source_tx_id: String,
}

#[derive(Debug, Serialize)]
struct ActiveResponse {
    ok: bool,
    promotions: Vec<PromotionView>,
}

pub fn router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/payments/instructions", post(create_instructions))
        .route("/payments/validate", post(validate_transaction))
        .route("/payments/auto", post(auto_detect_payment))
        .route("/payments/{id}/process", post(process_payment))
        .route("/promotions/active", get(active_promotions))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
}

async fn create_instructions(
    State(state): State<Arc<AppState>>,
    req: Result<Json<InstructionsRequest>, JsonRejection>,
) -> Result<Json<InstructionsResponse>, ApiError> {
    let Json(req) = req.map_err(|err| ApiError::bad_request(format!("invalid JSON: {err}")))?;

    let chain = ChainId::parse(&req.chain).map_err(|err| ApiError::bad_request(err.to_string()))?;
    let kind = parse_kind(&req.kind)?;
    let tier = parse_tier(req.tier.as_deref())?;
    let duration = match (req.duration_hours, req.duration_days) {
        (Some(hours), None) => PromoDuration::hours(hours),
        (None, Some(days)) => PromoDuration::checked_days(days).ok_or_else(|| {
            ApiError::bad_request(format!("duration_days {days} is out of range"))
        })?,
        _ => {
            return Err(ApiError::bad_request(
                "exactly one of duration_hours or duration_days is required",
            ));
        }
    };

    let instructions = state
        .reconciler
        .generate_instructions(InstructionRequest {
            user_id: req.user_id,
            target: req.target,
            kind,
            duration,
            tier,
            chain,
        })
        .await?;

    Ok(Json(InstructionsResponse {
        ok: true,
        pending_payment_id: instructions.pending_payment_id,
        chain: instructions.chain,
        recipient_address: instructions.recipient_address,
        amount: instructions.amount.base_units.to_string(),
        human_readable_amount: instructions.human_readable_amount,
        expires_at_ms: unix_ms(instructions.expires_at),
    }))
}

async fn validate_transaction(
    State(state): State<Arc<AppState>>,
    req: Result<Json<ValidateRequest>, JsonRejection>,
) -> Result<Json<ReconciledResponse>, ApiError> {
    let Json(req) = req.map_err(|err| ApiError::bad_request(format!("invalid JSON: {err}")))?;
    if req.user_id.trim().is_empty() {
        return Err(ApiError::bad_request("user_id must not be empty"));
    }
    let result = state
        .reconciler
        .validate_user_transaction(&req.user_id, &req.tx_id)
        .await;
    reconciliation_response(result)
}

async fn process_payment(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
    req: Result<Json<ProcessRequest>, JsonRejection>,
) -> Result<Json<ReconciledResponse>, ApiError> {
    let Path(id) = id.map_err(|err| ApiError::bad_request(format!("invalid path: {err}")))?;
    let Json(req) = req.map_err(|err| ApiError::bad_request(format!("invalid JSON: {err}")))?;
    let result = state
        .reconciler
        .process_directed_payment(id, &req.tx_id)
        .await;
    reconciliation_response(result)
}

async fn auto_detect_payment(
    State(state): State<Arc<AppState>>,
    req: Result<Json<AutoRequest>, JsonRejection>,
) -> Result<Json<ReconciledResponse>, ApiError> {
    let Json(req) = req.map_err(|err| ApiError::bad_request(format!("invalid JSON: {err}")))?;
    let kind = parse_kind(&req.kind)?;
    let tier = parse_tier(req.tier.as_deref())?;
    let result = state
        .reconciler
        .process_auto_detected_payment(AutoDetectRequest {
            user_id: req.user_id,
            target: req.target,
            kind,
            tier,
            tx_id: req.tx_id,
        })
        .await;
    reconciliation_response(result)
}

async fn active_promotions(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ActiveQuery>, QueryRejection>,
) -> Result<Json<ActiveResponse>, ApiError> {
    let Query(query) =
        query.map_err(|err| ApiError::bad_request(format!("invalid query: {err}")))?;
    let kind = query.kind.as_deref().map(parse_kind).transpose()?;
    let promotions = state
        .reconciler
        .active_promotions(&query.target, kind)
        .await?;
    Ok(Json(ActiveResponse {
        ok: true,
        promotions: promotions.iter().map(promotion_view).collect(),
    }))
}

/// A repeat submission by the user who was already credited is a benign success.
fn reconciliation_response(
    result: ReconciliationResult,
) -> Result<Json<ReconciledResponse>, ApiError> {
    match result {
        Ok(Reconciled {
            chain_qualified_tx_id,
            pending_payment_id,
            duration,
            promotion,
        }) => Ok(Json(ReconciledResponse {
            ok: true,
            status: "credited",
            tx_key: chain_qualified_tx_id,
            pending_payment_id,
            duration: Some(duration.to_string()),
            promotion: Some(promotion_view(&promotion)),
        })),
        Err(ReconcileError::AlreadyProcessed {
            key,
            credited_to_caller: true,
        }) => Ok(Json(ReconciledResponse {
            ok: true,
            status: "already_credited",
            tx_key: key,
            pending_payment_id: None,
            duration: None,
            promotion: None,
        })),
        Err(err) => Err(err.into()),
    }
}

fn promotion_view(promotion: &ActivatedPromotion) -> PromotionView {
    PromotionView {
        id: promotion.id,
        user_id: promotion.user_id.clone(),
        target: promotion.target.clone(),
        kind: promotion.kind,
        tier: promotion.tier,
        chain: promotion.amount.chain,
        amount: promotion.amount.base_units.to_string(),
        human_readable_amount: promotion.amount.to_string(),
        start_time_ms: unix_ms(promotion.start_time),
        end_time_ms: unix_ms(promotion.end_time),
        source_tx_id: promotion.source_tx_id.clone(),
    }
}

fn parse_kind(value: &str) -> Result<PromotionKind, ApiError> {
    value
        .parse()
        .map_err(|err: promo_core::promotion::PromotionError| ApiError::bad_request(err.to_string()))
}

fn parse_tier(value: Option<&str>) -> Result<Tier, ApiError> {
    value
        .map(str::parse::<Tier>)
        .transpose()
        .map(Option::unwrap_or_default)
        .map_err(|err| ApiError::bad_request(err.to_string()))
}

fn unix_ms(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
