use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use super::referrals::{self, ReferralRequest};
use super::ReferralError;
use crate::commands::{referral_link, Command};
use crate::models::referrals::{ChatCommand, NewRedemption, NewReferral};

#[derive(Clone)]
struct AppState {
    referral_channel: mpsc::Sender<ReferralRequest>,
    invite_link: String,
}

fn error_response(error: ReferralError) -> (StatusCode, Json<Value>) {
    let status = match &error {
        ReferralError::NotFound | ReferralError::CodeNotFound => StatusCode::NOT_FOUND,
        ReferralError::SelfReferral => StatusCode::FORBIDDEN,
        ReferralError::AlreadyRedeemed => StatusCode::CONFLICT,
        ReferralError::MissingIdentity | ReferralError::MissingCode => StatusCode::BAD_REQUEST,
        ReferralError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ReferralError::GenerationExhausted(_) | ReferralError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (
        status,
        Json(json!({
            "error": error.kind(),
            "description": error.to_string(),
        })),
    )
}

async fn create_referral(
    State(state): State<AppState>,
    Json(req): Json<NewReferral>,
) -> impl IntoResponse {
    let result = referrals::request(&state.referral_channel, |response| {
        ReferralRequest::Create {
            owner_id: req.owner_id,
            response,
        }
    })
    .await;

    match result {
        Ok(code) => (
            StatusCode::OK,
            Json(json!({
                "link": referral_link(&state.invite_link, &code),
                "code": code,
            })),
        ),
        Err(e) => error_response(e),
    }
}

async fn check_referral(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> impl IntoResponse {
    let result = referrals::request(&state.referral_channel, |response| {
        ReferralRequest::Check { owner_id, response }
    })
    .await;

    match result {
        Ok(count) => (StatusCode::OK, Json(json!({ "count": count }))),
        Err(e) => error_response(e),
    }
}

async fn list_redemptions(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> impl IntoResponse {
    let result = referrals::request(&state.referral_channel, |response| {
        ReferralRequest::Redemptions { owner_id, response }
    })
    .await;

    match result {
        Ok(redemptions) => (StatusCode::OK, Json(json!({ "redemptions": redemptions }))),
        Err(e) => error_response(e),
    }
}

async fn redeem_code(
    State(state): State<AppState>,
    Json(req): Json<NewRedemption>,
) -> impl IntoResponse {
    let result = referrals::request(&state.referral_channel, |response| {
        ReferralRequest::Redeem {
            redeemer_id: req.redeemer_id,
            code: req.code,
            response,
        }
    })
    .await;

    match result {
        Ok(outcome) => (StatusCode::CREATED, Json(json!(outcome))),
        Err(e) => error_response(e),
    }
}

async fn run_command(
    State(state): State<AppState>,
    Json(req): Json<ChatCommand>,
) -> impl IntoResponse {
    let command = match req.text.parse::<Command>() {
        Ok(command) => command,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "UnknownCommand",
                    "description": e.to_string(),
                })),
            )
        }
    };

    match command
        .dispatch(&state.referral_channel, req.user_id, &state.invite_link)
        .await
    {
        Ok(reply) => (StatusCode::OK, Json(json!(reply))),
        Err(e) => error_response(e),
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let result = referrals::request(&state.referral_channel, |response| {
        ReferralRequest::Health { response }
    })
    .await;

    match result {
        Ok(()) => (StatusCode::OK, "OK"),
        Err(e) => {
            log::error!("Health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE")
        }
    }
}

pub fn router(referral_channel: mpsc::Sender<ReferralRequest>, invite_link: String) -> Router {
    let app_state = AppState {
        referral_channel,
        invite_link,
    };

    Router::new()
        .route("/referrals", post(create_referral))
        .route("/referrals/{owner_id}", get(check_referral))
        .route("/referrals/{owner_id}/redemptions", get(list_redemptions))
        .route("/redemptions", post(redeem_code))
        .route("/commands", post(run_command))
        .route("/health", get(health))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_http_server(
    listen: &str,
    referral_channel: mpsc::Sender<ReferralRequest>,
    invite_link: String,
) -> Result<(), anyhow::Error> {
    let app = router(referral_channel, invite_link);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
