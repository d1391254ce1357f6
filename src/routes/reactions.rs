use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::db::models::TargetType;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::reactions::ReactionSummary;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reactions", post(react))
        .route("/reactions/{target_type}/{target_id}", get(summary))
}

#[derive(Deserialize)]
pub struct ReactRequest {
    pub target_id: i64,
    pub target_type: String,
    pub is_like: bool,
}

fn parse_target(target_id: i64, target_type: &str) -> AppResult<(i64, TargetType)> {
    if target_id <= 0 {
        return Err(AppError::BadRequest("Invalid target id".into()));
    }
    let target_type = target_type
        .parse::<TargetType>()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    Ok((target_id, target_type))
}

/// POST /reactions: like or dislike a post or comment as the current user.
pub async fn react(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<ReactRequest>,
) -> AppResult<Json<ReactionSummary>> {
    let (target_id, target_type) = parse_target(req.target_id, &req.target_type)?;

    state
        .reactions
        .upsert(user.id, target_id, target_type, req.is_like)
        .await?;

    let summary = state
        .reactions
        .summary(target_id, target_type, Some(user.id))
        .await?;
    Ok(Json(summary))
}

/// GET /reactions/{target_type}/{target_id}: counts, plus the caller's vote when signed in.
pub async fn summary(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path((target_type, target_id)): Path<(String, String)>,
) -> AppResult<Json<ReactionSummary>> {
    let target_id: i64 = target_id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid target id".into()))?;
    let (target_id, target_type) = parse_target(target_id, &target_type)?;

    let summary = state
        .reactions
        .summary(target_id, target_type, user.map(|u| u.id))
        .await?;
    Ok(Json(summary))
}
