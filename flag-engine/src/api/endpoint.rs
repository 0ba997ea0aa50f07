use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::api::errors::FlagError;
use crate::api::types::{
    CreateFlagRequest, DeleteFlagRequest, EvaluationRequest, EvaluationResponse, UpdateFlagRequest,
};
use crate::audit::audit_models::FeatureFlagAudit;
use crate::flags::flag_models::FeatureFlag;
use crate::router;

/// Flag evaluation endpoint. Unknown flags and missing subjects come back as
/// regular disabled results, never as HTTP errors.
pub async fn evaluate(
    State(state): State<router::State>,
    Json(request): Json<EvaluationRequest>,
) -> Result<Json<EvaluationResponse>, FlagError> {
    let flag_match = state
        .flags
        .evaluate(
            &request.flag_key,
            request.user_id,
            request.session_hash,
            request.analytics_consent,
            request.trace_id,
        )
        .await?;

    Ok(Json(EvaluationResponse {
        enabled: flag_match.enabled,
        reason: flag_match.reason,
    }))
}

pub async fn create_flag(
    State(state): State<router::State>,
    Json(request): Json<CreateFlagRequest>,
) -> Result<(StatusCode, Json<FeatureFlag>), FlagError> {
    let flag = state
        .admin
        .create_flag(
            request.flag_key,
            request.patch,
            request.actor_id,
            request.reason,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(flag)))
}

pub async fn get_flag(
    State(state): State<router::State>,
    Path(flag_key): Path<String>,
) -> Result<Json<FeatureFlag>, FlagError> {
    Ok(Json(state.admin.get_flag(&flag_key).await?))
}

pub async fn list_flags(
    State(state): State<router::State>,
) -> Result<Json<Vec<FeatureFlag>>, FlagError> {
    Ok(Json(state.admin.list_flags().await?))
}

pub async fn update_flag(
    State(state): State<router::State>,
    Path(flag_key): Path<String>,
    Json(request): Json<UpdateFlagRequest>,
) -> Result<Json<FeatureFlag>, FlagError> {
    let flag = state
        .admin
        .update_flag(&flag_key, request.patch, request.actor_id, request.reason)
        .await?;

    Ok(Json(flag))
}

pub async fn delete_flag(
    State(state): State<router::State>,
    Path(flag_key): Path<String>,
    Json(request): Json<DeleteFlagRequest>,
) -> Result<StatusCode, FlagError> {
    state
        .admin
        .delete_flag(&flag_key, request.actor_id, request.reason)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn audit_trail(
    State(state): State<router::State>,
    Path(flag_key): Path<String>,
) -> Result<Json<Vec<FeatureFlagAudit>>, FlagError> {
    Ok(Json(state.audit.audit_trail(&flag_key).await?))
}
