//! Application configuration endpoints.

use axum::extract::State;

use super::{ApiResponse, ApiResult, AppJson};
use crate::errors::AppError;
use crate::models::{AppConfig, SaveConfigRequest};
use crate::AppState;

/// GET /api/config - Get the saved configuration.
pub async fn get_config(State(state): State<AppState>) -> ApiResult<AppConfig> {
    let config = state
        .repo
        .get_config()
        .await?
        .ok_or_else(|| AppError::NotFound("No configuration found".to_string()))?;

    Ok(ApiResponse::new(config).with_message("Configuration retrieved successfully"))
}

/// POST /api/config - Create or replace the configuration.
pub async fn save_config(
    State(state): State<AppState>,
    AppJson(request): AppJson<SaveConfigRequest>,
) -> ApiResult<AppConfig> {
    if request.weekly_schedule.is_none() {
        return Err(AppError::Validation(
            "Missing required field: weeklySchedule".to_string(),
        ));
    }
    if request.consolidation_stages.is_none() {
        return Err(AppError::Validation(
            "Missing required field: consolidationStages".to_string(),
        ));
    }
    if let Some(time) = request.birthday_message_time.as_deref() {
        if !time.trim().is_empty()
            && chrono::NaiveTime::parse_from_str(time.trim(), "%H:%M").is_err()
        {
            return Err(AppError::Validation(format!(
                "birthdayMessageTime must be HH:MM, got '{}'",
                time
            )));
        }
    }

    let config = state.repo.save_config(&request).await?;
    tracing::info!(
        birthday_enabled = config.birthday_message_enabled,
        "Configuration saved"
    );

    Ok(ApiResponse::new(config).with_message("Configuration saved successfully"))
}
