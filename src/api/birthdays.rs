//! Birthday notification endpoints.

use axum::{extract::State, Json};
use chrono::{Local, NaiveDate};

use super::{success, ApiResult, AppQuery};
use crate::errors::AppError;
use crate::models::{BirthdayDateQuery, BirthdayMember, ProcessBirthdaysResponse};
use crate::AppState;

fn processing_date(query: &BirthdayDateQuery) -> NaiveDate {
    query.date.unwrap_or_else(|| Local::now().date_naive())
}

/// Runs may be back-dated but never scheduled ahead of today.
fn run_date(query: &BirthdayDateQuery, today: NaiveDate) -> Result<NaiveDate, AppError> {
    let date = query.date.unwrap_or(today);
    if date > today {
        return Err(AppError::Validation(format!(
            "Cannot process birthdays for a future date: {}",
            date
        )));
    }
    Ok(date)
}

/// POST /api/birthdays/process - Send today's birthday messages.
pub async fn process_birthdays(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<BirthdayDateQuery>,
) -> Result<Json<ProcessBirthdaysResponse>, AppError> {
    let date = run_date(&query, Local::now().date_naive())?;
    let sent = state.notifier.process_birthdays(date).await?;

    Ok(Json(ProcessBirthdaysResponse {
        success: true,
        message: format!("Birthday messages sent to {} member(s)", sent),
        sent,
    }))
}

/// GET /api/birthdays/today - List members whose birthday is today.
pub async fn list_todays_birthdays(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<BirthdayDateQuery>,
) -> ApiResult<Vec<BirthdayMember>> {
    success(
        state
            .notifier
            .list_birthdays(processing_date(&query))
            .await?,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_run_date_rejects_future() {
        let today = date("2024-03-15");
        let query = |d: Option<&str>| BirthdayDateQuery { date: d.map(date) };

        assert_eq!(run_date(&query(None), today).unwrap(), today);
        assert_eq!(
            run_date(&query(Some("2023-03-15")), today).unwrap(),
            date("2023-03-15")
        );
        assert!(matches!(
            run_date(&query(Some("2024-03-16")), today),
            Err(AppError::Validation(_))
        ));
    }
}
