//! Database repository for members and application configuration.
//!
//! Uses prepared statements and transactions for data integrity.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::birthday::BirthdayStore;
use crate::errors::AppError;
use crate::models::{
    non_blank_text, AppConfig, CreateMemberRequest, Member, NotificationConfig,
    SaveConfigRequest, UpdateMemberRequest,
};

const MEMBER_COLUMNS: &str = "id, name, email, phone, birth_date, address, ministry, is_baptized, last_birthday_message_sent, created_at, updated_at, version";

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Check that the database answers.
    pub async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ==================== MEMBER OPERATIONS ====================

    /// List members, optionally only those serving in `ministry`.
    pub async fn list_members(&self, ministry: Option<&str>) -> Result<Vec<Member>, AppError> {
        let rows = match ministry {
            Some(ministry) => {
                sqlx::query(&format!(
                    "SELECT {} FROM members WHERE ministry = ? ORDER BY name",
                    MEMBER_COLUMNS
                ))
                .bind(ministry)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM members ORDER BY name",
                    MEMBER_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.iter().map(member_from_row).collect())
    }

    /// Get a member by ID.
    pub async fn get_member(&self, id: &str) -> Result<Option<Member>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM members WHERE id = ?", MEMBER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(member_from_row))
    }

    /// Create a new member.
    pub async fn create_member(&self, request: &CreateMemberRequest) -> Result<Member, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let name = request.name.trim().to_string();
        let email = non_blank_text(request.email.as_deref());
        let phone = non_blank_text(request.phone.as_deref());
        let address = non_blank_text(request.address.as_deref());
        let ministry = non_blank_text(request.ministry.as_deref());

        sqlx::query(
            "INSERT INTO members (id, name, email, phone, birth_date, address, ministry, is_baptized, last_birthday_message_sent, created_at, updated_at, version) VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, 1)"
        )
        .bind(&id)
        .bind(&name)
        .bind(&email)
        .bind(&phone)
        .bind(request.birth_date)
        .bind(&address)
        .bind(&ministry)
        .bind(request.is_baptized as i32)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(unique_email_violation)?;

        Ok(Member {
            id,
            name,
            email,
            phone,
            birth_date: request.birth_date,
            address,
            ministry,
            is_baptized: request.is_baptized,
            last_birthday_message_sent: None,
            created_at: now.clone(),
            updated_at: now,
            version: 1,
        })
    }

    /// Update a member with optimistic concurrency control.
    pub async fn update_member(
        &self,
        id: &str,
        request: &UpdateMemberRequest,
    ) -> Result<Member, AppError> {
        let existing = self
            .get_member(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Member {} not found", id)))?;

        if let Some(expected) = request.expected_version {
            if existing.version != expected {
                return Err(AppError::Conflict {
                    message: format!(
                        "Version mismatch: expected {}, current {}",
                        expected, existing.version
                    ),
                    current_version: existing.version,
                });
            }
        }

        let updated = Member {
            name: request
                .name
                .as_deref()
                .map(|n| n.trim().to_string())
                .unwrap_or_else(|| existing.name.clone()),
            email: patch_text(&request.email, &existing.email),
            phone: patch_text(&request.phone, &existing.phone),
            birth_date: request.birth_date.unwrap_or(existing.birth_date),
            address: patch_text(&request.address, &existing.address),
            ministry: patch_text(&request.ministry, &existing.ministry),
            is_baptized: request.is_baptized.unwrap_or(existing.is_baptized),
            updated_at: Utc::now().to_rfc3339(),
            version: existing.version + 1,
            ..existing.clone()
        };

        // Conditional UPDATE guards against a write between our read and this one
        let result = sqlx::query(
            "UPDATE members SET name = ?, email = ?, phone = ?, birth_date = ?, address = ?, ministry = ?, is_baptized = ?, updated_at = ?, version = ? WHERE id = ? AND version = ?"
        )
        .bind(&updated.name)
        .bind(&updated.email)
        .bind(&updated.phone)
        .bind(updated.birth_date)
        .bind(&updated.address)
        .bind(&updated.ministry)
        .bind(updated.is_baptized as i32)
        .bind(&updated.updated_at)
        .bind(updated.version)
        .bind(id)
        .bind(existing.version)
        .execute(&self.pool)
        .await
        .map_err(unique_email_violation)?;

        if result.rows_affected() == 0 {
            let current = self.get_member(id).await?;
            return Err(AppError::Conflict {
                message: "Concurrent modification detected".to_string(),
                current_version: current.map(|m| m.version).unwrap_or(0),
            });
        }

        Ok(updated)
    }

    /// Delete a member.
    pub async fn delete_member(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM members WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Member {} not found", id)));
        }

        Ok(())
    }

    /// Members born on the given month and day of any year.
    pub async fn find_members_by_birth_month_day(
        &self,
        month: u32,
        day: u32,
    ) -> Result<Vec<Member>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM members WHERE birth_date IS NOT NULL AND strftime('%m', birth_date) = ? AND strftime('%d', birth_date) = ? ORDER BY name",
            MEMBER_COLUMNS
        ))
        .bind(format!("{:02}", month))
        .bind(format!("{:02}", day))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(member_from_row).collect())
    }

    /// Record `date` as the last birthday message for every listed member in one
    /// transaction. A marker never moves backwards.
    pub async fn update_last_birthday_message_sent(
        &self,
        member_ids: &[String],
        date: NaiveDate,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        for id in member_ids {
            sqlx::query(
                "UPDATE members SET last_birthday_message_sent = ? WHERE id = ? AND (last_birthday_message_sent IS NULL OR last_birthday_message_sent < ?)",
            )
            .bind(date)
            .bind(id)
            .bind(date)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    // ==================== CONFIG OPERATIONS ====================

    /// Get the application configuration, if one has been saved.
    pub async fn get_config(&self) -> Result<Option<AppConfig>, AppError> {
        let row = sqlx::query(
            "SELECT weekly_schedule, slides, slide_interval, consolidation_stages, welcome_message_new_convert, welcome_message_regular_member, evolution_api_url, evolution_api_key, evolution_instance_name, birthday_message_enabled, birthday_message_time, birthday_message_template, updated_at FROM app_config WHERE id = 1"
        )
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(config_from_row).transpose()
    }

    /// Create or replace the application configuration.
    ///
    /// Callers validate that `weekly_schedule` and `consolidation_stages` are present.
    pub async fn save_config(&self, request: &SaveConfigRequest) -> Result<AppConfig, AppError> {
        let config = AppConfig {
            weekly_schedule: request.weekly_schedule.clone().unwrap_or(Value::Null),
            slides: request
                .slides
                .clone()
                .unwrap_or_else(|| Value::Array(Vec::new())),
            slide_interval: request.slide_interval,
            consolidation_stages: request.consolidation_stages.clone().unwrap_or(Value::Null),
            welcome_message_new_convert: request.welcome_message_new_convert.clone(),
            welcome_message_regular_member: request.welcome_message_regular_member.clone(),
            evolution_api_url: request.evolution_api_url.clone(),
            evolution_api_key: request.evolution_api_key.clone(),
            evolution_instance_name: request.evolution_instance_name.clone(),
            birthday_message_enabled: request.birthday_message_enabled,
            birthday_message_time: request.birthday_message_time.clone(),
            birthday_message_template: request.birthday_message_template.clone(),
            updated_at: Utc::now().to_rfc3339(),
        };

        sqlx::query(
            r#"
            INSERT INTO app_config (id, weekly_schedule, slides, slide_interval, consolidation_stages, welcome_message_new_convert, welcome_message_regular_member, evolution_api_url, evolution_api_key, evolution_instance_name, birthday_message_enabled, birthday_message_time, birthday_message_template, updated_at)
            VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                weekly_schedule = excluded.weekly_schedule,
                slides = excluded.slides,
                slide_interval = excluded.slide_interval,
                consolidation_stages = excluded.consolidation_stages,
                welcome_message_new_convert = excluded.welcome_message_new_convert,
                welcome_message_regular_member = excluded.welcome_message_regular_member,
                evolution_api_url = excluded.evolution_api_url,
                evolution_api_key = excluded.evolution_api_key,
                evolution_instance_name = excluded.evolution_instance_name,
                birthday_message_enabled = excluded.birthday_message_enabled,
                birthday_message_time = excluded.birthday_message_time,
                birthday_message_template = excluded.birthday_message_template,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(serde_json::to_string(&config.weekly_schedule)?)
        .bind(serde_json::to_string(&config.slides)?)
        .bind(config.slide_interval)
        .bind(serde_json::to_string(&config.consolidation_stages)?)
        .bind(&config.welcome_message_new_convert)
        .bind(&config.welcome_message_regular_member)
        .bind(&config.evolution_api_url)
        .bind(&config.evolution_api_key)
        .bind(&config.evolution_instance_name)
        .bind(config.birthday_message_enabled as i32)
        .bind(&config.birthday_message_time)
        .bind(&config.birthday_message_template)
        .bind(&config.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(config)
    }
}

#[async_trait]
impl BirthdayStore for Repository {
    async fn load_notification_config(&self) -> Result<Option<NotificationConfig>, AppError> {
        Ok(self
            .get_config()
            .await?
            .and_then(|config| config.notification_config()))
    }

    async fn find_by_birth_month_day(
        &self,
        month: u32,
        day: u32,
    ) -> Result<Vec<Member>, AppError> {
        self.find_members_by_birth_month_day(month, day).await
    }

    async fn mark_birthday_messages_sent(
        &self,
        member_ids: &[String],
        date: NaiveDate,
    ) -> Result<(), AppError> {
        self.update_last_birthday_message_sent(member_ids, date)
            .await
    }
}

// Helper functions for row conversion

fn member_from_row(row: &sqlx::sqlite::SqliteRow) -> Member {
    let is_baptized: i32 = row.get("is_baptized");
    Member {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        phone: row.get("phone"),
        birth_date: row.get("birth_date"),
        address: row.get("address"),
        ministry: row.get("ministry"),
        is_baptized: is_baptized != 0,
        last_birthday_message_sent: row.get("last_birthday_message_sent"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    }
}

fn config_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<AppConfig, AppError> {
    let enabled: i32 = row.get("birthday_message_enabled");
    let weekly_schedule: String = row.get("weekly_schedule");
    let slides: Option<String> = row.get("slides");
    let consolidation_stages: String = row.get("consolidation_stages");
    Ok(AppConfig {
        weekly_schedule: serde_json::from_str(&weekly_schedule)?,
        slides: match slides {
            Some(s) => serde_json::from_str(&s)?,
            None => Value::Array(Vec::new()),
        },
        slide_interval: row.get("slide_interval"),
        consolidation_stages: serde_json::from_str(&consolidation_stages)?,
        welcome_message_new_convert: row.get("welcome_message_new_convert"),
        welcome_message_regular_member: row.get("welcome_message_regular_member"),
        evolution_api_url: row.get("evolution_api_url"),
        evolution_api_key: row.get("evolution_api_key"),
        evolution_instance_name: row.get("evolution_instance_name"),
        birthday_message_enabled: enabled != 0,
        birthday_message_time: row.get("birthday_message_time"),
        birthday_message_template: row.get("birthday_message_template"),
        updated_at: row.get("updated_at"),
    })
}

/// Apply an update field: missing keeps `current`, `null` or blank clears it.
fn patch_text(patch: &Option<Option<String>>, current: &Option<String>) -> Option<String> {
    match patch {
        None => current.clone(),
        Some(value) => non_blank_text(value.as_deref()),
    }
}

fn unique_email_violation(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return AppError::Validation("A member with this email already exists".to_string());
        }
    }
    err.into()
}
