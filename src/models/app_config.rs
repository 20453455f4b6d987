//! Application configuration stored in the database.
//!
//! There is at most one row. The birthday notifier reads its gateway credentials,
//! template and schedule from it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::gateway::GatewayCredentials;

fn default_slide_interval() -> i64 {
    5000
}

/// The persisted application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub weekly_schedule: Value,
    pub slides: Value,
    pub slide_interval: i64,
    pub consolidation_stages: Value,
    pub welcome_message_new_convert: Option<String>,
    pub welcome_message_regular_member: Option<String>,
    pub evolution_api_url: Option<String>,
    pub evolution_api_key: Option<String>,
    pub evolution_instance_name: Option<String>,
    pub birthday_message_enabled: bool,
    pub birthday_message_time: Option<String>,
    pub birthday_message_template: Option<String>,
    pub updated_at: String,
}

/// Request body for `POST /api/config`.
///
/// `weeklySchedule` and `consolidationStages` are required; they are kept optional here
/// so the handler can answer with a field-specific validation message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveConfigRequest {
    #[serde(default)]
    pub weekly_schedule: Option<Value>,
    #[serde(default)]
    pub slides: Option<Value>,
    #[serde(default = "default_slide_interval")]
    pub slide_interval: i64,
    #[serde(default)]
    pub consolidation_stages: Option<Value>,
    #[serde(default)]
    pub welcome_message_new_convert: Option<String>,
    #[serde(default)]
    pub welcome_message_regular_member: Option<String>,
    #[serde(default)]
    pub evolution_api_url: Option<String>,
    #[serde(default)]
    pub evolution_api_key: Option<String>,
    #[serde(default)]
    pub evolution_instance_name: Option<String>,
    #[serde(default)]
    pub birthday_message_enabled: bool,
    #[serde(default)]
    pub birthday_message_time: Option<String>,
    #[serde(default)]
    pub birthday_message_template: Option<String>,
}

/// The subset of [`AppConfig`] the birthday notifier depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    pub gateway_url: String,
    pub gateway_api_key: String,
    pub gateway_instance: String,
    pub template: Option<String>,
    pub enabled: bool,
    pub scheduled_time: Option<String>,
}

impl NotificationConfig {
    pub fn credentials(&self) -> GatewayCredentials {
        GatewayCredentials {
            base_url: self.gateway_url.clone(),
            instance: self.gateway_instance.clone(),
            api_key: self.gateway_api_key.clone(),
        }
    }
}

impl AppConfig {
    /// Extract the notification settings.
    ///
    /// Returns `None` unless the gateway URL, key and instance are all present.
    pub fn notification_config(&self) -> Option<NotificationConfig> {
        let gateway_url = non_blank(&self.evolution_api_url)?;
        let gateway_api_key = non_blank(&self.evolution_api_key)?;
        let gateway_instance = non_blank(&self.evolution_instance_name)?;

        Some(NotificationConfig {
            gateway_url,
            gateway_api_key,
            gateway_instance,
            template: non_blank(&self.birthday_message_template),
            enabled: self.birthday_message_enabled,
            scheduled_time: non_blank(&self.birthday_message_time),
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
