//! Church member model.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// A registered church member.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ministry: Option<String>,
    pub is_baptized: bool,
    /// Most recent date a birthday message was delivered to this member
    pub last_birthday_message_sent: Option<NaiveDate>,
    pub created_at: String,
    pub updated_at: String,
    /// Internal version for optimistic concurrency control
    #[serde(default)]
    pub version: i64,
}

/// Request body for creating a new member.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMemberRequest {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub ministry: Option<String>,
    #[serde(default)]
    pub is_baptized: bool,
}

/// Query parameters for `GET /api/members`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemberListQuery {
    #[serde(default)]
    pub ministry: Option<String>,
}

/// Request body for updating an existing member.
///
/// Optional fields distinguish a missing key (keep the stored value) from an explicit
/// `null` (clear it). The birthday marker is owned by the notifier and cannot be set here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMemberRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub birth_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "double_option")]
    pub address: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub ministry: Option<Option<String>>,
    #[serde(default)]
    pub is_baptized: Option<bool>,
    /// Expected version for optimistic concurrency control
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// Present key: `Some(value)`, where `null` becomes `Some(None)`.
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Blank text fields are stored as absent.
pub fn non_blank_text(value: Option<&str>) -> Option<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_request_distinguishes_null_from_missing() {
        let request: UpdateMemberRequest = serde_json::from_value(json!({
            "phone": null,
            "birthDate": null,
            "ministry": "Louvor"
        }))
        .unwrap();

        assert_eq!(request.phone, Some(None));
        assert_eq!(request.birth_date, Some(None));
        assert_eq!(request.ministry, Some(Some("Louvor".to_string())));
        assert_eq!(request.email, None);
        assert_eq!(request.address, None);
    }

    #[test]
    fn test_non_blank_text() {
        assert_eq!(non_blank_text(Some("  ")), None);
        assert_eq!(non_blank_text(None), None);
        assert_eq!(non_blank_text(Some("11 9999")).as_deref(), Some("11 9999"));
    }
}
