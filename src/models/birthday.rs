//! Birthday listing and run summary models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::Member;

/// A member whose birthday falls on the requested date.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BirthdayMember {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    pub birth_date: NaiveDate,
    pub last_birthday_message_sent: Option<NaiveDate>,
}

impl BirthdayMember {
    /// Build from a member; `None` when the member has no birth date.
    pub fn from_member(member: &Member) -> Option<Self> {
        Some(Self {
            id: member.id.clone(),
            name: member.name.clone(),
            phone: member.phone.clone(),
            birth_date: member.birth_date?,
            last_birthday_message_sent: member.last_birthday_message_sent,
        })
    }
}

/// Optional `?date=YYYY-MM-DD` override for the birthday endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BirthdayDateQuery {
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

/// Response body of `POST /api/birthdays/process`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessBirthdaysResponse {
    pub success: bool,
    pub message: String,
    pub sent: usize,
}
