//! Birthday notifier.
//!
//! A run for date `D` selects members born on `D`'s month and day whose last message
//! predates `D`, sends each one a greeting through the messaging gateway and then
//! records the successful sends in a single transaction. Dispatch failures are logged
//! and leave the member eligible for a later run.

mod scheduler;

pub use scheduler::start_scheduler;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::errors::AppError;
use crate::gateway::{normalize_phone, DynMessagingGateway};
use crate::models::{BirthdayMember, Member, NotificationConfig};

/// Greeting used when no template is configured.
pub const DEFAULT_TEMPLATE: &str =
    "Feliz aniversário, {nome}! Que Deus abençoe grandemente a sua vida neste novo ano.";

const NAME_PLACEHOLDERS: [&str; 2] = ["{nome}", "{name}"];

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("birthday notification settings are not configured")]
    ConfigurationMissing,

    #[error("failed to read birthday data: {0}")]
    Store(#[source] AppError),

    #[error("failed to persist birthday markers: {0}")]
    Persistence(#[source] AppError),
}

/// Storage the notifier depends on.
#[async_trait]
pub trait BirthdayStore: Send + Sync {
    /// Notification settings, or `None` when they have not been saved.
    async fn load_notification_config(&self) -> Result<Option<NotificationConfig>, AppError>;

    /// Members whose birth date has the given month and day, any year.
    async fn find_by_birth_month_day(&self, month: u32, day: u32)
        -> Result<Vec<Member>, AppError>;

    /// Set the marker of every listed member to `date`, all or nothing.
    async fn mark_birthday_messages_sent(
        &self,
        member_ids: &[String],
        date: NaiveDate,
    ) -> Result<(), AppError>;
}

pub struct BirthdayNotifier {
    store: Arc<dyn BirthdayStore>,
    gateway: DynMessagingGateway,
    run_lock: Mutex<()>,
}

impl BirthdayNotifier {
    pub fn new(store: Arc<dyn BirthdayStore>, gateway: DynMessagingGateway) -> Self {
        Self {
            store,
            gateway,
            run_lock: Mutex::new(()),
        }
    }

    /// Send birthday messages for `date` and return how many were delivered.
    ///
    /// Only one run executes at a time; a concurrent caller waits and then sees the
    /// markers committed by the previous run.
    pub async fn process_birthdays(&self, date: NaiveDate) -> Result<usize, NotifierError> {
        let _guard = self.run_lock.lock().await;

        let config = self
            .store
            .load_notification_config()
            .await
            .map_err(NotifierError::Store)?
            .ok_or(NotifierError::ConfigurationMissing)?;
        let credentials = config.credentials();

        let candidates = self
            .store
            .find_by_birth_month_day(date.month(), date.day())
            .await
            .map_err(NotifierError::Store)?;

        tracing::info!(%date, candidates = candidates.len(), "Starting birthday run");

        let mut delivered = Vec::new();
        for member in candidates.iter().filter(|m| is_eligible(m, date)) {
            let Some(phone) = member.phone.as_deref().and_then(normalize_phone) else {
                tracing::debug!(member_id = %member.id, "Skipping member without phone number");
                continue;
            };

            let text = compose_message(config.template.as_deref(), &member.name);
            match self.gateway.send_text(&credentials, &phone, &text).await {
                Ok(()) => {
                    tracing::info!(member_id = %member.id, "Birthday message sent");
                    delivered.push(member.id.clone());
                }
                Err(e) => {
                    tracing::warn!(member_id = %member.id, error = %e, "Birthday message failed");
                }
            }
        }

        if !delivered.is_empty() {
            self.store
                .mark_birthday_messages_sent(&delivered, date)
                .await
                .map_err(NotifierError::Persistence)?;
        }

        tracing::info!(%date, sent = delivered.len(), "Birthday run finished");
        Ok(delivered.len())
    }

    /// Members with a birthday on `date`, regardless of whether they were messaged.
    pub async fn list_birthdays(&self, date: NaiveDate) -> Result<Vec<BirthdayMember>, AppError> {
        let members = self
            .store
            .find_by_birth_month_day(date.month(), date.day())
            .await?;

        Ok(members
            .iter()
            .filter(|m| is_birthday(m, date))
            .filter_map(BirthdayMember::from_member)
            .collect())
    }

    /// Notification settings as currently stored.
    pub async fn notification_config(&self) -> Result<Option<NotificationConfig>, AppError> {
        self.store.load_notification_config().await
    }
}

fn is_birthday(member: &Member, date: NaiveDate) -> bool {
    member
        .birth_date
        .is_some_and(|birth| birth.month() == date.month() && birth.day() == date.day())
}

/// Whether a run on `date` should consider `member` at all.
///
/// A marker on or after `date` means this birthday was already handled, so a
/// back-dated run cannot message the member again.
pub fn is_eligible(member: &Member, date: NaiveDate) -> bool {
    is_birthday(member, date)
        && member
            .last_birthday_message_sent
            .map_or(true, |sent| sent < date)
}

/// Substitute `name` into `template`, falling back to [`DEFAULT_TEMPLATE`].
pub fn compose_message(template: Option<&str>, name: &str) -> String {
    let template = template
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(DEFAULT_TEMPLATE);
    let name = name.trim();

    // Single pass so placeholder text inside the name is left alone
    let mut text = String::with_capacity(template.len() + name.len());
    let mut rest = template;
    while let Some((start, placeholder)) = NAME_PLACEHOLDERS
        .iter()
        .filter_map(|p| rest.find(p).map(|start| (start, *p)))
        .min_by_key(|(start, _)| *start)
    {
        text.push_str(&rest[..start]);
        text.push_str(name);
        rest = &rest[start + placeholder.len()..];
    }
    text.push_str(rest);
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayCredentials, GatewayError, MessagingGateway};
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex as StdMutex;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn member(id: &str, birth: Option<&str>, phone: Option<&str>) -> Member {
        Member {
            id: id.to_string(),
            name: format!("Member {}", id),
            email: None,
            phone: phone.map(str::to_string),
            birth_date: birth.map(date),
            address: None,
            ministry: None,
            is_baptized: false,
            last_birthday_message_sent: None,
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
            version: 1,
        }
    }

    fn notification_config() -> NotificationConfig {
        NotificationConfig {
            gateway_url: "http://gateway.test".to_string(),
            gateway_api_key: "key".to_string(),
            gateway_instance: "igreja".to_string(),
            template: Some("Parabéns, {nome}!".to_string()),
            enabled: true,
            scheduled_time: Some("08:00".to_string()),
        }
    }

    /// In-memory store; `fail_commit` makes the marker commit fail.
    struct MemoryStore {
        config: Option<NotificationConfig>,
        members: StdMutex<Vec<Member>>,
        fail_commit: bool,
    }

    impl MemoryStore {
        fn new(members: Vec<Member>) -> Self {
            Self {
                config: Some(notification_config()),
                members: StdMutex::new(members),
                fail_commit: false,
            }
        }

        fn marker(&self, id: &str) -> Option<NaiveDate> {
            self.members
                .lock()
                .unwrap()
                .iter()
                .find(|m| m.id == id)
                .and_then(|m| m.last_birthday_message_sent)
        }
    }

    #[async_trait]
    impl BirthdayStore for MemoryStore {
        async fn load_notification_config(&self) -> Result<Option<NotificationConfig>, AppError> {
            Ok(self.config.clone())
        }

        async fn find_by_birth_month_day(
            &self,
            month: u32,
            day: u32,
        ) -> Result<Vec<Member>, AppError> {
            Ok(self
                .members
                .lock()
                .unwrap()
                .iter()
                .filter(|m| {
                    m.birth_date
                        .is_some_and(|b| b.month() == month && b.day() == day)
                })
                .cloned()
                .collect())
        }

        async fn mark_birthday_messages_sent(
            &self,
            member_ids: &[String],
            date: NaiveDate,
        ) -> Result<(), AppError> {
            if self.fail_commit {
                return Err(AppError::Database("database is locked".to_string()));
            }
            let ids: HashSet<&String> = member_ids.iter().collect();
            for m in self.members.lock().unwrap().iter_mut() {
                let forward = m.last_birthday_message_sent.map_or(true, |d| d < date);
                if ids.contains(&m.id) && forward {
                    m.last_birthday_message_sent = Some(date);
                }
            }
            Ok(())
        }
    }

    /// Records every send; phones listed in `failing` are rejected.
    #[derive(Default)]
    struct RecordingGateway {
        sent: StdMutex<Vec<(String, String)>>,
        failing: HashMap<String, u16>,
    }

    #[async_trait]
    impl MessagingGateway for RecordingGateway {
        async fn send_text(
            &self,
            _credentials: &GatewayCredentials,
            phone: &str,
            text: &str,
        ) -> Result<(), GatewayError> {
            if let Some(status) = self.failing.get(phone) {
                return Err(GatewayError::Rejected {
                    status: *status,
                    body: "instance disconnected".to_string(),
                });
            }
            self.sent
                .lock()
                .unwrap()
                .push((phone.to_string(), text.to_string()));
            Ok(())
        }
    }

    fn notifier(
        store: Arc<MemoryStore>,
        gateway: Arc<RecordingGateway>,
    ) -> BirthdayNotifier {
        BirthdayNotifier::new(store, gateway)
    }

    #[tokio::test]
    async fn test_sends_and_marks_matching_member() {
        let store = Arc::new(MemoryStore::new(vec![member(
            "a",
            Some("1990-03-15"),
            Some("+551199990000"),
        )]));
        let gateway = Arc::new(RecordingGateway::default());
        let notifier = notifier(store.clone(), gateway.clone());

        let sent = notifier.process_birthdays(date("2024-03-15")).await.unwrap();

        assert_eq!(sent, 1);
        assert_eq!(store.marker("a"), Some(date("2024-03-15")));
        let sent_messages = gateway.sent.lock().unwrap();
        assert_eq!(sent_messages[0].0, "551199990000");
        assert_eq!(sent_messages[0].1, "Parabéns, Member a!");
    }

    #[tokio::test]
    async fn test_second_run_same_day_sends_nothing() {
        let store = Arc::new(MemoryStore::new(vec![member(
            "a",
            Some("1990-03-15"),
            Some("+551199990000"),
        )]));
        let gateway = Arc::new(RecordingGateway::default());
        let notifier = notifier(store.clone(), gateway.clone());

        assert_eq!(notifier.process_birthdays(date("2024-03-15")).await.unwrap(), 1);
        assert_eq!(notifier.process_birthdays(date("2024-03-15")).await.unwrap(), 0);
        assert_eq!(gateway.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_marker_from_previous_year_does_not_block() {
        let mut a = member("a", Some("1990-03-15"), Some("11999990000"));
        a.last_birthday_message_sent = Some(date("2023-03-15"));
        let store = Arc::new(MemoryStore::new(vec![a]));
        let notifier = notifier(store.clone(), Arc::new(RecordingGateway::default()));

        assert_eq!(notifier.process_birthdays(date("2024-03-15")).await.unwrap(), 1);
        assert_eq!(store.marker("a"), Some(date("2024-03-15")));
    }

    #[tokio::test]
    async fn test_back_dated_run_does_not_resend() {
        let store = Arc::new(MemoryStore::new(vec![member(
            "a",
            Some("1990-03-15"),
            Some("11999990000"),
        )]));
        let gateway = Arc::new(RecordingGateway::default());
        let notifier = notifier(store.clone(), gateway.clone());

        assert_eq!(notifier.process_birthdays(date("2024-03-15")).await.unwrap(), 1);
        assert_eq!(notifier.process_birthdays(date("2023-03-15")).await.unwrap(), 0);
        assert_eq!(notifier.process_birthdays(date("2024-03-15")).await.unwrap(), 0);

        assert_eq!(gateway.sent.lock().unwrap().len(), 1);
        assert_eq!(store.marker("a"), Some(date("2024-03-15")));
    }

    #[tokio::test]
    async fn test_member_without_phone_is_skipped() {
        let store = Arc::new(MemoryStore::new(vec![
            member("b", Some("1985-07-01"), None),
            member("blank", Some("1985-07-01"), Some("  ")),
            member("c", Some("2000-07-01"), Some("11988887777")),
        ]));
        let gateway = Arc::new(RecordingGateway::default());
        let notifier = notifier(store.clone(), gateway.clone());

        let sent = notifier.process_birthdays(date("2024-07-01")).await.unwrap();

        assert_eq!(sent, 1);
        assert_eq!(store.marker("b"), None);
        assert_eq!(store.marker("blank"), None);
        assert_eq!(store.marker("c"), Some(date("2024-07-01")));
        assert_eq!(gateway.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_gateway_failure_leaves_marker_and_continues() {
        let store = Arc::new(MemoryStore::new(vec![
            member("a", Some("1990-03-15"), Some("11111111111")),
            member("c", Some("1970-03-15"), Some("22222222222")),
            member("d", Some("1999-03-15"), Some("33333333333")),
        ]));
        let gateway = Arc::new(RecordingGateway {
            failing: HashMap::from([("22222222222".to_string(), 500)]),
            ..Default::default()
        });
        let notifier = notifier(store.clone(), gateway.clone());

        let sent = notifier.process_birthdays(date("2024-03-15")).await.unwrap();

        assert_eq!(sent, 2);
        assert_eq!(store.marker("a"), Some(date("2024-03-15")));
        assert_eq!(store.marker("c"), None);
        assert_eq!(store.marker("d"), Some(date("2024-03-15")));
    }

    #[tokio::test]
    async fn test_non_matching_members_never_selected() {
        let store = Arc::new(MemoryStore::new(vec![
            member("no-birth", None, Some("11111111111")),
            member("other-day", Some("1990-03-16"), Some("22222222222")),
            member("other-month", Some("1990-04-15"), Some("33333333333")),
        ]));
        let gateway = Arc::new(RecordingGateway::default());
        let notifier = notifier(store.clone(), gateway.clone());

        assert_eq!(notifier.process_birthdays(date("2024-03-15")).await.unwrap(), 0);
        assert!(gateway.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_configuration_fails_before_scan() {
        let mut store = MemoryStore::new(vec![member(
            "a",
            Some("1990-03-15"),
            Some("11999990000"),
        )]);
        store.config = None;
        let store = Arc::new(store);
        let gateway = Arc::new(RecordingGateway::default());
        let notifier = notifier(store.clone(), gateway.clone());

        let result = notifier.process_birthdays(date("2024-03-15")).await;

        assert!(matches!(result, Err(NotifierError::ConfigurationMissing)));
        assert!(gateway.sent.lock().unwrap().is_empty());
        assert_eq!(store.marker("a"), None);
    }

    #[tokio::test]
    async fn test_commit_failure_is_persistence_error() {
        let mut store = MemoryStore::new(vec![member(
            "a",
            Some("1990-03-15"),
            Some("11999990000"),
        )]);
        store.fail_commit = true;
        let store = Arc::new(store);
        let notifier = notifier(store.clone(), Arc::new(RecordingGateway::default()));

        let result = notifier.process_birthdays(date("2024-03-15")).await;

        assert!(matches!(result, Err(NotifierError::Persistence(_))));
        assert_eq!(store.marker("a"), None);
    }

    #[tokio::test]
    async fn test_concurrent_runs_send_once() {
        let store = Arc::new(MemoryStore::new(vec![member(
            "a",
            Some("1990-03-15"),
            Some("11999990000"),
        )]));
        let gateway = Arc::new(RecordingGateway::default());
        let notifier = Arc::new(notifier(store.clone(), gateway.clone()));

        let first = tokio::spawn({
            let notifier = notifier.clone();
            async move { notifier.process_birthdays(date("2024-03-15")).await }
        });
        let second = tokio::spawn({
            let notifier = notifier.clone();
            async move { notifier.process_birthdays(date("2024-03-15")).await }
        });

        let total = first.await.unwrap().unwrap() + second.await.unwrap().unwrap();
        assert_eq!(total, 1);
        assert_eq!(gateway.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_birthdays_ignores_marker() {
        let mut a = member("a", Some("1990-03-15"), Some("11999990000"));
        a.last_birthday_message_sent = Some(date("2024-03-15"));
        let store = Arc::new(MemoryStore::new(vec![
            a,
            member("b", Some("1985-03-15"), None),
            member("c", Some("1985-03-16"), None),
        ]));
        let notifier = notifier(store, Arc::new(RecordingGateway::default()));

        let listed = notifier.list_birthdays(date("2024-03-15")).await.unwrap();

        assert_eq!(listed.len(), 2);
        let a = listed.iter().find(|m| m.id == "a").unwrap();
        assert_eq!(a.last_birthday_message_sent, Some(date("2024-03-15")));
    }

    #[test]
    fn test_compose_message() {
        assert_eq!(
            compose_message(Some("Feliz aniversário, {name}! {nome}"), " Maria "),
            "Feliz aniversário, Maria! Maria"
        );
        assert_eq!(
            compose_message(None, "João"),
            DEFAULT_TEMPLATE.replace("{nome}", "João")
        );
        assert_eq!(
            compose_message(Some(""), "João"),
            DEFAULT_TEMPLATE.replace("{nome}", "João")
        );
        assert_eq!(compose_message(Some("Parabéns!"), "João"), "Parabéns!");
    }

    #[test]
    fn test_compose_message_leaves_placeholders_in_name() {
        assert_eq!(
            compose_message(Some("Parabéns, {nome}! Abraço, {name}."), "{name}"),
            "Parabéns, {name}! Abraço, {name}."
        );
        assert_eq!(compose_message(Some("{nome}{name}"), "x{nome}"), "x{nome}x{nome}");
    }

    #[test]
    fn test_leap_day_matches_only_leap_day() {
        let leap = member("leap", Some("2000-02-29"), Some("11999990000"));
        assert!(is_eligible(&leap, date("2024-02-29")));
        assert!(!is_eligible(&leap, date("2023-02-28")));
        assert!(!is_eligible(&leap, date("2023-03-01")));
    }

    #[test]
    fn test_marker_on_or_after_date_blocks() {
        let mut a = member("a", Some("1990-03-15"), Some("11999990000"));
        a.last_birthday_message_sent = Some(date("2024-03-15"));
        assert!(!is_eligible(&a, date("2024-03-15")));
        assert!(!is_eligible(&a, date("2023-03-15")));
        assert!(is_eligible(&a, date("2025-03-15")));
    }
}
