use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::librus::{Portal, PortalError};
use crate::models::{
    AccountInfo, Announcement, CalendarEvent, Embed, InboxMessage, MessageDetails, SubjectGrades,
};
use crate::webhook::{Notifier, NotifyError};

#[derive(Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<Vec<Embed>>>,
    attempts: AtomicUsize,
    fail_on: HashSet<usize>,
}

impl RecordingNotifier {
    /// Fails the given zero-based send attempts.
    pub fn failing_on(attempts: &[usize]) -> Self {
        Self {
            fail_on: attempts.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Vec<Embed>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn embeds(&self) -> Vec<Embed> {
        self.calls().concat()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, embeds: &[Embed]) -> Result<(), NotifyError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_on.contains(&attempt) {
            return Err(NotifyError::Status {
                status: reqwest::StatusCode::BAD_GATEWAY,
                body: "mock failure".to_string(),
            });
        }
        self.calls.lock().unwrap().push(embeds.to_vec());
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "recording"
    }
}

#[derive(Default)]
pub struct MockPortal {
    pub account: Mutex<Option<AccountInfo>>,
    pub announcements: Mutex<Vec<Announcement>>,
    pub calendar: Mutex<Vec<Vec<CalendarEvent>>>,
    pub inbox: Mutex<Vec<InboxMessage>>,
    pub messages: Mutex<HashMap<String, MessageDetails>>,
    pub grades: Mutex<Vec<SubjectGrades>>,
    pub lucky_number: Mutex<u32>,
    pub failing: Mutex<HashSet<&'static str>>,
    invoked: Mutex<HashMap<&'static str, usize>>,
}

impl MockPortal {
    pub fn fail(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    pub fn recover(&self, operation: &'static str) {
        self.failing.lock().unwrap().remove(operation);
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.invoked
            .lock()
            .unwrap()
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    fn check(&self, operation: &'static str) -> Result<(), PortalError> {
        *self.invoked.lock().unwrap().entry(operation).or_default() += 1;
        if self.failing.lock().unwrap().contains(operation) {
            return Err(PortalError::Status {
                endpoint: operation.to_string(),
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Portal for MockPortal {
    async fn authorize(&self, _login: &str, _password: &str) -> Result<AccountInfo, PortalError> {
        self.check("authorize")?;
        self.account
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| PortalError::Auth("invalid credentials".to_string()))
    }

    async fn announcements(&self) -> Result<Vec<Announcement>, PortalError> {
        self.check("announcements")?;
        Ok(self.announcements.lock().unwrap().clone())
    }

    async fn calendar(&self) -> Result<Vec<Vec<CalendarEvent>>, PortalError> {
        self.check("calendar")?;
        Ok(self.calendar.lock().unwrap().clone())
    }

    async fn inbox(&self, limit: usize) -> Result<Vec<InboxMessage>, PortalError> {
        self.check("inbox")?;
        Ok(self.inbox.lock().unwrap().iter().take(limit).cloned().collect())
    }

    async fn message(&self, id: &str) -> Result<MessageDetails, PortalError> {
        self.check("message")?;
        self.messages
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| PortalError::Status {
                endpoint: format!("inbox/messages/{id}"),
                status: reqwest::StatusCode::NOT_FOUND,
            })
    }

    async fn grades(&self) -> Result<Vec<SubjectGrades>, PortalError> {
        self.check("grades")?;
        Ok(self.grades.lock().unwrap().clone())
    }

    async fn lucky_number(&self) -> Result<u32, PortalError> {
        self.check("lucky_number")?;
        Ok(*self.lucky_number.lock().unwrap())
    }
}
