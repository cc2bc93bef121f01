use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveTime};

use crate::batcher::Batcher;
use crate::diff::changes;
use crate::librus::{Portal, PortalError};
use crate::models::{
    Announcement, CalendarEvent, Category, Change, Embed, Grade, InboxMessage, SubjectGrades,
};
use crate::snapshot::{SnapshotStore, YearMonth};

pub const INBOX_WINDOW: usize = 20;

pub const LUCKY_NUMBER_UNSET: u32 = 0;

const LUCKY_NUMBER_COLOR: u32 = 0xfee75c;
const MESSAGE_COLOR: u32 = 0x3498db;

/// Source of "today". Read after a fetch returns, never before.
pub type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundGate {
    Open,
    Maintenance,
}

pub struct Checker {
    portal: Arc<dyn Portal>,
    batcher: Batcher,
    store: SnapshotStore,
    student_index: Option<u32>,
    clock: Clock,
}

impl Checker {
    pub fn new(
        portal: Arc<dyn Portal>,
        batcher: Batcher,
        store: SnapshotStore,
        student_index: Option<u32>,
    ) -> Self {
        Self {
            portal,
            batcher,
            store,
            student_index,
            clock: Arc::new(|| Local::now().date_naive()),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn portal(&self) -> &dyn Portal {
        self.portal.as_ref()
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub async fn prime(&self) {
        tracing::info!("Pre-fetching announcements");
        match self.portal.announcements().await {
            Ok(announcements) => *self.store.announcements.wait().await = announcements,
            Err(err) => log_fetch_failure(Category::Announcements, &err),
        }

        tracing::info!("Pre-fetching calendar");
        match self.portal.calendar().await {
            Ok(weeks) => {
                let mut calendar = self.store.calendar.wait().await;
                calendar.events = weeks.into_iter().flatten().collect();
                calendar.month = YearMonth::of((self.clock)());
            }
            Err(err) => log_fetch_failure(Category::Calendar, &err),
        }

        tracing::info!("Pre-fetching grades");
        match self.portal.grades().await {
            Ok(subjects) => *self.store.grades.wait().await = flatten_grades(subjects),
            Err(err) => log_fetch_failure(Category::Grades, &err),
        }

        tracing::info!("Pre-fetching lucky number");
        match self.portal.lucky_number().await {
            Ok(LUCKY_NUMBER_UNSET) => {
                tracing::info!("Lucky number unset, portal is probably in maintenance");
            }
            Ok(number) => *self.store.lucky_number.wait().await = Some(number),
            Err(err) => log_fetch_failure(Category::LuckyNumber, &err),
        }
    }

    pub async fn check_announcements(&self) -> usize {
        let Some(mut snapshot) = self.store.announcements.claim() else {
            return 0;
        };
        tracing::debug!("Checking announcements");

        let fresh = match self.portal.announcements().await {
            Ok(fresh) => fresh,
            Err(err) => {
                log_fetch_failure(Category::Announcements, &err);
                return 0;
            }
        };
        tracing::debug!(
            fetched = fresh.len(),
            known = snapshot.len(),
            "Fetched announcements"
        );

        let payloads = announcement_payloads(&snapshot, &fresh);
        *snapshot = fresh;
        self.deliver(Category::Announcements, payloads).await
    }

    pub async fn check_calendar(&self) -> usize {
        let Some(mut snapshot) = self.store.calendar.claim() else {
            return 0;
        };
        tracing::debug!("Checking calendar");

        let fresh: Vec<CalendarEvent> = match self.portal.calendar().await {
            Ok(weeks) => weeks.into_iter().flatten().collect(),
            Err(err) => {
                log_fetch_failure(Category::Calendar, &err);
                return 0;
            }
        };

        // The portal filters by the month current when it answers.
        let month = YearMonth::of((self.clock)());
        if snapshot.month != month {
            tracing::info!(
                previous = %snapshot.month,
                current = %month,
                events = fresh.len(),
                "Starting new month, calendar snapshot reset"
            );
            snapshot.events = fresh;
            snapshot.month = month;
            return 0;
        }

        tracing::debug!(
            fetched = fresh.len(),
            known = snapshot.events.len(),
            "Fetched calendar events"
        );
        let payloads = calendar_payloads(&snapshot.events, &fresh);
        snapshot.events = fresh;
        self.deliver(Category::Calendar, payloads).await
    }

    pub async fn check_inbox(&self) -> usize {
        let Some(mut previous_unread) = self.store.inbox.claim() else {
            return 0;
        };
        tracing::debug!("Checking inbox");

        let messages = match self.portal.inbox(INBOX_WINDOW).await {
            Ok(messages) => messages,
            Err(err) => {
                log_fetch_failure(Category::Inbox, &err);
                return 0;
            }
        };

        let unread: Vec<&InboxMessage> = messages
            .iter()
            .take(INBOX_WINDOW)
            .filter(|message| !message.read)
            .collect();

        let repeated = unread
            .iter()
            .filter(|message| previous_unread.contains(&message.id))
            .count();
        if repeated > 0 {
            tracing::debug!(repeated, "Unread messages already sent on a previous check");
        }

        let mut payloads = Vec::with_capacity(unread.len());
        for message in &unread {
            tracing::debug!(
                message_id = %message.id,
                author = %message.author,
                title = %message.title,
                "Found unread message"
            );
            match self.portal.message(&message.id).await {
                Ok(details) => {
                    tracing::debug!(message_id = %details.id, read = details.read, "Fetched message");
                    payloads.push(
                        Embed::new(details.title, details.content)
                            .author(details.author)
                            .url(details.url)
                            .color(MESSAGE_COLOR)
                            .footer("Nowa wiadomość"),
                    );
                }
                Err(err) => tracing::warn!(
                    category = %Category::Inbox,
                    message_id = %message.id,
                    error = %err,
                    "Failed to fetch message details, skipping"
                ),
            }
        }

        *previous_unread = unread.iter().map(|message| message.id.clone()).collect();
        self.deliver(Category::Inbox, payloads).await
    }

    pub async fn check_grades(&self) -> usize {
        let Some(mut snapshot) = self.store.grades.claim() else {
            return 0;
        };
        tracing::debug!("Checking grades");

        let fresh = match self.portal.grades().await {
            Ok(subjects) => flatten_grades(subjects),
            Err(err) => {
                log_fetch_failure(Category::Grades, &err);
                return 0;
            }
        };
        tracing::debug!(fetched = fresh.len(), known = snapshot.len(), "Fetched grades");

        let payloads = grade_payloads(&snapshot, &fresh);
        *snapshot = fresh;
        self.deliver(Category::Grades, payloads).await
    }

    pub async fn check_lucky_number(&self) -> RoundGate {
        let Some(mut stored) = self.store.lucky_number.claim() else {
            return RoundGate::Open;
        };
        tracing::debug!("Checking lucky number");

        let number = match self.portal.lucky_number().await {
            Ok(number) => number,
            Err(err) => {
                log_fetch_failure(Category::LuckyNumber, &err);
                return RoundGate::Open;
            }
        };

        if number == LUCKY_NUMBER_UNSET {
            tracing::info!("Lucky number unset, portal is probably in maintenance; skipping round");
            return RoundGate::Maintenance;
        }

        if *stored == Some(number) {
            return RoundGate::Open;
        }

        tracing::debug!(previous = ?*stored, current = number, "Lucky number changed");
        *stored = Some(number);
        let payload = lucky_number_payload(number, self.student_index);
        self.deliver(Category::LuckyNumber, vec![payload]).await;
        RoundGate::Open
    }

    async fn deliver(&self, category: Category, payloads: Vec<Embed>) -> usize {
        if payloads.is_empty() {
            tracing::debug!(%category, "No changes");
            return 0;
        }
        tracing::info!(%category, count = payloads.len(), "Changes detected");
        let report = self.batcher.send(category, &payloads).await;
        if report.failed > 0 {
            tracing::warn!(
                %category,
                failed_batches = report.failed,
                delivered_batches = report.delivered,
                "Some changes were dropped; the snapshot has already moved on"
            );
        }
        payloads.len()
    }
}

fn log_fetch_failure(category: Category, err: &PortalError) {
    tracing::warn!(%category, error = %err, "Fetch failed, keeping previous snapshot");
}

pub fn announcement_payloads(known: &[Announcement], fresh: &[Announcement]) -> Vec<Embed> {
    let Some(delta) = changes(known, fresh, |a| a.content.clone()) else {
        return Vec::new();
    };

    let embed = |announcement: &Announcement, change: Change| {
        let footer = match change {
            Change::Added => "Dodano ogłoszenie",
            Change::Removed => "Usunięto ogłoszenie",
        };
        Embed::new(&announcement.title, &announcement.content)
            .author(&announcement.author)
            .color(change.color())
            .footer(footer)
    };

    delta
        .added
        .iter()
        .map(|a| embed(a, Change::Added))
        .chain(delta.removed.iter().map(|a| embed(a, Change::Removed)))
        .collect()
}

pub fn calendar_payloads(known: &[CalendarEvent], fresh: &[CalendarEvent]) -> Vec<Embed> {
    let Some(delta) = changes(known, fresh, CalendarEvent::key) else {
        return Vec::new();
    };

    let embed = |event: &CalendarEvent, change: Change| {
        let footer = match change {
            Change::Added => "Dodano wydarzenie",
            Change::Removed => "Usunięto wydarzenie",
        };
        Embed::new(&event.title, &event.title)
            .color(change.color())
            .footer(footer)
            .timestamp(event.day.and_time(NaiveTime::MIN).and_utc())
    };

    delta
        .added
        .iter()
        .map(|e| embed(e, Change::Added))
        .chain(delta.removed.iter().map(|e| embed(e, Change::Removed)))
        .collect()
}

/// Sorted by grade id, so fetch order never shows up as a change.
pub fn flatten_grades(subjects: Vec<SubjectGrades>) -> Vec<Grade> {
    let mut grades: Vec<Grade> = subjects
        .iter()
        .flat_map(|subject| {
            subject
                .semesters
                .iter()
                .flat_map(|semester| semester.grades.iter())
                .map(|entry| Grade::from_entry(&subject.name, entry))
        })
        .collect();
    grades.sort_by_key(|grade| grade.id);
    grades
}

pub fn grade_payloads(known: &[Grade], fresh: &[Grade]) -> Vec<Embed> {
    let Some(delta) = changes(known, fresh, |g| g.id) else {
        return Vec::new();
    };

    let embed = |grade: &Grade, change: Change| {
        let footer = match change {
            Change::Added => "Dodano ocenę",
            Change::Removed => "Usunięto ocenę",
        };
        let mut description = format!("Ocena: **{}**", grade.value);
        if !grade.info.is_empty() {
            description.push('\n');
            description.push_str(&grade.info);
        }
        Embed::new(&grade.subject, description)
            .url(&grade.url)
            .color(change.color())
            .footer(footer)
    };

    delta
        .removed
        .iter()
        .map(|g| embed(g, Change::Removed))
        .chain(delta.added.iter().map(|g| embed(g, Change::Added)))
        .collect()
}

pub fn lucky_number_payload(number: u32, student_index: Option<u32>) -> Embed {
    let mut description = format!("Dzisiejszy szczęśliwy numerek: **{number}**");
    if student_index == Some(number) {
        description.push_str("\n🎉 To Twój numerek! Dziś nie będziesz pytany.");
    }
    Embed::new("Szczęśliwy numerek", description)
        .color(LUCKY_NUMBER_COLOR)
        .footer("Szczęśliwy numerek")
}
