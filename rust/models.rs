use chrono::{DateTime, NaiveDate, Utc};

pub const GRADE_URL_PREFIX: &str = "https://synergia.librus.pl/przegladaj_oceny/szczegoly/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub title: String,
    pub content: String,
    pub author: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    /// Missing on entries the portal does not expose an id for.
    pub id: Option<String>,
    pub title: String,
    pub day: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKey {
    Id(String),
    Title(String),
}

impl CalendarEvent {
    pub fn key(&self) -> EventKey {
        match &self.id {
            Some(id) => EventKey::Id(id.clone()),
            None => EventKey::Title(self.title.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxMessage {
    pub id: String,
    pub author: String,
    pub title: String,
    pub read: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDetails {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author: String,
    pub url: String,
    pub read: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectGrades {
    pub name: String,
    pub semesters: Vec<SemesterGrades>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemesterGrades {
    pub grades: Vec<GradeEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeEntry {
    pub id: u64,
    pub value: String,
    pub info: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grade {
    pub id: u64,
    pub subject: String,
    pub value: String,
    pub info: String,
    pub url: String,
}

impl Grade {
    pub fn from_entry(subject: &str, entry: &GradeEntry) -> Self {
        Self {
            id: entry.id,
            subject: subject.to_string(),
            value: entry.value.clone(),
            info: entry.info.clone(),
            url: format!("{}{}", GRADE_URL_PREFIX, entry.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub login: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub author: Option<String>,
    pub color: Option<u32>,
    pub url: Option<String>,
    pub footer: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Embed {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Added,
    Removed,
}

impl Change {
    pub fn color(self) -> u32 {
        match self {
            Change::Added => 0x57f287,
            Change::Removed => 0xed4245,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Announcements,
    Calendar,
    Inbox,
    Grades,
    LuckyNumber,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Announcements => "announcements",
            Category::Calendar => "calendar",
            Category::Inbox => "inbox",
            Category::Grades => "grades",
            Category::LuckyNumber => "lucky_number",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
