use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use base64::Engine;
use chrono::{Datelike, Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use crate::models::{
    AccountInfo, Announcement, CalendarEvent, GradeEntry, InboxMessage, MessageDetails,
    SemesterGrades, SubjectGrades,
};

const AUTH_URL: &str = "https://api.librus.pl/OAuth/Authorization?client_id=46";
const GRANT_URL: &str = "https://api.librus.pl/OAuth/Authorization/Grant?client_id=46";
const API_URL: &str = "https://synergia.librus.pl/gateway/api/2.0";
const MESSAGES_LOGIN_URL: &str = "https://synergia.librus.pl/wiadomosci3";
const MESSAGES_API_URL: &str = "https://wiadomosci.librus.pl/api";
const MESSAGE_URL_PREFIX: &str = "https://synergia.librus.pl/wiadomosci/1/5/";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) czujka-discord";
const UNKNOWN: &str = "Nieznany";

static BREAK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>|</p>|</div>").unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("portal returned {status} for {endpoint}")]
    Status { endpoint: String, status: StatusCode },

    #[error("unexpected response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        source: serde_json::Error,
    },
}

#[async_trait::async_trait]
pub trait Portal: Send + Sync {
    async fn authorize(&self, login: &str, password: &str) -> Result<AccountInfo, PortalError>;

    async fn announcements(&self) -> Result<Vec<Announcement>, PortalError>;

    async fn calendar(&self) -> Result<Vec<Vec<CalendarEvent>>, PortalError>;

    async fn inbox(&self, limit: usize) -> Result<Vec<InboxMessage>, PortalError>;

    async fn message(&self, id: &str) -> Result<MessageDetails, PortalError>;

    async fn grades(&self) -> Result<Vec<SubjectGrades>, PortalError>;

    /// Today's lucky number, `0` when the portal has none to give.
    async fn lucky_number(&self) -> Result<u32, PortalError>;
}

#[derive(Clone)]
struct Credentials {
    login: String,
    password: String,
}

pub struct LibrusClient {
    http: reqwest::Client,
    credentials: Mutex<Option<Credentials>>,
}

impl LibrusClient {
    pub fn new() -> Result<Self, PortalError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            credentials: Mutex::new(None),
        })
    }

    async fn login(&self, credentials: &Credentials) -> Result<AccountInfo, PortalError> {
        self.http
            .get(format!("{AUTH_URL}&response_type=code&scope=mydata"))
            .send()
            .await?;

        let response = self
            .http
            .post(AUTH_URL)
            .form(&[
                ("action", "login"),
                ("login", credentials.login.as_str()),
                ("pass", credentials.password.as_str()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PortalError::Auth(format!(
                "login form returned {}",
                response.status()
            )));
        }

        let response = self.http.get(GRANT_URL).send().await?;
        if !response.status().is_success() {
            return Err(PortalError::Auth(format!(
                "authorization grant returned {}",
                response.status()
            )));
        }

        let me: MeResponse = match self.fetch_json(&format!("{API_URL}/Me")).await {
            Err(PortalError::Status { status, .. }) if status == StatusCode::UNAUTHORIZED => {
                return Err(PortalError::Auth("session was not granted".to_string()));
            }
            other => other?,
        };

        if let Err(err) = self.http.get(MESSAGES_LOGIN_URL).send().await {
            tracing::warn!(error = %err, "Could not open messages session");
        }

        Ok(AccountInfo {
            login: me.me.account.login,
            first_name: me.me.account.first_name,
            last_name: me.me.account.last_name,
        })
    }

    async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, PortalError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PortalError::Status {
                endpoint: url.to_string(),
                status,
            });
        }
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|source| PortalError::Decode {
            endpoint: url.to_string(),
            source,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, PortalError> {
        match self.fetch_json(url).await {
            Err(PortalError::Status { status, .. }) if status == StatusCode::UNAUTHORIZED => {
                let credentials = self
                    .credentials
                    .lock()
                    .ok()
                    .and_then(|stored| stored.clone());
                let Some(credentials) = credentials else {
                    return Err(PortalError::Auth(
                        "session expired before authorization".to_string(),
                    ));
                };
                tracing::debug!(endpoint = url, "Session expired, authorizing again");
                self.login(&credentials).await?;
                self.fetch_json(url).await
            }
            other => other,
        }
    }

    async fn user_name(&self, id: &str, cache: &mut HashMap<String, String>) -> String {
        if let Some(name) = cache.get(id) {
            return name.clone();
        }
        let name = self
            .get_json::<UserResponse>(&format!("{API_URL}/Users/{id}"))
            .await
            .ok()
            .and_then(|resp| resp.user)
            .map(|user| format!("{} {}", user.first_name, user.last_name))
            .unwrap_or_else(|| UNKNOWN.to_string());
        cache.insert(id.to_string(), name.clone());
        name
    }
}

#[async_trait::async_trait]
impl Portal for LibrusClient {
    async fn authorize(&self, login: &str, password: &str) -> Result<AccountInfo, PortalError> {
        let credentials = Credentials {
            login: login.to_string(),
            password: password.to_string(),
        };
        let account = self.login(&credentials).await?;
        if let Ok(mut stored) = self.credentials.lock() {
            *stored = Some(credentials);
        }
        Ok(account)
    }

    async fn announcements(&self) -> Result<Vec<Announcement>, PortalError> {
        let response: SchoolNoticesResponse =
            self.get_json(&format!("{API_URL}/SchoolNotices")).await?;

        let mut notices = response.school_notices;
        notices.sort_by(|a, b| b.creation_date.cmp(&a.creation_date));

        let mut author_cache = HashMap::new();
        let mut announcements = Vec::with_capacity(notices.len());
        for notice in notices {
            let author = self.user_name(&notice.added_by.id, &mut author_cache).await;
            announcements.push(Announcement {
                title: notice.subject,
                content: html_to_text(&notice.content),
                author,
            });
        }
        Ok(announcements)
    }

    async fn calendar(&self) -> Result<Vec<Vec<CalendarEvent>>, PortalError> {
        let response: HomeWorksResponse = self.get_json(&format!("{API_URL}/HomeWorks")).await?;
        let today = Local::now().date_naive();

        let mut events: Vec<CalendarEvent> = response
            .home_works
            .into_iter()
            .filter_map(|raw| {
                let day = match NaiveDate::parse_from_str(&raw.date, "%Y-%m-%d") {
                    Ok(day) => day,
                    Err(err) => {
                        tracing::warn!(
                            id = %raw.id,
                            date = %raw.date,
                            error = %err,
                            "Skipping event with bad date"
                        );
                        return None;
                    }
                };
                Some(CalendarEvent {
                    id: Some(raw.id),
                    title: derive_title(&raw.content),
                    day,
                })
            })
            .filter(|event| event.day.year() == today.year() && event.day.month() == today.month())
            .collect();
        events.sort_by(|a, b| a.day.cmp(&b.day).then_with(|| a.id.cmp(&b.id)));

        let mut weeks: BTreeMap<(i32, u32), Vec<CalendarEvent>> = BTreeMap::new();
        for event in events {
            let week = event.day.iso_week();
            weeks
                .entry((week.year(), week.week()))
                .or_default()
                .push(event);
        }
        Ok(weeks.into_values().collect())
    }

    async fn inbox(&self, limit: usize) -> Result<Vec<InboxMessage>, PortalError> {
        let response: MessagesResponse<Vec<RawInboxMessage>> = self
            .get_json(&format!(
                "{MESSAGES_API_URL}/inbox/messages?page=1&limit={limit}"
            ))
            .await?;

        Ok(response
            .data
            .into_iter()
            .map(|raw| InboxMessage {
                id: raw.message_id,
                author: raw.sender_name,
                title: raw.topic,
                read: raw.read_date.is_some(),
            })
            .collect())
    }

    async fn message(&self, id: &str) -> Result<MessageDetails, PortalError> {
        let response: MessagesResponse<RawMessageDetails> = self
            .get_json(&format!("{MESSAGES_API_URL}/inbox/messages/{id}"))
            .await?;
        let raw = response.data;

        Ok(MessageDetails {
            url: format!("{MESSAGE_URL_PREFIX}{}/f0", raw.message_id),
            id: raw.message_id,
            title: raw.topic,
            content: decode_message_content(&raw.message),
            author: raw.sender_name,
            read: raw.read_date.is_some(),
        })
    }

    async fn grades(&self) -> Result<Vec<SubjectGrades>, PortalError> {
        let grades: GradesResponse = self.get_json(&format!("{API_URL}/Grades")).await?;
        let subjects: SubjectsResponse = self.get_json(&format!("{API_URL}/Subjects")).await?;
        let comments: CommentsResponse = match self
            .get_json(&format!("{API_URL}/Grades/Comments"))
            .await
        {
            Ok(comments) => comments,
            Err(err) => {
                tracing::warn!(error = %err, "Grade comments unavailable");
                CommentsResponse::default()
            }
        };

        let subject_names: HashMap<String, String> = subjects
            .subjects
            .into_iter()
            .map(|subject| (subject.id, subject.name))
            .collect();
        let comment_texts: HashMap<String, String> = comments
            .comments
            .into_iter()
            .map(|comment| (comment.id, comment.text))
            .collect();

        Ok(nest_grades(grades.grades, &subject_names, &comment_texts))
    }

    async fn lucky_number(&self) -> Result<u32, PortalError> {
        let response: LuckyNumberResponse =
            self.get_json(&format!("{API_URL}/LuckyNumbers")).await?;
        Ok(response
            .lucky_number
            .and_then(|lucky| lucky.lucky_number)
            .unwrap_or(0))
    }
}

fn nest_grades(
    grades: Vec<RawGrade>,
    subject_names: &HashMap<String, String>,
    comment_texts: &HashMap<String, String>,
) -> Vec<SubjectGrades> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut subjects: Vec<(String, BTreeMap<u32, Vec<GradeEntry>>)> = Vec::new();
    for grade in grades {
        let position = *positions.entry(grade.subject.id.clone()).or_insert_with(|| {
            let name = subject_names
                .get(&grade.subject.id)
                .cloned()
                .unwrap_or_else(|| UNKNOWN.to_string());
            subjects.push((name, BTreeMap::new()));
            subjects.len() - 1
        });

        let info = grade
            .comments
            .unwrap_or_default()
            .iter()
            .filter_map(|comment| comment_texts.get(&comment.id))
            .cloned()
            .collect::<Vec<_>>()
            .join("\n");

        subjects[position]
            .1
            .entry(grade.semester)
            .or_default()
            .push(GradeEntry {
                id: grade.id,
                value: grade.grade,
                info,
            });
    }

    subjects
        .into_iter()
        .map(|(name, semesters)| SubjectGrades {
            name,
            semesters: semesters
                .into_values()
                .map(|grades| SemesterGrades { grades })
                .collect(),
        })
        .collect()
}

pub fn html_to_text(html: &str) -> String {
    let text = BREAK_RE.replace_all(html, "\n");
    let text = TAG_RE.replace_all(&text, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    text.lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn decode_message_content(encoded: &str) -> String {
    match base64::engine::general_purpose::STANDARD.decode(encoded.trim()) {
        Ok(bytes) => html_to_text(&String::from_utf8_lossy(&bytes)),
        Err(_) => html_to_text(encoded),
    }
}

fn derive_title(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return "Wydarzenie".to_string();
    }
    let first_line = trimmed.lines().next().unwrap_or(trimmed).trim();
    if first_line.chars().count() <= 60 {
        first_line.to_string()
    } else {
        format!("{}...", first_line.chars().take(60).collect::<String>())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Number(id) => id.to_string(),
        RawId::Text(id) => id,
    })
}

fn id_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match RawId::deserialize(deserializer)? {
        RawId::Number(id) => Ok(id),
        RawId::Text(id) => id.parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawRef {
    #[serde(deserialize_with = "id_string")]
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MeResponse {
    me: RawMe,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawMe {
    account: RawAccount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawAccount {
    login: String,
    first_name: String,
    last_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UserResponse {
    user: Option<RawUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawUser {
    first_name: String,
    last_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SchoolNoticesResponse {
    #[serde(default)]
    school_notices: Vec<RawNotice>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawNotice {
    subject: String,
    content: String,
    added_by: RawRef,
    #[serde(default)]
    creation_date: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HomeWorksResponse {
    #[serde(default)]
    home_works: Vec<RawHomeWork>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawHomeWork {
    #[serde(deserialize_with = "id_string")]
    id: String,
    #[serde(default)]
    content: String,
    date: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInboxMessage {
    #[serde(deserialize_with = "id_string")]
    message_id: String,
    #[serde(default)]
    sender_name: String,
    #[serde(default)]
    topic: String,
    #[serde(default)]
    read_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessageDetails {
    #[serde(deserialize_with = "id_string")]
    message_id: String,
    #[serde(default)]
    topic: String,
    #[serde(rename = "Message", default)]
    message: String,
    #[serde(default)]
    sender_name: String,
    #[serde(default)]
    read_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GradesResponse {
    #[serde(default)]
    grades: Vec<RawGrade>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawGrade {
    #[serde(deserialize_with = "id_number")]
    id: u64,
    subject: RawRef,
    grade: String,
    semester: u32,
    #[serde(default)]
    comments: Option<Vec<RawRef>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SubjectsResponse {
    #[serde(default)]
    subjects: Vec<RawSubject>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawSubject {
    #[serde(deserialize_with = "id_string")]
    id: String,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CommentsResponse {
    #[serde(default)]
    comments: Vec<RawComment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawComment {
    #[serde(deserialize_with = "id_string")]
    id: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LuckyNumberResponse {
    #[serde(default)]
    lucky_number: Option<RawLuckyNumber>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawLuckyNumber {
    #[serde(default)]
    lucky_number: Option<u32>,
}
