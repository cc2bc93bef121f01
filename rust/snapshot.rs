use chrono::{Datelike, NaiveDate};
use tokio::sync::{Mutex, MutexGuard};

use crate::models::{Announcement, CalendarEvent, Category, Grade};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl std::fmt::Display for YearMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarSnapshot {
    pub events: Vec<CalendarEvent>,
    pub month: YearMonth,
}

pub struct Slot<T> {
    category: Category,
    state: Mutex<T>,
}

impl<T: Clone> Slot<T> {
    fn new(category: Category, initial: T) -> Self {
        Self {
            category,
            state: Mutex::new(initial),
        }
    }

    /// The slot is also the category's in-flight guard: `None` means a
    /// previous check still holds it and this tick is skipped.
    pub fn claim(&self) -> Option<MutexGuard<'_, T>> {
        match self.state.try_lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                tracing::debug!(
                    category = %self.category,
                    "Previous check still in flight, skipping this tick"
                );
                None
            }
        }
    }

    pub async fn wait(&self) -> MutexGuard<'_, T> {
        self.state.lock().await
    }

    #[cfg(test)]
    pub async fn get(&self) -> T {
        self.state.lock().await.clone()
    }
}

pub struct SnapshotStore {
    pub announcements: Slot<Vec<Announcement>>,
    pub calendar: Slot<CalendarSnapshot>,
    /// Unread message ids seen on the previous inbox check.
    pub inbox: Slot<Vec<String>>,
    pub grades: Slot<Vec<Grade>>,
    pub lucky_number: Slot<Option<u32>>,
}

impl SnapshotStore {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            announcements: Slot::new(Category::Announcements, Vec::new()),
            calendar: Slot::new(
                Category::Calendar,
                CalendarSnapshot {
                    events: Vec::new(),
                    month: YearMonth::of(today),
                },
            ),
            inbox: Slot::new(Category::Inbox, Vec::new()),
            grades: Slot::new(Category::Grades, Vec::new()),
            lucky_number: Slot::new(Category::LuckyNumber, None),
        }
    }
}
