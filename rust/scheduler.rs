use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::checks::{Checker, RoundGate};
use crate::models::{AccountInfo, Category};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    Completed,
    Suppressed,
}

pub struct Scheduler {
    checker: Arc<Checker>,
    period: Duration,
}

impl Scheduler {
    pub fn new(checker: Arc<Checker>, period: Duration) -> Self {
        Self { checker, period }
    }

    pub async fn prime(&self, login: &str, password: &str) -> Result<AccountInfo> {
        tracing::info!("Logging in");
        let account = self
            .checker
            .portal()
            .authorize(login, password)
            .await
            .context("Librus authentication failed")?;
        tracing::info!(
            login = %account.login,
            name = %format!("{} {}", account.first_name, account.last_name),
            "Logged in"
        );

        self.checker.prime().await;
        tracing::info!("Initialization done");
        Ok(account)
    }

    pub async fn run(self) {
        tracing::info!(
            period_secs = self.period.as_secs(),
            "Looking for changes"
        );

        let checker = self.checker.clone();
        tokio::spawn(async move {
            checker.check_inbox().await;
        });

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            tokio::spawn(run_round(self.checker.clone()));
        }
    }
}

pub async fn run_round(checker: Arc<Checker>) -> RoundOutcome {
    if checker.check_lucky_number().await == RoundGate::Maintenance {
        return RoundOutcome::Suppressed;
    }

    let checks: Vec<(Category, JoinHandle<usize>)> = vec![
        (Category::Announcements, {
            let checker = checker.clone();
            tokio::spawn(async move { checker.check_announcements().await })
        }),
        (Category::Calendar, {
            let checker = checker.clone();
            tokio::spawn(async move { checker.check_calendar().await })
        }),
        (Category::Inbox, {
            let checker = checker.clone();
            tokio::spawn(async move { checker.check_inbox().await })
        }),
        (Category::Grades, {
            let checker = checker.clone();
            tokio::spawn(async move { checker.check_grades().await })
        }),
    ];

    for (category, handle) in checks {
        if let Err(err) = handle.await {
            tracing::error!(%category, error = %err, "Check task failed");
        }
    }
    RoundOutcome::Completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    use crate::batcher::Batcher;
    use crate::checks::LUCKY_NUMBER_UNSET;
    use crate::models::{AccountInfo, Announcement, InboxMessage, MessageDetails};
    use crate::snapshot::SnapshotStore;
    use crate::testing::{MockPortal, RecordingNotifier};

    fn announcement(content: &str) -> Announcement {
        Announcement {
            title: "Ogłoszenie".to_string(),
            content: content.to_string(),
            author: "Dyrekcja".to_string(),
        }
    }

    fn setup() -> (Arc<MockPortal>, Arc<RecordingNotifier>, Arc<Checker>) {
        let portal = Arc::new(MockPortal::default());
        let sink = Arc::new(RecordingNotifier::default());
        let checker = Arc::new(Checker::new(
            portal.clone(),
            Batcher::new(sink.clone()),
            SnapshotStore::new(Local::now().date_naive()),
            None,
        ));
        (portal, sink, checker)
    }

    fn account() -> AccountInfo {
        AccountInfo {
            login: "1234567u".to_string(),
            first_name: "Anna".to_string(),
            last_name: "Nowak".to_string(),
        }
    }

    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polling_checks_inbox_at_once_and_rounds_on_each_period() {
        let (portal, sink, checker) = setup();
        *portal.lucky_number.lock().unwrap() = 5;
        *portal.announcements.lock().unwrap() = vec![announcement("A")];
        *portal.inbox.lock().unwrap() = vec![InboxMessage {
            id: "42".to_string(),
            author: "Wychowawca".to_string(),
            title: "Zebranie".to_string(),
            read: false,
        }];
        let period = Duration::from_secs(600);
        let polling = tokio::spawn(Scheduler::new(checker, period).run());

        settle().await;
        assert_eq!(portal.calls("inbox"), 1);
        assert_eq!(portal.calls("message"), 1);
        assert_eq!(portal.calls("lucky_number"), 0);
        assert_eq!(portal.calls("announcements"), 0);

        tokio::time::advance(period - Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(portal.calls("announcements"), 0);

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(portal.calls("lucky_number"), 1);
        assert_eq!(portal.calls("announcements"), 1);
        assert_eq!(portal.calls("calendar"), 1);
        assert_eq!(portal.calls("grades"), 1);
        assert_eq!(portal.calls("inbox"), 2);
        assert!(sink
            .embeds()
            .iter()
            .any(|embed| embed.footer.as_deref() == Some("Dodano ogłoszenie")));

        tokio::time::advance(period).await;
        settle().await;
        assert_eq!(portal.calls("announcements"), 2);

        polling.abort();
    }

    #[tokio::test]
    async fn failed_login_is_fatal() {
        let (portal, _sink, checker) = setup();
        *portal.announcements.lock().unwrap() = vec![announcement("A")];
        let scheduler = Scheduler::new(checker.clone(), Duration::from_secs(600));

        let result = scheduler.prime("login", "wrong").await;

        assert!(result.is_err());
        assert!(checker.store().announcements.get().await.is_empty());
    }

    #[tokio::test]
    async fn priming_survives_a_failing_category() {
        let (portal, sink, checker) = setup();
        *portal.account.lock().unwrap() = Some(account());
        *portal.announcements.lock().unwrap() = vec![announcement("A")];
        portal.fail("grades");
        let scheduler = Scheduler::new(checker.clone(), Duration::from_secs(600));

        let account = scheduler.prime("1234567u", "secret").await.unwrap();

        assert_eq!(account.first_name, "Anna");
        assert_eq!(checker.store().announcements.get().await, vec![announcement("A")]);
        assert!(sink.calls().is_empty());
    }

    #[tokio::test]
    async fn maintenance_suppresses_the_whole_round() {
        let (portal, sink, checker) = setup();
        *portal.lucky_number.lock().unwrap() = LUCKY_NUMBER_UNSET;
        *portal.announcements.lock().unwrap() = vec![announcement("A")];

        assert_eq!(run_round(checker.clone()).await, RoundOutcome::Suppressed);

        assert!(sink.calls().is_empty());
        assert!(checker.store().announcements.get().await.is_empty());
    }

    #[tokio::test]
    async fn open_round_runs_every_check() {
        let (portal, sink, checker) = setup();
        *portal.lucky_number.lock().unwrap() = 5;
        *portal.announcements.lock().unwrap() = vec![announcement("A")];
        *portal.inbox.lock().unwrap() = vec![InboxMessage {
            id: "42".to_string(),
            author: "Wychowawca".to_string(),
            title: "Zebranie".to_string(),
            read: false,
        }];
        portal.messages.lock().unwrap().insert(
            "42".to_string(),
            MessageDetails {
                id: "42".to_string(),
                title: "Zebranie".to_string(),
                content: "W czwartek o 17:00".to_string(),
                author: "Wychowawca".to_string(),
                url: "https://synergia.librus.pl/wiadomosci/1/5/42/f0".to_string(),
                read: false,
            },
        );

        assert_eq!(run_round(checker.clone()).await, RoundOutcome::Completed);

        let mut footers: Vec<String> = sink
            .embeds()
            .into_iter()
            .filter_map(|embed| embed.footer)
            .collect();
        footers.sort();
        assert_eq!(
            footers,
            vec!["Dodano ogłoszenie", "Nowa wiadomość", "Szczęśliwy numerek"]
        );
    }

    #[tokio::test]
    async fn one_failing_check_does_not_stop_the_others() {
        let (portal, sink, checker) = setup();
        *portal.lucky_number.lock().unwrap() = 5;
        *checker.store().lucky_number.wait().await = Some(5);
        *portal.announcements.lock().unwrap() = vec![announcement("A")];
        portal.fail("calendar");
        portal.fail("inbox");
        portal.fail("grades");

        assert_eq!(run_round(checker.clone()).await, RoundOutcome::Completed);

        assert_eq!(sink.embeds().len(), 1);
        assert_eq!(checker.store().announcements.get().await, vec![announcement("A")]);

        portal.recover("grades");
        assert_eq!(run_round(checker.clone()).await, RoundOutcome::Completed);
    }
}
