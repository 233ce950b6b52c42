// Integration tests for Runtime::run
// These tests mount components and check what happens on unmount.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::BoxFuture;
use reims_query::{
    command::{Action, Command},
    component::Component,
    query::{Query, QueryClient, QueryError, QueryOptions, QueryResult},
    runtime::Runtime,
    subscription::{Subscription, time::Timer},
};
use tokio::time::{Duration, Instant, advance};

fn counting(calls: &Arc<AtomicUsize>) -> impl Fn() -> BoxFuture<'static, Result<usize, QueryError>> + Send + Sync + 'static {
    let calls = Arc::clone(calls);
    move || -> BoxFuture<'static, Result<usize, QueryError>> {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        Box::pin(async move { Ok(n) })
    }
}

// Helper: polls one query until it has seen `quit_after` successes
struct Poller {
    client: Arc<QueryClient>,
    calls: Arc<AtomicUsize>,
    successes: usize,
    quit_after: usize,
}

#[derive(Debug)]
enum PollerMessage {
    Kpis(QueryResult<usize>),
}

impl Component for Poller {
    type Message = PollerMessage;
    type Flags = (Arc<QueryClient>, Arc<AtomicUsize>, usize);

    fn new((client, calls, quit_after): Self::Flags) -> (Self, Command<Self::Message>) {
        let cmd = if quit_after == 0 {
            Command::effect(Action::Quit)
        } else {
            Command::none()
        };

        (
            Poller {
                client,
                calls,
                successes: 0,
                quit_after,
            },
            cmd,
        )
    }

    fn update(&mut self, msg: Self::Message) -> Command<Self::Message> {
        match msg {
            PollerMessage::Kpis(result) => {
                if result.is_success() {
                    self.successes += 1;
                }
                if self.successes >= self.quit_after {
                    Command::effect(Action::Quit)
                } else {
                    Command::none()
                }
            }
        }
    }

    fn subscriptions(&self) -> Vec<Subscription<Self::Message>> {
        vec![
            Subscription::new(
                Query::new(&"kpis", counting(&self.calls), Arc::clone(&self.client))
                    .with_options(QueryOptions::default().refetch_interval(Duration::from_secs(1))),
            )
            .map(PollerMessage::Kpis),
        ]
    }
}

#[tokio::test(start_paused = true)]
async fn test_quit_on_init() {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = Arc::new(QueryClient::new());

    let poller = Runtime::<Poller>::new((client, Arc::clone(&calls), 0))
        .run()
        .await
        .expect("runtime");

    assert_eq!(poller.successes, 0);
    advance(Duration::from_secs(5)).await;
    tokio::task::yield_now().await;
    assert!(calls.load(Ordering::SeqCst) <= 1);
}

#[tokio::test(start_paused = true)]
async fn test_interval_stops_after_unmount() {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = Arc::new(QueryClient::new());
    let start = Instant::now();

    let poller = Runtime::<Poller>::new((Arc::clone(&client), Arc::clone(&calls), 3))
        .run()
        .await
        .expect("runtime");

    assert_eq!(poller.successes, 3);
    assert_eq!(start.elapsed(), Duration::from_secs(2));
    let fetched = calls.load(Ordering::SeqCst);
    assert_eq!(fetched, 3);

    advance(Duration::from_secs(30)).await;
    tokio::task::yield_now().await;
    assert_eq!(calls.load(Ordering::SeqCst), fetched);
}

// Helper: declares its query only while `watching` is set, and quits on a timer
struct Toggle {
    client: Arc<QueryClient>,
    calls: Arc<AtomicUsize>,
    watching: bool,
    successes: usize,
}

#[derive(Debug)]
enum ToggleMessage {
    Alerts(QueryResult<usize>),
    Done,
}

impl Component for Toggle {
    type Message = ToggleMessage;
    type Flags = (Arc<QueryClient>, Arc<AtomicUsize>);

    fn new((client, calls): Self::Flags) -> (Self, Command<Self::Message>) {
        (
            Toggle {
                client,
                calls,
                watching: true,
                successes: 0,
            },
            Command::none(),
        )
    }

    fn update(&mut self, msg: Self::Message) -> Command<Self::Message> {
        match msg {
            ToggleMessage::Alerts(result) => {
                if result.is_success() {
                    self.successes += 1;
                    // unmount the query after its second result
                    self.watching = self.successes < 2;
                }
                Command::none()
            }
            ToggleMessage::Done => Command::effect(Action::Quit),
        }
    }

    fn subscriptions(&self) -> Vec<Subscription<Self::Message>> {
        let mut subs = vec![Subscription::new(Timer::new(Duration::from_secs(5))).map(|_| ToggleMessage::Done)];
        if self.watching {
            subs.push(
                Subscription::new(
                    Query::new(&"alerts", counting(&self.calls), Arc::clone(&self.client))
                        .with_options(QueryOptions::default().refetch_interval(Duration::from_secs(1))),
                )
                .map(ToggleMessage::Alerts),
            );
        }
        subs
    }
}

#[tokio::test(start_paused = true)]
async fn test_undeclared_query_stops_refetching() {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = Arc::new(QueryClient::new());
    let start = Instant::now();

    let toggle = Runtime::<Toggle>::new((Arc::clone(&client), Arc::clone(&calls)))
        .run()
        .await
        .expect("runtime");

    assert_eq!(start.elapsed(), Duration::from_secs(5));
    assert!(!toggle.watching);
    assert_eq!(toggle.successes, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_remounted_query_reads_cache() {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = Arc::new(QueryClient::with_config(reims_query::query::QueryConfig::new(
        Duration::from_secs(60),
        Duration::from_secs(300),
    )));

    Runtime::<Poller>::new((Arc::clone(&client), Arc::clone(&calls), 1))
        .run()
        .await
        .expect("first mount");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // A second component sees the cached result before any interval tick.
    let poller = Runtime::<Poller>::new((Arc::clone(&client), Arc::clone(&calls), 1))
        .run()
        .await
        .expect("second mount");
    assert_eq!(poller.successes, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
