//! Headless REIMS dashboard.
//!
//! Mounts a dashboard component that keeps KPIs and alerts fresh through the
//! query cache and logs every result it would render.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};

use reims_query::api::ApiClient;
use reims_query::api::keys;
use reims_query::api::models::{Alert, ExitAnalysis, KpiSummary};
use reims_query::cache::{FilePersister, QueryCache};
use reims_query::config::ClientConfig;
use reims_query::logging::init_logging;
use reims_query::prelude::*;

/// Watch REIMS portfolio KPIs and alerts from the terminal
#[derive(Parser, Debug)]
#[command(name = "reims-watch")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file; defaults to config/default and config/local
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend base URL, overriding the configuration
    #[arg(long)]
    base_url: Option<String>,

    /// Refetch interval in seconds
    #[arg(short, long, default_value_t = 30)]
    interval: u64,

    /// Also watch the exit-strategy analysis of this property
    #[arg(long)]
    property: Option<u64>,

    /// Acknowledge this alert on startup, then refetch alerts
    #[arg(long)]
    acknowledge: Option<u64>,

    /// Unmount after this many query results
    #[arg(long)]
    max_updates: Option<usize>,
}

struct Flags {
    api: ApiClient,
    client: Arc<QueryClient>,
    interval: Duration,
    property: Option<u64>,
    acknowledge: Option<u64>,
    max_updates: Option<usize>,
}

#[derive(Debug)]
enum Message {
    Kpis(QueryResult<KpiSummary>),
    Alerts(QueryResult<Vec<Alert>>),
    ExitStrategies(QueryResult<ExitAnalysis>),
    Acknowledged(MutationResult<Alert>),
    Interrupted,
}

struct Dashboard {
    api: ApiClient,
    client: Arc<QueryClient>,
    interval: Duration,
    property: Option<u64>,
    max_updates: Option<usize>,
    updates: usize,
}

impl Dashboard {
    fn options(&self) -> QueryOptions {
        QueryOptions::default().refetch_interval(self.interval)
    }

    /// Counts a query result and unmounts once the limit is reached.
    fn record_update(&mut self) -> Command<Message> {
        self.updates += 1;
        match self.max_updates {
            Some(max) if self.updates >= max => {
                tracing::info!(updates = self.updates, "update limit reached");
                Command::effect(Action::Quit)
            }
            _ => Command::none(),
        }
    }
}

impl Component for Dashboard {
    type Message = Message;
    type Flags = Flags;

    fn new(flags: Flags) -> (Self, Command<Message>) {
        let interrupted = Command::perform(tokio::signal::ctrl_c(), |_| Message::Interrupted);

        let acknowledge = match flags.acknowledge {
            Some(id) => flags
                .api
                .acknowledge_alert_mutation()
                .on_success(|alert| tracing::info!(alert = alert.id, "alert acknowledged"))
                .on_error(|err| tracing::warn!(error = %err, "acknowledge failed"))
                .mutate(id)
                .map(Message::Acknowledged),
            None => Command::none(),
        };

        let dashboard = Self {
            api: flags.api,
            client: flags.client,
            interval: flags.interval,
            property: flags.property,
            max_updates: flags.max_updates,
            updates: 0,
        };

        (dashboard, Command::batch([interrupted, acknowledge]))
    }

    fn update(&mut self, msg: Message) -> Command<Message> {
        match msg {
            Message::Kpis(result) => {
                match (&result.state, result.data()) {
                    (QueryState::Error { error, .. }, _) => {
                        tracing::warn!(error = %error, stale_data = result.data().is_some(), "kpis failed");
                    }
                    (_, Some(kpis)) => tracing::info!(
                        properties = kpis.total_properties,
                        occupancy = kpis.occupancy_rate,
                        noi = kpis.noi,
                        dscr = ?kpis.dscr,
                        stale = result.is_stale(),
                        fetching = result.is_fetching,
                        "kpis"
                    ),
                    (_, None) => tracing::info!(status = ?result.status(), "kpis loading"),
                }
                self.record_update()
            }
            Message::Alerts(result) => {
                if let Some(error) = result.error() {
                    tracing::warn!(error = %error, "alerts failed");
                } else if let Some(alerts) = result.data() {
                    let open = alerts.iter().filter(|a| !a.acknowledged).count();
                    tracing::info!(total = alerts.len(), open, fetching = result.is_fetching, "alerts");
                    for alert in alerts.iter().filter(|a| !a.acknowledged) {
                        tracing::info!(id = alert.id, severity = ?alert.severity, "{}", alert.message);
                    }
                }
                self.record_update()
            }
            Message::ExitStrategies(result) => {
                if let Some(error) = result.error() {
                    tracing::warn!(error = %error, "exit strategies failed");
                } else if let Some(best) = result.data().and_then(ExitAnalysis::best_scenario) {
                    tracing::info!(strategy = %best.strategy, irr = ?best.irr, npv = ?best.npv, "best exit");
                }
                self.record_update()
            }
            Message::Acknowledged(result) if result.is_success() => self.client.refetch(&keys::ALERTS),
            Message::Acknowledged(_) => Command::none(),
            Message::Interrupted => {
                tracing::info!("interrupted");
                Command::effect(Action::Quit)
            }
        }
    }

    fn subscriptions(&self) -> Vec<Subscription<Message>> {
        let mut subscriptions = vec![
            Subscription::new(self.api.kpis_query(self.client.clone()).with_options(self.options()))
                .map(Message::Kpis),
            Subscription::new(self.api.alerts_query(self.client.clone()).with_options(self.options()))
                .map(Message::Alerts),
        ];

        if let Some(property) = self.property {
            subscriptions.push(
                Subscription::new(
                    self.api
                        .exit_strategies_query(property, self.client.clone())
                        .with_options(self.options()),
                )
                .map(Message::ExitStrategies),
            );
        }

        subscriptions
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ClientConfig::load_from(path),
        None => ClientConfig::load(),
    }
    .wrap_err("failed to load configuration")?;
    if let Some(base_url) = cli.base_url {
        config.api.base_url = base_url;
    }

    init_logging(&config.logging)?;

    let api = ApiClient::from_settings(&config.api).await?;

    let cache = match &config.cache.persist_path {
        Some(path) => {
            let cache = QueryCache::with_persister(config.cache.ttl(), Arc::new(FilePersister::new(path)));
            match cache.hydrate().await {
                Ok(restored) => tracing::info!(restored, path = %path.display(), "cache hydrated"),
                Err(err) => tracing::warn!(error = %err, "failed to hydrate cache"),
            }
            cache
        }
        None => QueryCache::new(config.cache.ttl()),
    };
    let cache = Arc::new(cache);
    let sweeper = cache.spawn_sweeper(config.cache.sweep_interval());

    let client = Arc::new(QueryClient::with_cache(config.query_config(), cache));

    tracing::info!(base_url = %api.base_url(), interval = cli.interval, "mounting dashboard");

    let dashboard = Runtime::<Dashboard>::new(Flags {
        api,
        client,
        interval: Duration::from_secs(cli.interval.max(1)),
        property: cli.property,
        acknowledge: cli.acknowledge,
        max_updates: cli.max_updates,
    })
    .run()
    .await?;

    sweeper.stop().await;
    tracing::info!(updates = dashboard.updates, "dashboard unmounted");

    Ok(())
}
