// SPDX-License-Identifier: MPL-2.0

//! Monitor views
//!
//! A view is a set of poll jobs plus a layout. Opening a view starts its
//! own [`Scheduler`]; leaving it stops that scheduler. Data already in the
//! [`Store`] (including the resource history) stays put across switches.

use crate::api::ApiClient;
use crate::config::Config;
use crate::render::{self, Theme};
use crate::scheduler::{PollJob, Scheduler, TimerMode};
use crate::state::{AppState, Payload, Selector, Slice, Store};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Window shown by the statistics view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeRange {
    #[default]
    Hour,
    SixHours,
    Day,
    Week,
}

impl TimeRange {
    pub fn minutes(&self) -> u32 {
        match self {
            TimeRange::Hour => 60,
            TimeRange::SixHours => 360,
            TimeRange::Day => 1_440,
            TimeRange::Week => 10_080,
        }
    }

    pub fn hours(&self) -> u32 {
        self.minutes() / 60
    }

    pub fn buckets(&self) -> usize {
        match self {
            TimeRange::Hour => 12,
            TimeRange::SixHours => 24,
            TimeRange::Day => 48,
            TimeRange::Week => 84,
        }
    }

    /// Coarser ranges change slowly, so they poll less often.
    pub fn poll_interval(&self) -> Duration {
        match self {
            TimeRange::Hour => Duration::from_secs(60),
            TimeRange::SixHours => Duration::from_secs(5 * 60),
            TimeRange::Day => Duration::from_secs(15 * 60),
            TimeRange::Week => Duration::from_secs(30 * 60),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1h" => Some(TimeRange::Hour),
            "6h" => Some(TimeRange::SixHours),
            "24h" | "1d" => Some(TimeRange::Day),
            "7d" | "1w" => Some(TimeRange::Week),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimeRange::Hour => "1h",
            TimeRange::SixHours => "6h",
            TimeRange::Day => "24h",
            TimeRange::Week => "7d",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Dashboard,
    Statistics(TimeRange),
    Logs,
    System,
}

impl View {
    pub fn title(&self) -> String {
        match self {
            View::Dashboard => String::from("Dashboard"),
            View::Statistics(range) => format!("Statistics ({})", range.label()),
            View::Logs => String::from("Logs"),
            View::System => String::from("System"),
        }
    }

    /// State slices this view polls and draws.
    pub fn slices(&self) -> &'static [Slice] {
        match self {
            View::Dashboard => &[Slice::Stats, Slice::Packets, Slice::Hardware],
            View::Statistics(_) => &[
                Slice::Bucketed,
                Slice::Utilization,
                Slice::PacketTypeGraph,
                Slice::NoiseFloor,
            ],
            View::Logs => &[Slice::Logs],
            View::System => &[Slice::Stats, Slice::MetricsGraph, Slice::Hardware],
        }
    }

    /// Load times and errors of this view's slices.
    pub fn stamp(&self, state: &AppState) -> ViewStamp {
        let slices = self.slices();
        ViewStamp {
            updated: slices.iter().map(|s| state.updated_at.get(s).copied()).collect(),
            errors: slices.iter().map(|s| state.error(*s).map(String::from)).collect(),
        }
    }

    /// Selector that wakes only when one of this view's slices loads or
    /// changes error state.
    pub fn select(
        &self,
        store: &Store,
    ) -> Selector<ViewStamp, impl Fn(&AppState) -> ViewStamp + use<>> {
        let view = *self;
        store.select(move |state| view.stamp(state))
    }

    /// Poll jobs this view needs while it is open.
    pub fn jobs(&self, config: &Config) -> Vec<PollJob> {
        let hardware = PollJob::new("hardware", Slice::Hardware, config.hardware_interval())
            .with_timer(if config.hardware_dedicated_timer {
                TimerMode::DedicatedThread
            } else {
                TimerMode::Runtime
            });
        match self {
            View::Dashboard => vec![
                PollJob::new("stats", Slice::Stats, config.dashboard_interval()),
                PollJob::new("recent_packets", Slice::Packets, config.dashboard_interval()),
                hardware,
            ],
            View::Statistics(range) => {
                let every = range.poll_interval();
                vec![
                    PollJob::new("bucketed_stats", Slice::Bucketed, every),
                    PollJob::new("utilization_stats", Slice::Utilization, every),
                    PollJob::new("packet_type_graph", Slice::PacketTypeGraph, every),
                    PollJob::new("noise_floor", Slice::NoiseFloor, every),
                ]
            }
            View::Logs => vec![PollJob::new("logs", Slice::Logs, config.logs_interval())],
            View::System => vec![
                PollJob::new("stats", Slice::Stats, config.dashboard_interval()),
                PollJob::new("metrics_graph", Slice::MetricsGraph, config.hardware_interval()),
                hardware,
            ],
        }
    }

    /// Start polling for this view.
    pub fn open(&self, api: &ApiClient, store: &Store, config: &Config) -> Scheduler {
        let mut scheduler = Scheduler::new();
        let packets_limit = config.recent_packets_limit;
        let graph_hours = config.metrics_graph_hours;
        let range = match self {
            View::Statistics(range) => *range,
            _ => TimeRange::default(),
        };

        for job in self.jobs(config) {
            let api = api.clone();
            match job.slice {
                Slice::Stats => scheduler.spawn_poll(store, job, move || {
                    let api = api.clone();
                    async move { api.stats().await.map(Payload::Stats) }
                }),
                Slice::Packets => scheduler.spawn_poll(store, job, move || {
                    let api = api.clone();
                    async move { api.recent_packets(packets_limit).await.map(Payload::Packets) }
                }),
                Slice::Logs => scheduler.spawn_poll(store, job, move || {
                    let api = api.clone();
                    async move { api.logs().await.map(Payload::Logs) }
                }),
                Slice::Bucketed => scheduler.spawn_poll(store, job, move || {
                    let api = api.clone();
                    async move {
                        api.bucketed_stats(range.minutes(), range.buckets())
                            .await
                            .map(Payload::Bucketed)
                    }
                }),
                Slice::Utilization => scheduler.spawn_poll(store, job, move || {
                    let api = api.clone();
                    async move {
                        api.utilization_stats(range.minutes())
                            .await
                            .map(Payload::Utilization)
                    }
                }),
                Slice::Hardware => scheduler.spawn_poll(store, job, move || {
                    let api = api.clone();
                    async move { api.hardware_stats().await.map(Payload::Hardware) }
                }),
                Slice::NoiseFloor => scheduler.spawn_poll(store, job, move || {
                    let api = api.clone();
                    async move {
                        api.noise_floor_history(range.hours())
                            .await
                            .map(Payload::NoiseFloor)
                    }
                }),
                Slice::PacketTypeGraph => scheduler.spawn_poll(store, job, move || {
                    let api = api.clone();
                    async move {
                        api.packet_type_graph_data(range.hours())
                            .await
                            .map(Payload::PacketTypeGraph)
                    }
                }),
                Slice::MetricsGraph => scheduler.spawn_poll(store, job, move || {
                    let api = api.clone();
                    async move {
                        api.metrics_graph_data(graph_hours)
                            .await
                            .map(Payload::MetricsGraph)
                    }
                }),
            };
        }
        scheduler
    }

    pub fn render(&self, state: &AppState, theme: &Theme, config: &Config) -> String {
        let mut out = String::new();
        match self {
            View::Dashboard => {
                match &state.stats {
                    Some(stats) => {
                        out.push_str(&render::stats_card(theme, stats));
                        out.push('\n');
                        out.push_str(&render::neighbor_table(theme, stats, 8));
                    }
                    None => out.push_str("Waiting for stats…\n"),
                }
                out.push('\n');
                out.push_str(&render::packet_table(theme, &state.packets, 15));
                out.push('\n');
                out.push_str(&render::resource_panel(
                    theme,
                    &state.resource_history,
                    config.smoothing_window,
                ));
            }
            View::Statistics(_) => {
                match &state.bucketed {
                    Some(bucketed) => out.push_str(&render::bucket_chart(
                        theme,
                        bucketed,
                        &config.airtime,
                        config.smoothing_window,
                    )),
                    None => out.push_str("Waiting for bucketed stats…\n"),
                }
                if let Some(util) = &state.utilization {
                    out.push_str(&format!(
                        "  Utilization {}  rx {:.0} ms  tx {:.0} ms\n",
                        render::progress_bar(theme, util.utilization_percent, 20),
                        util.rx_airtime_ms,
                        util.tx_airtime_ms
                    ));
                }
                if let Some(graph) = &state.packet_type_graph {
                    out.push_str("\nPacket types\n");
                    for series in &graph.series {
                        let total: f64 = series.data.iter().map(|(_, v)| v).sum();
                        let values: Vec<f64> = series.data.iter().map(|(_, v)| *v).collect();
                        out.push_str(&format!(
                            "  {:<12} {:>7.0}  {}\n",
                            series.name,
                            total,
                            render::sparkline(&values)
                        ));
                    }
                }
                if !state.noise_floor.is_empty() {
                    let values: Vec<f64> =
                        state.noise_floor.iter().map(|s| s.noise_floor_dbm).collect();
                    let avg = values.iter().sum::<f64>() / values.len() as f64;
                    out.push_str(&format!(
                        "\nNoise floor {:.1} dBm avg  {}\n",
                        avg,
                        render::sparkline(&values)
                    ));
                }
            }
            View::Logs => out.push_str(&render::log_lines(theme, &state.logs, 40)),
            View::System => {
                if let Some(hw) = &state.hardware {
                    out.push_str(&format!(
                        "Disk {}\n",
                        render::progress_bar(theme, hw.disk_percent, 20)
                    ));
                    if !hw.load_average.is_empty() {
                        let loads: Vec<String> =
                            hw.load_average.iter().map(|l| format!("{l:.2}")).collect();
                        out.push_str(&format!("Load {}\n", loads.join(" ")));
                    }
                    if let Some(t) = hw.temperature_c {
                        out.push_str(&format!("Temperature {t:.1}°C\n"));
                    }
                }
                out.push_str(&render::resource_panel(
                    theme,
                    &state.resource_history,
                    config.smoothing_window,
                ));
                if let Some(graph) = &state.metrics_graph {
                    out.push('\n');
                    for series in &graph.series {
                        let values: Vec<f64> = series.data.iter().map(|(_, v)| *v).collect();
                        out.push_str(&format!(
                            "  {:<14} {}\n",
                            series.name,
                            render::sparkline(&values)
                        ));
                    }
                }
            }
        }
        out
    }
}

/// What a view's screen depends on, one entry per slice in [`View::slices`] order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ViewStamp {
    pub updated: Vec<Option<DateTime<Utc>>>,
    pub errors: Vec<Option<String>>,
}

/// Tracks the open view and its scheduler.
pub struct Navigator {
    api: ApiClient,
    store: Store,
    config: Config,
    current: View,
    scheduler: Scheduler,
}

impl Navigator {
    pub fn new(api: ApiClient, store: Store, config: Config, initial: View) -> Self {
        let scheduler = initial.open(&api, &store, &config);
        Self {
            api,
            store,
            config,
            current: initial,
            scheduler,
        }
    }

    pub fn current(&self) -> View {
        self.current
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Tear down the current view's polling and open `view`.
    pub fn switch(&mut self, view: View) {
        if view == self.current {
            return;
        }
        log::info!("Switching view: {} -> {}", self.current.title(), view.title());
        self.scheduler.stop();
        self.scheduler = view.open(&self.api, &self.store, &self.config);
        self.current = view;
    }

    pub async fn shutdown(self) {
        self.scheduler.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::api::types::Stats;
    use crate::state::Action;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_coarse_ranges_poll_slowly() {
        assert!(TimeRange::Day.poll_interval() >= Duration::from_secs(5 * 60));
        assert!(TimeRange::Week.poll_interval() <= Duration::from_secs(30 * 60));
        assert_eq!(TimeRange::parse("24h"), Some(TimeRange::Day));
        assert_eq!(TimeRange::parse("3h"), None);
    }

    #[test]
    fn test_view_jobs() {
        let config = Config::default();
        let slices: Vec<Slice> = View::Dashboard.jobs(&config).iter().map(|j| j.slice).collect();
        assert_eq!(slices, vec![Slice::Stats, Slice::Packets, Slice::Hardware]);
        assert_eq!(View::Logs.jobs(&config).len(), 1);
    }

    #[test]
    fn test_view_slices_match_jobs() {
        let config = Config::default();
        for view in [
            View::Dashboard,
            View::Statistics(TimeRange::Week),
            View::Logs,
            View::System,
        ] {
            let jobs: Vec<Slice> = view.jobs(&config).iter().map(|j| j.slice).collect();
            assert_eq!(jobs, view.slices(), "{}", view.title());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_view_selector_ignores_other_slices() {
        let store = Store::default();
        let mut logs_view = View::Logs.select(&store);

        store.dispatch(Action::Loaded {
            payload: Payload::Stats(Stats::default()),
            seq: store.next_seq(),
            at: Utc::now(),
        });
        let woke = tokio::time::timeout(Duration::from_millis(50), logs_view.changed()).await;
        assert!(woke.is_err());

        store.dispatch(Action::Failed {
            slice: Slice::Logs,
            error: "timed out".into(),
            seq: store.next_seq(),
        });
        let stamp = logs_view.changed().await.unwrap();
        assert_eq!(stamp.errors, vec![Some("timed out".to_string())]);
        assert_eq!(stamp.updated, vec![None]);
    }

    #[tokio::test]
    async fn test_system_view_uses_configured_graph_window() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/metrics_graph_data"))
            .and(query_param("hours", "6"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {"start_time": 0.0, "end_time": 21600.0, "series": []}
            })))
            .mount(&server)
            .await;

        let config = Config {
            api_url: server.uri(),
            hardware_dedicated_timer: false,
            metrics_graph_hours: 6,
            ..Default::default()
        };
        let api = ApiClient::from_config(&config).unwrap();
        let store = Store::default();
        let mut graph = store.select(|s| s.metrics_graph.as_ref().map(|g| g.end_time));
        let nav = Navigator::new(api, store.clone(), config, View::System);

        assert_eq!(graph.changed().await, Some(Some(21600.0)));
        nav.shutdown().await;
    }

    #[tokio::test]
    async fn test_switching_stops_previous_jobs_and_keeps_history() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/hardware_stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "cpu_percent": 12.5, "memory_percent": 40.0
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/logs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "data": [{"timestamp": 1.0, "level": "INFO", "message": "ok"}]
            })))
            .mount(&server)
            .await;

        let config = Config {
            api_url: server.uri(),
            hardware_dedicated_timer: false,
            ..Default::default()
        };
        let api = ApiClient::from_config(&config).unwrap();
        let store = Store::default();
        let mut history = store.select(|s| s.resource_history.len());
        let mut logs = store.select(|s| s.logs.len());
        let mut nav = Navigator::new(api, store.clone(), config, View::System);

        assert_eq!(history.changed().await, Some(1));

        nav.switch(View::Logs);
        assert!(nav.scheduler().jobs().iter().all(|j| j.slice() == Slice::Logs));
        assert_eq!(logs.changed().await, Some(1));

        assert_eq!(nav.current(), View::Logs);
        assert_eq!(store.read(|s| s.resource_history.len()), 1);
        nav.shutdown().await;
    }
}
