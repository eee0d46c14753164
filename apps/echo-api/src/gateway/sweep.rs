//! Periodic housekeeping: idle connections, pair records, chat retention.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::task::JoinHandle;

use super::dispatch::Gateway;
use crate::assistant::monitor::CLEANUP_INTERVAL;
use crate::config::Config;

/// How often expired chat history is purged.
pub const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Handles to the background sweeps. Stop them with [`shutdown`](Self::shutdown).
pub struct BackgroundTasks {
    gateway: Arc<Gateway>,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    pub fn start(gateway: Arc<Gateway>, config: &Config) -> Self {
        let handles = vec![
            spawn_idle_sweep(
                Arc::clone(&gateway),
                config.ws_sweep_interval,
                config.ws_idle_timeout,
            ),
            spawn_monitor_cleanup(Arc::clone(&gateway)),
            spawn_retention_sweep(Arc::clone(&gateway), config.message_retention),
        ];
        tracing::debug!(tasks = handles.len(), "background sweeps started");
        Self { gateway, handles }
    }

    /// Abort the sweeps and any assistant replies still waiting.
    pub fn shutdown(self) {
        for handle in &self.handles {
            handle.abort();
        }
        self.gateway.scheduler().shutdown();
        tracing::info!("background tasks stopped");
    }
}

fn every(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period.max(Duration::from_secs(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval
}

fn spawn_idle_sweep(gateway: Arc<Gateway>, period: Duration, timeout: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = every(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let swept = gateway.registry().sweep_idle(timeout);
            for conn in &swept {
                tracing::info!(connection_id = %conn, "closed idle connection");
            }
        }
    })
}

fn spawn_monitor_cleanup(gateway: Arc<Gateway>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = every(CLEANUP_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let now = Instant::now();
            let pairs = gateway.monitor().cleanup_at(now);
            let cooldowns = gateway.suggestions().cleanup_at(now);
            let speakers = gateway.last_speakers().cleanup_at(now);
            tracing::debug!(pairs, cooldowns, speakers, "conversation monitor cleaned up");
        }
    })
}

fn spawn_retention_sweep(gateway: Arc<Gateway>, retention: Duration) -> JoinHandle<()> {
    let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::days(30));
    tokio::spawn(async move {
        let mut ticker = every(RETENTION_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            match gateway.messages().purge_older_than(Utc::now() - retention).await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "expired chat history purged"),
                Err(e) => tracing::warn!(error = ?e, "chat history purge failed"),
            }
        }
    })
}
