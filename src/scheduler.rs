use crate::config::Config;
use crate::error::Result;
use crate::normalizer::{Normalized, Normalizer};
use crate::ocr::Recognizer;
use crate::scraper::Scraper;
use crate::state::LastSentState;
use crate::uploader::Uploader;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    SleepingInterval,
    Terminated,
}

/// A cycle that completed without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Uploaded(DateTime<Utc>),
    Skipped(DateTime<Utc>),
}

pub struct Scheduler {
    scraper: Scraper,
    normalizer: Normalizer,
    uploader: Uploader,
    last_sent: LastSentState,
    interval: Duration,
    state: SchedulerState,
    shutdown_rx: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        scraper: Scraper,
        normalizer: Normalizer,
        uploader: Uploader,
        interval: Duration,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            scraper,
            normalizer,
            uploader,
            last_sent: LastSentState::new(),
            interval,
            state: SchedulerState::Idle,
            shutdown_rx,
        }
    }

    pub fn from_config(
        config: &Config,
        recognizer: Arc<dyn Recognizer>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<Self> {
        let scraper = Scraper::from_config(config, recognizer)?;
        let normalizer = Normalizer::new(config.source.timezone()?);
        let uploader = Uploader::new(&config.wunderground)?
            .with_shutdown(shutdown_rx.clone());

        info!(
            "Using {} scraper for {}",
            scraper.name(),
            scraper.station_id()
        );

        Ok(Self::new(
            scraper,
            normalizer,
            uploader,
            Duration::from_secs(config.scheduler.interval_seconds),
            shutdown_rx,
        ))
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn last_sent(&self) -> &LastSentState {
        &self.last_sent
    }

    /// Scrape, normalize and upload once.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let station_id = self.scraper.station_id().to_string();
        let raw = self.scraper.scrape().await?;
        if raw.is_empty() {
            warn!("Scrape of {} produced no readable fields", station_id);
        }

        for (field, reason) in raw.failures() {
            warn!("Station {} field {} unavailable: {}", station_id, field, reason);
        }

        match self.normalizer.normalize(&station_id, &raw, &self.last_sent)? {
            Normalized::Skip {
                measurement_time, ..
            } => {
                info!(
                    "Reading for {} at {} already uploaded, skipping",
                    station_id, measurement_time
                );
                Ok(CycleOutcome::Skipped(measurement_time))
            }
            Normalized::Reading(reading) => {
                self.uploader.upload(&reading, &mut self.last_sent).await?;
                Ok(CycleOutcome::Uploaded(reading.measurement_time()))
            }
        }
    }

    /// Single-run mode: one cycle, then terminate.
    pub async fn run_once(&mut self) -> Result<CycleOutcome> {
        self.state = SchedulerState::Running;
        let result = self.run_cycle().await;
        self.state = SchedulerState::Terminated;

        if let Err(e) = &result {
            error!("Cycle failed ({}): {}", e.kind(), e);
        }
        result
    }

    /// Run cycles until shutdown is signalled. Only a configuration fault
    /// ends the loop with an error; every other failure is logged and the
    /// next cycle runs as scheduled.
    pub async fn run(&mut self) -> Result<()> {
        info!("Scheduler starting with {:?} interval", self.interval);

        loop {
            if *self.shutdown_rx.borrow() {
                info!("Shutdown requested, stopping scheduler");
                break;
            }

            self.state = SchedulerState::Running;
            match self.run_cycle().await {
                Ok(CycleOutcome::Uploaded(time)) => info!("Cycle complete, uploaded {}", time),
                Ok(CycleOutcome::Skipped(time)) => info!("Cycle complete, {} unchanged", time),
                Err(e) if e.is_fatal() => {
                    error!("Fatal error ({}): {}", e.kind(), e);
                    self.state = SchedulerState::Terminated;
                    return Err(e);
                }
                Err(e) => error!("Cycle failed ({}): {}", e.kind(), e),
            }

            self.state = SchedulerState::SleepingInterval;
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = self.shutdown_rx.changed() => {
                    info!("Shutdown signal received, stopping scheduler");
                    break;
                }
            }
        }

        self.state = SchedulerState::Terminated;
        Ok(())
    }
}
