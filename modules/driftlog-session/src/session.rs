//! Session controller: one play-through from open to close.
//!
//! All per-session state (sequence counter, ball, ticker handle, clock
//! offset, last report) lives here rather than in globals. The ticker is a
//! spawned task and is aborted on stop, open and close so none outlives
//! the run that started it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};

use driftlog_client::LabApi;
use driftlog_common::{Config, Event, EventKind};

use crate::buffer::LocalBuffer;
use crate::clock::Clock;
use crate::error::SessionError;
use crate::flush::flush;
use crate::logger::EventLogger;
use crate::offset::OffsetEstimator;
use crate::physics::{Ball, Field};
use crate::report::{render_report, Report};
use crate::store::KvStore;

pub const LOGS_CLEAR_FAILED: &str = "Failed to clear logs";

/// Which control the user is offered next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Controls {
    Start,
    Stop,
    Reload,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub field: Field,
    pub tick_interval: Duration,
    /// Fixed launch angle in degrees; random in 20°..70° when unset.
    pub launch_angle: Option<f64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SessionConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            field: Field::new(config.field_width, config.field_height),
            tick_interval: config.tick_interval,
            launch_angle: None,
        }
    }
}

/// The rendered outcome of a report request: the report itself when the
/// fetch worked, and the summary line to show either way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportView {
    pub report: Option<Report>,
    pub summary: String,
}

impl fmt::Display for ReportView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(report) = &self.report {
            report.fmt_table(f)?;
        }
        write!(f, "{}", self.summary)
    }
}

struct Playfield {
    field: Field,
    ball: Ball,
    running: bool,
    exited: bool,
    controls: Controls,
}

pub struct Session {
    api: Arc<dyn LabApi>,
    clock: Arc<dyn Clock>,
    buffer: LocalBuffer,
    logger: Arc<EventLogger>,
    playfield: Arc<Mutex<Playfield>>,
    offset: Mutex<OffsetEstimator>,
    view: Mutex<Option<ReportView>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    config: SessionConfig,
}

impl Session {
    pub fn new(
        api: Arc<dyn LabApi>,
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        user: impl Into<String>,
        config: SessionConfig,
    ) -> Self {
        let buffer = LocalBuffer::new(store);
        let logger = Arc::new(EventLogger::new(
            user,
            api.clone(),
            buffer.clone(),
            clock.clone(),
        ));
        Self {
            api,
            clock,
            buffer,
            logger,
            playfield: Arc::new(Mutex::new(Playfield {
                field: config.field,
                ball: Ball::default(),
                running: false,
                exited: false,
                controls: Controls::Start,
            })),
            offset: Mutex::new(OffsetEstimator::new()),
            view: Mutex::new(None),
            ticker: Mutex::new(None),
            config,
        }
    }

    pub fn logger(&self) -> &EventLogger {
        &self.logger
    }

    pub fn buffer(&self) -> &LocalBuffer {
        &self.buffer
    }

    pub async fn controls(&self) -> Controls {
        self.playfield.lock().await.controls
    }

    pub async fn is_running(&self) -> bool {
        self.playfield.lock().await.running
    }

    pub async fn ball(&self) -> Ball {
        self.playfield.lock().await.ball
    }

    pub async fn offset_ms(&self) -> i64 {
        self.offset.lock().await.offset_ms()
    }

    /// The last report shown, or `None` while the report is hidden.
    pub async fn view(&self) -> Option<ReportView> {
        self.view.lock().await.clone()
    }

    /// Initial state on load: estimate the offset and show whatever the server has.
    pub async fn refresh(&self) -> ReportView {
        self.offset
            .lock()
            .await
            .refresh(self.api.as_ref(), self.clock.as_ref())
            .await;
        let view = self.report_view(&[]).await;
        *self.view.lock().await = Some(view.clone());
        view
    }

    /// Begin a new play-through. Numbering restarts at 1.
    pub async fn open(&self) -> Result<Event, SessionError> {
        self.cancel_ticker().await;
        self.logger.reset();
        {
            let mut pf = self.playfield.lock().await;
            pf.ball.reset();
            pf.exited = false;
            pf.controls = Controls::Start;
        }
        *self.view.lock().await = None;
        Ok(self.logger.log(EventKind::UiAction, "open work")?)
    }

    /// Launch the ball. Returns `None` when the ball is already moving.
    pub async fn start(&self) -> Result<Option<Event>, SessionError> {
        {
            let mut pf = self.playfield.lock().await;
            if pf.running {
                return Ok(None);
            }
            if pf.exited {
                pf.ball.reset();
                pf.exited = false;
            }
        }

        let event = self.logger.log(EventKind::ButtonAction, "start")?;

        let launched = {
            let mut pf = self.playfield.lock().await;
            pf.controls = Controls::Stop;
            if pf.field.is_playable() {
                match self.config.launch_angle {
                    Some(angle) => pf.ball.launch(angle),
                    None => pf.ball.launch_random(&mut rand::rng()),
                }
                pf.running = true;
                true
            } else {
                warn!(field = ?pf.field, "Field has no area; ball not launched");
                false
            }
        };
        if launched {
            self.spawn_ticker().await;
        }

        Ok(Some(event))
    }

    /// Halt the ball. Returns `None` when it was not moving.
    pub async fn stop(&self) -> Result<Option<Event>, SessionError> {
        if !self.is_running().await {
            return Ok(None);
        }
        self.cancel_ticker().await;
        let event = self.logger.log(EventKind::ButtonAction, "stop")?;
        self.playfield.lock().await.controls = Controls::Start;
        Ok(Some(event))
    }

    /// Put an exited ball back at the start.
    pub async fn reload(&self) -> Result<Event, SessionError> {
        {
            let mut pf = self.playfield.lock().await;
            pf.ball.reset();
            pf.exited = false;
        }
        let event = self.logger.log(EventKind::ButtonAction, "reload")?;
        self.playfield.lock().await.controls = Controls::Start;
        Ok(event)
    }

    /// End the session: flush the buffer in one batch, re-estimate the offset
    /// and reconcile. A flush failure is appended to the summary and the
    /// buffer is kept for the next close.
    pub async fn close(&self) -> Result<ReportView, SessionError> {
        self.cancel_ticker().await;
        self.playfield.lock().await.controls = Controls::Start;

        let events = self.buffer.read()?;
        let flush_error = flush(self.api.as_ref(), &self.buffer, &events)
            .await
            .err();

        self.offset
            .lock()
            .await
            .refresh(self.api.as_ref(), self.clock.as_ref())
            .await;

        let mut view = self.report_view(&events).await;
        if let Some(err) = flush_error {
            view.summary = format!("{} | {}", view.summary, err);
        }
        info!(events = events.len(), summary = %view.summary, "Session closed");

        *self.view.lock().await = Some(view.clone());
        Ok(view)
    }

    /// Clear server and local logs, then show the (now empty) report.
    pub async fn reset_logs(&self) -> Result<ReportView, SessionError> {
        let view = match self.api.reset().await {
            Ok(()) => {
                self.buffer.clear()?;
                self.logger.clear_messages();
                self.offset
                    .lock()
                    .await
                    .refresh(self.api.as_ref(), self.clock.as_ref())
                    .await;
                self.report_view(&[]).await
            }
            Err(e) => {
                warn!(error = %e, "Server reset failed");
                ReportView {
                    report: None,
                    summary: LOGS_CLEAR_FAILED.to_string(),
                }
            }
        };
        *self.view.lock().await = Some(view.clone());
        Ok(view)
    }

    async fn report_view(&self, local_override: &[Event]) -> ReportView {
        let offset = self.offset.lock().await;
        match render_report(self.api.as_ref(), local_override, &offset).await {
            Ok(report) => ReportView {
                summary: report.summary.clone(),
                report: Some(report),
            },
            Err(e) => {
                warn!(error = %e, "Report unavailable");
                ReportView {
                    report: None,
                    summary: e.to_string(),
                }
            }
        }
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
        self.playfield.lock().await.running = false;
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let playfield = self.playfield.clone();
        let logger = self.logger.clone();
        let tick_interval = self.config.tick_interval;

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the ball moves one period after launch.
            interval.tick().await;
            loop {
                interval.tick().await;

                let mut pf = playfield.lock().await;
                if !pf.running {
                    break;
                }
                let field = pf.field;
                let outcome = pf.ball.step(&field);
                for (kind, message) in outcome.events {
                    if let Err(e) = logger.log(kind, message) {
                        warn!(error = %e, "Failed to record physics event");
                    }
                }
                if outcome.exited {
                    pf.running = false;
                    pf.exited = true;
                    pf.controls = Controls::Reload;
                    break;
                }
            }
        });

        *ticker_guard = Some(handle);
    }
}
