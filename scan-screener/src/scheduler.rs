//! Clock-driven screening runs.
//!
//! Each slot pairs a cron expression with a filter profile. The scheduler
//! polls the clock, and when a slot's occurrence falls inside the trigger
//! window it launches `scan-screener screen --profile <p>` as a child
//! process. Last-run dates are persisted so a slot fires at most once a day
//! even across restarts.
//!
//! # Default Slots (Beijing Time)
//!
//! - 11:30 `midday-1130`
//! - 14:30 `burial-1430`
//! - 14:50 `burial-1450`
//!
//! ```json
//! {
//!   "scheduler": {
//!     "slots": [
//!       { "name": "tail", "cron": "0 50 14 * * Mon-Fri", "profile": "burial-1450" }
//!     ],
//!     "window_minutes": 1
//!   }
//! }
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use scan_common::config::{ScheduleSlotConfig, SchedulerConfig};

// ============================================================================
// Slots
// ============================================================================

/// A parsed schedule slot.
#[derive(Debug, Clone)]
pub struct ScheduleSlot {
    pub name: String,
    pub profile: String,
    schedule: Schedule,
}

impl ScheduleSlot {
    pub fn from_config(config: &ScheduleSlotConfig) -> Result<Self> {
        let schedule = Schedule::from_str(&config.cron)
            .with_context(|| format!("Invalid cron for slot {}: {}", config.name, config.cron))?;
        Ok(Self {
            name: config.name.clone(),
            profile: config.profile.clone(),
            schedule,
        })
    }

    /// Occurrence inside `(now - window, now]`, if any.
    pub fn due_at(&self, now: DateTime<Local>, window: chrono::Duration) -> Option<DateTime<Local>> {
        let after = now - window;
        self.schedule
            .after(&after)
            .next()
            .filter(|scheduled| *scheduled <= now)
    }

    pub fn next_after(&self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        self.schedule.after(&now).next()
    }
}

// ============================================================================
// Status File
// ============================================================================

/// Last run date per slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    #[serde(default)]
    pub last_runs: BTreeMap<String, NaiveDate>,
}

impl SchedulerStatus {
    /// A missing or corrupt file is an empty status.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Scheduler status unreadable, resetting");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn ran_on(&self, slot: &str, date: NaiveDate) -> bool {
        self.last_runs.get(slot) == Some(&date)
    }
}

// ============================================================================
// Runner
// ============================================================================

/// How a triggered run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Failed(Option<i32>),
    TimedOut,
}

/// Executes one triggered slot.
#[async_trait]
pub trait SlotRunner: Send + Sync {
    async fn run(&self, slot: &ScheduleSlot) -> Result<RunOutcome>;
}

/// Runs each slot as a child process with a deadline.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: PathBuf,
    base_args: Vec<String>,
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(program: impl Into<PathBuf>, base_args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            base_args,
            timeout,
        }
    }

    /// `<current exe> screen --profile <p>`
    pub fn current_exe(timeout: Duration) -> Result<Self> {
        let exe = std::env::current_exe().context("Failed to locate current executable")?;
        Ok(Self::new(exe, vec!["screen".to_string()], timeout))
    }
}

#[async_trait]
impl SlotRunner for ProcessRunner {
    async fn run(&self, slot: &ScheduleSlot) -> Result<RunOutcome> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args)
            .arg("--profile")
            .arg(&slot.profile)
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.program.display()))?;

        match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => Ok(RunOutcome::Succeeded),
            Ok(Ok(status)) => Ok(RunOutcome::Failed(status.code())),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!(slot = %slot.name, error = %e, "Failed to kill timed out run");
                }
                Ok(RunOutcome::TimedOut)
            }
        }
    }
}

// ============================================================================
// Scheduler
// ============================================================================

pub struct Scheduler<R: SlotRunner> {
    slots: Vec<ScheduleSlot>,
    window: chrono::Duration,
    poll_interval: Duration,
    status_path: PathBuf,
    runner: R,
}

impl<R: SlotRunner> Scheduler<R> {
    pub fn new(config: &SchedulerConfig, status_path: PathBuf, runner: R) -> Result<Self> {
        let slots = config
            .slots
            .iter()
            .map(ScheduleSlot::from_config)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            slots,
            window: chrono::Duration::minutes(i64::from(config.window_minutes)),
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            status_path,
            runner,
        })
    }

    pub fn slots(&self) -> &[ScheduleSlot] {
        &self.slots
    }

    /// Next occurrence of every slot, soonest first.
    pub fn next_runs(&self, now: DateTime<Local>) -> Vec<(&ScheduleSlot, DateTime<Local>)> {
        let mut next: Vec<_> = self
            .slots
            .iter()
            .filter_map(|slot| slot.next_after(now).map(|t| (slot, t)))
            .collect();
        next.sort_by_key(|(_, t)| *t);
        next
    }

    /// Fire every due slot that has not run today. Returns fired slot names.
    pub async fn tick(&self, now: DateTime<Local>) -> Result<Vec<String>> {
        let today = now.date_naive();
        let mut status = SchedulerStatus::load(&self.status_path);
        let mut fired = Vec::new();

        for slot in &self.slots {
            let Some(scheduled) = slot.due_at(now, self.window) else {
                continue;
            };
            if status.ran_on(&slot.name, today) {
                debug!(slot = %slot.name, "Slot already ran today");
                continue;
            }

            // Mark before running so a slow pass is not relaunched inside the window.
            status.last_runs.insert(slot.name.clone(), today);
            status.save(&self.status_path)?;

            info!(
                slot = %slot.name,
                profile = %slot.profile,
                scheduled = %scheduled.format("%H:%M:%S"),
                "Launching scheduled screening"
            );

            match self.runner.run(slot).await {
                Ok(RunOutcome::Succeeded) => info!(slot = %slot.name, "Scheduled screening finished"),
                Ok(RunOutcome::Failed(code)) => {
                    warn!(slot = %slot.name, exit_code = ?code, "Scheduled screening failed")
                }
                Ok(RunOutcome::TimedOut) => {
                    warn!(slot = %slot.name, "Scheduled screening timed out and was killed")
                }
                Err(e) => error!(slot = %slot.name, error = %e, "Scheduled screening could not start"),
            }

            fired.push(slot.name.clone());
        }

        Ok(fired)
    }

    /// Poll until Ctrl-C or SIGTERM.
    pub async fn run(&self) -> Result<()> {
        for (slot, at) in self.next_runs(Local::now()) {
            info!(slot = %slot.name, next = %at.format("%Y-%m-%d %H:%M:%S"), "Slot scheduled");
        }
        info!(slots = self.slots.len(), "Scheduler started");

        let mut poll = tokio::time::interval(self.poll_interval);
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if let Err(e) = self.tick(Local::now()).await {
                        error!(error = %e, "Scheduler check failed");
                    }
                }
                _ = &mut shutdown => {
                    info!("Scheduler stopped");
                    break;
                }
            }
        }

        Ok(())
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C"),
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct RecordingRunner {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingRunner {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SlotRunner for RecordingRunner {
        async fn run(&self, slot: &ScheduleSlot) -> Result<RunOutcome> {
            self.calls.lock().unwrap().push(slot.profile.clone());
            Ok(RunOutcome::Succeeded)
        }
    }

    fn at(day: u32, h: u32, m: u32, s: u32) -> DateTime<Local> {
        // 2026-03-02 is a Monday
        Local.with_ymd_and_hms(2026, 3, day, h, m, s).unwrap()
    }

    fn slot(cron: &str) -> ScheduleSlot {
        ScheduleSlot::from_config(&ScheduleSlotConfig {
            name: "test".into(),
            cron: cron.into(),
            profile: "burial-1450".into(),
        })
        .unwrap()
    }

    #[test]
    fn test_default_slots_parse() {
        for config in SchedulerConfig::default().slots {
            assert!(ScheduleSlot::from_config(&config).is_ok(), "{}", config.cron);
        }
    }

    #[test]
    fn test_invalid_cron_rejected() {
        let err = ScheduleSlot::from_config(&ScheduleSlotConfig {
            name: "bad".into(),
            cron: "every day".into(),
            profile: "x".into(),
        })
        .unwrap_err();
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn test_due_inside_window() {
        let s = slot("0 50 14 * * Mon-Fri");
        let window = chrono::Duration::minutes(1);

        assert_eq!(s.due_at(at(2, 14, 50, 0), window), Some(at(2, 14, 50, 0)));
        assert_eq!(s.due_at(at(2, 14, 50, 45), window), Some(at(2, 14, 50, 0)));
        assert!(s.due_at(at(2, 14, 49, 59), window).is_none());
        assert!(s.due_at(at(2, 14, 52, 0), window).is_none());
    }

    #[test]
    fn test_weekend_not_due() {
        let s = slot("0 50 14 * * Mon-Fri");
        // 2026-03-07 is a Saturday
        assert!(s.due_at(at(7, 14, 50, 10), chrono::Duration::minutes(1)).is_none());
        assert_eq!(s.next_after(at(7, 15, 0, 0)), Some(at(9, 14, 50, 0)));
    }

    #[tokio::test]
    async fn test_tick_fires_once_per_day() {
        let dir = TempDir::new().unwrap();
        let status_path = dir.path().join("scheduler_status.json");
        let scheduler = Scheduler::new(
            &SchedulerConfig::default(),
            status_path.clone(),
            RecordingRunner::new(),
        )
        .unwrap();

        let fired = scheduler.tick(at(2, 14, 50, 20)).await.unwrap();
        assert_eq!(fired, vec!["tail".to_string()]);

        // Same window, same day
        assert!(scheduler.tick(at(2, 14, 50, 50)).await.unwrap().is_empty());
        // Nothing due
        assert!(scheduler.tick(at(2, 15, 0, 0)).await.unwrap().is_empty());
        // Next day fires again
        assert_eq!(scheduler.tick(at(3, 14, 50, 5)).await.unwrap().len(), 1);

        let calls = scheduler.runner.calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["burial-1450", "burial-1450"]);

        let status = SchedulerStatus::load(&status_path);
        assert!(status.ran_on("tail", at(3, 0, 0, 0).date_naive()));
        assert!(!status.ran_on("midday", at(3, 0, 0, 0).date_naive()));
    }

    #[tokio::test]
    async fn test_status_survives_restart() {
        let dir = TempDir::new().unwrap();
        let status_path = dir.path().join("status.json");

        let first = Scheduler::new(
            &SchedulerConfig::default(),
            status_path.clone(),
            RecordingRunner::new(),
        )
        .unwrap();
        first.tick(at(2, 11, 30, 10)).await.unwrap();

        let second = Scheduler::new(
            &SchedulerConfig::default(),
            status_path,
            RecordingRunner::new(),
        )
        .unwrap();
        assert!(second.tick(at(2, 11, 30, 40)).await.unwrap().is_empty());
        assert!(second.runner.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_next_runs_sorted() {
        let dir = TempDir::new().unwrap();
        let scheduler = Scheduler::new(
            &SchedulerConfig::default(),
            dir.path().join("s.json"),
            RecordingRunner::new(),
        )
        .unwrap();

        let next = scheduler.next_runs(at(2, 12, 0, 0));
        let names: Vec<&str> = next.iter().map(|(s, _)| s.name.as_str()).collect();
        assert_eq!(names, vec!["afternoon", "tail", "midday"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_outcomes() {
        let s = slot("0 0 12 * * *");

        let ok = ProcessRunner::new("sh", vec!["-c".into(), "exit 0".into()], Duration::from_secs(5));
        assert_eq!(ok.run(&s).await.unwrap(), RunOutcome::Succeeded);

        let fail = ProcessRunner::new("sh", vec!["-c".into(), "exit 3".into()], Duration::from_secs(5));
        assert_eq!(fail.run(&s).await.unwrap(), RunOutcome::Failed(Some(3)));

        let slow = ProcessRunner::new(
            "sh",
            vec!["-c".into(), "sleep 5".into()],
            Duration::from_millis(100),
        );
        assert_eq!(slow.run(&s).await.unwrap(), RunOutcome::TimedOut);
    }
}
