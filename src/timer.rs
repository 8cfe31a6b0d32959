//! Countup timer display.
//!
//! Renders a live or frozen session duration. A locked device always shows
//! zeros and never animates.

use crate::clock::Clock;
use crate::device::DeviceState;
use crate::elapsed::{self, COMPACT_FALLBACK};
use crate::types::{EpochMs, GameProgress};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimerFormat {
    #[default]
    Compact,
    WithUnits,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimerDisplay {
    pub start_time: EpochMs,
    pub end_time: Option<EpochMs>,
    pub is_active: bool,
    pub format: TimerFormat,
    pub animate: bool,
    pub fallback: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimerReading {
    pub elapsed_ms: i64,
    pub text: String,
    pub animating: bool,
}

impl TimerDisplay {
    pub fn new(start_time: EpochMs, end_time: Option<EpochMs>) -> Self {
        Self {
            start_time,
            end_time,
            is_active: true,
            format: TimerFormat::Compact,
            animate: true,
            fallback: COMPACT_FALLBACK.to_string(),
        }
    }

    pub fn for_progress(progress: &GameProgress, format: TimerFormat) -> Self {
        Self {
            format,
            ..Self::new(progress.start_time, progress.completion_time)
        }
    }

    fn ended(&self) -> bool {
        self.end_time.is_some_and(|end| end > self.start_time)
    }

    pub fn elapsed(&self, now: EpochMs, locked: bool) -> i64 {
        if self.start_time <= 0 || locked {
            return 0;
        }
        elapsed::elapsed(self.start_time, self.end_time, now)
    }

    pub fn render(&self, now: EpochMs, locked: bool) -> TimerReading {
        let elapsed_ms = self.elapsed(now, locked);
        let text = if locked {
            COMPACT_FALLBACK.to_string()
        } else if elapsed_ms > 0 {
            match self.format {
                TimerFormat::Compact => elapsed::format_compact(elapsed_ms),
                TimerFormat::WithUnits => elapsed::format_units(elapsed_ms),
            }
        } else {
            self.fallback.clone()
        };

        TimerReading {
            elapsed_ms,
            text,
            animating: self.animate
                && self.is_active
                && self.end_time.is_none()
                && self.start_time > 0
                && !locked,
        }
    }

    /// Render now, then once a second while the timer is live.
    ///
    /// Frozen, inactive or locked timers render once and never tick. A live
    /// ticker renders a final zeroed reading and stops as soon as the device
    /// locks. Dropping the returned handle stops it.
    pub fn spawn_ticker<F>(
        self,
        clock: Arc<dyn Clock>,
        device: DeviceState,
        on_render: F,
    ) -> TimerTicker
    where
        F: Fn(TimerReading) + Send + Sync + 'static,
    {
        let first = self.render(clock.now_ms(), device.is_locked());
        let ticking = first.animating && !self.ended();
        on_render(first);
        if !ticking {
            return TimerTicker { task: None };
        }

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK);
            // First tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let locked = device.is_locked();
                on_render(self.render(clock.now_ms(), locked));
                if locked {
                    tracing::debug!("System locked, timer stopped");
                    break;
                }
            }
        });
        TimerTicker { task: Some(task) }
    }
}

/// Running timer; stops when dropped
#[derive(Debug)]
pub struct TimerTicker {
    task: Option<JoinHandle<()>>,
}

impl TimerTicker {
    pub fn is_ticking(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for TimerTicker {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Mutex;

    #[test]
    fn test_render_live() {
        let timer = TimerDisplay::new(1_000, None);
        let reading = timer.render(66_000, false);
        assert_eq!(reading.text, "01:05");
        assert!(reading.animating);
    }

    #[test]
    fn test_render_frozen() {
        let timer = TimerDisplay::new(1_000, Some(3_601_000));
        let reading = timer.render(99_000_000, false);
        assert_eq!(reading.text, "01:00:00");
        assert_eq!(reading.elapsed_ms, 3_600_000);
        assert!(!reading.animating);
    }

    #[test]
    fn test_render_units_and_fallback() {
        let mut timer = TimerDisplay::new(1_000, Some(66_000));
        timer.format = TimerFormat::WithUnits;
        assert_eq!(timer.render(0, false).text, "1m 5s");

        let mut unstarted = TimerDisplay::new(0, None);
        unstarted.fallback = "--:--".to_string();
        let reading = unstarted.render(5_000, false);
        assert_eq!(reading.text, "--:--");
        assert!(!reading.animating);
    }

    #[test]
    fn test_render_locked_shows_zeros() {
        let timer = TimerDisplay::new(1_000, Some(50_000));
        let reading = timer.render(60_000, true);
        assert_eq!(reading.text, "00:00");
        assert_eq!(reading.elapsed_ms, 0);
        assert!(!reading.animating);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_stops_on_lock() {
        let clock = ManualClock::new(10_000);
        let device = DeviceState::in_memory();
        let texts = Arc::new(Mutex::new(Vec::new()));
        let sink = texts.clone();

        let ticker = TimerDisplay::new(5_000, None).spawn_ticker(
            Arc::new(clock.clone()),
            device.clone(),
            move |r| sink.lock().unwrap().push(r.text),
        );
        assert!(ticker.is_ticking());

        clock.advance(1_000);
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        device.set_locked().unwrap();
        tokio::time::sleep(Duration::from_millis(1_000)).await;

        assert_eq!(*texts.lock().unwrap(), vec!["00:05", "00:06", "00:00"]);
        assert!(!ticker.is_ticking());
    }

    #[tokio::test(start_paused = true)]
    async fn test_frozen_timer_does_not_tick() {
        let clock = ManualClock::new(10_000);
        let count = Arc::new(Mutex::new(0));
        let sink = count.clone();

        let ticker = TimerDisplay::new(5_000, Some(8_000)).spawn_ticker(
            Arc::new(clock),
            DeviceState::in_memory(),
            move |_| *sink.lock().unwrap() += 1,
        );
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(*count.lock().unwrap(), 1);
        assert!(!ticker.is_ticking());
    }
}
