//! Periodic timers for Meshroom.
//!
//! A room peer runs two clocks: the host's self-announcement on the lobby
//! and the registry reaper. Both are a [`Ticker`] that can be started and
//! stopped as the peer changes role.
//!
//! # Stopped tickers pend forever
//!
//! While stopped, [`Ticker::wait_for_tick`] never resolves, so a ticker can
//! sit in a `tokio::select!` branch unconditionally:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         _ = announcer.wait_for_tick() => announce().await,
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for a [`Ticker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickConfig {
    /// Time between ticks.
    pub period: Duration,
    /// Upper bound of a random delay added to the first tick after
    /// [`Ticker::start`], so peers started together don't announce in
    /// lockstep.
    pub initial_jitter: Duration,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(5),
            initial_jitter: Duration::ZERO,
        }
    }
}

impl TickConfig {
    /// Shortest accepted period. Anything faster is clamped.
    pub const MIN_PERIOD: Duration = Duration::from_millis(10);

    /// A config ticking every `period`, without jitter.
    pub fn every(period: Duration) -> Self {
        Self {
            period,
            ..Default::default()
        }
    }

    /// Clamps `period` to [`MIN_PERIOD`](Self::MIN_PERIOD) and the jitter
    /// to at most one period.
    pub fn validated(mut self) -> Self {
        if self.period < Self::MIN_PERIOD {
            warn!(
                period_ms = self.period.as_millis() as u64,
                min_ms = Self::MIN_PERIOD.as_millis() as u64,
                "tick period below minimum, clamping"
            );
            self.period = Self::MIN_PERIOD;
        }
        if self.initial_jitter > self.period {
            self.initial_jitter = self.period;
        }
        self
    }
}

/// Information about a fired tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickInfo {
    /// 1-based count of ticks since the ticker was created.
    pub tick: u64,
    /// How far past its deadline the tick was observed.
    pub late_by: Duration,
}

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

/// A restartable periodic timer.
///
/// Missed ticks are skipped: after a late tick the next one is scheduled
/// one period from *now*, never in a burst.
#[derive(Debug)]
pub struct Ticker {
    config: TickConfig,
    tick_count: u64,
    /// `None` while stopped.
    next_tick: Option<Instant>,
}

impl Ticker {
    /// Creates a stopped ticker.
    pub fn new(config: TickConfig) -> Self {
        Self {
            config: config.validated(),
            tick_count: 0,
            next_tick: None,
        }
    }

    /// Creates a stopped ticker with the given period and no jitter.
    pub fn every(period: Duration) -> Self {
        Self::new(TickConfig::every(period))
    }

    /// Starts (or restarts) the ticker. The first tick fires one period
    /// from now, plus jitter.
    pub fn start(&mut self) {
        let jitter = if self.config.initial_jitter.is_zero() {
            Duration::ZERO
        } else {
            let max = self.config.initial_jitter.as_micros() as u64;
            Duration::from_micros(rand::rng().random_range(0..=max))
        };
        self.next_tick = Some(Instant::now() + self.config.period + jitter);
        debug!(
            period_ms = self.config.period.as_millis() as u64,
            jitter_us = jitter.as_micros() as u64,
            "ticker started"
        );
    }

    /// Stops the ticker. Pending [`wait_for_tick`](Self::wait_for_tick)
    /// calls made after this never resolve.
    pub fn stop(&mut self) {
        if self.next_tick.take().is_some() {
            debug!(ticks = self.tick_count, "ticker stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    pub fn period(&self) -> Duration {
        self.config.period
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Waits for the next tick.
    ///
    /// Cancel-safe: dropping the future before it resolves leaves the
    /// schedule untouched, so it can be raced in `tokio::select!`.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let Some(next) = self.next_tick else {
            std::future::pending::<()>().await;
            unreachable!()
        };

        time::sleep_until(next).await;

        let now = Instant::now();
        let late_by = now.saturating_duration_since(next);
        let period = self.config.period;
        if late_by >= period {
            warn!(
                tick = self.tick_count + 1,
                missed = (late_by.as_nanos() / period.as_nanos()) as u64,
                "ticker fell behind, skipping ahead"
            );
        }
        self.tick_count += 1;
        self.next_tick = Some(now + period);
        trace!(tick = self.tick_count, "tick fired");

        TickInfo {
            tick: self.tick_count,
            late_by,
        }
    }
}
