//! Integration tests for the restartable ticker.
//!
//! Runs with paused time so `sleep_until` resolves as soon as the runtime
//! is idle.

use std::time::Duration;

use meshroom_tick::{TickConfig, Ticker};
use tokio::time::Instant;

// =========================================================================
// TickConfig
// =========================================================================

#[test]
fn test_default_config_is_five_seconds() {
    let cfg = TickConfig::default();
    assert_eq!(cfg.period, Duration::from_secs(5));
    assert_eq!(cfg.initial_jitter, Duration::ZERO);
}

#[test]
fn test_validated_clamps_tiny_period() {
    let cfg = TickConfig::every(Duration::from_millis(1)).validated();
    assert_eq!(cfg.period, TickConfig::MIN_PERIOD);
}

#[test]
fn test_validated_caps_jitter_at_one_period() {
    let cfg = TickConfig {
        period: Duration::from_secs(1),
        initial_jitter: Duration::from_secs(10),
    }
    .validated();
    assert_eq!(cfg.initial_jitter, Duration::from_secs(1));
}

// =========================================================================
// Firing
// =========================================================================

#[test]
fn test_new_ticker_is_stopped() {
    let t = Ticker::every(Duration::from_secs(5));
    assert!(!t.is_running());
    assert_eq!(t.tick_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_first_tick_fires_after_one_period() {
    let mut t = Ticker::every(Duration::from_secs(5));
    let start = Instant::now();
    t.start();

    let info = t.wait_for_tick().await;

    assert_eq!(info.tick, 1);
    assert_eq!(start.elapsed(), Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_ticks_are_periodic_and_counted() {
    let mut t = Ticker::every(Duration::from_secs(5));
    let start = Instant::now();
    t.start();

    for expected in 1..=4 {
        let info = t.wait_for_tick().await;
        assert_eq!(info.tick, expected);
    }
    assert_eq!(start.elapsed(), Duration::from_secs(20));
    assert_eq!(t.tick_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_stopped_ticker_never_fires() {
    let mut t = Ticker::every(Duration::from_secs(1));
    let result = tokio::time::timeout(Duration::from_secs(60), t.wait_for_tick()).await;
    assert!(result.is_err(), "stopped ticker should pend forever");
}

#[tokio::test(start_paused = true)]
async fn test_stop_then_start_resets_schedule() {
    let mut t = Ticker::every(Duration::from_secs(5));
    t.start();
    t.wait_for_tick().await;
    t.stop();
    assert!(!t.is_running());

    let result = tokio::time::timeout(Duration::from_secs(30), t.wait_for_tick()).await;
    assert!(result.is_err());

    let restarted = Instant::now();
    t.start();
    let info = t.wait_for_tick().await;
    assert_eq!(info.tick, 2);
    assert_eq!(restarted.elapsed(), Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_late_tick_skips_ahead_instead_of_bursting() {
    let mut t = Ticker::every(Duration::from_secs(1));
    t.start();
    tokio::time::advance(Duration::from_millis(3500)).await;

    let info = t.wait_for_tick().await;
    assert_eq!(info.late_by, Duration::from_millis(2500));

    // Next tick is one full period after the late one, not immediate.
    let before = Instant::now();
    let info = t.wait_for_tick().await;
    assert_eq!(info.tick, 2);
    assert_eq!(before.elapsed(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_jitter_delays_first_tick_within_bound() {
    let mut t = Ticker::new(TickConfig {
        period: Duration::from_secs(2),
        initial_jitter: Duration::from_millis(500),
    });
    let start = Instant::now();
    t.start();
    t.wait_for_tick().await;
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed <= Duration::from_millis(2500));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_wait_keeps_schedule() {
    let mut t = Ticker::every(Duration::from_secs(5));
    let start = Instant::now();
    t.start();

    let result = tokio::time::timeout(Duration::from_secs(2), t.wait_for_tick()).await;
    assert!(result.is_err());

    t.wait_for_tick().await;
    assert_eq!(start.elapsed(), Duration::from_secs(5));
}
