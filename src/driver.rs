//! Driver spawns and manages the speed sensor tasks
//!
//! ```text
//! WheelSensorLink ──► link pump ──────► mpsc ─┐
//!                                             ├─► arbiter task ──► watch<SpeedReading>
//! LocationFeed ─────► location pump ──► mpsc ─┤
//!                     commands (reset_lap) ───┤
//!                     watchdog interval ──────┘
//! ```
//!
//! The producers never block on each other: each pump owns its producer and pushes
//! onto its own channel. The arbiter task is the only place state changes.

use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::RunConfig;
use crate::provider::{LinkEvent, LocationFeed, WheelSensorLink};
use crate::sensor::{SpeedSourceArbiter, parse_notification};
use crate::types::{LocationSample, SpeedReading};

/// Requests from the service to the arbiter task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverCommand {
    ResetLap,
}

/// Result of spawning driver tasks
pub struct DriverChannels {
    /// Receiver for published readings
    pub readings: watch::Receiver<SpeedReading>,
    /// Sender for control commands
    pub commands: mpsc::Sender<DriverCommand>,
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
    /// Pump and arbiter tasks
    pub tasks: Vec<JoinHandle<()>>,
}

/// Driver spawns and manages the speed sensor tasks
pub struct Driver;

impl Driver {
    /// Spawn the pumps and the arbiter task.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn spawn<L, F>(config: RunConfig, link: L, feed: F) -> DriverChannels
    where
        L: WheelSensorLink,
        F: LocationFeed,
    {
        let capacity = config.channel_capacity.max(1);
        let (link_tx, link_rx) = mpsc::channel(capacity);
        let (location_tx, location_rx) = mpsc::channel(capacity);
        let (command_tx, command_rx) = mpsc::channel(8);

        let arbiter = SpeedSourceArbiter::new(&config, now());
        let (reading_tx, reading_rx) = watch::channel(arbiter.reading());

        let cancel = CancellationToken::new();

        let tasks = vec![
            tokio::spawn(Self::link_pump(link, link_tx, config.clone(), cancel.clone())),
            tokio::spawn(Self::location_pump(feed, location_tx, config.clone(), cancel.clone())),
            tokio::spawn(Self::arbiter_task(
                arbiter,
                config.watchdog_tick(),
                link_rx,
                location_rx,
                command_rx,
                reading_tx,
                cancel.clone(),
            )),
        ];

        DriverChannels { readings: reading_rx, commands: command_tx, cancel, tasks }
    }

    /// Owns the sensor link: keeps discovery running while disconnected and forwards
    /// events to the arbiter.
    async fn link_pump<L>(
        mut link: L,
        events: mpsc::Sender<LinkEvent>,
        config: RunConfig,
        cancel: CancellationToken,
    ) where
        L: WheelSensorLink,
    {
        info!("Sensor link pump started");
        let mut event_count = 0u64;
        let mut failures = 0u32;
        let mut wants_discovery = true;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            if wants_discovery {
                if link.is_scanning() {
                    trace!("Discovery already running");
                    wants_discovery = false;
                } else {
                    match link.start_discovery().await {
                        Ok(()) => {
                            debug!("Requested sensor discovery");
                            wants_discovery = false;
                        }
                        Err(e) => {
                            failures += 1;
                            let delay = config.reconnect_backoff(failures);
                            warn!("Discovery failed (attempt {}), retrying in {:?}: {}", failures, delay, e);
                            if !sleep_or_cancel(delay, &cancel).await {
                                break;
                            }
                            continue;
                        }
                    }
                }
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Sensor link pump cancelled during read");
                    break;
                }
                result = link.next_event() => result,
            };

            match result {
                Ok(Some(event)) => {
                    event_count += 1;
                    failures = 0;
                    match &event {
                        LinkEvent::Connected { device } => info!(device = %device, "Wheel sensor connected"),
                        LinkEvent::Disconnected => {
                            info!("Wheel sensor disconnected, restarting discovery");
                            wants_discovery = true;
                        }
                        LinkEvent::Notification(frame) => trace!(len = frame.len(), "Notification"),
                    }
                    if events.send(event).await.is_err() {
                        debug!("Arbiter gone, stopping sensor link pump");
                        break;
                    }
                }
                Ok(None) => {
                    info!("Sensor link closed after {} events", event_count);
                    break;
                }
                Err(e) => {
                    failures += 1;
                    let delay = config.reconnect_backoff(failures);
                    if e.is_retryable() {
                        warn!("Sensor link error (attempt {}), retrying in {:?}: {}", failures, delay, e);
                    } else {
                        error!("Sensor link error (attempt {}), retrying in {:?}: {}", failures, delay, e);
                    }
                    if !sleep_or_cancel(delay, &cancel).await {
                        break;
                    }
                }
            }
        }

        if link.is_scanning() {
            match link.stop_discovery().await {
                Ok(()) => debug!("Stopped discovery on shutdown"),
                Err(e) => warn!("Failed to stop discovery on shutdown: {}", e),
            }
        }
        info!("Sensor link pump ended ({} events)", event_count);
    }

    /// Owns the location feed and forwards samples to the arbiter.
    async fn location_pump<F>(
        mut feed: F,
        samples: mpsc::Sender<LocationSample>,
        config: RunConfig,
        cancel: CancellationToken,
    ) where
        F: LocationFeed,
    {
        info!("Location pump started");
        let mut sample_count = 0u64;
        let mut failures = 0u32;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = feed.next_sample() => result,
            };

            match result {
                Ok(Some(sample)) => {
                    sample_count += 1;
                    failures = 0;
                    if samples.send(sample).await.is_err() {
                        debug!("Arbiter gone, stopping location pump");
                        break;
                    }
                }
                Ok(None) => {
                    info!("Location feed ended after {} samples", sample_count);
                    break;
                }
                Err(e) => {
                    failures += 1;
                    let delay = config.reconnect_backoff(failures);
                    warn!("Location feed error (attempt {}), retrying in {:?}: {}", failures, delay, e);
                    if !sleep_or_cancel(delay, &cancel).await {
                        break;
                    }
                }
            }
        }

        info!("Location pump ended ({} samples)", sample_count);
    }

    /// Drains both producer channels, commands and the watchdog tick.
    async fn arbiter_task(
        mut arbiter: SpeedSourceArbiter,
        tick_period: Duration,
        mut link_events: mpsc::Receiver<LinkEvent>,
        mut locations: mpsc::Receiver<LocationSample>,
        mut commands: mpsc::Receiver<DriverCommand>,
        readings: watch::Sender<SpeedReading>,
        cancel: CancellationToken,
    ) {
        info!("Arbiter task started");
        let mut watchdog = tokio::time::interval_at(Instant::now() + tick_period, tick_period);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut link_open = true;
        let mut location_open = true;

        loop {
            // (reading, whether subscribers must be woken even if nothing changed)
            let (reading, always_publish) = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Arbiter task cancelled");
                    break;
                }
                event = link_events.recv(), if link_open => match event {
                    Some(LinkEvent::Notification(frame)) => match parse_notification(&frame) {
                        Ok(Some(sample)) => (arbiter.on_wheel_sample(sample, now()), true),
                        Ok(None) => {
                            trace!("Notification without wheel data");
                            continue;
                        }
                        Err(e) => {
                            warn!("Dropping malformed notification: {}", e);
                            continue;
                        }
                    },
                    Some(LinkEvent::Disconnected) => (arbiter.on_disconnect(now()), true),
                    Some(LinkEvent::Connected { .. }) => continue,
                    None => {
                        debug!("Sensor link channel closed");
                        link_open = false;
                        continue;
                    }
                },
                sample = locations.recv(), if location_open => match sample {
                    Some(sample) => (arbiter.on_location(sample, now()), true),
                    None => {
                        debug!("Location channel closed");
                        location_open = false;
                        continue;
                    }
                },
                command = commands.recv() => match command {
                    Some(DriverCommand::ResetLap) => (arbiter.reset_lap(now()), true),
                    None => {
                        debug!("Command channel closed, stopping arbiter");
                        break;
                    }
                },
                _ = watchdog.tick() => (arbiter.on_tick(now()), false),
            };

            readings.send_if_modified(|current| {
                let changed = always_publish || !same_values(current, &reading);
                *current = reading;
                changed
            });

            if readings.is_closed() {
                debug!("Reading receivers dropped, stopping arbiter");
                break;
            }
        }

        info!("Arbiter task ended");
    }
}

/// Runtime clock as a std instant; follows the paused clock in tests.
fn now() -> std::time::Instant {
    Instant::now().into_std()
}

fn same_values(a: &SpeedReading, b: &SpeedReading) -> bool {
    a.speed_kmh == b.speed_kmh
        && a.distance_m == b.distance_m
        && a.source == b.source
        && a.bluetooth_active == b.bluetooth_active
        && a.position == b.position
}

/// Returns false if cancelled first.
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
