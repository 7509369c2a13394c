//! Frame Sampler - per-frame device registry sampling
//!
//! Reads the device registry once per display frame, normalizes every slot and
//! pairs the result with the previous frame. The sampler is a statum state
//! machine:
//!
//! ```text
//! Priming ──(prime: first read becomes `previous`, nothing delivered)──► Sampling
//!                                                                          │  ▲
//!                                                                          └──┘
//!                                                          sample: (current, previous)
//! ```
//!
//! [`SamplerHandle`] drives the machine from a tokio task. The frame interval
//! keeps its own schedule, so a slow consumer never delays the next tick, and
//! frames are handed over with `try_send`: delivery is fire-and-forget.

use crate::controller::device_source::DeviceSource;
use crate::controller::snapshot::{normalize_all, Frame, FramePair};
use chrono::Local;
use serde::{Deserialize, Serialize};
use statum::{machine, state};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerSettings {
    /// Display refresh rate the sampler ticks at
    pub frame_rate_hz: u32,
    /// Frames buffered for the consumer before new ones are dropped
    pub channel_capacity: usize,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            frame_rate_hz: 60,
            channel_capacity: 64,
        }
    }
}

impl SamplerSettings {
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate_hz.max(1) as f64)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    #[error("Failed to initialize sampler: {0}")]
    InitializationError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),
}

#[state]
#[derive(Debug, Clone)]
pub enum SamplerState {
    Priming,
    Sampling,
}

#[machine]
pub struct FrameSampler<S: SamplerState> {
    source: Box<dyn DeviceSource>,

    // Frame of the previous tick and when it was read
    previous: Frame,
    previous_at: Instant,
}

impl<S: SamplerState> FrameSampler<S> {
    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    fn read_frame(&mut self) -> Frame {
        normalize_all(&self.source.query())
    }
}

impl FrameSampler<Priming> {
    pub fn create(source: Box<dyn DeviceSource>) -> Self {
        debug!("Creating frame sampler on {} source", source.name());
        Self::new(source, Vec::new(), Instant::now())
    }

    /// Reads the first frame, which only becomes `previous` and is not delivered
    pub fn prime(mut self) -> FrameSampler<Sampling> {
        self.previous = self.read_frame();
        self.previous_at = Instant::now();
        debug!(
            "Primed sampler with {} slots from {}",
            self.previous.len(),
            self.source.name()
        );
        self.transition()
    }
}

impl FrameSampler<Sampling> {
    /// Reads the registry and pairs it with the previous frame
    pub fn sample(&mut self) -> FramePair {
        let current = self.read_frame();
        let now = Instant::now();
        let since_previous = now.saturating_duration_since(self.previous_at);
        let previous = std::mem::replace(&mut self.previous, current.clone());
        self.previous_at = now;

        FramePair {
            current,
            previous,
            captured_at: Local::now(),
            since_previous,
        }
    }
}

// Sender shared with the loop; `stop()` takes it so no frame can follow
type DeliveryGate = Arc<Mutex<Option<mpsc::Sender<FramePair>>>>;

enum Delivery {
    Sent,
    Dropped,
    Stopped,
}

fn deliver(gate: &DeliveryGate, pair: FramePair) -> Delivery {
    let guard = gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let Some(sender) = guard.as_ref() else {
        return Delivery::Stopped;
    };

    match sender.try_send(pair) {
        Ok(()) => Delivery::Sent,
        Err(TrySendError::Full(_)) => Delivery::Dropped,
        Err(TrySendError::Closed(_)) => {
            info!("Frame consumer closed its channel");
            Delivery::Stopped
        }
    }
}

/// Handle to a sampler running on a tokio task
pub struct SamplerHandle {
    cancel: CancellationToken,
    gate: DeliveryGate,
    task: Option<JoinHandle<()>>,
}

impl SamplerHandle {
    /// Spawns the sampling loop; must be called from within a tokio runtime
    pub fn spawn(
        source: Box<dyn DeviceSource>,
        settings: Option<SamplerSettings>,
        sender: mpsc::Sender<FramePair>,
    ) -> Result<Self, SamplerError> {
        let settings = settings.unwrap_or_default();
        info!("Spawning frame sampler with settings: {:?}", settings);

        if settings.frame_rate_hz == 0 {
            return Err(SamplerError::InitializationError(
                "frame rate must be at least 1 Hz".to_string(),
            ));
        }
        if sender.is_closed() {
            return Err(SamplerError::ChannelError(
                "frame consumer already closed".to_string(),
            ));
        }

        let sampler = FrameSampler::create(source);
        let cancel = CancellationToken::new();
        let gate: DeliveryGate = Arc::new(Mutex::new(Some(sender)));

        let task = tokio::spawn(run_sampler_loop(
            sampler,
            settings.frame_period(),
            gate.clone(),
            cancel.clone(),
        ));

        info!("Frame sampler successfully started");
        Ok(Self {
            cancel,
            gate,
            task: Some(task),
        })
    }

    /// Stops the loop; no frame is delivered after this returns
    pub fn stop(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        info!("Stopping frame sampler");
        self.cancel.cancel();
        self.gate
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Waits for the loop task to finish
    pub async fn join(mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        if let Err(e) = task.await {
            error!("Sampler task terminated abnormally: {}", e);
        }
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_sampler_loop(
    sampler: FrameSampler<Priming>,
    period: Duration,
    gate: DeliveryGate,
    cancel: CancellationToken,
) {
    info!(
        "Starting sampler loop on {} source with {:.2}ms period",
        sampler.source_name(),
        period.as_secs_f64() * 1000.0
    );

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // The first tick fires immediately and primes the sampler
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            info!("Sampler stopped before priming");
            return;
        }
        _ = interval.tick() => {}
    }
    let mut sampler = sampler.prime();

    let mut delivered: u64 = 0;
    let mut dropped: u64 = 0;
    let mut last_stats = Instant::now();
    let stats_interval = Duration::from_secs(30);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let pair = sampler.sample();
        debug!(
            "Sampled {} slots ({:.2}ms since previous)",
            pair.current.len(),
            pair.since_previous.as_secs_f64() * 1000.0
        );

        match deliver(&gate, pair) {
            Delivery::Sent => delivered += 1,
            Delivery::Dropped => {
                dropped += 1;
                debug!("Frame consumer is behind, dropped frame");
            }
            Delivery::Stopped => break,
        }

        let now = Instant::now();
        if now - last_stats > stats_interval {
            info!(
                "Sampler stats: delivered {} frames, dropped {} in last {} seconds",
                delivered,
                dropped,
                (now - last_stats).as_secs()
            );
            if dropped > 0 {
                warn!("Frame consumer could not keep up with the display rate");
            }
            delivered = 0;
            dropped = 0;
            last_stats = now;
        }
    }

    info!("Sampler loop finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::device_source::EmptySource;
    use crate::controller::snapshot::RawDeviceEntry;
    use crate::mock::{MockDeviceSource, MockSettings};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Returns a scripted sequence of registry reads, then repeats the last one
    struct ScriptedSource {
        reads: VecDeque<Vec<Option<RawDeviceEntry>>>,
        last: Vec<Option<RawDeviceEntry>>,
    }

    impl ScriptedSource {
        fn new(reads: Vec<Vec<Option<RawDeviceEntry>>>) -> Self {
            Self {
                reads: reads.into(),
                last: Vec::new(),
            }
        }
    }

    impl DeviceSource for ScriptedSource {
        fn query(&mut self) -> Vec<Option<RawDeviceEntry>> {
            if let Some(next) = self.reads.pop_front() {
                self.last = next;
            }
            self.last.clone()
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn pad(index: usize, timestamp: f64) -> Option<RawDeviceEntry> {
        Some(RawDeviceEntry {
            index,
            connected: true,
            timestamp,
            id: "pad".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn priming_read_becomes_previous() {
        let source = ScriptedSource::new(vec![vec![pad(0, 1.0)], vec![pad(0, 2.0)]]);
        let mut sampler = FrameSampler::create(Box::new(source)).prime();

        let pair = sampler.sample();
        assert_eq!(pair.previous[0].as_ref().unwrap().timestamp, 1.0);
        assert_eq!(pair.current[0].as_ref().unwrap().timestamp, 2.0);
    }

    #[test]
    fn current_becomes_next_previous() {
        let source = ScriptedSource::new(vec![
            vec![],
            vec![pad(0, 1.0)],
            vec![pad(0, 2.0), pad(1, 5.0)],
        ]);
        let mut sampler = FrameSampler::create(Box::new(source)).prime();

        let first = sampler.sample();
        let second = sampler.sample();
        assert!(first.previous.is_empty());
        assert_eq!(second.previous, first.current);
        assert_eq!(second.current.len(), 2);
    }

    #[test]
    fn zombie_slot_is_null_next_to_valid_device() {
        let read = vec![pad(0, 12.0), None, pad(2, 0.0)];
        let source = ScriptedSource::new(vec![read.clone(), read]);
        let mut sampler = FrameSampler::create(Box::new(source)).prime();

        let pair = sampler.sample();
        assert!(pair.current[0].is_some());
        assert!(pair.current[1].is_none());
        assert!(pair.current[2].is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_registry_delivers_empty_frames() {
        let (tx, mut rx) = mpsc::channel(8);
        let handle = SamplerHandle::spawn(Box::new(EmptySource), None, tx).unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(first.current.is_empty());
        assert!(first.previous.is_empty());
        assert_eq!(second.previous, first.current);

        handle.stop();
        handle.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn frames_follow_the_frame_period() {
        let (tx, mut rx) = mpsc::channel(8);
        let settings = SamplerSettings {
            frame_rate_hz: 50,
            channel_capacity: 8,
        };
        let period = settings.frame_period();
        let handle = SamplerHandle::spawn(Box::new(EmptySource), Some(settings), tx).unwrap();

        rx.recv().await.unwrap();
        let pair = rx.recv().await.unwrap();
        assert_eq!(pair.since_previous, period);
        assert!(period.abs_diff(Duration::from_millis(20)) < Duration::from_micros(1));

        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_closes_the_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        let handle = SamplerHandle::spawn(Box::new(EmptySource), None, tx).unwrap();
        rx.recv().await.unwrap();

        handle.stop();
        handle.stop();
        while rx.try_recv().is_ok() {}

        assert!(rx.recv().await.is_none());
        handle.join().await;
    }

    /// Blocks inside `query` so a tick can be caught in flight
    struct SlowSource {
        queries: Arc<AtomicUsize>,
        in_query: Arc<AtomicBool>,
    }

    impl DeviceSource for SlowSource {
        fn query(&mut self) -> Vec<Option<RawDeviceEntry>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.in_query.store(true, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(100));
            self.in_query.store(false, Ordering::SeqCst);
            vec![pad(0, 1.0)]
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_during_in_flight_tick_blocks_its_delivery() {
        let queries = Arc::new(AtomicUsize::new(0));
        let in_query = Arc::new(AtomicBool::new(false));
        let source = SlowSource {
            queries: queries.clone(),
            in_query: in_query.clone(),
        };

        let (tx, mut rx) = mpsc::channel(64);
        let handle = SamplerHandle::spawn(Box::new(source), None, tx).unwrap();

        // Past priming and inside a sampling read
        while !(queries.load(Ordering::SeqCst) >= 2 && in_query.load(Ordering::SeqCst)) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        handle.stop();
        while rx.try_recv().is_ok() {}

        handle.join().await;
        assert!(rx.recv().await.is_none(), "frame delivered after stop");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_consumer_does_not_stall_sampling() {
        let (tx, mut rx) = mpsc::channel(1);
        let handle = SamplerHandle::spawn(Box::new(EmptySource), None, tx).unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        let stale = rx.recv().await.unwrap();
        let fresh = rx.recv().await.unwrap();
        assert!(fresh.captured_at >= stale.captured_at);
        assert!(handle.is_running());

        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn closed_consumer_ends_the_loop() {
        let (tx, rx) = mpsc::channel(1);
        let handle = SamplerHandle::spawn(Box::new(EmptySource), None, tx).unwrap();
        drop(rx);
        handle.join().await;
    }

    #[tokio::test]
    async fn zero_frame_rate_is_rejected() {
        let (tx, _rx) = mpsc::channel(1);
        let settings = SamplerSettings {
            frame_rate_hz: 0,
            ..Default::default()
        };
        let result = SamplerHandle::spawn(Box::new(EmptySource), Some(settings), tx);
        assert!(matches!(result, Err(SamplerError::InitializationError(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn mock_axis_ramps_and_recoils_through_the_sampler() {
        let (source, keyboard) = MockDeviceSource::create(MockSettings::default());
        keyboard.key_down("1");
        keyboard.key_down("w");

        let (tx, mut rx) = mpsc::channel(64);
        let handle = SamplerHandle::spawn(Box::new(source), None, tx).unwrap();

        let axis = |pair: &FramePair| pair.current[0].as_ref().unwrap().axes[1];

        let mut value = 0.0;
        for _ in 0..12 {
            let pair = rx.recv().await.unwrap();
            let next = axis(&pair);
            assert!(next >= value);
            value = next;
        }
        assert_eq!(value, 1.0);

        keyboard.key_up("w");
        for _ in 0..12 {
            let pair = rx.recv().await.unwrap();
            let next = axis(&pair);
            assert!(next <= value && next >= 0.0);
            value = next;
        }
        assert_eq!(value, 0.0);

        handle.stop();
        handle.join().await;
    }
}
