//! Position-report reconciliation
//!
//! Every client runs its own player and reports positions back, so the
//! server sees a mix of genuine user seeks, echoes of its own broadcasts,
//! and player jitter. The reconciler classifies each report against the
//! last broadcast and decides whether it may become the next one. It also
//! owns the heartbeat cadence and the grace window that absorbs transient
//! pauses (buffering, backgrounding) before they flip the whole room.
//!
//! The struct is pure state over explicit `Instant`s, so classification is
//! testable without a runtime.

use std::time::Duration;

use tokio::time::Instant;

use unison_protocol::PauseReason;

/// Tuning parameters for the reconciliation engine
///
/// All debounce windows live here rather than at the call sites.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Minimum drift (seconds) for a report to count as an intentional seek
    pub seek_threshold: f64,

    /// Reports arriving within this window of a broadcast are treated as
    /// echoes of that broadcast
    pub cooldown_window: Duration,

    /// How long an advisory pause waits for a contradicting play before it
    /// is applied
    pub grace_window: Duration,

    /// Heartbeat broadcast cadence while playing
    pub playing_heartbeat: Duration,

    /// Heartbeat broadcast cadence while paused/idle
    pub idle_heartbeat: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            seek_threshold: 2.5,
            cooldown_window: Duration::from_millis(500),
            grace_window: Duration::from_secs(1),
            playing_heartbeat: Duration::from_secs(1),
            idle_heartbeat: Duration::from_secs(10),
        }
    }
}

/// A client's self-reported playback observation
///
/// Ephemeral: consumed by classification, never stored.
#[derive(Debug, Clone, Copy)]
pub struct SyncSample {
    pub position: f64,
    pub playing: bool,
}

/// What the engine decided about one sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleClass {
    /// Malformed report (NaN/negative); drop and log, never mutate
    Anomaly,
    /// Likely an echo of a broadcast still propagating; drop silently
    Suppressed { drift: f64 },
    /// Genuine user action; becomes the next broadcast
    IntentionalSeek { drift: f64 },
    /// Sub-threshold wobble; refines nothing visible, no broadcast
    Informational { drift: f64 },
}

/// An advisory pause waiting out its grace window
#[derive(Debug, Clone, Copy)]
struct PendingPause {
    reason: PauseReason,
    deadline: Instant,
}

/// Per-room reconciliation state
///
/// Logically a shadow of the room state: created with it, destroyed with it.
#[derive(Debug)]
pub struct Reconciler {
    config: SyncConfig,
    last_broadcast_position: f64,
    last_broadcast_time: Instant,
    last_broadcast_playing: bool,
    pending_pause: Option<PendingPause>,
}

impl Reconciler {
    pub fn new(config: SyncConfig, now: Instant) -> Self {
        Self {
            config,
            last_broadcast_position: 0.0,
            last_broadcast_time: now,
            last_broadcast_playing: false,
            pending_pause: None,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Position the room should be at now, extrapolated from the last
    /// broadcast assuming continuous playback
    pub fn expected_position(&self, at: Instant) -> f64 {
        if self.last_broadcast_playing {
            let elapsed = at.saturating_duration_since(self.last_broadcast_time).as_secs_f64();
            self.last_broadcast_position + elapsed
        } else {
            self.last_broadcast_position
        }
    }

    /// Classify one client report received at `at`
    pub fn classify(&self, sample: SyncSample, at: Instant) -> SampleClass {
        if !sample.position.is_finite() || sample.position < 0.0 {
            return SampleClass::Anomaly;
        }

        let drift = (sample.position - self.expected_position(at)).abs();

        if at.saturating_duration_since(self.last_broadcast_time) < self.config.cooldown_window {
            return SampleClass::Suppressed { drift };
        }

        if drift >= self.config.seek_threshold {
            SampleClass::IntentionalSeek { drift }
        } else {
            SampleClass::Informational { drift }
        }
    }

    /// Record an outgoing broadcast; starts a fresh cooldown window
    pub fn record_broadcast(&mut self, position: f64, playing: bool, at: Instant) {
        self.last_broadcast_position = position;
        self.last_broadcast_playing = playing;
        self.last_broadcast_time = at;
    }

    /// When the next heartbeat broadcast is due
    pub fn heartbeat_deadline(&self, playing: bool) -> Instant {
        let cadence = if playing {
            self.config.playing_heartbeat
        } else {
            self.config.idle_heartbeat
        };
        self.last_broadcast_time + cadence
    }

    /// Queue an advisory pause; it only takes effect if no play cancels it
    /// within the grace window. A later advisory pause does not extend an
    /// earlier deadline.
    pub fn queue_pause(&mut self, reason: PauseReason, now: Instant) {
        if self.pending_pause.is_none() {
            self.pending_pause = Some(PendingPause {
                reason,
                deadline: now + self.config.grace_window,
            });
        }
    }

    /// Cancel a queued advisory pause (a contradicting play arrived)
    pub fn cancel_pending_pause(&mut self) -> Option<PauseReason> {
        self.pending_pause.take().map(|p| p.reason)
    }

    /// Take the queued pause if its grace window has expired
    pub fn take_expired_pause(&mut self, now: Instant) -> Option<PauseReason> {
        match self.pending_pause {
            Some(p) if now >= p.deadline => {
                self.pending_pause = None;
                Some(p.reason)
            }
            _ => None,
        }
    }

    pub fn pending_pause_deadline(&self) -> Option<Instant> {
        self.pending_pause.map(|p| p.deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn reconciler(now: Instant) -> Reconciler {
        Reconciler::new(SyncConfig::default(), now)
    }

    fn sample(position: f64) -> SyncSample {
        SyncSample { position, playing: true }
    }

    #[test]
    fn test_echo_within_cooldown_suppressed() {
        let now = Instant::now();
        let mut r = reconciler(now);
        r.record_broadcast(40.0, false, now);

        // A different client parrots the broadcast position back right away
        let class = r.classify(sample(40.5), now + Duration::from_millis(200));
        assert_matches!(class, SampleClass::Suppressed { .. });
    }

    #[test]
    fn test_large_drift_within_cooldown_still_suppressed() {
        let now = Instant::now();
        let mut r = reconciler(now);
        r.record_broadcast(40.0, false, now);

        // Even a big jump is not trusted while the broadcast is in flight
        let class = r.classify(sample(90.0), now + Duration::from_millis(100));
        assert_matches!(class, SampleClass::Suppressed { .. });
    }

    #[test]
    fn test_on_track_report_is_informational() {
        let now = Instant::now();
        let mut r = reconciler(now);
        r.record_broadcast(10.0, true, now);

        // Five seconds later the client reports 15s: drift ~0
        let class = r.classify(sample(15.0), now + Duration::from_secs(5));
        assert_matches!(class, SampleClass::Informational { drift } if drift < 0.001);
    }

    #[test]
    fn test_drifted_report_is_intentional_seek() {
        let now = Instant::now();
        let mut r = reconciler(now);
        r.record_broadcast(10.0, true, now);

        // Client reports 22s when 15s was expected: drift 7 >= threshold
        let class = r.classify(sample(22.0), now + Duration::from_secs(5));
        assert_matches!(class, SampleClass::IntentionalSeek { drift } if (drift - 7.0).abs() < 0.001);
    }

    #[test]
    fn test_no_extrapolation_while_paused() {
        let now = Instant::now();
        let mut r = reconciler(now);
        r.record_broadcast(10.0, false, now);

        // Paused room: expected stays at 10, so a report of 15 is a seek
        // only if it crosses the threshold
        let at = now + Duration::from_secs(5);
        assert_matches!(r.classify(sample(11.0), at), SampleClass::Informational { .. });
        assert_matches!(r.classify(sample(15.0), at), SampleClass::IntentionalSeek { .. });
    }

    #[test]
    fn test_malformed_samples_are_anomalies() {
        let now = Instant::now();
        let r = reconciler(now);
        let at = now + Duration::from_secs(1);

        assert_eq!(r.classify(sample(f64::NAN), at), SampleClass::Anomaly);
        assert_eq!(r.classify(sample(f64::INFINITY), at), SampleClass::Anomaly);
        assert_eq!(r.classify(sample(-1.0), at), SampleClass::Anomaly);
    }

    #[test]
    fn test_broadcast_resets_cooldown() {
        let now = Instant::now();
        let mut r = reconciler(now);
        r.record_broadcast(10.0, true, now);

        let later = now + Duration::from_secs(5);
        r.record_broadcast(22.0, true, later);

        // Echo of the fresh broadcast is suppressed again
        let class = r.classify(sample(22.0), later + Duration::from_millis(100));
        assert_matches!(class, SampleClass::Suppressed { .. });
    }

    #[test]
    fn test_heartbeat_cadence_follows_transport() {
        let now = Instant::now();
        let mut r = reconciler(now);
        r.record_broadcast(0.0, true, now);
        assert_eq!(r.heartbeat_deadline(true), now + Duration::from_secs(1));
        assert_eq!(r.heartbeat_deadline(false), now + Duration::from_secs(10));
    }

    #[test]
    fn test_pause_grace_window() {
        let now = Instant::now();
        let mut r = reconciler(now);

        r.queue_pause(PauseReason::Buffering, now);
        assert!(r.take_expired_pause(now + Duration::from_millis(500)).is_none());
        assert_eq!(
            r.take_expired_pause(now + Duration::from_secs(1)),
            Some(PauseReason::Buffering)
        );
        // Consumed
        assert!(r.take_expired_pause(now + Duration::from_secs(2)).is_none());
    }

    #[test]
    fn test_play_cancels_pending_pause() {
        let now = Instant::now();
        let mut r = reconciler(now);

        r.queue_pause(PauseReason::Backgrounded, now);
        assert_eq!(r.cancel_pending_pause(), Some(PauseReason::Backgrounded));
        assert!(r.take_expired_pause(now + Duration::from_secs(5)).is_none());
    }

    #[test]
    fn test_second_advisory_pause_does_not_extend_deadline() {
        let now = Instant::now();
        let mut r = reconciler(now);

        r.queue_pause(PauseReason::Buffering, now);
        r.queue_pause(PauseReason::Backgrounded, now + Duration::from_millis(900));

        assert_eq!(
            r.take_expired_pause(now + Duration::from_secs(1)),
            Some(PauseReason::Buffering)
        );
    }
}
