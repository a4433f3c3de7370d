//! Authoritative per-room playback state
//!
//! `RoomState` is the single aggregate a room coordinator owns. All
//! transitions are synchronous and infallible except for index-taking
//! operations, which reject out-of-range input without touching the state.
//! Position arithmetic uses a monotonic `Instant` so that reconciliation is
//! immune to wall-clock adjustments; the wall-clock timestamp only appears
//! in outgoing snapshots.

use thiserror::Error;
use tokio::time::Instant;

use unison_protocol::{RoomSnapshot, Track};

/// Rejection returned by index-taking transitions
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("index {index} is out of range for playlist of length {len}")]
    OutOfRange { index: usize, len: usize },
}

/// Coarse lifecycle phase of a room, derived from the state fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    /// Empty playlist, nothing to play
    Idle,
    /// Has tracks, current entry at the start, not playing
    Loaded,
    /// Transport running
    Playing,
    /// Transport stopped mid-track
    Paused,
}

/// One room's authoritative playback state
#[derive(Debug, Clone)]
pub struct RoomState {
    playlist: Vec<Track>,
    current_index: Option<usize>,
    playing: bool,
    /// Offset into the current track at `last_update`
    position: f64,
    /// Monotonic instant at which `position` was last known accurate
    last_update: Instant,
    volume: f64,
}

impl RoomState {
    pub fn new(now: Instant) -> Self {
        Self {
            playlist: Vec::new(),
            current_index: None,
            playing: false,
            position: 0.0,
            last_update: now,
            volume: 1.0,
        }
    }

    pub fn playlist(&self) -> &[Track] {
        &self.playlist
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current_index.and_then(|i| self.playlist.get(i))
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn phase(&self) -> RoomPhase {
        if self.playlist.is_empty() {
            RoomPhase::Idle
        } else if self.playing {
            RoomPhase::Playing
        } else if self.position == 0.0 {
            RoomPhase::Loaded
        } else {
            RoomPhase::Paused
        }
    }

    /// Playback offset as seen by an observer at `now`
    ///
    /// While playing this extrapolates from the last accepted update and
    /// clamps to the track duration when one is known; while paused the
    /// stored position is exact.
    pub fn effective_position(&self, now: Instant) -> f64 {
        if !self.playing {
            return self.position;
        }

        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        let extrapolated = self.position + elapsed;

        match self.current_track().and_then(|t| t.duration) {
            Some(duration) => extrapolated.min(duration),
            None => extrapolated,
        }
    }

    /// Copy of the state for broadcast, stamped with the given wall clock
    /// (seconds since the Unix epoch)
    ///
    /// The snapshot's `position` is the effective position at `now`, so a
    /// receiver extrapolates from `wall_clock` without knowing our monotonic
    /// epoch.
    pub fn snapshot_at(&self, now: Instant, wall_clock: f64) -> RoomSnapshot {
        RoomSnapshot {
            playlist: self.playlist.clone(),
            current_track: self.current_index,
            playing: self.playing,
            position: self.effective_position(now),
            last_update_time: wall_clock,
            volume: self.volume,
        }
    }

    /// Append a track; the first selectable track becomes current
    pub fn add_track(&mut self, track: Track, now: Instant) {
        self.playlist.push(track);

        if self.current_index.is_none() {
            self.current_index = Some(self.playlist.len() - 1);
            self.position = 0.0;
            self.last_update = now;
        }
    }

    /// Start playback; returns false (and changes nothing) when there is no
    /// selected track or playback is already running
    pub fn play(&mut self, now: Instant) -> bool {
        if self.playing || self.current_index.is_none() {
            return false;
        }

        self.playing = true;
        self.last_update = now;
        true
    }

    /// Stop playback, pinning the position at its effective value
    pub fn pause(&mut self, now: Instant) -> bool {
        if !self.playing {
            return false;
        }

        self.position = self.effective_position(now);
        self.playing = false;
        self.last_update = now;
        true
    }

    /// Move the playhead, optionally selecting a playlist entry
    pub fn seek(
        &mut self,
        position: f64,
        index: Option<usize>,
        now: Instant,
    ) -> Result<(), StateError> {
        if let Some(index) = index {
            if index >= self.playlist.len() {
                return Err(StateError::OutOfRange { index, len: self.playlist.len() });
            }
            self.current_index = Some(index);
        }

        self.position = position.max(0.0);
        self.last_update = now;
        Ok(())
    }

    /// Advance to the next entry; a no-op at the playlist tail
    pub fn next_track(&mut self, now: Instant) -> bool {
        match self.current_index {
            Some(i) if i + 1 < self.playlist.len() => {
                self.change_track(i + 1, now);
                true
            }
            _ => false,
        }
    }

    /// Go back one entry; a no-op at the head
    pub fn prev_track(&mut self, now: Instant) -> bool {
        match self.current_index {
            Some(i) if i > 0 => {
                self.change_track(i - 1, now);
                true
            }
            _ => false,
        }
    }

    fn change_track(&mut self, index: usize, now: Instant) {
        self.current_index = Some(index);
        self.position = 0.0;
        self.last_update = now;
    }

    /// Remove a playlist entry, fixing up the current selection
    ///
    /// Removing an entry before the current one shifts the selection left;
    /// removing the current entry stops playback and reloads the entry that
    /// slid into its place (or the new tail); removing the last remaining
    /// entry returns the room to idle.
    pub fn remove_track(&mut self, index: usize, now: Instant) -> Result<(), StateError> {
        if index >= self.playlist.len() {
            return Err(StateError::OutOfRange { index, len: self.playlist.len() });
        }

        self.playlist.remove(index);

        let Some(current) = self.current_index else {
            return Ok(());
        };

        if self.playlist.is_empty() {
            self.current_index = None;
            self.playing = false;
            self.position = 0.0;
            self.last_update = now;
        } else if index < current {
            self.current_index = Some(current - 1);
        } else if index == current {
            self.playing = false;
            self.change_track(current.min(self.playlist.len() - 1), now);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            title: format!("Track {}", id),
            thumbnail: "https://img.example/t.jpg".to_string(),
            channel: "Channel".to_string(),
            duration: None,
            published_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    fn loaded_state(tracks: usize, now: Instant) -> RoomState {
        let mut state = RoomState::new(now);
        for i in 0..tracks {
            state.add_track(track(&i.to_string()), now);
        }
        state
    }

    #[test]
    fn test_first_track_selected_without_autoplay() {
        let now = Instant::now();
        let mut state = RoomState::new(now);
        assert_eq!(state.phase(), RoomPhase::Idle);

        state.add_track(track("a"), now);
        assert_eq!(state.current_index(), Some(0));
        assert!(!state.is_playing());
        assert_eq!(state.phase(), RoomPhase::Loaded);

        assert!(state.play(now));
        assert_eq!(state.phase(), RoomPhase::Playing);
    }

    #[test]
    fn test_play_rejected_when_idle() {
        let now = Instant::now();
        let mut state = RoomState::new(now);
        assert!(!state.play(now));
        assert!(!state.is_playing());
    }

    #[test]
    fn test_play_idempotent() {
        let now = Instant::now();
        let mut state = loaded_state(1, now);
        assert!(state.play(now));
        assert!(!state.play(now));
    }

    #[test]
    fn test_effective_position_extrapolates_while_playing() {
        let now = Instant::now();
        let mut state = loaded_state(1, now);
        state.play(now);
        state.seek(10.0, None, now).unwrap();

        let later = now + Duration::from_secs(5);
        assert!((state.effective_position(later) - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_effective_position_frozen_while_paused() {
        let now = Instant::now();
        let mut state = loaded_state(1, now);
        state.play(now);
        state.seek(10.0, None, now).unwrap();

        let later = now + Duration::from_secs(5);
        state.pause(later);
        assert!((state.effective_position(later + Duration::from_secs(60)) - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_effective_position_clamps_to_duration() {
        let now = Instant::now();
        let mut state = RoomState::new(now);
        let mut t = track("a");
        t.duration = Some(30.0);
        state.add_track(t, now);
        state.play(now);
        state.seek(25.0, None, now).unwrap();

        assert_eq!(state.effective_position(now + Duration::from_secs(60)), 30.0);
    }

    #[test]
    fn test_seek_with_index_selects_track() {
        let now = Instant::now();
        let mut state = loaded_state(3, now);

        state.seek(40.0, Some(2), now).unwrap();
        assert_eq!(state.current_index(), Some(2));
        assert_eq!(state.effective_position(now), 40.0);
    }

    #[test]
    fn test_seek_out_of_range_rejected_atomically() {
        let now = Instant::now();
        let mut state = loaded_state(2, now);
        state.seek(10.0, Some(1), now).unwrap();

        let err = state.seek(99.0, Some(5), now).unwrap_err();
        assert_eq!(err, StateError::OutOfRange { index: 5, len: 2 });
        // Nothing changed
        assert_eq!(state.current_index(), Some(1));
        assert_eq!(state.effective_position(now), 10.0);
    }

    #[test]
    fn test_negative_seek_clamped_to_zero() {
        let now = Instant::now();
        let mut state = loaded_state(1, now);
        state.seek(-3.0, None, now).unwrap();
        assert_eq!(state.effective_position(now), 0.0);
    }

    #[test]
    fn test_next_track_stops_at_tail() {
        let now = Instant::now();
        let mut state = loaded_state(2, now);
        state.play(now);

        assert!(state.next_track(now));
        assert_eq!(state.current_index(), Some(1));
        assert_eq!(state.effective_position(now), 0.0);
        // Track changes keep the transport flag
        assert!(state.is_playing());

        // Tail is terminal, not a loop
        assert!(!state.next_track(now));
        assert_eq!(state.current_index(), Some(1));
        assert!(state.is_playing());
    }

    #[test]
    fn test_prev_track_stops_at_head() {
        let now = Instant::now();
        let mut state = loaded_state(2, now);
        assert!(!state.prev_track(now));

        state.next_track(now);
        assert!(state.prev_track(now));
        assert_eq!(state.current_index(), Some(0));
    }

    #[test]
    fn test_remove_before_current_shifts_selection() {
        let now = Instant::now();
        let mut state = loaded_state(3, now);
        state.seek(20.0, Some(2), now).unwrap();
        state.play(now);

        state.remove_track(0, now).unwrap();
        assert_eq!(state.current_index(), Some(1));
        assert_eq!(state.current_track().unwrap().id, "2");
        // Unrelated removal does not disturb playback
        assert!(state.is_playing());
    }

    #[test]
    fn test_remove_current_reloads_at_zero() {
        let now = Instant::now();
        let mut state = loaded_state(3, now);
        state.seek(20.0, Some(1), now).unwrap();
        state.play(now);

        state.remove_track(1, now).unwrap();
        assert_eq!(state.current_index(), Some(1));
        assert_eq!(state.current_track().unwrap().id, "2");
        assert!(!state.is_playing());
        assert_eq!(state.effective_position(now), 0.0);
    }

    #[test]
    fn test_remove_current_at_tail_clamps_index() {
        let now = Instant::now();
        let mut state = loaded_state(2, now);
        state.seek(0.0, Some(1), now).unwrap();

        state.remove_track(1, now).unwrap();
        assert_eq!(state.current_index(), Some(0));
    }

    #[test]
    fn test_remove_last_track_returns_to_idle() {
        let now = Instant::now();
        let mut state = loaded_state(1, now);
        state.play(now);

        state.remove_track(0, now).unwrap();
        assert_eq!(state.phase(), RoomPhase::Idle);
        assert_eq!(state.current_index(), None);
        assert!(!state.is_playing());
    }

    #[test]
    fn test_remove_out_of_range_rejected() {
        let now = Instant::now();
        let mut state = loaded_state(1, now);
        assert!(state.remove_track(3, now).is_err());
        assert_eq!(state.playlist().len(), 1);
    }

    #[test]
    fn test_snapshot_reflects_effective_position() {
        let now = Instant::now();
        let mut state = loaded_state(1, now);
        state.play(now);
        state.seek(10.0, None, now).unwrap();

        let later = now + Duration::from_secs(3);
        let snapshot = state.snapshot_at(later, 1_700_000_000.0);
        assert!((snapshot.position - 13.0).abs() < 1e-9);
        assert_eq!(snapshot.last_update_time, 1_700_000_000.0);
        assert!(snapshot.playing);
        assert_eq!(snapshot.current_track, Some(0));
    }
}
