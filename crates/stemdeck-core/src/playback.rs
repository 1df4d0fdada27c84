use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::PlaybackError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    #[default]
    Idle,
    Playing,
}

/// The play control of one rendered stem. Clones share the same indicator.
#[derive(Debug, Clone)]
pub struct PlaybackHandle {
    id: Arc<str>,
    indicator: Arc<Mutex<Indicator>>,
}

impl PlaybackHandle {
    #[must_use]
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self {
            id: id.into(),
            indicator: Arc::new(Mutex::new(Indicator::Idle)),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn indicator(&self) -> Indicator {
        *self.indicator.lock()
    }

    fn set_indicator(&self, indicator: Indicator) {
        *self.indicator.lock() = indicator;
    }

    fn same_control(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.indicator, &other.indicator)
    }
}

/// Locator-to-sound capability supplied by the runtime.
pub trait AudioOutput {
    fn start(&mut self, path: &str) -> Result<(), PlaybackError>;
    fn stop(&mut self);

    /// True once the sound started last has run to its end.
    fn finished(&mut self) -> bool {
        false
    }
}

#[derive(Debug)]
struct ActivePlayback {
    handle: PlaybackHandle,
    path: String,
}

/// Keeps at most one stem audible. All starts and stops go through here.
#[derive(Debug)]
pub struct PlaybackController<O> {
    output: O,
    active: Option<ActivePlayback>,
}

impl<O: AudioOutput> PlaybackController<O> {
    #[must_use]
    pub fn new(output: O) -> Self {
        Self {
            output,
            active: None,
        }
    }

    /// Plays `path` on `handle`, stopping whatever else is playing. Calling
    /// it again with the playing handle stops playback. Returns the
    /// handle's resulting indicator.
    #[instrument(skip(self, handle), fields(handle = handle.id()))]
    pub fn play(&mut self, path: &str, handle: &PlaybackHandle) -> Indicator {
        if let Some(active) = self.active.take() {
            self.output.stop();
            active.handle.set_indicator(Indicator::Idle);
            if active.handle.same_control(handle) {
                info!(path = %active.path, "playback toggled off");
                return Indicator::Idle;
            }
            debug!(previous = active.handle.id(), "previous playback stopped");
        }

        match self.output.start(path) {
            Ok(()) => {
                handle.set_indicator(Indicator::Playing);
                self.active = Some(ActivePlayback {
                    handle: handle.clone(),
                    path: path.to_string(),
                });
                info!("playback started");
                Indicator::Playing
            }
            Err(error) => {
                warn!(%error, "playback failed to start");
                handle.set_indicator(Indicator::Idle);
                Indicator::Idle
            }
        }
    }

    /// Natural end of track. Ignored unless `handle` is the active one.
    pub fn track_ended(&mut self, handle: &PlaybackHandle) {
        let is_active = self
            .active
            .as_ref()
            .is_some_and(|active| active.handle.same_control(handle));
        if !is_active {
            debug!(handle = handle.id(), "stale end-of-track ignored");
            return;
        }
        if let Some(active) = self.active.take() {
            active.handle.set_indicator(Indicator::Idle);
            info!(path = %active.path, "playback finished");
        }
    }

    /// Polls the output for a natural end of the active track. Returns true
    /// when the active indicator was reset.
    pub fn poll_finished(&mut self) -> bool {
        let Some(handle) = self.active_handle().cloned() else {
            return false;
        };
        if !self.output.finished() {
            return false;
        }
        self.track_ended(&handle);
        true
    }

    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            self.output.stop();
            active.handle.set_indicator(Indicator::Idle);
            info!(path = %active.path, "playback stopped");
        }
    }

    #[must_use]
    pub fn active_handle(&self) -> Option<&PlaybackHandle> {
        self.active.as_ref().map(|active| &active.handle)
    }

    #[must_use]
    pub fn active_path(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.path.as_str())
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }
}
