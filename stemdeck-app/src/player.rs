use std::process::{Child, Command, Stdio};

use stemdeck_core::{AudioOutput, HttpEndpoints, PlaybackError};
use tracing::{debug, info, warn};

/// Plays stems through an external command-line player, one child process
/// per track.
#[derive(Debug)]
pub struct CommandOutput {
    binary: String,
    endpoints: Option<HttpEndpoints>,
    child: Option<Child>,
}

impl CommandOutput {
    /// `endpoints` resolves relative stem locators to URLs; without it
    /// locators are handed to the player unchanged.
    #[must_use]
    pub fn new(binary: impl Into<String>, endpoints: Option<HttpEndpoints>) -> Self {
        Self {
            binary: binary.into(),
            endpoints,
            child: None,
        }
    }

    fn locate(&self, path: &str) -> Result<String, PlaybackError> {
        match &self.endpoints {
            Some(endpoints) => endpoints
                .resolve(path)
                .map(String::from)
                .map_err(|error| PlaybackError::StartFailed {
                    path: path.to_string(),
                    message: error.to_string(),
                }),
            None => Ok(path.to_string()),
        }
    }
}

impl AudioOutput for CommandOutput {
    fn start(&mut self, path: &str) -> Result<(), PlaybackError> {
        self.stop();
        let target = self.locate(path)?;
        let child = Command::new(&self.binary)
            .args(["-nodisp", "-autoexit", "-hide_banner", "-loglevel", "error"])
            .arg(&target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|error| PlaybackError::StartFailed {
                path: path.to_string(),
                message: format!("failed to spawn {}: {error}", self.binary),
            })?;
        info!(pid = child.id(), %target, "player spawned");
        self.child = Some(child);
        Ok(())
    }

    fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if let Err(error) = child.kill() {
            debug!(%error, "player already exited");
        }
        if let Err(error) = child.wait() {
            warn!(%error, "failed to reap player process");
        }
    }

    fn finished(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(%status, "player exited");
                self.child = None;
                true
            }
            Ok(None) => false,
            Err(error) => {
                warn!(%error, "failed to poll player process");
                false
            }
        }
    }
}

impl Drop for CommandOutput {
    fn drop(&mut self) {
        self.stop();
    }
}
