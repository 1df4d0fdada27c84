use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::{
    error::{UploadError, WorkflowError},
    model::{Stem, StemFilter, UploadFile},
    repository::StemView,
    service::StemService,
    session::{Action, Affordances, Session, SessionPolicy, SessionSnapshot, Stage, StageTicket},
};

const SIGNAL_CAPACITY: usize = 64;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

/// Local checks applied before any bytes leave the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    pub allowed_extensions: Vec<String>,
    pub max_bytes: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            allowed_extensions: vec!["mp3".to_string(), "wav".to_string()],
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl UploadPolicy {
    pub fn check(&self, file: &UploadFile) -> Result<(), UploadError> {
        let extension = file.extension();
        let allowed = extension.as_deref().is_some_and(|extension| {
            self.allowed_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(extension))
        });
        if !allowed {
            return Err(UploadError::UnsupportedFormat { extension });
        }
        if file.bytes.is_empty() {
            return Err(UploadError::EmptyPayload);
        }
        if file.bytes.len() > self.max_bytes {
            return Err(UploadError::TooLarge {
                size: file.bytes.len(),
                limit: self.max_bytes,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub session: SessionPolicy,
    pub upload: UploadPolicy,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SignalLevel {
    Info,
    Success,
    Error,
}

/// User-facing notification. How it is shown is up to the host.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusSignal {
    pub level: SignalLevel,
    pub action: Option<Action>,
    pub message: String,
}

/// Drives upload → separate → generate against a [`StemService`] and owns
/// the session. Methods take `&self` so playback, tag selection and drops
/// stay live while a request is outstanding; the session lock is never held
/// across an await.
pub struct Orchestrator<S> {
    service: S,
    session: Mutex<Session>,
    upload_policy: UploadPolicy,
    signals: broadcast::Sender<StatusSignal>,
}

impl<S: StemService> Orchestrator<S> {
    #[must_use]
    pub fn new(service: S, config: OrchestratorConfig) -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self {
            service,
            session: Mutex::new(Session::new(config.session)),
            upload_policy: config.upload,
            signals,
        }
    }

    #[must_use]
    pub fn service(&self) -> &S {
        &self.service
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StatusSignal> {
        self.signals.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().snapshot()
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.session.lock().stage()
    }

    #[must_use]
    pub fn can_generate(&self) -> bool {
        self.session.lock().can_generate()
    }

    #[must_use]
    pub fn affordances(&self) -> Affordances {
        self.session.lock().affordances()
    }

    pub fn stem_view(&self, filter: StemFilter) -> StemView {
        self.session.lock().stem_view(filter)
    }

    pub fn toggle_style(&self, tag: &str) -> bool {
        self.session.lock().toggle_style(tag)
    }

    /// Handles a drop on the assignment slot; returns generate-enablement.
    pub fn drop_payload(&self, raw: &str) -> bool {
        self.session.lock().drop_payload(raw)
    }

    pub fn remove_assignment(&self) -> bool {
        self.session.lock().remove_assignment()
    }

    pub fn replace(&self) {
        self.session.lock().replace();
        self.emit(SignalLevel::Info, None, "source cleared".to_string());
    }

    #[instrument(skip(self, file), fields(name = %file.name, len = file.bytes.len()))]
    pub async fn upload(&self, file: UploadFile) -> Result<Stage, WorkflowError> {
        let ticket = self.session.lock().begin_upload()?;
        if let Err(error) = self.upload_policy.check(&file) {
            return Err(self.fail_stage(ticket, error.into()));
        }

        self.emit(
            SignalLevel::Info,
            Some(Action::Upload),
            format!("uploading {}", file.name),
        );
        match self.service.upload(&file).await {
            Ok(receipt) => {
                let restored = !receipt.restored.is_empty();
                let result =
                    self.session
                        .lock()
                        .complete_upload(ticket, receipt.source, receipt.restored);
                self.report(Action::Upload, result, |stage| {
                    if restored {
                        format!("{} recognised, stems restored", file.name)
                    } else {
                        format!("{} uploaded ({stage})", file.name)
                    }
                })
            }
            Err(error) => Err(self.fail_stage(ticket, error.into())),
        }
    }

    #[instrument(skip(self))]
    pub async fn separate(&self) -> Result<Stage, WorkflowError> {
        let (ticket, server_name) = self.session.lock().begin_separate()?;
        self.emit(
            SignalLevel::Info,
            Some(Action::Separate),
            format!("separating {server_name}; this may take a few minutes"),
        );

        match self.service.separate(&server_name).await {
            Ok(separation) => {
                let cached = separation.cached;
                let count = separation.stems.len();
                let result = self
                    .session
                    .lock()
                    .complete_separate(ticket, separation.stems);
                self.report(Action::Separate, result, |_| {
                    if cached {
                        format!("{count} stems recovered from cache")
                    } else {
                        format!("{count} stems separated")
                    }
                })
            }
            Err(error) => Err(self.fail_stage(ticket, error.into())),
        }
    }

    #[instrument(skip(self))]
    pub async fn generate(&self) -> Result<Stem, WorkflowError> {
        let (ticket, request) = self.session.lock().begin_generate()?;
        self.emit(
            SignalLevel::Info,
            Some(Action::Generate),
            format!(
                "generating from {} with {}",
                request.stem.name(),
                request.styles.join(", ")
            ),
        );

        match self.service.generate(&request).await {
            Ok(stem) => {
                let result = self.session.lock().complete_generate(ticket, stem);
                self.report(Action::Generate, result, |stem| {
                    format!("generated {}", stem.name())
                })
            }
            Err(error) => Err(self.fail_stage(ticket, error.into())),
        }
    }

    fn fail_stage(&self, ticket: StageTicket, error: WorkflowError) -> WorkflowError {
        let action = ticket.action();
        if !self.session.lock().fail(ticket) {
            return WorkflowError::Superseded(action);
        }
        warn!(%action, %error, "stage failed");
        self.emit(SignalLevel::Error, Some(action), error.to_string());
        error
    }

    fn report<T>(
        &self,
        action: Action,
        result: Result<T, WorkflowError>,
        message: impl FnOnce(&T) -> String,
    ) -> Result<T, WorkflowError> {
        match &result {
            Ok(value) => self.emit(SignalLevel::Success, Some(action), message(value)),
            Err(WorkflowError::Superseded(_)) => {
                debug!(%action, "result dropped after replace");
            }
            Err(error) => self.emit(SignalLevel::Error, Some(action), error.to_string()),
        }
        result
    }

    fn emit(&self, level: SignalLevel, action: Option<Action>, message: String) {
        info!(?level, ?action, %message, "status signal");
        // Errors only when nobody is subscribed.
        let _ = self.signals.send(StatusSignal {
            level,
            action,
            message,
        });
    }
}
