use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    assignment::AssignmentSlot,
    error::{GenerationError, WorkflowError},
    model::{SelectedStyles, SourceFile, Stem, StemFilter},
    repository::{StemCollection, StemView},
};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Uploaded,
    Separating,
    Separated,
    Generating,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Uploaded => "uploaded",
            Self::Separating => "separating",
            Self::Separated => "separated",
            Self::Generating => "generating",
        })
    }
}

/// The three stages that call out to a collaborator.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Upload,
    Separate,
    Generate,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Upload => "upload",
            Self::Separate => "separate",
            Self::Generate => "generate",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub clear_styles_on_replace: bool,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            clear_styles_on_replace: true,
        }
    }
}

/// Issued when a stage request starts; required to apply its outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct StageTicket {
    action: Action,
    epoch: u64,
    resume: Stage,
}

impl StageTicket {
    #[must_use]
    pub fn action(&self) -> Action {
        self.action
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub stem: Stem,
    pub styles: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Affordances {
    pub upload: bool,
    pub separate: bool,
    pub generate: bool,
    pub replace: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub stage: Stage,
    pub processing: bool,
    pub source: Option<SourceFile>,
    pub stems: StemCollection,
    pub assigned: Option<Stem>,
    pub styles: SelectedStyles,
    pub affordances: Affordances,
}

/// Session state. Mutated only through the transition methods below; stage
/// requests are split into `begin_*` (before the await) and `complete_*` /
/// [`Session::fail`] (in the continuation).
#[derive(Debug, Clone)]
pub struct Session {
    stage: Stage,
    source: Option<SourceFile>,
    stems: StemCollection,
    slot: AssignmentSlot,
    styles: SelectedStyles,
    processing: Option<Action>,
    epoch: u64,
    render_pass: u64,
    policy: SessionPolicy,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionPolicy::default())
    }
}

impl Session {
    #[must_use]
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            stage: Stage::Idle,
            source: None,
            stems: StemCollection::new(),
            slot: AssignmentSlot::default(),
            styles: SelectedStyles::default(),
            processing: None,
            epoch: 0,
            render_pass: 0,
            policy,
        }
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    #[must_use]
    pub fn source(&self) -> Option<&SourceFile> {
        self.source.as_ref()
    }

    #[must_use]
    pub fn stems(&self) -> &StemCollection {
        &self.stems
    }

    #[must_use]
    pub fn assigned(&self) -> Option<&Stem> {
        self.slot.stem()
    }

    #[must_use]
    pub fn styles(&self) -> &SelectedStyles {
        &self.styles
    }

    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.processing.is_some()
    }

    /// Slot occupied and at least one style selected.
    #[must_use]
    pub fn can_generate(&self) -> bool {
        self.slot.is_occupied() && !self.styles.is_empty()
    }

    #[must_use]
    pub fn affordances(&self) -> Affordances {
        let idle = self.processing.is_none();
        Affordances {
            upload: idle && self.stage == Stage::Idle,
            separate: idle && matches!(self.stage, Stage::Uploaded | Stage::Separated),
            generate: idle && self.stage == Stage::Separated && self.can_generate(),
            replace: true,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            stage: self.stage,
            processing: self.is_processing(),
            source: self.source.clone(),
            stems: self.stems.clone(),
            assigned: self.slot.stem().cloned(),
            styles: self.styles.clone(),
            affordances: self.affordances(),
        }
    }

    /// Regenerates the visible list with fresh per-pass identifiers.
    pub fn stem_view(&mut self, filter: StemFilter) -> StemView {
        self.render_pass += 1;
        StemView::build(&self.stems, filter, self.render_pass)
    }

    pub fn toggle_style(&mut self, tag: &str) -> bool {
        let selected = self.styles.toggle(tag);
        debug!(tag, selected, "style toggled");
        selected
    }

    /// Installs a dropped payload. Returns generate-enablement afterwards;
    /// malformed payloads are ignored.
    pub fn drop_payload(&mut self, raw: &str) -> bool {
        if self.slot.on_drop(raw).is_err() {
            debug!("drop ignored");
        }
        self.can_generate()
    }

    pub fn assign(&mut self, stem: Stem) -> bool {
        self.slot.assign(stem);
        self.can_generate()
    }

    pub fn remove_assignment(&mut self) -> bool {
        self.slot.clear();
        self.can_generate()
    }

    /// Clears everything and returns to `Idle`. Outstanding requests are
    /// orphaned: their tickets no longer match the session epoch.
    pub fn replace(&mut self) {
        self.epoch += 1;
        self.stage = Stage::Idle;
        self.processing = None;
        self.source = None;
        self.stems.clear();
        self.slot.clear();
        if self.policy.clear_styles_on_replace {
            self.styles.clear();
        }
        info!(epoch = self.epoch, "session replaced");
    }

    pub fn begin_upload(&mut self) -> Result<StageTicket, WorkflowError> {
        self.begin(Action::Upload, &[Stage::Idle], Stage::Idle)
    }

    /// Applies a successful upload. Restored stems (server already knew the
    /// file) skip straight to `Separated`.
    pub fn complete_upload(
        &mut self,
        ticket: StageTicket,
        source: SourceFile,
        restored: Vec<Stem>,
    ) -> Result<Stage, WorkflowError> {
        self.check_ticket(&ticket)?;
        self.processing = None;
        self.source = Some(source);
        if restored.is_empty() {
            self.stage = Stage::Uploaded;
        } else {
            self.stems = StemCollection::deduplicated(restored);
            self.stage = Stage::Separated;
        }
        info!(stage = %self.stage, stems = self.stems.len(), "upload applied");
        Ok(self.stage)
    }

    /// Starts a separation; returns the ticket and the server-assigned name
    /// to send.
    pub fn begin_separate(&mut self) -> Result<(StageTicket, String), WorkflowError> {
        let Some(server_name) = self.source.as_ref().map(|source| source.server_name.clone())
        else {
            return Err(WorkflowError::InvalidTransition {
                action: Action::Separate,
                stage: self.stage,
            });
        };
        let ticket = self.begin(
            Action::Separate,
            &[Stage::Uploaded, Stage::Separated],
            Stage::Separating,
        )?;
        Ok((ticket, server_name))
    }

    /// Replaces the collection wholesale with a fresh separation.
    pub fn complete_separate(
        &mut self,
        ticket: StageTicket,
        stems: StemCollection,
    ) -> Result<Stage, WorkflowError> {
        self.check_ticket(&ticket)?;
        self.processing = None;
        self.stems = stems;
        self.stage = Stage::Separated;
        info!(stems = self.stems.len(), "separation applied");
        Ok(self.stage)
    }

    pub fn begin_generate(&mut self) -> Result<(StageTicket, GenerateRequest), WorkflowError> {
        if let Some(action) = self.processing {
            return Err(WorkflowError::Busy(action));
        }
        let Some(stem) = self.slot.stem().cloned() else {
            return Err(WorkflowError::GenerateDisabled);
        };
        if self.styles.is_empty() {
            return Err(WorkflowError::GenerateDisabled);
        }
        let ticket = self.begin(Action::Generate, &[Stage::Separated], Stage::Generating)?;
        let request = GenerateRequest {
            stem,
            styles: self.styles.as_slice().to_vec(),
        };
        Ok((ticket, request))
    }

    /// Appends the generated stem. A path collision is reported as a
    /// generation failure and leaves the collection untouched.
    pub fn complete_generate(
        &mut self,
        ticket: StageTicket,
        stem: Stem,
    ) -> Result<Stem, WorkflowError> {
        self.check_ticket(&ticket)?;
        self.processing = None;
        self.stage = Stage::Separated;
        self.stems
            .add(stem.clone())
            .map_err(|error| WorkflowError::Generation(GenerationError::from(error)))?;
        info!(name = stem.name(), stems = self.stems.len(), "generated stem applied");
        Ok(stem)
    }

    /// Reverts a failed request to the stage it started from. Returns false
    /// if the ticket was orphaned by a replace.
    pub fn fail(&mut self, ticket: StageTicket) -> bool {
        if self.check_ticket(&ticket).is_err() {
            return false;
        }
        self.processing = None;
        self.stage = ticket.resume;
        warn!(action = %ticket.action, stage = %self.stage, "stage request failed");
        true
    }

    fn begin(
        &mut self,
        action: Action,
        allowed: &[Stage],
        next: Stage,
    ) -> Result<StageTicket, WorkflowError> {
        if let Some(active) = self.processing {
            return Err(if active == action {
                WorkflowError::Busy(action)
            } else {
                WorkflowError::InvalidTransition {
                    action,
                    stage: self.stage,
                }
            });
        }
        if !allowed.contains(&self.stage) {
            return Err(WorkflowError::InvalidTransition {
                action,
                stage: self.stage,
            });
        }

        let ticket = StageTicket {
            action,
            epoch: self.epoch,
            resume: self.stage,
        };
        self.processing = Some(action);
        self.stage = next;
        debug!(%action, stage = %self.stage, "stage request started");
        Ok(ticket)
    }

    fn check_ticket(&self, ticket: &StageTicket) -> Result<(), WorkflowError> {
        if ticket.epoch != self.epoch || self.processing != Some(ticket.action) {
            debug!(action = %ticket.action, "stale completion discarded");
            return Err(WorkflowError::Superseded(ticket.action));
        }
        Ok(())
    }
}
