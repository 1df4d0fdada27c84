use serde::Serialize;
use tracing::{debug, warn};

use crate::{error::PayloadParseError, model::Stem};

/// Drag data carried by a rendered stem: the full stem snapshot as JSON, so a
/// drop stays valid after the source row is re-rendered or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DragPayload(String);

impl DragPayload {
    #[must_use]
    pub fn from_stem(stem: &Stem) -> Self {
        let snapshot = serde_json::json!({
            "name": stem.name(),
            "path": stem.path(),
            "type": stem.kind().as_str(),
        });
        Self(snapshot.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parse(raw: &str) -> Result<Stem, PayloadParseError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Single-occupant holder for the stem staged for generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentSlot {
    stem: Option<Stem>,
}

impl AssignmentSlot {
    /// Installs `stem`, returning the previous occupant.
    pub fn assign(&mut self, stem: Stem) -> Option<Stem> {
        debug!(name = stem.name(), "stem assigned");
        self.stem.replace(stem)
    }

    /// Parses a drop payload into the slot. A malformed payload leaves the
    /// slot untouched.
    pub fn on_drop(&mut self, raw: &str) -> Result<&Stem, PayloadParseError> {
        let stem = DragPayload::parse(raw).inspect_err(|error| {
            warn!(%error, "ignoring malformed drop payload");
        })?;
        debug!(name = stem.name(), "stem dropped into slot");
        Ok(&*self.stem.insert(stem))
    }

    pub fn clear(&mut self) -> Option<Stem> {
        self.stem.take()
    }

    #[must_use]
    pub fn stem(&self) -> Option<&Stem> {
        self.stem.as_ref()
    }

    #[must_use]
    pub fn is_occupied(&self) -> bool {
        self.stem.is_some()
    }
}
