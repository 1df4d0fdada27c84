use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    assignment::DragPayload,
    error::StemRepositoryError,
    model::{Stem, StemFilter},
};

/// Ordered stems in arrival order. Paths are unique; filtering never
/// reorders or prunes the underlying sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StemCollection {
    stems: Vec<Stem>,
}

impl StemCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a collection, rejecting the first duplicated path.
    pub fn from_stems(stems: impl IntoIterator<Item = Stem>) -> Result<Self, StemRepositoryError> {
        let mut collection = Self::new();
        for stem in stems {
            collection.add(stem)?;
        }
        Ok(collection)
    }

    /// Builds a collection, skipping stems whose path is already present.
    #[must_use]
    pub fn deduplicated(stems: impl IntoIterator<Item = Stem>) -> Self {
        let mut collection = Self::new();
        for stem in stems {
            if let Err(error) = collection.add(stem) {
                warn!(%error, "duplicate stem ignored");
            }
        }
        collection
    }

    pub fn add(&mut self, stem: Stem) -> Result<(), StemRepositoryError> {
        if self.contains_path(stem.path()) {
            return Err(StemRepositoryError::DuplicatePath(stem.path().to_string()));
        }
        debug!(name = stem.name(), kind = %stem.kind(), "stem added");
        self.stems.push(stem);
        Ok(())
    }

    #[must_use]
    pub fn all(&self) -> &[Stem] {
        &self.stems
    }

    #[must_use]
    pub fn filter(&self, filter: StemFilter) -> Vec<&Stem> {
        self.stems
            .iter()
            .filter(|stem| filter.matches(stem))
            .collect()
    }

    #[must_use]
    pub fn contains_path(&self, path: &str) -> bool {
        self.stems.iter().any(|stem| stem.path() == path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stems.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }

    pub fn clear(&mut self) {
        self.stems.clear();
    }
}

/// One rendered row of the stem list. `id` is assigned once per render pass
/// and is what play/drag/waveform bindings attach to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StemViewItem {
    pub id: String,
    pub stem: Stem,
    pub drag_payload: DragPayload,
}

/// A regenerated, filtered view of the collection. Consumers drop all
/// bindings from the previous pass and re-attach to these items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StemView {
    pub pass: u64,
    pub filter: String,
    pub items: Vec<StemViewItem>,
}

impl StemView {
    #[must_use]
    pub fn build(collection: &StemCollection, filter: StemFilter, pass: u64) -> Self {
        let items = collection
            .filter(filter)
            .into_iter()
            .enumerate()
            .map(|(index, stem)| StemViewItem {
                id: format!("stem-{pass}-{index}"),
                stem: stem.clone(),
                drag_payload: DragPayload::from_stem(stem),
            })
            .collect();

        Self {
            pass,
            filter: filter.to_string(),
            items,
        }
    }

    #[must_use]
    pub fn item(&self, id: &str) -> Option<&StemViewItem> {
        self.items.iter().find(|item| item.id == id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StemType;

    fn sample_collection() -> StemCollection {
        StemCollection::from_stems([
            Stem::new("drums.wav", "/files/drums.wav"),
            Stem::new("vocals.wav", "/files/vocals.wav"),
            Stem::new("bass.wav", "/files/bass.wav"),
            Stem::new("gen_drums_rock.wav", "/files/gen_drums_rock.wav"),
        ])
        .expect("fixture paths are unique")
    }

    #[test]
    fn filter_keeps_arrival_order_without_mutating() {
        let collection = sample_collection();
        let drums: Vec<&str> = collection
            .filter(StemFilter::Only(StemType::Drums))
            .into_iter()
            .map(Stem::name)
            .collect();
        assert_eq!(drums, ["drums.wav", "gen_drums_rock.wav"]);
        assert_eq!(collection.len(), 4);
        assert!(
            collection
                .filter(StemFilter::Only(StemType::Other))
                .is_empty()
        );
    }

    #[test]
    fn duplicate_paths_are_rejected() {
        let mut collection = sample_collection();
        let error = collection
            .add(Stem::new("drums copy", "/files/drums.wav"))
            .expect_err("duplicate path must be rejected");
        assert_eq!(
            error,
            StemRepositoryError::DuplicatePath("/files/drums.wav".to_string())
        );
        assert_eq!(collection.len(), 4);
    }

    #[test]
    fn deduplicated_keeps_first_occurrence() {
        let collection = StemCollection::deduplicated([
            Stem::new("vocals", "/a.wav"),
            Stem::new("drums", "/a.wav"),
            Stem::new("bass", "/b.wav"),
        ]);
        let names: Vec<&str> = collection.all().iter().map(Stem::name).collect();
        assert_eq!(names, ["vocals", "bass"]);
    }

    #[test]
    fn view_ids_are_stable_within_a_pass() {
        let collection = sample_collection();
        let view = StemView::build(&collection, StemFilter::Only(StemType::Drums), 7);
        let ids: Vec<&str> = view.items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, ["stem-7-0", "stem-7-1"]);
        assert_eq!(
            view.item("stem-7-1").map(|item| item.stem.name()),
            Some("gen_drums_rock.wav")
        );
        assert_eq!(view.filter, "drums");
    }
}
