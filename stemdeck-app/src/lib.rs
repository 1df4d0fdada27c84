pub mod config;
pub mod player;

use std::{collections::HashMap, path::Path};

use parking_lot::Mutex;
use serde::Serialize;
use stemdeck_core::{
    AudioOutput, AudioSource, Indicator, Orchestrator, PlaybackController, PlaybackHandle,
    RasterSurface, RenderOutcome, SessionSnapshot, Stem, StemFilter, StemService, StemType,
    StemView, SymphoniaDecoder, UploadFile, WaveformRenderer,
};
use tracing::{debug, instrument};

use crate::config::AppConfig;

/// Host-side state behind the command functions: the orchestrator plus the
/// pieces that only exist in a presentation layer.
pub struct AppState<S, O> {
    orchestrator: Orchestrator<S>,
    playback: Mutex<PlaybackController<O>>,
    renderer: WaveformRenderer,
    // Keyed by stem path so a playing indicator survives list regeneration.
    handles: Mutex<HashMap<String, PlaybackHandle>>,
    view: Mutex<Option<StemView>>,
    style_catalog: Vec<String>,
    waveform_size: (usize, usize),
}

impl<S: StemService + AudioSource, O: AudioOutput> AppState<S, O> {
    #[must_use]
    pub fn new(service: S, output: O, config: &AppConfig) -> Self {
        Self {
            orchestrator: Orchestrator::new(service, config.orchestrator_config()),
            playback: Mutex::new(PlaybackController::new(output)),
            renderer: WaveformRenderer::new(SymphoniaDecoder, config.waveform.cache_entries),
            handles: Mutex::new(HashMap::new()),
            view: Mutex::new(None),
            style_catalog: config.session.style_catalog.clone(),
            waveform_size: (config.waveform.width, config.waveform.height),
        }
    }

    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator<S> {
        &self.orchestrator
    }

    fn handle_for(&self, path: &str) -> PlaybackHandle {
        self.handles
            .lock()
            .entry(path.to_string())
            .or_insert_with(|| PlaybackHandle::new(path))
            .clone()
    }

    /// Drops handles whose stem left the collection.
    fn prune_handles(&self) {
        let snapshot = self.orchestrator.snapshot();
        let mut handles = self.handles.lock();
        let before = handles.len();
        handles.retain(|path, _| snapshot.stems.all().iter().any(|stem| stem.path() == path));
        debug!(pruned = before - handles.len(), "playback handles pruned");
    }

    fn view_item(&self, item_id: &str) -> Result<Stem, String> {
        self.view
            .lock()
            .as_ref()
            .and_then(|view| view.item(item_id))
            .map(|item| item.stem.clone())
            .ok_or_else(|| format!("unknown stem item '{item_id}'; list stems first"))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StemListing {
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: StemType,
    pub drag_payload: String,
    pub indicator: Indicator,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StyleToggle {
    pub tag: String,
    pub selected: bool,
    pub can_generate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveformText {
    pub id: String,
    pub placeholder: bool,
    pub text: String,
}

#[instrument(skip(state))]
pub fn get_session<S, O>(state: &AppState<S, O>) -> SessionSnapshot
where
    S: StemService + AudioSource,
    O: AudioOutput,
{
    state.orchestrator.snapshot()
}

#[must_use]
pub fn style_catalog<S, O>(state: &AppState<S, O>) -> Vec<String> {
    state.style_catalog.clone()
}

#[instrument(skip(state), fields(path = %path.display()))]
pub async fn upload_file<S, O>(
    state: &AppState<S, O>,
    path: &Path,
) -> Result<SessionSnapshot, String>
where
    S: StemService + AudioSource,
    O: AudioOutput,
{
    let file = UploadFile::from_path(path)
        .await
        .map_err(|error| format!("failed to read {}: {error}", path.display()))?;
    state
        .orchestrator
        .upload(file)
        .await
        .map_err(|error| error.to_string())?;
    Ok(state.orchestrator.snapshot())
}

#[instrument(skip(state))]
pub async fn separate<S, O>(state: &AppState<S, O>) -> Result<SessionSnapshot, String>
where
    S: StemService + AudioSource,
    O: AudioOutput,
{
    state
        .orchestrator
        .separate()
        .await
        .map_err(|error| error.to_string())?;
    state.prune_handles();
    Ok(state.orchestrator.snapshot())
}

#[instrument(skip(state))]
pub async fn generate<S, O>(state: &AppState<S, O>) -> Result<Stem, String>
where
    S: StemService + AudioSource,
    O: AudioOutput,
{
    state
        .orchestrator
        .generate()
        .await
        .map_err(|error| error.to_string())
}

/// Discards the session and stops anything audible.
#[instrument(skip(state))]
pub fn replace_source<S, O>(state: &AppState<S, O>) -> SessionSnapshot
where
    S: StemService + AudioSource,
    O: AudioOutput,
{
    state.playback.lock().stop();
    state.handles.lock().clear();
    *state.view.lock() = None;
    state.orchestrator.replace();
    state.orchestrator.snapshot()
}

#[instrument(skip(state))]
pub fn toggle_style<S, O>(state: &AppState<S, O>, tag: &str) -> StyleToggle
where
    S: StemService + AudioSource,
    O: AudioOutput,
{
    let selected = state.orchestrator.toggle_style(tag);
    StyleToggle {
        tag: tag.to_string(),
        selected,
        can_generate: state.orchestrator.can_generate(),
    }
}

#[instrument(skip(state, payload))]
pub fn drop_stem<S, O>(state: &AppState<S, O>, payload: &str) -> SessionSnapshot
where
    S: StemService + AudioSource,
    O: AudioOutput,
{
    state.orchestrator.drop_payload(payload);
    state.orchestrator.snapshot()
}

/// Drags a listed item onto the assignment slot via its serialized payload.
#[instrument(skip(state))]
pub fn drop_listed_stem<S, O>(
    state: &AppState<S, O>,
    item_id: &str,
) -> Result<SessionSnapshot, String>
where
    S: StemService + AudioSource,
    O: AudioOutput,
{
    let payload = state
        .view
        .lock()
        .as_ref()
        .and_then(|view| view.item(item_id))
        .map(|item| item.drag_payload.as_str().to_string())
        .ok_or_else(|| format!("unknown stem item '{item_id}'; list stems first"))?;
    Ok(drop_stem(state, &payload))
}

#[instrument(skip(state))]
pub fn remove_dropped_stem<S, O>(state: &AppState<S, O>) -> SessionSnapshot
where
    S: StemService + AudioSource,
    O: AudioOutput,
{
    state.orchestrator.remove_assignment();
    state.orchestrator.snapshot()
}

/// Regenerates the visible list. Item ids are only valid until the next call.
#[instrument(skip(state))]
pub fn list_stems<S, O>(state: &AppState<S, O>, filter: &str) -> Result<Vec<StemListing>, String>
where
    S: StemService + AudioSource,
    O: AudioOutput,
{
    let filter: StemFilter = filter.parse()?;
    let view = state.orchestrator.stem_view(filter);
    let listings = view
        .items
        .iter()
        .map(|item| StemListing {
            id: item.id.clone(),
            name: item.stem.name().to_string(),
            path: item.stem.path().to_string(),
            kind: item.stem.kind(),
            drag_payload: item.drag_payload.as_str().to_string(),
            indicator: state.handle_for(item.stem.path()).indicator(),
        })
        .collect();
    debug!(pass = view.pass, items = view.items.len(), "stem list regenerated");
    *state.view.lock() = Some(view);
    Ok(listings)
}

#[instrument(skip(state))]
pub fn play_stem<S, O>(state: &AppState<S, O>, item_id: &str) -> Result<Indicator, String>
where
    S: StemService + AudioSource,
    O: AudioOutput,
{
    let stem = state.view_item(item_id)?;
    let handle = state.handle_for(stem.path());
    Ok(state.playback.lock().play(stem.path(), &handle))
}

/// Returns the path whose playback just ended, if any.
pub fn poll_playback<S, O>(state: &AppState<S, O>) -> Option<String>
where
    S: StemService + AudioSource,
    O: AudioOutput,
{
    let mut playback = state.playback.lock();
    let path = playback.active_path().map(str::to_string)?;
    playback.poll_finished().then_some(path)
}

#[instrument(skip(state))]
pub async fn render_waveform<S, O>(
    state: &AppState<S, O>,
    item_id: &str,
) -> Result<WaveformText, String>
where
    S: StemService + AudioSource,
    O: AudioOutput,
{
    let stem = state.view_item(item_id)?;
    let (width, height) = state.waveform_size;
    let mut surface = RasterSurface::new(width, height);
    let outcome = state
        .renderer
        .render(state.orchestrator.service(), &stem, &mut surface)
        .await;
    Ok(WaveformText {
        id: item_id.to_string(),
        placeholder: matches!(outcome, RenderOutcome::Placeholder(_)),
        text: surface.to_text(),
    })
}
