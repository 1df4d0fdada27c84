use std::{
    collections::{HashMap, VecDeque},
    io::{Cursor, ErrorKind},
    path::Path,
    sync::Arc,
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use symphonia::core::{
    audio::{AudioBufferRef, SampleBuffer},
    codecs::DecoderOptions,
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};
use tracing::{Span, debug, instrument, warn};

use crate::{error::DecodeError, model::Stem, service::AudioSource};

pub const PLACEHOLDER_TEXT: &str = "waveform unavailable";
pub const DEFAULT_CACHE_ENTRIES: usize = 64;

/// Min/max amplitude of one pixel column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WaveColumn {
    pub min: f32,
    pub max: f32,
}

impl WaveColumn {
    pub const SILENT: Self = Self { min: 0.0, max: 0.0 };

    fn from_window(window: &[f32]) -> Self {
        let min = window.iter().copied().fold(f32::INFINITY, f32::min);
        let max = window.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        if min.is_finite() && max.is_finite() {
            Self { min, max }
        } else {
            Self::SILENT
        }
    }

    /// Vertical extent `(top, bottom)` on a surface of the given height.
    #[must_use]
    pub fn segment(self, height: usize) -> (f32, f32) {
        let half = height as f32 / 2.0;
        let from = (1.0 + self.min.clamp(-1.0, 1.0)) * half;
        let to = (1.0 + self.max.clamp(-1.0, 1.0)) * half;
        (from.min(to), from.max(to))
    }
}

/// Reduces `samples` to exactly `width` min/max columns. Column `i` covers
/// `samples[i * step..min((i + 1) * step, len)]` with `step = ceil(len / width)`;
/// windows past the end are empty and render as silence.
#[must_use]
pub fn decimate(samples: &[f32], width: usize) -> Vec<WaveColumn> {
    if width == 0 {
        return Vec::new();
    }

    let len = samples.len();
    let step = len.div_ceil(width);
    (0..width)
        .map(|column| {
            let start = column.saturating_mul(step).min(len);
            let end = (column + 1).saturating_mul(step).min(len);
            WaveColumn::from_window(&samples[start..end])
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Background,
    Trace,
}

/// A drawable target for one stem's waveform.
pub trait WaveformSurface {
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    fn clear(&mut self);
    fn draw_segment(&mut self, x: usize, from: f32, to: f32);
    fn draw_placeholder(&mut self, text: &str);
}

/// In-memory two-tone pixel grid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RasterSurface {
    width: usize,
    height: usize,
    pixels: Vec<Tone>,
    placeholder: Option<String>,
}

impl RasterSurface {
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![Tone::Background; width * height],
            placeholder: None,
        }
    }

    #[must_use]
    pub fn tone(&self, x: usize, y: usize) -> Option<Tone> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(y * self.width + x).copied()
    }

    /// First and last trace rows of column `x`.
    #[must_use]
    pub fn column_extent(&self, x: usize) -> Option<(usize, usize)> {
        let rows: Vec<usize> = (0..self.height)
            .filter(|&y| self.tone(x, y) == Some(Tone::Trace))
            .collect();
        Some((*rows.first()?, *rows.last()?))
    }

    #[must_use]
    pub fn placeholder(&self) -> Option<&str> {
        self.placeholder.as_deref()
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.placeholder.is_none() && self.pixels.iter().all(|tone| *tone == Tone::Background)
    }

    #[must_use]
    pub fn to_text(&self) -> String {
        if let Some(text) = &self.placeholder {
            return format!("[{text}]");
        }

        let mut out = String::with_capacity((self.width + 1) * self.height);
        for row in self.pixels.chunks(self.width.max(1)) {
            out.extend(row.iter().map(|tone| match tone {
                Tone::Background => ' ',
                Tone::Trace => '█',
            }));
            out.push('\n');
        }
        out
    }
}

impl WaveformSurface for RasterSurface {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn clear(&mut self) {
        self.pixels.fill(Tone::Background);
        self.placeholder = None;
    }

    fn draw_segment(&mut self, x: usize, from: f32, to: f32) {
        if x >= self.width || self.height == 0 {
            return;
        }
        let top = (from.max(0.0).floor() as usize).min(self.height - 1);
        let bottom = (to.max(0.0).ceil() as usize).clamp(top + 1, self.height);
        for y in top..bottom {
            self.pixels[y * self.width + x] = Tone::Trace;
        }
    }

    fn draw_placeholder(&mut self, text: &str) {
        self.pixels.fill(Tone::Background);
        self.placeholder = Some(text.to_string());
    }
}

pub fn draw_columns(columns: &[WaveColumn], surface: &mut impl WaveformSurface) {
    let height = surface.height();
    for (x, column) in columns.iter().enumerate() {
        let (from, to) = column.segment(height);
        surface.draw_segment(x, from, to);
    }
}

/// Bytes-to-samples capability. Output is mono in `[-1, 1]`. Runs off the
/// event loop, hence the thread-safety bounds.
pub trait AudioDecoder: Send + Sync + 'static {
    fn decode(&self, bytes: &[u8], extension: Option<&str>) -> Result<Vec<f32>, DecodeError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaDecoder;

impl AudioDecoder for SymphoniaDecoder {
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    fn decode(&self, bytes: &[u8], extension: Option<&str>) -> Result<Vec<f32>, DecodeError> {
        let source =
            MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = extension {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                source,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|error| DecodeError::Unsupported(error.to_string()))?;
        let mut format = probed.format;
        let track = format
            .default_track()
            .ok_or_else(|| DecodeError::Unsupported("no default audio track".to_string()))?;
        let track_id = track.id;
        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|error| DecodeError::Unsupported(error.to_string()))?;

        let mut samples = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(error)) if error.kind() == ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(error) => return Err(DecodeError::Corrupt(error.to_string())),
            };
            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => push_mono_samples(decoded, &mut samples),
                Err(SymphoniaError::DecodeError(error)) => {
                    debug!(error, "skipping undecodable packet");
                }
                Err(error) => return Err(DecodeError::Corrupt(error.to_string())),
            }
        }

        if samples.is_empty() {
            return Err(DecodeError::Empty);
        }
        debug!(frames = samples.len(), "waveform decode complete");
        Ok(samples)
    }
}

fn push_mono_samples(decoded: AudioBufferRef<'_>, samples: &mut Vec<f32>) {
    let spec = *decoded.spec();
    let channel_count = spec.channels.count().max(1);
    let mut sample_buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
    sample_buffer.copy_interleaved_ref(decoded);

    for frame in sample_buffer.samples().chunks(channel_count) {
        let sum: f32 = frame.iter().copied().sum();
        samples.push(sum / channel_count as f32);
    }
}

type CacheKey = (String, usize);

/// Decimated columns keyed by content digest and width, evicted oldest first.
#[derive(Debug, Default)]
struct PeakCache {
    capacity: usize,
    entries: HashMap<CacheKey, Arc<[WaveColumn]>>,
    order: VecDeque<CacheKey>,
}

impl PeakCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    fn get(&self, key: &CacheKey) -> Option<Arc<[WaveColumn]>> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: CacheKey, columns: Arc<[WaveColumn]>) {
        if self.capacity == 0 || self.entries.contains_key(&key) {
            return;
        }
        while self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, columns);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Drawn { columns: usize, cached: bool },
    Placeholder(DecodeError),
}

/// Fetches, decodes, decimates and draws stems. Decoding runs on the
/// blocking pool and each call writes only to the surface it is given, so
/// any number may be in flight at once.
pub struct WaveformRenderer<D = SymphoniaDecoder> {
    decoder: Arc<D>,
    cache: Arc<Mutex<PeakCache>>,
}

impl Default for WaveformRenderer<SymphoniaDecoder> {
    fn default() -> Self {
        Self::new(SymphoniaDecoder, DEFAULT_CACHE_ENTRIES)
    }
}

impl<D: AudioDecoder> WaveformRenderer<D> {
    #[must_use]
    pub fn new(decoder: D, cache_entries: usize) -> Self {
        Self {
            decoder: Arc::new(decoder),
            cache: Arc::new(Mutex::new(PeakCache::new(cache_entries))),
        }
    }

    #[instrument(skip(self, source, surface), fields(path = stem.path(), width = surface.width()))]
    pub async fn render<A, S>(&self, source: &A, stem: &Stem, surface: &mut S) -> RenderOutcome
    where
        A: AudioSource,
        S: WaveformSurface,
    {
        surface.clear();
        let bytes = match source.fetch(stem.path()).await {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(%error, "waveform fetch failed, drawing placeholder");
                surface.draw_placeholder(PLACEHOLDER_TEXT);
                return RenderOutcome::Placeholder(error);
            }
        };

        let extension = extension_of(stem.path()).map(str::to_owned);
        let width = surface.width();
        let decoder = Arc::clone(&self.decoder);
        let cache = Arc::clone(&self.cache);
        let span = Span::current();
        let peaks = tokio::task::spawn_blocking(move || {
            span.in_scope(|| {
                peaks_for(decoder.as_ref(), &cache, &bytes, extension.as_deref(), width)
            })
        })
        .await
        .unwrap_or_else(|error| Err(DecodeError::Interrupted(error.to_string())));
        present(peaks, surface)
    }

    /// Synchronous variant for callers that already hold the bytes and are
    /// not on an event loop.
    pub fn render_bytes<S: WaveformSurface>(
        &self,
        bytes: &[u8],
        extension: Option<&str>,
        surface: &mut S,
    ) -> RenderOutcome {
        surface.clear();
        let width = surface.width();
        let peaks = peaks_for(self.decoder.as_ref(), &self.cache, bytes, extension, width);
        present(peaks, surface)
    }
}

type Peaks = Result<(Arc<[WaveColumn]>, bool), DecodeError>;

fn peaks_for<D: AudioDecoder>(
    decoder: &D,
    cache: &Mutex<PeakCache>,
    bytes: &[u8],
    extension: Option<&str>,
    width: usize,
) -> Peaks {
    let key = (content_digest(bytes), width);
    if let Some(columns) = cache.lock().get(&key) {
        return Ok((columns, true));
    }

    let samples = decoder.decode(bytes, extension)?;
    let columns: Arc<[WaveColumn]> = decimate(&samples, width).into();
    cache.lock().insert(key, Arc::clone(&columns));
    Ok((columns, false))
}

fn present<S: WaveformSurface>(peaks: Peaks, surface: &mut S) -> RenderOutcome {
    match peaks {
        Ok((columns, cached)) => {
            draw_columns(&columns, surface);
            RenderOutcome::Drawn {
                columns: columns.len(),
                cached,
            }
        }
        Err(error) => {
            warn!(%error, "waveform decode failed, drawing placeholder");
            surface.draw_placeholder(PLACEHOLDER_TEXT);
            RenderOutcome::Placeholder(error)
        }
    }
}

fn content_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{digest:x}")
}

fn extension_of(path: &str) -> Option<&str> {
    Path::new(path).extension().and_then(|value| value.to_str())
}
