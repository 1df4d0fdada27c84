pub mod assignment;
pub mod diagnostics;
pub mod error;
pub mod http;
pub mod model;
pub mod orchestrator;
pub mod playback;
pub mod repository;
pub mod service;
pub mod session;
pub mod waveform;

pub use assignment::{AssignmentSlot, DragPayload};
pub use diagnostics::{TelemetryGuard, TracingOptions, init_tracing, init_tracing_with_options};
pub use error::{
    DecodeError, GenerationError, PayloadParseError, PlaybackError, SeparationError,
    StemRepositoryError, UploadError, WorkflowError,
};
pub use http::{HttpEndpoints, HttpStemService};
pub use model::{
    SelectedStyles, SourceFile, Stem, StemFilter, StemType, UploadFile, detect_stem_type,
};
pub use orchestrator::{
    Orchestrator, OrchestratorConfig, SignalLevel, StatusSignal, UploadPolicy,
};
pub use playback::{AudioOutput, Indicator, PlaybackController, PlaybackHandle};
pub use repository::{StemCollection, StemView, StemViewItem};
pub use service::{AudioSource, FsAudioSource, SeparationResult, StemService, UploadReceipt};
pub use session::{
    Action, Affordances, GenerateRequest, Session, SessionPolicy, SessionSnapshot, Stage,
};
pub use waveform::{
    AudioDecoder, RasterSurface, RenderOutcome, SymphoniaDecoder, WaveColumn, WaveformRenderer,
    WaveformSurface, decimate,
};
