#![allow(dead_code)]

use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;
use stemdeck_core::{
    GenerateRequest, GenerationError, SeparationError, SeparationResult, SourceFile, Stem,
    StemCollection, StemService, UploadError, UploadFile, UploadReceipt,
};
use tokio::sync::Notify;

/// Scripted collaborator that records every request it receives.
pub struct FakeService {
    pub server_name: String,
    pub restored: Vec<Stem>,
    pub upload_error: Option<UploadError>,
    pub separation: Result<Vec<(String, String)>, SeparationError>,
    pub generations: Mutex<VecDeque<Result<Stem, GenerationError>>>,
    pub separate_gate: Option<Arc<Notify>>,
    pub uploads: Mutex<Vec<String>>,
    pub separations: Mutex<Vec<String>>,
    pub generate_requests: Mutex<Vec<GenerateRequest>>,
}

impl Default for FakeService {
    fn default() -> Self {
        Self {
            server_name: "song_1699.wav".to_string(),
            restored: Vec::new(),
            upload_error: None,
            separation: Ok(vec![
                ("drums.wav".to_string(), "/files/drums.wav".to_string()),
                ("vocals.wav".to_string(), "/files/vocals.wav".to_string()),
            ]),
            generations: Mutex::new(VecDeque::new()),
            separate_gate: None,
            uploads: Mutex::new(Vec::new()),
            separations: Mutex::new(Vec::new()),
            generate_requests: Mutex::new(Vec::new()),
        }
    }
}

impl FakeService {
    pub fn with_generations(
        self,
        replies: impl IntoIterator<Item = Result<Stem, GenerationError>>,
    ) -> Self {
        self.generations.lock().extend(replies);
        self
    }
}

impl StemService for FakeService {
    async fn upload(&self, file: &UploadFile) -> Result<UploadReceipt, UploadError> {
        self.uploads.lock().push(file.name.clone());
        if let Some(error) = &self.upload_error {
            return Err(error.clone());
        }
        Ok(UploadReceipt {
            source: SourceFile {
                server_name: self.server_name.clone(),
                original_name: file.name.clone(),
                file_hash: None,
            },
            restored: self.restored.clone(),
        })
    }

    async fn separate(&self, file_name: &str) -> Result<SeparationResult, SeparationError> {
        self.separations.lock().push(file_name.to_string());
        if let Some(gate) = &self.separate_gate {
            gate.notified().await;
        }
        let tracks = self.separation.clone()?;
        let stems = StemCollection::from_stems(
            tracks
                .into_iter()
                .map(|(label, path)| Stem::new(label, path)),
        )?;
        Ok(SeparationResult {
            stems,
            cached: false,
        })
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Stem, GenerationError> {
        self.generate_requests.lock().push(request.clone());
        self.generations
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(GenerationError::Transport("no scripted reply".to_string())))
    }
}

pub fn wav_upload(name: &str) -> UploadFile {
    UploadFile::new(name, b"RIFF fake audio".to_vec())
}

pub fn write_test_wav(path: &std::path::Path, seconds: f32, amplitude: f32) {
    let sample_rate = 48_000_u32;
    let frame_count = (seconds * sample_rate as f32).round() as usize;
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec).expect("test wav should be creatable");
    for frame in 0..frame_count {
        let phase = frame as f32 / sample_rate as f32 * 220.0 * std::f32::consts::TAU;
        let sample = (phase.sin() * amplitude * f32::from(i16::MAX)).round() as i16;
        writer
            .write_sample(sample)
            .expect("test wav sample write should succeed");
    }
    writer.finalize().expect("test wav finalize should succeed");
}
