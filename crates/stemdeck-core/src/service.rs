//! Contracts with the external upload, separation and generation services,
//! and the wire shapes they exchange.

use std::{future::Future, path::PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{DecodeError, GenerationError, SeparationError, UploadError},
    model::{SourceFile, Stem, UploadFile},
    repository::StemCollection,
    session::GenerateRequest,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub source: SourceFile,
    /// Stems the server already holds for this file, if it recognised it.
    pub restored: Vec<Stem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeparationResult {
    pub stems: StemCollection,
    pub cached: bool,
}

pub trait StemService {
    fn upload(
        &self,
        file: &UploadFile,
    ) -> impl Future<Output = Result<UploadReceipt, UploadError>> + Send;

    fn separate(
        &self,
        file_name: &str,
    ) -> impl Future<Output = Result<SeparationResult, SeparationError>> + Send;

    fn generate(
        &self,
        request: &GenerateRequest,
    ) -> impl Future<Output = Result<Stem, GenerationError>> + Send;
}

/// Fetches the bytes behind a stem's opaque locator.
pub trait AudioSource {
    fn fetch(&self, path: &str) -> impl Future<Output = Result<Vec<u8>, DecodeError>> + Send;
}

/// Reads locators as paths relative to a local directory.
#[derive(Debug, Clone)]
pub struct FsAudioSource {
    root: PathBuf,
}

impl FsAudioSource {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AudioSource for FsAudioSource {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, DecodeError> {
        let full_path = self.root.join(path.trim_start_matches('/'));
        tokio::fs::read(&full_path)
            .await
            .map_err(|error| DecodeError::Fetch {
                path: full_path.display().to_string(),
                message: error.to_string(),
            })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    #[serde(default)]
    server_file_name: Option<String>,
    #[serde(default, rename = "filename")]
    legacy_file_name: Option<String>,
    #[serde(default)]
    restored: bool,
    #[serde(default)]
    stems: Vec<Stem>,
    #[serde(default)]
    file_hash: Option<String>,
    #[serde(default, rename = "file_hash")]
    legacy_file_hash: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeparateRequestBody<'a> {
    pub file_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct SeparateResponse {
    stems: Option<serde_json::Map<String, Value>>,
    #[serde(default)]
    cached: bool,
}

#[derive(Debug, Serialize)]
pub struct GenerateRequestBody<'a> {
    pub stem: &'a Stem,
    pub styles: &'a [String],
}

impl<'a> From<&'a GenerateRequest> for GenerateRequestBody<'a> {
    fn from(request: &'a GenerateRequest) -> Self {
        Self {
            stem: &request.stem,
            styles: &request.styles,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    success: bool,
    generated_stem: Option<Stem>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Pulls a human-readable message out of a non-success body.
#[must_use]
pub fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<ErrorBody>(body).map_or_else(
        |_| String::from_utf8_lossy(body).trim().to_string(),
        |parsed| parsed.error,
    )
}

pub fn parse_upload_response(
    original_name: &str,
    status: u16,
    body: &[u8],
) -> Result<UploadReceipt, UploadError> {
    if !is_success(status) {
        return Err(UploadError::Rejected {
            status,
            message: error_message(body),
        });
    }

    let response: UploadResponse = serde_json::from_slice(body)
        .map_err(|error| UploadError::MalformedResponse(error.to_string()))?;
    let server_name = [response.server_file_name, response.legacy_file_name]
        .into_iter()
        .flatten()
        .find(|name| !name.is_empty())
        .ok_or_else(|| UploadError::MalformedResponse("missing serverFileName".to_string()))?;

    let restored = if response.restored {
        response.stems
    } else {
        Vec::new()
    };

    Ok(UploadReceipt {
        source: SourceFile {
            server_name,
            original_name: original_name.to_string(),
            file_hash: response.file_hash.or(response.legacy_file_hash),
        },
        restored,
    })
}

/// Builds one stem per returned track, in response order.
pub fn parse_separation_response(
    status: u16,
    body: &[u8],
) -> Result<SeparationResult, SeparationError> {
    if !is_success(status) {
        return Err(SeparationError::Rejected {
            status,
            message: error_message(body),
        });
    }

    let response: SeparateResponse = serde_json::from_slice(body)
        .map_err(|error| SeparationError::MalformedResponse(error.to_string()))?;
    let tracks = response.stems.ok_or(SeparationError::MissingStems)?;

    let mut stems = StemCollection::new();
    for (label, path) in tracks {
        let Value::String(path) = path else {
            return Err(SeparationError::MalformedResponse(format!(
                "stem '{label}' has a non-string path"
            )));
        };
        stems.add(Stem::new(label, path))?;
    }

    Ok(SeparationResult {
        stems,
        cached: response.cached,
    })
}

pub fn parse_generation_response(status: u16, body: &[u8]) -> Result<Stem, GenerationError> {
    if !is_success(status) {
        return Err(GenerationError::Rejected {
            status,
            message: error_message(body),
        });
    }

    let response: GenerateResponse = serde_json::from_slice(body)
        .map_err(|error| GenerationError::MalformedResponse(error.to_string()))?;
    if !response.success {
        return Err(GenerationError::Unsuccessful(
            response
                .error
                .unwrap_or_else(|| "service reported success=false".to_string()),
        ));
    }

    response
        .generated_stem
        .ok_or_else(|| GenerationError::MalformedResponse("missing generatedStem".to_string()))
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}
