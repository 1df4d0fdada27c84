use std::time::Duration;

use reqwest::{Client, Url, multipart};
use tracing::{debug, info, instrument};

use crate::{
    error::{DecodeError, GenerationError, SeparationError, UploadError},
    model::{Stem, UploadFile},
    service::{
        AudioSource, GenerateRequestBody, SeparateRequestBody, SeparationResult, StemService,
        UploadReceipt, parse_generation_response, parse_separation_response,
        parse_upload_response,
    },
    session::GenerateRequest,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpEndpoints {
    pub base_url: Url,
    pub upload_path: String,
    pub separate_path: String,
    pub generate_path: String,
}

impl HttpEndpoints {
    pub fn new(base_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            upload_path: "/upload".to_string(),
            separate_path: "/separate".to_string(),
            generate_path: "/generate".to_string(),
        })
    }

    /// Resolves an endpoint or stem locator against the base URL. Absolute
    /// URLs pass through unchanged.
    pub fn resolve(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path)
    }
}

/// Talks to the separation/generation server over HTTP and streams stem
/// audio from it.
#[derive(Debug, Clone)]
pub struct HttpStemService {
    client: Client,
    endpoints: HttpEndpoints,
}

impl HttpStemService {
    pub fn new(
        endpoints: HttpEndpoints,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client, endpoints })
    }

    #[must_use]
    pub fn endpoints(&self) -> &HttpEndpoints {
        &self.endpoints
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<(u16, Vec<u8>), String> {
        let response = request.send().await.map_err(|error| error.to_string())?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|error| error.to_string())?;
        debug!(status, len = body.len(), "response received");
        Ok((status, body.to_vec()))
    }
}

impl StemService for HttpStemService {
    #[instrument(skip(self, file), fields(name = %file.name, len = file.bytes.len()))]
    async fn upload(&self, file: &UploadFile) -> Result<UploadReceipt, UploadError> {
        let url = self
            .endpoints
            .resolve(&self.endpoints.upload_path)
            .map_err(|error| UploadError::Transport(error.to_string()))?;
        let part = multipart::Part::bytes(file.bytes.clone()).file_name(file.name.clone());
        let form = multipart::Form::new().part("file", part);

        let (status, body) = self
            .send(self.client.post(url).multipart(form))
            .await
            .map_err(UploadError::Transport)?;
        let receipt = parse_upload_response(&file.name, status, &body)?;
        info!(server_name = %receipt.source.server_name, "upload accepted");
        Ok(receipt)
    }

    #[instrument(skip(self))]
    async fn separate(&self, file_name: &str) -> Result<SeparationResult, SeparationError> {
        let url = self
            .endpoints
            .resolve(&self.endpoints.separate_path)
            .map_err(|error| SeparationError::Transport(error.to_string()))?;
        let (status, body) = self
            .send(self.client.post(url).json(&SeparateRequestBody { file_name }))
            .await
            .map_err(SeparationError::Transport)?;
        let result = parse_separation_response(status, &body)?;
        info!(stems = result.stems.len(), cached = result.cached, "separation returned");
        Ok(result)
    }

    #[instrument(skip(self, request), fields(stem = request.stem.name(), styles = ?request.styles))]
    async fn generate(&self, request: &GenerateRequest) -> Result<Stem, GenerationError> {
        let url = self
            .endpoints
            .resolve(&self.endpoints.generate_path)
            .map_err(|error| GenerationError::Transport(error.to_string()))?;
        let (status, body) = self
            .send(
                self.client
                    .post(url)
                    .json(&GenerateRequestBody::from(request)),
            )
            .await
            .map_err(GenerationError::Transport)?;
        let stem = parse_generation_response(status, &body)?;
        info!(name = stem.name(), "generation returned");
        Ok(stem)
    }
}

impl AudioSource for HttpStemService {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, DecodeError> {
        let fetch_error = |message: String| DecodeError::Fetch {
            path: path.to_string(),
            message,
        };
        let url = self
            .endpoints
            .resolve(path)
            .map_err(|error| fetch_error(error.to_string()))?;
        let (status, body) = self.send(self.client.get(url)).await.map_err(fetch_error)?;
        if !(200..300).contains(&status) {
            return Err(fetch_error(format!("status {status}")));
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_locators_resolve_against_base() {
        let endpoints = HttpEndpoints::new("http://localhost:3838/").expect("valid base url");
        assert_eq!(
            endpoints
                .resolve("outputs_remix/htdemucs/song/drums.wav")
                .expect("relative path joins")
                .as_str(),
            "http://localhost:3838/outputs_remix/htdemucs/song/drums.wav"
        );
        assert_eq!(
            endpoints
                .resolve(&endpoints.separate_path)
                .expect("endpoint joins")
                .as_str(),
            "http://localhost:3838/separate"
        );
        assert_eq!(
            endpoints
                .resolve("https://cdn.example.com/a.wav")
                .expect("absolute url passes through")
                .as_str(),
            "https://cdn.example.com/a.wav"
        );
    }

    #[test]
    fn client_builds_with_timeout() {
        let endpoints = HttpEndpoints::new("http://127.0.0.1:9/").expect("valid base url");
        let service = HttpStemService::new(endpoints, Duration::from_secs(5), "stemdeck-test")
            .expect("client should build");
        assert_eq!(service.endpoints().upload_path, "/upload");
    }
}
