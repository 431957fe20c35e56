//! Transcription HTTP client for the whisper-asr-webservice API.
//!
//! One call posts one audio file as a multipart form and parses the
//! response. Errors carry enough structure for the retry wrapper to
//! classify them.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

use crate::cancel::CancelToken;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Response format requested from the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Text => "text",
            OutputFormat::Json => "json",
        }
    }
}

/// Per-request transcription parameters.
#[derive(Debug, Clone, Default)]
pub struct TranscribeOptions {
    /// Language hint; empty or the literal `auto` means let the service
    /// detect it.
    pub language: String,

    /// Model hint, informational only.
    pub model: String,
}

/// Parsed API response.
#[derive(Debug, Clone)]
pub struct TranscriptionResult {
    pub text: String,
    pub language: Option<String>,
    pub duration: Option<f64>,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("API error: status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Network(reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("cancelled")]
    Cancelled,

    #[error("invalid API URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("open audio file: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse response: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ClientError {
    /// Whether the retry wrapper may try again. Transport-level failures
    /// and 5xx responses are retryable; cancellation, timeouts, 4xx and
    /// anything unclassified are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Network(_) => true,
            ClientError::Status { status, .. } => (500..600).contains(status),
            _ => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AsrResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

/// Client for a whisper-asr-webservice endpoint.
pub struct WhisperClient {
    base_url: String,
    http: reqwest::Client,
    output: OutputFormat,
}

impl WhisperClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("default TLS backend available"),
            output: OutputFormat::Json,
        }
    }

    pub fn with_output_format(mut self, output: OutputFormat) -> Self {
        self.output = output;
        self
    }

    /// POST one audio file and return the transcription.
    pub async fn transcribe(
        &self,
        mut cancel: CancelToken,
        audio_path: &Path,
        opts: &TranscribeOptions,
    ) -> Result<TranscriptionResult, ClientError> {
        let url = build_url(&self.base_url, self.output, opts)?;

        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        let bytes = tokio::fs::read(audio_path).await?;

        let part = Part::bytes(bytes).file_name(file_name);
        let form = Form::new().part("audio_file", part);

        let request = self
            .http
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .multipart(form);

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            res = request.send() => res.map_err(classify_reqwest)?,
        };

        let status = response.status();
        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            body = response.text() => body.map_err(classify_reqwest)?,
        };

        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_response(self.output, &body)
    }
}

fn classify_reqwest(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout
    } else {
        ClientError::Network(err)
    }
}

/// Build the request URL: path rewritten to `/asr` when the base has no
/// path, `output` always present, `language` only when meaningful.
fn build_url(
    base_url: &str,
    output: OutputFormat,
    opts: &TranscribeOptions,
) -> Result<Url, ClientError> {
    let mut url = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl {
        url: base_url.to_string(),
        reason: e.to_string(),
    })?;

    if url.path().is_empty() || url.path() == "/" {
        url.set_path("/asr");
    }

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("output", output.as_str());
        if !opts.language.is_empty() && opts.language != "auto" {
            query.append_pair("language", &opts.language);
        }
    }

    Ok(url)
}

fn parse_response(output: OutputFormat, body: &str) -> Result<TranscriptionResult, ClientError> {
    match output {
        OutputFormat::Text => Ok(TranscriptionResult {
            text: body.to_string(),
            language: None,
            duration: None,
        }),
        OutputFormat::Json => {
            let resp: AsrResponse = serde_json::from_str(body)?;
            Ok(TranscriptionResult {
                text: resp.text,
                language: resp.language,
                duration: resp.duration,
            })
        }
    }
}
