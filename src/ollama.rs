//! Client for the locally hosted generation endpoint (Ollama wire format).
//!
//! Two call styles match the two ways answers are consumed: a buffered
//! request for the HTTP endpoint and meeting help, and a streaming request
//! for the chat loop where tokens are printed as they arrive.

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::time::Duration;

use crate::config::GenerationConfig;

#[derive(Debug, Clone)]
pub enum GenerationError {
    /// Could not reach the generation server
    ConnectionFailed(String),

    /// The server took longer than the configured timeout
    Timeout,

    /// Non-success HTTP status from the server
    BadStatus(u16),

    /// Response body did not match the expected shape
    InvalidResponse(String),
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationError::ConnectionFailed(msg) => {
                write!(f, "Cannot reach generation server: {}", msg)
            }
            GenerationError::Timeout => {
                write!(f, "Request timed out. The generation server might be busy.")
            }
            GenerationError::BadStatus(code) => {
                write!(f, "Generation server returned status {}", code)
            }
            GenerationError::InvalidResponse(msg) => {
                write!(f, "Invalid response from generation server: {}", msg)
            }
        }
    }
}

impl Error for GenerationError {}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GenerationError::Timeout
        } else {
            GenerationError::ConnectionFailed(err.to_string())
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub num_predict: u32,
    pub top_p: f32,
}

impl From<&GenerationConfig> for GenerateOptions {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            temperature: config.temperature,
            num_predict: config.num_predict,
            top_p: config.top_p,
        }
    }
}

/// One JSON object from the generation server; the non-streaming reply and
/// each streamed line share this shape
#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    #[serde(default)]
    name: String,
}

/// Parse one newline-delimited stream line; malformed lines are skipped
fn parse_stream_line(line: &str) -> Option<GenerateChunk> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    serde_json::from_str(line).ok()
}

pub struct OllamaClient {
    http: reqwest::Client,
    config: GenerationConfig,
}

impl OllamaClient {
    pub fn new(config: GenerationConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to build HTTP client");
        Self { http, config }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/api/generate",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.config.base_url.trim_end_matches('/'))
    }

    /// Buffered generation: send the prompt, wait for the whole answer
    pub async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            options: GenerateOptions::from(&self.config),
        };

        let response = self
            .http
            .post(self.generate_url())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::BadStatus(status.as_u16()));
        }

        let chunk: GenerateChunk = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        Ok(chunk.response.trim().to_string())
    }

    /// Streaming generation: `on_token` sees each piece as it arrives, and
    /// the accumulated answer is returned at the end
    pub async fn generate_stream(
        &self,
        prompt: &str,
        mut on_token: impl FnMut(&str),
    ) -> Result<String, GenerationError> {
        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: true,
            options: GenerateOptions::from(&self.config),
        };

        let response = self
            .http
            .post(self.generate_url())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::BadStatus(status.as_u16()));
        }

        let mut answer = String::new();
        let mut carry = String::new();
        let mut stream = response.bytes_stream();

        'outer: while let Some(chunk) = stream.next().await {
            let bytes = chunk?;
            carry.push_str(&String::from_utf8_lossy(&bytes));

            // Lines may straddle chunk boundaries; keep the trailing partial
            while let Some(newline) = carry.find('\n') {
                let line: String = carry.drain(..=newline).collect();
                if let Some(parsed) = parse_stream_line(&line) {
                    if !parsed.response.is_empty() {
                        on_token(&parsed.response);
                        answer.push_str(&parsed.response);
                    }
                    if parsed.done {
                        break 'outer;
                    }
                }
            }
        }

        // A final object without a trailing newline still counts
        if let Some(parsed) = parse_stream_line(&carry) {
            if !parsed.response.is_empty() {
                on_token(&parsed.response);
                answer.push_str(&parsed.response);
            }
        }

        Ok(answer.trim().to_string())
    }

    /// Preflight check: is the server up, and does it have our model?
    ///
    /// Returns Ok(true) when the configured model is present, Ok(false) when
    /// the server answered but the model is missing.
    pub async fn check_connection(&self) -> Result<bool, GenerationError> {
        let response = self
            .http
            .get(self.tags_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::BadStatus(status.as_u16()));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        let base_model = self.config.model.split(':').next().unwrap_or_default();
        Ok(tags
            .models
            .iter()
            .any(|m| m.name == self.config.model || m.name.starts_with(base_model)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_wire_shape() {
        let request = GenerateRequest {
            model: "gemma:2b",
            prompt: "Answer this question concisely: what is rust?",
            stream: false,
            options: GenerateOptions {
                temperature: 0.3,
                num_predict: 200,
                top_p: 0.9,
            },
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "gemma:2b");
        assert_eq!(value["stream"], false);
        assert_eq!(value["options"]["num_predict"], 200);
        assert!(value["prompt"]
            .as_str()
            .unwrap()
            .starts_with("Answer this question concisely:"));
    }

    #[test]
    fn options_come_from_config() {
        let config = GenerationConfig::default();
        let options = GenerateOptions::from(&config);
        assert_eq!(options.num_predict, config.num_predict);
        assert_eq!(options.top_p, config.top_p);
    }

    #[test]
    fn stream_lines_parse() {
        let chunk = parse_stream_line(r#"{"response": "Hel", "done": false}"#).unwrap();
        assert_eq!(chunk.response, "Hel");
        assert!(!chunk.done);

        let chunk = parse_stream_line(r#"{"response": "", "done": true}"#).unwrap();
        assert!(chunk.done);

        // Fields we do not know are ignored, absent fields default
        let chunk = parse_stream_line(r#"{"model": "gemma:2b", "created_at": "now"}"#).unwrap();
        assert_eq!(chunk.response, "");
        assert!(!chunk.done);
    }

    #[test]
    fn malformed_stream_lines_are_skipped() {
        assert!(parse_stream_line("").is_none());
        assert!(parse_stream_line("   ").is_none());
        assert!(parse_stream_line("not json at all").is_none());
        assert!(parse_stream_line(r#"{"response": 42}"#).is_none());
    }
}
