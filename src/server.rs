//! HTTP surface: upload a spoken question, get back the transcript and a
//! concise answer.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::Json as JsonResponse,
    routing::{get, post},
    serve, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::config::{is_supported_language, AppConfig};
use crate::conversation::concise_answer_prompt;
use crate::ollama::OllamaClient;
use crate::pcm;
use crate::transcriber::{Transcriber, MIN_TRANSCRIPT_CHARS};

struct AppState {
    transcriber: Arc<Transcriber>,
    ollama: OllamaClient,
    whisper_model: String,
    generation_model: String,
    model_sample_rate: usize,
}

#[derive(Serialize)]
struct AskResponse {
    question: String,
    answer: String,
}

type ErrorResponse = (StatusCode, JsonResponse<Value>);

fn error_response(status: StatusCode, message: impl Into<String>) -> ErrorResponse {
    (status, JsonResponse(json!({ "error": message.into() })))
}

async fn ask(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<JsonResponse<AskResponse>, ErrorResponse> {
    let mut language = "en".to_string();
    let mut audio_bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        error_response(
            StatusCode::BAD_REQUEST,
            format!("Malformed multipart body: {}", e),
        )
    })? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("language") => {
                language = field
                    .text()
                    .await
                    .map_err(|e| {
                        error_response(
                            StatusCode::BAD_REQUEST,
                            format!("Unreadable language field: {}", e),
                        )
                    })?
                    .trim()
                    .to_lowercase();
            }
            Some("audio") => {
                let bytes = field.bytes().await.map_err(|e| {
                    error_response(
                        StatusCode::BAD_REQUEST,
                        format!("Unreadable audio field: {}", e),
                    )
                })?;
                audio_bytes = Some(bytes.to_vec());
            }
            _ => {}
        }
    }

    if !is_supported_language(&language) {
        return Err(error_response(StatusCode::BAD_REQUEST, "Invalid language"));
    }

    let Some(audio_bytes) = audio_bytes else {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "No audio file uploaded",
        ));
    };

    let audio = pcm::decode_wav(&audio_bytes).map_err(|e| {
        error_response(
            StatusCode::BAD_REQUEST,
            format!("Could not decode audio: {}", e),
        )
    })?;

    let audio = pcm::to_rate(audio, state.model_sample_rate as u32).map_err(|e| {
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to resample audio: {}", e),
        )
    })?;

    let transcriber = state.transcriber.clone();
    let lang = language.clone();
    let question = tokio::task::spawn_blocking(move || {
        transcriber.transcribe(&audio.samples, &lang)
    })
    .await
    .map_err(|e| {
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Transcription worker failed: {:?}", e),
        )
    })?
    .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    if question.chars().count() < MIN_TRANSCRIPT_CHARS {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Transcription too short or unclear.",
        ));
    }

    let answer = state
        .ollama
        .generate(&concise_answer_prompt(&question))
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let answer = if answer.is_empty() {
        "No response received".to_string()
    } else {
        answer
    };

    Ok(JsonResponse(AskResponse { question, answer }))
}

async fn health(State(state): State<Arc<AppState>>) -> JsonResponse<Value> {
    let generation_reachable = state.ollama.check_connection().await.is_ok();
    JsonResponse(json!({
        "status": "ok",
        "whisper_model": state.whisper_model,
        "generation_model": state.generation_model,
        "generation_reachable": generation_reachable,
    }))
}

pub struct Server {
    config: AppConfig,
    transcriber: Arc<Transcriber>,
    addr: SocketAddr,
}

impl Server {
    pub fn new(config: AppConfig, transcriber: Arc<Transcriber>, addr: SocketAddr) -> Self {
        Server {
            config,
            transcriber,
            addr,
        }
    }

    pub async fn start(self) -> anyhow::Result<()> {
        let app_state = Arc::new(AppState {
            transcriber: self.transcriber,
            ollama: OllamaClient::new(self.config.generation.clone()),
            whisper_model: self.config.whisper.model.clone(),
            generation_model: self.config.generation.model.clone(),
            model_sample_rate: self.config.general.sample_rate,
        });

        let app = Router::new()
            .route("/ask", post(ask))
            .route("/health", get(health))
            .layer(CorsLayer::permissive())
            .layer(DefaultBodyLimit::max(self.config.server.max_upload_bytes))
            .with_state(app_state);

        println!("Listening on {}", self.addr);

        serve(
            TcpListener::bind(self.addr).await?,
            app.into_make_service(),
        )
        .await?;

        Ok(())
    }
}

// # Ask a question (English)
// curl -X POST http://localhost:5000/ask -F language=en -F audio=@question.wav

// # Ask in Hindi
// curl -X POST http://localhost:5000/ask -F language=hi -F audio=@question.wav

// # Unsupported language -> {"error": "Invalid language"}
// curl -X POST http://localhost:5000/ask -F language=fr -F audio=@question.wav

// # Service status
// curl http://localhost:5000/health

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_shape_matches_wire_contract() {
        let (status, JsonResponse(body)) =
            error_response(StatusCode::BAD_REQUEST, "Invalid language");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Invalid language" }));
    }

    #[test]
    fn ask_response_serializes() {
        let response = AskResponse {
            question: "what is rust?".to_string(),
            answer: "A systems language.".to_string(),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["question"], "what is rust?");
        assert_eq!(value["answer"], "A systems language.");
    }
}
