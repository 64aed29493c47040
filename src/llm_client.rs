// src/llm_client.rs
use crate::config::AppConfig;
use crate::models::chat::LlmSettings;
use crate::models::Message;
use crate::sse::{parse_data_lines, SseBuffer, DONE_SENTINEL};
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::string::FromUtf8Error;
use thiserror::Error;

const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_REPEAT_PENALTY: f64 = 1.1;
const DEFAULT_TOP_P: f64 = 0.95;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Could not connect to the completion API: {0}")]
    Connection(String),
    #[error("API Error: {status}")]
    Status { status: u16, body: String },
    #[error("Unexpected API response format: {0}")]
    Protocol(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            LlmError::Protocol(e.to_string())
        } else if e.is_timeout() {
            LlmError::Connection(format!("request timed out: {}", e))
        } else {
            LlmError::Connection(e.to_string())
        }
    }
}

/// Body of an OpenAI-compatible `/v1/chat/completions` call.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionPayload {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f64,
    pub repeat_penalty: f64,
    pub top_p: f64,
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

/// Text fragments of a streamed completion, ending at the upstream sentinel.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

#[derive(Debug, Clone)]
pub struct LlmClient {
    client: Client,
    api_url: String,
    model: String,
}

impl LlmClient {
    pub fn new(config: &AppConfig) -> Result<Self, LlmError> {
        // No total timeout: a long generation may stream for longer than the
        // bound, but a stalled connection or read still fails.
        let client = Client::builder()
            .connect_timeout(config.llm_timeout)
            .read_timeout(config.llm_timeout)
            .build()
            .map_err(LlmError::from)?;
        Ok(Self {
            client,
            api_url: config.llm_api_url.clone(),
            model: config.llm_model.clone(),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn payload(&self, messages: Vec<Message>, settings: &LlmSettings, stream: bool) -> CompletionPayload {
        CompletionPayload {
            model: self.model.clone(),
            messages,
            temperature: settings.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            repeat_penalty: settings.repetition_penalty.unwrap_or(DEFAULT_REPEAT_PENALTY),
            top_p: settings.min_p.unwrap_or(DEFAULT_TOP_P),
            stream,
        }
    }

    async fn send(&self, payload: &CompletionPayload) -> Result<reqwest::Response, LlmError> {
        tracing::debug!(
            url = %self.api_url,
            messages = payload.messages.len(),
            stream = payload.stream,
            "Sending completion request"
        );

        let response = self.client.post(&self.api_url).json(payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), body = %body, "Completion API returned an error status");
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Waits for the whole completion and returns its text.
    pub async fn complete(&self, payload: &CompletionPayload) -> Result<String, LlmError> {
        let response = self.send(payload).await?;
        let response_text = response.text().await?;

        let completion: ChatCompletion = serde_json::from_str(&response_text)
            .map_err(|e| LlmError::Protocol(format!("{}. Response: {}", e, response_text)))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| LlmError::Protocol("response contained no choices".into()))
    }

    /// Opens a streamed completion. Fragments are yielded as they arrive; the
    /// stream ends at `data: [DONE]` or when the upstream closes the body.
    pub async fn stream(&self, payload: &CompletionPayload) -> Result<FragmentStream, LlmError> {
        let response = self.send(payload).await?;
        let mut bytes = response.bytes_stream();

        let stream = async_stream::try_stream! {
            let mut buffer = SseBuffer::new();
            let mut finished = false;

            while !finished {
                let Some(chunk) = bytes.next().await else {
                    break;
                };
                buffer.push_chunk(&chunk?);

                while let Some(block) = buffer.next_event_block().map_err(invalid_utf8)? {
                    let (fragments, done) = fragments_in_block(&block)?;
                    for fragment in fragments {
                        yield fragment;
                    }
                    if done {
                        finished = true;
                        break;
                    }
                }
            }

            if !finished {
                if let Some(rest) = buffer.take_remainder().map_err(invalid_utf8)? {
                    let (fragments, _) = fragments_in_block(&rest)?;
                    for fragment in fragments {
                        yield fragment;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

fn invalid_utf8(e: FromUtf8Error) -> LlmError {
    LlmError::Protocol(format!("stream is not valid UTF-8: {}", e))
}

/// Text fragments carried by one SSE block, and whether it held the sentinel.
fn fragments_in_block(block: &str) -> Result<(Vec<String>, bool), LlmError> {
    let mut fragments = Vec::new();
    for data in parse_data_lines(block) {
        if data == DONE_SENTINEL {
            return Ok((fragments, true));
        }
        if let Some(fragment) = parse_chunk(data)? {
            fragments.push(fragment);
        }
    }
    Ok((fragments, false))
}

/// Role-only and finish chunks carry no text and yield `None`.
fn parse_chunk(data: &str) -> Result<Option<String>, LlmError> {
    let chunk: ChatCompletionChunk = serde_json::from_str(data)
        .map_err(|e| LlmError::Protocol(format!("{}. Chunk: {}", e, data)))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}
