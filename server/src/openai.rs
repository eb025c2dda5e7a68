use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{future, Stream, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::ChatMessage;

use crate::config::AppConfig;
use crate::provider::{ChatProvider, DeltaStream};

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Deserialize, Debug)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<StreamError>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Debug, Default)]
struct Delta {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamError {
    message: String,
}

#[derive(Debug, PartialEq)]
enum SseEvent {
    Delta(String),
    Skip,
    Done,
}

/// Interprets the `data` field of one server-sent event.
fn parse_data(data: &str) -> Result<SseEvent> {
    match data {
        "" => return Ok(SseEvent::Skip),
        "[DONE]" => return Ok(SseEvent::Done),
        _ => {}
    }

    let chunk: ChatCompletionChunk =
        serde_json::from_str(data).context("malformed completion chunk")?;

    if let Some(err) = chunk.error {
        return Err(anyhow!("provider stream error: {}", err.message));
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .map_or(SseEvent::Skip, SseEvent::Delta))
}

/// Turns a raw SSE body into text deltas, ending at `[DONE]`.
fn decode_deltas<S, B, E>(bytes: S) -> DeltaStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let deltas = bytes
        .eventsource()
        .map(|event| match event {
            Ok(event) => parse_data(&event.data),
            Err(e) => Err(anyhow!("upstream stream interrupted: {}", e)),
        })
        .take_while(|event| future::ready(!matches!(event, Ok(SseEvent::Done))))
        .try_filter_map(|event| async move {
            Ok(match event {
                SseEvent::Delta(text) => Some(text),
                SseEvent::Skip | SseEvent::Done => None,
            })
        });

    Box::pin(deltas)
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OAIClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OAIClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl ChatProvider for OAIClient {
    async fn chat_stream(&self, messages: Vec<ChatMessage>) -> Result<DeltaStream> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: true,
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let res = builder
            .send()
            .await
            .context("Failed to send request to completion provider")?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(anyhow!("API Error ({}): {}", status, text));
        }

        tracing::debug!(model = %self.model, "upstream stream opened");

        Ok(decode_deltas(res.bytes_stream()))
    }
}
