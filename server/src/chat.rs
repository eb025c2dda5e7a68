use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{stream, StreamExt};
use shared::ChatMessage;

use crate::provider::{ChatProvider, DeltaStream};
use crate::AppState;

const HEADING: &str = "# Unit Test Cases";
const SETUP_FAILURE: &str = "Error processing request";

const SYSTEM_PROMPT: &str = "
Unit Test Case Generator: Your task is to create comprehensive unit test cases for the given code.
Ensure the following:
1. Cover edge cases, typical cases, and invalid inputs.
2. Include meaningful assertions for the behavior of each function.
3. Use a popular testing framework for the language of the snippet (e.g., Pytest for Python, JUnit for Java).
4. Provide the expected outputs where applicable.
5. Ensure clarity and correctness in the test cases.
6. Format the test cases in a structured, readable style for clean display in Markdown.
7. Include explanations for each test case where necessary.

Input: A code snippet.
Output: Well-structured, readable unit test cases with clear formatting.
";

/// `POST /api/chat`
pub async fn generate(State(state): State<Arc<AppState>>, body: Body) -> Response {
    match open_completion(state.provider.as_ref(), body).await {
        Ok(deltas) => {
            let body = stream::once(buffer_completion(deltas)).map(|result| {
                result.map(Bytes::from).inspect_err(|e| {
                    tracing::error!("upstream stream failed: {:#}", e);
                })
            });

            (
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                Body::from_stream(body),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("error in chat handler: {:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, SETUP_FAILURE).into_response()
        }
    }
}

/// Everything that can fail before the response starts. The body is read
/// without a size limit.
async fn open_completion(provider: &dyn ChatProvider, body: Body) -> Result<DeltaStream> {
    let body = to_bytes(body, usize::MAX)
        .await
        .context("failed to read request body")?;
    let caller: Vec<ChatMessage> =
        serde_json::from_slice(&body).context("request body is not a message list")?;
    tracing::debug!(messages = caller.len(), "received chat request");

    let mut messages = Vec::with_capacity(caller.len() + 1);
    messages.push(ChatMessage::system(SYSTEM_PROMPT));
    messages.extend(caller);

    provider.chat_stream(messages).await
}

/// Drains the upstream completely, then renders the Markdown document.
/// Nothing is produced if the upstream fails part way.
async fn buffer_completion(mut deltas: DeltaStream) -> Result<String> {
    let mut text = String::new();
    while let Some(delta) = deltas.next().await {
        let delta = delta?;
        if !delta.is_empty() {
            text.push_str(&delta);
        }
    }

    tracing::debug!(bytes = text.len(), "upstream stream drained");
    Ok(format!("{}\n\n{}", HEADING, text))
}
