use futures::{stream, Stream, StreamExt};
use reqwest::{Client, StatusCode};
use shared::ChatMessage;
use tokio::sync::mpsc;

const UNKNOWN_ERROR: &str = "An unknown error occurred";

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("Failed to generate test cases")]
    Status(StatusCode),
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
}

impl GenerateError {
    /// Text shown in the error panel.
    pub fn user_message(&self) -> String {
        let message = self.to_string();
        if message.is_empty() {
            UNKNOWN_ERROR.to_string()
        } else {
            message
        }
    }
}

#[derive(Debug)]
pub enum GenerateEvent {
    Chunk(String),
    Finished(Result<String, GenerateError>),
}

/// Screen state: `Idle -> Submitting -> Streaming -> Idle`.
#[derive(Debug, Default)]
pub struct Generator {
    pub input: String,
    pub response: String,
    pub loading: bool,
    pub error: Option<String>,
}

impl Generator {
    /// Resets the output panels and returns the snippet to submit, or
    /// `None` while a request is still in flight.
    pub fn handle_generate(&mut self) -> Option<String> {
        if self.loading {
            return None;
        }
        self.loading = true;
        self.error = None;
        self.response.clear();
        Some(self.input.clone())
    }

    pub fn apply(&mut self, event: GenerateEvent) {
        match event {
            GenerateEvent::Chunk(text) => self.response.push_str(&text),
            GenerateEvent::Finished(Ok(full)) => {
                self.response = full;
                self.loading = false;
            }
            GenerateEvent::Finished(Err(e)) => {
                self.error = Some(e.user_message());
                self.loading = false;
            }
        }
    }
}

/// Runs one request to completion, reporting every decoded fragment and
/// then the final outcome on `events`.
pub async fn generate(
    http: Client,
    server: String,
    snippet: String,
    events: mpsc::Sender<GenerateEvent>,
) {
    let result = read_response(&http, &server, snippet, &events).await;
    match &result {
        Ok(_) => {}
        Err(GenerateError::Status(status)) => tracing::warn!(%status, "server rejected request"),
        Err(e) => tracing::warn!("generation failed: {}", e),
    }
    let _ = events.send(GenerateEvent::Finished(result)).await;
}

async fn read_response(
    http: &Client,
    server: &str,
    snippet: String,
    events: &mpsc::Sender<GenerateEvent>,
) -> Result<String, GenerateError> {
    let fragments = request_text(http, server, snippet).await?;
    let mut fragments = std::pin::pin!(fragments);

    let mut output = String::new();
    while let Some(text) = fragments.next().await {
        let text = text?;
        output.push_str(&text);
        let _ = events.send(GenerateEvent::Chunk(text)).await;
    }

    tracing::debug!(bytes = output.len(), "response complete");
    Ok(output)
}

/// Posts the snippet and yields the response body as decoded text.
async fn request_text(
    http: &Client,
    server: &str,
    snippet: String,
) -> Result<impl Stream<Item = Result<String, GenerateError>>, GenerateError> {
    let url = format!("{}{}", server.trim_end_matches('/'), shared::CHAT_ROUTE);
    tracing::debug!("posting snippet to {}", url);

    let res = http
        .post(&url)
        .json(&[ChatMessage::user(snippet)])
        .send()
        .await?;

    if !res.status().is_success() {
        return Err(GenerateError::Status(res.status()));
    }

    Ok(decode_text(res.bytes_stream()))
}

fn decode_text<S, B>(bytes: S) -> impl Stream<Item = Result<String, GenerateError>>
where
    S: Stream<Item = Result<B, reqwest::Error>>,
    B: AsRef<[u8]>,
{
    stream::unfold(
        (Box::pin(bytes), Utf8Decoder::default(), false),
        |(mut bytes, mut decoder, done)| async move {
            if done {
                return None;
            }
            match bytes.next().await {
                Some(Ok(chunk)) => {
                    let text = decoder.decode(chunk.as_ref());
                    Some((Ok(text), (bytes, decoder, false)))
                }
                Some(Err(e)) => Some((Err(GenerateError::from(e)), (bytes, decoder, true))),
                None => {
                    let rest = decoder.finish();
                    if rest.is_empty() {
                        None
                    } else {
                        Some((Ok(rest), (bytes, decoder, true)))
                    }
                }
            }
        },
    )
}

/// Incremental UTF-8 decoding: a code point split across chunks is held
/// back until its remaining bytes arrive.
#[derive(Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let complete = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => self.pending.len(),
        };

        let rest = self.pending.split_off(complete);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = rest;
        text
    }

    fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode as AxumStatus, routing::post, Json, Router};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    async fn start_server(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn run(server: String, generator: &mut Generator) -> Vec<String> {
        let snippet = generator.handle_generate().unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        tokio::spawn(generate(Client::new(), server, snippet, tx));

        let mut chunks = Vec::new();
        while let Some(event) = rx.recv().await {
            if let GenerateEvent::Chunk(text) = &event {
                chunks.push(text.clone());
            }
            generator.apply(event);
        }
        chunks
    }

    #[tokio::test]
    async fn successful_response_fills_response_panel() {
        let received = Arc::new(Mutex::new(None));
        let capture = received.clone();
        let app = Router::new().route(
            "/api/chat",
            post(move |Json(body): Json<serde_json::Value>| async move {
                *capture.lock().unwrap() = Some(body);
                "# Unit Test Cases\n\nfoo bar"
            }),
        );
        let server = start_server(app).await;

        let mut generator = Generator {
            input: "fn add(a: i32, b: i32) -> i32 { a + b }".into(),
            ..Generator::default()
        };
        let chunks = run(server, &mut generator).await;

        assert!(!chunks.is_empty());
        assert_eq!(generator.response, "# Unit Test Cases\n\nfoo bar");
        assert!(!generator.loading);
        assert_eq!(generator.error, None);

        let body = received.lock().unwrap().take().unwrap();
        assert_eq!(
            body,
            serde_json::json!([{"role": "user", "content": "fn add(a: i32, b: i32) -> i32 { a + b }"}])
        );
    }

    #[tokio::test]
    async fn error_status_sets_fixed_message() {
        let app = Router::new().route(
            "/api/chat",
            post(|| async { (AxumStatus::INTERNAL_SERVER_ERROR, "Error processing request") }),
        );
        let server = start_server(app).await;

        let mut generator = Generator::default();
        run(server, &mut generator).await;

        assert_eq!(generator.error.as_deref(), Some("Failed to generate test cases"));
        assert_eq!(generator.response, "");
        assert!(!generator.loading);
    }

    #[tokio::test]
    async fn aborted_body_sets_error() {
        let app = Router::new().route(
            "/api/chat",
            post(|| async {
                let chunks: Vec<Result<&'static str, std::io::Error>> = vec![
                    Ok("# Unit Test Cases\n\n"),
                    Err(std::io::Error::other("upstream reset")),
                ];
                Body::from_stream(stream::iter(chunks))
            }),
        );
        let server = start_server(app).await;

        let mut generator = Generator::default();
        run(server, &mut generator).await;

        assert!(generator.error.is_some());
        assert!(!generator.loading);
    }

    #[tokio::test]
    async fn unreachable_server_reports_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let mut generator = Generator::default();
        run(server, &mut generator).await;

        let error = generator.error.unwrap();
        assert!(!error.is_empty());
        assert_ne!(error, "Failed to generate test cases");
    }

    #[test]
    fn generate_is_ignored_while_loading() {
        let mut generator = Generator {
            input: "x = 1".into(),
            ..Generator::default()
        };
        assert_eq!(generator.handle_generate().as_deref(), Some("x = 1"));
        generator.apply(GenerateEvent::Chunk("partial".into()));

        assert_eq!(generator.handle_generate(), None);
        assert_eq!(generator.response, "partial");
    }

    #[test]
    fn new_submission_clears_previous_output() {
        let mut generator = Generator {
            response: "old".into(),
            error: Some("old error".into()),
            ..Generator::default()
        };
        generator.handle_generate();
        assert!(generator.loading);
        assert_eq!(generator.response, "");
        assert_eq!(generator.error, None);
    }

    #[test]
    fn decoder_holds_split_code_points() {
        let bytes = "naïve ✓".as_bytes();
        let mut decoder = Utf8Decoder::default();

        let mut out = String::new();
        for byte in bytes {
            out.push_str(&decoder.decode(std::slice::from_ref(byte)));
        }
        out.push_str(&decoder.finish());
        assert_eq!(out, "naïve ✓");
    }

    #[test]
    fn decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"ok\xFFok"), "ok\u{FFFD}ok");
        assert_eq!(decoder.finish(), "");
    }
}
