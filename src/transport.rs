//! Progress transports
//!
//! A [`ProgressSource`] opens one streaming connection and yields raw text
//! frames until the server closes it. Dropping the returned stream closes the
//! connection.

use crate::error::{ConsoleError, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use futures::SinkExt;
use reqwest::{Method, Url};
use serde_json::Value;
use std::collections::VecDeque;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::COOKIE, HeaderValue};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, warn};

/// Raw text frames of one connection
pub type FrameStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait ProgressSource: Send + Sync {
    /// Open the connection. Errors here are connection failures.
    async fn open(&self) -> Result<FrameStream>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// WebSocket progress stream.
///
/// Check sockets (`/websocket/check-*?task=`) only stream. Action sockets
/// (`/api/action/*`) expect one JSON payload before they start streaming.
#[derive(Debug, Clone)]
pub struct WebSocketSource {
    url: Url,
    initial_payload: Option<Value>,
    cookie: Option<String>,
}

impl WebSocketSource {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            initial_payload: None,
            cookie: None,
        }
    }

    /// Send `payload` as the first frame after connecting
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.initial_payload = Some(payload);
        self
    }

    /// Raw `Cookie` header value for the handshake
    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ProgressSource for WebSocketSource {
    async fn open(&self) -> Result<FrameStream> {
        let mut request = self.url.as_str().into_client_request()?;
        if let Some(cookie) = &self.cookie {
            let value = HeaderValue::from_str(cookie)?;
            request.headers_mut().insert(COOKIE, value);
        }

        let (mut ws, _) = tokio_tungstenite::connect_async(request).await?;
        debug!(url = %self.url, "WebSocket connected");

        if let Some(payload) = &self.initial_payload {
            ws.send(Message::Text(payload.to_string())).await?;
        }

        let frames = ws.filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(data)) => Some(Ok(String::from_utf8_lossy(&data).into_owned())),
                Ok(_) => None,
                // a reset without a close handshake surfaces as an error
                Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => None,
                Err(e) => {
                    warn!("WebSocket read error: {}", e);
                    Some(Err(e.into()))
                }
            }
        });
        Ok(frames.boxed())
    }

    fn describe(&self) -> String {
        self.url.to_string()
    }
}

/// Chunked HTTP progress stream, one frame per line
#[derive(Debug, Clone)]
pub struct HttpStreamSource {
    client: reqwest::Client,
    method: Method,
    url: Url,
    body: Option<Value>,
}

impl HttpStreamSource {
    pub fn get(client: reqwest::Client, url: Url) -> Self {
        Self {
            client,
            method: Method::GET,
            url,
            body: None,
        }
    }

    /// POST `body` as JSON and stream the response
    pub fn post_json(client: reqwest::Client, url: Url, body: Value) -> Self {
        Self {
            client,
            method: Method::POST,
            url,
            body: Some(body),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ProgressSource for HttpStreamSource {
    async fn open(&self) -> Result<FrameStream> {
        let mut request = self.client.request(self.method.clone(), self.url.clone());
        if let Some(body) = &self.body {
            request = request.json(body);
        }

        let resp = request.send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ConsoleError::Http { status, body });
        }

        debug!(url = %self.url, "Progress stream opened");
        Ok(line_stream(Box::pin(resp.bytes_stream())))
    }

    fn describe(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

/// Splits a byte stream into lines, keeping partial lines across chunks
#[derive(Debug, Default)]
pub struct LineSplitter {
    buf: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every completed non-blank line
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            lines.extend(to_line(&line));
        }
        lines
    }

    /// Trailing data without a final newline
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        to_line(&rest)
    }
}

fn to_line(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let line = text.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

struct LineState<S> {
    body: S,
    splitter: LineSplitter,
    ready: VecDeque<String>,
    finished: bool,
}

/// Turn a chunked body into a stream of lines. A body error ends the stream.
pub fn line_stream<S, B, E>(body: S) -> FrameStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ConsoleError> + Send + 'static,
{
    let state = LineState {
        body,
        splitter: LineSplitter::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(line) = st.ready.pop_front() {
                return Some((Ok(line), st));
            }
            if st.finished {
                return None;
            }
            match st.body.next().await {
                Some(Ok(chunk)) => {
                    let lines = st.splitter.push(chunk.as_ref());
                    st.ready.extend(lines);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e.into()), st));
                }
                None => {
                    st.finished = true;
                    st.ready.extend(st.splitter.finish());
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_line_splitter_keeps_partial_lines() {
        let mut splitter = LineSplitter::new();
        assert!(splitter.push(b"{\"message\": \"pul").is_empty());
        assert_eq!(
            splitter.push(b"ling\"}\n{\"done\""),
            vec!["{\"message\": \"pulling\"}"]
        );
        assert_eq!(splitter.push(b": true}\r\n"), vec!["{\"done\": true}"]);
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn test_line_splitter_skips_blank_lines_and_flushes_tail() {
        let mut splitter = LineSplitter::new();
        assert_eq!(splitter.push(b"a\n\n  \nb"), vec!["a"]);
        assert_eq!(splitter.finish().as_deref(), Some("b"));
        assert_eq!(splitter.finish(), None);
    }

    #[tokio::test]
    async fn test_line_stream_across_chunks() {
        let chunks: Vec<std::result::Result<Vec<u8>, ConsoleError>> = vec![
            Ok(b"one\ntw".to_vec()),
            Ok(b"o\nthree".to_vec()),
        ];
        let lines: Vec<String> = line_stream(stream::iter(chunks))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_line_stream_body_error_ends_stream() {
        let chunks: Vec<std::result::Result<Vec<u8>, ConsoleError>> = vec![
            Ok(b"one\n".to_vec()),
            Err(ConsoleError::Network("reset".into())),
            Ok(b"never\n".to_vec()),
        ];
        let items: Vec<Result<String>> = line_stream(stream::iter(chunks)).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().unwrap(), "one");
        assert!(matches!(items[1], Err(ConsoleError::Network(_))));
    }

    #[tokio::test]
    async fn test_http_stream_source_reads_ndjson() {
        use httpmock::prelude::*;

        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/ajax/release/7/deploy")
                .json_body(serde_json::json!({"podname": "eru"}));
            then.status(200)
                .header("content-type", "application/json")
                .body(concat!(
                    "{\"type\": \"sentence\", \"message\": \"creating\"}\n",
                    "{\"podname\": \"eru\"}\n",
                ));
        });

        let url = Url::parse(&server.url("/ajax/release/7/deploy")).unwrap();
        let source = HttpStreamSource::post_json(
            reqwest::Client::new(),
            url,
            serde_json::json!({"podname": "eru"}),
        );
        let lines: Vec<String> = source
            .open()
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;

        mock.assert();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("creating"));
    }

    #[tokio::test]
    async fn test_http_stream_source_non_2xx_keeps_body() {
        use httpmock::prelude::*;

        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/ajax/release/7/deploy");
            then.status(403).body("Only for admin");
        });

        let url = Url::parse(&server.url("/ajax/release/7/deploy")).unwrap();
        let source =
            HttpStreamSource::post_json(reqwest::Client::new(), url, serde_json::json!({}));
        match source.open().await {
            Err(ConsoleError::Http { status, body }) => {
                assert_eq!(status, 403);
                assert_eq!(body, "Only for admin");
            }
            other => panic!("expected HTTP error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_websocket_source_sends_payload_then_streams() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let first = match ws.next().await {
                Some(Ok(Message::Text(text))) => text,
                other => panic!("expected payload, got {:?}", other),
            };
            ws.send(Message::Text("{\"message\": \"building\"}".into()))
                .await
                .unwrap();
            ws.send(Message::Binary(b"CELERY_TASK_DONE:b1".to_vec()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
            first
        });

        let url = Url::parse(&format!("ws://{}/api/action/build", addr)).unwrap();
        let source = WebSocketSource::new(url)
            .with_payload(serde_json::json!({"appname": "app", "sha": "3641aca"}));
        let frames: Vec<String> = source
            .open()
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert_eq!(frames, vec!["{\"message\": \"building\"}", "CELERY_TASK_DONE:b1"]);
        let payload: Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(payload["sha"], "3641aca");
    }

    #[tokio::test]
    async fn test_websocket_source_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url =
            Url::parse(&format!("ws://{}/websocket/check-load-balance?task=t", addr)).unwrap();
        let result = WebSocketSource::new(url).open().await;
        assert!(matches!(result, Err(ConsoleError::Network(_))));
    }

    #[tokio::test]
    async fn test_websocket_reset_without_close_is_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text("{\"message\": \"pulling image\"}".into()))
                .await
                .unwrap();
            drop(ws);
        });

        let url = Url::parse(&format!("ws://{}/websocket/check-container?task=t", addr)).unwrap();
        let items: Vec<Result<String>> =
            WebSocketSource::new(url).open().await.unwrap().collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().unwrap(), "{\"message\": \"pulling image\"}");
        assert!(matches!(items[1], Err(ConsoleError::Network(_))));
    }

    #[tokio::test]
    async fn test_websocket_invalid_cookie_is_config_error() {
        let url = Url::parse("ws://127.0.0.1:9/websocket/check-build?task=t").unwrap();
        let result = WebSocketSource::new(url)
            .with_cookie("session=abc\nInjected: 1")
            .open()
            .await;
        assert!(matches!(result, Err(ConsoleError::Config(msg)) if msg.contains("session cookie")));
    }
}
