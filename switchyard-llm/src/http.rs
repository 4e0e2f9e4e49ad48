//! Shared HTTP plumbing: status classification, JSON calls and chunked
//! response bodies turned into text streams.

use std::time::Duration;

use futures::stream::{self, Stream, StreamExt};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use switchyard_core::{ProviderError, TextStream};

use crate::error::{BackendError, transport_error};

/// Error bodies are cut to this many characters before they reach logs.
const MAX_ERROR_BODY: usize = 512;

/// Parses one line of a chunked body. `None` skips the line.
pub(crate) type LineParser = fn(&str) -> Option<Result<String, ProviderError>>;

/// Client shared by one adapter. Request deadlines are enforced by the router.
pub(crate) fn client() -> Result<Client, BackendError> {
    Ok(Client::builder().connect_timeout(Duration::from_secs(10)).build()?)
}

/// Send `request`, turning transport failures and non-2xx statuses into
/// [`ProviderError`]s.
pub(crate) async fn send(request: RequestBuilder) -> Result<Response, ProviderError> {
    let response = request.send().await.map_err(|e| transport_error(&e))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::from_status(status.as_u16(), truncate(&body)))
}

/// Send `request` and decode a JSON body.
pub(crate) async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ProviderError> {
    send(request)
        .await?
        .json::<T>()
        .await
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
}

/// Stream a response body line by line through `parse`.
pub(crate) fn text_stream(response: Response, parse: LineParser) -> TextStream {
    lines(response.bytes_stream())
        .filter_map(move |line| {
            futures::future::ready(match line {
                Ok(line) => parse(&line),
                Err(e) => Some(Err(e)),
            })
        })
        .boxed()
}

/// Split a byte stream into non-empty lines.
///
/// Bytes are buffered until a newline so multi-byte characters split across
/// chunks decode correctly. A trailing line without a newline is emitted when
/// the body ends.
pub(crate) fn lines<S, B>(bytes: S) -> impl Stream<Item = Result<String, ProviderError>> + Send + 'static
where
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    stream::unfold(
        (Box::pin(bytes), Vec::<u8>::new(), false),
        |(mut bytes, mut buffer, mut ended)| async move {
            loop {
                if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line).trim().to_string();
                    if !line.is_empty() {
                        return Some((Ok(line), (bytes, buffer, ended)));
                    }
                    continue;
                }

                if ended {
                    if buffer.iter().all(u8::is_ascii_whitespace) {
                        return None;
                    }
                    let rest = String::from_utf8_lossy(&std::mem::take(&mut buffer)).trim().to_string();
                    return Some((Ok(rest), (bytes, buffer, ended)));
                }

                match bytes.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(chunk.as_ref()),
                    Some(Err(e)) => {
                        ended = true;
                        buffer.clear();
                        return Some((Err(transport_error(&e)), (bytes, buffer, ended)));
                    }
                    None => ended = true,
                }
            }
        },
    )
}

/// Payload of a server-sent-events `data:` line, or `None` for comments,
/// other fields and the `[DONE]` terminator.
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    let data = line.trim().strip_prefix("data:")?.trim();
    if data.is_empty() || data == "[DONE]" {
        None
    } else {
        Some(data)
    }
}

/// Decode one JSON document from a stream line.
pub(crate) fn parse_line<T: DeserializeOwned>(line: &str) -> Result<T, ProviderError> {
    serde_json::from_str(line).map_err(|e| ProviderError::InvalidResponse(format!("{e}: {}", truncate(line))))
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY).collect()
}
