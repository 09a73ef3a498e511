use crate::http::{Bytes, HttpClient, HttpError, Request, Response};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use http::{HeaderMap, Method, Uri};
use std::io::Read;
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug)]
struct RecordedRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

/// An [`HttpClient`] that records every request and answers with a fixed status.
#[derive(Clone, Debug)]
pub(crate) struct RecordingHttpClient {
    status: u16,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl RecordingHttpClient {
    pub(crate) fn new(status: u16) -> Self {
        RecordingHttpClient {
            status,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn requests(&self) -> Vec<Request<Bytes>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|recorded| {
                let mut request = Request::builder()
                    .method(recorded.method.clone())
                    .uri(recorded.uri.clone())
                    .body(recorded.body.clone())
                    .unwrap();
                *request.headers_mut() = recorded.headers.clone();
                request
            })
            .collect()
    }
}

#[async_trait]
impl HttpClient for RecordingHttpClient {
    async fn send_bytes(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError> {
        let (parts, body) = request.into_parts();
        self.requests.lock().unwrap().push(RecordedRequest {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
        });
        Ok(Response::builder()
            .status(self.status)
            .body(Bytes::from_static(b"{}"))?)
    }
}

/// Decompresses a request body and parses each line as a JSON envelope.
pub(crate) fn decode_payload(body: &[u8]) -> Vec<serde_json::Value> {
    let mut text = String::new();
    GzDecoder::new(body).read_to_string(&mut text).unwrap();
    text.lines()
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}
