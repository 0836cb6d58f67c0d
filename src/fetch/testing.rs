//! Scripted transport for exercising fetch strategies without a network.

use super::transport::{FetchRequest, Headers, RawResponse, Transport, TransportError};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

enum Step {
    Respond(RawResponse),
    Fail,
}

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub url: String,
    pub headers: Headers,
}

/// Answers requests from fixed per-URL routes first, then from a queue of
/// scripted steps in order. An exhausted script behaves like a dead network.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, RawResponse>>,
    queue: Mutex<VecDeque<Step>>,
    seen: Mutex<Vec<SeenRequest>>,
    redirects: Mutex<HashMap<String, String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_status(&self, status: u16) {
        self.push_response(status, Some("text/html"), Vec::new());
    }

    pub fn push_response(&self, status: u16, content_type: Option<&str>, body: Vec<u8>) {
        self.queue
            .lock()
            .unwrap()
            .push_back(Step::Respond(RawResponse::new("", status, content_type, body)));
    }

    pub fn push_failure(&self) {
        self.queue.lock().unwrap().push_back(Step::Fail);
    }

    /// Serves `body` with status 200 for every request to `url`.
    pub fn route(&self, url: &str, content_type: &str, body: impl Into<Vec<u8>>) {
        self.routes.lock().unwrap().insert(
            url.to_string(),
            RawResponse::new(url, 200, Some(content_type), body.into()),
        );
    }

    pub fn redirect(&self, from: &str, to: &str) {
        self.redirects
            .lock()
            .unwrap()
            .insert(from.to_string(), to.to_string());
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

impl Transport for ScriptedTransport {
    fn get(&self, request: &FetchRequest<'_>) -> Result<RawResponse, TransportError> {
        self.seen.lock().unwrap().push(SeenRequest {
            url: request.url.to_string(),
            headers: request.headers.clone(),
        });
        if let Some(response) = self.routes.lock().unwrap().get(request.url) {
            return Ok(response.clone());
        }
        match self.queue.lock().unwrap().pop_front() {
            Some(Step::Respond(mut response)) => {
                response.url = request.url.to_string();
                Ok(response)
            }
            Some(Step::Fail) => Err(TransportError::Connect("scripted failure".to_string())),
            None => Err(TransportError::Connect("no scripted response".to_string())),
        }
    }

    fn resolve_redirects(&self, url: &str, _timeout: Duration) -> Result<String, TransportError> {
        Ok(self
            .redirects
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string()))
    }
}
