#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use unleash_proxy_client::{
    ErrorCode, EventBus, EventKind, HttpRequest, HttpResponse, Result, Transport, UnleashError,
};

pub const URL: &str = "https://app.unleash-hosted.com/hosted/api/proxy";

pub enum Reply {
    Response(HttpResponse),
    Delayed(Duration, HttpResponse),
    NoResponse,
}

/// Transport that answers from a scripted queue and records every request.
/// Once the queue is empty it answers 304.
pub struct MockTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Self::with_replies(Vec::new())
    }

    pub fn with_replies(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, reply: Reply) {
        self.replies.lock().push_back(reply);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn perform(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().push(request);
        let reply = self.replies.lock().pop_front();

        match reply {
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::Delayed(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            Some(Reply::NoResponse) => Err(UnleashError::no_response("Connection failed")),
            None => Ok(HttpResponse::new(304)),
        }
    }
}

pub fn toggles_response(body: &str) -> Reply {
    Reply::Response(HttpResponse::new(200).with_body(body.as_bytes().to_vec()))
}

pub fn status_response(status: u16, body: Option<&str>) -> Reply {
    let response = HttpResponse::new(status);
    Reply::Response(match body {
        Some(body) => response.with_body(body.as_bytes().to_vec()),
        None => response,
    })
}

/// Counts events of one kind on a bus.
pub fn counter(bus: &EventBus, kind: EventKind) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let count_clone = Arc::clone(&count);
    bus.subscribe(kind, move |_| {
        count_clone.fetch_add(1, Ordering::SeqCst);
    });
    count
}

pub fn error_codes(bus: &EventBus) -> Arc<Mutex<Vec<ErrorCode>>> {
    let codes = Arc::new(Mutex::new(Vec::new()));
    let codes_clone = Arc::clone(&codes);
    bus.subscribe(EventKind::Error, move |event| {
        if let unleash_proxy_client::UnleashEvent::Error(error) = event {
            codes_clone.lock().push(error.code);
        }
    });
    codes
}
