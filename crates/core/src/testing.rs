//! Test doubles shared across module tests.

use crate::cache::Clock;
use crate::invoker::retry::Sleeper;
use crate::llm::{ServiceError, ServiceRequest, ServiceResponse, TextService, TokenUsage};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Responder = dyn Fn(&ServiceRequest, u32) -> Result<ServiceResponse, ServiceError> + Send + Sync;

/// Scripted text service that counts calls
pub struct StubService {
    responder: Box<Responder>,
    calls: AtomicU32,
    requests: Mutex<Vec<ServiceRequest>>,
}

impl StubService {
    /// `responder` receives the request and the 1-indexed call number
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&ServiceRequest, u32) -> Result<ServiceResponse, ServiceError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always(text: &str, input_tokens: u64, output_tokens: u64) -> Self {
        let text = text.to_string();
        Self::new(move |_, _| Ok(reply(&text, input_tokens, output_tokens)))
    }

    pub fn failing(err: ServiceError) -> Self {
        Self::new(move |_, _| Err(err.clone()))
    }

    /// Ask the script for an answer without recording a call
    pub fn respond(&self, request: &ServiceRequest) -> Result<ServiceResponse, ServiceError> {
        (self.responder)(request, 0)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ServiceRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextService for StubService {
    async fn complete(&self, request: &ServiceRequest) -> Result<ServiceResponse, ServiceError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request.clone());
        (self.responder)(request, n)
    }
}

pub fn reply(text: &str, input_tokens: u64, output_tokens: u64) -> ServiceResponse {
    ServiceResponse {
        content: text.to_string(),
        usage: TokenUsage {
            input_tokens,
            output_tokens,
        },
    }
}

/// The prompt text of the single user message
pub fn prompt_of(request: &ServiceRequest) -> &str {
    request
        .messages
        .first()
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

/// Records requested backoff delays without sleeping
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

/// Clock that only moves when told to
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()),
        }
    }
}

impl ManualClock {
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
