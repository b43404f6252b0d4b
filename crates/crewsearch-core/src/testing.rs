//! Deterministic stand-ins for the model runtime and the search provider.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::capability::{CapabilityError, CapabilityRef, ToolCall};
use crate::model::{Completion, CompletionRequest, ModelError, ModelRuntime};
use crate::search::{SearchCapability, SearchProvider, SearchQuery};
use crate::{CredentialSource, SecretValue};

type Responder = dyn Fn(&CompletionRequest) -> Result<Completion, ModelError> + Send + Sync;

enum Script {
    Queue(Mutex<VecDeque<Result<Completion, ModelError>>>),
    Responder(Box<Responder>),
}

/// Model runtime that replays canned completions and records every request.
pub struct ScriptedRuntime {
    script: Script,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedRuntime {
    /// Replay `responses` in order; an exhausted script answers with an error.
    pub fn new(responses: Vec<Result<Completion, ModelError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Script::Queue(Mutex::new(responses.into())),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Compute each completion from the incoming request.
    pub fn from_fn<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&CompletionRequest) -> Result<Completion, ModelError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            script: Script::Responder(Box::new(responder)),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }
}

#[async_trait]
impl ModelRuntime for ScriptedRuntime {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ModelError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        match &self.script {
            Script::Queue(queue) => queue
                .lock()
                .ok()
                .and_then(|mut queue| queue.pop_front())
                .unwrap_or_else(|| {
                    Err(ModelError::MalformedResponse("script exhausted".into()))
                }),
            Script::Responder(responder) => responder(&request),
        }
    }
}

static CALL_IDS: AtomicUsize = AtomicUsize::new(0);

/// Tool call with a fresh id, as a model would emit it.
pub fn scripted_call(name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall {
        id: format!("call_{}", CALL_IDS.fetch_add(1, Ordering::Relaxed)),
        name: name.to_string(),
        arguments,
    }
}

/// Search provider answering every query with the same payload or failure.
pub struct StaticSearch {
    payload: Result<String, u16>,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl StaticSearch {
    pub fn new(payload: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            payload: Ok(payload.into()),
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(status: u16) -> Arc<Self> {
        Arc::new(Self {
            payload: Err(status),
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Query strings received so far, in call order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }

    pub fn capability(payload: impl Into<String>) -> CapabilityRef {
        Self::new(payload).into_capability()
    }

    /// Wrap this provider in a search capability with a static test key.
    pub fn into_capability(self: Arc<Self>) -> CapabilityRef {
        CapabilityRef::new(SearchCapability::new(
            self,
            CredentialSource::Static(SecretValue::new("test-key")),
        ))
    }

    pub fn failing_capability(status: u16) -> CapabilityRef {
        Self::failing(status).into_capability()
    }
}

#[async_trait]
impl SearchProvider for StaticSearch {
    fn name(&self) -> &str {
        "static"
    }

    async fn search(
        &self,
        _credential: &SecretValue,
        query: &SearchQuery,
    ) -> Result<serde_json::Value, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.query.clone());
        }
        match &self.payload {
            Ok(text) => Ok(serde_json::Value::String(text.clone())),
            Err(status) => Err(CapabilityError::Provider {
                status: *status,
                message: "search backend unavailable".into(),
            }),
        }
    }
}
