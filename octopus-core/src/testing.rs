//! Test doubles shared across modules

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::agent::{AgentOutput, AgentRequest, AgentRole, Backend, TokenUsage};
use crate::{Error, Result};

/// Backend answering from per-role queues of canned responses
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    responses: Mutex<HashMap<AgentRole, VecDeque<Result<String>>>>,
    requests: Mutex<Vec<AgentRequest>>,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue an answer for a role
    pub(crate) fn reply(self, role: AgentRole, text: impl Into<String>) -> Self {
        self.push(role, Ok(text.into()));
        self
    }

    /// Queue a backend failure for a role
    pub(crate) fn fail(self, role: AgentRole, message: &str) -> Self {
        self.push(role, Err(Error::Agent(message.to_string())));
        self
    }

    fn push(&self, role: AgentRole, response: Result<String>) {
        self.responses
            .lock()
            .unwrap()
            .entry(role)
            .or_default()
            .push_back(response);
    }

    /// Requests received so far
    pub(crate) fn requests(&self) -> Vec<AgentRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn roles_called(&self) -> Vec<AgentRole> {
        self.requests().iter().map(|r| r.role).collect()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn run(&self, request: &AgentRequest) -> Result<AgentOutput> {
        self.requests.lock().unwrap().push(request.clone());

        let next = self
            .responses
            .lock()
            .unwrap()
            .get_mut(&request.role)
            .and_then(|queue| queue.pop_front());

        match next {
            Some(Ok(text)) => Ok(AgentOutput {
                text,
                usage: TokenUsage {
                    total_tokens: 15,
                    prompt_tokens: 10,
                    cached_prompt_tokens: 2,
                    completion_tokens: 5,
                    successful_requests: 1,
                },
                elapsed: Duration::from_millis(1),
            }),
            Some(Err(e)) => Err(e),
            None => Err(Error::Agent(format!("no scripted reply for {}", request.role))),
        }
    }

    fn is_available(&self) -> bool {
        true
    }
}
