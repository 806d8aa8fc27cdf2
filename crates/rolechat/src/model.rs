//! Model service boundary.
//!
//! The turn processor only talks to a [`ModelService`] (start a seeded
//! conversation) and the [`Conversation`] it returns (send one message).
//! [`GeminiService`](crate::gemini::GeminiService) is the production
//! implementation; tests substitute scripted fakes.
//!
//! ```text
//! ModelService::start_conversation(key, seed) ──▶ Box<dyn Conversation>
//!                                                   │
//!                          Conversation::send(text, params) ──▶ Reply | String
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use crate::config::{GenerationParams, ModelName, redact};

// ── Context messages ───────────────────────────────────────────────

/// Speaker vocabulary of the model service.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceRole {
    User,
    Model,
}

/// One entry of a conversation's context, in service vocabulary.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ContextMessage {
    pub role: ServiceRole,
    pub text: String,
}

impl ContextMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ServiceRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ServiceRole::Model,
            text: text.into(),
        }
    }
}

// ── Reply ──────────────────────────────────────────────────────────

/// Token accounting reported by the service.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// Successful result of [`Conversation::send`]. `text` may be empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reply {
    pub text: String,
    pub finish_reason: Option<String>,
    pub usage: Option<UsageInfo>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

// ── Traits ─────────────────────────────────────────────────────────

/// Boxed future returned by [`Conversation::send`]. Errors are described
/// as strings and end up verbatim in the chat transcript.
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<Reply, String>> + Send + 'a>>;

/// A live multi-turn context held by the model service.
pub trait Conversation: Send {
    /// Send one user message and wait for the reply.
    ///
    /// A failed send must leave the context unchanged.
    fn send<'a>(&'a mut self, text: &'a str, params: &'a GenerationParams) -> SendFuture<'a>;

    /// The context the next send builds on.
    fn context(&self) -> &[ContextMessage];
}

/// Creates conversations for a (credentials, model, instruction) key.
pub trait ModelService: Send + Sync {
    fn start_conversation(
        &self,
        key: &ModelKey,
        seed: Vec<ContextMessage>,
    ) -> Result<Box<dyn Conversation>, String>;

    /// Forget anything cached for `key`. Called when a session stops using
    /// it. Live conversations created under `key` keep working.
    fn release(&self, _key: &ModelKey) {}
}

// ── ModelKey ───────────────────────────────────────────────────────

/// Everything that fixes a model's identity: who pays, which model, and
/// which system instruction. Sampling parameters are per request and not
/// part of the key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ModelKey {
    pub api_key: String,
    pub model: ModelName,
    pub instruction: String,
}

impl ModelKey {
    pub fn new(
        api_key: impl Into<String>,
        model: ModelName,
        instruction: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            model,
            instruction: instruction.into(),
        }
    }
}

impl std::fmt::Debug for ModelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelKey")
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("instruction_len", &self.instruction.len())
            .finish()
    }
}

// ── ModelCache ─────────────────────────────────────────────────────

/// Process-wide cache of configured models with explicit invalidation.
///
/// Entries live until [`invalidate`](Self::invalidate) or
/// [`clear`](Self::clear) is called.
pub struct ModelCache<K, M> {
    entries: Mutex<HashMap<K, Arc<M>>>,
}

impl<K: Eq + Hash + Clone, M> ModelCache<K, M> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached model for `key`, building it with `create` on a miss.
    ///
    /// A failed `create` caches nothing.
    pub fn get_or_try_create<E>(
        &self,
        key: &K,
        create: impl FnOnce() -> Result<M, E>,
    ) -> Result<Arc<M>, E> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(model) = entries.get(key) {
            return Ok(model.clone());
        }
        let model = Arc::new(create()?);
        entries.insert(key.clone(), model.clone());
        Ok(model)
    }

    /// Drop one entry. Returns whether it was present.
    pub fn invalidate(&self, key: &K) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Clone, M> Default for ModelCache<K, M> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Test doubles ───────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;

    /// Observations recorded by [`ScriptedService`].
    #[derive(Default)]
    pub struct Calls {
        pub started: Vec<(ModelKey, Vec<ContextMessage>)>,
        pub sent: Vec<String>,
        pub released: Vec<ModelKey>,
    }

    /// Fake service that replays scripted send results in order.
    #[derive(Clone, Default)]
    pub struct ScriptedService {
        pub calls: Arc<Mutex<Calls>>,
        script: Arc<Mutex<VecDeque<Result<Reply, String>>>>,
        pub fail_start: Option<String>,
    }

    impl ScriptedService {
        pub fn replying(replies: Vec<Result<Reply, String>>) -> Self {
            Self {
                script: Arc::new(Mutex::new(replies.into())),
                ..Default::default()
            }
        }

        pub fn failing_start(error: &str) -> Self {
            Self {
                fail_start: Some(error.to_string()),
                ..Default::default()
            }
        }

        pub fn starts(&self) -> usize {
            self.calls.lock().unwrap().started.len()
        }

        pub fn sends(&self) -> usize {
            self.calls.lock().unwrap().sent.len()
        }
    }

    pub struct ScriptedConversation {
        service: ScriptedService,
        context: Vec<ContextMessage>,
    }

    impl Conversation for ScriptedConversation {
        fn send<'a>(&'a mut self, text: &'a str, _params: &'a GenerationParams) -> SendFuture<'a> {
            Box::pin(async move {
                self.service.calls.lock().unwrap().sent.push(text.to_string());
                let next = self
                    .service
                    .script
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| Ok(Reply::text("ok")));
                let reply = next?;
                self.context.push(ContextMessage::user(text));
                self.context.push(ContextMessage::model(&reply.text));
                Ok(reply)
            })
        }

        fn context(&self) -> &[ContextMessage] {
            &self.context
        }
    }

    impl ModelService for ScriptedService {
        fn start_conversation(
            &self,
            key: &ModelKey,
            seed: Vec<ContextMessage>,
        ) -> Result<Box<dyn Conversation>, String> {
            if let Some(ref e) = self.fail_start {
                return Err(e.clone());
            }
            self.calls
                .lock()
                .unwrap()
                .started
                .push((key.clone(), seed.clone()));
            Ok(Box::new(ScriptedConversation {
                service: self.clone(),
                context: seed,
            }))
        }

        fn release(&self, key: &ModelKey) {
            self.calls.lock().unwrap().released.push(key.clone());
        }
    }
}
