//! Role-gated Gemini chat sessions.
//!
//! `rolechat` holds everything a chat page needs short of rendering: a
//! keyword [`topic`] classifier, the [`role`] registry with per-role topic
//! gates, per-user [`session`] state, and the [`turn`] processor that ties
//! them to a hosted model through the [`model::ModelService`] boundary.
//! [`gemini`] provides the production service on top of the Gemini
//! `generateContent` REST API.
//!
//! # Getting started
//!
//! ```ignore
//! use rolechat::prelude::*;
//!
//! let service = GeminiService::new(&GeminiConfig::default())?;
//! let mut session = Session::new(Page::Roles);
//! let settings = ChatSettings::new(api_key, ModelName::Gemini20Flash);
//! let role = RoleDefinition::from(Role::CodeGenerator);
//!
//! let turn = submit(&mut session, &role, "why does my python loop never end?", &settings, &service).await?;
//! println!("{}", turn.content);
//! ```
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`topic`] | Case-insensitive keyword membership per topic |
//! | [`role`] | Role enum, instructions, gates, refusal text |
//! | [`config`] | Model names, generation parameters, settings validation |
//! | [`model`] | Service traits, model key, model cache |
//! | [`gemini`] | Gemini REST client and [`ModelService`](model::ModelService) impl |
//! | [`session`] | Turns, pages, and the lazily created conversation handle |
//! | [`turn`] | One chat submission from user text to assistant turn |
//! | [`demo`] | Widget form summary and echo chat for the widgets page |

pub mod config;
pub mod demo;
pub mod gemini;
pub mod model;
pub mod role;
pub mod session;
pub mod topic;
pub mod turn;

/// Substituted when the model returns an empty reply.
pub const EMPTY_RESPONSE_PLACEHOLDER: &str = "(No response generated)";

/// Configuration problems that stop a turn before anything is recorded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Please enter your Gemini API key in the sidebar.")]
    MissingApiKey,
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),
    #[error("{name} = {value} is outside {range}")]
    ParameterOutOfRange {
        name: &'static str,
        value: String,
        range: String,
    },
    #[error("unknown role: {0}")]
    UnknownRole(String),
    #[error("unknown page: {0}")]
    UnknownPage(String),
    #[error("the {0} page does not talk to a model")]
    NoModelChat(&'static str),
}

/// Common imports for building a chat front end.
pub mod prelude {
    pub use crate::ConfigError;
    pub use crate::config::{ChatSettings, GenerationParams, ModelName};
    pub use crate::gemini::{GeminiConfig, GeminiService};
    pub use crate::model::{Conversation, ModelKey, ModelService, Reply};
    pub use crate::role::{Gate, Role, RoleDefinition};
    pub use crate::session::{Page, Session, Speaker, Turn};
    pub use crate::topic::Topic;
    pub use crate::turn::submit;
}
