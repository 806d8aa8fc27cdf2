//! Per-user session state: the page, the ordered turn log, and the lazily
//! created conversation handle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tracing::{debug, info};

use crate::ConfigError;
use crate::config::ModelName;
use crate::demo;
use crate::model::{ContextMessage, Conversation, ModelKey, ServiceRole};
use crate::role::{Role, RoleDefinition};

// ── Turns ──────────────────────────────────────────────────────────

/// Who produced a turn.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    /// The model service's name for this speaker.
    pub fn service_role(self) -> ServiceRole {
        match self {
            Speaker::User => ServiceRole::User,
            Speaker::Assistant => ServiceRole::Model,
        }
    }
}

/// One message in the transcript. Never mutated after it is appended.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Turn {
    pub role: Speaker,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Speaker::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Speaker::Assistant,
            content: content.into(),
        }
    }
}

impl From<&Turn> for ContextMessage {
    fn from(turn: &Turn) -> Self {
        ContextMessage {
            role: turn.role.service_role(),
            text: turn.content.clone(),
        }
    }
}

// ── Pages ──────────────────────────────────────────────────────────

/// The chat pages a session can belong to.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Page {
    /// Multi-role chat with topic gates.
    Roles,
    /// Single fixed role with an editable instruction.
    Space,
    /// Widget playground with a local echo chat.
    Widgets,
}

impl Page {
    pub const ALL: [Page; 3] = [Page::Roles, Page::Space, Page::Widgets];

    pub fn as_str(self) -> &'static str {
        match self {
            Page::Roles => "roles",
            Page::Space => "space",
            Page::Widgets => "widgets",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Page::Roles => "Gemini Chat",
            Page::Space => "Space Assistant",
            Page::Widgets => "Widgets Demo",
        }
    }

    /// Models offered in this page's menu.
    pub fn models(self) -> &'static [ModelName] {
        match self {
            Page::Roles => &ModelName::FLASH,
            Page::Space => &ModelName::ALL,
            Page::Widgets => &[],
        }
    }

    /// Roles offered in this page's menu.
    pub fn roles(self) -> &'static [Role] {
        match self {
            Page::Roles => &Role::ALL,
            Page::Space | Page::Widgets => &[],
        }
    }

    /// Resolve the role a chat request runs under.
    ///
    /// `role` selects from the menu (default: first entry); `instruction`
    /// overrides the space page's instruction.
    pub fn resolve_role(
        self,
        role: Option<&str>,
        instruction: Option<&str>,
    ) -> Result<RoleDefinition, ConfigError> {
        match self {
            Page::Roles => {
                let role = role.map(Role::parse).transpose()?.unwrap_or_default();
                Ok(RoleDefinition::from(role))
            }
            Page::Space => Ok(RoleDefinition::space(instruction)),
            Page::Widgets => Err(ConfigError::NoModelChat(self.as_str())),
        }
    }

    /// Turns a fresh session of this page starts with.
    pub fn initial_turns(self) -> Vec<Turn> {
        match self {
            Page::Widgets => vec![Turn::assistant(demo::GREETING)],
            Page::Roles | Page::Space => Vec::new(),
        }
    }

    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let needle = s.trim();
        Page::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| ConfigError::UnknownPage(needle.to_string()))
    }
}

impl std::fmt::Display for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Session ────────────────────────────────────────────────────────

/// Generate a unique session ID (timestamp + counter).
pub fn generate_session_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("s-{ts:x}-{count:04x}")
}

struct Handle {
    key: ModelKey,
    conversation: Box<dyn Conversation>,
}

/// One user's chat state. Dropped when the session ends.
pub struct Session {
    id: String,
    page: Page,
    created_at: DateTime<Utc>,
    visits: u64,
    turns: Vec<Turn>,
    handle: Option<Handle>,
}

impl Session {
    pub fn new(page: Page) -> Self {
        Self::with_id(generate_session_id(), page)
    }

    pub fn with_id(id: impl Into<String>, page: Page) -> Self {
        Self {
            id: id.into(),
            page,
            created_at: Utc::now(),
            visits: 0,
            turns: page.initial_turns(),
            handle: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn page(&self) -> Page {
        self.page
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn visits(&self) -> u64 {
        self.visits
    }

    /// Count a page load. Returns the new total.
    pub fn record_visit(&mut self) -> u64 {
        self.visits += 1;
        self.visits
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// All turns in insertion order.
    pub fn history(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The live conversation, if one has been started.
    pub fn handle(&self) -> Option<&dyn Conversation> {
        self.handle.as_ref().map(|h| &*h.conversation)
    }

    /// Key the live conversation was created under.
    pub fn handle_key(&self) -> Option<&ModelKey> {
        self.handle.as_ref().map(|h| &h.key)
    }

    /// History minus the most recent turn, in service vocabulary.
    fn seed(&self) -> Vec<ContextMessage> {
        let prior = self.turns.len().saturating_sub(1);
        self.turns[..prior].iter().map(ContextMessage::from).collect()
    }

    /// Return the conversation for `key`, creating it with `factory` if
    /// there is none.
    ///
    /// The factory receives every turn except the last one appended. A
    /// handle created under a different key is dropped and replaced. A
    /// failed factory leaves the session without a handle.
    pub fn ensure_handle<F>(
        &mut self,
        key: &ModelKey,
        factory: F,
    ) -> Result<&mut dyn Conversation, String>
    where
        F: FnOnce(Vec<ContextMessage>) -> Result<Box<dyn Conversation>, String>,
    {
        let handle = match self.handle.take() {
            Some(existing) if existing.key == *key => existing,
            stale => {
                if stale.is_some() {
                    info!(
                        "Session {}: model settings changed, reseeding conversation",
                        self.id
                    );
                }
                let seed = self.seed();
                debug!(
                    "Session {}: starting conversation with {} seed messages",
                    self.id,
                    seed.len()
                );
                Handle {
                    key: key.clone(),
                    conversation: factory(seed)?,
                }
            }
        };
        Ok(self.handle.insert(handle).conversation.as_mut())
    }

    /// Drop the live conversation. The next accepted message reseeds one
    /// from history.
    pub fn invalidate_handle(&mut self) -> bool {
        self.handle.take().is_some()
    }

    /// Drop all turns and the conversation.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.handle = None;
    }

    /// Back to the page's initial state. The visit counter is kept.
    pub fn reset(&mut self) {
        self.clear();
        self.turns = self.page.initial_turns();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("page", &self.page)
            .field("visits", &self.visits)
            .field("turns", &self.turns.len())
            .field("handle", &self.handle_key())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelService;
    use crate::model::testing::ScriptedService;

    fn key(instruction: &str) -> ModelKey {
        ModelKey::new("k", ModelName::Gemini20Flash, instruction)
    }

    #[test]
    fn seed_excludes_latest_turn_and_translates_roles() {
        let service = ScriptedService::default();
        let mut session = Session::new(Page::Roles);
        session.append(Turn::user("a"));
        session.append(Turn::assistant("b"));
        session.append(Turn::user("c"));

        session
            .ensure_handle(&key("x"), |seed| service.start_conversation(&key("x"), seed))
            .unwrap();

        let calls = service.calls.lock().unwrap();
        let (_, seed) = &calls.started[0];
        assert_eq!(
            seed,
            &vec![ContextMessage::user("a"), ContextMessage::model("b")]
        );
        assert_eq!(seed[1].role, ServiceRole::Model);
    }

    #[test]
    fn ensure_handle_is_idempotent_for_same_key() {
        let mut session = Session::new(Page::Roles);
        session.append(Turn::user("first"));
        let mut created = 0;
        for _ in 0..3 {
            session
                .ensure_handle(&key("x"), |seed| {
                    created += 1;
                    ScriptedService::default().start_conversation(&key("x"), seed)
                })
                .unwrap();
            session.append(Turn::user("more"));
        }
        assert_eq!(created, 1);
        assert!(session.handle().is_some());
    }

    #[test]
    fn key_change_reseeds_from_full_prior_history() {
        let service = ScriptedService::default();
        let mut session = Session::new(Page::Space);
        session.append(Turn::user("one"));
        session
            .ensure_handle(&key("x"), |seed| service.start_conversation(&key("x"), seed))
            .unwrap();
        session.append(Turn::assistant("two"));
        session.append(Turn::user("three"));

        session
            .ensure_handle(&key("y"), |seed| service.start_conversation(&key("y"), seed))
            .unwrap();

        assert_eq!(service.starts(), 2);
        let calls = service.calls.lock().unwrap();
        assert_eq!(calls.started[1].1.len(), 2);
        assert_eq!(session.handle_key(), Some(&key("y")));
    }

    #[test]
    fn failed_factory_leaves_no_handle() {
        let mut session = Session::new(Page::Roles);
        session.append(Turn::user("hi"));
        let err = session
            .ensure_handle(&key("x"), |_| Err("no network".to_string()))
            .err();
        assert_eq!(err.as_deref(), Some("no network"));
        assert!(session.handle().is_none());
    }

    #[test]
    fn first_message_seeds_nothing() {
        let service = ScriptedService::default();
        let mut session = Session::new(Page::Roles);
        session.append(Turn::user("only"));
        session
            .ensure_handle(&key("x"), |seed| service.start_conversation(&key("x"), seed))
            .unwrap();
        assert!(service.calls.lock().unwrap().started[0].1.is_empty());
    }

    #[test]
    fn clear_and_reset() {
        let mut session = Session::new(Page::Widgets);
        assert_eq!(session.history(), &[Turn::assistant(demo::GREETING)]);
        session.append(Turn::user("hey"));
        session.record_visit();

        session.reset();
        assert_eq!(session.len(), 1);
        assert_eq!(session.visits(), 1);

        session.clear();
        assert!(session.is_empty());
        assert!(!session.invalidate_handle());
    }

    #[test]
    fn page_resolves_roles() {
        let def = Page::Roles.resolve_role(Some("story-writer"), None).unwrap();
        assert_eq!(def, RoleDefinition::from(Role::StoryWriter));

        let def = Page::Roles.resolve_role(None, Some("ignored")).unwrap();
        assert_eq!(def, RoleDefinition::from(Role::CodeGenerator));

        let def = Page::Space.resolve_role(Some("ignored"), Some("Mars only")).unwrap();
        assert_eq!(def.instruction, "Mars only");

        assert!(matches!(
            Page::Widgets.resolve_role(None, None),
            Err(ConfigError::NoModelChat("widgets"))
        ));
        assert!(matches!(
            Page::Roles.resolve_role(Some("wizard"), None),
            Err(ConfigError::UnknownRole(_))
        ));
    }

    #[test]
    fn page_parse_and_menus() {
        assert_eq!(Page::parse("Space").unwrap(), Page::Space);
        assert!(matches!(Page::parse("admin"), Err(ConfigError::UnknownPage(_))));
        assert_eq!(Page::Roles.models().len(), 3);
        assert_eq!(Page::Space.models().len(), 5);
        assert!(Page::Widgets.roles().is_empty());
    }

    #[test]
    fn turn_serializes_role_names() {
        let json = serde_json::to_value(Turn::assistant("hi")).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "hi");
    }

    #[test]
    fn session_ids_are_unique() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_ne!(a, b);
        assert!(a.starts_with("s-"));
    }
}
