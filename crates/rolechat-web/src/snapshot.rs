//! Serializable views of sessions and page metadata for REST transport.

use rolechat::config::{
    GenerationParams, MAX_OUTPUT_TOKENS_RANGE, ModelName, TEMPERATURE_RANGE, TOP_K_RANGE,
    TOP_P_RANGE,
};
use rolechat::demo::{self, WidgetForm};
use rolechat::role::SPACE_INSTRUCTION;
use rolechat::session::{Page, Session, Turn};
use serde::Serialize;

/// Serializable view of a [`Session`].
#[derive(Debug, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub page: Page,
    pub visits: u64,
    /// RFC 3339 creation time.
    pub created_at: String,
    pub turns: Vec<Turn>,
    /// Whether a model conversation is live.
    pub has_conversation: bool,
}

impl SessionSnapshot {
    /// Should be called while holding the session lock.
    pub fn from_session(session: &Session) -> Self {
        Self {
            id: session.id().to_string(),
            page: session.page(),
            visits: session.visits(),
            created_at: session.created_at().to_rfc3339(),
            turns: session.history().to_vec(),
            has_conversation: session.handle().is_some(),
        }
    }
}

// ── Page metadata ──

#[derive(Debug, Serialize)]
pub struct RoleInfo {
    pub id: &'static str,
    pub name: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Range<T> {
    pub min: T,
    pub max: T,
    pub default: T,
}

#[derive(Debug, Serialize)]
pub struct ParamRanges {
    pub temperature: Range<f32>,
    pub top_p: Range<f32>,
    pub top_k: Range<u32>,
    pub max_output_tokens: Range<u32>,
}

impl ParamRanges {
    fn new() -> Self {
        let d = GenerationParams::default();
        Self {
            temperature: Range {
                min: *TEMPERATURE_RANGE.start(),
                max: *TEMPERATURE_RANGE.end(),
                default: d.temperature,
            },
            top_p: Range {
                min: *TOP_P_RANGE.start(),
                max: *TOP_P_RANGE.end(),
                default: d.top_p,
            },
            top_k: Range {
                min: *TOP_K_RANGE.start(),
                max: *TOP_K_RANGE.end(),
                default: d.top_k,
            },
            max_output_tokens: Range {
                min: *MAX_OUTPUT_TOKENS_RANGE.start(),
                max: *MAX_OUTPUT_TOKENS_RANGE.end(),
                default: d.max_output_tokens,
            },
        }
    }
}

/// What a front end needs to render one page's controls.
#[derive(Debug, Serialize)]
pub struct PageInfo {
    pub id: Page,
    pub title: &'static str,
    pub roles: Vec<RoleInfo>,
    pub models: &'static [ModelName],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_instruction: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<ParamRanges>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<WidgetForm>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub greeting: Option<&'static str>,
}

impl PageInfo {
    pub fn for_page(page: Page) -> Self {
        let talks_to_model = page != Page::Widgets;
        Self {
            id: page,
            title: page.title(),
            roles: page
                .roles()
                .iter()
                .map(|r| RoleInfo {
                    id: r.id(),
                    name: r.display_name(),
                })
                .collect(),
            models: page.models(),
            default_instruction: (page == Page::Space).then_some(SPACE_INSTRUCTION),
            params: talks_to_model.then(ParamRanges::new),
            form: (!talks_to_model).then(WidgetForm::default),
            greeting: (!talks_to_model).then_some(demo::GREETING),
        }
    }

    pub fn all() -> Vec<Self> {
        Page::ALL.into_iter().map(Self::for_page).collect()
    }
}
