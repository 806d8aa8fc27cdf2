//! Role registry: assistant personas, their instructions, and topic gates.
//!
//! The multi-role page offers every [`Role`]. The single-role page uses a
//! [`RoleDefinition::fixed`] entry whose gate is [`Gate::Open`].

use serde::{Deserialize, Serialize};

use crate::ConfigError;
use crate::topic::{Topic, classify_topic_membership};

/// Default instruction for the single-role space page.
pub const SPACE_INSTRUCTION: &str = "You are a space expert assistant. You only provide information about space, astronomy, planets, stars, galaxies, and space exploration. If asked about anything else, politely redirect to space topics.";

// ── Gate ───────────────────────────────────────────────────────────

/// Predicate deciding whether a role may answer a message.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    /// Accepts every message.
    Open,
    /// Accepts messages classified into the topic.
    Topic(Topic),
}

impl Gate {
    pub fn accepts(self, text: &str) -> bool {
        match self {
            Gate::Open => true,
            Gate::Topic(topic) => classify_topic_membership(text, topic),
        }
    }
}

// ── Role ───────────────────────────────────────────────────────────

/// The roles offered by the multi-role page.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    #[default]
    CodeGenerator,
    MentalHealthConsultant,
    ScienceBuff,
    StoryWriter,
    PersonalAssistant,
    ChildPsychology,
}

impl Role {
    /// All roles in menu order. The first is the default selection.
    pub const ALL: [Role; 6] = [
        Role::CodeGenerator,
        Role::MentalHealthConsultant,
        Role::ScienceBuff,
        Role::StoryWriter,
        Role::PersonalAssistant,
        Role::ChildPsychology,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Role::CodeGenerator => "code-generator",
            Role::MentalHealthConsultant => "mental-health-consultant",
            Role::ScienceBuff => "science-buff",
            Role::StoryWriter => "story-writer",
            Role::PersonalAssistant => "personal-assistant",
            Role::ChildPsychology => "child-psychology",
        }
    }

    /// Menu label.
    pub fn display_name(self) -> &'static str {
        match self {
            Role::CodeGenerator => "Code Generator",
            Role::MentalHealthConsultant => "Mental Health Consultant",
            Role::ScienceBuff => "Science Buff",
            Role::StoryWriter => "Story Writer",
            Role::PersonalAssistant => "Personal Assistant",
            Role::ChildPsychology => "Child Psychology",
        }
    }

    /// How the role names itself in a refusal.
    pub fn refusal_label(self) -> &'static str {
        match self {
            Role::CodeGenerator => "code generator",
            Role::MentalHealthConsultant => "mental health consultant",
            Role::ScienceBuff => "science expert",
            Role::StoryWriter => "story writer",
            Role::PersonalAssistant => "personal assistant",
            Role::ChildPsychology => "child psychology expert",
        }
    }

    pub fn instruction(self) -> &'static str {
        match self {
            Role::CodeGenerator => {
                "You are a code generator assistant. You only provide programming help, code examples, debugging assistance, and technical solutions. If asked about anything else, politely redirect to programming topics."
            }
            Role::MentalHealthConsultant => {
                "You are a mental health consultant. You provide supportive, empathetic responses about mental health, wellness, and emotional support. You are not a replacement for professional therapy."
            }
            Role::ScienceBuff => {
                "You are a science expert. You provide detailed explanations about scientific concepts, research, discoveries, and scientific methodology. You make complex topics accessible and engaging."
            }
            Role::StoryWriter => {
                "You are a creative story writer. You help with storytelling, creative writing, character development, plot ideas, and narrative techniques. You inspire creativity and imagination."
            }
            Role::PersonalAssistant => {
                "You are a helpful personal assistant. You help with productivity, organization, scheduling, general knowledge, and daily tasks. You are friendly and efficient."
            }
            Role::ChildPsychology => {
                "You are a child psychology expert. You provide guidance on child development, behavioral issues, parenting strategies, educational approaches, and age-appropriate activities. You focus on healthy child development and positive parenting techniques."
            }
        }
    }

    pub fn gate(self) -> Gate {
        let topic = match self {
            Role::CodeGenerator => Topic::Programming,
            Role::MentalHealthConsultant => Topic::MentalHealth,
            Role::ScienceBuff => Topic::Science,
            Role::StoryWriter => Topic::Story,
            Role::PersonalAssistant => Topic::General,
            Role::ChildPsychology => Topic::ChildPsychology,
        };
        Gate::Topic(topic)
    }

    /// Parse a role from its id or display name, ignoring case.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let needle = s.trim();
        Role::ALL
            .into_iter()
            .find(|r| {
                r.id().eq_ignore_ascii_case(needle) || r.display_name().eq_ignore_ascii_case(needle)
            })
            .ok_or_else(|| ConfigError::UnknownRole(needle.to_string()))
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Instruction text for a role.
pub fn instruction_for(role: Role) -> &'static str {
    role.instruction()
}

/// Gate predicate for a role.
pub fn gate_for(role: Role) -> Gate {
    role.gate()
}

// ── RoleDefinition ─────────────────────────────────────────────────

/// A resolved role as the turn processor sees it.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct RoleDefinition {
    pub id: String,
    pub label: String,
    pub instruction: String,
    pub gate: Gate,
}

impl RoleDefinition {
    /// Single-role entry that answers everything.
    pub fn fixed(label: impl Into<String>, instruction: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            id: label.to_lowercase().replace(' ', "-"),
            label,
            instruction: instruction.into(),
            gate: Gate::Open,
        }
    }

    /// The space page's role, optionally with an edited instruction.
    pub fn space(instruction: Option<&str>) -> Self {
        let instruction = instruction
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(SPACE_INSTRUCTION);
        Self::fixed("space expert assistant", instruction)
    }

    pub fn accepts(&self, text: &str) -> bool {
        self.gate.accepts(text)
    }

    /// Canned reply when the gate rejects a message.
    pub fn refusal(&self) -> String {
        format!(
            "I am a {}, please select appropriate option from the settings bar.",
            self.label
        )
    }
}

impl From<Role> for RoleDefinition {
    fn from(role: Role) -> Self {
        Self {
            id: role.id().to_string(),
            label: role.refusal_label().to_string(),
            instruction: role.instruction().to_string(),
            gate: role.gate(),
        }
    }
}
