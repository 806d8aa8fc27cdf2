//! Keyword topic classifier.
//!
//! Each explicit [`Topic`] owns a fixed, ordered keyword list. A text belongs
//! to a topic when its lowercased form contains any keyword as a plain
//! substring. There is no tokenization and no word-boundary check, so `"end"`
//! matches inside `"friend"` and `"c++"` matches inside `"src++"`.
//!
//! [`Topic::General`] is derived: it holds exactly when none of the five
//! explicit topics match.

use serde::{Deserialize, Serialize};

// ── Keyword tables ─────────────────────────────────────────────────

const PROGRAMMING_KEYWORDS: &[&str] = &[
    "code",
    "programming",
    "function",
    "variable",
    "loop",
    "algorithm",
    "debug",
    "error",
    "syntax",
    "python",
    "javascript",
    "java",
    "c++",
    "html",
    "css",
    "sql",
    "api",
    "database",
    "framework",
    "library",
    "package",
    "import",
    "class",
    "method",
    "array",
    "string",
    "integer",
    "boolean",
    "git",
    "github",
    "repository",
    "commit",
    "branch",
    "merge",
    "pull request",
    "deploy",
    "server",
    "client",
    "frontend",
    "backend",
    "fullstack",
    "web development",
    "mobile app",
    "software",
    "application",
    "script",
    "command",
    "terminal",
    "console",
    "ide",
    "editor",
];

const MENTAL_HEALTH_KEYWORDS: &[&str] = &[
    "anxiety",
    "depression",
    "stress",
    "mental health",
    "therapy",
    "counseling",
    "emotions",
    "feelings",
    "mood",
    "wellness",
    "mindfulness",
    "meditation",
    "self-care",
    "coping",
    "trauma",
    "ptsd",
    "bipolar",
    "adhd",
    "autism",
    "psychology",
    "psychiatrist",
    "therapist",
    "emotional",
    "psychological",
    "mental",
    "wellbeing",
    "happiness",
    "sadness",
    "anger",
    "fear",
    "worry",
    "panic",
    "phobia",
    "addiction",
    "recovery",
    "support",
    "help",
];

const SCIENCE_KEYWORDS: &[&str] = &[
    "science",
    "physics",
    "chemistry",
    "biology",
    "mathematics",
    "research",
    "experiment",
    "hypothesis",
    "theory",
    "scientific",
    "discovery",
    "molecule",
    "atom",
    "cell",
    "dna",
    "evolution",
    "genetics",
    "quantum",
    "relativity",
    "gravity",
    "energy",
    "force",
    "matter",
    "space",
    "universe",
    "galaxy",
    "planet",
    "star",
    "earth",
    "climate",
    "environment",
    "laboratory",
    "data",
    "analysis",
    "statistics",
    "formula",
    "equation",
    "calculation",
    "observation",
    "measurement",
    "evidence",
    "proof",
    "study",
    "investigation",
];

const STORY_KEYWORDS: &[&str] = &[
    "story",
    "storytelling",
    "narrative",
    "plot",
    "character",
    "protagonist",
    "antagonist",
    "fiction",
    "novel",
    "book",
    "writing",
    "author",
    "creative",
    "imagination",
    "fantasy",
    "adventure",
    "romance",
    "mystery",
    "thriller",
    "horror",
    "comedy",
    "drama",
    "genre",
    "chapter",
    "scene",
    "dialogue",
    "description",
    "setting",
    "theme",
    "conflict",
    "resolution",
    "beginning",
    "middle",
    "end",
    "climax",
    "twist",
    "ending",
    "character development",
    "world building",
    "pacing",
    "tone",
    "style",
    "voice",
    "point of view",
    "perspective",
];

const CHILD_PSYCHOLOGY_KEYWORDS: &[&str] = &[
    "child",
    "children",
    "kid",
    "kids",
    "toddler",
    "baby",
    "infant",
    "teenager",
    "teen",
    "parenting",
    "parent",
    "family",
    "development",
    "behavior",
    "behavioral",
    "discipline",
    "education",
    "learning",
    "school",
    "teacher",
    "classroom",
    "homework",
    "study",
    "social",
    "emotional",
    "cognitive",
    "physical",
    "milestone",
    "growth",
    "maturity",
    "tantrum",
    "aggression",
    "shyness",
    "anxiety",
    "adhd",
    "autism",
    "special needs",
    "play",
    "toys",
    "games",
    "activities",
    "creativity",
    "imagination",
    "friendship",
    "bullying",
    "peer pressure",
    "self-esteem",
    "confidence",
    "independence",
    "responsibility",
    "sleep",
    "bedtime",
    "eating",
    "nutrition",
    "screen time",
    "technology",
    "safety",
    "therapy",
    "counseling",
    "intervention",
    "support",
    "guidance",
    "advice",
];

// ── Topic ──────────────────────────────────────────────────────────

/// A subject area a message can be classified into.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    Programming,
    MentalHealth,
    Science,
    Story,
    ChildPsychology,
    /// Matches when no explicit topic does.
    General,
}

impl Topic {
    /// The five topics backed by keyword lists, in evaluation order.
    pub const EXPLICIT: [Topic; 5] = [
        Topic::Programming,
        Topic::MentalHealth,
        Topic::Science,
        Topic::Story,
        Topic::ChildPsychology,
    ];

    /// Keyword list for this topic. `General` has none.
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Topic::Programming => PROGRAMMING_KEYWORDS,
            Topic::MentalHealth => MENTAL_HEALTH_KEYWORDS,
            Topic::Science => SCIENCE_KEYWORDS,
            Topic::Story => STORY_KEYWORDS,
            Topic::ChildPsychology => CHILD_PSYCHOLOGY_KEYWORDS,
            Topic::General => &[],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Programming => "programming",
            Topic::MentalHealth => "mental-health",
            Topic::Science => "science",
            Topic::Story => "story",
            Topic::ChildPsychology => "child-psychology",
            Topic::General => "general",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Classification ─────────────────────────────────────────────────

/// Whether `text` belongs to `topic`.
///
/// Explicit topics test for any keyword as a case-insensitive substring.
/// `General` is true iff no explicit topic matches.
pub fn classify_topic_membership(text: &str, topic: Topic) -> bool {
    let lower = text.to_lowercase();
    match topic {
        Topic::General => !Topic::EXPLICIT
            .iter()
            .any(|t| contains_any(&lower, t.keywords())),
        explicit => contains_any(&lower, explicit.keywords()),
    }
}

/// Shorthand for `classify_topic_membership(text, Topic::General)`.
pub fn is_general(text: &str) -> bool {
    classify_topic_membership(text, Topic::General)
}

/// Every explicit topic that `text` matches, in [`Topic::EXPLICIT`] order.
/// Returns `[General]` when none match.
pub fn classify(text: &str) -> Vec<Topic> {
    let lower = text.to_lowercase();
    let hits: Vec<Topic> = Topic::EXPLICIT
        .iter()
        .copied()
        .filter(|t| contains_any(&lower, t.keywords()))
        .collect();
    if hits.is_empty() {
        vec![Topic::General]
    } else {
        hits
    }
}

/// The keywords of `topic` found in `text`, in list order.
pub fn matching_keywords(text: &str, topic: Topic) -> Vec<&'static str> {
    let lower = text.to_lowercase();
    topic
        .keywords()
        .iter()
        .copied()
        .filter(|k| lower.contains(k))
        .collect()
}

fn contains_any(lower: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| lower.contains(k))
}
