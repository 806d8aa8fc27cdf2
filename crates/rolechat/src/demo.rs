//! Widgets page helpers: the form summary and the local echo chat.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

use crate::ConfigError;

/// First assistant turn of a widgets session.
pub const GREETING: &str = "Hello! Ask me anything about these widgets.";

pub const AGE_RANGE: RangeInclusive<u32> = 0..=120;
pub const CONFIDENCE_RANGE: RangeInclusive<u32> = 0..=100;
pub const CONFIDENCE_STEP: u32 = 5;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mood {
    Happy,
    #[default]
    Curious,
    Productive,
    Sleepy,
}

impl Mood {
    pub const ALL: [Mood; 4] = [Mood::Happy, Mood::Curious, Mood::Productive, Mood::Sleepy];

    pub fn as_str(self) -> &'static str {
        match self {
            Mood::Happy => "Happy",
            Mood::Curious => "Curious",
            Mood::Productive => "Productive",
            Mood::Sleepy => "Sleepy",
        }
    }
}

impl std::fmt::Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Values of the widgets page form.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct WidgetForm {
    pub name: String,
    pub age: u32,
    pub likes_streamlit: bool,
    pub mood: Mood,
    /// Percent, in steps of [`CONFIDENCE_STEP`].
    pub confidence: u32,
}

impl Default for WidgetForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            age: 25,
            likes_streamlit: true,
            mood: Mood::Curious,
            confidence: 70,
        }
    }
}

impl WidgetForm {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !AGE_RANGE.contains(&self.age) {
            return Err(ConfigError::ParameterOutOfRange {
                name: "age",
                value: self.age.to_string(),
                range: "0..=120".into(),
            });
        }
        validate_confidence(self.confidence)
    }

    /// One-line description of the form, e.g.
    /// `Name: Ada | Age: 36 | Mood: Happy | Cool: True | Confidence: 90%`.
    pub fn summary(&self) -> String {
        let name = if self.name.is_empty() {
            "Anonymous"
        } else {
            self.name.as_str()
        };
        let cool = if self.likes_streamlit { "True" } else { "False" };
        format!(
            "Name: {name} | Age: {} | Mood: {} | Cool: {cool} | Confidence: {}%",
            self.age, self.mood, self.confidence
        )
    }
}

/// UTF-8 length of `text` in bytes.
pub fn byte_len(text: &str) -> usize {
    text.len()
}

pub fn validate_confidence(level: u32) -> Result<(), ConfigError> {
    if !CONFIDENCE_RANGE.contains(&level) || level % CONFIDENCE_STEP != 0 {
        return Err(ConfigError::ParameterOutOfRange {
            name: "confidence",
            value: level.to_string(),
            range: format!("0..=100 step {CONFIDENCE_STEP}"),
        });
    }
    Ok(())
}

/// Echo chat reply for the widgets page.
pub fn echo_reply(prompt: &str, confidence: u32) -> String {
    format!("You said: **{prompt}**. By the way, confidence level is set to {confidence}%.")
}
