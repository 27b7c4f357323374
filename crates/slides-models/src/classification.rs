//! Classification verdicts and prompt kinds.

use serde::{Deserialize, Serialize};

/// Outcome of classifying one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Slide,
    NotSlide,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Slide => "slide",
            Verdict::NotSlide => "not_slide",
        }
    }

    /// Parse the literal strings the remote service answers with.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "slide" => Some(Verdict::Slide),
            "not_slide" => Some(Verdict::NotSlide),
            _ => None,
        }
    }
}

/// Which prompt to send alongside the images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    /// One frame from a live stream; answer shape `{"classification": ...}`
    Live,
    /// A batch from a recording; answer shape `{"image_0": ..., ...}`
    Recorded,
}

impl PromptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptKind::Live => "live",
            PromptKind::Recorded => "recorded",
        }
    }
}
