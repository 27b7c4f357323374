//! Committed slides.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::frame::Frame;

/// Unique identifier for a committed slide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SlideId(pub String);

impl SlideId {
    /// Generate a new ID of the form `slide_{unix_ms}_{suffix}`.
    pub fn new() -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("slide_{}_{}", Utc::now().timestamp_millis(), &suffix[..9]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SlideId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SlideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Title for the `n`-th committed slide (1-based).
pub fn slide_title(n: usize) -> String {
    format!("Slide {}", n)
}

/// A frame the detector has committed as a new slide.
#[derive(Debug, Clone)]
pub struct Slide {
    pub id: SlideId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    /// Raw pixels of the committed frame.
    pub frame: Frame,
    /// PNG encoding of `frame`.
    pub encoded: Vec<u8>,
    filename: String,
}

impl Slide {
    /// Create a slide; the filename is derived here and never recomputed.
    pub fn new(title: impl Into<String>, frame: Frame, encoded: Vec<u8>) -> Self {
        let title = title.into();
        let filename = format!("{}.png", title);
        Self {
            id: SlideId::new(),
            title,
            created_at: Utc::now(),
            frame,
            encoded,
            filename,
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }
}
