//! Classification prompts.

use std::path::Path;

use serde::Deserialize;
use slides_models::PromptKind;

use crate::error::MlResult;

const CRITERIA: &str = r#"You classify screenshots from recorded lectures. Decide whether each image shows a full-screen presentation slide.

Count as "slide":
- A slide shown in presentation mode: title, bullet points, figures, charts or diagrams with clean formatting
- Slides with letterboxing or black borders caused by an aspect ratio mismatch
- Slides with a visible mouse cursor, laser pointer, pen marks, slide number, timer, or small navigation controls near the bottom edge

Count as "not_slide":
- Presentation software in edit mode (ribbons, thumbnail panes, notes pane, slide sorter)
- Word processors, spreadsheets, PDF viewers with toolbars or page thumbnails, note-taking apps
- Code editors, IDEs, terminals, database tools, notebooks
- Web browsers with address bars or tabs, email, chat, video conferencing windows
- Desktops with icons or taskbars, including classroom wallpapers that show a timetable or help text (for example titled "北京理工大学上课时间表" or "教学小助手")
- File explorers, settings panels, image viewers, video players with playback controls
- Whiteboard or annotation applications with large tool palettes or window chrome
- Blank, loading or error screens, webcam feeds, and screens mixing several windows

If the content sits inside an application window with borders and extensive toolbars it is "not_slide"; a formatted slide with only minimal overlay controls is "slide"."#;

const LIVE_FORMAT: &str = r#"Respond with ONLY one JSON object and nothing else:
{"classification": "slide"} or {"classification": "not_slide"}"#;

const RECORDED_FORMAT: &str = r#"Respond with ONLY one JSON object mapping every input image to its class, using zero-based keys in input order:
{"image_0": "slide", "image_1": "not_slide", ...}"#;

/// Built-in prompt for one live frame.
pub fn default_live_prompt() -> String {
    format!("{}\n\n{}", CRITERIA, LIVE_FORMAT)
}

/// Built-in prompt for a batch of recorded slides.
pub fn default_recorded_prompt() -> String {
    format!("{}\n\n{}", CRITERIA, RECORDED_FORMAT)
}

/// The prompt text sent for each kind of request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub live: String,
    pub recorded: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            live: default_live_prompt(),
            recorded: default_recorded_prompt(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PromptOverrides {
    live: Option<String>,
    recorded: Option<String>,
}

impl PromptSet {
    pub fn get(&self, kind: PromptKind) -> &str {
        match kind {
            PromptKind::Live => &self.live,
            PromptKind::Recorded => &self.recorded,
        }
    }

    /// Load overrides from a JSON file of the form `{"live": "...", "recorded": "..."}`.
    ///
    /// Missing or blank entries keep the built-in prompt.
    pub fn from_file(path: &Path) -> MlResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::MlError::not_configured(format!("cannot read {}: {}", path.display(), e))
        })?;
        let overrides: PromptOverrides = serde_json::from_str(&content)?;
        Ok(Self::default().with_overrides(overrides))
    }

    fn with_overrides(mut self, overrides: PromptOverrides) -> Self {
        if let Some(live) = overrides.live.filter(|s| !s.trim().is_empty()) {
            self.live = live;
        }
        if let Some(recorded) = overrides.recorded.filter(|s| !s.trim().is_empty()) {
            self.recorded = recorded;
        }
        self
    }
}
