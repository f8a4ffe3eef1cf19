//! Core domain types for Folio.

use serde::{Deserialize, Serialize};

/// Key of the single persisted session record.
pub const SESSION_KEY: &str = "current";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub default_scale: f32,
    pub default_inverted: bool,
    pub thumbnail_scale: f32,
    pub visibility_threshold: f32,
    pub instant_settle_ms: u64,
    pub smooth_settle_ms: u64,
    pub zoom_step: f32,
    pub min_scale: f32,
    pub max_render_failures: u32,
    pub main_root_margin_px: u32,
    pub thumbnail_root_margin_px: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_scale: 1.0,
            default_inverted: true,
            thumbnail_scale: 0.15,
            visibility_threshold: 0.05,
            instant_settle_ms: 100,
            smooth_settle_ms: 800,
            zoom_step: 0.2,
            min_scale: 0.4,
            max_render_failures: 3,
            main_root_margin_px: 600,
            thumbnail_root_margin_px: 300,
        }
    }
}

impl Settings {
    pub fn normalize(&mut self) {
        let defaults = Settings::default();
        if !self.min_scale.is_finite() || self.min_scale <= 0.0 {
            self.min_scale = defaults.min_scale;
        }
        if !self.zoom_step.is_finite() || self.zoom_step <= 0.0 {
            self.zoom_step = defaults.zoom_step;
        }
        if !self.default_scale.is_finite() {
            self.default_scale = defaults.default_scale;
        }
        self.default_scale = snap_scale(self.default_scale.max(self.min_scale));
        if !self.thumbnail_scale.is_finite() || self.thumbnail_scale <= 0.0 {
            self.thumbnail_scale = defaults.thumbnail_scale;
        }
        self.thumbnail_scale = self.thumbnail_scale.clamp(0.05, 1.0);
        if !self.visibility_threshold.is_finite() {
            self.visibility_threshold = defaults.visibility_threshold;
        }
        self.visibility_threshold = self.visibility_threshold.clamp(0.0, 0.95);
        self.instant_settle_ms = self.instant_settle_ms.clamp(1, 5_000);
        self.smooth_settle_ms = self.smooth_settle_ms.clamp(1, 10_000);
        self.max_render_failures = self.max_render_failures.max(1);
    }
}

/// Rounds a scale onto the 0.01 grid so repeated steps do not drift.
pub fn snap_scale(scale: f32) -> f32 {
    (scale * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    Main,
    Thumbnail,
}

impl ViewKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewKind::Main => "main",
            ViewKind::Thumbnail => "thumbnail",
        }
    }
}

impl std::fmt::Display for ViewKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Unrendered,
    Rendering,
    Rendered,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            width: self.width * factor,
            height: self.height * factor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaBitmap {
    pub width: usize,
    pub height: usize,
    pub stride: usize,
    pub pixels: Vec<u8>,
}

impl RgbaBitmap {
    pub fn size(&self) -> PageSize {
        PageSize::new(self.width as f32, self.height as f32)
    }
}

/// Reference to a location inside the document (an indirect page object).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocationRef {
    pub object: u64,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Named(String),
    Explicit(LocationRef),
}

/// Outline node as delivered by the document engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineNode {
    pub title: String,
    pub destination: Option<Destination>,
    pub children: Vec<OutlineNode>,
}

impl OutlineNode {
    pub fn new(title: impl Into<String>, destination: Option<Destination>) -> Self {
        Self {
            title: title.into(),
            destination,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<OutlineNode>) -> Self {
        self.children = children;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("document has no pages")]
    Empty,
    #[error("malformed document: {0}")]
    Malformed(String),
    #[error("unsupported document: {0}")]
    Unsupported(String),
    #[error("document engine unavailable: {0}")]
    EngineUnavailable(String),
}

/// An opened document. Page numbers are 1-based everywhere except
/// `location_to_page_index`, which returns the engine's 0-based index.
pub trait Document {
    fn page_count(&self) -> u32;

    fn page_size(&self, page: u32, scale: f32) -> anyhow::Result<PageSize>;

    fn render_page(&self, page: u32, scale: f32) -> anyhow::Result<RgbaBitmap>;

    fn outline(&self) -> anyhow::Result<Vec<OutlineNode>>;

    fn resolve_named_destination(&self, name: &str) -> anyhow::Result<LocationRef>;

    fn location_to_page_index(&self, location: LocationRef) -> anyhow::Result<u32>;
}

pub trait DocumentEngine {
    type Document: Document;

    fn open(&self, content: &[u8]) -> Result<Self::Document, LoadError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadingPosition {
    pub page: u32,
    pub scale: f32,
    pub inverted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub content: Vec<u8>,
    pub name: String,
    pub page: u32,
    pub scale: f32,
    pub inverted: bool,
    pub timestamp: i64,
}

impl Session {
    pub fn position(&self) -> ReadingPosition {
        ReadingPosition {
            page: self.page,
            scale: self.scale,
            inverted: self.inverted,
        }
    }
}

/// Persistent store for the single reading session.
pub trait SessionGateway {
    fn save(&self, session: &Session) -> anyhow::Result<()>;

    fn load(&self) -> anyhow::Result<Option<Session>>;

    /// Updates page/scale/theme of the saved session; no-op when nothing was saved.
    fn update_progress(&self, position: &ReadingPosition) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub current_page: u32,
    pub total_pages: u32,
}

impl Progress {
    pub fn percent(&self) -> f32 {
        if self.total_pages == 0 {
            0.0
        } else {
            (self.current_page as f32 / self.total_pages as f32) * 100.0
        }
    }
}

pub fn zoom_label(scale: f32) -> String {
    format!("{}%", (scale * 100.0).round() as i64)
}

/// Label of the theme toggle: it offers the mode you would switch to.
pub fn theme_toggle_label(inverted: bool) -> &'static str {
    if inverted { "day" } else { "night" }
}
