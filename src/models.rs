// src/models.rs
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable image blob. Edits never mutate one in place, they produce a new resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageResource {
    pub id: Uuid,
    pub name: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl ImageResource {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// A new resource that keeps this one's display name.
    pub fn derive(&self, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self::new(self.name.clone(), mime_type, data)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoResource {
    pub id: Uuid,
    pub mime_type: String,
    pub data: Bytes,
}

impl VideoResource {
    pub fn new(mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            id: Uuid::new_v4(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }
}

/// Point in the image's natural pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hotspot {
    pub x: u32,
    pub y: u32,
}

/// Point in on-screen (scaled) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplaySize {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Rectangle in natural pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Retouch,
    Crop,
    Filter,
    Adjust,
    Video,
    Reference,
    Character,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    Normal,
    Multiply,
    Screen,
    Overlay,
    SoftLight,
    Luminosity,
}

impl BlendMode {
    pub fn describe(&self) -> &'static str {
        match self {
            BlendMode::Normal => "a natural, even blend",
            BlendMode::Multiply => "a multiply blend that deepens shadows and darker tones",
            BlendMode::Screen => "a screen blend that lifts highlights and brightens",
            BlendMode::Overlay => "an overlay blend that boosts contrast",
            BlendMode::SoftLight => "a soft-light blend with gentle contrast",
            BlendMode::Luminosity => "a luminosity blend that keeps the original colours",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleTransferParams {
    pub prompt: String,
    pub style_influence: f32,
    pub color_transfer: f32,
    pub blend_mode: BlendMode,
    #[serde(default)]
    pub negative_prompt: String,
}

/// A generation request as submitted by the client, before session state is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EditOperation {
    Retouch {
        prompt: String,
        #[serde(default)]
        brush_size: Option<u32>,
    },
    Filter {
        prompt: String,
    },
    Adjust {
        prompt: String,
    },
    Reference(StyleTransferParams),
    Character {
        prompt: String,
    },
}

impl EditOperation {
    pub fn tool(&self) -> Tool {
        match self {
            EditOperation::Retouch { .. } => Tool::Retouch,
            EditOperation::Filter { .. } => Tool::Filter,
            EditOperation::Adjust { .. } => Tool::Adjust,
            EditOperation::Reference(_) => Tool::Reference,
            EditOperation::Character { .. } => Tool::Character,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchOperation {
    Filter,
    Adjust,
}

impl BatchOperation {
    pub fn label(&self) -> &'static str {
        match self {
            BatchOperation::Filter => "filter",
            BatchOperation::Adjust => "adjustment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceMode {
    Empty,
    Single,
    Batch,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub mode: WorkspaceMode,
    pub tool: Tool,
    pub loading: bool,
    pub progress_message: Option<String>,
    pub error: Option<String>,
    pub display_url: Option<String>,
    pub history: Option<HistoryView>,
    pub batch: Option<BatchView>,
    pub hotspot: Option<Hotspot>,
    pub crop_selection: Option<CropRect>,
    pub variations: Option<VariationView>,
    pub video: VideoView,
    pub reference_name: Option<String>,
    pub character_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryView {
    pub cursor: usize,
    pub length: usize,
    pub can_undo: bool,
    pub can_redo: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchView {
    pub active_index: usize,
    pub pairs: Vec<BatchPairView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchPairView {
    pub name: String,
    pub edited: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct VariationView {
    pub candidate_urls: Vec<String>,
    pub previewed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoView {
    pub state: &'static str,
    pub video_url: Option<String>,
    pub frame_url: Option<String>,
}
