// src/editor/mod.rs
pub mod batch;
pub mod history;
pub mod object_urls;
pub mod session;
pub mod variations;
pub mod video_flow;
pub mod workflow;

pub use session::EditorSession;
pub use workflow::Workflow;
