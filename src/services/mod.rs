// src/services/mod.rs
pub mod frame_extractor;
pub mod gemini_service;
pub mod image_processor;
pub mod session_store;

pub use frame_extractor::{FfmpegFrameExtractor, FrameExtractor};
pub use gemini_service::{GeminiService, GenerativeBackend, VideoStatus};
pub use image_processor::ImageProcessor;
pub use session_store::SessionStore;
