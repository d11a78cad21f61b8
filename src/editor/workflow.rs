// src/editor/workflow.rs
use crate::config::AppConfig;
use crate::editor::session::{CommitTarget, EditorSession, Workspace};
use crate::editor::video_flow::VideoState;
use crate::errors::PixshopError;
use crate::models::*;
use crate::services::image_processor::ImageProcessor;
use crate::services::session_store::SharedSession;
use crate::services::{FrameExtractor, GenerativeBackend, VideoStatus};
use futures_util::future::try_join_all;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const DEFAULT_BRUSH_SIZE: u32 = 50;

/// A request with every input resolved from the session at dispatch time.
#[derive(Debug, Clone)]
pub enum GenerationRequest {
    Retouch {
        image: ImageResource,
        prompt: String,
        hotspot: Hotspot,
        brush_size: u32,
    },
    Filter {
        image: ImageResource,
        prompt: String,
    },
    Adjust {
        image: ImageResource,
        prompt: String,
    },
    StyleTransfer {
        image: ImageResource,
        reference: ImageResource,
        params: StyleTransferParams,
    },
    CharacterScene {
        references: Vec<ImageResource>,
        prompt: String,
    },
}

#[derive(Debug)]
pub struct PreparedGeneration {
    pub request: GenerationRequest,
    pub target: CommitTarget,
}

#[derive(Debug)]
pub struct PreparedBatch {
    operation: BatchOperation,
    prompt: String,
    originals: Vec<ImageResource>,
}

#[derive(Debug)]
pub struct PreparedVideo {
    seed: ImageResource,
    prompt: String,
}

#[derive(Debug)]
pub struct PreparedExtend {
    video: VideoResource,
}

/// Returns the flow to `reviewing` if extraction is abandoned before it settles.
struct ExtractGuard {
    session: SharedSession,
    armed: bool,
}

impl Drop for ExtractGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.session.try_lock() {
            Ok(mut session) => abandon_extract(&mut session),
            Err(_) => {
                let session = self.session.clone();
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        abandon_extract(&mut *session.lock().await);
                    });
                }
            }
        }
    }
}

fn abandon_extract(session: &mut EditorSession) {
    if !matches!(session.video.state(), VideoState::ExtractingFrame { .. }) {
        return;
    }
    let err = PixshopError::Transport("Frame extraction was interrupted.".to_string());
    warn!("session {}: {}", session.id(), err);
    let _ = session
        .video
        .finish_extract(Err(err.clone()), &mut session.urls);
    session.fail(&err);
}

/// Dispatches generation features against the backend and writes results into the session.
///
/// Each operation comes in two halves: `prepare_*` validates and flips the loading flag
/// under the session lock, `run_*` awaits the backend without holding it.
pub struct Workflow {
    backend: Arc<dyn GenerativeBackend>,
    frames: Arc<dyn FrameExtractor>,
    variation_count: usize,
    poll_interval: Duration,
    video_timeout: Option<Duration>,
}

impl Workflow {
    pub fn new(
        backend: Arc<dyn GenerativeBackend>,
        frames: Arc<dyn FrameExtractor>,
        config: &AppConfig,
    ) -> Self {
        Self {
            backend,
            frames,
            variation_count: config.variation_count,
            poll_interval: config.video_poll_interval,
            video_timeout: config.video_timeout,
        }
    }

    pub fn prepare_generation(
        &self,
        session: &mut EditorSession,
        operation: EditOperation,
    ) -> Result<PreparedGeneration, PixshopError> {
        let image = session
            .current_image()
            .cloned()
            .ok_or_else(|| PixshopError::validation("Please upload an image first."))?;
        let target = session.commit_target()?;
        let tool = operation.tool();

        let (request, message) = match operation {
            EditOperation::Retouch { prompt, brush_size } => {
                let prompt = required(prompt, "Please enter a description for your edit.")?;
                let hotspot = session.hotspot().ok_or_else(|| {
                    PixshopError::validation("Please click on the image to select an area to edit.")
                })?;
                (
                    GenerationRequest::Retouch {
                        image,
                        prompt,
                        hotspot,
                        brush_size: brush_size.unwrap_or(DEFAULT_BRUSH_SIZE),
                    },
                    "AI is retouching your image...",
                )
            }
            EditOperation::Filter { prompt } => (
                GenerationRequest::Filter {
                    image,
                    prompt: required(prompt, "Please choose or describe a filter.")?,
                },
                "Applying filter...",
            ),
            EditOperation::Adjust { prompt } => (
                GenerationRequest::Adjust {
                    image,
                    prompt: required(prompt, "Please choose or describe an adjustment.")?,
                },
                "Applying adjustment...",
            ),
            EditOperation::Reference(params) => {
                let reference = session.reference_image().cloned().ok_or_else(|| {
                    PixshopError::validation("Please upload a reference image.")
                })?;
                check_unit("Style influence", params.style_influence)?;
                check_unit("Colour transfer", params.color_transfer)?;
                (
                    GenerationRequest::StyleTransfer {
                        image,
                        reference,
                        params,
                    },
                    "Transferring style from your reference...",
                )
            }
            EditOperation::Character { prompt } => {
                let prompt = required(prompt, "Please describe the scene for your character.")?;
                let mut references = vec![image];
                references.extend(session.character_images().iter().cloned());
                if references.len() < 2 {
                    return Err(PixshopError::validation(
                        "Character scenes need at least two reference images.",
                    ));
                }
                (
                    GenerationRequest::CharacterScene { references, prompt },
                    "Generating a consistent character scene...",
                )
            }
        };

        session.select_tool(tool);
        session.begin_loading(message);
        Ok(PreparedGeneration { request, target })
    }

    /// Requests N candidates and opens the variation gate with them.
    pub async fn run_generation(
        &self,
        session: &Mutex<EditorSession>,
        prepared: PreparedGeneration,
    ) -> Result<(), PixshopError> {
        let result = self.generate_variations(&prepared.request).await;

        let mut session = session.lock().await;
        let opened = result.and_then(|candidates| {
            info!(
                "session {}: {} variations ready",
                session.id(),
                candidates.len()
            );
            session.open_variations(candidates, prepared.target)
        });
        if let Err(err) = &opened {
            warn!("session {}: generation failed: {}", session.id(), err);
            session.fail(err);
        }
        opened
    }

    pub async fn generate(
        &self,
        session: &Mutex<EditorSession>,
        operation: EditOperation,
    ) -> Result<(), PixshopError> {
        let prepared = {
            let mut guard = session.lock().await;
            self.prepare_generation(&mut guard, operation)?
        };
        self.run_generation(session, prepared).await
    }

    pub async fn generate_variations(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<ImageResource>, PixshopError> {
        try_join_all((0..self.variation_count).map(|_| self.run_once(request))).await
    }

    async fn run_once(&self, request: &GenerationRequest) -> Result<ImageResource, PixshopError> {
        match request {
            GenerationRequest::Retouch {
                image,
                prompt,
                hotspot,
                brush_size,
            } => {
                self.backend
                    .edit_image(image, prompt, *hotspot, *brush_size)
                    .await
            }
            GenerationRequest::Filter { image, prompt } => {
                self.backend.filter_image(image, prompt).await
            }
            GenerationRequest::Adjust { image, prompt } => {
                self.backend.adjust_image(image, prompt).await
            }
            GenerationRequest::StyleTransfer {
                image,
                reference,
                params,
            } => self.backend.style_transfer(image, reference, params).await,
            GenerationRequest::CharacterScene { references, prompt } => {
                self.backend
                    .generate_character_scene(references, prompt)
                    .await
            }
        }
    }

    /// Crops locally and commits straight away; no variations for crops.
    pub fn apply_crop(
        &self,
        session: &mut EditorSession,
        processor: &ImageProcessor,
    ) -> Result<(), PixshopError> {
        let rect = session
            .crop_selection()
            .ok_or_else(|| PixshopError::validation("Please select an area to crop."))?;
        let image = session
            .current_image()
            .cloned()
            .ok_or_else(|| PixshopError::validation("Please upload an image first."))?;
        let target = session.commit_target()?;

        match processor.crop(&image, rect) {
            Ok(cropped) => session.commit(target, cropped),
            Err(err @ PixshopError::Validation(_)) => Err(err),
            Err(err) => {
                session.fail(&err);
                Err(err)
            }
        }
    }

    pub fn prepare_batch(
        &self,
        session: &mut EditorSession,
        operation: BatchOperation,
        prompt: String,
    ) -> Result<PreparedBatch, PixshopError> {
        let prompt = required(prompt, "Please describe the edit to apply to every image.")?;
        let originals: Vec<ImageResource> = match session.workspace() {
            Workspace::Batch(batch) if !batch.is_empty() => batch
                .pairs()
                .iter()
                .map(|pair| pair.original().clone())
                .collect(),
            _ => return Err(PixshopError::validation("Batch apply needs several images.")),
        };
        session.begin_loading(batch_progress(operation, 0, originals.len()));
        Ok(PreparedBatch {
            operation,
            prompt,
            originals,
        })
    }

    /// Sequential, abort on first failure, keeps what already succeeded.
    pub async fn run_batch(
        &self,
        session: &Mutex<EditorSession>,
        prepared: PreparedBatch,
    ) -> Result<usize, PixshopError> {
        let total = prepared.originals.len();
        for (index, original) in prepared.originals.iter().enumerate() {
            if index > 0 {
                session
                    .lock()
                    .await
                    .set_progress(batch_progress(prepared.operation, index, total));
            }

            let result = match prepared.operation {
                BatchOperation::Filter => self.backend.filter_image(original, &prepared.prompt).await,
                BatchOperation::Adjust => self.backend.adjust_image(original, &prepared.prompt).await,
            };

            let mut guard = session.lock().await;
            let committed = result.and_then(|edited| {
                guard.commit(
                    CommitTarget::BatchPair {
                        index,
                        original: original.id,
                    },
                    edited,
                )
            });
            if let Err(err) = committed {
                let err = PixshopError::BatchFailed {
                    index,
                    total,
                    message: err.to_string(),
                };
                warn!("session {}: {}", guard.id(), err);
                guard.fail(&err);
                return Err(err);
            }
            debug!("session {}: batch image {} of {} done", guard.id(), index + 1, total);
        }

        session.lock().await.finish_loading();
        Ok(total)
    }

    pub async fn batch_apply(
        &self,
        session: &Mutex<EditorSession>,
        operation: BatchOperation,
        prompt: String,
    ) -> Result<usize, PixshopError> {
        let prepared = {
            let mut guard = session.lock().await;
            self.prepare_batch(&mut guard, operation, prompt)?
        };
        self.run_batch(session, prepared).await
    }

    pub fn prepare_video(
        &self,
        session: &mut EditorSession,
        prompt: String,
    ) -> Result<PreparedVideo, PixshopError> {
        let editor_image = session.current_image().cloned();
        let seed = session
            .video
            .start(editor_image.as_ref(), &prompt, &mut session.urls)?;
        session.begin_loading("Generating your video. This can take a few minutes...");
        Ok(PreparedVideo { seed, prompt })
    }

    pub async fn run_video(
        &self,
        session: &Mutex<EditorSession>,
        prepared: PreparedVideo,
    ) -> Result<(), PixshopError> {
        let result = self.produce_video(&prepared.seed, &prepared.prompt).await;

        let mut guard = session.lock().await;
        let session = &mut *guard;
        match session.video.finish_generate(result, &mut session.urls) {
            Ok(()) => {
                session.finish_loading();
                Ok(())
            }
            Err(err) => {
                session.fail(&err);
                Err(err)
            }
        }
    }

    pub async fn generate_video(
        &self,
        session: &Mutex<EditorSession>,
        prompt: String,
    ) -> Result<(), PixshopError> {
        let prepared = {
            let mut guard = session.lock().await;
            self.prepare_video(&mut guard, prompt)?
        };
        self.run_video(session, prepared).await
    }

    /// Starts the remote job and polls it at a fixed interval until it settles.
    async fn produce_video(
        &self,
        seed: &ImageResource,
        prompt: &str,
    ) -> Result<VideoResource, PixshopError> {
        let operation = self.backend.generate_video(seed, prompt).await?;
        let started = Instant::now();
        loop {
            tokio::time::sleep(self.poll_interval).await;
            match self.backend.poll_video_status(&operation).await? {
                VideoStatus::Done(video) => {
                    info!("Video operation {} finished", operation.name);
                    return Ok(video);
                }
                VideoStatus::Failed(message) => return Err(PixshopError::Rejected(message)),
                VideoStatus::Pending => {
                    if let Some(limit) = self.video_timeout {
                        if started.elapsed() >= limit {
                            return Err(PixshopError::Transport(format!(
                                "Video generation timed out after {} seconds.",
                                limit.as_secs()
                            )));
                        }
                    }
                }
            }
        }
    }

    pub fn prepare_extend(&self, session: &mut EditorSession) -> Result<PreparedExtend, PixshopError> {
        let video = session.video.begin_extend()?;
        session.begin_loading("Extracting the last frame...");
        Ok(PreparedExtend { video })
    }

    /// Extracts the last frame of the reviewed video to seed a follow-up.
    pub async fn run_extend(
        &self,
        session: SharedSession,
        prepared: PreparedExtend,
    ) -> Result<(), PixshopError> {
        let mut guard = ExtractGuard {
            session,
            armed: true,
        };
        let result = self.frames.extract_last_frame(&prepared.video).await;

        let mut locked = guard.session.lock().await;
        guard.armed = false;
        let session = &mut *locked;
        match session.video.finish_extract(result, &mut session.urls) {
            Ok(()) => {
                session.finish_loading();
                Ok(())
            }
            Err(err) => {
                session.fail(&err);
                Err(err)
            }
        }
    }

    pub async fn extend_video(&self, session: &SharedSession) -> Result<(), PixshopError> {
        let prepared = {
            let mut guard = session.lock().await;
            self.prepare_extend(&mut guard)?
        };
        self.run_extend(session.clone(), prepared).await
    }
}

fn required(value: String, message: &str) -> Result<String, PixshopError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(PixshopError::validation(message))
    } else {
        Ok(trimmed.to_string())
    }
}

fn check_unit(label: &str, value: f32) -> Result<(), PixshopError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PixshopError::validation(format!(
            "{} must be between 0 and 1.",
            label
        )))
    }
}

fn batch_progress(operation: BatchOperation, index: usize, total: usize) -> String {
    format!(
        "Applying {} to image {} of {}...",
        operation.label(),
        index + 1,
        total
    )
}
