// src/editor/video_flow.rs
use crate::editor::object_urls::{ObjectUrl, ObjectUrlCache};
use crate::errors::PixshopError;
use crate::models::{ImageResource, VideoResource};

#[derive(Debug, Default)]
pub enum VideoState {
    #[default]
    Idle,
    Generating {
        seed: ImageResource,
        prompt: String,
    },
    Reviewing {
        video: VideoResource,
        url: ObjectUrl,
    },
    ExtractingFrame {
        video: VideoResource,
        url: ObjectUrl,
    },
    Extending {
        video: VideoResource,
        url: ObjectUrl,
        frame: ImageResource,
        frame_url: ObjectUrl,
    },
}

impl VideoState {
    pub fn name(&self) -> &'static str {
        match self {
            VideoState::Idle => "idle",
            VideoState::Generating { .. } => "generating",
            VideoState::Reviewing { .. } => "reviewing",
            VideoState::ExtractingFrame { .. } => "extracting_frame",
            VideoState::Extending { .. } => "extending",
        }
    }
}

/// Generate → review → extract last frame → extend, with the display handles it owns.
#[derive(Debug, Default)]
pub struct VideoFlow {
    state: VideoState,
}

impl VideoFlow {
    pub fn state(&self) -> &VideoState {
        &self.state
    }

    /// From `idle` the editor image seeds the request; from `extending` the extracted frame does.
    pub fn start(
        &mut self,
        editor_image: Option<&ImageResource>,
        prompt: &str,
        urls: &mut ObjectUrlCache,
    ) -> Result<ImageResource, PixshopError> {
        if prompt.trim().is_empty() {
            return Err(PixshopError::validation(
                "Please describe the motion for the video.",
            ));
        }
        let seed = match &self.state {
            VideoState::Idle => editor_image.cloned().ok_or_else(|| {
                PixshopError::validation("Upload an image before generating a video.")
            })?,
            VideoState::Extending { frame, .. } => frame.clone(),
            other => {
                return Err(PixshopError::validation(format!(
                    "Cannot start a video while {}.",
                    other.name().replace('_', " ")
                )));
            }
        };
        self.release_handles(urls);
        self.state = VideoState::Generating {
            seed: seed.clone(),
            prompt: prompt.to_string(),
        };
        Ok(seed)
    }

    pub fn finish_generate(
        &mut self,
        result: Result<VideoResource, PixshopError>,
        urls: &mut ObjectUrlCache,
    ) -> Result<(), PixshopError> {
        if !matches!(self.state, VideoState::Generating { .. }) {
            return Err(PixshopError::validation("No video generation is in progress."));
        }
        match result {
            Ok(video) => {
                let url = urls.create(video.id);
                self.state = VideoState::Reviewing { video, url };
                Ok(())
            }
            Err(err) => {
                self.state = VideoState::Idle;
                Err(err)
            }
        }
    }

    pub fn begin_extend(&mut self) -> Result<VideoResource, PixshopError> {
        match std::mem::take(&mut self.state) {
            VideoState::Reviewing { video, url } => {
                let seed_source = video.clone();
                self.state = VideoState::ExtractingFrame { video, url };
                Ok(seed_source)
            }
            other => {
                self.state = other;
                Err(PixshopError::validation(
                    "There is no finished video to extend.",
                ))
            }
        }
    }

    /// A failed extraction falls back to `reviewing`, not `idle`.
    pub fn finish_extract(
        &mut self,
        result: Result<ImageResource, PixshopError>,
        urls: &mut ObjectUrlCache,
    ) -> Result<(), PixshopError> {
        match std::mem::take(&mut self.state) {
            VideoState::ExtractingFrame { video, url } => match result {
                Ok(frame) => {
                    let frame_url = urls.create(frame.id);
                    self.state = VideoState::Extending {
                        video,
                        url,
                        frame,
                        frame_url,
                    };
                    Ok(())
                }
                Err(err) => {
                    self.state = VideoState::Reviewing { video, url };
                    Err(err)
                }
            },
            other => {
                self.state = other;
                Err(PixshopError::validation("No frame extraction is in progress."))
            }
        }
    }

    /// Closes the extend panel and goes back to reviewing the same video.
    pub fn cancel_extend(&mut self, urls: &mut ObjectUrlCache) -> Result<(), PixshopError> {
        match std::mem::take(&mut self.state) {
            VideoState::Extending {
                video,
                url,
                frame_url,
                ..
            } => {
                urls.release(&frame_url);
                self.state = VideoState::Reviewing { video, url };
                Ok(())
            }
            other => {
                self.state = other;
                Err(PixshopError::validation("The extend panel is not open."))
            }
        }
    }

    pub fn back_to_editor(&mut self, urls: &mut ObjectUrlCache) -> Result<(), PixshopError> {
        match self.state {
            VideoState::Reviewing { .. } | VideoState::Extending { .. } => {
                self.release_handles(urls);
                self.state = VideoState::Idle;
                Ok(())
            }
            _ => Err(PixshopError::validation("There is no video to leave.")),
        }
    }

    /// Drops whatever the flow holds, used when the workspace is replaced.
    pub fn reset(&mut self, urls: &mut ObjectUrlCache) {
        self.release_handles(urls);
        self.state = VideoState::Idle;
    }

    pub fn video(&self) -> Option<&VideoResource> {
        match &self.state {
            VideoState::Reviewing { video, .. }
            | VideoState::ExtractingFrame { video, .. }
            | VideoState::Extending { video, .. } => Some(video),
            _ => None,
        }
    }

    pub fn frame(&self) -> Option<&ImageResource> {
        match &self.state {
            VideoState::Extending { frame, .. } => Some(frame),
            _ => None,
        }
    }

    pub fn video_url(&self) -> Option<&ObjectUrl> {
        match &self.state {
            VideoState::Reviewing { url, .. }
            | VideoState::ExtractingFrame { url, .. }
            | VideoState::Extending { url, .. } => Some(url),
            _ => None,
        }
    }

    pub fn frame_url(&self) -> Option<&ObjectUrl> {
        match &self.state {
            VideoState::Extending { frame_url, .. } => Some(frame_url),
            _ => None,
        }
    }

    fn release_handles(&mut self, urls: &mut ObjectUrlCache) {
        if let Some(url) = self.video_url() {
            urls.release(url);
        }
        if let Some(url) = self.frame_url() {
            urls.release(url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn image(name: &str) -> ImageResource {
        ImageResource::new(name, "image/png", vec![0u8; 4])
    }

    fn video() -> VideoResource {
        VideoResource::new("video/mp4", vec![1u8; 8])
    }

    #[test]
    fn generate_then_extend_reaches_extending() {
        let mut urls = ObjectUrlCache::new(Uuid::new_v4());
        let mut flow = VideoFlow::default();
        let editor = image("editor.png");

        let seed = flow.start(Some(&editor), "pan left", &mut urls).unwrap();
        assert_eq!(seed.id, editor.id);
        assert_eq!(flow.state().name(), "generating");

        flow.finish_generate(Ok(video()), &mut urls).unwrap();
        assert_eq!(flow.state().name(), "reviewing");
        assert_eq!(urls.live_count(), 1);

        flow.begin_extend().unwrap();
        assert_eq!(flow.state().name(), "extracting_frame");
        let frame = image("frame.png");
        flow.finish_extract(Ok(frame.clone()), &mut urls).unwrap();
        assert_eq!(flow.state().name(), "extending");

        let next_seed = flow.start(Some(&editor), "zoom in", &mut urls).unwrap();
        assert_eq!(next_seed.id, frame.id);
        assert_eq!(urls.live_count(), 0);
    }

    #[test]
    fn failed_extraction_returns_to_reviewing() {
        let mut urls = ObjectUrlCache::new(Uuid::new_v4());
        let mut flow = VideoFlow::default();
        flow.start(Some(&image("a.png")), "drift", &mut urls).unwrap();
        flow.finish_generate(Ok(video()), &mut urls).unwrap();
        flow.begin_extend().unwrap();
        let err = flow
            .finish_extract(Err(PixshopError::Decode("no frames".into())), &mut urls)
            .unwrap_err();
        assert_eq!(err, PixshopError::Decode("no frames".into()));
        assert_eq!(flow.state().name(), "reviewing");
        assert!(flow.video().is_some());
    }

    #[test]
    fn failed_generation_returns_to_idle() {
        let mut urls = ObjectUrlCache::new(Uuid::new_v4());
        let mut flow = VideoFlow::default();
        flow.start(Some(&image("a.png")), "drift", &mut urls).unwrap();
        let result = flow.finish_generate(Err(PixshopError::Rejected("blocked".into())), &mut urls);
        assert!(result.is_err());
        assert_eq!(flow.state().name(), "idle");
    }

    #[test]
    fn back_to_editor_revokes_video_url() {
        let mut urls = ObjectUrlCache::new(Uuid::new_v4());
        let mut flow = VideoFlow::default();
        flow.start(Some(&image("a.png")), "drift", &mut urls).unwrap();
        flow.finish_generate(Ok(video()), &mut urls).unwrap();
        let token = flow.video_url().unwrap().token;
        flow.back_to_editor(&mut urls).unwrap();
        assert_eq!(flow.state().name(), "idle");
        assert!(urls.resolve(&token).is_none());
        assert_eq!(urls.created_count(), urls.released_count());
    }

    #[test]
    fn start_requires_prompt_and_image() {
        let mut urls = ObjectUrlCache::new(Uuid::new_v4());
        let mut flow = VideoFlow::default();
        assert!(flow.start(Some(&image("a.png")), "  ", &mut urls).is_err());
        assert!(flow.start(None, "drift", &mut urls).is_err());
        assert_eq!(flow.state().name(), "idle");
        assert!(flow.begin_extend().is_err());
    }
}
