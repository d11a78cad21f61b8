// src/services/frame_extractor.rs
use crate::errors::PixshopError;
use crate::models::{ImageResource, VideoResource};
use async_trait::async_trait;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use uuid::Uuid;

/// Seeking exactly to the duration is unreliable across decoders, so stop 100ms short.
pub fn last_frame_seek_time(duration_secs: f64) -> f64 {
    if !duration_secs.is_finite() {
        return 0.0;
    }
    (duration_secs - 0.1).max(0.0)
}

/// A video written to disk for the ffmpeg tools. The file goes away when this is dropped.
struct StagedVideo {
    path: PathBuf,
}

impl StagedVideo {
    async fn write(dir: &Path, data: &[u8]) -> Result<Self, PixshopError> {
        let staged = Self {
            path: dir.join(format!("pixshop-{}.mp4", Uuid::new_v4())),
        };
        tokio::fs::write(&staged.path, data)
            .await
            .map_err(|e| PixshopError::Decode(format!("Failed to stage video: {}", e)))?;
        Ok(staged)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedVideo {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove staged video {}: {}", self.path.display(), e),
        }
    }
}

#[async_trait]
pub trait FrameExtractor: Send + Sync {
    async fn extract_last_frame(&self, video: &VideoResource) -> Result<ImageResource, PixshopError>;
}

/// Renders the final frame with the ffmpeg/ffprobe binaries.
pub struct FfmpegFrameExtractor {
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegFrameExtractor {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    async fn probe_duration(&self, path: &Path) -> Result<f64, PixshopError> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| PixshopError::Decode(format!("Failed to run ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(PixshopError::Decode(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<f64>()
            .map_err(|e| PixshopError::Decode(format!("Could not read video duration: {}", e)))
    }

    async fn render_frame(&self, path: &Path, seek: f64) -> Result<Vec<u8>, PixshopError> {
        let output = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-ss"])
            .arg(format!("{:.3}", seek))
            .arg("-i")
            .arg(path)
            .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "pipe:1"])
            .output()
            .await
            .map_err(|e| PixshopError::Decode(format!("Failed to run ffmpeg: {}", e)))?;

        if !output.status.success() || output.stdout.is_empty() {
            return Err(PixshopError::Decode(format!(
                "Could not extract the last frame: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    async fn extract_last_frame(&self, video: &VideoResource) -> Result<ImageResource, PixshopError> {
        let staged = StagedVideo::write(&std::env::temp_dir(), &video.data).await?;

        let duration = self.probe_duration(staged.path()).await?;
        let seek = last_frame_seek_time(duration);
        debug!("extracting frame at {:.3}s of {:.3}s from video {}", seek, duration, video.id);
        let png = self.render_frame(staged.path(), seek).await?;
        image::load_from_memory(&png)
            .map_err(|e| PixshopError::Decode(format!("Extracted frame is unreadable: {}", e)))?;
        Ok(ImageResource::new(
            format!("video-frame-{}.png", video.id),
            "image/png",
            png,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_stops_short_of_the_end() {
        assert!((last_frame_seek_time(8.0) - 7.9).abs() < 1e-9);
    }

    #[test]
    fn seek_never_goes_negative() {
        assert_eq!(last_frame_seek_time(0.05), 0.0);
        assert_eq!(last_frame_seek_time(0.0), 0.0);
        assert_eq!(last_frame_seek_time(f64::NAN), 0.0);
    }

    #[tokio::test]
    async fn staged_video_is_removed_on_drop() {
        let staged = StagedVideo::write(&std::env::temp_dir(), b"not really mp4")
            .await
            .unwrap();
        let path = staged.path().to_path_buf();
        assert!(path.exists());
        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn staged_video_is_removed_when_extraction_is_dropped() {
        let dir = std::env::temp_dir().join(format!("pixshop-test-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let extraction = async {
            let staged = StagedVideo::write(&dir, b"clip").await.unwrap();
            assert!(staged.path().exists());
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        };
        let interrupted =
            tokio::time::timeout(std::time::Duration::from_millis(50), extraction).await;
        assert!(interrupted.is_err());

        let mut entries = tokio::fs::read_dir(&dir).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
        tokio::fs::remove_dir(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn missing_binaries_surface_decode_error() {
        let extractor = FfmpegFrameExtractor::new(
            "/nonexistent/pixshop-ffmpeg",
            "/nonexistent/pixshop-ffprobe",
        );
        let video = VideoResource::new("video/mp4", vec![0u8; 16]);
        let err = extractor.extract_last_frame(&video).await.unwrap_err();
        assert!(matches!(err, PixshopError::Decode(_)));
    }
}
