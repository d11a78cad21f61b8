// src/services/gemini_service.rs
use crate::config::AppConfig;
use crate::errors::PixshopError;
use crate::models::*;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use log::{debug, info, warn};
use reqwest::Client;
use serde_json::{Value, json};

/// Handle for a long-running remote video job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoOperation {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VideoStatus {
    Pending,
    Done(VideoResource),
    Failed(String),
}

/// The generative backend. Every call is single-result; variations come from repeated calls.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn edit_image(
        &self,
        image: &ImageResource,
        prompt: &str,
        hotspot: Hotspot,
        brush_size: u32,
    ) -> Result<ImageResource, PixshopError>;

    async fn filter_image(
        &self,
        image: &ImageResource,
        filter_prompt: &str,
    ) -> Result<ImageResource, PixshopError>;

    async fn adjust_image(
        &self,
        image: &ImageResource,
        adjustment_prompt: &str,
    ) -> Result<ImageResource, PixshopError>;

    async fn style_transfer(
        &self,
        image: &ImageResource,
        reference: &ImageResource,
        params: &StyleTransferParams,
    ) -> Result<ImageResource, PixshopError>;

    async fn generate_character_scene(
        &self,
        references: &[ImageResource],
        prompt: &str,
    ) -> Result<ImageResource, PixshopError>;

    async fn generate_video(
        &self,
        image: &ImageResource,
        motion_prompt: &str,
    ) -> Result<VideoOperation, PixshopError>;

    async fn poll_video_status(&self, operation: &VideoOperation)
    -> Result<VideoStatus, PixshopError>;
}

pub struct GeminiService {
    api_key: String,
    api_base: String,
    image_model: String,
    video_model: String,
    client: Client,
}

impl GeminiService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            api_base: config.api_base.clone(),
            image_model: config.image_model.clone(),
            video_model: config.video_model.clone(),
            client: Client::new(),
        }
    }

    async fn generate_content(
        &self,
        images: &[&ImageResource],
        prompt: String,
        context: &str,
    ) -> Result<ImageResource, PixshopError> {
        let mut parts: Vec<Value> = images
            .iter()
            .map(|image| {
                json!({
                    "inlineData": {
                        "mimeType": image.mime_type,
                        "data": general_purpose::STANDARD.encode(&image.data)
                    }
                })
            })
            .collect();
        parts.push(json!({ "text": prompt }));

        info!("Requesting {} from {}", context, self.image_model);
        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.api_base, self.image_model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&json!({
                "contents": [{ "role": "user", "parts": parts }]
            }))
            .send()
            .await
            .map_err(|e| PixshopError::Transport(format!("{} request failed: {}", context, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PixshopError::Transport(format!(
                "{} failed with {}: {}",
                context, status, error_text
            )));
        }

        let result: Value = response.json().await.map_err(|e| {
            PixshopError::Transport(format!("Failed to parse {} response: {}", context, e))
        })?;

        let (data, mime_type) = extract_image(&result, context)?;
        let source = images
            .first()
            .map(|image| image.name.clone())
            .unwrap_or_else(|| "generated.png".to_string());
        Ok(ImageResource::new(source, mime_type, data))
    }

    async fn download_video(&self, uri: &str) -> Result<VideoResource, PixshopError> {
        let response = self
            .client
            .get(uri)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| PixshopError::Transport(format!("Video download failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(PixshopError::Transport(format!(
                "Video download failed with {}",
                status
            )));
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("video/"))
            .unwrap_or("video/mp4")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PixshopError::Transport(format!("Video download failed: {}", e)))?;

        Ok(VideoResource::new(mime_type, bytes))
    }
}

#[async_trait]
impl GenerativeBackend for GeminiService {
    async fn edit_image(
        &self,
        image: &ImageResource,
        prompt: &str,
        hotspot: Hotspot,
        brush_size: u32,
    ) -> Result<ImageResource, PixshopError> {
        self.generate_content(&[image], retouch_prompt(prompt, hotspot, brush_size), "edit")
            .await
    }

    async fn filter_image(
        &self,
        image: &ImageResource,
        filter_prompt: &str,
    ) -> Result<ImageResource, PixshopError> {
        self.generate_content(&[image], filter_instructions(filter_prompt), "filter")
            .await
    }

    async fn adjust_image(
        &self,
        image: &ImageResource,
        adjustment_prompt: &str,
    ) -> Result<ImageResource, PixshopError> {
        self.generate_content(&[image], adjust_instructions(adjustment_prompt), "adjustment")
            .await
    }

    async fn style_transfer(
        &self,
        image: &ImageResource,
        reference: &ImageResource,
        params: &StyleTransferParams,
    ) -> Result<ImageResource, PixshopError> {
        self.generate_content(&[image, reference], style_instructions(params), "style transfer")
            .await
    }

    async fn generate_character_scene(
        &self,
        references: &[ImageResource],
        prompt: &str,
    ) -> Result<ImageResource, PixshopError> {
        let images: Vec<&ImageResource> = references.iter().collect();
        self.generate_content(&images, character_instructions(prompt, references.len()), "character scene")
            .await
    }

    async fn generate_video(
        &self,
        image: &ImageResource,
        motion_prompt: &str,
    ) -> Result<VideoOperation, PixshopError> {
        let response = self
            .client
            .post(format!(
                "{}/models/{}:predictLongRunning",
                self.api_base, self.video_model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&json!({
                "instances": [{
                    "prompt": motion_prompt,
                    "image": {
                        "bytesBase64Encoded": general_purpose::STANDARD.encode(&image.data),
                        "mimeType": image.mime_type
                    }
                }]
            }))
            .send()
            .await
            .map_err(|e| PixshopError::Transport(format!("Video request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PixshopError::Transport(format!(
                "Video request failed with {}: {}",
                status, error_text
            )));
        }

        let result: Value = response
            .json()
            .await
            .map_err(|e| PixshopError::Transport(format!("Failed to parse video response: {}", e)))?;

        let name = result["name"]
            .as_str()
            .ok_or_else(|| PixshopError::Transport("No operation name in video response".to_string()))?;
        info!("Started video operation {}", name);
        Ok(VideoOperation {
            name: name.to_string(),
        })
    }

    async fn poll_video_status(
        &self,
        operation: &VideoOperation,
    ) -> Result<VideoStatus, PixshopError> {
        let response = self
            .client
            .get(format!("{}/{}", self.api_base, operation.name))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| PixshopError::Transport(format!("Video status request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(PixshopError::Transport(format!(
                "Video status request failed with {}",
                status
            )));
        }

        let result: Value = response
            .json()
            .await
            .map_err(|e| PixshopError::Transport(format!("Failed to parse video status: {}", e)))?;

        match parse_video_poll(&result) {
            VideoPoll::Pending => {
                debug!("Video operation {} still running", operation.name);
                Ok(VideoStatus::Pending)
            }
            VideoPoll::Failed(message) => {
                warn!("Video operation {} failed: {}", operation.name, message);
                Ok(VideoStatus::Failed(message))
            }
            VideoPoll::Ready(uri) => Ok(VideoStatus::Done(self.download_video(&uri).await?)),
        }
    }
}

#[derive(Debug, PartialEq)]
enum VideoPoll {
    Pending,
    Ready(String),
    Failed(String),
}

fn parse_video_poll(result: &Value) -> VideoPoll {
    if !result["done"].as_bool().unwrap_or(false) {
        return VideoPoll::Pending;
    }
    if let Some(message) = result["error"]["message"].as_str() {
        return VideoPoll::Failed(message.to_string());
    }
    let response = &result["response"]["generateVideoResponse"];
    if let Some(uri) = response["generatedSamples"][0]["video"]["uri"].as_str() {
        return VideoPoll::Ready(uri.to_string());
    }
    let filtered: Vec<&str> = response["raiMediaFilteredReasons"]
        .as_array()
        .map(|reasons| reasons.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if filtered.is_empty() {
        VideoPoll::Failed("Video generation finished without returning a video.".to_string())
    } else {
        VideoPoll::Failed(format!("Video was blocked: {}", filtered.join("; ")))
    }
}

/// Applies the response policy: block reason, then image part, then finish reason, then text.
fn extract_image(result: &Value, context: &str) -> Result<(Vec<u8>, String), PixshopError> {
    if let Some(reason) = result["promptFeedback"]["blockReason"].as_str() {
        let detail = result["promptFeedback"]["blockReasonMessage"]
            .as_str()
            .map(|m| format!(" {}", m))
            .unwrap_or_default();
        warn!("{} request blocked: {}", context, reason);
        return Err(PixshopError::Rejected(format!(
            "Request was blocked. Reason: {}.{}",
            reason, detail
        )));
    }

    let candidate = &result["candidates"][0];
    let parts = candidate["content"]["parts"]
        .as_array()
        .cloned()
        .unwrap_or_default();

    for part in &parts {
        let inline = part.get("inlineData").or_else(|| part.get("inline_data"));
        let Some(inline) = inline else { continue };
        let Some(data) = inline["data"].as_str().filter(|d| !d.is_empty()) else {
            continue;
        };
        let bytes = general_purpose::STANDARD
            .decode(data)
            .map_err(|e| PixshopError::Transport(format!("Failed to decode image: {}", e)))?;
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .unwrap_or("image/png")
            .to_string();
        return Ok((bytes, mime_type));
    }

    if let Some(finish) = candidate["finishReason"].as_str() {
        if finish != "STOP" {
            warn!("{} stopped with finish reason {}", context, finish);
            return Err(PixshopError::Rejected(format!(
                "Image generation for {} stopped unexpectedly. Reason: {}. This often relates to safety settings.",
                context, finish
            )));
        }
    }

    let text: String = parts
        .iter()
        .filter_map(|p| p["text"].as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let message = if text.trim().is_empty() {
        format!(
            "The AI model did not return an image for the {}. Try rephrasing your prompt.",
            context
        )
    } else {
        format!(
            "The AI model did not return an image for the {}. The model responded with text: \"{}\"",
            context,
            text.trim()
        )
    };
    Err(PixshopError::Rejected(message))
}

fn retouch_prompt(prompt: &str, hotspot: Hotspot, brush_size: u32) -> String {
    format!(
        "You are an expert photo editor. Perform a natural, localized edit on the provided image.\n\
         User request: \"{prompt}\"\n\
         Edit location: centre the change on pixel (x: {x}, y: {y}), affecting roughly a {brush}px radius.\n\
         The rest of the image must stay identical to the input. Blend the edit seamlessly and photorealistically.\n\
         Return only the final edited image.",
        prompt = prompt,
        x = hotspot.x,
        y = hotspot.y,
        brush = brush_size
    )
}

fn filter_instructions(filter_prompt: &str) -> String {
    format!(
        "You are an expert photo editor. Apply a stylistic filter to the entire image.\n\
         Filter request: \"{}\"\n\
         Change only colour, tone and style; do not alter composition or content.\n\
         Return only the final filtered image.",
        filter_prompt
    )
}

fn adjust_instructions(adjustment_prompt: &str) -> String {
    format!(
        "You are an expert photo editor. Make a natural, global adjustment to the entire image.\n\
         Adjustment request: \"{}\"\n\
         The result must stay photorealistic.\n\
         Return only the final adjusted image.",
        adjustment_prompt
    )
}

fn style_instructions(params: &StyleTransferParams) -> String {
    let mut out = format!(
        "You are an expert photo editor. The first image is the photo to edit, the second is a style reference.\n\
         Request: \"{}\"\n\
         Apply the reference's style with an influence of {:.0}% and transfer {:.0}% of its colour palette.\n\
         Combine them with {}.",
        params.prompt,
        params.style_influence * 100.0,
        params.color_transfer * 100.0,
        params.blend_mode.describe()
    );
    if !params.negative_prompt.trim().is_empty() {
        out.push_str(&format!("\nAvoid: {}.", params.negative_prompt.trim()));
    }
    out.push_str("\nKeep the subject and composition of the first image. Return only the final image.");
    out
}

fn character_instructions(prompt: &str, count: usize) -> String {
    format!(
        "You are given {} reference images of the same character. Generate a new image that keeps the \
         character's identity, face, and outfit consistent with the references.\n\
         Scene: \"{}\"\n\
         Return only the final image.",
        count, prompt
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_reason_wins() {
        let response = json!({
            "promptFeedback": { "blockReason": "SAFETY" },
            "candidates": []
        });
        let err = extract_image(&response, "edit").unwrap_err();
        assert_eq!(
            err,
            PixshopError::Rejected("Request was blocked. Reason: SAFETY.".to_string())
        );
    }

    #[test]
    fn first_inline_image_is_returned() {
        let response = json!({
            "candidates": [{
                "finishReason": "STOP",
                "content": { "parts": [
                    { "text": "here you go" },
                    { "inlineData": { "mimeType": "image/jpeg", "data": general_purpose::STANDARD.encode([1u8, 2, 3]) } }
                ]}
            }]
        });
        let (bytes, mime) = extract_image(&response, "filter").unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
        assert_eq!(mime, "image/jpeg");
    }

    #[test]
    fn unexpected_finish_reason_is_rejection() {
        let response = json!({
            "candidates": [{ "finishReason": "IMAGE_SAFETY", "content": { "parts": [] } }]
        });
        let err = extract_image(&response, "adjustment").unwrap_err();
        match err {
            PixshopError::Rejected(message) => assert!(message.contains("IMAGE_SAFETY")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn text_only_reply_is_quoted() {
        let response = json!({
            "candidates": [{ "finishReason": "STOP", "content": { "parts": [{ "text": "I can't do that" }] } }]
        });
        let err = extract_image(&response, "edit").unwrap_err();
        assert!(err.to_string().contains("I can't do that"));
    }

    #[test]
    fn video_poll_states() {
        assert_eq!(parse_video_poll(&json!({ "done": false })), VideoPoll::Pending);
        assert_eq!(parse_video_poll(&json!({})), VideoPoll::Pending);
        assert_eq!(
            parse_video_poll(&json!({ "done": true, "error": { "message": "quota" } })),
            VideoPoll::Failed("quota".to_string())
        );
        assert_eq!(
            parse_video_poll(&json!({
                "done": true,
                "response": { "generateVideoResponse": { "generatedSamples": [{ "video": { "uri": "https://files/v1" } }] } }
            })),
            VideoPoll::Ready("https://files/v1".to_string())
        );
        match parse_video_poll(&json!({
            "done": true,
            "response": { "generateVideoResponse": { "raiMediaFilteredReasons": ["child safety"] } }
        })) {
            VideoPoll::Failed(message) => assert!(message.contains("child safety")),
            other => panic!("unexpected poll {:?}", other),
        }
    }

    #[test]
    fn prompts_carry_parameters() {
        let prompt = retouch_prompt("remove the lamp", Hotspot { x: 12, y: 34 }, 40);
        assert!(prompt.contains("x: 12, y: 34"));
        assert!(prompt.contains("40px"));

        let style = style_instructions(&StyleTransferParams {
            prompt: "watercolour".to_string(),
            style_influence: 0.75,
            color_transfer: 0.5,
            blend_mode: BlendMode::Overlay,
            negative_prompt: "text".to_string(),
        });
        assert!(style.contains("75%"));
        assert!(style.contains("50%"));
        assert!(style.contains("Avoid: text."));
    }
}
