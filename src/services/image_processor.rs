// src/services/image_processor.rs
use crate::errors::PixshopError;
use crate::models::{CropRect, DisplayPoint, DisplayRect, DisplaySize, Hotspot, ImageResource};
use image::{GenericImageView, ImageFormat as ImgFormat};
use std::io::Cursor;

pub struct ImageProcessor {
    max_dimension: u32,
}

impl ImageProcessor {
    pub fn new(max_dimension: u32) -> Self {
        Self { max_dimension }
    }

    /// Decodes just enough to check the upload; returns its natural size.
    pub fn validate_image(&self, data: &[u8]) -> Result<(u32, u32), PixshopError> {
        let (width, height) = self.dimensions(data)?;

        if width == 0 || height == 0 {
            return Err(PixshopError::ImageProcessing("Image is empty".to_string()));
        }
        if width > self.max_dimension || height > self.max_dimension {
            return Err(PixshopError::ImageProcessing(format!(
                "Image dimensions exceed {}x{}",
                self.max_dimension, self.max_dimension
            )));
        }

        Ok((width, height))
    }

    pub fn dimensions(&self, data: &[u8]) -> Result<(u32, u32), PixshopError> {
        image::io::Reader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| PixshopError::ImageProcessing(format!("Invalid image format: {}", e)))?
            .into_dimensions()
            .map_err(|e| PixshopError::ImageProcessing(format!("Invalid image format: {}", e)))
    }

    /// MIME type sniffed from the bytes, falling back to the declared one.
    pub fn detect_mime(&self, data: &[u8], declared: &str) -> String {
        match image::guess_format(data) {
            Ok(format) => format.to_mime_type().to_string(),
            Err(_) => declared.to_string(),
        }
    }

    pub fn natural_size(&self, image: &ImageResource) -> Result<DisplaySize, PixshopError> {
        let (width, height) = self.dimensions(&image.data)?;
        Ok(DisplaySize {
            width: width as f64,
            height: height as f64,
        })
    }

    /// Scales an on-screen click into natural pixels, `natural / displayed` per axis.
    pub fn map_point(
        &self,
        point: DisplayPoint,
        displayed: DisplaySize,
        natural: DisplaySize,
    ) -> Result<Hotspot, PixshopError> {
        let (scale_x, scale_y) = scale_factors(displayed, natural)?;
        if point.x < 0.0 || point.y < 0.0 || point.x > displayed.width || point.y > displayed.height
        {
            return Err(PixshopError::validation(
                "The selected point is outside the image.",
            ));
        }
        Ok(Hotspot {
            x: (point.x * scale_x).round() as u32,
            y: (point.y * scale_y).round() as u32,
        })
    }

    pub fn map_rect(
        &self,
        rect: DisplayRect,
        displayed: DisplaySize,
        natural: DisplaySize,
    ) -> Result<CropRect, PixshopError> {
        let (scale_x, scale_y) = scale_factors(displayed, natural)?;
        let x = (rect.x.max(0.0) * scale_x).round();
        let y = (rect.y.max(0.0) * scale_y).round();
        let width = (rect.width * scale_x).round().min(natural.width - x);
        let height = (rect.height * scale_y).round().min(natural.height - y);
        if width < 1.0 || height < 1.0 {
            return Err(PixshopError::validation("Please select an area to crop."));
        }
        Ok(CropRect {
            x: x as u32,
            y: y as u32,
            width: width as u32,
            height: height as u32,
        })
    }

    /// Crops locally and re-encodes as PNG.
    pub fn crop(&self, image: &ImageResource, rect: CropRect) -> Result<ImageResource, PixshopError> {
        let img = image::load_from_memory(&image.data)
            .map_err(|e| PixshopError::ImageProcessing(format!("Failed to load image: {}", e)))?;

        let (width, height) = img.dimensions();
        if rect.width == 0
            || rect.height == 0
            || rect.x.saturating_add(rect.width) > width
            || rect.y.saturating_add(rect.height) > height
        {
            return Err(PixshopError::validation(
                "The crop area must lie inside the image.",
            ));
        }

        let cropped = img.crop_imm(rect.x, rect.y, rect.width, rect.height);

        let mut output = Vec::new();
        cropped
            .write_to(&mut Cursor::new(&mut output), ImgFormat::Png)
            .map_err(|e| {
                PixshopError::ImageProcessing(format!("Failed to encode cropped image: {}", e))
            })?;

        Ok(image.derive("image/png", output))
    }
}

fn scale_factors(displayed: DisplaySize, natural: DisplaySize) -> Result<(f64, f64), PixshopError> {
    if displayed.width <= 0.0 || displayed.height <= 0.0 {
        return Err(PixshopError::validation("The displayed image size must be positive."));
    }
    Ok((natural.width / displayed.width, natural.height / displayed.height))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 40, 40, 255]));
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), ImgFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn hotspot_scales_each_axis_independently() {
        let processor = ImageProcessor::new(4096);
        let hotspot = processor
            .map_point(
                DisplayPoint { x: 100.0, y: 50.0 },
                DisplaySize { width: 400.0, height: 200.0 },
                DisplaySize { width: 1600.0, height: 1000.0 },
            )
            .unwrap();
        assert_eq!(hotspot, Hotspot { x: 400, y: 250 });
    }

    #[test]
    fn hotspot_on_far_edge_scales_exactly() {
        let processor = ImageProcessor::new(4096);
        let hotspot = processor
            .map_point(
                DisplayPoint { x: 300.0, y: 150.0 },
                DisplaySize { width: 300.0, height: 150.0 },
                DisplaySize { width: 600.0, height: 300.0 },
            )
            .unwrap();
        assert_eq!(hotspot, Hotspot { x: 600, y: 300 });
        assert!(processor
            .map_point(
                DisplayPoint { x: -1.0, y: 0.0 },
                DisplaySize { width: 300.0, height: 150.0 },
                DisplaySize { width: 600.0, height: 300.0 },
            )
            .is_err());
        assert!(processor
            .map_point(
                DisplayPoint { x: 300.5, y: 0.0 },
                DisplaySize { width: 300.0, height: 150.0 },
                DisplaySize { width: 600.0, height: 300.0 },
            )
            .is_err());
    }

    #[test]
    fn validate_reports_natural_size_and_limits() {
        let processor = ImageProcessor::new(16);
        assert_eq!(processor.validate_image(&png_bytes(8, 4)).unwrap(), (8, 4));
        assert!(processor.validate_image(&png_bytes(32, 4)).is_err());
        assert!(processor.validate_image(b"not an image").is_err());
        assert_eq!(processor.detect_mime(&png_bytes(1, 1), "application/octet-stream"), "image/png");
    }

    #[test]
    fn crop_produces_png_of_requested_size() {
        let processor = ImageProcessor::new(4096);
        let source = ImageResource::new("photo.jpg", "image/png", png_bytes(10, 8));
        let rect = processor
            .map_rect(
                DisplayRect { x: 2.5, y: 1.0, width: 2.5, height: 3.0 },
                DisplaySize { width: 5.0, height: 4.0 },
                DisplaySize { width: 10.0, height: 8.0 },
            )
            .unwrap();
        assert_eq!(rect, CropRect { x: 5, y: 2, width: 5, height: 6 });
        let cropped = processor.crop(&source, rect).unwrap();
        assert_eq!(cropped.mime_type, "image/png");
        assert_eq!(processor.dimensions(&cropped.data).unwrap(), (5, 6));
        assert_ne!(cropped.id, source.id);
    }

    #[test]
    fn crop_outside_image_is_rejected() {
        let processor = ImageProcessor::new(4096);
        let source = ImageResource::new("photo.png", "image/png", png_bytes(4, 4));
        let rect = CropRect { x: 2, y: 2, width: 4, height: 1 };
        assert!(matches!(processor.crop(&source, rect), Err(PixshopError::Validation(_))));
    }
}
