// Display model for a rendered graph

use crate::pipeline::{Pipeline, RenderedImage};
use image::{imageops, Rgba, RgbaImage};

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Display state for a graph: the DOT text, the rendered image and the size
/// the display should take.
///
/// When rendering fails the view falls back to a blank area of the configured
/// dialog size instead of an error.
#[derive(Debug, Clone)]
pub struct GraphView {
    dotty: Option<String>,
    image: Option<RenderedImage>,
    placeholder: (u32, u32),
}

impl GraphView {
    pub fn new(pipeline: &Pipeline) -> Self {
        let config = pipeline.config();
        Self {
            dotty: None,
            image: None,
            placeholder: (config.dialog_width(), config.dialog_height()),
        }
    }

    /// Replace the graph and render it.
    pub fn set_dotty(&mut self, pipeline: &Pipeline, dotty: impl Into<String>) {
        let dotty = dotty.into();
        self.image = pipeline.to_image(&dotty);
        self.dotty = Some(dotty);
    }

    pub fn dotty(&self) -> Option<&str> {
        self.dotty.as_deref()
    }

    pub fn image(&self) -> Option<&RenderedImage> {
        self.image.as_ref()
    }

    pub fn preferred_size(&self) -> (u32, u32) {
        match &self.image {
            Some(image) => image.dimensions(),
            None => self.placeholder,
        }
    }

    /// White frame of `preferred_size()` with the graph drawn at the origin.
    pub fn paint(&self) -> RgbaImage {
        let (width, height) = self.preferred_size();
        let mut frame = RgbaImage::from_pixel(width, height, BACKGROUND);
        if let Some(image) = &self.image {
            imageops::overlay(&mut frame, image.pixels(), 0, 0);
        }
        frame
    }
}
