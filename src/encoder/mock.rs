//! Mock encoder for testing.
//!
//! Produces deterministic embeddings without downloading a model. Images
//! point in the direction of their mean color, and texts mentioning a color
//! (or the animal/object bound to it) point the same way.

use super::Encoder;
use crate::error::VindexResult;
use crate::vector::VectorDimension;
use image::RgbImage;

pub struct MockEncoder {
    dimension: VectorDimension,
}

impl MockEncoder {
    /// Create a mock encoder with the given dimension (at least 4).
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: VectorDimension::new(dimension.max(4)).unwrap_or(VectorDimension::dimension_512()),
        }
    }
}

impl Encoder for MockEncoder {
    fn embed_rgb_batch(&self, images: &[RgbImage]) -> VindexResult<Vec<Vec<f32>>> {
        let dim = self.dimension.get();
        Ok(images
            .iter()
            .map(|img| {
                let mut sum = [0f32; 3];
                for px in img.pixels() {
                    for (acc, c) in sum.iter_mut().zip(px.0) {
                        *acc += f32::from(c);
                    }
                }
                let n = (img.width() * img.height()).max(1) as f32;
                let mut v = vec![0.01; dim];
                for (slot, acc) in v.iter_mut().zip(sum) {
                    *slot += acc / n / 255.0;
                }
                v
            })
            .collect())
    }

    fn embed_text_batch(&self, texts: &[&str]) -> VindexResult<Vec<Vec<f32>>> {
        let dim = self.dimension.get();
        Ok(texts
            .iter()
            .map(|text| {
                let text = text.to_lowercase();
                let mut v = vec![0.01; dim];
                if text.contains("red") || text.contains("cat") {
                    v[0] += 1.0;
                }
                if text.contains("green") || text.contains("dog") {
                    v[1] += 1.0;
                }
                if text.contains("blue") || text.contains("car") {
                    v[2] += 1.0;
                }
                for (i, b) in text.bytes().enumerate() {
                    v[3 + (i + b as usize) % (dim - 3)] += 0.05;
                }
                v
            })
            .collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}
