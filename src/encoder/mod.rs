//! Image and text encoders.
//!
//! An [`Encoder`] turns images and text into unit-length vectors that live
//! in one shared embedding space, so an image vector can be compared with a
//! text vector by a plain dot product. Implementations only provide the raw
//! model calls; the provided methods handle decoding, batching, dimension
//! checks and L2 normalization so every implementation behaves the same.

mod clip;
#[cfg(test)]
mod mock;

pub use clip::{ClipEncoder, ModelSpec, available_models, model_to_string, parse_model};
#[cfg(test)]
pub use mock::MockEncoder;

use crate::error::{VindexError, VindexResult};
use crate::vector::{VectorDimension, normalize, similarity_matrix};
use image::{DynamicImage, ImageReader, RgbImage};
use std::path::{Path, PathBuf};

/// An image handed to an encoder.
#[derive(Debug, Clone)]
pub enum ImageInput {
    /// File on disk, decoded on demand
    Path(PathBuf),
    /// Encoded image bytes (PNG, JPEG, ...)
    Bytes(Vec<u8>),
    /// Already decoded bitmap in any color layout
    Bitmap(DynamicImage),
}

impl ImageInput {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Human readable name used in diagnostics.
    pub fn source_name(&self) -> String {
        match self {
            Self::Path(p) => p.display().to_string(),
            Self::Bytes(b) => format!("<{} bytes>", b.len()),
            Self::Bitmap(img) => format!("<{}x{} bitmap>", img.width(), img.height()),
        }
    }

    /// Decodes to 8-bit RGB regardless of the source layout.
    ///
    /// Grayscale, alpha and 16-bit images are converted; alpha is dropped.
    pub fn decode(&self) -> VindexResult<RgbImage> {
        let image = match self {
            Self::Path(path) => decode_path(path)?,
            Self::Bytes(bytes) => {
                image::load_from_memory(bytes).map_err(|e| VindexError::Decode {
                    source_name: self.source_name(),
                    reason: e.to_string(),
                })?
            }
            Self::Bitmap(img) => return Ok(img.to_rgb8()),
        };
        Ok(image.to_rgb8())
    }
}

impl From<&Path> for ImageInput {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for ImageInput {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<DynamicImage> for ImageInput {
    fn from(image: DynamicImage) -> Self {
        Self::Bitmap(image)
    }
}

fn decode_path(path: &Path) -> VindexResult<DynamicImage> {
    if !path.exists() {
        return Err(VindexError::PathNotFound {
            path: path.to_path_buf(),
        });
    }
    let decode_err = |reason: String| VindexError::Decode {
        source_name: path.display().to_string(),
        reason,
    };
    ImageReader::open(path)
        .map_err(|e| decode_err(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| decode_err(e.to_string()))?
        .decode()
        .map_err(|e| decode_err(e.to_string()))
}

/// Trait for models that embed images and text into a shared space.
///
/// Implementations must be thread-safe. One instance is created per
/// process and shared behind an `Arc`.
pub trait Encoder: Send + Sync {
    /// Raw model output for a batch of RGB images, one row per image.
    fn embed_rgb_batch(&self, images: &[RgbImage]) -> VindexResult<Vec<Vec<f32>>>;

    /// Raw model output for a batch of texts, one row per text.
    fn embed_text_batch(&self, texts: &[&str]) -> VindexResult<Vec<Vec<f32>>>;

    /// Dimension of every vector this encoder produces.
    fn dimension(&self) -> VectorDimension;

    /// Registry name of the underlying model.
    fn model_name(&self) -> &str;

    /// Encodes already decoded images into unit vectors.
    fn encode_decoded(&self, images: &[RgbImage]) -> VindexResult<Vec<Vec<f32>>> {
        if images.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.embed_rgb_batch(images)?;
        finish_rows(self.dimension(), rows, images.len())
    }

    /// Encodes a single image into a unit vector.
    fn encode_image(&self, image: &ImageInput) -> VindexResult<Vec<f32>> {
        let rgb = image.decode()?;
        let mut rows = self.encode_decoded(std::slice::from_ref(&rgb))?;
        rows.pop().ok_or_else(|| VindexError::Encoding {
            reason: "model returned no embedding".to_string(),
        })
    }

    /// Encodes images in chunks of `batch_size`, preserving input order.
    ///
    /// Any decode failure aborts the whole call. Callers that want to skip
    /// bad items decode first and use [`Encoder::encode_decoded`].
    fn encode_images(&self, images: &[ImageInput], batch_size: usize) -> VindexResult<Vec<Vec<f32>>> {
        if batch_size == 0 {
            return Err(VindexError::config("batch size must be at least 1"));
        }
        let mut out = Vec::with_capacity(images.len());
        for chunk in images.chunks(batch_size) {
            let decoded = chunk
                .iter()
                .map(ImageInput::decode)
                .collect::<VindexResult<Vec<_>>>()?;
            out.extend(self.encode_decoded(&decoded)?);
        }
        Ok(out)
    }

    /// Encodes one text into a unit vector.
    fn encode_text(&self, text: &str) -> VindexResult<Vec<f32>> {
        let mut rows = self.encode_texts(&[text])?;
        rows.pop().ok_or_else(|| VindexError::Encoding {
            reason: "model returned no embedding".to_string(),
        })
    }

    /// Encodes several texts into unit vectors, preserving input order.
    fn encode_texts(&self, texts: &[&str]) -> VindexResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.embed_text_batch(texts)?;
        finish_rows(self.dimension(), rows, texts.len())
    }

    /// Dot product of every query row against every gallery row.
    fn compute_similarity(
        &self,
        query: &[Vec<f32>],
        gallery: &[Vec<f32>],
    ) -> VindexResult<Vec<Vec<f32>>> {
        similarity_matrix(query, gallery)
    }
}

/// Validates row count and width, then normalizes each row.
fn finish_rows(
    dimension: VectorDimension,
    mut rows: Vec<Vec<f32>>,
    expected_rows: usize,
) -> VindexResult<Vec<Vec<f32>>> {
    if rows.len() != expected_rows {
        return Err(VindexError::Encoding {
            reason: format!(
                "model returned {} embeddings for {expected_rows} inputs",
                rows.len()
            ),
        });
    }
    for row in &mut rows {
        dimension.validate_vector(row)?;
        normalize(row)?;
    }
    Ok(rows)
}
