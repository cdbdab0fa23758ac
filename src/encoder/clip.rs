//! CLIP-style encoder backed by fastembed.
//!
//! Each registry entry pairs a vision model with the text model trained
//! against it, so both towers write into the same space. Model files are
//! downloaded on first use into the cache directory.

use super::Encoder;
use crate::config::ModelConfig;
use crate::error::{VindexError, VindexResult};
use crate::vector::VectorDimension;
use fastembed::{
    EmbeddingModel, ImageEmbedding, ImageEmbeddingModel, ImageInitOptions, InitOptions,
    TextEmbedding,
};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info};

/// A vision/text model pair known to the registry.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub name: &'static str,
    pub image_model: ImageEmbeddingModel,
    pub text_model: EmbeddingModel,
    pub dimension: usize,
    pub description: &'static str,
}

fn registry() -> Vec<ModelSpec> {
    vec![
        ModelSpec {
            name: "clip-vit-b-32",
            image_model: ImageEmbeddingModel::ClipVitB32,
            text_model: EmbeddingModel::ClipVitB32,
            dimension: 512,
            description: "OpenAI CLIP ViT-B/32, 224px input, 512 dimensions",
        },
        ModelSpec {
            name: "nomic-embed-v1.5",
            image_model: ImageEmbeddingModel::NomicEmbedVisionV15,
            text_model: EmbeddingModel::NomicEmbedTextV15,
            dimension: 768,
            description: "Nomic Embed vision/text v1.5, 768 dimensions",
        },
    ]
}

/// Looks up a model by registry name. Matching ignores case and a few aliases.
pub fn parse_model(name: &str) -> VindexResult<ModelSpec> {
    let wanted = match name.to_ascii_lowercase().as_str() {
        "clip" | "vit-b-32" | "vit-b/32" | "clipvitb32" => "clip-vit-b-32".to_string(),
        "nomic" | "nomic-embed" | "nomicembedv15" => "nomic-embed-v1.5".to_string(),
        other => other.to_string(),
    };
    registry()
        .into_iter()
        .find(|spec| spec.name == wanted)
        .ok_or_else(|| {
            let known: Vec<&str> = registry().iter().map(|s| s.name).collect();
            VindexError::config(format!(
                "unknown model '{name}', available: {}",
                known.join(", ")
            ))
        })
}

/// Registry name for a fastembed image model.
pub fn model_to_string(model: &ImageEmbeddingModel) -> String {
    registry()
        .into_iter()
        .find(|spec| &spec.image_model == model)
        .map(|spec| spec.name.to_string())
        .unwrap_or_else(|| format!("{model:?}"))
}

/// All registry entries, for `--help` style listings.
pub fn available_models() -> Vec<ModelSpec> {
    registry()
}

/// Encoder using a fastembed image model and its paired text model.
pub struct ClipEncoder {
    image_model: Mutex<ImageEmbedding>,
    text_model: Mutex<TextEmbedding>,
    name: &'static str,
    dimension: VectorDimension,
}

impl ClipEncoder {
    /// Loads the model pair named in `config`.
    ///
    /// # Errors
    /// Returns `Config` for an unknown model name and `Encoding` if either
    /// model fails to download or initialize.
    pub fn from_config(config: &ModelConfig) -> VindexResult<Self> {
        let spec = parse_model(&config.name)?;
        Self::new(
            spec,
            config.resolved_cache_dir(),
            config.max_length,
            config.show_download_progress,
        )
    }

    pub fn new(
        spec: ModelSpec,
        cache_dir: PathBuf,
        max_length: usize,
        show_download_progress: bool,
    ) -> VindexResult<Self> {
        info!(model = spec.name, cache = %cache_dir.display(), "loading embedding models");

        let image_model = ImageEmbedding::try_new(
            ImageInitOptions::new(spec.image_model.clone())
                .with_cache_dir(cache_dir.clone())
                .with_show_download_progress(show_download_progress),
        )
        .map_err(|e| VindexError::Encoding {
            reason: format!(
                "Failed to initialize image model '{}': {e}. Ensure you have internet connection for first-time model download",
                spec.name
            ),
        })?;

        let text_model = TextEmbedding::try_new(
            InitOptions::new(spec.text_model.clone())
                .with_cache_dir(cache_dir)
                .with_max_length(max_length)
                .with_show_download_progress(show_download_progress),
        )
        .map_err(|e| VindexError::Encoding {
            reason: format!("Failed to initialize text model '{}': {e}", spec.name),
        })?;

        Ok(Self {
            image_model: Mutex::new(image_model),
            text_model: Mutex::new(text_model),
            name: spec.name,
            dimension: VectorDimension::new(spec.dimension)?,
        })
    }
}

/// Re-encodes a bitmap losslessly so the model applies its own preprocessing.
fn to_png(image: &RgbImage) -> VindexResult<Vec<u8>> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| VindexError::Encoding {
            reason: format!("failed to serialize bitmap: {e}"),
        })?;
    Ok(buf)
}

impl Encoder for ClipEncoder {
    fn embed_rgb_batch(&self, images: &[RgbImage]) -> VindexResult<Vec<Vec<f32>>> {
        let encoded = images.iter().map(to_png).collect::<VindexResult<Vec<_>>>()?;
        let slices: Vec<&[u8]> = encoded.iter().map(Vec::as_slice).collect();
        debug!(count = slices.len(), "embedding image batch");

        self.image_model
            .lock()
            .map_err(|_| VindexError::Encoding {
                reason: "Failed to acquire image model lock - model may be poisoned".to_string(),
            })?
            .embed_bytes(&slices, Some(slices.len()))
            .map_err(|e| VindexError::Encoding {
                reason: format!("Failed to generate image embeddings: {e}"),
            })
    }

    fn embed_text_batch(&self, texts: &[&str]) -> VindexResult<Vec<Vec<f32>>> {
        // fastembed truncates on the right at the configured max length
        let owned: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();

        self.text_model
            .lock()
            .map_err(|_| VindexError::Encoding {
                reason: "Failed to acquire text model lock - model may be poisoned".to_string(),
            })?
            .embed(owned, None)
            .map_err(|e| VindexError::Encoding {
                reason: format!("Failed to generate text embeddings: {e}"),
            })
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        self.name
    }
}
