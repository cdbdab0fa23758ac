#![allow(dead_code)]

use image::{Rgb, RgbImage};
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use vindex::encoder::Encoder;
use vindex::store::EmbeddedStore;
use vindex::vector::{VectorDimension, normalize};
use vindex::{VectorStore, VindexResult};

pub const DIM: usize = 8;

/// Deterministic encoder: images point along their mean color, texts along
/// the color (or the animal/object bound to it) they mention.
///
/// red/cat -> axis 0, green/dog -> axis 1, blue/car -> axis 2.
pub struct ColorEncoder {
    dimension: VectorDimension,
}

impl ColorEncoder {
    pub fn new() -> Self {
        Self {
            dimension: VectorDimension::new(DIM).expect("valid dimension"),
        }
    }
}

impl Encoder for ColorEncoder {
    fn embed_rgb_batch(&self, images: &[RgbImage]) -> VindexResult<Vec<Vec<f32>>> {
        Ok(images
            .iter()
            .map(|img| {
                let n = (img.width() * img.height()).max(1) as f32;
                let mut v = vec![0.01; DIM];
                for px in img.pixels() {
                    for (slot, c) in v.iter_mut().zip(px.0) {
                        *slot += f32::from(c) / 255.0 / n;
                    }
                }
                v
            })
            .collect())
    }

    fn embed_text_batch(&self, texts: &[&str]) -> VindexResult<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let text = text.to_lowercase();
                let mut v = vec![0.01; DIM];
                for (axis, words) in [["red", "cat"], ["green", "dog"], ["blue", "car"]]
                    .iter()
                    .enumerate()
                {
                    if words.iter().any(|w| text.split_whitespace().any(|t| t == *w)) {
                        v[axis] += 1.0;
                    }
                }
                v
            })
            .collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "color-test"
    }
}

pub fn encoder() -> Arc<dyn Encoder> {
    Arc::new(ColorEncoder::new())
}

/// Embedded store rooted in a fresh temporary directory.
pub struct TestStore {
    pub dir: TempDir,
    pub store: Arc<dyn VectorStore>,
}

impl TestStore {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = open_embedded(dir.path());
        Self { dir, store }
    }

    /// Reopens the same directory with a new store instance.
    pub fn reopen(&self) -> Arc<dyn VectorStore> {
        open_embedded(self.dir.path())
    }
}

pub fn open_embedded(root: &Path) -> Arc<dyn VectorStore> {
    Arc::new(EmbeddedStore::open(root.join("store"), 2).expect("Failed to open store"))
}

/// Writes an 8x8 single-color image; the format follows the extension.
pub fn write_solid_image(dir: &Path, name: &str, color: [u8; 3]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent dirs");
    }
    RgbImage::from_pixel(8, 8, Rgb(color))
        .save(&path)
        .expect("Failed to write image");
    path
}

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("Failed to write file");
    path
}

pub fn random_unit_vector(rng: &mut impl Rng, dim: usize) -> Vec<f32> {
    loop {
        let mut v: Vec<f32> = (0..dim).map(|_| rng.random_range(-1.0..1.0)).collect();
        if normalize(&mut v).is_ok() {
            return v;
        }
    }
}

/// Unit vector along `axis`.
pub fn axis(dim: usize, axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    v[axis] = 1.0;
    v
}
