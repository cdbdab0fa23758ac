//! Vector types and arithmetic for multimodal similarity search.
//!
//! Every embedding handled by the crate is a unit-length `f32` vector, so
//! cosine similarity reduces to a dot product. This module holds the
//! typed ids and dimensions, the similarity helpers, and the ranking step
//! applied to every search.

mod math;
pub mod ranking;
mod types;

pub use math::{dot, l2_norm, normalize, similarity_matrix};
pub use types::{
    CollectionInfo, MAX_RECORD_ID, Metric, Record, RecordId, SearchResult, VECTOR_DIMENSION_512,
    VectorDimension,
};
