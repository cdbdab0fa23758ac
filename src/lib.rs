//! Multimodal image search: CLIP-style encoders, a vector store and the
//! engine tying them together.

pub mod config;
pub mod display;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod io;
#[cfg(feature = "http-server")]
pub mod server;
pub mod store;
pub mod vector;

// Explicit exports for better API clarity
pub use config::Settings;
pub use encoder::{ClipEncoder, Encoder, ImageInput};
pub use engine::{IdStrategy, IndexReport, SearchEngine};
pub use error::{VindexError, VindexResult};
pub use store::{Collection, EmbeddedStore, RemoteStore, VectorStore, open_store};
pub use vector::{CollectionInfo, Metric, Record, RecordId, SearchResult, VectorDimension};
