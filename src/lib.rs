//! Embedding-indexed k-NN classification for chest X-ray images.
//!
//! Images are mapped to fixed-length embeddings by a frozen backbone
//! ([`vision`]), a labeled corpus of embeddings is indexed for approximate
//! nearest-neighbor search ([`index`], [`corpus`]), and new images are
//! classified by majority vote among their nearest neighbors
//! ([`classifier`]).

pub mod classifier;
pub mod config;
pub mod corpus;
pub mod error;
pub mod index;
pub mod labels;
pub mod types;
pub mod vision;

pub use classifier::{classify, Classifier};
pub use config::MedannConfig;
pub use corpus::{Corpus, CorpusStore, IndexedCorpus, Ingestor};
pub use error::{MedannError, Result};
pub use index::{build_index, NeighborIndex};
pub use labels::{display_name, supported_classes, ClassLabel};
pub use types::*;
pub use vision::FeatureExtractor;
