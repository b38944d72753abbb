//! Search and ranking core for the Owens Valley Paiute dictionary.
//!
//! Records are loaded from the static site's `data/` directory by a
//! [`CorpusStore`] and queried through [`Dictionary`], which dispatches to the
//! lexical scorers, the TF-IDF index, the embedding engine or their fusion.

pub mod api;
pub mod browse;
pub mod data;
pub mod distance;
pub mod error;
pub mod float16;
pub mod hybrid;
pub mod lexical;
pub mod phonology;
pub mod search;
pub mod semantic;
pub mod store;
pub mod tfidf;
#[cfg(feature = "web")]
pub mod web;

pub use data::{Example, LangMap, RecordId, Sense, Sentence, Word};
pub use error::{DictionaryError, Result};
pub use hybrid::FusionWeights;
pub use search::{
    Dictionary, Page, Ranked, RecordKind, SearchConfig, SearchHit, SearchMode, SearchOutcome,
    SearchRequest,
};
pub use semantic::{CommandModel, EmbeddingModel, EmbeddingStore, SemanticKind};
pub use store::{Corpus, CorpusSource, CorpusStore, DirectorySource, MemorySource};
