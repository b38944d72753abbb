//! Search modes and the [`Dictionary`] facade that dispatches to them.

use crate::data::RecordId;
use crate::error::{DictionaryError, Result};
use crate::hybrid::{FusionWeights, fuse};
use crate::lexical;
use crate::semantic::{
    CachedModel, DEFAULT_MIN_SIMILARITY, EmbeddingModel, SemanticEngine, SemanticKind,
};
use crate::store::{Corpus, CorpusSource, CorpusStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Zero-based `skip` offset and a `limit` result cap, shared by every mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub limit: usize,
    pub skip: usize,
}

impl Page {
    pub fn new(limit: usize, skip: usize) -> Self {
        Self { limit, skip }
    }

    /// Every item, unwindowed.
    pub fn all() -> Self {
        Self::new(usize::MAX, 0)
    }

    /// Index one past the last item of this page.
    pub fn end(&self) -> usize {
        self.skip.saturating_add(self.limit)
    }

    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items.into_iter().skip(self.skip).take(self.limit).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Word,
    Sentence,
}

/// A scored record reference, the common currency of the ranking engines.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked {
    pub id: RecordId,
    pub kind: RecordKind,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Tiered match on normalized Paiute forms.
    Paiute,
    /// Phrase and term match on glosses and definitions.
    #[default]
    English,
    Sentences,
    /// TF-IDF over forms and meanings.
    Smart,
    Semantic,
    /// Semantic and TF-IDF scores fused.
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Paiute => "paiute",
            SearchMode::English => "english",
            SearchMode::Sentences => "sentences",
            SearchMode::Smart => "smart",
            SearchMode::Semantic => "semantic",
            SearchMode::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub fusion: FusionWeights,
    pub min_similarity: f64,
    pub default_limit: usize,
    pub max_limit: usize,
    pub browse_default_limit: usize,
    pub browse_max_limit: usize,
    pub embedding_cache_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            fusion: FusionWeights::default(),
            min_similarity: DEFAULT_MIN_SIMILARITY,
            default_limit: 10,
            max_limit: 100,
            browse_default_limit: 50,
            browse_max_limit: 200,
            embedding_cache_size: 1000,
        }
    }
}

impl SearchConfig {
    pub fn search_page(&self, limit: Option<usize>, skip: Option<usize>) -> Page {
        clamp_page(limit, skip, self.default_limit, self.max_limit)
    }

    pub fn browse_page(&self, limit: Option<usize>, skip: Option<usize>) -> Page {
        clamp_page(limit, skip, self.browse_default_limit, self.browse_max_limit)
    }
}

fn clamp_page(limit: Option<usize>, skip: Option<usize>, default: usize, max: usize) -> Page {
    let limit = limit.unwrap_or(default).clamp(1, max.max(1));
    Page::new(limit, skip.unwrap_or(0))
}

#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub mode: SearchMode,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    /// Which vectors semantic mode ranks; hybrid always fuses words.
    pub semantic_kind: SemanticKind,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, mode: SearchMode) -> Self {
        Self {
            query: query.into(),
            mode,
            ..Self::default()
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: RecordId,
    pub kind: RecordKind,
    pub score: f64,
}

impl From<Ranked> for SearchHit {
    fn from(ranked: Ranked) -> Self {
        Self {
            id: ranked.id,
            kind: ranked.kind,
            score: ranked.score,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub query: String,
    pub mode: SearchMode,
    pub page: Page,
    /// Set when a semantic mode fell back to TF-IDF ranking.
    pub degraded: bool,
    pub hits: Vec<SearchHit>,
}

/// Entry point for callers: owns the corpus store, the tuning knobs and the
/// optional query-embedding model.
pub struct Dictionary {
    store: CorpusStore,
    config: SearchConfig,
    model: Option<Arc<dyn EmbeddingModel>>,
}

impl Dictionary {
    pub fn new(source: Arc<dyn CorpusSource>) -> Self {
        Self {
            store: CorpusStore::new(source),
            config: SearchConfig::default(),
            model: None,
        }
    }

    pub fn with_config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    /// Installs the query-embedding model behind an LRU of recent queries.
    pub fn with_model(mut self, model: Arc<dyn EmbeddingModel>) -> Self {
        let cached = CachedModel::new(model, self.config.embedding_cache_size);
        self.model = Some(Arc::new(cached));
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn store(&self) -> &CorpusStore {
        &self.store
    }

    pub async fn corpus(&self) -> Result<Arc<Corpus>> {
        self.store.corpus().await
    }

    /// Pairs the corpus embeddings with the configured model. Missing
    /// embeddings count as an unavailable model.
    pub async fn semantic_engine(&self) -> Result<SemanticEngine> {
        let model = self
            .model
            .clone()
            .ok_or_else(|| DictionaryError::ModelUnavailable("no embedding model configured".into()))?;
        let embeddings = self
            .store
            .embeddings()
            .await
            .map_err(|err| DictionaryError::ModelUnavailable(err.to_string()))?;
        Ok(SemanticEngine::new(
            embeddings,
            Some(model),
            self.config.min_similarity,
        ))
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchOutcome> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(DictionaryError::InvalidQuery(
                "query must not be empty".into(),
            ));
        }
        let page = self.config.search_page(request.limit, request.skip);
        let corpus = self.corpus().await?;
        let started = Instant::now();

        let mut degraded = false;
        let ranked: Vec<Ranked> = match request.mode {
            SearchMode::Paiute => lexical::search_paiute(corpus.valid_words(), query, page)
                .into_iter()
                .map(|hit| word_rank(&hit.word.id, hit.score))
                .collect(),
            SearchMode::English => lexical::search_english(corpus.valid_words(), query, page)
                .into_iter()
                .map(|hit| word_rank(&hit.word.id, hit.score))
                .collect(),
            SearchMode::Sentences => lexical::search_sentences(corpus.sentences(), query, page)
                .into_iter()
                .map(|hit| Ranked {
                    id: hit.sentence.id.clone(),
                    kind: RecordKind::Sentence,
                    score: hit.score as f64,
                })
                .collect(),
            SearchMode::Smart => corpus.tfidf().search(query, page),
            SearchMode::Semantic => {
                match self.semantic_search(query, request.semantic_kind, page).await {
                    Ok(results) => results,
                    Err(err) if err.is_model_failure() => {
                        warn!(error = %err, "semantic search unavailable, using tf-idf");
                        degraded = true;
                        corpus.tfidf().search(query, page)
                    }
                    Err(err) => return Err(err),
                }
            }
            SearchMode::Hybrid => {
                // Both sides are ranked in full so that every page slices the same fusion.
                let lexical = corpus.tfidf().search(query, Page::all());
                let semantic = match self
                    .semantic_search(query, SemanticKind::Words, Page::all())
                    .await
                {
                    Ok(results) => Some(results),
                    Err(err) if err.is_model_failure() => {
                        warn!(error = %err, "semantic search unavailable, hybrid uses tf-idf only");
                        degraded = true;
                        None
                    }
                    Err(err) => return Err(err),
                };
                let fused = fuse(&lexical, semantic.as_deref(), self.config.fusion, usize::MAX);
                page.apply(fused)
            }
        };

        debug!(
            mode = %request.mode,
            query,
            hits = ranked.len(),
            degraded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search"
        );
        Ok(SearchOutcome {
            query: query.to_string(),
            mode: request.mode,
            page,
            degraded,
            hits: ranked.into_iter().map(SearchHit::from).collect(),
        })
    }

    async fn semantic_search(
        &self,
        query: &str,
        kind: SemanticKind,
        page: Page,
    ) -> Result<Vec<Ranked>> {
        self.semantic_engine().await?.search(query, kind, page).await
    }
}

fn word_rank(id: &RecordId, score: i64) -> Ranked {
    Ranked {
        id: id.clone(),
        kind: RecordKind::Word,
        score: score as f64,
    }
}
