//! Embedding-based ranking.
//!
//! Stored vectors come from `embeddings.json`; query vectors come from an
//! [`EmbeddingModel`] supplied by the host. The model must be the one that
//! produced the corpus, so readiness requires matching model ids.

use crate::data::{EmbeddingRow, EmbeddingsDocument, RecordId};
use crate::error::{DictionaryError, Result};
use crate::float16;
use crate::search::{Page, Ranked, RecordKind};
use lru::LruCache;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::future::Future;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

pub const DEFAULT_MIN_SIMILARITY: f64 = 0.3;

pub type EmbedFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<f32>>> + Send + 'a>>;

/// Turns query text into a vector in the corpus embedding space.
pub trait EmbeddingModel: Send + Sync {
    fn model_id(&self) -> &str;
    fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a>;
}

impl<M: EmbeddingModel + ?Sized> EmbeddingModel for Arc<M> {
    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a> {
        (**self).embed(text)
    }
}

/// Memoizes query embeddings; repeated searches skip the model entirely.
pub struct CachedModel<M> {
    inner: M,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl<M: EmbeddingModel> CachedModel<M> {
    pub fn new(inner: M, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }
}

impl<M: EmbeddingModel> EmbeddingModel for CachedModel<M> {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a> {
        Box::pin(async move {
            let cached = self.cache.lock().get(text).cloned();
            if let Some(vector) = cached {
                return Ok(vector);
            }
            let vector = self.inner.embed(text).await?;
            self.cache.lock().put(text.to_string(), vector.clone());
            Ok(vector)
        })
    }
}

/// Runs an external program per query: the text goes to stdin, a JSON array
/// of floats is expected on stdout.
#[derive(Debug, Clone)]
pub struct CommandModel {
    model_id: String,
    program: String,
    args: Vec<String>,
}

impl CommandModel {
    pub fn new(model_id: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            model_id: model_id.into(),
            program: program.into(),
            args,
        }
    }

    /// Splits a shell-style command line on whitespace. No quoting support.
    pub fn from_command_line(model_id: impl Into<String>, command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(model_id, program, parts.collect()))
    }

    async fn run(&self, text: &str) -> Result<Vec<f32>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                DictionaryError::ModelUnavailable(format!("spawn {}: {err}", self.program))
            })?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|err| DictionaryError::ModelUnavailable(err.to_string()))?;
        }
        let output = child
            .wait_with_output()
            .await
            .map_err(|err| DictionaryError::ModelUnavailable(err.to_string()))?;
        if !output.status.success() {
            return Err(DictionaryError::ModelUnavailable(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }
        serde_json::from_slice(&output.stdout).map_err(|err| {
            DictionaryError::ModelUnavailable(format!("unreadable embedding output: {err}"))
        })
    }
}

impl EmbeddingModel for CommandModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a> {
        Box::pin(self.run(text))
    }
}

#[derive(Debug, Clone)]
pub struct StoredVector {
    pub id: RecordId,
    /// Owning word, for sentence vectors.
    pub word_id: Option<RecordId>,
    pub vector: Vec<f32>,
}

/// Decoded corpus embeddings. All vectors share one dimensionality.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingStore {
    model: String,
    dimensions: usize,
    float16: bool,
    words: Vec<StoredVector>,
    sentences: Vec<StoredVector>,
}

impl EmbeddingStore {
    /// Decodes every row, skipping rows that fail to decode or whose length
    /// disagrees with the first good row.
    pub fn from_document(document: EmbeddingsDocument) -> Self {
        let half_precision = document.float16;
        let mut dimensions = 0usize;
        let mut words = Vec::with_capacity(document.words.len());
        let mut sentences = Vec::with_capacity(document.sentences.len());

        for (rows, target) in [
            (document.words, &mut words),
            (document.sentences, &mut sentences),
        ] {
            for row in rows {
                let Some(vector) = decode_row(&row, half_precision) else {
                    warn!(id = %row.id, "skipping malformed embedding row");
                    continue;
                };
                if dimensions == 0 {
                    dimensions = vector.len();
                }
                if vector.len() != dimensions || vector.is_empty() {
                    warn!(
                        id = %row.id,
                        len = vector.len(),
                        expected = dimensions,
                        "skipping embedding with wrong dimensionality"
                    );
                    continue;
                }
                target.push(StoredVector {
                    id: row.id,
                    word_id: row.word_id,
                    vector,
                });
            }
        }

        if document.dimensions != 0 && document.dimensions != dimensions && dimensions != 0 {
            warn!(
                declared = document.dimensions,
                observed = dimensions,
                "embeddings declare a different dimensionality than they carry"
            );
        }

        Self {
            model: document.model,
            dimensions,
            float16: half_precision,
            words,
            sentences,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn is_float16(&self) -> bool {
        self.float16
    }

    pub fn words(&self) -> &[StoredVector] {
        &self.words
    }

    pub fn sentences(&self) -> &[StoredVector] {
        &self.sentences
    }

    pub fn word_vector(&self, id: &RecordId) -> Option<&[f32]> {
        self.words
            .iter()
            .find(|stored| &stored.id == id)
            .map(|stored| stored.vector.as_slice())
    }
}

fn decode_row(row: &EmbeddingRow, half_precision: bool) -> Option<Vec<f32>> {
    if half_precision {
        let halves = row
            .e
            .iter()
            .map(|value| value.as_u64().and_then(|bits| u16::try_from(bits).ok()))
            .collect::<Option<Vec<u16>>>()?;
        Some(float16::decode(&halves))
    } else {
        row.e
            .iter()
            .map(|value| value.as_f64().map(|v| v as f32))
            .collect()
    }
}

/// Which stored vectors a semantic query ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SemanticKind {
    #[default]
    Words,
    Sentences,
    Both,
}

/// `dot(a, b) / (|a| |b|)`, or 0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Ranks stored vectors against `query`, keeping those at or above `min_similarity`.
pub fn rank(
    store: &EmbeddingStore,
    query: &[f32],
    kind: SemanticKind,
    min_similarity: f64,
    page: Page,
) -> Vec<Ranked> {
    let words = matches!(kind, SemanticKind::Words | SemanticKind::Both)
        .then_some(store.words.iter().map(|stored| (stored, RecordKind::Word)));
    let sentences = matches!(kind, SemanticKind::Sentences | SemanticKind::Both).then_some(
        store
            .sentences
            .iter()
            .map(|stored| (stored, RecordKind::Sentence)),
    );

    let mut results: Vec<Ranked> = words
        .into_iter()
        .flatten()
        .chain(sentences.into_iter().flatten())
        .filter_map(|(stored, kind)| {
            let score = cosine_similarity(query, &stored.vector);
            (score >= min_similarity).then(|| Ranked {
                id: stored.id.clone(),
                kind,
                score,
            })
        })
        .collect();
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    page.apply(results)
}

/// Corpus embeddings paired with the model that can embed queries for them.
#[derive(Clone)]
pub struct SemanticEngine {
    store: Arc<EmbeddingStore>,
    model: Option<Arc<dyn EmbeddingModel>>,
    min_similarity: f64,
}

impl SemanticEngine {
    pub fn new(
        store: Arc<EmbeddingStore>,
        model: Option<Arc<dyn EmbeddingModel>>,
        min_similarity: f64,
    ) -> Self {
        Self {
            store,
            model,
            min_similarity,
        }
    }

    pub fn store(&self) -> &EmbeddingStore {
        &self.store
    }

    pub fn is_ready(&self) -> bool {
        self.ready_model().is_ok()
    }

    fn ready_model(&self) -> Result<&dyn EmbeddingModel> {
        let model = self
            .model
            .as_deref()
            .ok_or_else(|| DictionaryError::ModelUnavailable("no embedding model configured".into()))?;
        if self.store.dimensions() == 0 {
            return Err(DictionaryError::ModelUnavailable(
                "corpus carries no embeddings".into(),
            ));
        }
        if !self.store.model().is_empty() && model.model_id() != self.store.model() {
            return Err(DictionaryError::ModelUnavailable(format!(
                "model {} does not match corpus model {}",
                model.model_id(),
                self.store.model()
            )));
        }
        Ok(model)
    }

    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let model = self.ready_model()?;
        let vector = model.embed(query).await?;
        if vector.len() != self.store.dimensions() {
            return Err(DictionaryError::DimensionMismatch {
                expected: self.store.dimensions(),
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    pub async fn search(&self, query: &str, kind: SemanticKind, page: Page) -> Result<Vec<Ranked>> {
        let vector = self.embed_query(query).await?;
        let results = rank(&self.store, &vector, kind, self.min_similarity, page);
        debug!(query, hits = results.len(), "semantic search");
        Ok(results)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    /// Looks queries up in a fixed table; unknown text is an error.
    pub(crate) struct TableModel {
        pub id: String,
        pub table: HashMap<String, Vec<f32>>,
        pub calls: AtomicUsize,
    }

    impl TableModel {
        pub(crate) fn new(id: &str, entries: &[(&str, Vec<f32>)]) -> Self {
            Self {
                id: id.to_string(),
                table: entries
                    .iter()
                    .map(|(text, vector)| (text.to_string(), vector.clone()))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl EmbeddingModel for TableModel {
        fn model_id(&self) -> &str {
            &self.id
        }

        fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            let result = self
                .table
                .get(text)
                .cloned()
                .ok_or_else(|| DictionaryError::ModelUnavailable(format!("no vector for {text}")));
            Box::pin(async move { result })
        }
    }

    fn document(half_precision: bool) -> EmbeddingsDocument {
        let encode = |v: [f32; 3]| -> Vec<serde_json::Value> {
            if half_precision {
                float16::encode(&v).into_iter().map(serde_json::Value::from).collect()
            } else {
                v.into_iter().map(serde_json::Value::from).collect()
            }
        };
        serde_json::from_value(serde_json::json!({
            "model": "test-model",
            "dimensions": 3,
            "float16": half_precision,
            "words": [
                {"id": 1, "e": encode([1.0, 0.0, 0.0])},
                {"id": 2, "e": encode([0.6, 0.8, 0.0])},
                {"id": 3, "e": encode([0.0, 0.0, 1.0])},
                {"id": 4, "e": [1, 2]},
                {"id": 5, "e": ["x", "y", "z"]}
            ],
            "sentences": [
                {"id": 10, "wordId": 2, "e": encode([0.0, 1.0, 0.0])}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn cosine_handles_zero_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-9);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn store_decodes_both_encodings_and_skips_bad_rows() {
        for half_precision in [true, false] {
            let store = EmbeddingStore::from_document(document(half_precision));
            assert_eq!(store.dimensions(), 3);
            assert_eq!(store.words().len(), 3);
            assert_eq!(store.sentences().len(), 1);
            assert_eq!(store.sentences()[0].word_id, Some(RecordId::Num(2)));
            let second = store.word_vector(&RecordId::Num(2)).unwrap();
            assert!((second[1] - 0.8).abs() < 1e-3);
        }
    }

    #[test]
    fn rank_applies_floor_and_kind() {
        let store = EmbeddingStore::from_document(document(false));
        let query = [1.0, 0.2, 0.0];
        let words = rank(&store, &query, SemanticKind::Words, 0.3, Page::new(10, 0));
        let ids: Vec<String> = words.iter().map(|r| r.id.to_string()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert!(words.iter().all(|r| r.kind == RecordKind::Word));

        let both = rank(&store, &[0.0, 1.0, 0.0], SemanticKind::Both, 0.3, Page::new(10, 0));
        assert_eq!(both[0].kind, RecordKind::Sentence);
        assert_eq!(both[1].id, RecordId::Num(2));

        let sentences = rank(&store, &[0.0, 0.0, 1.0], SemanticKind::Sentences, 0.3, Page::new(10, 0));
        assert!(sentences.is_empty());
    }

    #[tokio::test]
    async fn engine_requires_matching_model() {
        let store = Arc::new(EmbeddingStore::from_document(document(true)));
        let none = SemanticEngine::new(store.clone(), None, DEFAULT_MIN_SIMILARITY);
        assert!(!none.is_ready());

        let wrong: Arc<dyn EmbeddingModel> = Arc::new(TableModel::new("other", &[]));
        let mismatched = SemanticEngine::new(store.clone(), Some(wrong), DEFAULT_MIN_SIMILARITY);
        assert!(!mismatched.is_ready());
        let err = mismatched.search("x", SemanticKind::Words, Page::new(5, 0)).await.unwrap_err();
        assert!(err.is_model_failure());

        let model: Arc<dyn EmbeddingModel> =
            Arc::new(TableModel::new("test-model", &[("north", vec![1.0, 0.0, 0.0]), ("short", vec![1.0])]));
        let engine = SemanticEngine::new(store, Some(model), DEFAULT_MIN_SIMILARITY);
        assert!(engine.is_ready());
        let hits = engine.search("north", SemanticKind::Words, Page::new(5, 0)).await.unwrap();
        assert_eq!(hits[0].id, RecordId::Num(1));
        let err = engine.search("short", SemanticKind::Words, Page::new(5, 0)).await.unwrap_err();
        assert!(matches!(err, DictionaryError::DimensionMismatch { expected: 3, actual: 1 }));
    }

    #[tokio::test]
    async fn cached_model_calls_inner_once_per_text() {
        let cached = CachedModel::new(TableModel::new("m", &[("a", vec![1.0])]), 2);
        cached.embed("a").await.unwrap();
        cached.embed("a").await.unwrap();
        assert_eq!(cached.inner.calls.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(cached.cached_len(), 1);
        assert!(cached.embed("missing").await.is_err());
    }

    #[test]
    fn command_line_splits_program_and_args() {
        let model = CommandModel::from_command_line("m", "python3 embed.py --normalize").unwrap();
        assert_eq!(model.program, "python3");
        assert_eq!(model.args, vec!["embed.py", "--normalize"]);
        assert!(CommandModel::from_command_line("m", "   ").is_none());
    }
}
