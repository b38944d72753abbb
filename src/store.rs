//! Corpus loading.
//!
//! A [`CorpusSource`] fetches raw documents; [`CorpusStore`] turns them into
//! an immutable [`Corpus`] snapshot and an [`EmbeddingStore`], each loaded at
//! most once. Concurrent first requests wait on the same in-flight load. A
//! failed load is not remembered, so the next request tries again.

use crate::data::{EmbeddingsDocument, RecordId, Sentence, Word};
use crate::error::{DictionaryError, Result};
use crate::semantic::EmbeddingStore;
use crate::tfidf::TfIdfIndex;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::io::{Cursor, ErrorKind};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{info, warn};

pub const WORDS_PATH: &str = "data/words.json";
pub const SENTENCES_PATH: &str = "data/sentences.json";
pub const EMBEDDINGS_PATH: &str = "data/embeddings.json";

pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + 'a>>;

/// Where corpus documents come from. Paths are relative, e.g. `data/words.json`.
pub trait CorpusSource: Send + Sync {
    fn fetch<'a>(&'a self, path: &'a str) -> FetchFuture<'a>;
}

/// Reads documents below a site root. A missing `x.json` falls back to a
/// zstd-compressed `x.json.zst` next to it.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let plain = self.root.join(path);
        match tokio::fs::read(&plain).await {
            Ok(bytes) => return Ok(bytes),
            Err(err) if err.kind() != ErrorKind::NotFound => {
                return Err(DictionaryError::data_unavailable(
                    plain.display().to_string(),
                    err,
                ));
            }
            Err(_) => {}
        }

        let compressed = self.root.join(format!("{path}.zst"));
        let bytes = tokio::fs::read(&compressed).await.map_err(|err| {
            DictionaryError::data_unavailable(plain.display().to_string(), err)
        })?;
        zstd::decode_all(Cursor::new(bytes)).map_err(|err| {
            DictionaryError::data_unavailable(compressed.display().to_string(), err)
        })
    }
}

impl CorpusSource for DirectorySource {
    fn fetch<'a>(&'a self, path: &'a str) -> FetchFuture<'a> {
        Box::pin(self.read(path))
    }
}

/// Serves documents held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    documents: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, path: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.documents.insert(path.into(), body.into());
        self
    }
}

impl CorpusSource for MemorySource {
    fn fetch<'a>(&'a self, path: &'a str) -> FetchFuture<'a> {
        let result = self
            .documents
            .get(path)
            .cloned()
            .ok_or_else(|| DictionaryError::data_unavailable(path, "no such document"));
        Box::pin(async move { result })
    }
}

/// Immutable snapshot of the dictionary records plus their TF-IDF index.
#[derive(Debug)]
pub struct Corpus {
    words: Vec<Word>,
    valid: Vec<usize>,
    sentences: Vec<Sentence>,
    by_id: HashMap<RecordId, usize>,
    tfidf: TfIdfIndex,
}

impl Corpus {
    pub fn new(words: Vec<Word>, sentences: Vec<Sentence>) -> Self {
        let valid: Vec<usize> = words
            .iter()
            .enumerate()
            .filter(|(_, word)| word.is_valid())
            .map(|(index, _)| index)
            .collect();
        let mut by_id = HashMap::with_capacity(words.len());
        for (index, word) in words.iter().enumerate() {
            by_id.entry(word.id.clone()).or_insert(index);
        }
        let tfidf = TfIdfIndex::build(
            valid
                .iter()
                .map(|&index| (words[index].id.clone(), words[index].document_text())),
        );
        Self {
            words,
            valid,
            sentences,
            by_id,
            tfidf,
        }
    }

    /// Parses `words.json` and `sentences.json` bodies. Records that do not fit
    /// the expected shape are skipped.
    pub fn from_json(words: &[u8], sentences: &[u8]) -> Result<Self> {
        let words = parse_records::<Word>(WORDS_PATH, words)?;
        let sentences = parse_records::<Sentence>(SENTENCES_PATH, sentences)?;
        Ok(Self::new(words, sentences))
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    /// Words with at least one gloss or definition, in corpus order.
    pub fn valid_words(&self) -> impl Iterator<Item = &Word> + '_ {
        self.valid.iter().map(|&index| &self.words[index])
    }

    pub fn valid_word_count(&self) -> usize {
        self.valid.len()
    }

    pub(crate) fn valid_word_at(&self, position: usize) -> Option<&Word> {
        self.valid.get(position).map(|&index| &self.words[index])
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    pub fn tfidf(&self) -> &TfIdfIndex {
        &self.tfidf
    }

    pub fn word(&self, id: &RecordId) -> Option<&Word> {
        self.by_id.get(id).map(|&index| &self.words[index])
    }

    /// Resolves a request parameter: a numeric or string id, or a `slug_guid`
    /// whose suffix after the last `_` is a word GUID.
    pub fn word_by_param(&self, param: &str) -> Option<&Word> {
        let param = param.trim();
        if let Ok(numeric) = param.parse::<i64>() {
            if let Some(word) = self.word(&RecordId::Num(numeric)) {
                return Some(word);
            }
        }
        self.word(&RecordId::Text(param.to_string()))
            .or_else(|| self.word_by_slug(param))
    }

    pub fn word_by_slug(&self, slug_guid: &str) -> Option<&Word> {
        let guid = slug_guid.rsplit('_').next().filter(|guid| !guid.is_empty())?;
        self.words
            .iter()
            .find(|word| word.guid.as_deref() == Some(guid))
    }

    pub fn sentence(&self, id: &RecordId) -> Option<&Sentence> {
        self.sentences.iter().find(|sentence| &sentence.id == id)
    }

    pub fn sentences_for_word(&self, id: &RecordId) -> Vec<&Sentence> {
        self.sentences
            .iter()
            .filter(|sentence| sentence.is_owned_by(id))
            .collect()
    }
}

fn parse_records<T: DeserializeOwned>(path: &str, bytes: &[u8]) -> Result<Vec<T>> {
    let values: Vec<serde_json::Value> = serde_json::from_slice(bytes)
        .map_err(|err| DictionaryError::data_unavailable(path, err))?;
    let total = values.len();
    let records: Vec<T> = values
        .into_iter()
        .enumerate()
        .filter_map(|(position, value)| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(path, position, error = %err, "skipping malformed record");
                None
            }
        })
        .collect();
    if records.len() < total {
        warn!(path, skipped = total - records.len(), "some records were skipped");
    }
    Ok(records)
}

/// Owns a source and the lazily loaded snapshots built from it.
pub struct CorpusStore {
    source: Arc<dyn CorpusSource>,
    corpus: OnceCell<Arc<Corpus>>,
    embeddings: OnceCell<Arc<EmbeddingStore>>,
}

impl CorpusStore {
    pub fn new(source: Arc<dyn CorpusSource>) -> Self {
        Self {
            source,
            corpus: OnceCell::new(),
            embeddings: OnceCell::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.corpus.initialized()
    }

    pub async fn corpus(&self) -> Result<Arc<Corpus>> {
        self.corpus
            .get_or_try_init(|| self.load_corpus())
            .await
            .cloned()
    }

    pub async fn embeddings(&self) -> Result<Arc<EmbeddingStore>> {
        self.embeddings
            .get_or_try_init(|| self.load_embeddings())
            .await
            .cloned()
    }

    async fn load_corpus(&self) -> Result<Arc<Corpus>> {
        let started = Instant::now();
        let words = self.source.fetch(WORDS_PATH).await?;
        let sentences = self.source.fetch(SENTENCES_PATH).await?;
        let corpus = tokio::task::spawn_blocking(move || Corpus::from_json(&words, &sentences))
            .await
            .map_err(|err| DictionaryError::data_unavailable(WORDS_PATH, err))??;
        info!(
            words = corpus.words().len(),
            valid = corpus.valid_word_count(),
            sentences = corpus.sentences().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "corpus loaded"
        );
        Ok(Arc::new(corpus))
    }

    async fn load_embeddings(&self) -> Result<Arc<EmbeddingStore>> {
        let started = Instant::now();
        let bytes = self.source.fetch(EMBEDDINGS_PATH).await?;
        let document: EmbeddingsDocument = serde_json::from_slice(&bytes)
            .map_err(|err| DictionaryError::data_unavailable(EMBEDDINGS_PATH, err))?;
        let store = EmbeddingStore::from_document(document);
        info!(
            model = store.model(),
            dimensions = store.dimensions(),
            words = store.words().len(),
            sentences = store.sentences().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "embeddings loaded"
        );
        Ok(Arc::new(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::Page;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const WORDS: &str = r#"[
        {"id": 1, "guid": "aaa-111", "forms": {"par": "paa"}, "senses": [{"glosses": {"en": "water"}}]},
        {"id": "x7", "forms": {"par": "tuba"}, "senses": [{"definitions": {"en": "pine nut"}}]},
        {"id": 3, "forms": {"par": "kwi"}, "senses": []},
        {"forms": {"par": "no id"}},
        "not a record"
    ]"#;
    const SENTENCES: &str = r#"[
        {"id": 10, "wordId": 1, "forms": {"par": "paa hibi"}},
        {"id": 11, "wordIds": [3, 1]},
        {"id": 12, "wordId": 3}
    ]"#;

    struct CountingSource {
        inner: MemorySource,
        fetches: AtomicUsize,
    }

    impl CorpusSource for CountingSource {
        fn fetch<'a>(&'a self, path: &'a str) -> FetchFuture<'a> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch(path)
        }
    }

    fn memory() -> MemorySource {
        MemorySource::new()
            .with_document(WORDS_PATH, WORDS)
            .with_document(SENTENCES_PATH, SENTENCES)
    }

    #[test]
    fn malformed_records_are_skipped() {
        let corpus = Corpus::from_json(WORDS.as_bytes(), SENTENCES.as_bytes()).unwrap();
        assert_eq!(corpus.words().len(), 3);
        assert_eq!(corpus.valid_word_count(), 2);
        assert_eq!(corpus.tfidf().len(), 2);
        assert_eq!(corpus.sentences().len(), 3);
    }

    #[test]
    fn primary_form_follows_document_order() {
        let corpus = Corpus::from_json(
            br#"[{"id": 1, "forms": {"par": "paa", "en": "pa"}, "senses": [{"glosses": {"en": "water"}}]}]"#,
            b"[]",
        )
        .unwrap();
        assert_eq!(corpus.words()[0].primary_form(), "paa");
        assert_eq!(corpus.words()[0].forms.tags().collect::<Vec<_>>(), vec!["par", "en"]);
    }

    #[test]
    fn words_with_odd_sub_fields_stay_searchable() {
        let words = br#"[
            {"id": 1, "forms": {"par": "paa"},
             "senses": [{"glosses": {"en": "water"}, "examples": null}]},
            {"id": 2, "forms": {"par": "paavi"},
             "senses": [{"glosses": {"en": "lake water"},
                         "examples": [{"forms": {"par": "paavi"}, "notes": [{"lang": "en"}]}]}]}
        ]"#;
        let corpus = Corpus::from_json(words, b"[]").unwrap();
        assert_eq!(corpus.valid_word_count(), 2);
        let hits = crate::lexical::search_english(corpus.valid_words(), "water", Page::new(10, 0));
        let ids: Vec<String> = hits.iter().map(|hit| hit.word.id.to_string()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn unparseable_document_is_a_data_error() {
        let err = Corpus::from_json(b"{not json", SENTENCES.as_bytes()).unwrap_err();
        assert!(matches!(err, DictionaryError::DataUnavailable { .. }));
    }

    #[test]
    fn lookups_by_param_slug_and_owner() {
        let corpus = Corpus::from_json(WORDS.as_bytes(), SENTENCES.as_bytes()).unwrap();
        assert_eq!(corpus.word_by_param("1").unwrap().primary_form(), "paa");
        assert_eq!(corpus.word_by_param("x7").unwrap().primary_form(), "tuba");
        assert_eq!(
            corpus.word_by_param("paa-water_aaa-111").unwrap().id,
            RecordId::Num(1)
        );
        assert!(corpus.word_by_param("404").is_none());

        let owned: Vec<String> = corpus
            .sentences_for_word(&RecordId::Num(1))
            .iter()
            .map(|s| s.id.to_string())
            .collect();
        assert_eq!(owned, vec!["10", "11"]);
    }

    #[tokio::test]
    async fn corpus_is_fetched_once() {
        let source = Arc::new(CountingSource {
            inner: memory(),
            fetches: AtomicUsize::new(0),
        });
        let store = CorpusStore::new(source.clone());
        assert!(!store.is_loaded());
        let first = store.corpus().await.unwrap();
        let second = store.corpus().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(store.is_loaded());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_loads_coalesce() {
        let source = Arc::new(CountingSource {
            inner: memory(),
            fetches: AtomicUsize::new(0),
        });
        let store = Arc::new(CorpusStore::new(source.clone()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.corpus().await.map(|c| c.words().len()) })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 3);
        }
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_loads_are_retried() {
        let source = Arc::new(CountingSource {
            inner: MemorySource::new(),
            fetches: AtomicUsize::new(0),
        });
        let store = CorpusStore::new(source.clone());
        assert!(store.corpus().await.is_err());
        assert!(store.corpus().await.is_err());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
        assert!(!store.is_loaded());
    }

    #[tokio::test]
    async fn directory_source_reads_plain_and_compressed_files() {
        let root = std::env::temp_dir().join(format!("kubishi-store-{}", std::process::id()));
        let data = root.join("data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(data.join("words.json"), WORDS).unwrap();
        let compressed = zstd::encode_all(Cursor::new(SENTENCES.as_bytes()), 3).unwrap();
        std::fs::write(data.join("sentences.json.zst"), compressed).unwrap();

        let store = CorpusStore::new(Arc::new(DirectorySource::new(&root)));
        let corpus = store.corpus().await.unwrap();
        assert_eq!(corpus.sentences().len(), 3);

        let err = store.embeddings().await.unwrap_err();
        assert!(matches!(err, DictionaryError::DataUnavailable { .. }));
        std::fs::remove_dir_all(&root).unwrap();
    }
}
