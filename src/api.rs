//! Payload shapes returned to HTTP and `--json` callers.

use crate::data::{Example, RecordId, Sense, Sentence, Word};
use crate::search::{Page, RecordKind, SearchHit};
use crate::store::Corpus;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
pub struct WordPayload {
    pub id: RecordId,
    pub lexical_unit: String,
    pub word: String,
    #[serde(rename = "dateCreated")]
    pub date_created: Option<String>,
    #[serde(rename = "dateModified")]
    pub date_modified: Option<String>,
    pub traits: BTreeMap<&'static str, String>,
    pub senses: Vec<SensePayload>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SensePayload {
    pub id: Option<String>,
    pub grammatical_info: Option<String>,
    pub gloss: Option<String>,
    pub definition: Option<String>,
    pub examples: Vec<ExamplePayload>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExamplePayload {
    pub form: String,
    pub translation: String,
    pub source: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SentencePayload {
    pub id: RecordId,
    pub text: String,
    pub translation: String,
    pub word_ids: Vec<RecordId>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RecordPayload {
    Word(WordPayload),
    Sentence(SentencePayload),
}

/// A search or browse result with its score, when ranked.
#[derive(Debug, Clone, Serialize)]
pub struct Scored<T> {
    #[serde(flatten)]
    pub record: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Listing<T> {
    pub results: Vec<T>,
    pub pagination: Page,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

impl<T> Listing<T> {
    pub fn new(results: Vec<T>, pagination: Page) -> Self {
        Self {
            results,
            pagination,
            degraded: false,
        }
    }
}

impl From<&Word> for WordPayload {
    fn from(word: &Word) -> Self {
        let primary = word.primary_form().to_string();
        let mut traits = BTreeMap::new();
        if let Some(morph_type) = word.morph_type.as_ref().filter(|m| !m.is_empty()) {
            traits.insert("morph-type", morph_type.clone());
        }
        Self {
            id: word.id.clone(),
            lexical_unit: primary.clone(),
            word: primary,
            date_created: non_empty(&word.date_created),
            date_modified: non_empty(&word.date_modified),
            traits,
            senses: word.senses.iter().map(SensePayload::from).collect(),
        }
    }
}

impl From<&Sense> for SensePayload {
    fn from(sense: &Sense) -> Self {
        Self {
            id: non_empty(&sense.id),
            grammatical_info: non_empty(&sense.part_of_speech),
            gloss: sense.glosses.first().map(str::to_string),
            definition: sense.definitions.first().map(str::to_string),
            examples: sense.examples.iter().map(ExamplePayload::from).collect(),
        }
    }
}

impl From<&Example> for ExamplePayload {
    fn from(example: &Example) -> Self {
        Self {
            form: example.forms.first().unwrap_or_default().to_string(),
            translation: example.translations.first().unwrap_or_default().to_string(),
            source: non_empty(&example.source),
            note: example
                .first_note()
                .filter(|note| !note.is_empty())
                .map(str::to_string),
        }
    }
}

impl From<&Sentence> for SentencePayload {
    fn from(sentence: &Sentence) -> Self {
        Self {
            id: sentence.id.clone(),
            text: sentence.forms.first().unwrap_or_default().to_string(),
            translation: sentence.translations.first().unwrap_or_default().to_string(),
            word_ids: sentence.owner_ids().into_iter().cloned().collect(),
            source: non_empty(&sentence.source),
        }
    }
}

/// Resolves ranked hits back to full records. Hits whose record has vanished
/// from the corpus are dropped.
pub fn hydrate(corpus: &Corpus, hits: &[SearchHit]) -> Vec<Scored<RecordPayload>> {
    hits.iter()
        .filter_map(|hit| {
            let record = match hit.kind {
                RecordKind::Word => RecordPayload::Word(corpus.word(&hit.id)?.into()),
                RecordKind::Sentence => RecordPayload::Sentence(corpus.sentence(&hit.id)?.into()),
            };
            Some(Scored {
                record,
                score: Some(hit.score),
            })
        })
        .collect()
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|text| !text.is_empty()).cloned()
}
