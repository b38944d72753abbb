use serde::de::{self, DeserializeOwned, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque record key. The build pipeline emits integers, hand-edited corpora
/// sometimes carry strings, so both are accepted and compared as written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Num(i64),
    Text(String),
}

impl RecordId {
    /// Matches a request parameter against this id: `"7"` matches both `7` and `"7"`.
    pub fn matches_param(&self, param: &str) -> bool {
        match self {
            RecordId::Text(text) => text == param,
            RecordId::Num(value) => param.trim().parse::<i64>().ok() == Some(*value),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Num(value) => write!(f, "{value}"),
            RecordId::Text(text) => write!(f, "{text}"),
        }
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        RecordId::Num(value)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        RecordId::Text(value.to_string())
    }
}

/// Language-tag to text mapping that keeps document order.
///
/// The first entry is the record's primary rendering, so a hash map is not an
/// option here. Non-string values are dropped while reading instead of failing
/// the whole record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LangMap {
    entries: Vec<(String, String)>,
}

impl LangMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: impl Into<String>, text: impl Into<String>) {
        let tag = tag.into();
        let text = text.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == tag) {
            Some(slot) => slot.1 = text,
            None => self.entries.push((tag, text)),
        }
    }

    pub fn first(&self) -> Option<&str> {
        self.entries.first().map(|(_, text)| text.as_str())
    }

    pub fn get(&self, tag: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == tag)
            .map(|(_, text)| text.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(_, text)| text.as_str())
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(tag, _)| tag.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LangMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = LangMap::new();
        for (tag, text) in iter {
            map.insert(tag, text);
        }
        map
    }
}

impl Serialize for LangMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (tag, text) in &self.entries {
            map.serialize_entry(tag, text)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for LangMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LangMapVisitor;

        impl<'de> Visitor<'de> for LangMapVisitor {
            type Value = LangMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of language tags to text")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<LangMap, A::Error> {
                let mut map = LangMap::new();
                while let Some((tag, value)) =
                    access.next_entry::<String, serde_json::Value>()?
                {
                    if let serde_json::Value::String(text) = value {
                        map.insert(tag, text);
                    }
                }
                Ok(map)
            }

            fn visit_unit<E: de::Error>(self) -> Result<LangMap, E> {
                Ok(LangMap::new())
            }

            fn visit_none<E: de::Error>(self) -> Result<LangMap, E> {
                Ok(LangMap::new())
            }
        }

        deserializer.deserialize_any(LangMapVisitor)
    }
}

/// Reads an optional field, treating a value of the wrong shape as absent.
fn lenient_option<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| serde_json::from_value(value).ok()))
}

/// Reads a list field. `null` or a non-list becomes empty and items of the
/// wrong shape are dropped.
fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::Array(items)) => Ok(items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect()),
        _ => Ok(Vec::new()),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Example {
    pub forms: LangMap,
    pub translations: LangMap,
    #[serde(deserialize_with = "lenient_option")]
    pub source: Option<String>,
    #[serde(deserialize_with = "lenient_option")]
    pub note: Option<String>,
    #[serde(deserialize_with = "lenient_vec")]
    pub notes: Vec<String>,
}

impl Example {
    /// First note, whether it was exported singly or as a list.
    pub fn first_note(&self) -> Option<&str> {
        self.note
            .as_deref()
            .or_else(|| self.notes.first().map(String::as_str))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Sense {
    #[serde(deserialize_with = "lenient_option")]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient_option")]
    pub part_of_speech: Option<String>,
    pub glosses: LangMap,
    pub definitions: LangMap,
    #[serde(deserialize_with = "lenient_vec")]
    pub examples: Vec<Example>,
}

impl Sense {
    pub fn has_meaning(&self) -> bool {
        !self.glosses.is_empty() || !self.definitions.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Word {
    pub id: RecordId,
    #[serde(default, deserialize_with = "lenient_option")]
    pub guid: Option<String>,
    #[serde(default, deserialize_with = "lenient_option")]
    pub slug: Option<String>,
    /// Headword as written by the build pipeline; mirrors the first form.
    #[serde(default, rename = "word", deserialize_with = "lenient_option")]
    pub headword: Option<String>,
    #[serde(default)]
    pub forms: LangMap,
    #[serde(default, deserialize_with = "lenient_option")]
    pub morph_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_option")]
    pub date_created: Option<String>,
    #[serde(default, deserialize_with = "lenient_option")]
    pub date_modified: Option<String>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub senses: Vec<Sense>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub notes: Vec<String>,
}

impl Word {
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            guid: None,
            slug: None,
            headword: None,
            forms: LangMap::new(),
            morph_type: None,
            date_created: None,
            date_modified: None,
            senses: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// The first form in document order, or `""` when the record has none.
    pub fn primary_form(&self) -> &str {
        self.forms.first().unwrap_or("")
    }

    /// Eligible for browse, random and search: some sense carries a gloss or definition.
    pub fn is_valid(&self) -> bool {
        self.senses.iter().any(Sense::has_meaning)
    }

    pub fn has_examples(&self) -> bool {
        self.senses.iter().any(|sense| !sense.examples.is_empty())
    }

    /// Definitions then glosses of every sense, space separated and lowercased.
    pub fn meaning_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        for sense in &self.senses {
            parts.extend(sense.definitions.values());
            parts.extend(sense.glosses.values());
        }
        parts.join(" ").to_lowercase()
    }

    /// Document text indexed by TF-IDF: headword, forms, definitions and glosses.
    pub fn document_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(headword) = self.headword.as_deref() {
            parts.push(headword);
        }
        parts.extend(self.forms.values());
        for sense in &self.senses {
            parts.extend(sense.definitions.values());
            parts.extend(sense.glosses.values());
        }
        parts.retain(|part| !part.is_empty());
        parts.join(" ").to_lowercase()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sentence {
    pub id: RecordId,
    #[serde(default, deserialize_with = "lenient_option")]
    pub word_id: Option<RecordId>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub word_ids: Vec<RecordId>,
    #[serde(default)]
    pub forms: LangMap,
    #[serde(default)]
    pub translations: LangMap,
    #[serde(default, deserialize_with = "lenient_option")]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub notes: Vec<String>,
}

impl Sentence {
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            word_id: None,
            word_ids: Vec::new(),
            forms: LangMap::new(),
            translations: LangMap::new(),
            source: None,
            notes: Vec::new(),
        }
    }

    /// Owning words, merging the single `wordId` and the `wordIds` list.
    pub fn owner_ids(&self) -> Vec<&RecordId> {
        let mut owners: Vec<&RecordId> = self.word_id.iter().collect();
        for id in &self.word_ids {
            if !owners.contains(&id) {
                owners.push(id);
            }
        }
        owners
    }

    pub fn is_owned_by(&self, word_id: &RecordId) -> bool {
        self.word_id.as_ref() == Some(word_id) || self.word_ids.contains(word_id)
    }

    /// Forms then translations, space separated and lowercased.
    pub fn search_text(&self) -> String {
        self.forms
            .values()
            .chain(self.translations.values())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

/// One row of `embeddings.json`. `e` holds float16 bit patterns or plain floats
/// depending on the document-level `float16` flag.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingRow {
    pub id: RecordId,
    #[serde(default)]
    pub word_id: Option<RecordId>,
    #[serde(default)]
    pub e: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsDocument {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub dimensions: usize,
    #[serde(default = "default_float16")]
    pub float16: bool,
    #[serde(default)]
    pub words: Vec<EmbeddingRow>,
    #[serde(default)]
    pub sentences: Vec<EmbeddingRow>,
}

fn default_float16() -> bool {
    true
}
