//! Record and metadata value types.
//!
//! A [`Record`] is the unit of storage: an id, the raw text, an optional
//! dense embedding, an optional sparse embedding, scalar metadata, and the
//! id of the owning document. Records are immutable once constructed;
//! mutation is performed by delete-and-reinsert.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A scalar metadata value attached to a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Integer(i64),
    /// Floating-point value.
    Float(f64),
    /// Text value.
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::Integer(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

/// A sparse embedding: a mapping from term id to weight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    weights: HashMap<u32, f32>,
}

impl SparseVector {
    /// Create an empty sparse vector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sparse vector from (term id, weight) pairs.
    pub fn from_pairs<I: IntoIterator<Item = (u32, f32)>>(pairs: I) -> Self {
        Self {
            weights: pairs.into_iter().collect(),
        }
    }

    /// Get the weight for a term id, or 0.0 if absent.
    pub fn weight(&self, term_id: u32) -> f32 {
        self.weights.get(&term_id).copied().unwrap_or(0.0)
    }

    /// Number of non-zero terms.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Check whether the vector has no terms.
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Dot product against another sparse vector.
    ///
    /// Iterates the smaller side, so relevance scoring stays linear in the
    /// query's term count.
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small
            .weights
            .iter()
            .map(|(term_id, weight)| weight * large.weight(*term_id))
            .sum()
    }

    /// Iterate over (term id, weight) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&u32, &f32)> {
        self.weights.iter()
    }
}

impl FromIterator<(u32, f32)> for SparseVector {
    fn from_iter<I: IntoIterator<Item = (u32, f32)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

/// The unit of storage: immutable once constructed.
///
/// Build a record with [`Record::new`] and the consuming `with_*` methods:
///
/// ```
/// use xyston::record::Record;
///
/// let record = Record::new("r1", "some text")
///     .with_doc_id("doc-1")
///     .with_embedding(vec![0.1, 0.2, 0.3])
///     .with_metadata("lang", "en");
/// assert_eq!(record.id(), "r1");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    id: String,
    text: String,
    embedding: Option<Vec<f32>>,
    sparse: Option<SparseVector>,
    metadata: HashMap<String, FieldValue>,
    doc_id: String,
}

impl Record {
    /// Create a new record with the given id and raw text.
    pub fn new<S: Into<String>, T: Into<String>>(id: S, text: T) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            embedding: None,
            sparse: None,
            metadata: HashMap::new(),
            doc_id: String::new(),
        }
    }

    /// Create a record with a generated (UUID v4) id.
    pub fn with_generated_id<T: Into<String>>(text: T) -> Self {
        Self::new(Uuid::new_v4().to_string(), text)
    }

    /// Set the owning document reference id.
    pub fn with_doc_id<S: Into<String>>(mut self, doc_id: S) -> Self {
        self.doc_id = doc_id.into();
        self
    }

    /// Attach a dense embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Attach a sparse embedding.
    pub fn with_sparse(mut self, sparse: SparseVector) -> Self {
        self.sparse = Some(sparse);
        self
    }

    /// Attach a metadata entry.
    pub fn with_metadata<K: Into<String>, V: Into<FieldValue>>(mut self, key: K, value: V) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The record id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The raw text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The dense embedding, if any.
    pub fn embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref()
    }

    /// The sparse embedding, if any.
    pub fn sparse(&self) -> Option<&SparseVector> {
        self.sparse.as_ref()
    }

    /// The metadata map.
    pub fn metadata(&self) -> &HashMap<String, FieldValue> {
        &self.metadata
    }

    /// The owning document reference id.
    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    /// Length of the dense embedding, or None if absent.
    pub fn dimension(&self) -> Option<usize> {
        self.embedding.as_ref().map(|e| e.len())
    }
}
