//! Sorting by field values and the collector that does it.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TesseraError};
use crate::index::{DocId, IndexReader};
use crate::search::collector::Collector;
use crate::search::field_cache::{DocValues, FieldCache};
use crate::search::top_docs::{FieldDoc, TopFieldDocs};

/// What a sort field compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortKind {
    /// Relevance, highest first.
    Score,
    /// Document id, lowest first.
    Doc,
    /// Term text of the field.
    String,
    /// Field parsed as `i8`.
    Byte,
    /// Field parsed as `i16`.
    Short,
    /// Field parsed as `i32`.
    Int,
    /// Field parsed as `i64`.
    Long,
    /// Field parsed as `f32`.
    Float,
    /// Field parsed as `f64`.
    Double,
}

/// One criterion of a [`Sort`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortField {
    field: Option<String>,
    kind: SortKind,
    reverse: bool,
}

impl SortField {
    /// Sort by relevance.
    pub fn score() -> Self {
        SortField {
            field: None,
            kind: SortKind::Score,
            reverse: false,
        }
    }

    /// Sort by document id.
    pub fn doc() -> Self {
        SortField {
            field: None,
            kind: SortKind::Doc,
            reverse: false,
        }
    }

    /// Sort by the values of a field.
    pub fn new<F: Into<String>>(field: F, kind: SortKind) -> Result<Self> {
        if matches!(kind, SortKind::Score | SortKind::Doc) {
            return Err(TesseraError::invalid_argument(format!(
                "{kind:?} sorting does not take a field"
            )));
        }
        Ok(SortField {
            field: Some(field.into()),
            kind,
            reverse: false,
        })
    }

    /// Reverse the natural order.
    pub fn reversed(mut self) -> Self {
        self.reverse = !self.reverse;
        self
    }

    /// Field name, for field sorts.
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    /// What is compared.
    pub fn kind(&self) -> SortKind {
        self.kind
    }

    /// Whether the natural order is reversed.
    pub fn is_reverse(&self) -> bool {
        self.reverse
    }

    fn compare(&self, a: &SortValue, b: &SortValue) -> Ordering {
        let natural = match (a, b) {
            (SortValue::Score(x), SortValue::Score(y)) => y.total_cmp(x),
            (SortValue::Doc(x), SortValue::Doc(y)) => x.cmp(y),
            (SortValue::Int(x), SortValue::Int(y)) => x.cmp(y),
            (SortValue::Float(x), SortValue::Float(y)) => x.total_cmp(y),
            (SortValue::Str(x), SortValue::Str(y)) => x.cmp(y),
            _ => Ordering::Equal,
        };
        if self.reverse { natural.reverse() } else { natural }
    }
}

/// A value a hit was sorted by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SortValue {
    /// Relevance score.
    Score(f32),
    /// Document id.
    Doc(DocId),
    /// Any integer field.
    Int(i64),
    /// Any floating-point field.
    Float(f64),
    /// Term text; None when the document has no term.
    Str(Option<String>),
}

/// An ordered list of sort criteria; ties fall back to ascending id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    fields: Vec<SortField>,
}

impl Sort {
    /// Sort by the given criteria.
    pub fn new(fields: Vec<SortField>) -> Result<Self> {
        if fields.is_empty() {
            return Err(TesseraError::invalid_argument("a sort needs at least one field"));
        }
        Ok(Sort { fields })
    }

    /// Relevance, then id.
    pub fn relevance() -> Self {
        Sort {
            fields: vec![SortField::score(), SortField::doc()],
        }
    }

    /// Index order.
    pub fn index_order() -> Self {
        Sort {
            fields: vec![SortField::doc()],
        }
    }

    /// The criteria.
    pub fn fields(&self) -> &[SortField] {
        &self.fields
    }

    /// Whether any criterion compares scores.
    pub fn needs_scores(&self) -> bool {
        self.fields.iter().any(|f| f.kind == SortKind::Score)
    }

    /// Rank order of two hits: `Less` means `a` comes first.
    pub fn compare(&self, a: &FieldDoc, b: &FieldDoc) -> Ordering {
        for (idx, field) in self.fields.iter().enumerate() {
            let ord = match (a.fields.get(idx), b.fields.get(idx)) {
                (Some(x), Some(y)) => field.compare(x, y),
                _ => Ordering::Equal,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.doc.cmp(&b.doc)
    }
}

/// Heap entry: greatest is the worst-ranked hit.
#[derive(Debug)]
struct FieldHitEntry {
    sort: Arc<Sort>,
    hit: FieldDoc,
}

impl PartialEq for FieldHitEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FieldHitEntry {}

impl PartialOrd for FieldHitEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FieldHitEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort.compare(&self.hit, &other.hit)
    }
}

#[derive(Debug)]
enum ValueSource {
    Score,
    Doc,
    Field(Arc<dyn DocValues>),
}

/// Keeps the top N hits under a [`Sort`], reading field values from a
/// [`FieldCache`].
#[derive(Debug)]
pub struct TopFieldCollector {
    sort: Arc<Sort>,
    field_cache: Arc<FieldCache>,
    num_hits: usize,
    hits: BinaryHeap<FieldHitEntry>,
    total_hits: usize,
    doc_base: DocId,
    sources: Vec<ValueSource>,
    track_scores: bool,
    max_score: f32,
    docs_scored_in_order: bool,
}

impl TopFieldCollector {
    /// Create a collector keeping `num_hits` hits. With `track_scores` the
    /// hits carry scores and the result reports the maximum score.
    pub fn new(
        sort: Sort,
        num_hits: usize,
        field_cache: Arc<FieldCache>,
        track_scores: bool,
        docs_scored_in_order: bool,
    ) -> Self {
        TopFieldCollector {
            sort: Arc::new(sort),
            field_cache,
            num_hits,
            hits: BinaryHeap::with_capacity(num_hits + 1),
            total_hits: 0,
            doc_base: 0,
            sources: Vec::new(),
            track_scores,
            max_score: f32::NAN,
            docs_scored_in_order,
        }
    }

    /// Number of collect calls so far.
    pub fn total_hits(&self) -> usize {
        self.total_hits
    }

    /// Consume the collector into hits in sort order.
    pub fn top_docs(self) -> TopFieldDocs {
        let field_docs = self
            .hits
            .into_sorted_vec()
            .into_iter()
            .map(|entry| entry.hit)
            .collect();
        TopFieldDocs {
            total_hits: self.total_hits,
            field_docs,
            sort_fields: self.sort.fields().to_vec(),
            max_score: self.max_score,
        }
    }
}

impl Collector for TopFieldCollector {
    fn set_next_reader(&mut self, reader: &Arc<dyn IndexReader>, doc_base: DocId) -> Result<()> {
        self.doc_base = doc_base;
        self.sources = self
            .sort
            .fields()
            .iter()
            .map(|field| match (field.kind(), field.field()) {
                (SortKind::Score, _) => Ok(ValueSource::Score),
                (SortKind::Doc, _) => Ok(ValueSource::Doc),
                (kind, Some(name)) => Ok(ValueSource::Field(
                    self.field_cache.sort_values(reader.as_ref(), name, kind)?,
                )),
                (kind, None) => Err(TesseraError::invalid_argument(format!(
                    "{kind:?} sort field is missing its field name"
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(())
    }

    fn collect(&mut self, doc: DocId, score: f32) -> Result<()> {
        self.total_hits += 1;
        if self.track_scores && !(score <= self.max_score) {
            // NaN-aware max: the first score always replaces the NaN seed.
            self.max_score = score;
        }
        if self.num_hits == 0 {
            return Ok(());
        }

        let global = doc + self.doc_base;
        let fields = self
            .sources
            .iter()
            .map(|source| match source {
                ValueSource::Score => SortValue::Score(score),
                ValueSource::Doc => SortValue::Doc(global),
                ValueSource::Field(values) => values.sort_value(doc),
            })
            .collect();
        let entry = FieldHitEntry {
            sort: Arc::clone(&self.sort),
            hit: FieldDoc {
                doc: global,
                score: if self.track_scores { score } else { f32::NAN },
                fields,
            },
        };

        if self.hits.len() < self.num_hits {
            self.hits.push(entry);
        } else if let Some(worst) = self.hits.peek() {
            if entry < *worst {
                self.hits.pop();
                self.hits.push(entry);
            }
        }
        Ok(())
    }

    fn accepts_docs_out_of_order(&self) -> bool {
        !self.docs_scored_in_order
    }

    fn needs_scores(&self) -> bool {
        self.track_scores || self.sort.needs_scores()
    }
}

/// Merge already-sorted hit lists into the best `n` under `sort`.
pub(crate) fn merge_field_docs(sort: &Sort, lists: Vec<Vec<FieldDoc>>, n: usize) -> Vec<FieldDoc> {
    let mut all: Vec<FieldDoc> = lists.into_iter().flatten().collect();
    all.sort_by(|a, b| sort.compare(a, b));
    all.truncate(n);
    all
}
