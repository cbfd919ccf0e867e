//! Per-document field values parsed from the term dictionary, cached per
//! segment.
//!
//! Sorting and range filtering need one value per document. The cache walks a
//! field's terms once, parses each term's text into the requested type and
//! remembers the resulting array under (reader, field, type).

use std::any::{Any, TypeId};
use std::fmt::Debug;
use std::sync::Arc;

use ahash::AHashMap;
use log::debug;
use parking_lot::Mutex;

use crate::error::{Result, TesseraError};
use crate::index::{DocId, IndexReader, NO_MORE_DOCS};
use crate::search::sort::{SortKind, SortValue};

/// A value type the field cache can hold.
pub trait CacheValue: Clone + PartialOrd + Debug + Send + Sync + 'static {
    /// Name used in error messages.
    const KIND: &'static str;

    /// Parse a term's text.
    fn parse_term(text: &str) -> Option<Self>;

    /// Value recorded for documents that have no term in the field.
    fn missing() -> Option<Self>;

    /// Convert a cached value for sorting.
    fn to_sort_value(value: Option<&Self>) -> SortValue;
}

macro_rules! integer_cache_value {
    ($($t:ty => $kind:expr),* $(,)?) => {
        $(
            impl CacheValue for $t {
                const KIND: &'static str = $kind;

                fn parse_term(text: &str) -> Option<Self> {
                    text.trim().parse().ok()
                }

                fn missing() -> Option<Self> {
                    Some(0)
                }

                fn to_sort_value(value: Option<&Self>) -> SortValue {
                    SortValue::Int(value.copied().unwrap_or(0) as i64)
                }
            }
        )*
    };
}

macro_rules! float_cache_value {
    ($($t:ty => $kind:expr),* $(,)?) => {
        $(
            impl CacheValue for $t {
                const KIND: &'static str = $kind;

                fn parse_term(text: &str) -> Option<Self> {
                    text.trim().parse().ok()
                }

                fn missing() -> Option<Self> {
                    Some(0.0)
                }

                fn to_sort_value(value: Option<&Self>) -> SortValue {
                    SortValue::Float(value.copied().unwrap_or(0.0) as f64)
                }
            }
        )*
    };
}

integer_cache_value!(i8 => "byte", i16 => "short", i32 => "int", i64 => "long");
float_cache_value!(f32 => "float", f64 => "double");

impl CacheValue for String {
    const KIND: &'static str = "string";

    fn parse_term(text: &str) -> Option<Self> {
        Some(text.to_string())
    }

    fn missing() -> Option<Self> {
        None
    }

    fn to_sort_value(value: Option<&Self>) -> SortValue {
        SortValue::Str(value.cloned())
    }
}

/// Cached values of one field, readable as sort values.
pub trait DocValues: Send + Sync + Debug {
    /// Sort value of a segment-local document.
    fn sort_value(&self, doc: DocId) -> SortValue;
}

impl<T: CacheValue> DocValues for Vec<Option<T>> {
    fn sort_value(&self, doc: DocId) -> SortValue {
        T::to_sort_value(self.get(doc as usize).and_then(Option::as_ref))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    reader: u64,
    field: String,
    kind: TypeId,
}

/// Cache of parsed per-document field values.
#[derive(Debug, Default)]
pub struct FieldCache {
    entries: Mutex<AHashMap<CacheKey, Arc<dyn Any + Send + Sync>>>,
}

impl FieldCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Values of `field` for every document of `reader`.
    pub fn get<T: CacheValue>(
        &self,
        reader: &dyn IndexReader,
        field: &str,
    ) -> Result<Arc<Vec<Option<T>>>> {
        let key = CacheKey {
            reader: reader.reader_id(),
            field: field.to_string(),
            kind: TypeId::of::<T>(),
        };

        if let Some(entry) = self.entries.lock().get(&key).cloned() {
            return entry
                .downcast::<Vec<Option<T>>>()
                .map_err(|_| TesseraError::internal("field cache entry has the wrong type"));
        }

        let values = Arc::new(Self::load::<T>(reader, field)?);
        debug!(
            "field cache loaded {} values of {} for field '{}'",
            values.len(),
            T::KIND,
            field
        );
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(key)
            .or_insert_with(|| values.clone() as Arc<dyn Any + Send + Sync>)
            .clone();
        entry
            .downcast::<Vec<Option<T>>>()
            .map_err(|_| TesseraError::internal("field cache entry has the wrong type"))
    }

    /// Values of `field` typed by a sort kind, for sorting.
    pub fn sort_values(
        &self,
        reader: &dyn IndexReader,
        field: &str,
        kind: SortKind,
    ) -> Result<Arc<dyn DocValues>> {
        let values: Arc<dyn DocValues> = match kind {
            SortKind::Byte => self.get::<i8>(reader, field)?,
            SortKind::Short => self.get::<i16>(reader, field)?,
            SortKind::Int => self.get::<i32>(reader, field)?,
            SortKind::Long => self.get::<i64>(reader, field)?,
            SortKind::Float => self.get::<f32>(reader, field)?,
            SortKind::Double => self.get::<f64>(reader, field)?,
            SortKind::String => self.get::<String>(reader, field)?,
            SortKind::Score | SortKind::Doc => {
                return Err(TesseraError::invalid_argument(format!(
                    "sort kind {kind:?} has no field values"
                )));
            }
        };
        Ok(values)
    }

    /// Drop every entry of a reader.
    pub fn purge(&self, reader_id: u64) {
        self.entries.lock().retain(|key, _| key.reader != reader_id);
    }

    /// Number of cached arrays.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn load<T: CacheValue>(reader: &dyn IndexReader, field: &str) -> Result<Vec<Option<T>>> {
        let mut values: Vec<Option<T>> = vec![None; reader.max_doc().max(0) as usize];
        for stats in reader.terms(field, "")? {
            let value = T::parse_term(stats.term.text()).ok_or_else(|| {
                TesseraError::index(format!(
                    "cannot parse term '{}' of field '{}' as {}",
                    stats.term.text(),
                    field,
                    T::KIND
                ))
            })?;
            let Some(mut docs) = reader.term_docs(&stats.term)? else {
                continue;
            };
            let mut doc = docs.next()?;
            while doc != NO_MORE_DOCS {
                values[doc as usize] = Some(value.clone());
                doc = docs.next()?;
            }
        }
        if let Some(missing) = T::missing() {
            for slot in values.iter_mut().filter(|slot| slot.is_none()) {
                *slot = Some(missing.clone());
            }
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Document, MemoryIndex};

    fn priced_index() -> MemoryIndex {
        MemoryIndex::from_documents(vec![
            Document::new().add_keyword("price", "30").add_keyword("name", "pear"),
            Document::new().add_keyword("price", "10"),
            Document::new().add_keyword("name", "apple"),
            Document::new().add_keyword("price", "20").add_keyword("name", "fig"),
        ])
    }

    #[test]
    fn test_numeric_values_with_missing_default() {
        let index = priced_index();
        let cache = FieldCache::new();
        let prices = cache.get::<i32>(&index, "price").unwrap();
        assert_eq!(*prices, vec![Some(30), Some(10), Some(0), Some(20)]);

        let as_float = cache.get::<f64>(&index, "price").unwrap();
        assert_eq!(as_float[0], Some(30.0));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_strings_keep_missing() {
        let index = priced_index();
        let cache = FieldCache::new();
        let names = cache.get::<String>(&index, "name").unwrap();
        assert_eq!(names[1], None);
        assert_eq!(names[2].as_deref(), Some("apple"));
    }

    #[test]
    fn test_cached_array_is_shared() {
        let index = priced_index();
        let cache = FieldCache::new();
        let first = cache.get::<i64>(&index, "price").unwrap();
        let second = cache.get::<i64>(&index, "price").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        cache.purge(index.reader_id());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_unparsable_values_error() {
        let index = priced_index();
        let cache = FieldCache::new();
        assert!(cache.get::<i32>(&index, "name").is_err());
    }

    #[test]
    fn test_sort_values() {
        let index = priced_index();
        let cache = FieldCache::new();
        let values = cache.sort_values(&index, "price", SortKind::Long).unwrap();
        assert_eq!(values.sort_value(1), SortValue::Int(10));
        assert!(cache.sort_values(&index, "price", SortKind::Score).is_err());
    }
}
