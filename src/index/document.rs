//! Documents as handed to the in-memory index builder.

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// How a field's value becomes tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldKind {
    /// Split on Unicode word boundaries and lowercase each word.
    Text,
    /// Index the whole value as one token, untouched.
    Keyword,
}

/// A named field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    name: String,
    value: String,
    kind: FieldKind,
    boost: f32,
    omit_norms: bool,
}

impl Field {
    /// A tokenized text field.
    pub fn text<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Field {
            name: name.into(),
            value: value.into(),
            kind: FieldKind::Text,
            boost: 1.0,
            omit_norms: false,
        }
    }

    /// An untokenized field, indexed as a single term.
    pub fn keyword<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Field {
            name: name.into(),
            value: value.into(),
            kind: FieldKind::Keyword,
            boost: 1.0,
            omit_norms: false,
        }
    }

    /// Set the index-time boost folded into this field's norm.
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    /// Do not record norms for this field.
    pub fn omit_norms(mut self) -> Self {
        self.omit_norms = true;
        self
    }

    /// Get the field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the raw value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Get the index-time boost.
    pub fn boost(&self) -> f32 {
        self.boost
    }

    /// Whether norms are disabled for this field.
    pub fn omits_norms(&self) -> bool {
        self.omit_norms
    }

    /// The tokens this field contributes, in position order.
    pub fn tokens(&self) -> Vec<String> {
        match self.kind {
            FieldKind::Text => self
                .value
                .unicode_words()
                .map(|word| word.to_lowercase())
                .collect(),
            FieldKind::Keyword => vec![self.value.clone()],
        }
    }
}

/// A document: an ordered list of fields plus a document-level boost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    fields: Vec<Field>,
    boost: f32,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Document {
            fields: Vec::new(),
            boost: 1.0,
        }
    }

    /// Append a field.
    pub fn add(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Append a tokenized text field.
    pub fn add_text<N: Into<String>, V: Into<String>>(self, name: N, value: V) -> Self {
        self.add(Field::text(name, value))
    }

    /// Append a keyword field.
    pub fn add_keyword<N: Into<String>, V: Into<String>>(self, name: N, value: V) -> Self {
        self.add(Field::keyword(name, value))
    }

    /// Set the document boost.
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    /// Get the fields.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Get the document boost.
    pub fn boost(&self) -> f32 {
        self.boost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_tokens() {
        let field = Field::text("body", "The Quick, brown fox!");
        assert_eq!(field.tokens(), vec!["the", "quick", "brown", "fox"]);
    }

    #[test]
    fn test_keyword_tokens() {
        let field = Field::keyword("id", "Doc-42");
        assert_eq!(field.tokens(), vec!["Doc-42"]);
    }

    #[test]
    fn test_document_builder() {
        let doc = Document::new()
            .add_text("title", "hello")
            .add_keyword("price", "10")
            .with_boost(2.0);
        assert_eq!(doc.fields().len(), 2);
        assert_eq!(doc.boost(), 2.0);
    }
}
