//! Scoring functions of the classic vector-space model.
//!
//! A [`Similarity`] supplies every numeric ingredient of a score: term
//! frequency and inverse document frequency weights, index-time length
//! normalization, query normalization, the boolean coordination factor, and
//! the sloppy-phrase distance attenuation. Implementations hold no
//! per-document state.

use std::fmt::Debug;

use lazy_static::lazy_static;

use crate::error::Result;
use crate::index::Term;
use crate::search::searcher::Searcher;

/// Encoded value of the smallest normal exponent (3 mantissa bits, zero
/// exponent of 15).
const NORM_ZERO_EXP: i32 = (63 - 15) << 3;

lazy_static! {
    static ref NORM_TABLE: [f32; 256] = {
        let mut table = [0.0f32; 256];
        for (b, slot) in table.iter_mut().enumerate() {
            *slot = byte_to_float(b as u8);
        }
        table
    };
}

fn byte_to_float(b: u8) -> f32 {
    if b == 0 {
        return 0.0;
    }
    let bits = ((b as u32) << 21) + (((63 - 15) as u32) << 24);
    f32::from_bits(bits)
}

/// Compress a float into one byte: 3 mantissa bits, 5 exponent bits.
///
/// Values below the smallest representable positive value round to the
/// smallest positive byte (zero and negatives map to 0); values above the
/// largest map to 255.
pub fn encode_norm(f: f32) -> u8 {
    let bits = f.to_bits() as i32;
    let small = bits >> 21;
    if small <= NORM_ZERO_EXP {
        if bits <= 0 { 0 } else { 1 }
    } else if small >= NORM_ZERO_EXP + 0x100 {
        255
    } else {
        (small - NORM_ZERO_EXP) as u8
    }
}

/// Expand a norm byte through the precomputed table.
pub fn decode_norm(b: u8) -> f32 {
    NORM_TABLE[b as usize]
}

/// The 256-entry decode table.
pub fn norm_decoder() -> &'static [f32; 256] {
    &NORM_TABLE
}

/// Statistics gathered while inverting one field of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInvertState {
    /// Number of tokens in the field.
    pub length: u32,
    /// Product of the document boost and every field-instance boost.
    pub boost: f32,
}

impl FieldInvertState {
    /// Start a field with the given boost and no tokens.
    pub fn new(boost: f32) -> Self {
        FieldInvertState { length: 0, boost }
    }
}

/// An idf value and the text explaining how it was derived.
#[derive(Debug, Clone, PartialEq)]
pub struct IdfExplanation {
    /// The combined idf.
    pub idf: f32,
    /// Human-readable derivation.
    pub description: String,
}

/// Scoring functions.
pub trait Similarity: Send + Sync + Debug {
    /// Normalization factor for a field with `num_terms` tokens.
    fn length_norm(&self, field: &str, num_terms: u32) -> f32;

    /// Norm value stored for a field; multiplies in the boosts.
    fn compute_norm(&self, field: &str, state: &FieldInvertState) -> f32 {
        state.boost * self.length_norm(field, state.length)
    }

    /// Factor making scores of differently shaped queries comparable.
    fn query_norm(&self, sum_of_squared_weights: f32) -> f32;

    /// Weight of a term (or phrase) occurring `freq` times.
    fn tf(&self, freq: f32) -> f32;

    /// Frequency contribution of a sloppy phrase match `distance` apart.
    fn sloppy_freq(&self, distance: i32) -> f32;

    /// Rarity weight of a term found in `doc_freq` of `num_docs` documents.
    fn idf(&self, doc_freq: u32, num_docs: i32) -> f32;

    /// Reward for matching `overlap` of `max_overlap` clauses.
    fn coord(&self, overlap: usize, max_overlap: usize) -> f32;

    /// Encode a norm value for storage.
    fn encode_norm(&self, value: f32) -> u8 {
        encode_norm(value)
    }

    /// Decode a stored norm byte.
    fn decode_norm(&self, b: u8) -> f32 {
        decode_norm(b)
    }

    /// Idf of one term against a searcher's statistics.
    fn idf_explain(&self, term: &Term, searcher: &dyn Searcher) -> Result<IdfExplanation> {
        let doc_freq = searcher.doc_freq(term)?;
        let max_doc = searcher.max_doc();
        Ok(IdfExplanation {
            idf: self.idf(doc_freq, max_doc),
            description: format!("idf(docFreq={doc_freq}, maxDocs={max_doc})"),
        })
    }

    /// Summed idf of several terms, as used by phrases.
    fn idf_explain_terms(&self, terms: &[Term], searcher: &dyn Searcher) -> Result<IdfExplanation> {
        let max_doc = searcher.max_doc();
        let mut idf = 0.0;
        let mut description = String::new();
        for term in terms {
            let doc_freq = searcher.doc_freq(term)?;
            idf += self.idf(doc_freq, max_doc);
            description.push_str(&format!(" {}={}", term.text(), doc_freq));
        }
        Ok(IdfExplanation { idf, description })
    }
}

/// The classic TF-IDF similarity.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSimilarity;

impl Similarity for DefaultSimilarity {
    fn length_norm(&self, _field: &str, num_terms: u32) -> f32 {
        (1.0 / (num_terms as f64).sqrt()) as f32
    }

    fn query_norm(&self, sum_of_squared_weights: f32) -> f32 {
        let norm = (1.0 / (sum_of_squared_weights as f64).sqrt()) as f32;
        if norm.is_finite() { norm } else { 1.0 }
    }

    fn tf(&self, freq: f32) -> f32 {
        freq.sqrt()
    }

    fn sloppy_freq(&self, distance: i32) -> f32 {
        1.0 / (distance as f32 + 1.0)
    }

    fn idf(&self, doc_freq: u32, num_docs: i32) -> f32 {
        ((num_docs as f64 / (doc_freq as f64 + 1.0)).ln() + 1.0) as f32
    }

    fn coord(&self, overlap: usize, max_overlap: usize) -> f32 {
        if max_overlap == 0 {
            return 1.0;
        }
        overlap as f32 / max_overlap as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_norm_round_trip_reference_values() {
        assert_eq!(encode_norm(1.0), 124);
        assert_eq!(decode_norm(124), 1.0);
        assert_eq!(decode_norm(encode_norm(0.5)), 0.5);
        assert_eq!(encode_norm(0.0), 0);
        assert_eq!(encode_norm(-3.0), 0);
        assert_eq!(decode_norm(0), 0.0);
        assert_eq!(encode_norm(f32::MAX), 255);
        // Tiny positive values clamp to the smallest encodable value.
        assert_eq!(encode_norm(1e-30), 1);
    }

    #[test]
    fn test_norm_is_lossy_but_bounded() {
        for &value in &[0.1f32, 0.3, 0.7, 0.9, 1.5, 2.0, 7.0, 100.0] {
            let decoded = decode_norm(encode_norm(value));
            assert!(decoded <= value, "{value} decoded to {decoded}");
            assert!(decoded > value * 0.8, "{value} decoded to {decoded}");
        }
    }

    #[test]
    fn test_decoder_table_is_monotonic() {
        let table = norm_decoder();
        for pair in table.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_default_similarity_functions() {
        let sim = DefaultSimilarity;
        assert_eq!(sim.tf(4.0), 2.0);
        assert_eq!(sim.length_norm("body", 4), 0.5);
        assert_eq!(sim.coord(1, 2), 0.5);
        assert_eq!(sim.coord(0, 0), 1.0);
        assert_eq!(sim.sloppy_freq(0), 1.0);
        assert_eq!(sim.sloppy_freq(2), 1.0 / 3.0);
        assert!((sim.idf(1, 10) - (1.0 + (5.0f32).ln())).abs() < 1e-6);
        assert!(sim.idf(1, 10) > sim.idf(5, 10));
    }

    #[test]
    fn test_query_norm_degenerate_input() {
        let sim = DefaultSimilarity;
        assert_eq!(sim.query_norm(0.0), 1.0);
        assert_eq!(sim.query_norm(f32::NAN), 1.0);
        assert_eq!(sim.query_norm(4.0), 0.5);
    }

    #[test]
    fn test_compute_norm_folds_boost() {
        let sim = DefaultSimilarity;
        let state = FieldInvertState { length: 4, boost: 2.0 };
        assert_eq!(sim.compute_norm("body", &state), 1.0);
    }
}
