//! Index entries and their ordering.
//!
//! The committed index is a single `Vec<IndexEntry>` kept sorted by
//! [`canonical_cmp`]. Every lookup is a binary search over that vector
//! followed by a linear scan in both directions, so the ordering below is
//! load-bearing: all entries sharing `(kind, crc, key)` must be contiguous.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Discriminator marking an entry that only matches the full text.
pub const EXACT_CRC: i32 = i32::MAX;

/// Score carried by search probes; compares equal to any entry score.
pub const ANY_SCORE: i32 = i32::MAX;

/// Relative tolerance for numeric equality.
const NUMBER_TOLERANCE: f64 = 1e-9;

/// The kind of fact an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum IndexType {
    /// A word or one of its prefix variations.
    Word = 0,
    /// A numeric value stored as IEEE-754 bits.
    Number = 1,
    /// A named property value or one of its prefix variations.
    Property = 2,
}

impl IndexType {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(IndexType::Word),
            1 => Some(IndexType::Number),
            2 => Some(IndexType::Property),
            _ => None,
        }
    }
}

/// Comparison applied when looking up a run of entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchOperator {
    /// Key match; approximate equality for numbers.
    Contains,
    /// Key match; approximate equality for numbers.
    Equal,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    /// Key and document match.
    Document,
}

impl SearchOperator {
    /// Whether the qualifying run may start away from an exact hit.
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            SearchOperator::Less
                | SearchOperator::LessOrEqual
                | SearchOperator::Greater
                | SearchOperator::GreaterOrEqual
        )
    }
}

/// One `(key, crc, kind, document, score)` fact.
///
/// Equality and hashing cover `key`, `crc`, `kind` and `index`; two entries
/// that differ only by score are duplicates.
#[derive(Debug, Clone, Copy)]
pub struct IndexEntry {
    /// Hash of the text, or the bit pattern of a number.
    pub key: u64,
    /// Variation length, property name hash, or [`EXACT_CRC`].
    pub crc: i32,
    pub kind: IndexType,
    /// Position of the document in the document table.
    pub index: i32,
    /// Lower is more relevant.
    pub score: i32,
}

impl IndexEntry {
    pub fn new(key: u64, crc: i32, kind: IndexType, index: i32, score: i32) -> Self {
        IndexEntry {
            key,
            crc,
            kind,
            index,
            score,
        }
    }

    /// Build a number entry. `-0.0` is folded into `0.0` so that both share a key.
    pub fn from_number(value: f64, crc: i32, index: i32, score: i32) -> Self {
        let value = if value == 0.0 { 0.0 } else { value };
        IndexEntry::new(value.to_bits(), crc, IndexType::Number, index, score)
    }

    /// A search probe that matches any score.
    pub fn probe(key: u64, crc: i32, kind: IndexType) -> Self {
        IndexEntry::new(key, crc, kind, -1, ANY_SCORE)
    }

    /// Decoded numeric value, meaningful for [`IndexType::Number`] entries.
    pub fn number(&self) -> f64 {
        f64::from_bits(self.key)
    }

    fn value_cmp(&self, other: &IndexEntry) -> Ordering {
        if self.kind == IndexType::Number && other.kind == IndexType::Number {
            self.number().total_cmp(&other.number())
        } else {
            self.key.cmp(&other.key)
        }
    }
}

impl PartialEq for IndexEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.crc == other.crc
            && self.kind == other.kind
            && self.index == other.index
    }
}

impl Eq for IndexEntry {}

impl Hash for IndexEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.crc.hash(state);
        self.kind.hash(state);
        self.index.hash(state);
    }
}

/// Storage order of the committed array: kind, crc, value, score, document.
pub fn canonical_cmp(a: &IndexEntry, b: &IndexEntry) -> Ordering {
    a.kind
        .cmp(&b.kind)
        .then(a.crc.cmp(&b.crc))
        .then_with(|| a.value_cmp(b))
        .then(a.score.cmp(&b.score))
        .then(a.index.cmp(&b.index))
}

/// Order used before removing duplicates: duplicates become adjacent and the
/// lowest score of each group comes first.
pub fn identity_cmp(a: &IndexEntry, b: &IndexEntry) -> Ordering {
    a.kind
        .cmp(&b.kind)
        .then(a.crc.cmp(&b.crc))
        .then_with(|| a.value_cmp(b))
        .then(a.index.cmp(&b.index))
        .then(a.score.cmp(&b.score))
}

/// Approximate equality used by numeric `Contains`/`Equal`.
pub fn approx_eq(a: f64, b: f64) -> bool {
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= NUMBER_TOLERANCE * scale
}

/// Operator-aware comparison of an index entry against a search probe.
#[derive(Debug, Clone, Copy)]
pub struct EntryComparer {
    op: SearchOperator,
}

impl EntryComparer {
    pub fn new(op: SearchOperator) -> Self {
        EntryComparer { op }
    }

    pub fn operator(&self) -> SearchOperator {
        self.op
    }

    /// Offset applied to a numeric probe so that the binary search lands
    /// before nearly-equal values for `Contains`/`Equal`. Range operators
    /// locate their run with [`matches`](Self::matches) instead.
    fn probe_number(&self, value: f64) -> f64 {
        match self.op {
            SearchOperator::Contains | SearchOperator::Equal => {
                value - NUMBER_TOLERANCE * value.abs().max(1.0)
            }
            _ => value,
        }
    }

    /// Compare `entry` (left) with `probe` (right).
    pub fn compare(&self, entry: &IndexEntry, probe: &IndexEntry) -> Ordering {
        let ord = entry.kind.cmp(&probe.kind).then(entry.crc.cmp(&probe.crc));
        if ord != Ordering::Equal {
            return ord;
        }

        let ord = if entry.kind == IndexType::Number {
            entry
                .number()
                .total_cmp(&self.probe_number(probe.number()))
        } else {
            entry.key.cmp(&probe.key)
        };
        if ord != Ordering::Equal {
            return ord;
        }

        if self.op == SearchOperator::Document {
            let ord = entry.index.cmp(&probe.index);
            if ord != Ordering::Equal {
                return ord;
            }
        }

        if entry.score == ANY_SCORE || probe.score == ANY_SCORE {
            Ordering::Equal
        } else {
            entry.score.cmp(&probe.score)
        }
    }

    /// Whether `entry` belongs to the run described by `probe` under this operator.
    pub fn matches(&self, entry: &IndexEntry, probe: &IndexEntry) -> bool {
        if entry.kind != probe.kind || entry.crc != probe.crc {
            return false;
        }

        if entry.kind != IndexType::Number {
            return match self.op {
                SearchOperator::Document => entry.key == probe.key && entry.index == probe.index,
                _ => entry.key == probe.key,
            };
        }

        let value = entry.number();
        let bound = probe.number();
        match self.op {
            SearchOperator::Contains | SearchOperator::Equal => approx_eq(value, bound),
            SearchOperator::Less => value < bound,
            SearchOperator::LessOrEqual => value <= bound,
            SearchOperator::Greater => value > bound,
            SearchOperator::GreaterOrEqual => value >= bound,
            SearchOperator::Document => entry.key == probe.key && entry.index == probe.index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(key: u64, crc: i32, index: i32, score: i32) -> IndexEntry {
        IndexEntry::new(key, crc, IndexType::Word, index, score)
    }

    #[test]
    fn test_equality_ignores_score() {
        assert_eq!(word(1, 3, 0, 10), word(1, 3, 0, 99));
        assert_ne!(word(1, 3, 0, 10), word(1, 3, 1, 10));
        assert_ne!(
            word(1, 3, 0, 10),
            IndexEntry::new(1, 3, IndexType::Property, 0, 10)
        );
    }

    #[test]
    fn test_canonical_order() {
        let mut entries = vec![
            word(5, 3, 1, 20),
            word(5, 3, 0, 20),
            word(5, 3, 2, 10),
            word(1, 4, 0, 10),
            IndexEntry::from_number(-2.0, 7, 0, 1),
            IndexEntry::from_number(1.5, 7, 0, 1),
        ];
        entries.sort_by(canonical_cmp);

        assert_eq!(entries[0], word(5, 3, 2, 10));
        assert_eq!(entries[1], word(5, 3, 0, 20));
        assert_eq!(entries[2], word(5, 3, 1, 20));
        assert_eq!(entries[3], word(1, 4, 0, 10));
        // Numbers sort by value, not by bit pattern
        assert_eq!(entries[4].number(), -2.0);
        assert_eq!(entries[5].number(), 1.5);
    }

    #[test]
    fn test_probe_compares_equal_on_score() {
        let comparer = EntryComparer::new(SearchOperator::Contains);
        let probe = IndexEntry::probe(5, 3, IndexType::Word);
        assert_eq!(comparer.compare(&word(5, 3, 9, 1), &probe), Ordering::Equal);
        assert_eq!(comparer.compare(&word(4, 3, 9, 1), &probe), Ordering::Less);
        assert_eq!(comparer.compare(&word(5, 4, 9, 1), &probe), Ordering::Greater);
    }

    #[test]
    fn test_document_operator_compares_index() {
        let comparer = EntryComparer::new(SearchOperator::Document);
        let mut probe = IndexEntry::probe(5, 3, IndexType::Word);
        probe.index = 2;
        assert_eq!(comparer.compare(&word(5, 3, 1, 1), &probe), Ordering::Less);
        assert!(comparer.matches(&word(5, 3, 2, 1), &probe));
        assert!(!comparer.matches(&word(5, 3, 1, 1), &probe));
    }

    #[test]
    fn test_numeric_matches() {
        let probe = IndexEntry::from_number(20.0, 7, -1, ANY_SCORE);
        let at = IndexEntry::from_number(20.0, 7, 0, 1);
        let below = IndexEntry::from_number(10.0, 7, 0, 1);

        assert!(!EntryComparer::new(SearchOperator::Less).matches(&at, &probe));
        assert!(EntryComparer::new(SearchOperator::Less).matches(&below, &probe));
        assert!(EntryComparer::new(SearchOperator::LessOrEqual).matches(&at, &probe));
        assert!(!EntryComparer::new(SearchOperator::Greater).matches(&at, &probe));
        assert!(EntryComparer::new(SearchOperator::GreaterOrEqual).matches(&at, &probe));
        assert!(EntryComparer::new(SearchOperator::Contains).matches(&at, &probe));
    }

    #[test]
    fn test_negative_zero_shares_key() {
        let a = IndexEntry::from_number(-0.0, 1, 0, 0);
        let b = IndexEntry::from_number(0.0, 1, 0, 0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_approx_eq() {
        assert!(approx_eq(0.1 + 0.2, 0.3));
        assert!(!approx_eq(1.0, 1.001));
    }
}
