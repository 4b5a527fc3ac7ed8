//! Index query tokens, range lookup and ranked results.

use std::cmp::Ordering;
use std::sync::LazyLock;

use ahash::AHashMap;
use regex::Regex;

use crate::index::entry::{EXACT_CRC, EntryComparer, IndexEntry, IndexType, SearchOperator, canonical_cmp};
use crate::util::hash::{hash_exact_key, hash_key, hash_name};

static FILTER_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([\w.#]+)(<=|>=|!=|:|=|<|>)(.+)$").expect("static regex is valid")
});

/// A ranked index search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    /// Position in the document table.
    pub index: i32,
    /// External document id.
    pub id: String,
    /// Summed entry score over all query tokens. Lower ranks higher.
    pub score: i64,
}

impl Ord for SearchResult {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .cmp(&other.score)
            .then(self.index.cmp(&other.index))
    }
}

impl PartialOrd for SearchResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One whitespace-delimited term of an index query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryToken {
    /// A bare word (prefix match), or a quoted word (exact match).
    Word { text: String, exact: bool },
    /// `name:value` (prefix) or `name=value` (exact).
    Property {
        name: String,
        value: String,
        exact: bool,
    },
    /// `name<v`, `name>=v`, ...; also emitted next to `Property` when the
    /// value of `name:v` / `name=v` is numeric.
    Number {
        name: String,
        op: SearchOperator,
        value: f64,
    },
    /// `name:[min,max]`, inclusive on both ends.
    Range { name: String, min: f64, max: f64 },
}

/// A parsed token together with the raw text used for match statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToken {
    pub raw: String,
    /// Alternatives whose matches are unioned.
    pub alternatives: Vec<QueryToken>,
}

/// Split a query on whitespace, keeping quoted sections together.
pub fn split_query(query: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in query.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn strip_quotes(text: &str) -> (&str, bool) {
    let trimmed = text.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        (&trimmed[1..trimmed.len() - 1], true)
    } else {
        (trimmed.trim_matches('"'), false)
    }
}

fn parse_range(value: &str) -> Option<(f64, f64)> {
    let inner = value.strip_prefix('[')?.strip_suffix(']')?;
    let (min, max) = inner.split_once(',')?;
    Some((min.trim().parse().ok()?, max.trim().parse().ok()?))
}

/// Parse one raw token. Returns `None` for tokens that cannot match anything
/// (empty text, `!=`, or a non-numeric value under a range operator).
pub fn parse_token(raw: &str) -> Option<ParsedToken> {
    let lowered = raw.to_lowercase();
    let mut alternatives = Vec::new();

    if let Some(caps) = FILTER_TOKEN.captures(&lowered) {
        let name = caps[1].to_string();
        let op = &caps[2];
        let (value, quoted) = strip_quotes(&caps[3]);
        if value.is_empty() {
            return None;
        }

        match op {
            ":" | "=" => {
                if let Some((min, max)) = parse_range(value) {
                    alternatives.push(QueryToken::Range { name, min, max });
                } else {
                    let exact = op == "=" || quoted;
                    if let Ok(number) = value.parse::<f64>() {
                        let op = if exact {
                            SearchOperator::Equal
                        } else {
                            SearchOperator::Contains
                        };
                        alternatives.push(QueryToken::Number {
                            name: name.clone(),
                            op,
                            value: number,
                        });
                    }
                    alternatives.push(QueryToken::Property {
                        name,
                        value: value.to_string(),
                        exact,
                    });
                }
            }
            "<" | "<=" | ">" | ">=" => {
                let number = value.parse::<f64>().ok()?;
                let op = match op {
                    "<" => SearchOperator::Less,
                    "<=" => SearchOperator::LessOrEqual,
                    ">" => SearchOperator::Greater,
                    _ => SearchOperator::GreaterOrEqual,
                };
                alternatives.push(QueryToken::Number {
                    name,
                    op,
                    value: number,
                });
            }
            _ => return None,
        }
    } else {
        let (text, exact) = strip_quotes(&lowered);
        if text.is_empty() {
            return None;
        }
        alternatives.push(QueryToken::Word {
            text: text.to_string(),
            exact,
        });
    }

    Some(ParsedToken {
        raw: lowered,
        alternatives,
    })
}

/// Matches per document: document index to best (lowest) score.
pub type DocumentScores = AHashMap<i32, i32>;

/// Binary-search `entries` for the run described by `probe` under `op`, then
/// extend left and right while entries keep matching.
///
/// Entries above `max_score`, or outside `subset` when one is given, are
/// skipped without ending the scan. At most `limit` entries are returned.
pub fn find_range(
    entries: &[IndexEntry],
    probe: &IndexEntry,
    op: SearchOperator,
    max_score: i32,
    limit: usize,
    subset: Option<&AHashMap<i32, i64>>,
) -> Vec<IndexEntry> {
    let comparer = EntryComparer::new(op);
    let (first, last) = if op.is_range() {
        range_run(entries, probe, &comparer)
    } else {
        let start = entries.partition_point(|e| comparer.compare(e, probe) == Ordering::Less);
        if !entries
            .get(start)
            .is_some_and(|e| comparer.matches(e, probe))
        {
            return Vec::new();
        }

        let mut first = start;
        while first > 0 && comparer.matches(&entries[first - 1], probe) {
            first -= 1;
        }
        let mut last = start;
        while last < entries.len() && comparer.matches(&entries[last], probe) {
            last += 1;
        }
        (first, last)
    };

    let mut found = Vec::new();
    for entry in &entries[first..last] {
        if found.len() >= limit {
            break;
        }
        if entry.score > max_score {
            continue;
        }
        if let Some(subset) = subset {
            if !subset.contains_key(&entry.index) {
                continue;
            }
        }
        found.push(*entry);
    }
    found
}

/// Bounds of the entries satisfying a range operator.
///
/// Within one `(kind, crc)` group numbers ascend, so `<` and `<=` select a
/// prefix of the group and `>` and `>=` a suffix.
fn range_run(entries: &[IndexEntry], probe: &IndexEntry, comparer: &EntryComparer) -> (usize, usize) {
    let group = |e: &IndexEntry| e.kind.cmp(&probe.kind).then(e.crc.cmp(&probe.crc));
    let low = entries.partition_point(|e| group(e) == Ordering::Less);
    let high = low + entries[low..].partition_point(|e| group(e) == Ordering::Equal);
    let run = &entries[low..high];

    match comparer.operator() {
        SearchOperator::Less | SearchOperator::LessOrEqual => {
            (low, low + run.partition_point(|e| comparer.matches(e, probe)))
        }
        _ => (low + run.partition_point(|e| !comparer.matches(e, probe)), high),
    }
}

fn collect_scores(scores: &mut DocumentScores, entries: Vec<IndexEntry>) {
    for entry in entries {
        scores
            .entry(entry.index)
            .and_modify(|s| *s = (*s).min(entry.score))
            .or_insert(entry.score);
    }
}

/// Look up one query token against a sorted entry array.
pub fn search_token(
    entries: &[IndexEntry],
    token: &ParsedToken,
    max_score: i32,
    limit: usize,
    subset: Option<&AHashMap<i32, i64>>,
) -> DocumentScores {
    let mut scores = DocumentScores::new();

    for alternative in &token.alternatives {
        match alternative {
            QueryToken::Word { text, exact } => {
                let key = hash_key(text);
                if !exact {
                    let len = text.chars().count() as i32;
                    let probe = IndexEntry::probe(key, len, IndexType::Word);
                    let found =
                        find_range(entries, &probe, SearchOperator::Contains, max_score, limit, subset);
                    collect_scores(&mut scores, found);
                }
                let probe = IndexEntry::probe(key, EXACT_CRC, IndexType::Word);
                let found =
                    find_range(entries, &probe, SearchOperator::Contains, max_score, limit, subset);
                collect_scores(&mut scores, found);
            }
            QueryToken::Property { name, value, exact } => {
                let crc = hash_name(name);
                if !exact {
                    let probe = IndexEntry::probe(hash_key(value), crc, IndexType::Property);
                    let found =
                        find_range(entries, &probe, SearchOperator::Contains, max_score, limit, subset);
                    collect_scores(&mut scores, found);
                }
                let probe = IndexEntry::probe(hash_exact_key(value), crc, IndexType::Property);
                let found =
                    find_range(entries, &probe, SearchOperator::Equal, max_score, limit, subset);
                collect_scores(&mut scores, found);
            }
            QueryToken::Number { name, op, value } => {
                let probe = IndexEntry::from_number(*value, hash_name(name), -1, i32::MAX);
                let found = find_range(entries, &probe, *op, max_score, limit, subset);
                collect_scores(&mut scores, found);
            }
            QueryToken::Range { name, min, max } => {
                let crc = hash_name(name);
                let low = IndexEntry::from_number(*min, crc, -1, i32::MAX);
                let high = IndexEntry::from_number(*max, crc, -1, i32::MAX);
                let mut lower = DocumentScores::new();
                collect_scores(
                    &mut lower,
                    find_range(entries, &low, SearchOperator::GreaterOrEqual, max_score, usize::MAX, subset),
                );
                // Keep the upper scan within documents that passed the lower bound
                let bounded: AHashMap<i32, i64> = lower.keys().map(|&k| (k, 0)).collect();
                let found = find_range(
                    entries,
                    &high,
                    SearchOperator::LessOrEqual,
                    max_score,
                    usize::MAX,
                    Some(&bounded),
                );
                let mut in_range = Vec::new();
                for entry in found {
                    let value = entry.number();
                    if value >= *min && value <= *max && in_range.len() < limit {
                        in_range.push(entry);
                    }
                }
                collect_scores(&mut scores, in_range);
            }
        }
    }

    scores
}

/// Sort `entries` into committed order.
pub fn sort_entries(entries: &mut [IndexEntry]) {
    entries.sort_by(canonical_cmp);
}
