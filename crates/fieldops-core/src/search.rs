//! Category narrowing, literal case-insensitive search and match highlighting
//! over small in-memory entity lists.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Marker text wrapped around matched substrings by [`HighlightedText::to_markup`].
pub const HIGHLIGHT_OPEN: &str = "<mark>";
pub const HIGHLIGHT_CLOSE: &str = "</mark>";

/// Filter value meaning "do not narrow by category".
pub const ALL_CATEGORIES: &str = "All";

/// A record exposing named string fields plus one designated category field.
pub trait Searchable {
    /// Value of the named field, or `None` if the record has no such field.
    fn field(&self, name: &str) -> Option<Cow<'_, str>>;

    /// Value of the designated category field.
    fn category(&self) -> Option<Cow<'_, str>>;
}

impl<T: Searchable + ?Sized> Searchable for &T {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        (**self).field(name)
    }

    fn category(&self) -> Option<Cow<'_, str>> {
        (**self).category()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CategoryFilter {
    #[default]
    All,
    Exact(String),
}

impl CategoryFilter {
    pub fn accepts(&self, category: Option<&str>) -> bool {
        match self {
            Self::All => true,
            Self::Exact(wanted) => category == Some(wanted.as_str()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::All => ALL_CATEGORIES,
            Self::Exact(value) => value,
        }
    }
}

impl From<&str> for CategoryFilter {
    fn from(value: &str) -> Self {
        if value == ALL_CATEGORIES {
            Self::All
        } else {
            Self::Exact(value.to_string())
        }
    }
}

impl From<String> for CategoryFilter {
    fn from(value: String) -> Self {
        if value == ALL_CATEGORIES {
            Self::All
        } else {
            Self::Exact(value)
        }
    }
}

impl From<Option<String>> for CategoryFilter {
    fn from(value: Option<String>) -> Self {
        value.map(Self::from).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightSegment {
    pub text: String,
    pub matched: bool,
}

/// A field value split into matched and unmatched runs, original casing kept.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HighlightedText {
    pub segments: Vec<HighlightSegment>,
}

impl HighlightedText {
    pub fn has_matches(&self) -> bool {
        self.segments.iter().any(|s| s.matched)
    }

    pub fn plain(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }

    pub fn to_markup(&self) -> String {
        self.to_markup_with(HIGHLIGHT_OPEN, HIGHLIGHT_CLOSE)
    }

    pub fn to_markup_with(&self, open: &str, close: &str) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            if segment.matched {
                out.push_str(open);
                out.push_str(&segment.text);
                out.push_str(close);
            } else {
                out.push_str(&segment.text);
            }
        }
        out
    }
}

/// An entity retained by [`filter_entities`], with per-field highlights.
///
/// `highlighted_fields` is empty when the query was empty.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult<'a, T> {
    pub entity: &'a T,
    pub highlighted_fields: BTreeMap<String, HighlightedText>,
}

impl<T> MatchResult<'_, T> {
    pub fn is_annotated(&self) -> bool {
        !self.highlighted_fields.is_empty()
    }

    pub fn highlight(&self, field: &str) -> Option<&HighlightedText> {
        self.highlighted_fields.get(field)
    }
}

/// Narrow `entities` by category, then by a literal case-insensitive `query`
/// over `fields_to_search`, annotating every occurrence of the query.
///
/// Output keeps input order. Field names a record does not expose are skipped.
pub fn filter_entities<'a, T: Searchable>(
    entities: &'a [T],
    query: &str,
    category_filter: impl Into<CategoryFilter>,
    fields_to_search: &[&str],
) -> Vec<MatchResult<'a, T>> {
    let category_filter = category_filter.into();
    let narrowed = entities
        .iter()
        .filter(|e| category_filter.accepts(e.category().as_deref()));

    if query.is_empty() {
        return narrowed
            .map(|entity| MatchResult {
                entity,
                highlighted_fields: BTreeMap::new(),
            })
            .collect();
    }

    let needle = fold_case(query);
    narrowed
        .filter_map(|entity| {
            let mut highlighted_fields = BTreeMap::new();
            let mut any_match = false;
            for &field in fields_to_search {
                let Some(value) = entity.field(field) else {
                    continue;
                };
                let ranges = find_matches(&value, &needle);
                any_match |= !ranges.is_empty();
                highlighted_fields.insert(field.to_string(), split_segments(&value, &ranges));
            }
            any_match.then_some(MatchResult {
                entity,
                highlighted_fields,
            })
        })
        .collect()
}

/// Case-insensitive literal substring test, consistent with [`filter_entities`].
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    needle.is_empty() || !find_matches(haystack, &fold_case(needle)).is_empty()
}

/// Highlight every case-insensitive occurrence of `query` in `value`.
pub fn highlight(value: &str, query: &str) -> HighlightedText {
    if query.is_empty() {
        return split_segments(value, &[]);
    }
    split_segments(value, &find_matches(value, &fold_case(query)))
}

/// `"All"` followed by each distinct category, in first-seen order.
pub fn category_options<T: Searchable>(entities: &[T]) -> Vec<String> {
    let mut options = vec![ALL_CATEGORIES.to_string()];
    for entity in entities {
        if let Some(category) = entity.category() {
            if !options.iter().any(|o| o.as_str() == category.as_ref()) {
                options.push(category.into_owned());
            }
        }
    }
    options
}

fn fold_case(s: &str) -> Vec<char> {
    s.chars().flat_map(char::to_lowercase).collect()
}

/// Byte ranges of non-overlapping matches of `needle` (already case-folded)
/// in `haystack`. Each folded char remembers the byte range of the original
/// char it came from, so ranges always land on char boundaries.
fn find_matches(haystack: &str, needle: &[char]) -> Vec<Range<usize>> {
    if needle.is_empty() {
        return Vec::new();
    }

    let mut folded = Vec::with_capacity(haystack.len());
    let mut origins = Vec::with_capacity(haystack.len());
    for (offset, ch) in haystack.char_indices() {
        let origin = offset..offset + ch.len_utf8();
        for lower in ch.to_lowercase() {
            folded.push(lower);
            origins.push(origin.clone());
        }
    }

    let mut matches = Vec::new();
    let mut i = 0;
    while i + needle.len() <= folded.len() {
        if folded[i..i + needle.len()] == *needle {
            let start = origins[i].start;
            let end = origins[i + needle.len() - 1].end;
            matches.push(start..end);
            i += needle.len();
            while i < folded.len() && origins[i].start < end {
                i += 1;
            }
        } else {
            i += 1;
        }
    }
    matches
}

fn split_segments(value: &str, ranges: &[Range<usize>]) -> HighlightedText {
    let mut segments = Vec::with_capacity(ranges.len() * 2 + 1);
    let mut cursor = 0;
    for range in ranges {
        if range.start > cursor {
            segments.push(HighlightSegment {
                text: value[cursor..range.start].to_string(),
                matched: false,
            });
        }
        segments.push(HighlightSegment {
            text: value[range.clone()].to_string(),
            matched: true,
        });
        cursor = range.end;
    }
    if cursor < value.len() {
        segments.push(HighlightSegment {
            text: value[cursor..].to_string(),
            matched: false,
        });
    }
    HighlightedText { segments }
}
