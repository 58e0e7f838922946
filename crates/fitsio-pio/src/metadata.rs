//! Case-insensitive keyword → value records attached to each HDU.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};
use crate::value::FromValue;

/// A header keyword that compares and hashes without regard to ASCII case.
#[derive(Clone, Eq)]
pub struct Keyword(String);

impl Keyword {
    pub fn new(name: impl Into<String>) -> Self {
        Keyword(name.into())
    }

    /// The keyword as it was recorded.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Keyword {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Hash for Keyword {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.0.bytes() {
            state.write_u8(b.to_ascii_uppercase());
        }
        state.write_u8(0xff);
    }
}

impl fmt::Debug for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One keyword/value pair decoded from (or written to) a header card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRecord {
    pub keyword: String,
    pub value: String,
}

/// The metadata records of one HDU.
///
/// Lookups are case-insensitive. Repeated keywords are all kept; single-value
/// lookups resolve to the first record inserted under that keyword, and
/// [`MetadataSet::values`] yields every one of them in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MetadataSet {
    records: Vec<MetadataRecord>,
    index: HashMap<Keyword, Vec<usize>>,
}

impl MetadataSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record. Existing records with the same keyword are kept.
    pub fn insert(&mut self, keyword: impl Into<String>, value: impl Into<String>) {
        let keyword = keyword.into();
        let position = self.records.len();
        self.index
            .entry(Keyword::new(keyword.clone()))
            .or_default()
            .push(position);
        self.records.push(MetadataRecord {
            keyword,
            value: value.into(),
        });
    }

    /// Returns the first value recorded under `keyword`.
    pub fn get(&self, keyword: &str) -> Option<&str> {
        self.positions(keyword)
            .first()
            .map(|&i| self.records[i].value.as_str())
    }

    /// Iterates every value recorded under `keyword`, oldest first.
    pub fn values<'a>(&'a self, keyword: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.positions(keyword)
            .iter()
            .map(move |&i| self.records[i].value.as_str())
    }

    pub fn contains(&self, keyword: &str) -> bool {
        !self.positions(keyword).is_empty()
    }

    /// Number of records, duplicates included.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates all records in the order they were inserted.
    pub fn iter(&self) -> impl Iterator<Item = &MetadataRecord> {
        self.records.iter()
    }

    /// Converts the value of `keyword` to `T`.
    ///
    /// Fails with [`Error::KeywordNotFound`] if the keyword is absent and
    /// with [`Error::InvalidValue`] if the text does not convert.
    pub fn value_as<T: FromValue>(&self, keyword: &str) -> Result<T> {
        self.value_as_optional(keyword)?
            .ok_or_else(|| Error::KeywordNotFound(keyword.to_string()))
    }

    /// Like [`MetadataSet::value_as`], but an absent keyword yields `Ok(None)`.
    pub fn value_as_optional<T: FromValue>(&self, keyword: &str) -> Result<Option<T>> {
        match self.get(keyword) {
            None => Ok(None),
            Some(text) => T::from_value(text)
                .map(Some)
                .ok_or_else(|| Error::InvalidValue {
                    keyword: keyword.to_string(),
                    value: text.to_string(),
                }),
        }
    }

    fn positions(&self, keyword: &str) -> &[usize] {
        self.index
            .get(&Keyword::new(keyword))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl<'a> IntoIterator for &'a MetadataSet {
    type Item = &'a MetadataRecord;
    type IntoIter = std::slice::Iter<'a, MetadataRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
