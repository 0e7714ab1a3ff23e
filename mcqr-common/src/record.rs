//! Record model
//!
//! A record is identified by an externally assigned id, belongs to exactly one
//! annotator, and carries string-valued fields. Absent fields read as the empty
//! string; the read path never fails on them.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Header of the identifier column
pub const ID_COLUMN: &str = "id";

/// Header of the annotator assignment column
pub const ASSIGNMENT_COLUMN: &str = "assigned_to";

/// Stable record identifier
///
/// The cell is kept verbatim so rewriting a dataset leaves untouched rows
/// byte-identical. Comparison, hashing and display use the trimmed value.
#[derive(Debug, Clone)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier with surrounding whitespace removed
    pub fn as_str(&self) -> &str {
        self.0.trim()
    }

    /// Cell exactly as read from the dataset
    pub fn raw(&self) -> &str {
        &self.0
    }
}

impl PartialEq for RecordId {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for RecordId {}

impl PartialOrd for RecordId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RecordId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl Hash for RecordId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Editable fields of a question record
///
/// `header()` is the spelling used by the CSV export, `column()` the SQLite
/// column name. Both spellings parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Field {
    Title,
    Question,
    OptionA,
    OptionB,
    OptionC,
    OptionD,
    OptionE,
    OptionF,
    CommentA,
    CommentB,
    CommentC,
    CommentD,
    CommentE,
    CommentF,
    Category,
    Subcategory,
}

impl Field {
    pub const ALL: [Field; 16] = [
        Field::Title,
        Field::Question,
        Field::OptionA,
        Field::OptionB,
        Field::OptionC,
        Field::OptionD,
        Field::OptionE,
        Field::OptionF,
        Field::CommentA,
        Field::CommentB,
        Field::CommentC,
        Field::CommentD,
        Field::CommentE,
        Field::CommentF,
        Field::Category,
        Field::Subcategory,
    ];

    pub fn header(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Question => "reformatted_question",
            Field::OptionA => "option a",
            Field::OptionB => "option b",
            Field::OptionC => "option c",
            Field::OptionD => "option d",
            Field::OptionE => "option e",
            Field::OptionF => "option f",
            Field::CommentA => "option a comment",
            Field::CommentB => "option b comment",
            Field::CommentC => "option c comment",
            Field::CommentD => "option d comment",
            Field::CommentE => "option e comment",
            Field::CommentF => "option f comment",
            Field::Category => "category",
            Field::Subcategory => "Subcategory",
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Question => "reformatted_question",
            Field::OptionA => "option_a",
            Field::OptionB => "option_b",
            Field::OptionC => "option_c",
            Field::OptionD => "option_d",
            Field::OptionE => "option_e",
            Field::OptionF => "option_f",
            Field::CommentA => "option_a_comment",
            Field::CommentB => "option_b_comment",
            Field::CommentC => "option_c_comment",
            Field::CommentD => "option_d_comment",
            Field::CommentE => "option_e_comment",
            Field::CommentF => "option_f_comment",
            Field::Category => "category",
            Field::Subcategory => "subcategory",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

impl FromStr for Field {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Field::ALL
            .into_iter()
            .find(|f| f.header() == wanted || f.column() == wanted)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown field: {}", wanted)))
    }
}

impl TryFrom<String> for Field {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Field> for String {
    fn from(value: Field) -> Self {
        value.header().to_string()
    }
}

/// Field name → new value, as collected from an editor
pub type FieldEdits = BTreeMap<Field, String>;

/// One labeled question record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub id: RecordId,
    pub assigned_to: String,
    /// Every non-key column keyed by its header, known or not
    pub values: BTreeMap<String, String>,
}

impl Record {
    pub fn new(id: impl Into<RecordId>, assigned_to: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            assigned_to: assigned_to.into(),
            values: BTreeMap::new(),
        }
    }

    /// Builder-style setter used by importers and tests
    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    /// Value of a catalogue field, empty when absent
    pub fn get(&self, field: Field) -> &str {
        self.values
            .get(field.header())
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        self.values.insert(field.header().to_string(), value.into());
    }

    /// Value of an arbitrary column, empty when absent
    pub fn column(&self, header: &str) -> &str {
        match header {
            ID_COLUMN => self.id.raw(),
            ASSIGNMENT_COLUMN => &self.assigned_to,
            other => self.values.get(other).map(String::as_str).unwrap_or(""),
        }
    }

    /// Overwrite exactly the named fields
    pub fn apply(&mut self, edits: &FieldEdits) {
        for (field, value) in edits {
            self.set(*field, value.clone());
        }
    }
}

impl From<&String> for RecordId {
    fn from(value: &String) -> Self {
        Self::new(value.as_str())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_parses_both_spellings() {
        assert_eq!("option a".parse::<Field>().unwrap(), Field::OptionA);
        assert_eq!("option_a".parse::<Field>().unwrap(), Field::OptionA);
        assert_eq!("Subcategory".parse::<Field>().unwrap(), Field::Subcategory);
        assert_eq!("subcategory".parse::<Field>().unwrap(), Field::Subcategory);
        assert_eq!("option f comment".parse::<Field>().unwrap(), Field::CommentF);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = "answer".parse::<Field>().unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_missing_field_reads_empty() {
        let record = Record::new("10", "Amit");
        assert_eq!(record.get(Field::Category), "");
        assert_eq!(record.column("not a column"), "");
        assert_eq!(record.column(ID_COLUMN), "10");
    }

    #[test]
    fn test_apply_touches_only_named_fields() {
        let mut record = Record::new("10", "Amit")
            .with(Field::Question, "Which river?")
            .with(Field::OptionA, "Nile");
        let mut edits = FieldEdits::new();
        edits.insert(Field::Category, "history".to_string());

        record.apply(&edits);

        assert_eq!(record.get(Field::Category), "history");
        assert_eq!(record.get(Field::Question), "Which river?");
        assert_eq!(record.get(Field::OptionA), "Nile");
        assert_eq!(record.values.len(), 3);
    }

    #[test]
    fn test_field_edits_deserialize_from_headers() {
        let edits: FieldEdits =
            serde_json::from_str(r#"{"category": "history", "option_b": "Amazon"}"#).unwrap();
        assert_eq!(edits.get(&Field::Category).map(String::as_str), Some("history"));
        assert_eq!(edits.get(&Field::OptionB).map(String::as_str), Some("Amazon"));
    }

    #[test]
    fn test_record_id_compares_trimmed_keeps_raw() {
        let padded = RecordId::new(" 12 ");
        assert_eq!(padded, RecordId::from("12"));
        assert_eq!(padded.as_str(), "12");
        assert_eq!(padded.raw(), " 12 ");
        assert_eq!(Record::new(" 12 ", "Amit").column(ID_COLUMN), " 12 ");
        assert_eq!(serde_json::to_string(&padded).unwrap(), r#""12""#);
    }
}
