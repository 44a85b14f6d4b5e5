use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use utoipa::ToSchema;

/// A book as persisted in the `Book` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookDocument {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(default, deserialize_with = "stored::required_text")]
    pub title: String,
    #[serde(default, deserialize_with = "stored::required_text")]
    pub author: String,
    #[serde(
        default,
        deserialize_with = "stored::text",
        skip_serializing_if = "Option::is_none"
    )]
    pub genre: Option<String>,
    #[serde(
        default,
        deserialize_with = "stored::int",
        skip_serializing_if = "Option::is_none"
    )]
    pub published_year: Option<i64>,
    #[serde(
        default,
        deserialize_with = "stored::text",
        skip_serializing_if = "Option::is_none"
    )]
    pub language: Option<String>,
    #[serde(
        default,
        deserialize_with = "stored::int",
        skip_serializing_if = "Option::is_none"
    )]
    pub page_count: Option<i64>,
    #[serde(
        default,
        deserialize_with = "stored::text",
        skip_serializing_if = "Option::is_none"
    )]
    pub summary: Option<String>,
    #[serde(rename = "createdAt", default = "epoch")]
    pub created_at: DateTime,
}

fn epoch() -> DateTime {
    DateTime::from_millis(0)
}

impl BookDocument {
    /// Stamp a validated book with its creation time. The id is left for the
    /// store to assign.
    pub fn new(book: NewBook, created_at: DateTime) -> Self {
        Self {
            id: None,
            title: book.title,
            author: book.author,
            genre: book.genre,
            published_year: Some(book.published_year),
            language: book.language,
            page_count: book.page_count,
            summary: book.summary,
            created_at,
        }
    }
}

/// A book as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Book {
    /// Hex-encoded document id
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_year: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(rename = "createdAt", with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub created_at: OffsetDateTime,
}

impl From<BookDocument> for Book {
    fn from(document: BookDocument) -> Self {
        let nanos = i128::from(document.created_at.timestamp_millis()) * 1_000_000;
        Self {
            id: document.id.map(|id| id.to_hex()).unwrap_or_default(),
            title: document.title,
            author: document.author,
            genre: document.genre,
            published_year: document.published_year,
            language: document.language,
            page_count: document.page_count,
            summary: document.summary,
            created_at: OffsetDateTime::from_unix_timestamp_nanos(nanos)
                .unwrap_or(OffsetDateTime::UNIX_EPOCH),
        }
    }
}

/// Request body for create. Unknown keys such as `_id` or `createdAt` are
/// dropped during deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BookPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    /// Integer, or a numeric string as sent by HTML forms
    #[serde(
        default,
        deserialize_with = "lenient_int::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub published_year: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_int::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub page_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Request body for a partial update.
///
/// Each field is three-state: an absent key leaves the stored value alone,
/// an explicit `null` (or an empty string for numbers) clears it, and any
/// other value replaces it. Unknown keys are dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BookUpdate {
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<String>)]
    pub title: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<String>)]
    pub author: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<String>)]
    pub genre: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "lenient_int::deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<i64>)]
    pub published_year: Option<Option<i64>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<String>)]
    pub language: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "lenient_int::deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<i64>)]
    pub page_count: Option<Option<i64>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<String>)]
    pub summary: Option<Option<String>>,
}

/// Marks a key as present, keeping an explicit `null` apart from absence.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("field '{0}' must not be blank")]
    BlankField(&'static str),
    #[error("no updatable fields supplied")]
    NoChanges,
}

/// A create request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub genre: Option<String>,
    pub published_year: i64,
    pub language: Option<String>,
    pub page_count: Option<i64>,
    pub summary: Option<String>,
}

/// A partial update that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct BookChanges(BookUpdate);

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |s| s.trim().is_empty())
}

impl BookPayload {
    /// Presence check: `published_year: 0` is accepted, blank strings are not.
    pub fn into_new_book(self) -> Result<NewBook, ValidationError> {
        let mut missing = Vec::new();
        if is_blank(&self.title) {
            missing.push("title");
        }
        if is_blank(&self.author) {
            missing.push("author");
        }
        if self.published_year.is_none() {
            missing.push("published_year");
        }

        match (self.title, self.author, self.published_year) {
            (Some(title), Some(author), Some(published_year)) if missing.is_empty() => {
                Ok(NewBook {
                    title,
                    author,
                    genre: self.genre,
                    published_year,
                    language: self.language,
                    page_count: self.page_count,
                    summary: self.summary,
                })
            }
            _ => Err(ValidationError::MissingFields(missing)),
        }
    }
}

impl BookUpdate {
    pub fn is_empty(&self) -> bool {
        *self == BookUpdate::default()
    }

    /// Required fields may be replaced but never cleared or blanked.
    pub fn into_changes(self) -> Result<BookChanges, ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::NoChanges);
        }
        for (field, value) in [("title", &self.title), ("author", &self.author)] {
            if let Some(text) = value {
                if is_blank(text) {
                    return Err(ValidationError::BlankField(field));
                }
            }
        }
        if self.published_year == Some(None) {
            return Err(ValidationError::BlankField("published_year"));
        }
        Ok(BookChanges(self))
    }
}

impl BookChanges {
    /// `$set` for replaced fields and `$unset` for cleared ones. Fields not
    /// named in the request are left out.
    pub fn to_update_document(&self) -> Document {
        let changes = &self.0;
        let mut set = Document::new();
        let mut unset = Document::new();

        for (field, value) in [
            ("title", &changes.title),
            ("author", &changes.author),
            ("genre", &changes.genre),
            ("language", &changes.language),
            ("summary", &changes.summary),
        ] {
            match value {
                Some(Some(text)) => {
                    set.insert(field, text.as_str());
                }
                Some(None) => {
                    unset.insert(field, "");
                }
                None => {}
            }
        }
        for (field, value) in [
            ("published_year", changes.published_year),
            ("page_count", changes.page_count),
        ] {
            match value {
                Some(Some(number)) => {
                    set.insert(field, number);
                }
                Some(None) => {
                    unset.insert(field, "");
                }
                None => {}
            }
        }

        let mut update = Document::new();
        if !set.is_empty() {
            update.insert("$set", set);
        }
        if !unset.is_empty() {
            update.insert("$unset", unset);
        }
        update
    }

    pub fn apply(&self, document: &mut BookDocument) {
        let changes = self.0.clone();
        if let Some(Some(title)) = changes.title {
            document.title = title;
        }
        if let Some(Some(author)) = changes.author {
            document.author = author;
        }
        if let Some(genre) = changes.genre {
            document.genre = genre;
        }
        if let Some(year) = changes.published_year {
            document.published_year = year;
        }
        if let Some(language) = changes.language {
            document.language = language;
        }
        if let Some(pages) = changes.page_count {
            document.page_count = pages;
        }
        if let Some(summary) = changes.summary {
            document.summary = summary;
        }
    }
}

/// Response body for a successful create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CreatedBody {
    pub message: String,
    /// Hex-encoded id of the new book
    pub id: String,
}

/// Integers that may arrive as JSON numbers, integral floats or numeric
/// strings. Empty strings and `null` read as absent.
mod lenient_int {
    use serde::{de, Deserialize, Deserializer};

    const EXPECTED: &str = "an integer or a numeric string";

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawInt {
        Integer(i64),
        Float(f64),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<RawInt>::deserialize(deserializer)? {
            None => Ok(None),
            Some(RawInt::Integer(n)) => Ok(Some(n)),
            Some(RawInt::Float(v)) => {
                if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
                    Ok(Some(v as i64))
                } else {
                    Err(de::Error::invalid_value(de::Unexpected::Float(v), &EXPECTED))
                }
            }
            Some(RawInt::Text(text)) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Ok(None);
                }
                trimmed
                    .parse::<i64>()
                    .map(Some)
                    .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(&text), &EXPECTED))
            }
        }
    }

    /// Like [`deserialize`], but records that the key was present.
    pub fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Option<i64>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserialize(deserializer).map(Some)
    }
}

/// Readers for stored documents. A value of the wrong type is converted
/// when it can be and dropped with a warning when it cannot.
mod stored {
    use serde::{de::IgnoredAny, Deserialize, Deserializer};

    #[derive(Debug, Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Integer(i64),
        Float(f64),
        Boolean(bool),
        Text(String),
        Other(IgnoredAny),
    }

    pub fn int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(value) = Option::<Scalar>::deserialize(deserializer)? else {
            return Ok(None);
        };
        let parsed = match &value {
            Scalar::Integer(n) => Some(*n),
            Scalar::Float(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 => {
                Some(*v as i64)
            }
            Scalar::Text(text) if text.trim().is_empty() => return Ok(None),
            Scalar::Text(text) => text.trim().parse().ok(),
            _ => None,
        };
        if parsed.is_none() {
            tracing::warn!(value = ?value, "dropping unreadable stored number");
        }
        Ok(parsed)
    }

    pub fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(value) = Option::<Scalar>::deserialize(deserializer)? else {
            return Ok(None);
        };
        Ok(match value {
            Scalar::Text(text) => Some(text),
            Scalar::Integer(n) => Some(n.to_string()),
            Scalar::Float(v) => Some(v.to_string()),
            Scalar::Boolean(b) => Some(b.to_string()),
            Scalar::Other(_) => {
                tracing::warn!("dropping unreadable stored text");
                None
            }
        })
    }

    pub fn required_text<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        text(deserializer).map(Option::unwrap_or_default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> BookPayload {
        serde_json::from_value(value).unwrap()
    }

    fn update(value: serde_json::Value) -> BookUpdate {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let p = payload(json!({ "published_year": "1965", "page_count": " 412 " }));
        assert_eq!(p.published_year, Some(1965));
        assert_eq!(p.page_count, Some(412));
    }

    #[test]
    fn empty_string_and_null_read_as_absent() {
        let p = payload(json!({ "published_year": "", "page_count": null }));
        assert_eq!(p.published_year, None);
        assert_eq!(p.page_count, None);
    }

    #[test]
    fn non_numeric_year_is_rejected() {
        let result = serde_json::from_value::<BookPayload>(json!({ "published_year": "soon" }));
        assert!(result.is_err());
        let result = serde_json::from_value::<BookPayload>(json!({ "published_year": 1965.5 }));
        assert!(result.is_err());
    }

    #[test]
    fn year_zero_is_present() {
        let book = payload(json!({ "title": "Fragments", "author": "Anon", "published_year": 0 }))
            .into_new_book()
            .unwrap();
        assert_eq!(book.published_year, 0);
    }

    #[test]
    fn missing_fields_are_all_reported() {
        let err = payload(json!({ "title": "Dune", "author": "  " }))
            .into_new_book()
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingFields(vec!["author", "published_year"])
        );
        assert_eq!(
            err.to_string(),
            "missing required fields: author, published_year"
        );
    }

    #[test]
    fn identity_fields_are_dropped_from_updates() {
        let changes = update(json!({
            "_id": "65f1c0a2b3c4d5e6f7a8b9c0",
            "createdAt": "2024-01-01T00:00:00Z",
            "title": "Dune Messiah"
        }));
        let document = changes.into_changes().unwrap().to_update_document();
        assert_eq!(document, doc! { "$set": { "title": "Dune Messiah" } });
    }

    #[test]
    fn empty_update_is_rejected() {
        let err = update(json!({ "_id": "65f1c0a2b3c4d5e6f7a8b9c0" }))
            .into_changes()
            .unwrap_err();
        assert_eq!(err, ValidationError::NoChanges);
    }

    #[test]
    fn blank_title_update_is_rejected() {
        let err = update(json!({ "title": "" })).into_changes().unwrap_err();
        assert_eq!(err, ValidationError::BlankField("title"));
        let err = update(json!({ "author": null })).into_changes().unwrap_err();
        assert_eq!(err, ValidationError::BlankField("author"));
        let err = update(json!({ "published_year": null }))
            .into_changes()
            .unwrap_err();
        assert_eq!(err, ValidationError::BlankField("published_year"));
    }

    #[test]
    fn null_and_blank_number_clear_optional_fields() {
        let changes = update(json!({ "page_count": "", "genre": null, "title": "Dune 2" }));
        assert_eq!(changes.page_count, Some(None));
        assert_eq!(changes.genre, Some(None));
        assert_eq!(changes.summary, None);

        let document = changes.into_changes().unwrap().to_update_document();
        assert_eq!(
            document,
            doc! {
                "$set": { "title": "Dune 2" },
                "$unset": { "genre": "", "page_count": "" },
            }
        );
    }

    #[test]
    fn clearing_alone_is_a_change() {
        let document = update(json!({ "page_count": null }))
            .into_changes()
            .unwrap()
            .to_update_document();
        assert_eq!(document, doc! { "$unset": { "page_count": "" } });
    }

    #[test]
    fn apply_leaves_unspecified_fields() {
        let new_book = payload(json!({
            "title": "Dune",
            "author": "Herbert",
            "published_year": 1965,
            "genre": "Science fiction"
        }))
        .into_new_book()
        .unwrap();
        let mut document = BookDocument::new(new_book, DateTime::from_millis(1_000));

        update(json!({ "page_count": 412 }))
            .into_changes()
            .unwrap()
            .apply(&mut document);

        assert_eq!(document.title, "Dune");
        assert_eq!(document.genre.as_deref(), Some("Science fiction"));
        assert_eq!(document.page_count, Some(412));

        update(json!({ "genre": null, "page_count": "" }))
            .into_changes()
            .unwrap()
            .apply(&mut document);

        assert_eq!(document.title, "Dune");
        assert_eq!(document.genre, None);
        assert_eq!(document.page_count, None);
    }

    #[test]
    fn legacy_string_year_reads_from_bson() {
        let raw = doc! {
            "_id": ObjectId::new(),
            "title": "Dune",
            "author": "Herbert",
            "published_year": "1965",
            "page_count": 412_i32,
            "createdAt": DateTime::from_millis(1_700_000_000_000),
        };
        let document: BookDocument = mongodb::bson::from_document(raw).unwrap();
        assert_eq!(document.published_year, Some(1965));
        assert_eq!(document.page_count, Some(412));
    }

    #[test]
    fn unreadable_legacy_values_do_not_fail_the_document() {
        let raw = doc! {
            "_id": ObjectId::new(),
            "title": "Dune",
            "author": "Herbert",
            "genre": 5_i32,
            "published_year": "c. 1965",
            "language": true,
            "page_count": 412.5,
            "summary": { "short": "Spice" },
            "createdAt": DateTime::from_millis(1_700_000_000_000),
        };
        let document: BookDocument = mongodb::bson::from_document(raw).unwrap();
        assert_eq!(document.title, "Dune");
        assert_eq!(document.genre.as_deref(), Some("5"));
        assert_eq!(document.published_year, None);
        assert_eq!(document.language.as_deref(), Some("true"));
        assert_eq!(document.page_count, None);
        assert_eq!(document.summary, None);
    }

    #[test]
    fn api_book_serializes_wire_names() {
        let id = ObjectId::new();
        let document = BookDocument {
            id: Some(id),
            title: "Dune".to_string(),
            author: "Herbert".to_string(),
            genre: None,
            published_year: Some(1965),
            language: None,
            page_count: None,
            summary: None,
            created_at: DateTime::from_millis(0),
        };
        let value = serde_json::to_value(Book::from(document)).unwrap();
        assert_eq!(value["_id"], id.to_hex());
        assert_eq!(value["createdAt"], "1970-01-01T00:00:00Z");
        assert!(value.get("genre").is_none());
    }
}
