use shelf_app::modules::books::models::{Book, BookPayload, BookUpdate};

use crate::api::{ClientError, Result};

/// Form state. Every field is text as typed; numbers are parsed on submit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookForm {
    /// Set when editing an existing book
    pub id: Option<String>,
    pub title: String,
    pub author: String,
    pub genre: String,
    pub language: String,
    pub page_count: String,
    pub published_year: String,
    pub summary: String,
}

impl BookForm {
    pub fn from_book(book: &Book) -> Self {
        let text = |value: &Option<String>| value.clone().unwrap_or_default();
        let number = |value: Option<i64>| value.map(|n| n.to_string()).unwrap_or_default();

        Self {
            id: Some(book.id.clone()),
            title: book.title.clone(),
            author: book.author.clone(),
            genre: text(&book.genre),
            language: text(&book.language),
            page_count: number(book.page_count),
            published_year: number(book.published_year),
            summary: text(&book.summary),
        }
    }

    pub fn set(&mut self, field: &str, value: impl Into<String>) -> Result<()> {
        let slot = match field {
            "title" => &mut self.title,
            "author" => &mut self.author,
            "genre" => &mut self.genre,
            "language" => &mut self.language,
            "page_count" => &mut self.page_count,
            "published_year" => &mut self.published_year,
            "summary" => &mut self.summary,
            other => return Err(ClientError::Form(format!("unknown field '{}'", other))),
        };
        *slot = value.into();
        Ok(())
    }

    /// Create body for this form. Blank optional fields are left out.
    pub fn to_payload(&self) -> Result<BookPayload> {
        Ok(BookPayload {
            title: Some(self.title.clone()),
            author: Some(self.author.clone()),
            genre: optional_text(&self.genre),
            published_year: parse_number("published_year", &self.published_year)?,
            language: optional_text(&self.language),
            page_count: parse_number("page_count", &self.page_count)?,
            summary: optional_text(&self.summary),
        })
    }

    /// Update body for this form. Every field is sent, so blanking an
    /// optional field clears it on the server. The id never travels in the
    /// body.
    pub fn to_update(&self) -> Result<BookUpdate> {
        Ok(BookUpdate {
            title: Some(Some(self.title.clone())),
            author: Some(Some(self.author.clone())),
            genre: Some(optional_text(&self.genre)),
            published_year: Some(parse_number("published_year", &self.published_year)?),
            language: Some(optional_text(&self.language)),
            page_count: Some(parse_number("page_count", &self.page_count)?),
            summary: Some(optional_text(&self.summary)),
        })
    }
}

fn optional_text(raw: &str) -> Option<String> {
    if raw.trim().is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

fn parse_number(field: &str, raw: &str) -> Result<Option<i64>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse()
        .map(Some)
        .map_err(|_| ClientError::Form(format!("{} must be a whole number, got '{}'", field, raw)))
}
