//! HTTP client for the book catalog API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use shelf_app::modules::books::models::{Book, BookPayload, BookUpdate};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("invalid form input: {0}")]
    Form(String),

    #[error("no book with id '{0}' in the current list")]
    UnknownBook(String),

    #[error("cannot {action} while {mode}")]
    InvalidState {
        action: &'static str,
        mode: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// The four catalog operations the client drives.
#[async_trait]
pub trait BookGateway: Send + Sync {
    async fn list(&self) -> Result<Vec<Book>>;
    async fn create(&self, book: &BookPayload) -> Result<String>;
    async fn update(&self, id: &str, changes: &BookUpdate) -> Result<String>;
    async fn delete(&self, id: &str) -> Result<String>;
}

pub struct HttpBookGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBookGateway {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Render an error body (`{error, details}` or `{message}`) as one line.
fn describe_error(body: &Value) -> String {
    match (body.get("error"), body.get("details"), body.get("message")) {
        (Some(Value::String(error)), Some(Value::String(details)), _) => {
            format!("{} ({})", error, details)
        }
        (Some(Value::String(error)), _, _) => error.clone(),
        (_, _, Some(Value::String(message))) => message.clone(),
        _ => body.to_string(),
    }
}

async fn read_json(response: reqwest::Response) -> Result<(StatusCode, Value)> {
    let status = response.status();
    let text = response.text().await?;
    let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
    Ok((status, body))
}

/// Turn a confirmation response into its message, or an API error.
fn confirmation(status: StatusCode, body: Value) -> Result<String> {
    if !status.is_success() {
        return Err(ClientError::Api {
            status: status.as_u16(),
            message: describe_error(&body),
        });
    }
    Ok(body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("ok")
        .to_string())
}

/// A lone object is treated as a one-element list.
pub fn books_from_value(body: Value) -> Result<Vec<Book>> {
    let decoded = match body {
        Value::Array(_) => serde_json::from_value(body),
        Value::Object(_) => serde_json::from_value(body).map(|book: Book| vec![book]),
        other => return Err(ClientError::Decode(other.to_string())),
    };
    decoded.map_err(|e| ClientError::Decode(e.to_string()))
}

#[async_trait]
impl BookGateway for HttpBookGateway {
    async fn list(&self) -> Result<Vec<Book>> {
        let response = self.client.get(self.url("/Books")).send().await?;
        let (status, body) = read_json(response).await?;

        match status {
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            s if s.is_success() => books_from_value(body),
            s => Err(ClientError::Api {
                status: s.as_u16(),
                message: describe_error(&body),
            }),
        }
    }

    async fn create(&self, book: &BookPayload) -> Result<String> {
        let response = self.client.post(self.url("/Books")).json(book).send().await?;
        let (status, body) = read_json(response).await?;
        confirmation(status, body)
    }

    async fn update(&self, id: &str, changes: &BookUpdate) -> Result<String> {
        let response = self
            .client
            .put(self.url(&format!("/Books/{}", id)))
            .json(changes)
            .send()
            .await?;
        let (status, body) = read_json(response).await?;
        confirmation(status, body)
    }

    async fn delete(&self, id: &str) -> Result<String> {
        let response = self
            .client
            .delete(self.url(&format!("/Books/{}", id)))
            .send()
            .await?;
        let (status, body) = read_json(response).await?;
        confirmation(status, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn book_json(id: &str) -> Value {
        json!({
            "_id": id,
            "title": "Dune",
            "author": "Herbert",
            "published_year": 1965,
            "createdAt": "2024-03-01T12:00:00Z"
        })
    }

    #[test]
    fn single_object_becomes_one_element_list() {
        let books = books_from_value(book_json("65f1c0a2b3c4d5e6f7a8b9c0")).unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].id, "65f1c0a2b3c4d5e6f7a8b9c0");
    }

    #[test]
    fn array_is_decoded_in_order() {
        let books = books_from_value(json!([book_json("a"), book_json("b")])).unwrap();
        let ids: Vec<&str> = books.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn error_bodies_are_described() {
        let body = json!({ "error": "Internal Server Error", "details": "boom" });
        assert_eq!(describe_error(&body), "Internal Server Error (boom)");
        assert_eq!(describe_error(&json!({ "message": "Book not found" })), "Book not found");
    }

    #[test]
    fn failed_confirmation_is_api_error() {
        let err = confirmation(StatusCode::NOT_FOUND, json!({ "message": "Book not found" }))
            .unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 404, .. }));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let gateway = HttpBookGateway::new("http://localhost:7000/").unwrap();
        assert_eq!(gateway.url("/Books"), "http://localhost:7000/Books");
    }
}
