//! Record store gateway for the `Book` collection.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime, Document},
    error::ErrorKind,
    Collection, IndexModel,
};
use shelf_db::DbClient;
use shelf_http::error::AppError;
use thiserror::Error;
use tokio::sync::RwLock;

use super::models::{BookChanges, BookDocument, NewBook};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid book id '{0}'")]
    MalformedId(String),

    /// The store could not be reached
    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Operation(String),
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        match err.kind.as_ref() {
            ErrorKind::ServerSelection { .. }
            | ErrorKind::Io(_)
            | ErrorKind::ConnectionPoolCleared { .. }
            | ErrorKind::DnsResolve { .. } => StoreError::Unavailable(err.to_string()),
            _ => StoreError::Operation(err.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MalformedId(value) => AppError::malformed_id(value),
            StoreError::Unavailable(details) => AppError::unavailable(details),
            StoreError::Operation(details) => AppError::Internal(anyhow::anyhow!(details)),
        }
    }
}

/// Convert a client-supplied hex id into the store's native identifier.
pub fn parse_id(raw: &str) -> Result<ObjectId, StoreError> {
    ObjectId::parse_str(raw.trim()).map_err(|_| StoreError::MalformedId(raw.to_string()))
}

/// Operations on the book collection. Implementations do not retry.
#[async_trait]
pub trait BookStore: Send + Sync {
    /// Idempotent setup run when the module starts
    async fn prepare(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Persist a new book stamped with the current time; returns its id
    async fn insert(&self, book: NewBook) -> Result<ObjectId, StoreError>;

    /// Every book, newest first
    async fn list_all(&self) -> Result<Vec<BookDocument>, StoreError>;

    /// Number of removed books, 0 or 1
    async fn delete_by_id(&self, id: ObjectId) -> Result<u64, StoreError>;

    /// Whether a book with `id` existed
    async fn update_by_id(&self, id: ObjectId, changes: &BookChanges) -> Result<bool, StoreError>;
}

pub struct MongoBookStore {
    collection: Collection<BookDocument>,
}

impl MongoBookStore {
    pub fn new(db: &DbClient, collection: &str) -> Self {
        Self {
            collection: db.collection::<BookDocument>(collection),
        }
    }
}

#[async_trait]
impl BookStore for MongoBookStore {
    async fn prepare(&self) -> Result<(), StoreError> {
        let index = IndexModel::builder().keys(doc! { "createdAt": -1 }).build();
        self.collection.create_index(index).await?;
        Ok(())
    }

    async fn insert(&self, book: NewBook) -> Result<ObjectId, StoreError> {
        let document = BookDocument::new(book, DateTime::now());
        let result = self.collection.insert_one(&document).await?;
        result.inserted_id.as_object_id().ok_or_else(|| {
            StoreError::Operation(format!(
                "store returned a non-ObjectId identifier: {}",
                result.inserted_id
            ))
        })
    }

    async fn list_all(&self) -> Result<Vec<BookDocument>, StoreError> {
        let cursor = self
            .collection
            .clone_with_type::<Document>()
            .find(doc! {})
            .sort(doc! { "createdAt": -1 })
            .await?;
        let rows: Vec<Document> = cursor.try_collect().await?;
        Ok(decode_rows(rows))
    }

    async fn delete_by_id(&self, id: ObjectId) -> Result<u64, StoreError> {
        let result = self.collection.delete_one(doc! { "_id": id }).await?;
        Ok(result.deleted_count)
    }

    async fn update_by_id(&self, id: ObjectId, changes: &BookChanges) -> Result<bool, StoreError> {
        let result = self
            .collection
            .update_one(doc! { "_id": id }, changes.to_update_document())
            .await?;
        Ok(result.matched_count > 0)
    }
}

/// Convert raw rows in order, skipping any that no longer fit the book shape.
fn decode_rows(rows: Vec<Document>) -> Vec<BookDocument> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.get_object_id("_id").ok();
            match mongodb::bson::from_document::<BookDocument>(row) {
                Ok(book) => Some(book),
                Err(e) => {
                    tracing::warn!(book_id = ?id, error = %e, "skipping unreadable book document");
                    None
                }
            }
        })
        .collect()
}

/// Process-local store, used with `database.backend = "memory"` and in tests.
#[derive(Default)]
pub struct MemoryBookStore {
    books: RwLock<Vec<BookDocument>>,
}

impl MemoryBookStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookStore for MemoryBookStore {
    async fn insert(&self, book: NewBook) -> Result<ObjectId, StoreError> {
        let id = ObjectId::new();
        let mut document = BookDocument::new(book, DateTime::now());
        document.id = Some(id);
        self.books.write().await.push(document);
        Ok(id)
    }

    async fn list_all(&self) -> Result<Vec<BookDocument>, StoreError> {
        // Later inserts win ties on equal timestamps
        let mut books: Vec<BookDocument> = self.books.read().await.iter().rev().cloned().collect();
        books.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(books)
    }

    async fn delete_by_id(&self, id: ObjectId) -> Result<u64, StoreError> {
        let mut books = self.books.write().await;
        match books.iter().position(|book| book.id == Some(id)) {
            Some(index) => {
                books.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn update_by_id(&self, id: ObjectId, changes: &BookChanges) -> Result<bool, StoreError> {
        let mut books = self.books.write().await;
        match books.iter_mut().find(|book| book.id == Some(id)) {
            Some(book) => {
                changes.apply(book);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::books::models::{BookPayload, BookUpdate};

    fn new_book(title: &str) -> NewBook {
        BookPayload {
            title: Some(title.to_string()),
            author: Some("Herbert".to_string()),
            published_year: Some(1965),
            ..BookPayload::default()
        }
        .into_new_book()
        .unwrap()
    }

    #[test]
    fn parse_id_distinguishes_malformed_input() {
        assert!(parse_id("65f1c0a2b3c4d5e6f7a8b9c0").is_ok());
        assert!(matches!(
            parse_id("not-an-id"),
            Err(StoreError::MalformedId(value)) if value == "not-an-id"
        ));
    }

    #[test]
    fn store_errors_map_to_http_categories() {
        assert!(matches!(
            AppError::from(StoreError::MalformedId("x".into())),
            AppError::MalformedId { .. }
        ));
        assert!(matches!(
            AppError::from(StoreError::Unavailable("down".into())),
            AppError::Unavailable(_)
        ));
        assert!(matches!(
            AppError::from(StoreError::Operation("boom".into())),
            AppError::Internal(_)
        ));
    }

    #[test]
    fn unreadable_rows_are_skipped() {
        let good = ObjectId::new();
        let rows = vec![
            doc! {
                "_id": good,
                "title": "Dune",
                "author": "Herbert",
                "published_year": "1965.5",
                "createdAt": DateTime::from_millis(2_000),
            },
            doc! {
                "_id": ObjectId::new(),
                "title": "Broken",
                "createdAt": "yesterday",
            },
        ];

        let books = decode_rows(rows);
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].id, Some(good));
        assert_eq!(books[0].published_year, None);
    }

    #[tokio::test]
    async fn memory_store_lists_newest_first() {
        let store = MemoryBookStore::new();
        store.insert(new_book("Dune")).await.unwrap();
        store.insert(new_book("Dune Messiah")).await.unwrap();

        let titles: Vec<String> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|book| book.title)
            .collect();
        assert_eq!(titles, vec!["Dune Messiah", "Dune"]);
    }

    #[tokio::test]
    async fn memory_store_permits_duplicate_titles() {
        let store = MemoryBookStore::new();
        let first = store.insert(new_book("Dune")).await.unwrap();
        let second = store.insert(new_book("Dune")).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(store.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn memory_store_delete_counts() {
        let store = MemoryBookStore::new();
        let id = store.insert(new_book("Dune")).await.unwrap();

        assert_eq!(store.delete_by_id(id).await.unwrap(), 1);
        assert_eq!(store.delete_by_id(id).await.unwrap(), 0);
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn memory_store_update_reports_match() {
        let store = MemoryBookStore::new();
        let id = store.insert(new_book("Dune")).await.unwrap();
        let changes = BookUpdate {
            summary: Some(Some("Spice".to_string())),
            ..BookUpdate::default()
        }
        .into_changes()
        .unwrap();

        assert!(store.update_by_id(id, &changes).await.unwrap());
        assert!(!store.update_by_id(ObjectId::new(), &changes).await.unwrap());

        let books = store.list_all().await.unwrap();
        assert_eq!(books[0].summary.as_deref(), Some("Spice"));
        assert_eq!(books[0].title, "Dune");
    }
}
