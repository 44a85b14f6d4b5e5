use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use shelf_http::error::{AppError, ErrorBody, MessageBody};
use utoipa::OpenApi;

use super::models::{Book, BookPayload, BookUpdate, CreatedBody, ValidationError};
use super::store::{parse_id, BookStore};

pub type SharedStore = Arc<dyn BookStore>;

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::validation(err.to_string())
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(create_book, list_books, update_book, delete_book),
    components(schemas(Book, BookPayload, BookUpdate, CreatedBody, MessageBody, ErrorBody)),
    tags((name = "Books", description = "Book catalog"))
)]
pub struct BooksApi;

pub fn router(store: SharedStore) -> Router {
    Router::new()
        .route("/Books", get(list_books).post(create_book))
        // Path used by older clients
        .route("/CreateBook", post(create_book))
        .route("/Books/{id}", put(update_book).delete(delete_book))
        .with_state(store)
}

/// Create a book
#[utoipa::path(
    post,
    path = "/Books",
    tag = "Books",
    request_body = BookPayload,
    responses(
        (status = 201, description = "Book created", body = CreatedBody),
        (status = 400, description = "Missing required fields", body = ErrorBody),
        (status = 500, description = "Store failure", body = ErrorBody)
    )
)]
pub async fn create_book(
    State(store): State<SharedStore>,
    payload: Result<Json<BookPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedBody>), AppError> {
    let Json(payload) = payload?;
    let book = payload.into_new_book()?;
    let title = book.title.clone();

    let id = store.insert(book).await?;
    tracing::info!(book_id = %id, %title, "book created");

    Ok((
        StatusCode::CREATED,
        Json(CreatedBody {
            message: "Book created successfully!".to_string(),
            id: id.to_hex(),
        }),
    ))
}

/// List every book, newest first
#[utoipa::path(
    get,
    path = "/Books",
    tag = "Books",
    responses(
        (status = 200, description = "All books", body = [Book]),
        (status = 404, description = "No books stored", body = MessageBody),
        (status = 500, description = "Store failure", body = ErrorBody)
    )
)]
pub async fn list_books(State(store): State<SharedStore>) -> Result<Json<Vec<Book>>, AppError> {
    let books = store.list_all().await?;
    if books.is_empty() {
        return Err(AppError::not_found("No books found."));
    }

    tracing::debug!(count = books.len(), "books listed");
    Ok(Json(books.into_iter().map(Book::from).collect()))
}

/// Replace the supplied fields of an existing book; `null` clears one
#[utoipa::path(
    put,
    path = "/Books/{id}",
    tag = "Books",
    params(("id" = String, Path, description = "Hex-encoded book id")),
    request_body = BookUpdate,
    responses(
        (status = 200, description = "Book updated", body = MessageBody),
        (status = 400, description = "Malformed id or empty update", body = ErrorBody),
        (status = 404, description = "Book not found", body = MessageBody),
        (status = 500, description = "Store failure", body = ErrorBody)
    )
)]
pub async fn update_book(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
    payload: Result<Json<BookUpdate>, JsonRejection>,
) -> Result<Json<MessageBody>, AppError> {
    let id = parse_id(&id)?;
    let Json(payload) = payload?;
    let changes = payload.into_changes()?;

    if !store.update_by_id(id, &changes).await? {
        return Err(AppError::not_found("Book not found"));
    }

    tracing::info!(book_id = %id, "book updated");
    Ok(Json(MessageBody::new("Book updated successfully!")))
}

/// Delete a book
#[utoipa::path(
    delete,
    path = "/Books/{id}",
    tag = "Books",
    params(("id" = String, Path, description = "Hex-encoded book id")),
    responses(
        (status = 200, description = "Book deleted", body = MessageBody),
        (status = 400, description = "Malformed id", body = ErrorBody),
        (status = 404, description = "Book not found", body = MessageBody),
        (status = 500, description = "Store failure", body = ErrorBody)
    )
)]
pub async fn delete_book(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
) -> Result<Json<MessageBody>, AppError> {
    let id = parse_id(&id)?;

    if store.delete_by_id(id).await? == 0 {
        return Err(AppError::not_found("Book not found"));
    }

    tracing::info!(book_id = %id, "book deleted");
    Ok(Json(MessageBody::new("Book deleted successfully!")))
}
