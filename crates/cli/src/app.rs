//! Client-side catalog state: the book list plus which book is being
//! composed or deleted. The server stays the source of truth; every
//! successful write is followed by a full re-fetch.

use shelf_app::modules::books::models::Book;

use crate::api::{BookGateway, ClientError, Result};
use crate::form::BookForm;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Composing(BookForm),
    ConfirmDelete { id: String },
}

impl Mode {
    fn label(&self) -> &'static str {
        match self {
            Mode::Idle => "idle",
            Mode::Composing(_) => "composing",
            Mode::ConfirmDelete { .. } => "confirming a delete",
        }
    }
}

pub struct BookApp<G> {
    gateway: G,
    books: Vec<Book>,
    mode: Mode,
}

impl<G: BookGateway> BookApp<G> {
    pub fn new(gateway: G) -> Self {
        Self {
            gateway,
            books: Vec::new(),
            mode: Mode::Idle,
        }
    }

    pub fn books(&self) -> &[Book] {
        &self.books
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub async fn refresh(&mut self) -> Result<()> {
        self.books = self.gateway.list().await?;
        tracing::debug!(count = self.books.len(), "book list refreshed");
        Ok(())
    }

    fn require_idle(&self, action: &'static str) -> Result<()> {
        match self.mode {
            Mode::Idle => Ok(()),
            ref other => Err(ClientError::InvalidState {
                action,
                mode: other.label(),
            }),
        }
    }

    /// Idle → Composing with an empty form
    pub fn open_add(&mut self) -> Result<()> {
        self.require_idle("add a book")?;
        self.mode = Mode::Composing(BookForm::default());
        Ok(())
    }

    /// Idle → Composing pre-filled from a listed book
    pub fn open_edit(&mut self, id: &str) -> Result<()> {
        self.require_idle("edit a book")?;
        let book = self
            .books
            .iter()
            .find(|book| book.id == id)
            .ok_or_else(|| ClientError::UnknownBook(id.to_string()))?;
        self.mode = Mode::Composing(BookForm::from_book(book));
        Ok(())
    }

    pub fn form_mut(&mut self) -> Option<&mut BookForm> {
        match &mut self.mode {
            Mode::Composing(form) => Some(form),
            _ => None,
        }
    }

    /// Back to Idle from any mode, discarding the form
    pub fn cancel(&mut self) {
        self.mode = Mode::Idle;
    }

    /// Create or update depending on whether the form carries an id. On
    /// failure the form stays open.
    pub async fn submit(&mut self) -> Result<String> {
        let form = match &self.mode {
            Mode::Composing(form) => form.clone(),
            other => {
                return Err(ClientError::InvalidState {
                    action: "submit",
                    mode: other.label(),
                })
            }
        };

        let message = match &form.id {
            Some(id) => self.gateway.update(id, &form.to_update()?).await?,
            None => self.gateway.create(&form.to_payload()?).await?,
        };

        self.mode = Mode::Idle;
        self.refresh().await?;
        Ok(message)
    }

    /// Idle → ConfirmDelete
    pub fn request_delete(&mut self, id: &str) -> Result<()> {
        self.require_idle("delete a book")?;
        self.mode = Mode::ConfirmDelete { id: id.to_string() };
        Ok(())
    }

    /// ConfirmDelete → Idle, deleting the pending book
    pub async fn confirm_delete(&mut self) -> Result<String> {
        let id = match &self.mode {
            Mode::ConfirmDelete { id } => id.clone(),
            other => {
                return Err(ClientError::InvalidState {
                    action: "confirm a delete",
                    mode: other.label(),
                })
            }
        };

        self.mode = Mode::Idle;
        let message = self.gateway.delete(&id).await?;
        self.refresh().await?;
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shelf_app::modules::books::models::{BookPayload, BookUpdate};
    use std::sync::Mutex;
    use time::OffsetDateTime;

    #[derive(Default)]
    struct FakeGateway {
        books: Mutex<Vec<Book>>,
        calls: Mutex<Vec<String>>,
        fail_writes: bool,
    }

    impl FakeGateway {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn write_result(&self, message: &str) -> Result<String> {
            if self.fail_writes {
                Err(ClientError::Api {
                    status: 500,
                    message: "Internal Server Error".to_string(),
                })
            } else {
                Ok(message.to_string())
            }
        }
    }

    #[async_trait]
    impl<'a> BookGateway for &'a FakeGateway {
        async fn list(&self) -> Result<Vec<Book>> {
            self.record("list");
            Ok(self.books.lock().unwrap().clone())
        }

        async fn create(&self, book: &BookPayload) -> Result<String> {
            self.record("create");
            let result = self.write_result("Book created successfully!");
            if result.is_ok() {
                let mut books = self.books.lock().unwrap();
                let id = format!("{:024x}", books.len() + 1);
                books.push(Book {
                    id,
                    title: book.title.clone().unwrap_or_default(),
                    author: book.author.clone().unwrap_or_default(),
                    genre: book.genre.clone(),
                    published_year: book.published_year,
                    language: book.language.clone(),
                    page_count: book.page_count,
                    summary: book.summary.clone(),
                    created_at: OffsetDateTime::UNIX_EPOCH,
                });
            }
            result
        }

        async fn update(&self, id: &str, changes: &BookUpdate) -> Result<String> {
            self.record(format!("update:{}", id));
            let result = self.write_result("Book updated successfully!");
            if result.is_ok() {
                if let Some(existing) = self.books.lock().unwrap().iter_mut().find(|b| b.id == id) {
                    if let Some(Some(title)) = &changes.title {
                        existing.title = title.clone();
                    }
                    if let Some(genre) = &changes.genre {
                        existing.genre = genre.clone();
                    }
                }
            }
            result
        }

        async fn delete(&self, id: &str) -> Result<String> {
            self.record(format!("delete:{}", id));
            self.books.lock().unwrap().retain(|b| b.id != id);
            self.write_result("Book deleted successfully!")
        }
    }

    fn fill(app: &mut BookApp<&FakeGateway>, title: &str) {
        let form = app.form_mut().unwrap();
        form.set("title", title).unwrap();
        form.set("author", "Herbert").unwrap();
        form.set("published_year", "1965").unwrap();
    }

    #[tokio::test]
    async fn add_submits_create_then_refetches() {
        let gateway = FakeGateway::default();
        let mut app = BookApp::new(&gateway);

        app.open_add().unwrap();
        fill(&mut app, "Dune");
        let message = app.submit().await.unwrap();

        assert_eq!(message, "Book created successfully!");
        assert_eq!(app.mode(), &Mode::Idle);
        assert_eq!(app.books().len(), 1);
        assert_eq!(gateway.calls(), vec!["create", "list"]);
    }

    #[tokio::test]
    async fn edit_prefills_and_submits_update() {
        let gateway = FakeGateway::default();
        let mut app = BookApp::new(&gateway);
        app.open_add().unwrap();
        fill(&mut app, "Dune");
        app.submit().await.unwrap();
        let id = app.books()[0].id.clone();

        app.open_edit(&id).unwrap();
        match app.mode() {
            Mode::Composing(form) => {
                assert_eq!(form.id.as_deref(), Some(id.as_str()));
                assert_eq!(form.published_year, "1965");
            }
            other => panic!("expected composing, got {:?}", other),
        }

        app.form_mut().unwrap().set("title", "Dune Messiah").unwrap();
        app.submit().await.unwrap();

        assert_eq!(app.books()[0].title, "Dune Messiah");
        assert_eq!(gateway.calls().last().map(String::as_str), Some("list"));
        assert!(gateway.calls().contains(&format!("update:{}", id)));
    }

    #[tokio::test]
    async fn failed_submit_keeps_form_open() {
        let gateway = FakeGateway {
            fail_writes: true,
            ..FakeGateway::default()
        };
        let mut app = BookApp::new(&gateway);

        app.open_add().unwrap();
        fill(&mut app, "Dune");
        assert!(app.submit().await.is_err());
        assert!(matches!(app.mode(), Mode::Composing(form) if form.title == "Dune"));
        assert_eq!(gateway.calls(), vec!["create"]);
    }

    #[tokio::test]
    async fn cancel_returns_to_idle_without_calls() {
        let gateway = FakeGateway::default();
        let mut app = BookApp::new(&gateway);

        app.open_add().unwrap();
        app.cancel();
        assert_eq!(app.mode(), &Mode::Idle);

        app.request_delete("abc").unwrap();
        app.cancel();
        assert_eq!(app.mode(), &Mode::Idle);
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn confirm_delete_removes_and_refetches() {
        let gateway = FakeGateway::default();
        let mut app = BookApp::new(&gateway);
        app.open_add().unwrap();
        fill(&mut app, "Dune");
        app.submit().await.unwrap();
        let id = app.books()[0].id.clone();

        app.request_delete(&id).unwrap();
        assert!(matches!(app.mode(), Mode::ConfirmDelete { .. }));
        app.confirm_delete().await.unwrap();

        assert!(app.books().is_empty());
        assert_eq!(app.mode(), &Mode::Idle);
    }

    #[tokio::test]
    async fn transitions_are_guarded() {
        let gateway = FakeGateway::default();
        let mut app = BookApp::new(&gateway);

        assert!(matches!(
            app.submit().await,
            Err(ClientError::InvalidState { .. })
        ));
        assert!(matches!(
            app.open_edit("missing"),
            Err(ClientError::UnknownBook(_))
        ));

        app.open_add().unwrap();
        assert!(app.request_delete("abc").is_err());
    }
}
