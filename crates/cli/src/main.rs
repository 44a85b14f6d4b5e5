mod api;
mod app;
mod form;

use std::io::{BufRead, Write};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use shelf_app::modules::books::models::Book;

use api::HttpBookGateway;
use app::BookApp;
use form::BookForm;

#[derive(Parser)]
#[command(name = "shelf", about = "Manage the shelf book catalog", version)]
struct Cli {
    /// Base URL of the catalog API
    #[arg(long, env = "SHELF_API_URL", default_value = "http://localhost:7000")]
    api_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every book, newest first
    List,
    /// Add a new book
    Add(BookFields),
    /// Change fields of an existing book
    Edit {
        id: String,
        #[command(flatten)]
        fields: BookFields,
    },
    /// Delete a book
    Delete {
        id: String,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
}

#[derive(Args)]
struct BookFields {
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    author: Option<String>,
    #[arg(long)]
    genre: Option<String>,
    #[arg(long)]
    language: Option<String>,
    #[arg(long)]
    page_count: Option<String>,
    #[arg(long)]
    published_year: Option<String>,
    #[arg(long)]
    summary: Option<String>,
}

impl BookFields {
    fn apply(self, form: &mut BookForm) -> api::Result<()> {
        let values = [
            ("title", self.title),
            ("author", self.author),
            ("genre", self.genre),
            ("language", self.language),
            ("page_count", self.page_count),
            ("published_year", self.published_year),
            ("summary", self.summary),
        ];
        for (field, value) in values {
            if let Some(value) = value {
                form.set(field, value)?;
            }
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .ok();

    let cli = Cli::parse();
    let gateway = HttpBookGateway::new(&cli.api_url)
        .with_context(|| "failed to build HTTP client")?;
    let mut app = BookApp::new(gateway);

    tracing::debug!(api_url = %cli.api_url, "shelf client starting");

    match cli.command {
        Command::List => {
            app.refresh().await.with_context(|| "failed to fetch books")?;
        }
        Command::Add(fields) => {
            app.open_add()?;
            if let Some(form) = app.form_mut() {
                fields.apply(form)?;
            }
            let message = app.submit().await.with_context(|| "failed to save book")?;
            println!("{}", message);
        }
        Command::Edit { id, fields } => {
            app.refresh().await.with_context(|| "failed to fetch books")?;
            app.open_edit(&id)?;
            if let Some(form) = app.form_mut() {
                fields.apply(form)?;
            }
            let message = app.submit().await.with_context(|| "failed to save book")?;
            println!("{}", message);
        }
        Command::Delete { id, yes } => {
            app.request_delete(&id)?;
            if yes || confirm("Are you sure you want to delete this book?")? {
                let message = app
                    .confirm_delete()
                    .await
                    .with_context(|| "failed to delete book")?;
                println!("{}", message);
            } else {
                app.cancel();
                println!("Delete cancelled");
                return Ok(());
            }
        }
    }

    tracing::debug!(mode = ?app.mode(), count = app.books().len(), "command finished");
    print_books(app.books());
    Ok(())
}

fn confirm(question: &str) -> anyhow::Result<bool> {
    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn print_books(books: &[Book]) {
    if books.is_empty() {
        println!("No books found.");
        return;
    }

    for book in books {
        println!("{}  {}", book.id, book.title);
        println!("    author:    {}", book.author);
        if let Some(year) = book.published_year {
            println!("    published: {}", year);
        }
        for (label, value) in [
            ("genre", &book.genre),
            ("language", &book.language),
            ("summary", &book.summary),
        ] {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                println!("    {:<10} {}", format!("{}:", label), value);
            }
        }
        if let Some(pages) = book.page_count {
            println!("    pages:     {}", pages);
        }
    }
}
