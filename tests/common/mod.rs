//! Shared test harness for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use reqwest::Url;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use bookshelf::application::view::{BookListView, Completion, ViewState};
use bookshelf::domain::model::book::{Book, BookPayload};
use bookshelf::domain::model::id::BookId;
use bookshelf::domain::repository::BookRepository;
use bookshelf::infra::book_store::BookStore;
use bookshelf::infra::http_client::HttpBookRepository;
use bookshelf::interface::rest;

// =============================================================================
// ScriptedRepo: 応答の到着順をテストから制御できるリポジトリ
// =============================================================================

#[derive(Debug, thiserror::Error)]
#[error("scripted backend failure")]
pub struct ScriptedError;

/// インメモリのリポジトリ。
///
/// `gated` で作ると各リクエストは `release(label)` されるまで応答しない。
/// サーバ側の変更は応答時点で適用される。
#[derive(Default)]
pub struct ScriptedRepo {
    books: Mutex<Vec<Book>>,
    last_id: AtomicU64,
    fail: AtomicBool,
    gated: bool,
    held: Mutex<Vec<(String, oneshot::Sender<()>)>>,
}

impl ScriptedRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            gated: true,
            ..Self::default()
        }
    }

    pub fn with_books(self, books: &[(&str, i32)]) -> Self {
        for (title, year) in books {
            let id = BookId::new(self.last_id.fetch_add(1, Ordering::SeqCst) + 1);
            self.books
                .lock()
                .unwrap()
                .push(Book::new(id, *title, *year));
        }
        self
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn server_books(&self) -> Vec<Book> {
        self.books.lock().unwrap().clone()
    }

    /// 応答待ちのリクエストのラベル一覧（発行順）。
    pub fn held_labels(&self) -> Vec<String> {
        self.held
            .lock()
            .unwrap()
            .iter()
            .map(|(label, _)| label.clone())
            .collect()
    }

    /// `n` 件のリクエストが応答待ちになるまで他タスクに譲る。
    pub async fn wait_for_held(&self, n: usize) {
        for _ in 0..1000 {
            if self.held.lock().unwrap().len() >= n {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {n} held requests, got {:?}", self.held_labels());
    }

    /// 指定ラベルで最初に待っているリクエストを1件応答させる。
    pub fn release(&self, label: &str) {
        let mut held = self.held.lock().unwrap();
        let pos = held
            .iter()
            .position(|(l, _)| l == label)
            .unwrap_or_else(|| panic!("no held request '{label}'"));
        let (_, tx) = held.remove(pos);
        let _ = tx.send(());
    }

    /// 発行順で `index` 番目に待っているリクエストを応答させる。
    pub fn release_at(&self, index: usize) {
        let (_, tx) = self.held.lock().unwrap().remove(index);
        let _ = tx.send(());
    }

    async fn gate(&self, label: String) -> Result<(), ScriptedError> {
        if self.gated {
            let (tx, rx) = oneshot::channel();
            self.held.lock().unwrap().push((label, tx));
            let _ = rx.await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ScriptedError);
        }
        Ok(())
    }
}

impl BookRepository for ScriptedRepo {
    type Error = ScriptedError;

    async fn list(&self) -> Result<Vec<Book>, ScriptedError> {
        self.gate("list".into()).await?;
        Ok(self.server_books())
    }

    async fn create(&self, payload: &BookPayload) -> Result<Book, ScriptedError> {
        self.gate("create".into()).await?;
        let id = BookId::new(self.last_id.fetch_add(1, Ordering::SeqCst) + 1);
        let book = Book::from_payload(id, payload.clone());
        self.books.lock().unwrap().push(book.clone());
        Ok(book)
    }

    async fn replace(&self, id: BookId, payload: &BookPayload) -> Result<Book, ScriptedError> {
        self.gate(format!("replace {id}")).await?;
        let book = Book::from_payload(id, payload.clone());
        let mut books = self.books.lock().unwrap();
        let slot = books
            .iter_mut()
            .find(|b| b.id() == id)
            .ok_or(ScriptedError)?;
        *slot = book.clone();
        Ok(book)
    }

    async fn delete(&self, id: BookId) -> Result<(), ScriptedError> {
        self.gate(format!("delete {id}")).await?;
        let mut books = self.books.lock().unwrap();
        let before = books.len();
        books.retain(|b| b.id() != id);
        if books.len() == before {
            return Err(ScriptedError);
        }
        Ok(())
    }
}

/// 初回の一覧取得まで済ませたビュー。
pub async fn loaded_view(repo: Arc<ScriptedRepo>) -> BookListView<ScriptedRepo> {
    let mut view = BookListView::with_shared(repo);
    view.reload();
    view.settle().await;
    assert!(view.state().is_loaded());
    view
}

// =============================================================================
// In-process backend
// =============================================================================

/// ポート0でREST APIを起動し、ベースURLとストアを返す。
pub async fn spawn_backend() -> (Url, Arc<BookStore>) {
    let store = Arc::new(BookStore::in_memory());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(rest::serve(listener, Arc::clone(&store)));
    let base = Url::parse(&format!("http://{addr}/")).unwrap();
    (base, store)
}

pub async fn http_view() -> (BookListView<HttpBookRepository>, Arc<BookStore>, Url) {
    let (base, store) = spawn_backend().await;
    let view = BookListView::mount(HttpBookRepository::new(base.clone()));
    (view, store, base)
}

// =============================================================================
// Helpers
// =============================================================================

pub fn titles(state: &ViewState) -> Vec<String> {
    state.books().iter().map(|b| b.title().to_string()).collect()
}

pub fn ids(state: &ViewState) -> Vec<u64> {
    state.books().iter().map(|b| b.id().get()).collect()
}

/// 指定した書籍で読み込み済みのViewState。
pub fn loaded_state(books: &[(u64, &str, i32)]) -> ViewState {
    let mut state = ViewState::new();
    state.apply(Completion::Loaded(
        books
            .iter()
            .map(|(id, title, year)| Book::new(BookId::new(*id), *title, *year))
            .collect(),
    ));
    state
}
