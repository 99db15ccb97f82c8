//! BookListView: リモートの書籍コレクションとローカル状態の同期。
//!
//! ハンドラ（`add_book` 等）はリクエストをタスクとして投げてすぐ戻る。
//! 応答は所有者が `next_completion` / `settle` で受け取り、到着順に
//! `ViewState` へ反映する。状態を書き換えるのは常に所有者だけ。

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::domain::error::DomainError;
use crate::domain::model::book::{Book, BookPayload};
use crate::domain::model::collection::BookCollection;
use crate::domain::model::id::BookId;
use crate::domain::repository::BookRepository;

use super::error::AppError;

/// 発行したリクエストの種別。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Load,
    Create,
    Update(BookId),
    Delete(BookId),
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Load => write!(f, "load"),
            Operation::Create => write!(f, "create"),
            Operation::Update(id) => write!(f, "update #{id}"),
            Operation::Delete(id) => write!(f, "delete #{id}"),
        }
    }
}

/// 成功したリクエストの結果。`ViewState::apply` で反映する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Loaded(Vec<Book>),
    Created(Book),
    /// `id` はリクエスト時の対象ID。応答の `book` で置き換える。
    Replaced { id: BookId, book: Book },
    Deleted(BookId),
}

impl Completion {
    pub fn operation(&self) -> Operation {
        match self {
            Completion::Loaded(_) => Operation::Load,
            Completion::Created(_) => Operation::Create,
            Completion::Replaced { id, .. } => Operation::Update(*id),
            Completion::Deleted(id) => Operation::Delete(*id),
        }
    }
}

/// 入力欄の下書き。
///
/// `new_title` は全レコードで共有する1つの欄。ある書籍のために入力した値は、
/// 別の書籍で更新を押してもそのまま使われる。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Drafts {
    pub title: String,
    pub release_year: i32,
    pub new_title: String,
}

/// ビューが所有する状態一式。
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    books: BookCollection,
    drafts: Drafts,
    loaded: bool,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn books(&self) -> &BookCollection {
        &self.books
    }

    pub fn drafts(&self) -> &Drafts {
        &self.drafts
    }

    /// 初回の一覧取得が成功したか。
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn book(&self, id: BookId) -> Result<&Book, DomainError> {
        self.books.get(id).ok_or(DomainError::BookNotFound(id))
    }

    /// 追加フォームの下書きから作成リクエストを組み立てる。検証はしない。
    pub fn create_payload(&self) -> BookPayload {
        BookPayload::new(self.drafts.title.clone(), self.drafts.release_year)
    }

    /// 共有の `new_title` と、対象レコードの既存の刊行年から置換リクエストを組み立てる。
    pub fn update_payload(&self, release_year: i32) -> BookPayload {
        BookPayload::new(self.drafts.new_title.clone(), release_year)
    }

    pub fn apply(&mut self, completion: Completion) {
        match completion {
            Completion::Loaded(books) => {
                info!(count = books.len(), "book list loaded");
                self.books.replace_all(books);
                self.loaded = true;
            }
            Completion::Created(book) => {
                debug!(book_id = %book.id(), title = book.title(), "book created");
                self.books.append(book);
            }
            Completion::Replaced { id, book } => {
                if self.books.replace(id, book) {
                    debug!(book_id = %id, "book replaced");
                } else {
                    debug!(book_id = %id, "replaced book is no longer listed");
                }
            }
            Completion::Deleted(id) => {
                self.books.remove(id);
                debug!(book_id = %id, "book deleted");
            }
        }
    }
}

/// 1件のリクエストが決着したことの通知。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settled {
    pub operation: Operation,
    /// 成功して状態に反映されたら true。失敗はログのみ。
    pub applied: bool,
}

type TaskOutput = (Operation, Result<Completion, AppError>);

/// 書籍一覧ビュー。リポジトリとの往復を投げ、応答を自分の状態へ反映する。
///
/// drop または `teardown` で未完了のリクエストは全て中断され、
/// 以降の応答は反映されない。
pub struct BookListView<R: BookRepository> {
    repo: Arc<R>,
    state: ViewState,
    inflight: JoinSet<TaskOutput>,
    torn_down: bool,
}

impl<R> BookListView<R>
where
    R: BookRepository + Send + Sync + 'static,
{
    pub fn new(repo: R) -> Self {
        Self::with_shared(Arc::new(repo))
    }

    pub fn with_shared(repo: Arc<R>) -> Self {
        Self {
            repo,
            state: ViewState::new(),
            inflight: JoinSet::new(),
            torn_down: false,
        }
    }

    /// ビューを作成し、初回の一覧取得を発行する。Tokioランタイム内で呼ぶこと。
    pub fn mount(repo: R) -> Self {
        let mut view = Self::new(repo);
        view.reload();
        view
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    /// 未決着のリクエスト数。
    pub fn pending(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn set_title_draft(&mut self, title: impl Into<String>) {
        self.state.drafts.title = title.into();
    }

    pub fn set_release_year_draft(&mut self, release_year: i32) {
        self.state.drafts.release_year = release_year;
    }

    pub fn set_new_title_draft(&mut self, new_title: impl Into<String>) {
        self.state.drafts.new_title = new_title.into();
    }

    /// 一覧を取り直す。
    pub fn reload(&mut self) {
        let repo = Arc::clone(&self.repo);
        self.spawn(Operation::Load, async move {
            repo.list()
                .await
                .map(Completion::Loaded)
                .map_err(AppError::repository)
        });
    }

    /// 追加フォームの下書きで作成する。下書きはクリアしない。
    pub fn add_book(&mut self) {
        let repo = Arc::clone(&self.repo);
        let payload = self.state.create_payload();
        self.spawn(Operation::Create, async move {
            repo.create(&payload)
                .await
                .map(Completion::Created)
                .map_err(AppError::repository)
        });
    }

    /// 共有の `new_title` 下書きで `id` を置き換える。
    ///
    /// `release_year` は対象レコードの既存の値をそのまま渡す。下書きは発行時点の値を使う。
    pub fn update_book(&mut self, id: BookId, release_year: i32) {
        let repo = Arc::clone(&self.repo);
        let payload = self.state.update_payload(release_year);
        self.spawn(Operation::Update(id), async move {
            repo.replace(id, &payload)
                .await
                .map(|book| Completion::Replaced { id, book })
                .map_err(AppError::repository)
        });
    }

    pub fn delete_book(&mut self, id: BookId) {
        let repo = Arc::clone(&self.repo);
        self.spawn(Operation::Delete(id), async move {
            repo.delete(id)
                .await
                .map(|()| Completion::Deleted(id))
                .map_err(AppError::repository)
        });
    }

    /// 次に決着したリクエストを1件反映する。未完了がなければ `None`。
    pub async fn next_completion(&mut self) -> Option<Settled> {
        loop {
            let joined = self.inflight.join_next().await?;
            match joined {
                Ok((operation, Ok(completion))) => {
                    self.state.apply(completion);
                    return Some(Settled {
                        operation,
                        applied: true,
                    });
                }
                Ok((operation, Err(e))) => {
                    error!(%operation, error = %e, "book request failed");
                    return Some(Settled {
                        operation,
                        applied: false,
                    });
                }
                Err(e) if e.is_cancelled() => {
                    debug!(error = %e, "request task aborted");
                }
                Err(e) => {
                    error!(error = %e, "request task panicked");
                }
            }
        }
    }

    /// 未完了のリクエストを全て到着順に反映する。
    pub async fn settle(&mut self) -> Vec<Settled> {
        let mut settled = Vec::new();
        while let Some(s) = self.next_completion().await {
            settled.push(s);
        }
        settled
    }

    /// ビューを破棄する。未完了のリクエストは中断し、以降の操作は発行しない。
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        let pending = self.inflight.len();
        // 完了済みで未回収の結果も含めて捨てる
        self.inflight.abort_all();
        drop(std::mem::take(&mut self.inflight));
        debug!(pending, "book list view torn down");
    }

    fn spawn<F>(&mut self, operation: Operation, request: F)
    where
        F: Future<Output = Result<Completion, AppError>> + Send + 'static,
    {
        if self.torn_down {
            debug!(%operation, "view torn down; request not issued");
            return;
        }
        debug!(%operation, "request issued");
        self.inflight.spawn(async move { (operation, request.await) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, thiserror::Error)]
    #[error("fake backend unavailable")]
    struct FakeError;

    /// 最小のインメモリ実装。`fail` を立てると全リクエストが失敗する。
    #[derive(Default)]
    struct FakeRepo {
        books: Mutex<Vec<Book>>,
        next_id: AtomicU64,
        fail: AtomicBool,
    }

    impl FakeRepo {
        fn check(&self) -> Result<(), FakeError> {
            if self.fail.load(Ordering::SeqCst) {
                Err(FakeError)
            } else {
                Ok(())
            }
        }
    }

    impl BookRepository for FakeRepo {
        type Error = FakeError;

        async fn list(&self) -> Result<Vec<Book>, FakeError> {
            self.check()?;
            Ok(self.books.lock().unwrap().clone())
        }

        async fn create(&self, payload: &BookPayload) -> Result<Book, FakeError> {
            self.check()?;
            let id = BookId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
            let book = Book::from_payload(id, payload.clone());
            self.books.lock().unwrap().push(book.clone());
            Ok(book)
        }

        async fn replace(&self, id: BookId, payload: &BookPayload) -> Result<Book, FakeError> {
            self.check()?;
            let book = Book::from_payload(id, payload.clone());
            let mut books = self.books.lock().unwrap();
            for b in books.iter_mut().filter(|b| b.id() == id) {
                *b = book.clone();
            }
            Ok(book)
        }

        async fn delete(&self, id: BookId) -> Result<(), FakeError> {
            self.check()?;
            self.books.lock().unwrap().retain(|b| b.id() != id);
            Ok(())
        }
    }

    fn dune() -> Book {
        Book::new(BookId::new(1), "Dune", 1965)
    }

    #[test]
    fn apply_loaded_marks_loaded() {
        let mut state = ViewState::new();
        assert!(!state.is_loaded());
        state.apply(Completion::Loaded(vec![dune()]));
        assert!(state.is_loaded());
        assert_eq!(state.books().len(), 1);
    }

    #[test]
    fn apply_replaced_uses_requested_id() {
        let mut state = ViewState::new();
        state.apply(Completion::Loaded(vec![dune()]));
        state.apply(Completion::Replaced {
            id: BookId::new(1),
            book: Book::new(BookId::new(1), "Dune (remastered)", 1965),
        });
        assert_eq!(state.books().as_slice()[0].title(), "Dune (remastered)");
    }

    #[test]
    fn update_payload_uses_shared_draft() {
        let mut state = ViewState::new();
        state.drafts.new_title = "Shared".into();
        assert_eq!(state.update_payload(1965), BookPayload::new("Shared", 1965));
        assert_eq!(state.update_payload(1961), BookPayload::new("Shared", 1961));
    }

    #[test]
    fn book_lookup_reports_missing() {
        let state = ViewState::new();
        let err = state.book(BookId::new(3)).unwrap_err();
        assert_eq!(err.to_string(), "book not found: 3");
    }

    #[test]
    fn operation_display() {
        assert_eq!(Operation::Load.to_string(), "load");
        assert_eq!(Operation::Update(BookId::new(4)).to_string(), "update #4");
        assert_eq!(
            Completion::Deleted(BookId::new(2)).operation(),
            Operation::Delete(BookId::new(2))
        );
    }

    #[tokio::test]
    async fn mount_then_create() {
        let mut view = BookListView::mount(FakeRepo::default());
        assert_eq!(view.pending(), 1);
        view.settle().await;
        assert!(view.state().is_loaded());
        assert!(view.state().books().is_empty());

        view.set_title_draft("Dune");
        view.set_release_year_draft(1965);
        view.add_book();
        let settled = view.settle().await;

        assert_eq!(
            settled,
            vec![Settled {
                operation: Operation::Create,
                applied: true
            }]
        );
        assert_eq!(view.state().books().as_slice(), &[dune()]);
        // 下書きは残る
        assert_eq!(view.state().drafts().title, "Dune");
    }

    #[tokio::test]
    async fn failed_requests_leave_state_untouched() {
        let repo = Arc::new(FakeRepo::default());
        let mut view = BookListView::with_shared(Arc::clone(&repo));
        view.set_title_draft("Dune");
        view.set_release_year_draft(1965);
        view.add_book();
        view.settle().await;

        repo.fail.store(true, Ordering::SeqCst);
        let before = view.state().books().clone();

        view.set_new_title_draft("Lost");
        view.update_book(BookId::new(1), 1965);
        view.delete_book(BookId::new(1));
        view.reload();
        let settled = view.settle().await;

        assert_eq!(settled.len(), 3);
        assert!(settled.iter().all(|s| !s.applied));
        assert_eq!(view.state().books(), &before);
        assert!(!view.state().is_loaded());
        assert_eq!(view.state().drafts().new_title, "Lost");
    }

    #[tokio::test]
    async fn teardown_stops_issuing() {
        let mut view = BookListView::mount(FakeRepo::default());
        view.teardown();
        assert!(view.is_torn_down());
        assert_eq!(view.pending(), 0);

        view.add_book();
        assert_eq!(view.pending(), 0);
        assert!(view.next_completion().await.is_none());
        assert!(!view.state().is_loaded());
    }
}
