use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::error::DomainError;
use crate::domain::model::book::{Book, BookPayload};
use crate::domain::model::id::BookId;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// 永続化フォーマット。IDは再利用しないため最後に採番した値も保存する。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    last_id: u64,
    books: Vec<Book>,
}

impl Snapshot {
    fn position(&self, id: BookId) -> Result<usize, DomainError> {
        self.books
            .iter()
            .position(|b| b.id() == id)
            .ok_or(DomainError::BookNotFound(id))
    }
}

/// バックエンド側の正本ストア。
///
/// `path` があれば変更ごとにJSONファイルへ書き出す（tmpに書いてからrename）。
/// 変更はファイル書き込みが成功してから確定する。
pub struct BookStore {
    path: Option<PathBuf>,
    inner: Mutex<Snapshot>,
}

impl BookStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: Mutex::new(Snapshot::default()),
        }
    }

    /// ファイルがあれば読み込み、なければ空で始める。
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let snapshot = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            Snapshot::default()
        };
        info!(path = %path.display(), books = snapshot.books.len(), "book store opened");
        Ok(Self {
            path: Some(path),
            inner: Mutex::new(snapshot),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// 全件を挿入順で返す。
    pub fn list(&self) -> Vec<Book> {
        self.lock().books.clone()
    }

    pub fn get(&self, id: BookId) -> Result<Book, DomainError> {
        let snapshot = self.lock();
        let pos = snapshot.position(id)?;
        Ok(snapshot.books[pos].clone())
    }

    pub fn len(&self) -> usize {
        self.lock().books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn create(&self, payload: BookPayload) -> Result<Book, StoreError> {
        self.mutate(|snapshot| {
            let last = BookId::new(snapshot.last_id);
            let id = last.next().ok_or(DomainError::IdsExhausted(last))?;
            snapshot.last_id = id.get();
            let book = Book::from_payload(id, payload);
            snapshot.books.push(book.clone());
            Ok(book)
        })
    }

    pub fn replace(&self, id: BookId, payload: BookPayload) -> Result<Book, StoreError> {
        self.mutate(|snapshot| {
            let pos = snapshot.position(id)?;
            let book = Book::from_payload(id, payload);
            snapshot.books[pos] = book.clone();
            Ok(book)
        })
    }

    pub fn delete(&self, id: BookId) -> Result<(), StoreError> {
        self.mutate(|snapshot| {
            let pos = snapshot.position(id)?;
            snapshot.books.remove(pos);
            Ok(())
        })
    }

    // --- private ---

    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 複製に変更を適用 → 保存 → 確定。
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Snapshot) -> Result<T, DomainError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.lock();
        let mut next = guard.clone();
        let out = f(&mut next)?;
        self.persist(&next)?;
        *guard = next;
        Ok(out)
    }

    fn persist(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(snapshot)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &content)?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), books = snapshot.books.len(), "book store saved");
        Ok(())
    }
}
