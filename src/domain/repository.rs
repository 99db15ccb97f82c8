use std::future::Future;

use super::model::book::{Book, BookPayload};
use super::model::id::BookId;

/// リモートの書籍コレクションの抽象。Infra層が実装する。
///
/// 各メソッドは1往復のリクエストに対応する。戻り値のFutureは
/// ビュー側でタスクとして投げるため `Send` を要求する。
pub trait BookRepository {
    type Error: std::error::Error + Send + Sync + 'static;

    fn list(&self) -> impl Future<Output = Result<Vec<Book>, Self::Error>> + Send;

    fn create(
        &self,
        payload: &BookPayload,
    ) -> impl Future<Output = Result<Book, Self::Error>> + Send;

    fn replace(
        &self,
        id: BookId,
        payload: &BookPayload,
    ) -> impl Future<Output = Result<Book, Self::Error>> + Send;

    fn delete(&self, id: BookId) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
