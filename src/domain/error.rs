use super::model::id::BookId;

#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("book not found: {0}")]
    BookNotFound(BookId),
    #[error("book id space exhausted after {0}")]
    IdsExhausted(BookId),
}
