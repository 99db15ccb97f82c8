pub mod book_store;
pub mod http_client;
