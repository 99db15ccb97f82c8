use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::domain::model::book::{Book, BookPayload};
use crate::domain::model::id::BookId;
use crate::domain::repository::BookRepository;

#[derive(Debug, thiserror::Error)]
pub enum HttpClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid endpoint URL: {0}")]
    Url(String),
}

/// REST API (`/api/books/...`) に対するBookRepository実装。
///
/// 認証・ページング・リトライ・タイムアウトは持たない。
#[derive(Debug, Clone)]
pub struct HttpBookRepository {
    client: Client,
    base: Url,
}

impl HttpBookRepository {
    /// `base` はAPIのルート（例: `http://127.0.0.1:8000/`）。末尾の `/` は補う。
    pub fn new(base: Url) -> Self {
        Self::with_client(Client::new(), base)
    }

    pub fn with_client(client: Client, mut base: Url) -> Self {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self { client, base }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn list_url(&self) -> Result<Url, HttpClientError> {
        self.endpoint("api/books/")
    }

    pub fn create_url(&self) -> Result<Url, HttpClientError> {
        self.endpoint("api/books/create/")
    }

    pub fn detail_url(&self, id: BookId) -> Result<Url, HttpClientError> {
        self.endpoint(&format!("api/books/{id}/"))
    }

    fn endpoint(&self, path: &str) -> Result<Url, HttpClientError> {
        self.base
            .join(path)
            .map_err(|e| HttpClientError::Url(e.to_string()))
    }

    /// 送信して2xx以外をエラーにする。ボディはそのまま返す。
    async fn send(&self, request: RequestBuilder) -> Result<String, HttpClientError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(%status, bytes = body.len(), "book api response");
        if !status.is_success() {
            return Err(HttpClientError::Status { status, body });
        }
        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, HttpClientError> {
        let body = self.send(request).await?;
        Ok(serde_json::from_str(&body)?)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(%method, %url, "book api request");
        self.client.request(method, url)
    }
}

impl BookRepository for HttpBookRepository {
    type Error = HttpClientError;

    async fn list(&self) -> Result<Vec<Book>, Self::Error> {
        let url = self.list_url()?;
        self.send_json(self.request(Method::GET, url)).await
    }

    async fn create(&self, payload: &BookPayload) -> Result<Book, Self::Error> {
        let url = self.create_url()?;
        self.send_json(self.request(Method::POST, url).json(payload)).await
    }

    async fn replace(&self, id: BookId, payload: &BookPayload) -> Result<Book, Self::Error> {
        let url = self.detail_url(id)?;
        self.send_json(self.request(Method::PUT, url).json(payload)).await
    }

    async fn delete(&self, id: BookId) -> Result<(), Self::Error> {
        let url = self.detail_url(id)?;
        // 応答ボディは使わない
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }
}
