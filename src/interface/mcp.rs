//! MCP Server for bookshelf
//!
//! MCP Protocol (stdio) <-> application::BookListView <-> REST API
//!
//! 5 tools: books, draft, add_book, update_book, delete_book

use std::sync::Arc;

use rmcp::{
    handler::server::{tool::ToolCallContext, tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolRequestParams, CallToolResult, Content, Implementation, ListToolsResult,
        PaginatedRequestParams, ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
    transport::stdio,
    ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::application::error::AppError;
use crate::application::render::{render_drafts, render_view};
use crate::application::view::{BookListView, ViewState};
use crate::config::ClientConfig;
use crate::domain::error::DomainError;
use crate::domain::model::id::BookId;
use crate::infra::http_client::HttpBookRepository;

// =============================================================================
// Public entry point
// =============================================================================

/// ビューをマウント（初回の一覧取得を発行）してMCP Serverを起動する。
pub async fn run(config: ClientConfig) -> anyhow::Result<()> {
    info!(api_base = %config.api_base, "mounting book list view");
    let repo = HttpBookRepository::new(config.api_base);
    let server = BookshelfMcpServer::new(BookListView::mount(repo));
    let view = Arc::clone(&server.view);

    let service = server.serve(stdio()).await?;
    service.waiting().await?;

    // セッション終了後に届いた応答は反映しない
    view.lock().await.teardown();
    Ok(())
}

// =============================================================================
// MCP Server
// =============================================================================

type View = BookListView<HttpBookRepository>;

#[derive(Clone)]
struct BookshelfMcpServer {
    view: Arc<Mutex<View>>,
    tool_router: ToolRouter<Self>,
}

impl BookshelfMcpServer {
    fn new(view: View) -> Self {
        Self {
            view: Arc::new(Mutex::new(view)),
            tool_router: Self::tool_router(),
        }
    }

    /// 未決着のリクエストを全て反映してから描画する。
    async fn settle_and_render(view: &mut View) -> CallToolResult {
        view.settle().await;
        CallToolResult::success(vec![Content::text(render_view(view.state()))])
    }
}

// =============================================================================
// ServerHandler impl
// =============================================================================

impl ServerHandler for BookshelfMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "bookshelf".to_string(),
                title: Some("Bookshelf — Book list client".to_string()),
                description: Some(
                    "Single book list view mirrored from a REST collection. \
                     Drafts → add/update/delete → the list reflects the server's response."
                        .to_string(),
                ),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Manage a list of books stored on a REST backend.\n\
                 \n\
                 `books` shows the list and the draft fields. `add_book` creates a book from the \
                 title/release-year drafts. `update_book` replaces a book's title with the shared \
                 `new_title` draft and keeps its release year. `delete_book` removes a book.\n\
                 \n\
                 Failed requests are not reported; the list simply stays as it was."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: self.tool_router.list_all(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let tool_ctx = ToolCallContext::new(self, request, context);
        self.tool_router.call(tool_ctx).await
    }
}

// =============================================================================
// Request types
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
struct McpBooksRequest {
    #[schemars(description = "Fetch the list from the server again before showing it")]
    pub reload: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
struct McpDraftRequest {
    #[schemars(description = "Title for the next `add_book`")]
    pub title: Option<String>,
    #[schemars(description = "Release year for the next `add_book`")]
    pub release_year: Option<i32>,
    #[schemars(description = "Replacement title used by `update_book` (shared by all books)")]
    pub new_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct McpAddBookRequest {
    #[schemars(description = "Sets the title draft first. Omit to use the current draft.")]
    pub title: Option<String>,
    #[schemars(description = "Sets the release year draft first. Omit to use the current draft.")]
    pub release_year: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct McpUpdateBookRequest {
    #[schemars(description = "Book id from `books` output (e.g. '3'), or part of its title")]
    pub book: String,
    #[schemars(
        description = "Sets the shared new-title draft first. Omit to reuse the current draft."
    )]
    pub new_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct McpDeleteBookRequest {
    #[schemars(description = "Book id from `books` output (e.g. '3'), or part of its title")]
    pub book: String,
}

fn to_mcp_error(e: AppError) -> McpError {
    McpError::invalid_params(format!("{e}"), None)
}

/// 表示中の一覧から書籍を特定する。
///
/// 優先順位:
/// 1. 一覧にある数値ID
/// 2. タイトル部分一致（case-insensitive）
fn resolve_book(state: &ViewState, s: &str) -> Result<BookId, McpError> {
    let numeric = s.parse::<BookId>().ok();
    if let Some(id) = numeric {
        if state.books().contains(id) {
            return Ok(id);
        }
    }

    let query = s.trim().to_lowercase();
    let matches: Vec<BookId> = state
        .books()
        .iter()
        .filter(|b| !query.is_empty() && b.title().to_lowercase().contains(&query))
        .map(|b| b.id())
        .collect();

    match matches.len() {
        0 => match numeric {
            Some(id) => Err(to_mcp_error(AppError::from(DomainError::BookNotFound(id)))),
            None => Err(McpError::invalid_params(
                format!("No book matching '{s}'. Run `books` to see the list."),
                None,
            )),
        },
        1 => Ok(matches[0]),
        n => Err(McpError::invalid_params(
            format!(
                "Ambiguous title match: '{s}' matches {n} books: {}",
                matches
                    .iter()
                    .filter_map(|id| state.books().get(*id))
                    .map(|b| format!("'{}' ({})", b.title(), b.id()))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            None,
        )),
    }
}

// =============================================================================
// Tool implementations
// =============================================================================

#[tool_router]
impl BookshelfMcpServer {
    #[tool(
        name = "books",
        description = "Show the book list and the draft fields. Set reload=true to fetch the list from the server again.",
        annotations(
            read_only_hint = true,
            destructive_hint = false,
            open_world_hint = true
        )
    )]
    async fn books(
        &self,
        Parameters(req): Parameters<McpBooksRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut view = self.view.lock().await;
        if req.reload.unwrap_or(false) {
            view.reload();
        }
        Ok(Self::settle_and_render(&mut view).await)
    }

    #[tool(
        name = "draft",
        description = "Set draft fields: title and release_year for `add_book`, new_title for `update_book`. Only specified fields change.",
        annotations(
            read_only_hint = false,
            destructive_hint = false,
            idempotent_hint = true,
            open_world_hint = false
        )
    )]
    async fn draft(
        &self,
        Parameters(req): Parameters<McpDraftRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut view = self.view.lock().await;
        if let Some(title) = req.title {
            view.set_title_draft(title);
        }
        if let Some(year) = req.release_year {
            view.set_release_year_draft(year);
        }
        if let Some(new_title) = req.new_title {
            view.set_new_title_draft(new_title);
        }
        Ok(CallToolResult::success(vec![Content::text(render_drafts(
            view.state().drafts(),
        ))]))
    }

    #[tool(
        name = "add_book",
        description = "Create a book from the title and release year drafts. Drafts are kept afterwards.",
        annotations(
            read_only_hint = false,
            destructive_hint = false,
            idempotent_hint = false,
            open_world_hint = true
        )
    )]
    async fn add_book(
        &self,
        Parameters(req): Parameters<McpAddBookRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut view = self.view.lock().await;
        if let Some(title) = req.title {
            view.set_title_draft(title);
        }
        if let Some(year) = req.release_year {
            view.set_release_year_draft(year);
        }
        view.add_book();
        Ok(Self::settle_and_render(&mut view).await)
    }

    #[tool(
        name = "update_book",
        description = "Replace a book's title with the shared new_title draft, keeping its release year. The same draft applies to whichever book you update.",
        annotations(
            read_only_hint = false,
            destructive_hint = false,
            idempotent_hint = true,
            open_world_hint = true
        )
    )]
    async fn update_book(
        &self,
        Parameters(req): Parameters<McpUpdateBookRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut view = self.view.lock().await;
        view.settle().await;

        let id = resolve_book(view.state(), &req.book)?;
        let release_year = view
            .state()
            .book(id)
            .map_err(|e| to_mcp_error(e.into()))?
            .release_year();

        if let Some(new_title) = req.new_title {
            view.set_new_title_draft(new_title);
        }
        view.update_book(id, release_year);
        Ok(Self::settle_and_render(&mut view).await)
    }

    #[tool(
        name = "delete_book",
        description = "Delete a book by id or title.",
        annotations(
            read_only_hint = false,
            destructive_hint = true,
            idempotent_hint = true,
            open_world_hint = true
        )
    )]
    async fn delete_book(
        &self,
        Parameters(req): Parameters<McpDeleteBookRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut view = self.view.lock().await;
        view.settle().await;

        let id = resolve_book(view.state(), &req.book)?;
        view.delete_book(id);
        Ok(Self::settle_and_render(&mut view).await)
    }
}

// =============================================================================
// Tests
// =============================================================================
