use crate::domain::model::book::Book;

use super::view::{Drafts, ViewState};

/// 画面見出し
pub const HEADING: &str = "Book Website";

/// ビュー全体をテキストで描画する。
pub fn render_view(state: &ViewState) -> String {
    let mut buf = format!("# {HEADING}\n\n");
    buf.push_str(&render_drafts(state.drafts()));
    buf.push('\n');

    if !state.is_loaded() && state.books().is_empty() {
        buf.push_str("(book list not loaded)\n");
        return buf;
    }

    if state.books().is_empty() {
        buf.push_str("No books yet. Use `add_book` to create one.\n");
        return buf;
    }

    for book in state.books() {
        buf.push_str(&render_book(book));
    }
    buf
}

/// 下書き欄の現在値。
pub fn render_drafts(drafts: &Drafts) -> String {
    format!(
        "New book: title \"{}\", release year {}\nNew title: \"{}\"\n",
        drafts.title, drafts.release_year, drafts.new_title
    )
}

fn render_book(book: &Book) -> String {
    format!(
        "- [{}] {}\n  Release Year: {}\n",
        book.id(),
        book.title(),
        book.release_year()
    )
}
