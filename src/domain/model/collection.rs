use super::book::Book;
use super::id::BookId;

/// クライアント側のミラー。挿入順を保持する。
///
/// 正本はサーバ側にあり、ここでは応答をそのまま反映するだけ。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookCollection {
    books: Vec<Book>,
}

impl BookCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Book> {
        self.books.iter()
    }

    pub fn as_slice(&self) -> &[Book] {
        &self.books
    }

    pub fn get(&self, id: BookId) -> Option<&Book> {
        self.books.iter().find(|b| b.id() == id)
    }

    pub fn contains(&self, id: BookId) -> bool {
        self.get(id).is_some()
    }

    /// 一覧取得の結果で丸ごと置き換える。
    pub fn replace_all(&mut self, books: Vec<Book>) {
        self.books = books;
    }

    /// 末尾に追加する。既存要素の順序は変えない。
    pub fn append(&mut self, book: Book) {
        self.books.push(book);
    }

    /// `id` に一致する要素をサーバ応答で置き換える。位置は維持。
    /// 一致しなければ何もしない。
    pub fn replace(&mut self, id: BookId, book: Book) -> bool {
        let mut replaced = false;
        for slot in self.books.iter_mut().filter(|b| b.id() == id) {
            *slot = book.clone();
            replaced = true;
        }
        replaced
    }

    /// `id` に一致する要素を取り除く。残りの順序は維持。
    pub fn remove(&mut self, id: BookId) -> bool {
        let before = self.books.len();
        self.books.retain(|b| b.id() != id);
        self.books.len() != before
    }
}

impl From<Vec<Book>> for BookCollection {
    fn from(books: Vec<Book>) -> Self {
        Self { books }
    }
}

impl<'a> IntoIterator for &'a BookCollection {
    type Item = &'a Book;
    type IntoIter = std::slice::Iter<'a, Book>;

    fn into_iter(self) -> Self::IntoIter {
        self.books.iter()
    }
}
