use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A published blog post, joined with its author's display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogContent {
    pub id: i64,
    pub title: String,
    pub tag: String,
    /// Markdown source.
    pub body: String,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
}

impl BlogContent {
    /// Publication time in the format used on exported documents.
    pub fn published_at(&self) -> String {
        self.created_at.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    /// Plain-text export of the post.
    pub fn to_text(&self) -> String {
        format!(
            "Title: {}\nAuthor: {}\nPublished: {}\n\n{}",
            self.title,
            self.author_name,
            self.published_at(),
            self.body
        )
    }
}

/// Page size for post listings and comment threads.
pub const PER_PAGE: u32 = 10;

/// A reader's comment on a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub blog_id: i64,
    pub body: String,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
}

/// One page of a newest-first listing. Pages are 1-based; a page past the
/// end is empty rather than an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: u32, total: u64) -> Self {
        Self {
            items,
            page: page.max(1),
            per_page: PER_PAGE,
            total,
            pages: total.div_ceil(u64::from(PER_PAGE)),
        }
    }

    pub fn empty(page: u32) -> Self {
        Self::new(Vec::new(), page, 0)
    }

    /// Cut one page out of an already ordered collection.
    pub fn slice(all: Vec<T>, page: u32) -> Self {
        let total = all.len() as u64;
        let items = all
            .into_iter()
            .skip(page_offset(page) as usize)
            .take(PER_PAGE as usize)
            .collect();
        Self::new(items, page, total)
    }
}

/// Rows to skip before the given page.
pub fn page_offset(page: u32) -> u64 {
    u64::from(page.max(1) - 1) * u64::from(PER_PAGE)
}

/// `?page=&q=` on the post listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlogQuery {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub q: Option<String>,
}

impl BlogQuery {
    pub fn page(&self) -> u32 {
        self.page.max(1)
    }

    /// Search term, if one was given. Blank terms list everything.
    pub fn search(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}

/// `?page=` on a post's comment thread.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: u32,
}

/// A post together with one page of its comments.
#[derive(Debug, Clone, Serialize)]
pub struct BlogView {
    #[serde(flatten)]
    pub blog: BlogContent,
    pub comments: Page<Comment>,
}
