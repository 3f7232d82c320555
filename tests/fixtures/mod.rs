//! Blog posts used across the HTTP and end-to-end tests

use blogpress::models::blog::BlogContent;
use chrono::{TimeZone, Utc};

/// Post id that is never seeded.
pub const MISSING_BLOG_ID: i64 = 999;

/// The canonical post: a level-one heading followed by a bold paragraph.
pub fn hello_post() -> BlogContent {
    BlogContent {
        id: 42,
        title: "Hello".to_string(),
        tag: "intro".to_string(),
        body: "# H1\n**bold**".to_string(),
        author_name: "alice".to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap(),
    }
}

/// A post whose title needs percent-encoding in a download filename.
pub fn unicode_post() -> BlogContent {
    BlogContent {
        id: 43,
        title: "Café notes".to_string(),
        tag: "misc".to_string(),
        body: "- one\n- two\n\n> quoted".to_string(),
        author_name: "bob".to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
    }
}
