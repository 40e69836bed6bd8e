//! Remote data structures returned by the Cubox API.
//!
//! Every field is defaulted so that older or partial payloads still
//! deserialize; the vendor omits empty values rather than sending nulls.
use std::fmt;

use serde::{Deserialize, Serialize};

/// A saved card (article, snippet, memo, ...) in Cubox
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Article {
    /// Unique identifier, also used for deduplication of local notes
    pub id: String,
    /// Title given to the card
    pub title: String,
    /// Title of the original web page
    pub article_title: String,
    pub description: String,
    /// Source URL
    pub url: String,
    /// Deep link into the Cubox web app
    pub cubox_url: String,
    pub domain: String,
    pub create_time: String,
    pub update_time: String,
    pub word_count: u64,
    /// Content type tag (article, snippet, memo, ...)
    #[serde(rename = "type")]
    pub card_type: String,
    /// Full text body, fetched separately from the list
    pub content: Option<String>,
    pub highlights: Option<Vec<Highlight>>,
    pub tags: Option<Vec<String>>,
}

impl Article {
    /// Highlights in server order, empty when the card has none
    pub fn highlights(&self) -> &[Highlight] {
        self.highlights.as_deref().unwrap_or_default()
    }

    /// Tag names, empty when the card is untagged
    pub fn tags(&self) -> &[String] {
        self.tags.as_deref().unwrap_or_default()
    }

    /// Title to fall back on when a template cannot be rendered
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            "Untitled"
        } else {
            &self.title
        }
    }
}

/// A user-marked excerpt (or image) within an article
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Highlight {
    pub id: String,
    /// Quoted text; empty for image-only highlights
    pub text: String,
    pub image_url: Option<String>,
    pub cubox_url: String,
    pub note: Option<String>,
    pub color: String,
    pub create_time: String,
}

/// A Cubox folder (called "group" by the API)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Folder {
    pub id: String,
    pub name: String,
    /// Breadcrumb path, e.g. `Reading/Tech`
    pub nested_name: String,
    pub uncategorized: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub nested_name: String,
    pub parent_id: Option<String>,
}

/// Content type tags understood by the filter endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Article,
    Snippet,
    Memo,
    Image,
    Audio,
    Video,
    File,
}

impl ContentType {
    pub const ALL: [ContentType; 7] = [
        ContentType::Article,
        ContentType::Snippet,
        ContentType::Memo,
        ContentType::Image,
        ContentType::Audio,
        ContentType::Video,
        ContentType::File,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Article => "article",
            ContentType::Snippet => "snippet",
            ContentType::Memo => "memo",
            ContentType::Image => "image",
            ContentType::Audio => "audio",
            ContentType::Video => "video",
            ContentType::File => "file",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_lowercase();
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope shared by every Cubox third-party endpoint
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_deserializes_with_missing_fields() {
        let json = r#"{
            "id": "7012",
            "title": "Rust ownership",
            "type": "article",
            "word_count": 1200,
            "highlights": [{"id": "h1", "text": "borrow", "color": "yellow"}]
        }"#;

        let article: Article = serde_json::from_str(json).unwrap();
        assert_eq!(article.id, "7012");
        assert_eq!(article.card_type, "article");
        assert_eq!(article.highlights().len(), 1);
        assert!(article.highlights()[0].note.is_none());
        assert!(article.tags().is_empty());
        assert!(article.content.is_none());
    }

    #[test]
    fn null_data_envelope() {
        let response: ApiResponse<String> =
            serde_json::from_str(r#"{"code": 200, "message": "ok", "data": null}"#).unwrap();
        assert!(response.data.is_none());
    }

    #[test]
    fn content_type_parsing() {
        assert_eq!(ContentType::parse(" Memo "), Some(ContentType::Memo));
        assert_eq!(ContentType::parse("podcast"), None);
        assert_eq!(
            serde_json::to_string(&ContentType::Video).unwrap(),
            "\"video\""
        );
    }

    #[test]
    fn display_title_fallback() {
        let article = Article {
            title: "   ".to_string(),
            ..Default::default()
        };
        assert_eq!(article.display_title(), "Untitled");
    }
}
