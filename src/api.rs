//! Client for the Cubox third-party REST API.
//!
//! The orchestrator only sees the [`CuboxSource`] trait; [`CuboxApi`] is the
//! reqwest-backed implementation.
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, trace};
use reqwest::{header, Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};

use crate::{ApiResponse, Article, ArticleFilters, Folder, Result, StatusFilter, SyncError, Tag};

/// Number of cards requested per page
pub const PAGE_SIZE: usize = 50;

const FILTER_PATH: &str = "/c/api/third-party/card/filter";
const CONTENT_PATH: &str = "/c/api/third-party/card/content";
const FOLDERS_PATH: &str = "/c/api/third-party/group/list";
const TAGS_PATH: &str = "/c/api/third-party/tag/list";

/// Pagination position: the last card seen on the previous page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursor {
    pub last_card_id: Option<String>,
    pub last_card_update_time: Option<String>,
}

impl Cursor {
    pub fn new(last_card_id: Option<String>, last_card_update_time: Option<String>) -> Self {
        Self {
            last_card_id,
            last_card_update_time,
        }
    }

    pub fn after(article: &Article) -> Self {
        Self::new(Some(article.id.clone()), Some(article.update_time.clone()))
    }

    /// The cursor is only usable when both halves are present
    fn pair(&self) -> Option<(&str, &str)> {
        match (&self.last_card_id, &self.last_card_update_time) {
            (Some(id), Some(time)) if !id.is_empty() && !time.is_empty() => Some((id, time)),
            _ => None,
        }
    }
}

/// One page of cards
#[derive(Debug, Clone, Default)]
pub struct ArticlePage {
    pub articles: Vec<Article>,
    /// True when the page came back full, so another page may exist
    pub has_more: bool,
}

impl ArticlePage {
    pub fn from_articles(articles: Vec<Article>) -> Self {
        let has_more = articles.len() >= PAGE_SIZE;
        Self { articles, has_more }
    }
}

/// JSON body of the card filter endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterRequest {
    pub limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_card_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_card_update_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_filters: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_filters: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starred: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_filters: Option<Vec<String>>,
}

impl FilterRequest {
    /// Builds the request body, leaving out every unrestricted dimension
    pub fn build(cursor: &Cursor, filters: &ArticleFilters) -> Self {
        let (last_card_id, last_card_update_time) = match cursor.pair() {
            Some((id, time)) => (Some(id.to_string()), Some(time.to_string())),
            None => (None, None),
        };

        let (read, starred, annotated) = match filters.statuses {
            StatusFilter::All => (None, None, None),
            StatusFilter::Only {
                read,
                starred,
                annotated,
            } => (read.then_some(true), starred.then_some(true), annotated.then_some(true)),
        };

        Self {
            limit: PAGE_SIZE,
            last_card_id,
            last_card_update_time,
            group_filters: filters
                .folders
                .selected()
                .map(|ids| ids.iter().cloned().collect()),
            type_filters: filters
                .types
                .selected()
                .map(|types| types.iter().map(|t| t.as_str().to_string()).collect()),
            read,
            starred,
            annotated,
            tag_filters: filters
                .tags
                .selected()
                .map(|tags| tags.iter().map(|t| t.wire_value().to_string()).collect()),
        }
    }
}

/// The remote operations the sync loop depends on
#[async_trait]
pub trait CuboxSource: Send + Sync {
    /// Fetches one page of cards after `cursor`
    async fn list_articles(&self, cursor: &Cursor, filters: &ArticleFilters) -> Result<ArticlePage>;

    /// Fetches the full text of one card; `None` when Cubox has no content for it
    async fn get_article_content(&self, article_id: &str) -> Result<Option<String>>;

    async fn list_folders(&self) -> Result<Vec<Folder>>;

    async fn list_tags(&self) -> Result<Vec<Tag>>;

    /// Points the source at a new domain or credential
    fn update_config(&mut self, _domain: &str, _api_key: &str) -> Result<()> {
        Ok(())
    }
}

/// Maps a configured domain to the API base URL
pub fn endpoint_for(domain: &str) -> String {
    let domain = domain.trim().trim_end_matches('/');
    if domain.contains("://") {
        domain.to_string()
    } else {
        format!("https://{}", domain)
    }
}

/// Authenticated HTTP client for the Cubox API
pub struct CuboxApi {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl CuboxApi {
    pub fn new(domain: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint_for(domain),
            api_key: api_key.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_builder<B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> RequestBuilder
    where
        B: Serialize + ?Sized,
    {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.endpoint, path))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(header::CONTENT_TYPE, "application/json");
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        builder
    }

    async fn request<B, T>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<Option<T>>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.endpoint, path);
        trace!("{} {}", method, url);

        let builder = self.request_builder(method, path, query, body);
        let response = builder.send().await.map_err(|e| {
            error!("Request to {} failed: {}", url, e);
            SyncError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("API request to {} failed with status {}", path, status);
            error!("{}", message);
            return Err(SyncError::Network { message });
        }

        let envelope: ApiResponse<T> = response.json().await?;
        debug!(
            "{} answered code={} message={:?}",
            path, envelope.code, envelope.message
        );
        Ok(envelope.data)
    }
}

#[async_trait]
impl CuboxSource for CuboxApi {
    async fn list_articles(&self, cursor: &Cursor, filters: &ArticleFilters) -> Result<ArticlePage> {
        let body = FilterRequest::build(cursor, filters);
        let articles: Vec<Article> = self
            .request(Method::POST, FILTER_PATH, &[], Some(&body))
            .await?
            .unwrap_or_default();

        debug!("Fetched page of {} cards", articles.len());
        Ok(ArticlePage::from_articles(articles))
    }

    async fn get_article_content(&self, article_id: &str) -> Result<Option<String>> {
        let content: Option<String> = self
            .request::<(), _>(Method::GET, CONTENT_PATH, &[("id", article_id)], None)
            .await?;
        Ok(content.filter(|c| !c.is_empty()))
    }

    async fn list_folders(&self) -> Result<Vec<Folder>> {
        let folders: Option<Vec<Folder>> =
            self.request::<(), _>(Method::GET, FOLDERS_PATH, &[], None).await?;
        Ok(folders.unwrap_or_default())
    }

    async fn list_tags(&self) -> Result<Vec<Tag>> {
        let tags: Option<Vec<Tag>> =
            self.request::<(), _>(Method::GET, TAGS_PATH, &[], None).await?;
        Ok(tags.unwrap_or_default())
    }

    fn update_config(&mut self, domain: &str, api_key: &str) -> Result<()> {
        self.endpoint = endpoint_for(domain);
        self.api_key = api_key.to_string();
        Ok(())
    }
}
