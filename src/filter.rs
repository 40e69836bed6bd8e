//! Filter selection state feeding the card filter request.
//!
//! Each dimension is either unrestricted (`All`) or restricted to an explicit
//! subset. "All" is never sent to the server as a literal value: the request
//! builder omits the dimension entirely.
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ContentType;

/// A selection over one filter dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "items", rename_all = "snake_case")]
pub enum Filter<T: Ord> {
    All,
    Subset(BTreeSet<T>),
}

impl<T: Ord> Default for Filter<T> {
    fn default() -> Self {
        Filter::All
    }
}

impl<T: Ord + Clone> Filter<T> {
    /// Builds a subset filter; an empty selection means no restriction
    pub fn subset<I: IntoIterator<Item = T>>(items: I) -> Self {
        let items: BTreeSet<T> = items.into_iter().collect();
        if items.is_empty() {
            Filter::All
        } else {
            Filter::Subset(items)
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Filter::All)
    }

    /// Items to restrict on, or `None` when the dimension is unrestricted
    pub fn selected(&self) -> Option<&BTreeSet<T>> {
        match self {
            Filter::All => None,
            Filter::Subset(items) => Some(items),
        }
    }

    pub fn contains(&self, item: &T) -> bool {
        match self {
            Filter::All => true,
            Filter::Subset(items) => items.contains(item),
        }
    }

    pub fn select_all(&mut self) {
        *self = Filter::All;
    }

    /// Flips one item, using `universe` to expand an `All` selection.
    ///
    /// Turning off an item while everything is selected leaves every other
    /// item of the universe selected. Selecting the whole universe collapses
    /// back to `All`.
    pub fn toggle(&mut self, item: T, universe: &[T]) {
        let mut items = match std::mem::take(self) {
            Filter::All => universe.iter().cloned().collect::<BTreeSet<T>>(),
            Filter::Subset(items) => items,
        };

        if !items.remove(&item) {
            items.insert(item);
        }

        let covers_universe =
            !universe.is_empty() && universe.iter().all(|u| items.contains(u));
        *self = if covers_universe {
            Filter::All
        } else {
            Filter::subset(items)
        };
    }
}

/// A tag selection entry; `Untagged` matches cards carrying no tag at all
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagChoice {
    Tag(String),
    Untagged,
}

impl TagChoice {
    /// Value sent inside `tag_filters`; the API uses "" for untagged cards
    pub fn wire_value(&self) -> &str {
        match self {
            TagChoice::Tag(id) => id,
            TagChoice::Untagged => "",
        }
    }
}

impl fmt::Display for TagChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagChoice::Tag(id) => f.write_str(id),
            TagChoice::Untagged => f.write_str("(untagged)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardStatus {
    Read,
    Starred,
    Annotated,
}

impl CardStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "read" => Some(CardStatus::Read),
            "starred" => Some(CardStatus::Starred),
            "annotated" => Some(CardStatus::Annotated),
            _ => None,
        }
    }
}

/// Status restriction; `All` overrides any individual flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StatusFilter {
    #[default]
    All,
    Only {
        read: bool,
        starred: bool,
        annotated: bool,
    },
}

impl StatusFilter {
    pub fn only(read: bool, starred: bool, annotated: bool) -> Self {
        if read || starred || annotated {
            StatusFilter::Only {
                read,
                starred,
                annotated,
            }
        } else {
            StatusFilter::All
        }
    }

    pub fn toggle(&mut self, status: CardStatus) {
        let (mut read, mut starred, mut annotated) = match *self {
            StatusFilter::All => (false, false, false),
            StatusFilter::Only {
                read,
                starred,
                annotated,
            } => (read, starred, annotated),
        };

        match status {
            CardStatus::Read => read = !read,
            CardStatus::Starred => starred = !starred,
            CardStatus::Annotated => annotated = !annotated,
        }

        *self = StatusFilter::only(read, starred, annotated);
    }
}

/// All filter dimensions the sync loop sends with each page request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleFilters {
    pub folders: Filter<String>,
    pub types: Filter<ContentType>,
    pub statuses: StatusFilter,
    pub tags: Filter<TagChoice>,
}
