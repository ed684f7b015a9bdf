//! Feed data source and pagination state.
//!
//! The feed is an external collaborator: it yields pages of items on demand,
//! 0-indexed, and an empty successful page means end-of-feed. [`FeedPager`]
//! keeps the loaded window and the paging bookkeeping (last-page latch,
//! near-end load-more trigger); [`MockFeedSource`] is the built-in source for
//! the demo runner and tests.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::analytics::{Analytics, event, key};

/// One item in the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: String,
    pub author_name: String,
    pub description: String,
    pub like_count: u32,
    pub comment_count: u32,
    pub favorite_count: u32,
    pub media_uri: String,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed source error: {0}")]
    Source(String),
}

/// Paged feed supplier.
pub trait FeedSource {
    /// Fetch page `page` (0-indexed) of up to `page_size` items. An empty
    /// `Ok` result signals end-of-feed.
    fn get_page(&mut self, page: usize, page_size: usize) -> Result<Vec<FeedItem>, FeedError>;
}

/// Loaded feed window plus paging state.
///
/// A short or empty page latches `last_page`; further load-more calls are
/// no-ops. Source errors are logged and leave the loaded window untouched -
/// the next trigger retries the same page.
pub struct FeedPager {
    source: Box<dyn FeedSource>,
    items: Vec<FeedItem>,
    next_page: usize,
    page_size: usize,
    last_page: bool,
}

impl FeedPager {
    pub fn new(source: Box<dyn FeedSource>, page_size: usize) -> Self {
        Self {
            source,
            items: Vec::new(),
            next_page: 0,
            page_size,
            last_page: false,
        }
    }

    /// Fetch the first page. Errors reset to an empty feed.
    pub fn load_initial(&mut self) {
        self.items.clear();
        self.next_page = 0;
        self.last_page = false;
        self.load_more();
    }

    /// Fetch the next page and append it, if not already at the end.
    pub fn load_more(&mut self) -> bool {
        if self.last_page {
            debug!("load_more skipped: last page reached");
            return false;
        }

        match self.source.get_page(self.next_page, self.page_size) {
            Ok(page) => {
                if page.is_empty() {
                    self.last_page = true;
                    info!("feed exhausted at {} items", self.items.len());
                    return false;
                }
                self.last_page = page.len() < self.page_size;
                self.next_page += 1;
                info!(
                    "loaded page {}: {} items, total {}",
                    self.next_page - 1,
                    page.len(),
                    self.items.len() + page.len()
                );
                self.items.extend(page);
                true
            }
            Err(e) => {
                warn!("feed page {} failed: {}", self.next_page, e);
                false
            }
        }
    }

    /// Load more when the user is within `trigger_distance` of the end,
    /// reporting the `page_load_more` event on trigger.
    pub fn maybe_load_more(
        &mut self,
        position: usize,
        trigger_distance: usize,
        analytics: &Analytics,
    ) -> bool {
        if self.items.is_empty() || position + trigger_distance < self.items.len() {
            return false;
        }
        let page = self.next_page;
        if !self.load_more() {
            // Exhausted feed or source error: no page, no event.
            return false;
        }

        let mut params = serde_json::Map::new();
        params.insert(key::PAGE_NUMBER.into(), json!(page));
        params.insert("trigger_position".into(), json!(position));
        analytics.track(event::PAGE_LOAD_MORE, params);
        true
    }

    pub fn item(&self, position: usize) -> Option<&FeedItem> {
        self.items.get(position)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_last_page(&self) -> bool {
        self.last_page
    }
}

impl std::fmt::Debug for FeedPager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedPager")
            .field("items", &self.items.len())
            .field("next_page", &self.next_page)
            .field("last_page", &self.last_page)
            .finish()
    }
}

const MOCK_URIS: [&str; 3] = [
    "https://vjs.zencdn.net/v/oceans.mp4",
    "https://media.w3.org/2010/05/sintel/trailer.mp4",
    "https://mirror.aarnet.edu.au/pub/TED-talks/911Mothers_2010W-480p.mp4",
];

const MOCK_AUTHORS: [&str; 8] = [
    "@Mareep", "@Ampharos", "@Misoponia", "@Elecleus", "@Abler", "@Kimika", "@Sratle", "@Lilas",
];

/// Deterministic in-memory feed of `total` items cycling over a few URIs.
#[derive(Debug, Clone)]
pub struct MockFeedSource {
    total: usize,
}

impl MockFeedSource {
    pub fn new(total: usize) -> Self {
        Self { total }
    }
}

impl Default for MockFeedSource {
    fn default() -> Self {
        Self::new(30)
    }
}

impl FeedSource for MockFeedSource {
    fn get_page(&mut self, page: usize, page_size: usize) -> Result<Vec<FeedItem>, FeedError> {
        let start = page * page_size;
        if start >= self.total {
            return Ok(Vec::new());
        }
        let end = (start + page_size).min(self.total);

        Ok((start..end)
            .map(|index| FeedItem {
                id: (index + 1).to_string(),
                author_name: MOCK_AUTHORS[index % MOCK_AUTHORS.len()].to_string(),
                description: format!("feed clip #{}", index + 1),
                like_count: 1_000 + (index as u32 * 137) % 99_000,
                comment_count: 100 + (index as u32 * 61) % 9_900,
                favorite_count: 500 + (index as u32 * 89) % 49_500,
                media_uri: MOCK_URIS[index % MOCK_URIS.len()].to_string(),
            })
            .collect())
    }
}
