//! Perception oracle seam.
//!
//! Everything that needs a vision/reasoning model goes through this trait:
//! finding elements from natural-language descriptions, extracting
//! structured data from pages, classifying pages, and proposing the next
//! action in the adaptive fallback loop.  Every call site runs behind the
//! shared rate limiter.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reenact_core::ExtractionSchema;

use crate::error::Result;

/// Classification of the current page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageClass {
    /// Free-form label, e.g. "detail_page", "search_results".
    pub page_type: String,
    pub is_detail_page: bool,
    pub is_list_page: bool,
}

/// One action proposed by the adaptive fallback loop.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleAction {
    Click { x: i32, y: i32 },
    Type { text: String, submit: bool },
    Scroll { dy: i32 },
    Shortcut { keys: String },
    /// The oracle believes the goal is already achieved.
    Done,
}

/// Vision/reasoning backend for perception-driven strategies.
#[async_trait]
pub trait PerceptionOracle: Send + Sync {
    /// Locate an element matching a natural-language description.
    ///
    /// Returns screen coordinates, or `None` when nothing on screen
    /// matches.
    async fn locate_element(
        &self,
        description: &str,
        screenshot: &[u8],
    ) -> Result<Option<(i32, i32)>>;

    /// Extract named fields from the current page.
    ///
    /// With a schema, each field spec guides the extraction; without one,
    /// the oracle extracts whatever structured data the page offers.
    async fn extract_fields(
        &self,
        schema: Option<&ExtractionSchema>,
        page_text: &str,
    ) -> Result<BTreeMap<String, String>>;

    /// Classify the current page.
    async fn classify_page(&self, page_text: &str, url: Option<&str>) -> Result<PageClass>;

    /// Propose the next action toward a goal, given the current screen.
    async fn next_action(
        &self,
        goal_prompt: &str,
        page_text: &str,
        screenshot: &[u8],
    ) -> Result<OracleAction>;
}
