//! Platform adapter seam.
//!
//! The executor drives real UIs only through this trait, so browser and
//! desktop backends are interchangeable and tests run against mocks.
//! Implementations wrap a browser automation session or OS accessibility
//! APIs; nothing else in the crate touches a live UI.

use async_trait::async_trait;

use crate::error::Result;

/// One controllable UI surface (a browser session or the desktop).
///
/// All methods take `&self`; implementations handle their own interior
/// synchronization.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    // -- pointer ----------------------------------------------------------

    /// Click at absolute screen coordinates.
    async fn click(&self, x: i32, y: i32) -> Result<()>;

    /// Click the first element matching a CSS selector.
    async fn click_selector(&self, selector: &str) -> Result<()>;

    /// Click the first element whose visible text contains `text`.
    async fn click_text(&self, text: &str) -> Result<()>;

    /// Click the first element with the given ARIA/accessibility role,
    /// optionally narrowed by accessible name.
    async fn click_role(&self, role: &str, name: Option<&str>) -> Result<()>;

    // -- keyboard ---------------------------------------------------------

    /// Fill the element matching `selector` with `value`.
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    /// Type into whatever currently has focus, optionally pressing Enter.
    async fn type_text(&self, text: &str, submit: bool) -> Result<()>;

    /// Press a key combination, e.g. "command+v".
    async fn press_shortcut(&self, keys: &str) -> Result<()>;

    // -- observation ------------------------------------------------------

    /// Current page URL, if the surface has one.
    async fn current_url(&self) -> Result<Option<String>>;

    /// Visible text content of the current page or frontmost window.
    async fn page_text(&self) -> Result<String>;

    /// Whether an element matching the selector or description is visible.
    async fn element_visible(&self, target: &str) -> Result<bool>;

    /// Screenshot of the current viewport, PNG-encoded.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    // -- navigation & apps ------------------------------------------------

    /// Navigate the surface directly to a URL.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Scroll the active view vertically by `dy` pixels (positive = down).
    async fn scroll(&self, dy: i32) -> Result<()>;

    /// Wait until the current page has finished loading.
    async fn wait_for_load(&self) -> Result<()>;

    /// Whether the named application is frontmost.
    async fn is_app_active(&self, app: &str) -> Result<bool>;

    /// Bring an already-running application to the front.
    async fn activate_app(&self, app: &str) -> Result<()>;

    /// Launch an application and bring it to the front.
    async fn launch_app(&self, app: &str) -> Result<()>;
}
