//! Page navigation
//!
//! The client does not render pages itself: the login page and the batch
//! verification page are served by the backend and opened in the system browser.

use reqwest::Url;
use tracing::info;

/// Route the client is sent to when the admin session expires.
pub const LOGIN_ROUTE: &str = "/admin/login";
/// Server-rendered verification page prefix.
pub const VERIFY_ROUTE: &str = "/verify";

/// Something that can take the user to another page.
pub trait Navigator: Send + Sync {
    /// Replace the current page (session expiry, logout).
    fn navigate(&self, url: &str) -> std::io::Result<()>;

    /// Open a page alongside the current one.
    fn open_in_new_tab(&self, url: &str) -> std::io::Result<()>;
}

/// Opens pages in the system web browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserNavigator;

impl Navigator for BrowserNavigator {
    fn navigate(&self, url: &str) -> std::io::Result<()> {
        info!(%url, "navigating");
        webbrowser::open(url)
    }

    fn open_in_new_tab(&self, url: &str) -> std::io::Result<()> {
        info!(%url, "opening new tab");
        webbrowser::open(url)
    }
}

/// Join a route onto the server base URL.
pub fn route_url(base: &Url, route: &str) -> Url {
    let mut url = base.clone();
    url.set_path(route);
    url.set_query(None);
    url
}

/// URL of the verification page for a batch.
///
/// Returns `None` for a blank batch number. The batch number is encoded as a
/// single path segment, so `/` and spaces cannot escape the route.
pub fn verification_url(base: &Url, batch_number: &str) -> Option<Url> {
    let batch_number = batch_number.trim();
    if batch_number.is_empty() {
        return None;
    }
    let mut url = route_url(base, VERIFY_ROUTE);
    url.path_segments_mut().ok()?.push(batch_number);
    Some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://127.0.0.1:5000").unwrap()
    }

    #[test]
    fn login_url() {
        assert_eq!(
            route_url(&base(), LOGIN_ROUTE).as_str(),
            "http://127.0.0.1:5000/admin/login"
        );
    }

    #[test]
    fn route_replaces_base_path() {
        let base = Url::parse("https://example.org/admin?tab=reports").unwrap();
        assert_eq!(
            route_url(&base, LOGIN_ROUTE).as_str(),
            "https://example.org/admin/login"
        );
    }

    #[test]
    fn verification_url_plain() {
        let url = verification_url(&base(), "BATCH-001").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:5000/verify/BATCH-001");
    }

    #[test]
    fn verification_url_encodes_segment() {
        let url = verification_url(&base(), " A 1/2 ").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:5000/verify/A%201%2F2");
    }

    #[test]
    fn verification_url_blank_rejected() {
        assert!(verification_url(&base(), "").is_none());
        assert!(verification_url(&base(), "   ").is_none());
    }
}
