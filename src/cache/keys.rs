//! Response cache keys.

use std::fmt;

use axum::http::Uri;
use url::form_urlencoded;

/// Identifies one rendered variant of a cached route.
///
/// The raw `page` parameter is kept as sent so `?page=2` and `?page=02`
/// are cached separately, and the viewer is part of the key because the
/// rendered chrome differs per signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResponseCacheKey {
    prefix: String,
    path: String,
    page: Option<String>,
    viewer: Option<String>,
}

impl ResponseCacheKey {
    pub fn new(
        prefix: impl Into<String>,
        path: impl Into<String>,
        page: Option<String>,
        viewer: Option<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            path: path.into(),
            page,
            viewer,
        }
    }

    /// Build a key from a request URI, ignoring query parameters other than `page`.
    pub fn from_uri(prefix: &str, uri: &Uri, viewer: Option<&str>) -> Self {
        let page = uri.query().and_then(|query| {
            form_urlencoded::parse(query.as_bytes())
                .find(|(name, _)| name == "page")
                .map(|(_, value)| value.into_owned())
        });

        Self::new(prefix, uri.path(), page, viewer.map(str::to_string))
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for ResponseCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.prefix, self.path)?;
        if let Some(page) = self.page.as_deref() {
            write!(f, ":page={page}")?;
        }
        if let Some(viewer) = self.viewer.as_deref() {
            write!(f, ":viewer={viewer}")?;
        }
        Ok(())
    }
}
