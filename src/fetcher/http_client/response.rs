//! HTTP response wrapper.

use std::collections::HashMap;

use reqwest::{Response, StatusCode};

pub struct HttpResponse {
    pub status: StatusCode,
    /// Lowercased header names.
    pub headers: HashMap<String, String>,
    /// URL after redirects.
    pub final_url: String,
    pub(crate) response: Response,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(|s| s.as_str())
    }

    /// True when the body is something we can read as a page.
    pub fn is_textual(&self) -> bool {
        match self.content_type() {
            None => true,
            Some(ct) => {
                let ct = ct.to_ascii_lowercase();
                ct.starts_with("text/") || ct.contains("html") || ct.contains("xml")
            }
        }
    }

    pub async fn text(self) -> Result<String, reqwest::Error> {
        self.response.text().await
    }
}
