//! Reading config sources from disk or over HTTP.

use crate::error::{Result, RonError};
use tracing::debug;

/// Whether `path` names an HTTP(S) resource.
pub fn is_url(path: &str) -> bool {
    let rest = path
        .strip_prefix("http://")
        .or_else(|| path.strip_prefix("https://"));
    match rest {
        Some(rest) => {
            let host = rest.split(['/', '?', '#']).next().unwrap_or("");
            !host.is_empty() && !host.starts_with('.') && !path.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

/// Read the contents of a local file or URL.
///
/// Any HTTP status other than 200 is an error carrying the status and body.
pub async fn fetch(path: &str) -> Result<String> {
    if path.is_empty() {
        return Err(RonError::Fetch {
            path: String::new(),
            message: "path not set".to_string(),
        });
    }
    if !is_url(path) {
        return tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RonError::Fetch {
                path: path.to_string(),
                message: e.to_string(),
            });
    }

    debug!(url = %path, "fetching config");
    let transport = |e: reqwest::Error| RonError::Fetch {
        path: path.to_string(),
        message: e.to_string(),
    };
    let response = reqwest::get(path).await.map_err(transport)?;
    let status = response.status();
    let body = response.text().await.map_err(transport)?;
    if status != reqwest::StatusCode::OK {
        return Err(RonError::HttpStatus {
            path: path.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}
