use std::time::Duration;

use crate::CoreError;

/// Raw bytes of a retrieved document.
#[derive(Debug, Clone)]
pub struct Document {
    pub url: String,
    pub bytes: Vec<u8>,
}

/// Source of document bytes.
#[allow(async_fn_in_trait)]
pub trait Fetcher {
    async fn fetch(&self, url: &str) -> Result<Document, CoreError>;
}

/// Single-attempt HTTP GET fetcher. No retries.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("paperdigest/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Document, CoreError> {
        let resp = self.client.get(url).send().await?;
        let resp = check_retrieval_status(url, resp)?;
        let bytes = resp.bytes().await?.to_vec();
        log::info!("retrieved {} bytes from {}", bytes.len(), url);
        Ok(Document {
            url: url.to_string(),
            bytes,
        })
    }
}

/// Turn a non-success response into [`CoreError::Retrieval`].
pub fn check_retrieval_status(
    url: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, CoreError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(CoreError::Retrieval {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16) -> reqwest::Response {
        http::Response::builder()
            .status(status)
            .body("%PDF-1.5")
            .unwrap()
            .into()
    }

    #[test]
    fn success_passes_through() {
        assert!(check_retrieval_status("https://arxiv.org/pdf/1902.10186", response(200)).is_ok());
    }

    #[test]
    fn not_found_is_retrieval_error() {
        let err = check_retrieval_status("https://example.com/missing.pdf", response(404))
            .unwrap_err();
        match err {
            CoreError::Retrieval { url, status } => {
                assert_eq!(url, "https://example.com/missing.pdf");
                assert_eq!(status, 404);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn redirect_status_is_not_success() {
        assert!(check_retrieval_status("https://example.com", response(304)).is_err());
        assert!(check_retrieval_status("https://example.com", response(500)).is_err());
    }
}
