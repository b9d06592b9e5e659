//! IPFS (Kubo) HTTP RPC backend.
//!
//! Uses `POST /api/v0/add` to pin sealed blobs and `POST /api/v0/cat` to
//! read them back. The returned CID is the locator.

use super::{ContentStore, StoreError};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

#[derive(Debug, Clone)]
pub struct IpfsHttpStore {
    client: Client,
    api_base: Url,
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

impl IpfsHttpStore {
    /// `api_url` is the Kubo RPC endpoint, e.g. `http://127.0.0.1:5001`.
    pub fn new(api_url: &str) -> anyhow::Result<Self> {
        let mut api_base = Url::parse(api_url)?;
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }
        Ok(Self {
            client: Client::new(),
            api_base,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, StoreError> {
        self.api_base
            .join(path)
            .map_err(|e| StoreError::Unavailable(format!("bad endpoint {path}: {e}")))
    }
}

pub(crate) fn parse_add_response(body: &str) -> Result<String, StoreError> {
    // `add` streams one JSON object per line; the last one describes the root.
    let last = body
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| StoreError::Unavailable("empty add response".to_string()))?;
    let parsed: AddResponse = serde_json::from_str(last)
        .map_err(|e| StoreError::Unavailable(format!("malformed add response: {e}")))?;
    if parsed.hash.is_empty() {
        return Err(StoreError::Unavailable("add response without hash".to_string()));
    }
    Ok(parsed.hash)
}

pub(crate) fn classify_cat_failure(locator: &str, status: StatusCode, body: &str) -> StoreError {
    let lowered = body.to_ascii_lowercase();
    if status == StatusCode::NOT_FOUND
        || lowered.contains("not found")
        || lowered.contains("invalid cid")
        || lowered.contains("invalid path")
    {
        StoreError::NotFound(locator.to_string())
    } else {
        StoreError::Unavailable(format!("cat {locator} returned {status}: {}", body.trim()))
    }
}

#[async_trait]
impl ContentStore for IpfsHttpStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<String, StoreError> {
        let mut url = self.endpoint("api/v0/add")?;
        url.query_pairs_mut()
            .append_pair("pin", "true")
            .append_pair("cid-version", "1");

        let form = Form::new().part("file", Part::bytes(bytes).file_name("sealed.bin"));
        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("add request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Unavailable(format!("add response unreadable: {e}")))?;
        if !status.is_success() {
            return Err(StoreError::Unavailable(format!(
                "add returned {status}: {}",
                body.trim()
            )));
        }
        parse_add_response(&body)
    }

    async fn get(&self, locator: &str) -> Result<Vec<u8>, StoreError> {
        let mut url = self.endpoint("api/v0/cat")?;
        url.query_pairs_mut().append_pair("arg", locator);

        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("cat request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| StoreError::Unavailable(format!("cat body unreadable: {e}")))?;
            return Ok(bytes.to_vec());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_cat_failure(locator, status, &body))
    }

    fn name(&self) -> &'static str {
        "ipfs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_response_takes_last_object() {
        let body = "{\"Name\":\"sealed.bin\",\"Hash\":\"bafyfirst\",\"Size\":\"10\"}\n\
                    {\"Name\":\"\",\"Hash\":\"bafyroot\",\"Size\":\"12\"}\n";
        assert_eq!(parse_add_response(body).unwrap(), "bafyroot");
    }

    #[test]
    fn malformed_add_response_is_transient() {
        assert!(matches!(
            parse_add_response("<html>bad gateway</html>"),
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            parse_add_response("\n\n"),
            Err(StoreError::Unavailable(_))
        ));
    }

    #[test]
    fn cat_failures_are_classified() {
        assert_eq!(
            classify_cat_failure("bafy1", StatusCode::NOT_FOUND, ""),
            StoreError::NotFound("bafy1".to_string())
        );
        assert_eq!(
            classify_cat_failure(
                "bafy2",
                StatusCode::INTERNAL_SERVER_ERROR,
                "{\"Message\":\"block was not found locally (offline)\"}"
            ),
            StoreError::NotFound("bafy2".to_string())
        );
        assert!(matches!(
            classify_cat_failure("bafy3", StatusCode::BAD_GATEWAY, "upstream down"),
            StoreError::Unavailable(_)
        ));
    }

    #[test]
    fn api_base_gets_trailing_slash() {
        let store = IpfsHttpStore::new("http://127.0.0.1:5001/ipfs-rpc").unwrap();
        assert_eq!(
            store.endpoint("api/v0/add").unwrap().as_str(),
            "http://127.0.0.1:5001/ipfs-rpc/api/v0/add"
        );
    }
}
