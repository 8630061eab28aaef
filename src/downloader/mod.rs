//! JSON-RPC 2.0 client for the local downloader's aria2-compatible API (C2).

pub mod types;

use crate::error::CoreError;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::instrument;
use types::{Aria2Status, JsonRpcRequest, JsonRpcResponse};

const GATEWAY: &str = "downloader";

/// Client for the local downloader's aria2 JSON-RPC endpoint.
pub struct LocalDownloaderGateway {
    client: Client,
    rpc_url: String,
    secret: String,
    base_path: String,
}

impl LocalDownloaderGateway {
    pub fn new(rpc_url: String, secret: String, base_path: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("reqwest client builder should not fail with default TLS config"),
            rpc_url,
            secret,
            base_path,
        }
    }

    /// Downloads `uri` into `base_path/name` and returns the assigned gid.
    #[instrument(skip(self, uri), fields(gateway = GATEWAY, name))]
    pub async fn add_uri(&self, uri: &str, name: &str) -> Result<String, CoreError> {
        let params = serde_json::json!([
            self.token(),
            [uri],
            { "dir": self.base_path, "out": name },
        ]);
        let gid: String = self.call("aria2.addUri", params).await?;
        Ok(gid)
    }

    #[instrument(skip(self), fields(gateway = GATEWAY, gid))]
    pub async fn tell_status(&self, gid: &str) -> Result<Aria2Status, CoreError> {
        let params = serde_json::json!([self.token(), gid]);
        match self.call::<StatusPayload>("aria2.tellStatus", params).await {
            Ok(payload) => Aria2Status::from_str(&payload.status).ok_or_else(|| {
                CoreError::DecodeError(format!("unknown aria2 status: {}", payload.status))
            }),
            // The original aria2 helper treats an error response from tellStatus as REMOVED:
            // aria2 has no record of a gid once a download is purged.
            Err(CoreError::DownloaderTransient(_)) => Ok(Aria2Status::Removed),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self), fields(gateway = GATEWAY, gid))]
    pub async fn pause(&self, gid: &str) -> Result<(), CoreError> {
        let params = serde_json::json!([self.token(), gid]);
        self.call::<Value>("aria2.pause", params).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(gateway = GATEWAY, gid))]
    pub async fn unpause(&self, gid: &str) -> Result<(), CoreError> {
        let params = serde_json::json!([self.token(), gid]);
        self.call::<Value>("aria2.unpause", params).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(gateway = GATEWAY, gid))]
    pub async fn remove(&self, gid: &str) -> Result<(), CoreError> {
        let params = serde_json::json!([self.token(), gid]);
        self.call::<Value>("aria2.remove", params).await?;
        Ok(())
    }

    fn token(&self) -> String {
        format!("token:{}", self.secret)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, CoreError> {
        let req = JsonRpcRequest {
            jsonrpc: "2.0",
            id: "pikpak",
            method,
            params,
        };
        let resp = self
            .client
            .post(&self.rpc_url)
            .json(&req)
            .send()
            .await
            .map_err(|e| CoreError::HttpError {
                gateway: GATEWAY,
                message: e.to_string(),
            })?;
        let body: JsonRpcResponse<T> = resp
            .json()
            .await
            .map_err(|e| CoreError::DecodeError(e.to_string()))?;
        match body {
            JsonRpcResponse { result: Some(r), .. } => Ok(r),
            JsonRpcResponse { error: Some(e), .. } => Err(CoreError::DownloaderTransient(e.message)),
            _ => Err(CoreError::DecodeError(
                "JSON-RPC response had neither result nor error".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
struct StatusPayload {
    status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(uri: String) -> LocalDownloaderGateway {
        LocalDownloaderGateway::new(uri, "secret".to_string(), "/downloads".to_string())
    }

    #[tokio::test]
    async fn add_uri_returns_gid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": "pikpak",
                "result": "2089b05ecca3d829",
            })))
            .mount(&server)
            .await;

        let gid = gateway(server.uri())
            .add_uri("magnet:?xt=urn:btih:abc", "movie.mkv")
            .await
            .unwrap();
        assert_eq!(gid, "2089b05ecca3d829");
    }

    #[tokio::test]
    async fn tell_status_maps_error_response_to_removed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": "pikpak",
                "error": { "code": 1, "message": "GID not found" },
            })))
            .mount(&server)
            .await;

        let status = gateway(server.uri()).tell_status("deadbeef").await.unwrap();
        assert_eq!(status, Aria2Status::Removed);
    }

    #[tokio::test]
    async fn tell_status_decodes_active() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": "pikpak",
                "result": { "status": "active" },
            })))
            .mount(&server)
            .await;

        let status = gateway(server.uri()).tell_status("gid1").await.unwrap();
        assert_eq!(status, Aria2Status::Active);
    }
}
