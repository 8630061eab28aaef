//! HTTP+JSON client for the remote drive's file and offline-download API (C1).

pub mod types;

use crate::error::CoreError;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};
use types::{
    CreateFolderResponse, DownloadUrlResponse, FileListResponse, LoginRequest, LoginResponse,
    OfflineDownloadRequest, OfflineDownloadResponse, OfflineFileInfo, RemoteFile,
    TaskStatusResponse,
};

const GATEWAY: &str = "remote";

/// Client for the remote drive's HTTP+JSON API.
///
/// Holds the current access token in a `tokio::sync::RwLock` so a background
/// re-login can swap it in without requiring `&mut self` at every call site.
pub struct RemoteDriveGateway {
    client: Client,
    base_url: String,
    access_token: tokio::sync::RwLock<Option<String>>,
    max_retries: u32,
    retry_delay: Duration,
}

impl RemoteDriveGateway {
    pub fn new(base_url: String, proxy: Option<String>) -> Result<Self, CoreError> {
        let mut builder = Client::builder().timeout(Duration::from_secs(30));
        if let Some(proxy_url) = proxy {
            let proxy = reqwest::Proxy::all(&proxy_url).map_err(|e| CoreError::HttpError {
                gateway: GATEWAY,
                message: format!("invalid proxy: {e}"),
            })?;
            builder = builder.proxy(proxy);
        }
        let client = builder.build().map_err(|e| CoreError::HttpError {
            gateway: GATEWAY,
            message: e.to_string(),
        })?;

        Ok(Self {
            client,
            base_url,
            access_token: tokio::sync::RwLock::new(None),
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        })
    }

    pub async fn set_access_token(&self, token: String) {
        *self.access_token.write().await = Some(token);
    }

    pub async fn access_token(&self) -> Option<String> {
        self.access_token.read().await.clone()
    }

    #[instrument(skip(self, password), fields(gateway = GATEWAY))]
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, CoreError> {
        let req = LoginRequest { username, password };
        let resp: LoginResponse = self.post_json("/auth/signin", &req, false).await.map_err(
            |e| match e {
                CoreError::HttpError { message, .. } => CoreError::AuthenticationError(message),
                other => other,
            },
        )?;
        self.set_access_token(resp.access_token.clone()).await;
        Ok(resp)
    }

    #[instrument(skip(self), fields(gateway = GATEWAY, parent_id))]
    pub async fn file_list(
        &self,
        parent_id: &str,
        page_token: Option<&str>,
    ) -> Result<FileListResponse, CoreError> {
        let mut query = vec![("parent_id".to_string(), parent_id.to_string())];
        if let Some(token) = page_token {
            query.push(("page_token".to_string(), token.to_string()));
        }
        self.get_json("/drive/v1/files", &query).await
    }

    /// Walks `file_list` pagination to completion and returns every entry under `parent_id`.
    pub async fn file_list_all(&self, parent_id: &str) -> Result<Vec<RemoteFile>, CoreError> {
        let mut files = Vec::new();
        let mut page_token = None;
        loop {
            let page = self.file_list(parent_id, page_token.as_deref()).await?;
            files.extend(page.files);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(files)
    }

    #[instrument(skip(self), fields(gateway = GATEWAY, parent_id, name))]
    pub async fn create_folder(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<CreateFolderResponse, CoreError> {
        let body = serde_json::json!({
            "parent_id": parent_id,
            "name": name,
            "kind": "drive#folder",
        });
        self.post_json("/drive/v1/files", &body, true).await
    }

    #[instrument(skip(self), fields(gateway = GATEWAY, file_id))]
    pub async fn get_download_url(&self, file_id: &str) -> Result<DownloadUrlResponse, CoreError> {
        self.get_json(&format!("/drive/v1/files/{file_id}"), &[]).await
    }

    #[instrument(skip(self), fields(gateway = GATEWAY, parent_id))]
    pub async fn offline_download(
        &self,
        file_url: &str,
        parent_id: &str,
        name: &str,
    ) -> Result<OfflineDownloadResponse, CoreError> {
        let req = OfflineDownloadRequest {
            file_url,
            parent_id,
            name,
        };
        self.post_json("/drive/v1/task", &req, true).await
    }

    #[instrument(skip(self), fields(gateway = GATEWAY, task_id))]
    pub async fn get_task_status(&self, task_id: &str) -> Result<TaskStatusResponse, CoreError> {
        self.get_json(&format!("/drive/v1/task/{task_id}"), &[]).await
    }

    #[instrument(skip(self), fields(gateway = GATEWAY, file_id))]
    pub async fn offline_file_info(&self, file_id: &str) -> Result<OfflineFileInfo, CoreError> {
        self.get_json(&format!("/drive/v1/files/{file_id}/offline"), &[]).await
    }

    /// Submits every id in one batched request to the trash endpoint.
    #[instrument(skip(self), fields(gateway = GATEWAY, count = file_ids.len()))]
    pub async fn delete_to_trash(&self, file_ids: &[String]) -> Result<(), CoreError> {
        if file_ids.is_empty() {
            return Ok(());
        }
        let url = format!("{}/drive/v1/files:batchTrash", self.base_url);
        let token = self.access_token().await;
        let body = serde_json::json!({ "ids": file_ids });
        let resp = self
            .execute_with_retry("delete_to_trash", || {
                let mut req = self.client.post(&url).json(&body);
                if let Some(ref t) = token {
                    req = req.bearer_auth(t);
                }
                req.send()
            })
            .await?;
        self.check_status(resp).await?;
        Ok(())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T, CoreError> {
        let url = format!("{}{path}", self.base_url);
        let token = self.access_token().await;
        let resp = self
            .execute_with_retry(path, || {
                let mut req = self.client.get(&url).query(query);
                if let Some(ref t) = token {
                    req = req.bearer_auth(t);
                }
                req.send()
            })
            .await?;
        let resp = self.check_status(resp).await?;
        resp.json::<T>()
            .await
            .map_err(|e| CoreError::DecodeError(e.to_string()))
    }

    async fn post_json<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        authenticated: bool,
    ) -> Result<T, CoreError> {
        let url = format!("{}{path}", self.base_url);
        let token = if authenticated {
            self.access_token().await
        } else {
            None
        };
        let resp = self
            .execute_with_retry(path, || {
                let mut req = self.client.post(&url).json(body);
                if let Some(ref t) = token {
                    req = req.bearer_auth(t);
                }
                req.send()
            })
            .await?;
        let resp = self.check_status(resp).await?;
        resp.json::<T>()
            .await
            .map_err(|e| CoreError::DecodeError(e.to_string()))
    }

    async fn check_status(&self, resp: reqwest::Response) -> Result<reqwest::Response, CoreError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp
            .text()
            .await
            .unwrap_or_else(|_| status.to_string());
        if status == StatusCode::UNAUTHORIZED {
            Err(CoreError::AuthenticationError(message))
        } else {
            Err(CoreError::HttpError {
                gateway: GATEWAY,
                message,
            })
        }
    }

    /// Retries transient failures with linear backoff, mirroring the downloader gateway's policy.
    async fn execute_with_retry<F, Fut>(
        &self,
        endpoint: &str,
        operation: F,
    ) -> Result<reqwest::Response, CoreError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = reqwest::Result<reqwest::Response>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        return Err(CoreError::HttpError {
                            gateway: GATEWAY,
                            message: e.to_string(),
                        });
                    }
                    warn!(endpoint, attempt, error = %e, "transient error, retrying");
                    sleep(self.retry_delay * attempt).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::RemoteDownloadPhase;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn login_stores_access_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/signin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok123",
                "refresh_token": "refresh123",
                "sub": "user1",
            })))
            .mount(&server)
            .await;

        let gateway = RemoteDriveGateway::new(server.uri(), None).unwrap();
        gateway.login("alice", "hunter2").await.unwrap();
        assert_eq!(gateway.access_token().await, Some("tok123".to_string()));
    }

    #[tokio::test]
    async fn login_failure_maps_to_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/signin"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
            .mount(&server)
            .await;

        let gateway = RemoteDriveGateway::new(server.uri(), None).unwrap();
        let err = gateway.login("alice", "wrong").await.unwrap_err();
        assert!(matches!(err, CoreError::AuthenticationError(_)));
    }

    #[tokio::test]
    async fn file_list_all_follows_pagination() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v1/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{"id": "1", "name": "a", "kind": "file", "parent_id": null}],
                "next_page_token": "page2",
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v1/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{"id": "2", "name": "b", "kind": "drive#folder", "parent_id": null}],
                "next_page_token": null,
            })))
            .mount(&server)
            .await;

        let gateway = RemoteDriveGateway::new(server.uri(), None).unwrap();
        let files = gateway.file_list_all("root").await.unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[1].is_folder());
    }

    #[tokio::test]
    async fn get_task_status_decodes_phase() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v1/task/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "phase": "done",
                "file_id": "f1",
            })))
            .mount(&server)
            .await;

        let gateway = RemoteDriveGateway::new(server.uri(), None).unwrap();
        let status = gateway.get_task_status("abc").await.unwrap();
        assert_eq!(status.phase, RemoteDownloadPhase::Done);
        assert!(status.phase.is_done());
    }
}
