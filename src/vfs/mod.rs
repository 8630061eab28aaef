//! In-memory virtual filesystem over the remote drive (C3 path resolution + C4 node graph).

pub mod node;

use crate::error::CoreError;
use crate::remote::RemoteDriveGateway;
use node::{Node, NodeKind};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::SystemTime;
use tracing::debug;

/// Sentinel id of the root directory; the remote drive never assigns this as a real file id.
pub const ROOT_ID: &str = "";

pub struct Vfs {
    gateway: Rc<RemoteDriveGateway>,
    nodes: RefCell<HashMap<String, Node>>,
    cwd: RefCell<String>,
}

impl Vfs {
    pub fn new(gateway: Rc<RemoteDriveGateway>) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_ID.to_string(), Node::root());
        Vfs {
            gateway,
            nodes: RefCell::new(nodes),
            cwd: RefCell::new(ROOT_ID.to_string()),
        }
    }

    pub fn get_cwd_id(&self) -> String {
        self.cwd.borrow().clone()
    }

    pub fn get_cwd(&self) -> String {
        self.path_of(&self.get_cwd_id())
    }

    pub async fn set_cwd(&self, path: &str) -> Result<(), CoreError> {
        let id = self
            .resolve(path)
            .await?
            .ok_or_else(|| CoreError::NotFound(path.to_string()))?;
        if !self.node_is_dir(&id) {
            return Err(CoreError::NotDirectory(path.to_string()));
        }
        *self.cwd.borrow_mut() = id;
        Ok(())
    }

    /// Renders the absolute path of `id` by walking `father_id` links up to root.
    fn path_of(&self, id: &str) -> String {
        if id == ROOT_ID {
            return "/".to_string();
        }
        let nodes = self.nodes.borrow();
        let mut parts = Vec::new();
        let mut current = id.to_string();
        loop {
            match nodes.get(&current) {
                Some(node) if current != ROOT_ID => {
                    parts.push(node.name().to_string());
                    match node.father_id() {
                        Some(father) => current = father.to_string(),
                        None => break,
                    }
                }
                _ => break,
            }
        }
        parts.reverse();
        format!("/{}", parts.join("/"))
    }

    fn node_is_dir(&self, id: &str) -> bool {
        self.nodes
            .borrow()
            .get(id)
            .map(|n| n.is_dir())
            .unwrap_or(false)
    }

    /// Interprets `path` POSIX-style and returns the matched node's id, or `None` if any
    /// intermediate segment is missing or resolves to a file before the final segment.
    pub async fn resolve(&self, path: &str) -> Result<Option<String>, CoreError> {
        let is_absolute = path.starts_with('/');
        let mut current = if is_absolute {
            ROOT_ID.to_string()
        } else {
            self.get_cwd_id()
        };

        for segment in path.split('/').filter(|s| !s.is_empty()) {
            match segment {
                "." => continue,
                ".." => {
                    current = self.father_or_root(&current);
                }
                name => {
                    self.ensure_dir_fresh(&current).await?;
                    match self.child_by_name(&current, name) {
                        Some(id) => current = id,
                        None => return Ok(None),
                    }
                }
            }
        }
        Ok(Some(current))
    }

    fn father_or_root(&self, id: &str) -> String {
        self.nodes
            .borrow()
            .get(id)
            .and_then(|n| n.father_id().map(|f| f.to_string()))
            .unwrap_or_else(|| ROOT_ID.to_string())
    }

    fn child_by_name(&self, dir_id: &str, name: &str) -> Option<String> {
        let nodes = self.nodes.borrow();
        let dir = nodes.get(dir_id)?;
        if !dir.is_dir() {
            return None;
        }
        dir.children_ids()
            .iter()
            .find(|cid| nodes.get(*cid).map(|n| n.name() == name).unwrap_or(false))
            .cloned()
    }

    /// Returns the directory that would contain the final segment of `path`, and that
    /// segment's name. Pure string manipulation; does not resolve the parent.
    pub fn split(&self, path: &str) -> (String, String) {
        let trimmed = path.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(idx) => {
                let parent = &trimmed[..idx];
                let parent = if parent.is_empty() { "/" } else { parent };
                (parent.to_string(), trimmed[idx + 1..].to_string())
            }
            None => (".".to_string(), trimmed.to_string()),
        }
    }

    pub async fn is_dir(&self, path: &str) -> Result<bool, CoreError> {
        Ok(match self.resolve(path).await? {
            Some(id) => self.node_is_dir(&id),
            None => false,
        })
    }

    pub async fn list_children(
        &self,
        path: &str,
        include_files: bool,
    ) -> Result<Vec<String>, CoreError> {
        let Some(id) = self.resolve(path).await? else {
            return Ok(Vec::new());
        };
        self.ensure_dir_fresh(&id).await?;
        let nodes = self.nodes.borrow();
        let Some(dir) = nodes.get(&id) else {
            return Ok(Vec::new());
        };
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        Ok(dir
            .children_ids()
            .iter()
            .filter_map(|cid| nodes.get(cid))
            .filter(|n| include_files || n.is_dir())
            .map(|n| n.name().to_string())
            .collect())
    }

    pub async fn get_file_url(&self, path: &str) -> Result<Option<String>, CoreError> {
        let Some(id) = self.resolve(path).await? else {
            return Ok(None);
        };
        self.get_file_url_by_id(&id).await
    }

    pub async fn get_file_url_by_id(&self, id: &str) -> Result<Option<String>, CoreError> {
        if self.node_is_dir(id) {
            return Ok(None);
        }
        let resp = self.gateway.get_download_url(id).await?;
        let mut nodes = self.nodes.borrow_mut();
        if let Some(Node::File {
            download_url,
            last_refresh,
            ..
        }) = nodes.get_mut(id)
        {
            *download_url = Some(resp.web_content_link.clone());
            *last_refresh = Some(SystemTime::now());
        }
        Ok(Some(resp.web_content_link))
    }

    pub async fn make_dir(&self, path: &str) -> Result<(), CoreError> {
        let (parent_path, leaf) = self.split(path);
        if leaf.is_empty() {
            return Err(CoreError::InvalidPath(path.to_string()));
        }
        let parent_id = self
            .resolve(&parent_path)
            .await?
            .ok_or_else(|| CoreError::NotFound(parent_path.clone()))?;
        if !self.node_is_dir(&parent_id) {
            return Err(CoreError::NotDirectory(parent_path));
        }
        let resp = self.gateway.create_folder(&parent_id, &leaf).await?;
        let mut nodes = self.nodes.borrow_mut();
        nodes.insert(
            resp.file.id.clone(),
            Node::Directory {
                id: resp.file.id.clone(),
                name: resp.file.name,
                father_id: Some(parent_id.clone()),
                children_ids: Vec::new(),
                last_refresh: None,
            },
        );
        if let Some(Node::Directory { children_ids, .. }) = nodes.get_mut(&parent_id) {
            children_ids.push(resp.file.id);
        }
        Ok(())
    }

    pub async fn delete(&self, paths: &[String]) -> Result<(), CoreError> {
        let cwd_id = self.get_cwd_id();
        let mut ids = Vec::with_capacity(paths.len());
        for path in paths {
            let id = self
                .resolve(path)
                .await?
                .ok_or_else(|| CoreError::NotFound(path.clone()))?;
            if self.is_ancestor_or_self(&id, &cwd_id) {
                return Err(CoreError::DeleteAncestor);
            }
            ids.push(id);
        }

        self.gateway.delete_to_trash(&ids).await?;

        let mut nodes = self.nodes.borrow_mut();
        for id in &ids {
            let father = nodes.get(id).and_then(|n| n.father_id().map(|f| f.to_string()));
            if let Some(father_id) = father {
                if let Some(Node::Directory { children_ids, .. }) = nodes.get_mut(&father_id) {
                    children_ids.retain(|c| c != id);
                }
            }
            nodes.remove(id);
        }
        Ok(())
    }

    fn is_ancestor_or_self(&self, candidate: &str, target: &str) -> bool {
        let nodes = self.nodes.borrow();
        let mut current = target.to_string();
        loop {
            if current == candidate {
                return true;
            }
            match nodes.get(&current).and_then(|n| n.father_id()) {
                Some(father) => current = father.to_string(),
                None => return false,
            }
        }
    }

    /// Materializes a newly-known node id: fetches metadata if unseen, otherwise just
    /// invalidates its cached refresh so the next access re-fetches it.
    pub async fn update_node(&self, id: &str) -> Result<(), CoreError> {
        let known = self.nodes.borrow().contains_key(id);
        if known {
            if let Some(node) = self.nodes.borrow_mut().get_mut(id) {
                node.invalidate();
            }
            return Ok(());
        }

        let info = self.gateway.offline_file_info(id).await?;
        let kind = NodeKind::from_remote_kind(&info.kind);
        let node = match kind {
            NodeKind::Directory => Node::Directory {
                id: id.to_string(),
                name: info.name,
                father_id: Some(info.parent_id.clone()),
                children_ids: Vec::new(),
                last_refresh: None,
            },
            NodeKind::File => Node::File {
                id: id.to_string(),
                name: info.name,
                father_id: Some(info.parent_id.clone()),
                download_url: None,
                last_refresh: None,
            },
        };
        self.nodes.borrow_mut().insert(id.to_string(), node);
        if let Some(Node::Directory { children_ids, .. }) =
            self.nodes.borrow_mut().get_mut(&info.parent_id)
        {
            if !children_ids.contains(&id.to_string()) {
                children_ids.push(id.to_string());
            }
        }
        Ok(())
    }

    pub fn node_name(&self, id: &str) -> Option<String> {
        self.nodes.borrow().get(id).map(|n| n.name().to_string())
    }

    pub fn is_dir_by_id(&self, id: &str) -> bool {
        self.node_is_dir(id)
    }

    async fn ensure_dir_fresh(&self, id: &str) -> Result<(), CoreError> {
        let needs_refresh = self
            .nodes
            .borrow()
            .get(id)
            .map(|n| n.is_dir() && n.is_stale())
            .unwrap_or(false);
        if !needs_refresh {
            return Ok(());
        }
        self.refresh_directory(id).await
    }

    async fn refresh_directory(&self, id: &str) -> Result<(), CoreError> {
        let files = self.gateway.file_list_all(id).await?;
        debug!(dir_id = id, count = files.len(), "refreshed directory");

        let mut nodes = self.nodes.borrow_mut();
        let mut child_ids = Vec::with_capacity(files.len());
        for file in files {
            child_ids.push(file.id.clone());
            match nodes.get_mut(&file.id) {
                Some(existing) => existing.rename_and_reparent(file.name, Some(id.to_string())),
                None => {
                    let kind = NodeKind::from_remote_kind(&file.kind);
                    let node = match kind {
                        NodeKind::Directory => Node::Directory {
                            id: file.id.clone(),
                            name: file.name,
                            father_id: Some(id.to_string()),
                            children_ids: Vec::new(),
                            last_refresh: None,
                        },
                        NodeKind::File => Node::File {
                            id: file.id.clone(),
                            name: file.name,
                            father_id: Some(id.to_string()),
                            download_url: None,
                            last_refresh: None,
                        },
                    };
                    nodes.insert(file.id, node);
                }
            }
        }

        if let Some(Node::Directory {
            children_ids,
            last_refresh,
            ..
        }) = nodes.get_mut(id)
        {
            *children_ids = child_ids;
            *last_refresh = Some(SystemTime::now());
        }
        Ok(())
    }

    /// BFS over a directory subtree, refreshing each directory encountered. Returns
    /// `(path_relative_to_root, node_id)` pairs for every file found.
    pub async fn walk_files(&self, root_id: &str) -> Result<Vec<(String, String)>, CoreError> {
        let mut out = Vec::new();
        let mut queue = std::collections::VecDeque::new();
        queue.push_back((root_id.to_string(), String::new()));

        while let Some((dir_id, prefix)) = queue.pop_front() {
            self.ensure_dir_fresh(&dir_id).await?;
            let children: Vec<(String, bool, String)> = {
                let nodes = self.nodes.borrow();
                let Some(dir) = nodes.get(&dir_id) else {
                    continue;
                };
                dir.children_ids()
                    .iter()
                    .filter_map(|cid| nodes.get(cid).map(|n| (cid.clone(), n.is_dir(), n.name().to_string())))
                    .collect()
            };
            for (child_id, is_dir, name) in children {
                let rel_path = if prefix.is_empty() {
                    name
                } else {
                    format!("{prefix}/{name}")
                };
                if is_dir {
                    queue.push_back((child_id, rel_path));
                } else {
                    out.push((rel_path, child_id));
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(uri: String) -> Rc<RemoteDriveGateway> {
        Rc::new(RemoteDriveGateway::new(uri, None).unwrap())
    }

    #[tokio::test]
    async fn resolve_root_and_empty_relative_to_cwd() {
        let server = MockServer::start().await;
        let vfs = Vfs::new(gateway(server.uri()));
        assert_eq!(vfs.resolve("/").await.unwrap(), Some(ROOT_ID.to_string()));
        assert_eq!(vfs.resolve("").await.unwrap(), Some(vfs.get_cwd_id()));
    }

    #[tokio::test]
    async fn resolve_refreshes_directories_lazily() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/drive/v1/files$"))
            .respond_with(|req: &wiremock::Request| {
                let parent_id = req
                    .url
                    .query_pairs()
                    .find(|(k, _)| k == "parent_id")
                    .map(|(_, v)| v.to_string())
                    .unwrap_or_default();
                if parent_id.is_empty() {
                    ResponseTemplate::new(200).set_body_json(serde_json::json!({
                        "files": [{"id": "a1", "name": "a", "kind": "drive#folder", "parent_id": null}],
                        "next_page_token": null,
                    }))
                } else {
                    ResponseTemplate::new(200).set_body_json(serde_json::json!({
                        "files": [{"id": "b1", "name": "b", "kind": "drive#file", "parent_id": "a1"}],
                        "next_page_token": null,
                    }))
                }
            })
            .mount(&server)
            .await;

        let vfs = Vfs::new(gateway(server.uri()));
        let found = vfs.resolve("/a/b").await.unwrap();
        assert_eq!(found, Some("b1".to_string()));
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn delete_of_cwd_ancestor_is_rejected_without_gateway_call() {
        let server = MockServer::start().await;
        let vfs = Vfs::new(gateway(server.uri()));
        vfs.nodes.borrow_mut().insert(
            "x".to_string(),
            Node::Directory {
                id: "x".to_string(),
                name: "x".to_string(),
                father_id: Some(ROOT_ID.to_string()),
                children_ids: vec!["y".to_string()],
                last_refresh: Some(SystemTime::now()),
            },
        );
        vfs.nodes.borrow_mut().insert(
            "y".to_string(),
            Node::Directory {
                id: "y".to_string(),
                name: "y".to_string(),
                father_id: Some("x".to_string()),
                children_ids: Vec::new(),
                last_refresh: Some(SystemTime::now()),
            },
        );
        if let Some(Node::Directory { children_ids, .. }) = vfs.nodes.borrow_mut().get_mut(ROOT_ID) {
            children_ids.push("x".to_string());
        }
        *vfs.cwd.borrow_mut() = "y".to_string();

        let err = vfs.delete(&["/x".to_string()]).await.unwrap_err();
        assert!(matches!(err, CoreError::DeleteAncestor));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[test]
    fn split_handles_root_and_nested_paths() {
        let server_uri = "http://localhost:0".to_string();
        let vfs = Vfs::new(Rc::new(RemoteDriveGateway::new(server_uri, None).unwrap()));
        assert_eq!(vfs.split("/a/b"), ("/a".to_string(), "b".to_string()));
        assert_eq!(vfs.split("/a"), ("/".to_string(), "a".to_string()));
        assert_eq!(vfs.split("a"), (".".to_string(), "a".to_string()));
    }
}
