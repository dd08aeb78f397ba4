//! 内存传输客户端
//!
//! 用内存中的目录树模拟远程服务器，记录每次上传的传输模式与删除操作，
//! 并支持注入连接、登录、建目录、上传与下载失败。克隆出的句柄共享同一状态。

use super::{
    to_network_newlines, to_unix_newlines, ClientError, ClientResult, TransferClient,
};
use crate::core::TransferMode;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
}

/// 一次上传记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub path: String,
    pub mode: TransferMode,
    pub size: usize,
}

#[derive(Debug, Default)]
struct MemoryState {
    nodes: BTreeMap<String, Node>,
    connected: bool,
    connects: usize,
    closes: usize,
    uploads: Vec<UploadRecord>,
    deletions: Vec<String>,
    refuse_connect: bool,
    reject_login: bool,
    denied_mkdirs: BTreeSet<String>,
    failing_uploads: BTreeSet<String>,
    failing_downloads: BTreeSet<String>,
}

/// 内存客户端
#[derive(Debug, Clone, Default)]
pub struct MemoryClient {
    state: Arc<Mutex<MemoryState>>,
}

/// 规范化路径：去掉 `./` 与首尾 `/`，根目录为空串
fn normalize(path: &str) -> String {
    let mut p = path.trim();
    loop {
        if let Some(rest) = p.strip_prefix("./") {
            p = rest;
        } else if let Some(rest) = p.strip_prefix('/') {
            p = rest;
        } else {
            break;
        }
    }
    let p = p.trim_end_matches('/');
    if p == "." {
        String::new()
    } else {
        p.to_string()
    }
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // 测试中 panic 后仍需读取状态
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_connected(state: &MemoryState) -> ClientResult<()> {
        if state.connected {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }

    fn is_dir_in(state: &MemoryState, path: &str) -> bool {
        path.is_empty() || matches!(state.nodes.get(path), Some(Node::Dir))
    }

    // ============ 预置数据 ============

    /// 预置目录（含所有父目录）
    pub fn seed_dir(&self, path: &str) {
        let path = normalize(path);
        let mut state = self.lock();
        let mut prefix = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);
            state.nodes.insert(prefix.clone(), Node::Dir);
        }
    }

    /// 预置文件（自动创建父目录）
    pub fn seed_file(&self, path: &str, data: &[u8]) {
        let path = normalize(path);
        let parent = parent_of(&path).to_string();
        if !parent.is_empty() {
            self.seed_dir(&parent);
        }
        self.lock().nodes.insert(path, Node::File(data.to_vec()));
    }

    /// 直接移除一个节点（模拟其他客户端的操作，不记入删除日志）
    pub fn remove(&self, path: &str) {
        self.lock().nodes.remove(&normalize(path));
    }

    // ============ 故障注入 ============

    pub fn refuse_connections(&self) {
        self.lock().refuse_connect = true;
    }

    pub fn reject_login(&self) {
        self.lock().reject_login = true;
    }

    pub fn deny_mkdir(&self, path: &str) {
        self.lock().denied_mkdirs.insert(normalize(path));
    }

    pub fn fail_upload(&self, path: &str) {
        self.lock().failing_uploads.insert(normalize(path));
    }

    pub fn fail_download(&self, path: &str) {
        self.lock().failing_downloads.insert(normalize(path));
    }

    // ============ 状态查询 ============

    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        match self.lock().nodes.get(&normalize(path)) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn is_dir(&self, path: &str) -> bool {
        Self::is_dir_in(&self.lock(), &normalize(path))
    }

    pub fn is_file(&self, path: &str) -> bool {
        matches!(self.lock().nodes.get(&normalize(path)), Some(Node::File(_)))
    }

    pub fn uploads(&self) -> Vec<UploadRecord> {
        self.lock().uploads.clone()
    }

    pub fn deletions(&self) -> Vec<String> {
        self.lock().deletions.clone()
    }

    /// 清空上传与删除记录
    pub fn clear_log(&self) {
        let mut state = self.lock();
        state.uploads.clear();
        state.deletions.clear();
    }

    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }

    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn store(&self, path: &str, data: Vec<u8>, mode: TransferMode) -> ClientResult<()> {
        let mut state = self.lock();
        Self::ensure_connected(&state)?;
        let key = normalize(path);

        if state.failing_uploads.contains(&key) {
            return Err(ClientError::Temporary(format!("{}: transfer aborted", path)));
        }
        if !Self::is_dir_in(&state, parent_of(&key)) {
            return Err(ClientError::Permission(format!(
                "{}: No such file or directory",
                path
            )));
        }
        if Self::is_dir_in(&state, &key) {
            return Err(ClientError::Permission(format!("{}: Is a directory", path)));
        }

        state.uploads.push(UploadRecord {
            path: key.clone(),
            mode,
            size: data.len(),
        });
        state.nodes.insert(key, Node::File(data));
        Ok(())
    }
}

impl TransferClient for MemoryClient {
    fn connect(&mut self, host: &str, port: u16) -> ClientResult<()> {
        let mut state = self.lock();
        if state.refuse_connect {
            return Err(ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("{}:{} refused connection", host, port),
            )));
        }
        state.connected = true;
        state.connects += 1;
        Ok(())
    }

    fn login(&mut self, username: &str, _password: Option<&str>) -> ClientResult<()> {
        let state = self.lock();
        Self::ensure_connected(&state)?;
        if state.reject_login {
            return Err(ClientError::Permission(format!(
                "530 Login incorrect for {}",
                username
            )));
        }
        Ok(())
    }

    fn list_names(&mut self, path: &str) -> ClientResult<Vec<String>> {
        let state = self.lock();
        Self::ensure_connected(&state)?;
        let key = normalize(path);

        match state.nodes.get(&key) {
            Some(Node::File(_)) => Ok(vec![path.to_string()]),
            _ if Self::is_dir_in(&state, &key) => Ok(state
                .nodes
                .keys()
                .filter(|k| parent_of(k) == key)
                .map(|k| k.rsplit('/').next().unwrap_or(k).to_string())
                .collect()),
            _ => Err(ClientError::Permission(format!(
                "{}: No such file or directory",
                path
            ))),
        }
    }

    fn make_directory(&mut self, path: &str) -> ClientResult<()> {
        let mut state = self.lock();
        Self::ensure_connected(&state)?;
        let key = normalize(path);

        if state.denied_mkdirs.contains(&key) {
            return Err(ClientError::Permission(format!("{}: Permission denied", path)));
        }
        if key.is_empty() || state.nodes.contains_key(&key) {
            return Err(ClientError::Permission(format!("{}: File exists", path)));
        }
        if !Self::is_dir_in(&state, parent_of(&key)) {
            return Err(ClientError::Permission(format!(
                "{}: No such file or directory",
                path
            )));
        }
        state.nodes.insert(key, Node::Dir);
        Ok(())
    }

    fn get_text_file(&mut self, path: &str) -> ClientResult<Vec<u8>> {
        let state = self.lock();
        Self::ensure_connected(&state)?;
        let key = normalize(path);

        if state.failing_downloads.contains(&key) {
            return Err(ClientError::Temporary(format!("{}: connection reset", path)));
        }
        match state.nodes.get(&key) {
            Some(Node::File(data)) => Ok(to_unix_newlines(data)),
            _ => Err(ClientError::Permission(format!(
                "{}: No such file or directory",
                path
            ))),
        }
    }

    fn put_text_file(&mut self, path: &str, data: &[u8]) -> ClientResult<()> {
        // 服务器端按 Unix 换行落盘
        let wire = to_network_newlines(data);
        self.store(path, to_unix_newlines(&wire), TransferMode::Text)
    }

    fn put_binary_file(&mut self, path: &str, data: &[u8]) -> ClientResult<()> {
        self.store(path, data.to_vec(), TransferMode::Binary)
    }

    fn delete_entry(&mut self, path: &str) -> ClientResult<()> {
        let mut state = self.lock();
        Self::ensure_connected(&state)?;
        let key = normalize(path);

        match state.nodes.get(&key) {
            Some(Node::File(_)) => {
                state.nodes.remove(&key);
                state.deletions.push(key);
                Ok(())
            }
            Some(Node::Dir) => Err(ClientError::Permission(format!("{}: Is a directory", path))),
            None => Err(ClientError::Permission(format!(
                "{}: No such file or directory",
                path
            ))),
        }
    }

    fn remove_directory(&mut self, path: &str) -> ClientResult<()> {
        let mut state = self.lock();
        Self::ensure_connected(&state)?;
        let key = normalize(path);

        if !matches!(state.nodes.get(&key), Some(Node::Dir)) {
            return Err(ClientError::Permission(format!(
                "{}: No such directory",
                path
            )));
        }
        if state.nodes.keys().any(|k| parent_of(k) == key) {
            return Err(ClientError::Permission(format!(
                "{}: Directory not empty",
                path
            )));
        }
        state.nodes.remove(&key);
        state.deletions.push(key);
        Ok(())
    }

    fn close(&mut self) -> ClientResult<()> {
        let mut state = self.lock();
        state.connected = false;
        state.closes += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "ftp://memory:21"
    }
}
