pub mod ftp;
pub mod local;
pub mod memory;
pub mod remote;

use crate::config::{RemoteConfig, RemoteType};
use crate::error::{Result, SyncError};
use thiserror::Error;

pub use ftp::FtpClient;
pub use local::LocalClient;
pub use memory::MemoryClient;
pub use remote::{MakeDirOutcome, RemoteDir};

// ============ 公共常量 ============

/// FTP 默认端口
pub const DEFAULT_PORT: u16 = 21;
/// 匿名登录用户名
pub const ANONYMOUS_USER: &str = "anonymous";

/// 传输客户端错误
///
/// `Permission` 对应 FTP 5xx 永久性错误（文件不存在、目录已存在、权限不足），
/// 调用方据此区分"已存在"与真正的失败。
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("permission denied: {0}")]
    Permission(String),

    #[error("temporary failure: {0}")]
    Temporary(String),

    #[error("not connected")]
    NotConnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    pub fn is_permission(&self) -> bool {
        matches!(self, ClientError::Permission(_))
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// 文件传输客户端接口
///
/// 只提供单层原语；存在性检查与递归建目录由 [`RemoteDir`] 组合实现。
pub trait TransferClient: Send {
    /// 建立连接
    fn connect(&mut self, host: &str, port: u16) -> ClientResult<()>;

    /// 登录
    fn login(&mut self, username: &str, password: Option<&str>) -> ClientResult<()>;

    /// 列出路径下的名称（路径为文件时返回该文件本身）
    fn list_names(&mut self, path: &str) -> ClientResult<Vec<String>>;

    /// 创建单层目录
    fn make_directory(&mut self, path: &str) -> ClientResult<()>;

    /// 以文本模式下载，换行统一为 `\n`
    fn get_text_file(&mut self, path: &str) -> ClientResult<Vec<u8>>;

    /// 以文本模式上传（进行换行转换）
    fn put_text_file(&mut self, path: &str, data: &[u8]) -> ClientResult<()>;

    /// 以二进制模式上传（原样传输）
    fn put_binary_file(&mut self, path: &str, data: &[u8]) -> ClientResult<()>;

    /// 删除文件
    fn delete_entry(&mut self, path: &str) -> ClientResult<()>;

    /// 删除空目录
    fn remove_directory(&mut self, path: &str) -> ClientResult<()>;

    /// 关闭连接
    fn close(&mut self) -> ClientResult<()>;

    /// 远程地址（用于日志），如 `ftp://host:21`
    fn name(&self) -> &str;
}

/// 根据配置创建传输客户端（未连接）
pub fn create_client(config: &RemoteConfig) -> Result<Box<dyn TransferClient>> {
    match config.typ {
        RemoteType::Ftp => {
            if config.host.trim().is_empty() {
                return Err(SyncError::Config("FTP remote requires host".to_string()));
            }
            tracing::info!("初始化FTP客户端: {}:{}", config.host, config.port);
            Ok(Box::new(FtpClient::new(&config.host, config.port)))
        }
        RemoteType::Local => {
            let path = config
                .path
                .as_ref()
                .ok_or_else(|| SyncError::Config("Local remote requires path".to_string()))?;
            tracing::info!("初始化本地目标: {}", path);
            Ok(Box::new(LocalClient::new(path)))
        }
    }
}

/// 拼接远程根目录与相对路径
pub fn remote_join(root: &str, relative: &str) -> String {
    if relative.is_empty() {
        return root.to_string();
    }
    match root {
        "" | "." => relative.to_string(),
        "/" => format!("/{}", relative),
        _ => format!("{}/{}", root.trim_end_matches('/'), relative),
    }
}

/// 将 `\r\n` 统一为 `\n`
pub fn to_unix_newlines(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut iter = data.iter().peekable();
    while let Some(&b) = iter.next() {
        if b == b'\r' && iter.peek() == Some(&&b'\n') {
            continue;
        }
        out.push(b);
    }
    out
}

/// 将换行转换为网络标准的 `\r\n`
pub fn to_network_newlines(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 32);
    let mut prev = 0u8;
    for &b in data {
        if b == b'\n' && prev != b'\r' {
            out.push(b'\r');
        }
        out.push(b);
        prev = b;
    }
    out
}
