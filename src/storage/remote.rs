//! 远程目录适配层 - 在传输客户端之上提供存在性检查与递归建目录

use super::{ClientError, ClientResult, TransferClient};
use crate::error::{Result, SyncError};
use tracing::debug;

/// 递归建目录结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MakeDirOutcome {
    /// 至少创建了一层目录
    Created,
    /// 所有层级均已存在
    AlreadyExists,
}

/// 远程目录适配器
pub struct RemoteDir<'c> {
    client: &'c mut dyn TransferClient,
}

impl<'c> RemoteDir<'c> {
    pub fn new(client: &'c mut dyn TransferClient) -> Self {
        Self { client }
    }

    /// 底层客户端
    pub fn client(&mut self) -> &mut dyn TransferClient {
        &mut *self.client
    }

    /// 远程地址名（用于日志）
    pub fn name(&self) -> &str {
        self.client.name()
    }

    /// 拼出完整远程地址，如 `ftp://host:21/sub/a.txt`
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.client.name(), path)
    }

    /// 检查目录（或文件）是否存在
    ///
    /// 列出父目录，依次按末段名、原路径、去掉 `./` 前缀的路径匹配，
    /// 兼容不同服务器回显路径的方式。
    pub fn exists(&mut self, path: &str) -> ClientResult<bool> {
        if path.is_empty() || path == "." || path == "/" {
            return Ok(true);
        }

        let (parent, name) = match path.rsplit_once('/') {
            Some(("", name)) => ("/", name),
            Some((parent, name)) => (parent, name),
            None => (".", path),
        };
        let alt = path.strip_prefix("./").unwrap_or(path);

        let names = match self.client.list_names(parent) {
            Ok(names) => names,
            Err(ClientError::Permission(msg)) | Err(ClientError::Temporary(msg)) => {
                debug!("列出 {} 失败，视为不存在: {}", parent, msg);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        Ok(names
            .iter()
            .any(|n| n == name || n == path || n == alt))
    }

    /// 检查文件是否存在（列出该路径本身非空）
    pub fn exists_file(&mut self, path: &str) -> ClientResult<bool> {
        match self.client.list_names(path) {
            Ok(names) => Ok(!names.is_empty()),
            Err(ClientError::Permission(_)) | Err(ClientError::Temporary(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// 类似 `mkdir -p`，逐级创建缺失的目录
    ///
    /// 某一级创建因权限错误失败时，若该目录已存在则视为成功。
    pub fn make_path(&mut self, path: &str) -> Result<MakeDirOutcome> {
        let mut prefix = String::new();
        if path.starts_with('/') {
            prefix.push('/');
        }

        let mut created = false;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if !prefix.is_empty() && !prefix.ends_with('/') {
                prefix.push('/');
            }
            prefix.push_str(segment);

            if segment == "." {
                continue;
            }

            match self.client.make_directory(&prefix) {
                Ok(()) => {
                    debug!("已创建目录: {}", prefix);
                    created = true;
                }
                Err(ClientError::Permission(reason)) => {
                    let exists = self.exists(&prefix).map_err(|e| SyncError::DirectoryCreate {
                        path: prefix.clone(),
                        reason: e.to_string(),
                    })?;
                    if !exists {
                        return Err(SyncError::DirectoryCreate {
                            path: prefix,
                            reason,
                        });
                    }
                    debug!("目录已存在: {}", prefix);
                }
                Err(e) => {
                    return Err(SyncError::DirectoryCreate {
                        path: prefix,
                        reason: e.to_string(),
                    })
                }
            }
        }

        Ok(if created {
            MakeDirOutcome::Created
        } else {
            MakeDirOutcome::AlreadyExists
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryClient;

    fn connected() -> MemoryClient {
        let mut client = MemoryClient::new();
        client.connect("localhost", 21).unwrap();
        client
    }

    #[test]
    fn test_root_always_exists() {
        let mut client = connected();
        let mut remote = RemoteDir::new(&mut client);
        assert!(remote.exists(".").unwrap());
    }

    #[test]
    fn test_exists_variants() {
        let mut client = connected();
        client.seed_dir("site/sub");
        let mut remote = RemoteDir::new(&mut client);

        assert!(remote.exists("site").unwrap());
        assert!(remote.exists("site/sub").unwrap());
        assert!(remote.exists("./site/sub").unwrap());
        assert!(!remote.exists("site/missing").unwrap());
        assert!(!remote.exists("nowhere/deeper").unwrap());
    }

    #[test]
    fn test_exists_file() {
        let mut client = connected();
        client.seed_file("site/.syncftp", b"{}");
        let mut remote = RemoteDir::new(&mut client);

        assert!(remote.exists_file("site/.syncftp").unwrap());
        assert!(!remote.exists_file("site/other").unwrap());
    }

    #[test]
    fn test_make_path_is_idempotent() {
        let mut client = connected();
        {
            let mut remote = RemoteDir::new(&mut client);
            assert_eq!(remote.make_path("a/b/c").unwrap(), MakeDirOutcome::Created);
            assert_eq!(
                remote.make_path("a/b/c").unwrap(),
                MakeDirOutcome::AlreadyExists
            );
            assert_eq!(remote.make_path("./a/b/d").unwrap(), MakeDirOutcome::Created);
        }
        assert!(client.is_dir("a/b/c"));
        assert!(client.is_dir("a/b/d"));
    }

    #[test]
    fn test_make_path_absolute() {
        let mut client = connected();
        let mut remote = RemoteDir::new(&mut client);
        assert_eq!(remote.make_path("/pub/www").unwrap(), MakeDirOutcome::Created);
        assert!(remote.exists("/pub/www").unwrap());
    }

    #[test]
    fn test_make_path_permission_failure() {
        let mut client = connected();
        client.deny_mkdir("locked");
        let mut remote = RemoteDir::new(&mut client);

        match remote.make_path("locked/inner") {
            Err(SyncError::DirectoryCreate { path, .. }) => assert_eq!(path, "locked"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    /// 列目录时回显完整路径的服务器
    struct EchoClient {
        names: Vec<String>,
    }

    impl EchoClient {
        fn new(names: &[&str]) -> Self {
            Self {
                names: names.iter().map(|n| n.to_string()).collect(),
            }
        }
    }

    impl TransferClient for EchoClient {
        fn connect(&mut self, _host: &str, _port: u16) -> ClientResult<()> {
            Ok(())
        }

        fn login(&mut self, _username: &str, _password: Option<&str>) -> ClientResult<()> {
            Ok(())
        }

        fn list_names(&mut self, _path: &str) -> ClientResult<Vec<String>> {
            Ok(self.names.clone())
        }

        fn make_directory(&mut self, path: &str) -> ClientResult<()> {
            Err(ClientError::Permission(format!("{}: File exists", path)))
        }

        fn get_text_file(&mut self, path: &str) -> ClientResult<Vec<u8>> {
            Err(ClientError::Permission(format!("{}: not supported", path)))
        }

        fn put_text_file(&mut self, path: &str, _data: &[u8]) -> ClientResult<()> {
            Err(ClientError::Permission(format!("{}: not supported", path)))
        }

        fn put_binary_file(&mut self, path: &str, _data: &[u8]) -> ClientResult<()> {
            Err(ClientError::Permission(format!("{}: not supported", path)))
        }

        fn delete_entry(&mut self, path: &str) -> ClientResult<()> {
            Err(ClientError::Permission(format!("{}: not supported", path)))
        }

        fn remove_directory(&mut self, path: &str) -> ClientResult<()> {
            Err(ClientError::Permission(format!("{}: not supported", path)))
        }

        fn close(&mut self) -> ClientResult<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "ftp://echo:21"
        }
    }

    #[test]
    fn test_exists_matches_echoed_paths() {
        let mut client = EchoClient::new(&["site/sub"]);
        let mut remote = RemoteDir::new(&mut client);
        assert!(remote.exists("site/sub").unwrap());
        assert!(remote.exists("./site/sub").unwrap());

        let mut client = EchoClient::new(&["./site/sub"]);
        let mut remote = RemoteDir::new(&mut client);
        assert!(remote.exists("./site/sub").unwrap());

        let mut client = EchoClient::new(&["site/subx", "other/sub/x"]);
        let mut remote = RemoteDir::new(&mut client);
        assert!(!remote.exists("site/sub").unwrap());
        assert!(!remote.exists("./site/sub").unwrap());
    }

    #[test]
    fn test_make_path_accepts_echoed_existing_directory() {
        let mut client = EchoClient::new(&["site"]);
        let mut remote = RemoteDir::new(&mut client);
        assert_eq!(
            remote.make_path("site").unwrap(),
            MakeDirOutcome::AlreadyExists
        );
    }
}
