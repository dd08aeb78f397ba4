use super::{to_unix_newlines, ClientError, ClientResult, TransferClient};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

/// 本地目录目标（如已挂载的网络盘）
///
/// 远程路径相对于 `base_path` 解析，错误按 FTP 语义映射：
/// 不存在、已存在、无权限都归为 [`ClientError::Permission`]。
pub struct LocalClient {
    base_path: PathBuf,
    name: String,
    connected: bool,
}

impl LocalClient {
    pub fn new(path: &str) -> Self {
        let base_path = PathBuf::from(path);
        let name = format!("file://{}", path.trim_end_matches('/'));
        Self {
            base_path,
            name,
            connected: false,
        }
    }

    fn resolve_path(&self, path: &str) -> ClientResult<PathBuf> {
        if !self.connected {
            return Err(ClientError::NotConnected);
        }
        let path = path.trim_start_matches('/').trim_start_matches('\\');
        let path = path.strip_prefix("./").unwrap_or(path);
        if path.is_empty() || path == "." {
            Ok(self.base_path.clone())
        } else {
            Ok(self.base_path.join(path))
        }
    }

    fn map_err(path: &str, e: std::io::Error) -> ClientError {
        match e.kind() {
            ErrorKind::NotFound | ErrorKind::AlreadyExists | ErrorKind::PermissionDenied => {
                ClientError::Permission(format!("{}: {}", path, e))
            }
            _ => ClientError::Io(e),
        }
    }

    fn write(&self, path: &str, data: &[u8]) -> ClientResult<()> {
        let full_path = self.resolve_path(path)?;
        if full_path.is_dir() {
            return Err(ClientError::Permission(format!("{}: Is a directory", path)));
        }

        // 使用临时文件写入，然后原子重命名
        let file_name = full_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = full_path.with_file_name(format!(".{}.part", file_name));
        fs::write(&temp_path, data).map_err(|e| Self::map_err(path, e))?;
        fs::rename(&temp_path, &full_path).map_err(|e| Self::map_err(path, e))?;
        Ok(())
    }
}

impl TransferClient for LocalClient {
    fn connect(&mut self, _host: &str, _port: u16) -> ClientResult<()> {
        if !self.base_path.is_dir() {
            return Err(ClientError::Io(std::io::Error::new(
                ErrorKind::NotFound,
                format!("{} is not a directory", self.base_path.display()),
            )));
        }
        self.connected = true;
        Ok(())
    }

    fn login(&mut self, _username: &str, _password: Option<&str>) -> ClientResult<()> {
        if !self.connected {
            return Err(ClientError::NotConnected);
        }
        Ok(())
    }

    fn list_names(&mut self, path: &str) -> ClientResult<Vec<String>> {
        let full_path = self.resolve_path(path)?;
        let metadata = fs::metadata(&full_path).map_err(|e| Self::map_err(path, e))?;

        if !metadata.is_dir() {
            return Ok(vec![path.to_string()]);
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&full_path).map_err(|e| Self::map_err(path, e))? {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn make_directory(&mut self, path: &str) -> ClientResult<()> {
        let full_path = self.resolve_path(path)?;
        fs::create_dir(&full_path).map_err(|e| Self::map_err(path, e))
    }

    fn get_text_file(&mut self, path: &str) -> ClientResult<Vec<u8>> {
        let full_path = self.resolve_path(path)?;
        let data = fs::read(&full_path).map_err(|e| Self::map_err(path, e))?;
        Ok(to_unix_newlines(&data))
    }

    fn put_text_file(&mut self, path: &str, data: &[u8]) -> ClientResult<()> {
        self.write(path, &to_unix_newlines(data))
    }

    fn put_binary_file(&mut self, path: &str, data: &[u8]) -> ClientResult<()> {
        self.write(path, data)
    }

    fn delete_entry(&mut self, path: &str) -> ClientResult<()> {
        let full_path = self.resolve_path(path)?;
        if full_path.is_dir() {
            return Err(ClientError::Permission(format!("{}: Is a directory", path)));
        }
        fs::remove_file(&full_path).map_err(|e| Self::map_err(path, e))
    }

    fn remove_directory(&mut self, path: &str) -> ClientResult<()> {
        let full_path = self.resolve_path(path)?;
        match fs::remove_dir(&full_path) {
            Ok(()) => Ok(()),
            // 目录非空时各平台错误码不同，统一视为永久性错误
            Err(e) if full_path.is_dir() => Err(ClientError::Permission(format!("{}: {}", path, e))),
            Err(e) => Err(Self::map_err(path, e)),
        }
    }

    fn close(&mut self) -> ClientResult<()> {
        self.connected = false;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
