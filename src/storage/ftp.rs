use super::{
    to_network_newlines, to_unix_newlines, ClientError, ClientResult, TransferClient,
    ANONYMOUS_USER,
};
use std::io::Cursor;
use suppaftp::types::{FileType, FormatControl};
use suppaftp::{FtpError, FtpStream};
use tracing::debug;

/// FTP 传输客户端（基于 suppaftp 的阻塞实现）
pub struct FtpClient {
    stream: Option<FtpStream>,
    name: String,
}

impl FtpClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            stream: None,
            name: format!("ftp://{}:{}", host, port),
        }
    }

    fn stream(&mut self) -> ClientResult<&mut FtpStream> {
        self.stream.as_mut().ok_or(ClientError::NotConnected)
    }

    fn put(&mut self, path: &str, data: &[u8], file_type: FileType) -> ClientResult<()> {
        let stream = self.stream()?;
        stream.transfer_type(file_type).map_err(map_ftp_error)?;
        let mut reader = Cursor::new(data);
        stream.put_file(path, &mut reader).map_err(map_ftp_error)?;
        Ok(())
    }
}

/// 将 suppaftp 错误映射为客户端错误：4xx 为临时错误，5xx 为永久（权限）错误
fn map_ftp_error(e: FtpError) -> ClientError {
    match e {
        FtpError::ConnectionError(io) => ClientError::Io(io),
        FtpError::UnexpectedResponse(response) => {
            let code = response.status.code();
            let message = format!(
                "{} {}",
                code,
                String::from_utf8_lossy(&response.body).trim()
            );
            if (500..600).contains(&code) {
                ClientError::Permission(message)
            } else if (400..500).contains(&code) {
                ClientError::Temporary(message)
            } else {
                ClientError::Protocol(message)
            }
        }
        other => ClientError::Protocol(other.to_string()),
    }
}

impl TransferClient for FtpClient {
    fn connect(&mut self, host: &str, port: u16) -> ClientResult<()> {
        debug!("连接 {}:{}", host, port);
        let stream = FtpStream::connect((host, port)).map_err(map_ftp_error)?;
        self.name = format!("ftp://{}:{}", host, port);
        self.stream = Some(stream);
        Ok(())
    }

    fn login(&mut self, username: &str, password: Option<&str>) -> ClientResult<()> {
        // 匿名登录惯例使用 "anonymous@" 作为密码
        let password = match password {
            Some(p) => p,
            None if username == ANONYMOUS_USER => "anonymous@",
            None => "",
        };
        self.stream()?
            .login(username, password)
            .map_err(map_ftp_error)
    }

    fn list_names(&mut self, path: &str) -> ClientResult<Vec<String>> {
        self.stream()?.nlst(Some(path)).map_err(map_ftp_error)
    }

    fn make_directory(&mut self, path: &str) -> ClientResult<()> {
        self.stream()?.mkdir(path).map_err(map_ftp_error)
    }

    fn get_text_file(&mut self, path: &str) -> ClientResult<Vec<u8>> {
        let stream = self.stream()?;
        stream
            .transfer_type(FileType::Ascii(FormatControl::Default))
            .map_err(map_ftp_error)?;
        let buffer = stream.retr_as_buffer(path).map_err(map_ftp_error)?;
        Ok(to_unix_newlines(&buffer.into_inner()))
    }

    fn put_text_file(&mut self, path: &str, data: &[u8]) -> ClientResult<()> {
        // ASCII 模式下线路上必须是 CRLF
        let wire = to_network_newlines(data);
        self.put(path, &wire, FileType::Ascii(FormatControl::Default))
    }

    fn put_binary_file(&mut self, path: &str, data: &[u8]) -> ClientResult<()> {
        self.put(path, data, FileType::Binary)
    }

    fn delete_entry(&mut self, path: &str) -> ClientResult<()> {
        self.stream()?.rm(path).map_err(map_ftp_error)
    }

    fn remove_directory(&mut self, path: &str) -> ClientResult<()> {
        self.stream()?.rmdir(path).map_err(map_ftp_error)
    }

    fn close(&mut self) -> ClientResult<()> {
        match self.stream.take() {
            Some(mut stream) => stream.quit().map_err(map_ftp_error),
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_connected() {
        let mut client = FtpClient::new("localhost", 21);
        assert!(matches!(
            client.list_names("."),
            Err(ClientError::NotConnected)
        ));
        assert_eq!(client.name(), "ftp://localhost:21");
        // 未连接时关闭是空操作
        assert!(client.close().is_ok());
    }
}
