//! 应用配置模块

use crate::core::engine::SyncConfig;
use crate::error::{Result, SyncError};
use crate::logging::LogConfig;
use crate::storage::{ANONYMOUS_USER, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 远程目标类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteType {
    #[default]
    Ftp,
    /// 已挂载的本地目录
    Local,
}

/// 远程连接配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    #[serde(rename = "type", default)]
    pub typ: RemoteType,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_username")]
    pub username: String,
    /// 未设置时匿名登录不带密码
    #[serde(default)]
    pub password: Option<String>,
    /// local 类型的目标目录
    #[serde(default)]
    pub path: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_username() -> String {
    ANONYMOUS_USER.to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            typ: RemoteType::default(),
            host: String::new(),
            port: default_port(),
            username: default_username(),
            password: None,
            path: None,
        }
    }
}

impl RemoteConfig {
    /// 检查必填项
    pub fn validate(&self) -> Result<()> {
        match self.typ {
            RemoteType::Ftp if self.host.trim().is_empty() => {
                Err(SyncError::Config("remote.host is required for ftp".to_string()))
            }
            RemoteType::Ftp if self.port == 0 => {
                Err(SyncError::Config("remote.port must be non-zero".to_string()))
            }
            RemoteType::Local if self.path.as_deref().map_or(true, str::is_empty) => {
                Err(SyncError::Config("remote.path is required for local".to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// 配置文件整体结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl AppConfig {
    /// 从 JSON 配置文件加载
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&content)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))
    }

    /// 解析 JSON 配置并校验
    pub fn from_json(content: &str) -> Result<Self> {
        let config: AppConfig =
            serde_json::from_str(content).map_err(|e| SyncError::Config(e.to_string()))?;
        config.remote.validate()?;
        Ok(config)
    }

    /// 保存配置（格式化 JSON）
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| SyncError::local_io(path, e))
    }
}
