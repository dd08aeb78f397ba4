//! 将本地目录树增量镜像到 FTP 服务器
//!
//! 远程根目录下的 `.syncftp` 记录上次同步时每个文件的内容指纹，
//! 据此只上传有变化的文件，并删除本地已不存在的远程条目。

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

pub use crate::config::{AppConfig, RemoteConfig, RemoteType};
pub use crate::core::{sync, SyncConfig, SyncEngine, SyncReport};
pub use crate::error::{Result, SyncError};
