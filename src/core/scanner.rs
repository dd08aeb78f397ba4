use crate::core::catalog::CATALOG_FILE_NAME;
use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// 文件扫描器配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanConfig {
    /// 排除规则（glob patterns），按相对路径匹配
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

/// 本地条目类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// 遍历本地目录时产生的条目
#[derive(Debug, Clone)]
pub struct PathEntry {
    /// 文件名
    pub name: String,
    /// 相对本地根目录的路径，使用 `/` 分隔
    pub relative: String,
    /// 本地完整路径
    pub local_path: PathBuf,
    pub kind: EntryKind,
}

/// 文件扫描器
#[derive(Debug, Clone, Default)]
pub struct FileScanner {
    config: ScanConfig,
}

impl FileScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ScanConfig) -> Self {
        Self { config }
    }

    /// 检查路径是否应该被排除
    fn should_exclude(&self, relative: &str) -> bool {
        if relative == CATALOG_FILE_NAME {
            return true;
        }
        self.config
            .exclude_patterns
            .iter()
            .any(|pattern| Self::matches_pattern(relative, pattern))
    }

    /// 简单的 glob 模式匹配
    fn matches_pattern(path: &str, pattern: &str) -> bool {
        // 处理 ** 通配符
        if pattern.contains("**") {
            let parts: Vec<&str> = pattern.split("**").collect();
            if parts.len() == 2 {
                let prefix = parts[0].trim_end_matches('/');
                let suffix = parts[1].trim_start_matches('/');

                if prefix.is_empty() && suffix.is_empty() {
                    return true;
                }
                if !prefix.is_empty() && path != prefix && !path.starts_with(&format!("{}/", prefix)) {
                    return false;
                }
                if !suffix.is_empty() && !path.ends_with(suffix) {
                    return false;
                }
                return true;
            }
        }

        let name = path.rsplit('/').next().unwrap_or(path);

        // 处理 * 通配符，对完整路径或文件名匹配
        if pattern.contains('*') {
            let regex_pattern = regex::escape(pattern).replace("\\*", "[^/]*");
            if let Ok(re) = regex::Regex::new(&format!("^{}$", regex_pattern)) {
                return re.is_match(path) || re.is_match(name);
            }
        }

        // 精确匹配
        path == pattern || name == pattern
    }

    /// 列出单层目录，按文件名排序并过滤
    ///
    /// `relative_dir` 为该目录相对本地根目录的路径（根目录为空串）。
    /// 符号链接跟随到目标；既非文件也非目录的条目被跳过。
    pub fn list_dir(&self, local_dir: &Path, relative_dir: &str) -> Result<Vec<PathEntry>> {
        let mut entries = Vec::new();

        for entry in WalkDir::new(local_dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.loop_ancestor().is_some() => {
                    warn!(
                        "跳过指向上级目录的链接: {}",
                        e.path().map(|p| p.display().to_string()).unwrap_or_default()
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let name = match entry.file_name().to_str() {
                Some(name) => name.to_string(),
                None => {
                    return Err(SyncError::local_io(
                        entry.path(),
                        std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            "file name is not valid UTF-8",
                        ),
                    ))
                }
            };
            let relative = if relative_dir.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", relative_dir, name)
            };

            if self.should_exclude(&relative) {
                debug!("排除: {}", relative);
                continue;
            }

            let file_type = entry.file_type();
            let kind = if file_type.is_dir() {
                EntryKind::Directory
            } else if file_type.is_file() {
                EntryKind::File
            } else {
                debug!("跳过特殊文件: {}", entry.path().display());
                continue;
            };

            entries.push(PathEntry {
                name,
                relative,
                local_path: entry.into_path(),
                kind,
            });
        }

        Ok(entries)
    }
}
