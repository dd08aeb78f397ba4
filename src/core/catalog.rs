//! 远程状态目录（catalog）- 用于增量同步
//!
//! 目录把相对于远程根目录的路径映射到内容指纹（文件）或目录标记 `"*"`，
//! 以 JSON 对象形式保存在远程根目录下的 `.syncftp` 文件中。

use crate::error::{Result, SyncError};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 远程目录文件名
pub const CATALOG_FILE_NAME: &str = ".syncftp";
/// 目录标记
pub const DIRECTORY_MARKER: &str = "*";

/// 目录条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEntry {
    Directory,
    File(String),
}

impl CatalogEntry {
    pub fn is_dir(&self) -> bool {
        matches!(self, CatalogEntry::Directory)
    }

    pub fn fingerprint(&self) -> Option<&str> {
        match self {
            CatalogEntry::File(fp) => Some(fp),
            CatalogEntry::Directory => None,
        }
    }
}

impl Serialize for CatalogEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            CatalogEntry::Directory => serializer.serialize_str(DIRECTORY_MARKER),
            CatalogEntry::File(fp) => serializer.serialize_str(fp),
        }
    }
}

impl<'de> Deserialize<'de> for CatalogEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        match value.as_str() {
            DIRECTORY_MARKER => Ok(CatalogEntry::Directory),
            "" => Err(de::Error::custom("empty fingerprint")),
            _ => Ok(CatalogEntry::File(value)),
        }
    }
}

/// 路径 -> 指纹/目录标记 的映射，键有序以保证序列化结果稳定
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_file(&mut self, path: impl Into<String>, fingerprint: impl Into<String>) {
        self.entries
            .insert(path.into(), CatalogEntry::File(fingerprint.into()));
    }

    pub fn insert_directory(&mut self, path: impl Into<String>) {
        self.entries.insert(path.into(), CatalogEntry::Directory);
    }

    pub fn insert(&mut self, path: impl Into<String>, entry: CatalogEntry) {
        self.entries.insert(path.into(), entry);
    }

    pub fn get(&self, path: &str) -> Option<&CatalogEntry> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CatalogEntry)> {
        self.entries.iter()
    }

    /// `dir` 之下的所有条目（不含 `dir` 本身）
    pub fn descendants<'a>(
        &'a self,
        dir: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a CatalogEntry)> + 'a {
        let prefix = format!("{}/", dir);
        self.entries
            .range(prefix.clone()..)
            .take_while(move |(k, _)| k.starts_with(&prefix))
    }
}

impl FromIterator<(String, CatalogEntry)> for Catalog {
    fn from_iter<I: IntoIterator<Item = (String, CatalogEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// 计算内容指纹（MD5，32 个十六进制字符）
///
/// 仅用于变化检测，不用于安全目的。
pub fn fingerprint(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// 解析远程目录；`None` 表示远程尚无目录文件
pub fn load_catalog(raw: Option<&[u8]>) -> Result<Catalog> {
    let raw = match raw {
        Some(raw) => raw,
        None => return Ok(Catalog::new()),
    };

    // 空文件（例如上次写入中断）视为空目录
    if raw.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Catalog::new());
    }

    let catalog: Catalog =
        serde_json::from_slice(raw).map_err(|e| SyncError::CatalogFormat(e.to_string()))?;

    if catalog.contains("") {
        return Err(SyncError::CatalogFormat("empty path key".to_string()));
    }

    Ok(catalog)
}

/// 序列化目录，用于写回远程
pub fn save_catalog(catalog: &Catalog) -> Result<Vec<u8>> {
    let mut data = serde_json::to_vec_pretty(catalog)?;
    data.push(b'\n');
    Ok(data)
}
