use crate::core::catalog::{fingerprint, Catalog, CatalogEntry};
use crate::core::classify::{transfer_mode, TransferMode, TypeInference};
use crate::core::scanner::{EntryKind, FileScanner, PathEntry};
use crate::error::{Result, SyncError};
use crate::storage::{remote_join, MakeDirOutcome, RemoteDir};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 单个文件相对上次同步的变化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChange {
    /// 指纹一致
    Unchanged,
    /// 上次目录中不存在
    Added,
    /// 指纹不同（或上次是目录）
    Modified,
}

impl FileChange {
    pub fn detect(previous: Option<&CatalogEntry>, current: &str) -> Self {
        match previous {
            None => FileChange::Added,
            Some(CatalogEntry::File(fp)) if fp == current => FileChange::Unchanged,
            Some(_) => FileChange::Modified,
        }
    }

    pub fn needs_transfer(self) -> bool {
        self != FileChange::Unchanged
    }
}

/// 待删除集合：远程目录中有、本次本地目录中没有的路径
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingDeletions {
    /// 按路径排序
    pub files: Vec<String>,
    /// 深度优先：子目录排在父目录之前
    pub directories: Vec<String>,
}

impl PendingDeletions {
    /// 计算待删除集合，`already_removed` 中的路径已在遍历时处理
    pub fn compute(previous: &Catalog, current: &Catalog, already_removed: &BTreeSet<String>) -> Self {
        let mut pending = PendingDeletions::default();

        for (path, entry) in previous.iter() {
            if current.contains(path) || already_removed.contains(path) {
                continue;
            }
            if entry.is_dir() {
                pending.directories.push(path.clone());
            } else {
                pending.files.push(path.clone());
            }
        }

        pending.directories.sort_by(|a, b| {
            let depth_a = a.matches('/').count();
            let depth_b = b.matches('/').count();
            depth_b.cmp(&depth_a).then_with(|| b.cmp(a))
        });

        pending
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len() + self.directories.len()
    }
}

/// 动作统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSummary {
    pub files_scanned: u32,
    pub dirs_scanned: u32,
    pub dirs_created: u32,
    pub files_added: u32,
    pub files_modified: u32,
    pub files_unchanged: u32,
    pub text_transfers: u32,
    pub binary_transfers: u32,
    pub bytes_transferred: u64,
    pub files_deleted: u32,
    pub dirs_deleted: u32,
}

impl ActionSummary {
    pub fn files_transferred(&self) -> u32 {
        self.text_transfers + self.binary_transfers
    }
}

/// 遍历结果：本地目录（catalog）与统计
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub catalog: Catalog,
    pub summary: ActionSummary,
    /// 遍历中因类型变化（目录变文件）已删除的远程路径
    pub removed: BTreeSet<String>,
}

/// 本地树与远程的协调器
pub struct Reconciler<'a> {
    scanner: &'a FileScanner,
    inference: &'a dyn TypeInference,
    dry_run: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(scanner: &'a FileScanner, inference: &'a dyn TypeInference) -> Self {
        Self {
            scanner,
            inference,
            dry_run: false,
        }
    }

    /// 只计算计划，不修改远程
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// 遍历本地树，创建缺失的远程目录并上传有变化的文件
    ///
    /// `previous` 为上次同步写入的远程目录，只读；返回本次构建的本地目录。
    pub fn reconcile(
        &self,
        remote: &mut RemoteDir<'_>,
        local_root: &Path,
        remote_root: &str,
        previous: &Catalog,
    ) -> Result<Reconciliation> {
        if !local_root.is_dir() {
            return Err(SyncError::local_io(
                local_root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "local root is not a directory"),
            ));
        }

        let root = std::fs::canonicalize(local_root)
            .map_err(|e| SyncError::local_io(local_root, e))?;
        let mut ancestors = vec![root];
        let mut outcome = Reconciliation::default();
        self.visit_dir(
            remote,
            local_root,
            "",
            remote_root,
            previous,
            &mut ancestors,
            &mut outcome,
        )?;
        Ok(outcome)
    }

    #[allow(clippy::too_many_arguments)]
    fn visit_dir(
        &self,
        remote: &mut RemoteDir<'_>,
        local_dir: &Path,
        relative: &str,
        remote_root: &str,
        previous: &Catalog,
        ancestors: &mut Vec<PathBuf>,
        outcome: &mut Reconciliation,
    ) -> Result<()> {
        let remote_dir = remote_join(remote_root, relative);

        // 上次是文件、这次是目录：先删掉远程的旧文件，之后该目录必然不存在
        let replaced_file = matches!(previous.get(relative), Some(CatalogEntry::File(_)));
        if replaced_file {
            self.remove_file(remote, &remote_dir, outcome)?;
            outcome.removed.insert(relative.to_string());
        }

        self.ensure_remote_dir(remote, &remote_dir, replaced_file, outcome)?;

        for entry in self.scanner.list_dir(local_dir, relative)? {
            match entry.kind {
                EntryKind::Directory => {
                    let target = std::fs::canonicalize(&entry.local_path)
                        .map_err(|e| SyncError::local_io(&entry.local_path, e))?;
                    if ancestors.contains(&target) {
                        warn!("跳过指向上级目录的链接: {}", entry.local_path.display());
                        continue;
                    }

                    outcome.summary.dirs_scanned += 1;
                    outcome.catalog.insert_directory(entry.relative.clone());
                    ancestors.push(target);
                    self.visit_dir(
                        remote,
                        &entry.local_path,
                        &entry.relative,
                        remote_root,
                        previous,
                        ancestors,
                        outcome,
                    )?;
                    ancestors.pop();
                }
                EntryKind::File => {
                    self.visit_file(remote, &entry, remote_root, previous, outcome)?;
                }
            }
        }

        Ok(())
    }

    fn ensure_remote_dir(
        &self,
        remote: &mut RemoteDir<'_>,
        remote_dir: &str,
        known_missing: bool,
        outcome: &mut Reconciliation,
    ) -> Result<()> {
        let exists = !known_missing
            && remote
                .exists(remote_dir)
                .map_err(|e| SyncError::DirectoryCreate {
                    path: remote_dir.to_string(),
                    reason: e.to_string(),
                })?;
        if exists {
            return Ok(());
        }

        info!("创建目录: {}", remote.url(remote_dir));
        if self.dry_run {
            outcome.summary.dirs_created += 1;
            return Ok(());
        }
        if remote.make_path(remote_dir)? == MakeDirOutcome::Created {
            outcome.summary.dirs_created += 1;
        }
        Ok(())
    }

    fn visit_file(
        &self,
        remote: &mut RemoteDir<'_>,
        entry: &PathEntry,
        remote_root: &str,
        previous: &Catalog,
        outcome: &mut Reconciliation,
    ) -> Result<()> {
        let data = std::fs::read(&entry.local_path)
            .map_err(|e| SyncError::local_io(&entry.local_path, e))?;
        let fp = fingerprint(&data);
        let prior = previous.get(&entry.relative);
        let change = FileChange::detect(prior, &fp);

        outcome.summary.files_scanned += 1;
        outcome.catalog.insert_file(entry.relative.clone(), fp);

        if !change.needs_transfer() {
            debug!("{} 无需覆盖", entry.local_path.display());
            outcome.summary.files_unchanged += 1;
            return Ok(());
        }

        let remote_file = remote_join(remote_root, &entry.relative);

        // 上次是目录、这次是文件：先清理远程旧目录
        if let Some(CatalogEntry::Directory) = prior {
            self.remove_stale_tree(remote, remote_root, previous, &entry.relative, outcome)?;
        }

        let mode = transfer_mode(self.inference, &entry.name);
        info!(
            "复制 [{}] {} -> {}",
            mode,
            entry.local_path.display(),
            remote.url(&remote_file)
        );

        match change {
            FileChange::Added => outcome.summary.files_added += 1,
            _ => outcome.summary.files_modified += 1,
        }
        match mode {
            TransferMode::Text => outcome.summary.text_transfers += 1,
            TransferMode::Binary => outcome.summary.binary_transfers += 1,
        }

        if self.dry_run {
            return Ok(());
        }

        let client = remote.client();
        let result = match mode {
            TransferMode::Text => client.put_text_file(&remote_file, &data),
            TransferMode::Binary => client.put_binary_file(&remote_file, &data),
        };
        result.map_err(|source| SyncError::Transfer {
            local: entry.local_path.clone(),
            remote: remote_file.clone(),
            source,
        })?;

        outcome.summary.bytes_transferred += data.len() as u64;
        Ok(())
    }

    /// 删除上次目录中 `relative` 目录下的全部内容及其本身
    fn remove_stale_tree(
        &self,
        remote: &mut RemoteDir<'_>,
        remote_root: &str,
        previous: &Catalog,
        relative: &str,
        outcome: &mut Reconciliation,
    ) -> Result<()> {
        let stale: Catalog = previous
            .descendants(relative)
            .map(|(path, entry)| (path.clone(), entry.clone()))
            .chain(std::iter::once((
                relative.to_string(),
                CatalogEntry::Directory,
            )))
            .collect();
        let pending = PendingDeletions::compute(&stale, &Catalog::new(), &BTreeSet::new());

        self.delete_pending(
            remote,
            remote_root,
            &pending,
            &mut outcome.summary,
            &mut outcome.removed,
        )
    }

    fn remove_file(
        &self,
        remote: &mut RemoteDir<'_>,
        remote_path: &str,
        outcome: &mut Reconciliation,
    ) -> Result<()> {
        info!("删除 {}", remote.url(remote_path));
        outcome.summary.files_deleted += 1;
        if self.dry_run {
            return Ok(());
        }
        remote
            .client()
            .delete_entry(remote_path)
            .map_err(|source| SyncError::Deletion {
                path: remote_path.to_string(),
                source,
            })
    }

    /// 执行删除：先删文件，再按深度从深到浅删目录
    ///
    /// 第一次失败即中止；已删除的相对路径记入 `deleted`。
    pub fn delete_pending(
        &self,
        remote: &mut RemoteDir<'_>,
        remote_root: &str,
        pending: &PendingDeletions,
        summary: &mut ActionSummary,
        deleted: &mut BTreeSet<String>,
    ) -> Result<()> {
        for file in &pending.files {
            let path = remote_join(remote_root, file);
            info!("删除 {}", remote.url(&path));
            if !self.dry_run {
                remote
                    .client()
                    .delete_entry(&path)
                    .map_err(|source| SyncError::Deletion {
                        path: path.clone(),
                        source,
                    })?;
            }
            summary.files_deleted += 1;
            deleted.insert(file.clone());
        }

        for dir in &pending.directories {
            let path = remote_join(remote_root, dir);
            info!("删除目录 {}", remote.url(&path));
            if !self.dry_run {
                remote
                    .client()
                    .remove_directory(&path)
                    .map_err(|source| SyncError::Deletion {
                        path: path.clone(),
                        source,
                    })?;
            }
            summary.dirs_deleted += 1;
            deleted.insert(dir.clone());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MimeInference;
    use crate::storage::{MemoryClient, TransferClient};
    use std::fs;

    #[test]
    fn test_file_change() {
        let same = CatalogEntry::File("abc".to_string());
        let other = CatalogEntry::File("def".to_string());

        assert_eq!(FileChange::detect(None, "abc"), FileChange::Added);
        assert_eq!(FileChange::detect(Some(&same), "abc"), FileChange::Unchanged);
        assert_eq!(FileChange::detect(Some(&other), "abc"), FileChange::Modified);
        assert_eq!(
            FileChange::detect(Some(&CatalogEntry::Directory), "abc"),
            FileChange::Modified
        );
    }

    #[test]
    fn test_pending_deletions_partition_and_order() {
        let mut previous = Catalog::new();
        previous.insert_directory("a");
        previous.insert_directory("a/b");
        previous.insert_directory("a/b/c");
        previous.insert_file("a/b/c/f", "1");
        previous.insert_file("a/g", "2");
        previous.insert_directory("keep");
        previous.insert_file("keep/h", "3");
        previous.insert_file("old.txt", "4");

        let mut current = Catalog::new();
        current.insert_directory("keep");
        current.insert_file("keep/h", "3");

        let pending = PendingDeletions::compute(&previous, &current, &BTreeSet::new());
        assert_eq!(pending.files, vec!["a/b/c/f", "a/g", "old.txt"]);
        assert_eq!(pending.directories, vec!["a/b/c", "a/b", "a"]);
        assert_eq!(pending.len(), 6);
    }

    #[test]
    fn test_pending_deletions_skip_removed() {
        let mut previous = Catalog::new();
        previous.insert_file("x", "1");
        previous.insert_file("y", "2");

        let removed: BTreeSet<String> = ["x".to_string()].into_iter().collect();
        let pending = PendingDeletions::compute(&previous, &Catalog::new(), &removed);
        assert_eq!(pending.files, vec!["y"]);
        assert!(pending.directories.is_empty());
    }

    #[test]
    fn test_reconcile_builds_catalog() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "hello").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.bin"), [0u8, 159, 146, 150]).unwrap();

        let mut client = MemoryClient::new();
        client.connect("h", 21).unwrap();
        let handle = client.clone();
        let mut remote = RemoteDir::new(&mut client);

        let scanner = FileScanner::new();
        let reconciler = Reconciler::new(&scanner, &MimeInference);
        let outcome = reconciler
            .reconcile(&mut remote, dir.path(), "site", &Catalog::new())
            .unwrap();

        let mut expected = Catalog::new();
        expected.insert_file("a.txt", fingerprint(b"hello"));
        expected.insert_directory("sub");
        expected.insert_file("sub/b.bin", fingerprint(&[0u8, 159, 146, 150]));
        assert_eq!(outcome.catalog, expected);

        assert!(handle.is_dir("site/sub"));
        assert_eq!(handle.read("site/a.txt").unwrap(), b"hello".to_vec());
        assert_eq!(outcome.summary.dirs_created, 2);
        assert_eq!(outcome.summary.text_transfers, 1);
        assert_eq!(outcome.summary.binary_transfers, 1);
        assert_eq!(outcome.summary.bytes_transferred, 9);
    }

    #[test]
    fn test_dry_run_leaves_remote_untouched() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/x.txt"), "x").unwrap();

        let mut client = MemoryClient::new();
        client.connect("h", 21).unwrap();
        let handle = client.clone();
        let mut remote = RemoteDir::new(&mut client);

        let scanner = FileScanner::new();
        let reconciler = Reconciler::new(&scanner, &MimeInference).dry_run(true);
        let outcome = reconciler
            .reconcile(&mut remote, dir.path(), ".", &Catalog::new())
            .unwrap();

        assert_eq!(outcome.summary.files_transferred(), 1);
        assert_eq!(outcome.summary.dirs_created, 1);
        assert!(!handle.is_dir("sub"));
        assert!(handle.uploads().is_empty());
    }

    #[test]
    fn test_kind_change_file_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("x")).unwrap();
        fs::write(dir.path().join("x/inner.txt"), "i").unwrap();

        let mut client = MemoryClient::new();
        client.connect("h", 21).unwrap();
        client.seed_file("x", b"was a file");
        let handle = client.clone();
        let mut remote = RemoteDir::new(&mut client);

        let mut previous = Catalog::new();
        previous.insert_file("x", fingerprint(b"was a file"));

        let scanner = FileScanner::new();
        let outcome = Reconciler::new(&scanner, &MimeInference)
            .reconcile(&mut remote, dir.path(), ".", &previous)
            .unwrap();

        assert!(handle.is_dir("x"));
        assert_eq!(handle.read("x/inner.txt").unwrap(), b"i".to_vec());
        assert!(outcome.removed.contains("x"));
        assert!(PendingDeletions::compute(&previous, &outcome.catalog, &outcome.removed).is_empty());
    }

    #[test]
    fn test_kind_change_directory_to_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("x"), "now a file").unwrap();

        let mut client = MemoryClient::new();
        client.connect("h", 21).unwrap();
        client.seed_file("x/old/deep.txt", b"d");
        let handle = client.clone();
        let mut remote = RemoteDir::new(&mut client);

        let mut previous = Catalog::new();
        previous.insert_directory("x");
        previous.insert_directory("x/old");
        previous.insert_file("x/old/deep.txt", fingerprint(b"d"));

        let scanner = FileScanner::new();
        let outcome = Reconciler::new(&scanner, &MimeInference)
            .reconcile(&mut remote, dir.path(), ".", &previous)
            .unwrap();

        assert!(handle.is_file("x"));
        assert_eq!(
            handle.deletions(),
            vec!["x/old/deep.txt".to_string(), "x/old".to_string(), "x".to_string()]
        );
        let pending = PendingDeletions::compute(&previous, &outcome.catalog, &outcome.removed);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_dry_run_counts_directory_replacing_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("x")).unwrap();

        let mut client = MemoryClient::new();
        client.connect("h", 21).unwrap();
        client.seed_file("x", b"was a file");
        let handle = client.clone();
        let mut remote = RemoteDir::new(&mut client);

        let mut previous = Catalog::new();
        previous.insert_file("x", fingerprint(b"was a file"));

        let scanner = FileScanner::new();
        let outcome = Reconciler::new(&scanner, &MimeInference)
            .dry_run(true)
            .reconcile(&mut remote, dir.path(), ".", &previous)
            .unwrap();

        assert_eq!(outcome.summary.files_deleted, 1);
        assert_eq!(outcome.summary.dirs_created, 1);
        assert!(handle.is_file("x"));
    }

    #[cfg(unix)]
    #[test]
    fn test_link_to_ancestor_is_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.txt"), "b").unwrap();
        std::os::unix::fs::symlink("..", dir.path().join("sub/up")).unwrap();

        let mut client = MemoryClient::new();
        client.connect("h", 21).unwrap();
        let mut remote = RemoteDir::new(&mut client);

        let scanner = FileScanner::new();
        let outcome = Reconciler::new(&scanner, &MimeInference)
            .reconcile(&mut remote, dir.path(), ".", &Catalog::new())
            .unwrap();

        let keys: Vec<_> = outcome.catalog.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a.txt", "sub", "sub/b.txt"]);
        assert_eq!(outcome.summary.files_transferred(), 2);
    }
}
