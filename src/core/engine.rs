use crate::config::{AppConfig, RemoteConfig};
use crate::core::catalog::{load_catalog, save_catalog, Catalog, CATALOG_FILE_NAME};
use crate::core::classify::{MimeInference, TypeInference};
use crate::core::reconciler::{ActionSummary, PendingDeletions, Reconciler};
use crate::core::scanner::{FileScanner, ScanConfig};
use crate::error::{Result, SyncError};
use crate::storage::{create_client, remote_join, RemoteDir, TransferClient};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

/// 同步配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// 本地根目录
    #[serde(default = "default_local_root")]
    pub local_root: PathBuf,
    /// 远程根目录，相对登录目录或以 `/` 开头的绝对路径
    #[serde(default = "default_remote_root")]
    pub remote_root: String,
    /// 只输出计划，不修改远程
    #[serde(default)]
    pub dry_run: bool,
    /// 扫描配置
    #[serde(default)]
    pub scan: ScanConfig,
}

fn default_local_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_remote_root() -> String {
    ".".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            local_root: default_local_root(),
            remote_root: default_remote_root(),
            dry_run: false,
            scan: ScanConfig::default(),
        }
    }
}

/// 同步报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub run_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
    pub dry_run: bool,
    #[serde(flatten)]
    pub summary: ActionSummary,
}

impl SyncReport {
    pub fn files_transferred(&self) -> u32 {
        self.summary.files_transferred()
    }
}

/// 同步引擎
pub struct SyncEngine {
    remote: RemoteConfig,
    config: SyncConfig,
    scanner: FileScanner,
    inference: Box<dyn TypeInference>,
}

impl SyncEngine {
    pub fn new(remote: RemoteConfig, config: SyncConfig) -> Self {
        let scanner = FileScanner::with_config(config.scan.clone());
        Self {
            remote,
            config,
            scanner,
            inference: Box::new(MimeInference),
        }
    }

    /// 替换文件类型推断实现
    pub fn with_inference(mut self, inference: Box<dyn TypeInference>) -> Self {
        self.inference = inference;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// 运行一次同步
    ///
    /// 连接并登录后读取远程目录文件，遍历本地树上传变化，写回目录文件，
    /// 最后删除本地已不存在的远程条目。任何退出路径都会关闭连接。
    pub fn run_sync(&self, client: &mut dyn TransferClient) -> Result<SyncReport> {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("sync", run_id = %run_id);
        let _enter = span.enter();

        let start_time = Utc::now();
        let started = Instant::now();
        let local_root = &self.config.local_root;
        let remote_root = self.config.remote_root.as_str();

        info!(
            "开始同步: {} -> {}/{}",
            local_root.display(),
            client.name(),
            remote_root
        );

        let address = client.name().to_string();
        client
            .connect(&self.remote.host, self.remote.port)
            .map_err(|source| SyncError::Connection {
                address: address.clone(),
                source,
            })?;

        let mut session = scopeguard::guard(client, |client| {
            if let Err(e) = client.close() {
                warn!("关闭连接失败: {}", e);
            } else {
                debug!("连接已关闭");
            }
        });

        session
            .login(&self.remote.username, self.remote.password.as_deref())
            .map_err(|source| SyncError::Connection { address, source })?;

        let mut remote = RemoteDir::new(&mut **session);

        let catalog_path = remote_join(remote_root, CATALOG_FILE_NAME);
        let previous = Self::read_catalog(&mut remote, &catalog_path)?;
        debug!("远程目录共 {} 条记录", previous.len());

        let reconciler =
            Reconciler::new(&self.scanner, self.inference.as_ref()).dry_run(self.config.dry_run);
        let mut outcome = reconciler.reconcile(&mut remote, local_root, remote_root, &previous)?;

        if self.config.dry_run {
            info!("试运行，不写回目录文件");
        } else {
            Self::write_catalog(&mut remote, &catalog_path, &outcome.catalog)?;
        }

        let pending = PendingDeletions::compute(&previous, &outcome.catalog, &outcome.removed);
        if !pending.is_empty() {
            info!("待删除 {} 项", pending.len());
        }
        let mut deleted = BTreeSet::new();
        if let Err(e) = reconciler.delete_pending(
            &mut remote,
            remote_root,
            &pending,
            &mut outcome.summary,
            &mut deleted,
        ) {
            // 未删成功的条目写回目录文件，下次同步继续删除
            let retained = Self::retain_undeleted(&outcome.catalog, &previous, &pending, &deleted);
            if let Err(write_err) = Self::write_catalog(&mut remote, &catalog_path, &retained) {
                warn!("写回未完成的删除记录失败: {}", write_err);
            }
            return Err(e);
        }

        let report = SyncReport {
            run_id: run_id.clone(),
            start_time,
            end_time: Utc::now(),
            duration_ms: started.elapsed().as_millis() as u64,
            dry_run: self.config.dry_run,
            summary: outcome.summary,
        };

        info!(
            "同步完成: 扫描 {} 个文件, 上传 {} 个 (文本 {}, 二进制 {}), 未变化 {}, 新建目录 {}, 删除文件 {}, 删除目录 {}, 传输 {} 字节, 耗时 {}ms",
            report.summary.files_scanned,
            report.files_transferred(),
            report.summary.text_transfers,
            report.summary.binary_transfers,
            report.summary.files_unchanged,
            report.summary.dirs_created,
            report.summary.files_deleted,
            report.summary.dirs_deleted,
            report.summary.bytes_transferred,
            report.duration_ms
        );

        Ok(report)
    }

    fn write_catalog(remote: &mut RemoteDir<'_>, catalog_path: &str, catalog: &Catalog) -> Result<()> {
        let data = save_catalog(catalog)?;
        remote
            .client()
            .put_text_file(catalog_path, &data)
            .map_err(|source| SyncError::Transfer {
                local: PathBuf::from(CATALOG_FILE_NAME),
                remote: catalog_path.to_string(),
                source,
            })?;
        debug!("已写回目录文件: {}", remote.url(catalog_path));
        Ok(())
    }

    /// 本次目录加上仍留在远程的待删除条目
    fn retain_undeleted(
        current: &Catalog,
        previous: &Catalog,
        pending: &PendingDeletions,
        deleted: &BTreeSet<String>,
    ) -> Catalog {
        let mut retained = current.clone();
        for path in pending.files.iter().chain(&pending.directories) {
            if deleted.contains(path) {
                continue;
            }
            if let Some(entry) = previous.get(path) {
                retained.insert(path.clone(), entry.clone());
            }
        }
        retained
    }

    /// 读取远程目录文件
    ///
    /// 下载因权限类错误失败且文件确实不存在时视为首次同步；其余失败均向上返回。
    fn read_catalog(remote: &mut RemoteDir<'_>, catalog_path: &str) -> Result<Catalog> {
        match remote.client().get_text_file(catalog_path) {
            Ok(data) => load_catalog(Some(&data)),
            Err(e) if e.is_permission() => {
                let exists = remote
                    .exists_file(catalog_path)
                    .map_err(|source| SyncError::CatalogRead {
                        path: catalog_path.to_string(),
                        source,
                    })?;
                if exists {
                    return Err(SyncError::CatalogRead {
                        path: catalog_path.to_string(),
                        source: e,
                    });
                }
                info!("远程目录文件不存在，按首次同步处理: {}", remote.url(catalog_path));
                load_catalog(None)
            }
            Err(source) => Err(SyncError::CatalogRead {
                path: catalog_path.to_string(),
                source,
            }),
        }
    }
}

/// 按配置创建传输客户端并执行同步
pub fn sync(config: &AppConfig) -> Result<SyncReport> {
    config.remote.validate()?;
    let mut client = create_client(&config.remote)?;
    SyncEngine::new(config.remote.clone(), config.sync.clone()).run_sync(client.as_mut())
}
