use super::registry::WorkerEntry;
use arena_core::{GatewayError, WorkerId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// 持久化文档：整个fleet的worker与统计快照
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PersistedFleet {
    pub workers: HashMap<WorkerId, WorkerEntry>,
}

/// 文件存储
///
/// 单个JSON文档承载全部worker状态，每次变更整体重写。
/// 写入先落到临时文件再原子rename，读方不会看到半截文档。
pub struct FleetStore {
    path: PathBuf,
}

const WRITE_ATTEMPTS: u32 = 3;
const WRITE_RETRY_DELAY: Duration = Duration::from_millis(100);

impl FleetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 启动时加载持久化状态；文件不存在视为空fleet
    pub async fn load(&self) -> Result<PersistedFleet, GatewayError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let fleet: PersistedFleet = serde_json::from_slice(&bytes).map_err(|e| {
                    GatewayError::Storage(format!(
                        "failed to parse fleet state at {}: {}",
                        self.path.display(),
                        e
                    ))
                })?;
                debug!(
                    "Loaded {} workers from {}",
                    fleet.workers.len(),
                    self.path.display()
                );
                Ok(fleet)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(
                    "No fleet state at {}, starting empty",
                    self.path.display()
                );
                Ok(PersistedFleet::default())
            }
            Err(e) => Err(GatewayError::Storage(format!(
                "failed to read fleet state at {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    /// 持久化完整快照
    ///
    /// 失败时按固定间隔重试，次数耗尽后返回存储错误。
    pub async fn save(&self, fleet: &PersistedFleet) -> Result<(), GatewayError> {
        let payload = serde_json::to_vec_pretty(fleet)
            .map_err(|e| GatewayError::Storage(format!("failed to serialize fleet state: {e}")))?;

        let mut last_error = String::new();
        for attempt in 1..=WRITE_ATTEMPTS {
            match self.write_atomic(&payload).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        "Fleet state write attempt {}/{} failed: {}",
                        attempt, WRITE_ATTEMPTS, e
                    );
                    last_error = e.to_string();
                    if attempt < WRITE_ATTEMPTS {
                        tokio::time::sleep(WRITE_RETRY_DELAY).await;
                    }
                }
            }
        }

        Err(GatewayError::Storage(format!(
            "failed to write fleet state at {} after {} attempts: {}",
            self.path.display(),
            WRITE_ATTEMPTS,
            last_error
        )))
    }

    async fn write_atomic(&self, payload: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, payload).await?;
        tokio::fs::rename(&tmp, &self.path).await
    }
}
