// ==========================================
// 关税归类引擎 - 同步协调器
// ==========================================
// 全进程至多一个同步: Idle → Running{sync_id, started_at} 原子切换
// try_start 成功返回 SyncGuard，Guard 析构即释放（无论成功/失败/panic）
// ==========================================

use crate::engine::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Running {
        sync_id: String,
        started_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone)]
pub struct SyncCoordinator {
    state: Arc<Mutex<SyncState>>,
}

impl Default for SyncCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncCoordinator {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SyncState::Idle)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SyncState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// 尝试占用同步槽位
    ///
    /// # 返回
    /// - Ok(SyncGuard): 占用成功，Guard 存活期间其他调用被拒绝
    /// - Err(SyncConflict): 已有同步在运行
    pub fn try_start(&self, sync_id: &str) -> EngineResult<SyncGuard> {
        let mut state = self.lock();
        if let SyncState::Running { sync_id: running, .. } = &*state {
            return Err(EngineError::SyncConflict {
                sync_id: running.clone(),
            });
        }

        *state = SyncState::Running {
            sync_id: sync_id.to_string(),
            started_at: Utc::now(),
        };
        info!(sync_id = %sync_id, "同步槽位已占用");

        Ok(SyncGuard {
            state: Arc::clone(&self.state),
            sync_id: sync_id.to_string(),
        })
    }

    pub fn state(&self) -> SyncState {
        self.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lock(), SyncState::Running { .. })
    }
}

/// 同步槽位守卫
#[derive(Debug)]
pub struct SyncGuard {
    state: Arc<Mutex<SyncState>>,
    sync_id: String,
}

impl SyncGuard {
    pub fn sync_id(&self) -> &str {
        &self.sync_id
    }
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // 只释放自己占用的槽位
        if matches!(&*state, SyncState::Running { sync_id, .. } if *sync_id == self.sync_id) {
            *state = SyncState::Idle;
            debug!(sync_id = %self.sync_id, "同步槽位已释放");
        }
    }
}
