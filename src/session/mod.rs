//! # 会话固定存储
//!
//! TTL 约束的 `会话ID -> 固定模型` 映射，防止多轮对话中途换模型。
//! 单进程内存实现：读多写少，后台任务周期清扫过期条目。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::config::SessionConfig;
use crate::logging::{LogComponent, LogStage};
use crate::routing::Tier;
use crate::{ldebug, linfo};

/// 单个会话条目
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub pinned_model: String,
    pub tier: Tier,
    pub created_at: DateTime<Utc>,
    last_used: Instant,
}

/// 固定查询的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedModel {
    pub model: String,
    pub tier: Tier,
}

/// 会话固定存储
#[derive(Debug)]
pub struct SessionStore {
    entries: Arc<Mutex<HashMap<String, Session>>>,
    ttl: Duration,
    max_entries: usize,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    header_names: Vec<String>,
}

impl SessionStore {
    /// 创建存储并启动周期清扫任务
    #[must_use]
    pub fn new(config: &SessionConfig) -> Arc<Self> {
        let store = Arc::new(Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl: Duration::from_millis(config.ttl_ms),
            max_entries: config.max_entries.max(1),
            sweeper: Mutex::new(None),
            header_names: config.header_names.clone(),
        });

        let entries = Arc::clone(&store.entries);
        let ttl = store.ttl;
        let interval = Duration::from_millis(config.cleanup_interval_ms.max(1));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = {
                    let mut map = entries.lock().expect("会话表锁");
                    let before = map.len();
                    map.retain(|_, s| s.last_used.elapsed() < ttl);
                    before - map.len()
                };
                if removed > 0 {
                    ldebug!(
                        "system",
                        LogStage::BackgroundTask,
                        LogComponent::SessionStore,
                        "sweep",
                        "清扫过期会话",
                        removed = removed
                    );
                }
            }
        });
        *store.sweeper.lock().expect("清扫句柄锁") = Some(handle);
        store
    }

    /// 查询固定模型；命中时刷新最后使用时间
    #[must_use]
    pub fn get_pinned(&self, session_id: &str) -> Option<PinnedModel> {
        let mut map = self.entries.lock().expect("会话表锁");
        let session = map.get_mut(session_id)?;
        if session.last_used.elapsed() >= self.ttl {
            map.remove(session_id);
            return None;
        }
        session.last_used = Instant::now();
        Some(PinnedModel {
            model: session.pinned_model.clone(),
            tier: session.tier,
        })
    }

    /// 创建或替换固定
    pub fn pin(&self, session_id: &str, model: &str, tier: Tier) {
        let mut map = self.entries.lock().expect("会话表锁");

        // 容量满时按最久未用淘汰
        if map.len() >= self.max_entries && !map.contains_key(session_id) {
            if let Some(oldest) = map
                .iter()
                .min_by_key(|(_, s)| s.last_used)
                .map(|(id, _)| id.clone())
            {
                map.remove(&oldest);
            }
        }

        map.insert(
            session_id.to_string(),
            Session {
                session_id: session_id.to_string(),
                pinned_model: model.to_string(),
                tier,
                created_at: Utc::now(),
                last_used: Instant::now(),
            },
        );
    }

    /// 从请求头中提取会话ID：按配置顺序取第一个非空值
    #[must_use]
    pub fn extract_session_id(&self, headers: &axum::http::HeaderMap) -> Option<String> {
        for name in &self.header_names {
            if let Some(value) = headers.get(name.as_str()) {
                if let Ok(s) = value.to_str() {
                    let trimmed = s.trim();
                    if !trimmed.is_empty() {
                        return Some(trimmed.to_string());
                    }
                }
            }
        }
        None
    }

    /// 当前条目数（测试与健康报告用）
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("会话表锁").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 停止清扫任务
    pub fn close(&self) {
        if let Some(handle) = self.sweeper.lock().expect("清扫句柄锁").take() {
            handle.abort();
            linfo!(
                "system",
                LogStage::Shutdown,
                LogComponent::SessionStore,
                "closed",
                "会话存储已关闭"
            );
        }
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.close();
    }
}
