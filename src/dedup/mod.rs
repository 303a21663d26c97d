//! # 请求去重器
//!
//! 按请求体内容哈希合并时间上重叠的同一请求：保证同一键只产生一次上游调用，
//! 所有等待者收到字节一致的响应。完成态条目在短TTL内缓存，供客户端重试复用。
//!
//! 状态机（按键）：
//! - 缺失 -> 进行中：首个调用方注册；并发调用方挂到同一句柄等待
//! - 进行中 -> 完成：主调用方写入最终响应，等待者被原子唤醒
//! - 进行中 -> 缺失：主调用方在完成前断开，等待者被唤醒后重新竞争
//! - 完成 -> 缺失：TTL到期

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::DedupConfig;
use crate::logging::{LogComponent, LogStage};
use crate::ldebug;

/// 回放用的逐跳请求头黑名单：这些头描述单次连接的传输形态，不能缓存
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "transfer-encoding",
    "connection",
    "content-encoding",
    "content-length",
    "keep-alive",
    "te",
    "trailer",
    "upgrade",
];

/// 判断是否为逐跳响应头（缓存与转发时都要剔除）
#[must_use]
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.to_ascii_lowercase().as_str())
}

/// 缓存的完成态响应
#[derive(Debug)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

type ResultChannel = watch::Receiver<Option<Arc<CachedResponse>>>;

#[derive(Debug)]
enum EntryState {
    /// 主调用方执行中；等待者经 watch 通道取结果
    Inflight { rx: ResultChannel },
    /// 已完成，TTL 内回放
    Completed {
        response: Arc<CachedResponse>,
        expires_at: Instant,
    },
}

/// `acquire` 的结果
pub enum DedupOutcome {
    /// 本调用方为主：执行请求，结束后必须 complete 或丢弃守卫
    Primary(DedupGuard),
    /// 命中缓存或等到了主调用方的结果：直接回放
    Replay(Arc<CachedResponse>),
}

/// 请求去重器
#[derive(Debug)]
pub struct Deduplicator {
    entries: Arc<Mutex<HashMap<String, EntryState>>>,
    ttl: Duration,
    max_cached_body_bytes: usize,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Deduplicator {
    #[must_use]
    pub fn new(config: &DedupConfig) -> Arc<Self> {
        let dedup = Arc::new(Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl: Duration::from_millis(config.ttl_ms),
            max_cached_body_bytes: config.max_cached_body_bytes,
            sweeper: Mutex::new(None),
        });

        // 惰性过期之外的兜底清扫，防止一次性键堆积
        let entries = Arc::clone(&dedup.entries);
        let interval = Duration::from_millis(config.ttl_ms.max(1_000));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let now = Instant::now();
                entries.lock().expect("去重表锁").retain(|_, state| match state {
                    EntryState::Inflight { .. } => true,
                    EntryState::Completed { expires_at, .. } => *expires_at > now,
                });
            }
        });
        *dedup.sweeper.lock().expect("清扫句柄锁") = Some(handle);
        dedup
    }

    /// 请求体内容哈希（原始字节，网关改写之前）
    #[must_use]
    pub fn key_for(body: &[u8]) -> String {
        use std::fmt::Write as _;

        let digest = Sha256::digest(body);
        let mut out = String::with_capacity(64);
        for byte in digest {
            let _ = write!(out, "{byte:02x}");
        }
        out
    }

    /// 注册或挂接到一个键
    ///
    /// 返回 `Primary` 时调用方持有执行权；返回 `Replay` 时直接回放缓存字节。
    pub async fn acquire(self: &Arc<Self>, key: &str) -> DedupOutcome {
        loop {
            let waiter: ResultChannel = {
                let mut map = self.entries.lock().expect("去重表锁");
                match map.get(key) {
                    Some(EntryState::Completed { response, expires_at }) => {
                        if *expires_at > Instant::now() {
                            return DedupOutcome::Replay(Arc::clone(response));
                        }
                        map.remove(key);
                        return DedupOutcome::Primary(self.insert_inflight(&mut map, key));
                    }
                    Some(EntryState::Inflight { rx }) => rx.clone(),
                    None => {
                        return DedupOutcome::Primary(self.insert_inflight(&mut map, key));
                    }
                }
            };

            // 进行中：等主调用方发布结果或放弃
            let mut rx = waiter;
            let _ = rx.changed().await;
            let delivered = rx.borrow().clone();
            if let Some(response) = delivered {
                return DedupOutcome::Replay(response);
            }
            // 主调用方中止（发送端丢弃且未发布结果）：重新竞争该键
        }
    }

    fn insert_inflight(
        self: &Arc<Self>,
        map: &mut HashMap<String, EntryState>,
        key: &str,
    ) -> DedupGuard {
        let (tx, rx) = watch::channel(None);
        map.insert(key.to_string(), EntryState::Inflight { rx });
        DedupGuard {
            dedup: Arc::clone(self),
            key: key.to_string(),
            tx: Some(tx),
        }
    }

    /// 当前条目数（测试用）
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("去重表锁").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 停止清扫任务
    pub fn close(&self) {
        if let Some(handle) = self.sweeper.lock().expect("清扫句柄锁").take() {
            handle.abort();
        }
    }
}

impl Drop for Deduplicator {
    fn drop(&mut self) {
        self.close();
    }
}

/// 主调用方的执行权守卫
///
/// `complete` 发布最终响应并唤醒全部等待者；未完成即丢弃时，
/// 进行中条目被清除，等待者重新竞争（支持断开后重试）。
#[derive(Debug)]
pub struct DedupGuard {
    dedup: Arc<Deduplicator>,
    key: String,
    tx: Option<watch::Sender<Option<Arc<CachedResponse>>>>,
}

impl DedupGuard {
    /// 发布最终响应
    ///
    /// 逐跳响应头在此剥除；超过缓存上限的响应体仍然交付给等待者，
    /// 但不保留完成态条目。
    pub fn complete(mut self, status: u16, headers: Vec<(String, String)>, body: Bytes) {
        let headers: Vec<(String, String)> = headers
            .into_iter()
            .filter(|(name, _)| !is_hop_by_hop(name))
            .collect();
        let response = Arc::new(CachedResponse {
            status,
            headers,
            body,
        });

        let mut map = self.dedup.entries.lock().expect("去重表锁");
        if response.body.len() <= self.dedup.max_cached_body_bytes {
            map.insert(
                self.key.clone(),
                EntryState::Completed {
                    response: Arc::clone(&response),
                    expires_at: Instant::now() + self.dedup.ttl,
                },
            );
        } else {
            map.remove(&self.key);
            ldebug!(
                "system",
                LogStage::Cache,
                LogComponent::Dedup,
                "oversized_skip",
                "响应体超过缓存上限，仅交付不保留",
                bytes = response.body.len()
            );
        }
        // 在持锁期间发布，保证完成态写入与唤醒对等待者原子可见
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Some(response));
        }
        drop(map);
    }
}

impl Drop for DedupGuard {
    fn drop(&mut self) {
        // complete 已取走发送端；仍持有说明主调用方中止
        if self.tx.take().is_some() {
            let mut map = self.dedup.entries.lock().expect("去重表锁");
            if let Some(EntryState::Inflight { .. }) = map.get(&self.key) {
                map.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_dedup(ttl_ms: u64) -> Arc<Deduplicator> {
        Deduplicator::new(&DedupConfig {
            ttl_ms,
            max_cached_body_bytes: 1024,
        })
    }

    #[tokio::test]
    async fn primary_then_replay() {
        let dedup = test_dedup(60_000);
        let key = Deduplicator::key_for(b"{\"model\":\"auto\"}");

        let DedupOutcome::Primary(guard) = dedup.acquire(&key).await else {
            panic!("首个调用方应为主");
        };
        guard.complete(200, vec![("content-type".to_string(), "application/json".to_string())], Bytes::from_static(b"{}"));

        match dedup.acquire(&key).await {
            DedupOutcome::Replay(cached) => {
                assert_eq!(cached.status, 200);
                assert_eq!(cached.body.as_ref(), b"{}");
            }
            DedupOutcome::Primary(_) => panic!("TTL内应回放"),
        }
    }

    #[tokio::test]
    async fn waiter_receives_primary_result() {
        let dedup = test_dedup(60_000);
        let key = Deduplicator::key_for(b"body");

        let DedupOutcome::Primary(guard) = dedup.acquire(&key).await else {
            panic!("应为主");
        };

        let dedup2 = Arc::clone(&dedup);
        let key2 = key.clone();
        let waiter = tokio::spawn(async move { dedup2.acquire(&key2).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        guard.complete(200, vec![], Bytes::from_static(b"result"));

        match waiter.await.unwrap() {
            DedupOutcome::Replay(cached) => assert_eq!(cached.body.as_ref(), b"result"),
            DedupOutcome::Primary(_) => panic!("等待者应收到回放"),
        }
    }

    #[tokio::test]
    async fn aborted_primary_lets_waiter_take_over() {
        let dedup = test_dedup(60_000);
        let key = Deduplicator::key_for(b"body");

        let DedupOutcome::Primary(guard) = dedup.acquire(&key).await else {
            panic!("应为主");
        };

        let dedup2 = Arc::clone(&dedup);
        let key2 = key.clone();
        let waiter = tokio::spawn(async move { dedup2.acquire(&key2).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);

        match waiter.await.unwrap() {
            DedupOutcome::Primary(_) => {}
            DedupOutcome::Replay(_) => panic!("主中止后等待者应接管"),
        }
    }

    #[tokio::test]
    async fn completed_entry_expires() {
        let dedup = test_dedup(10);
        let key = Deduplicator::key_for(b"body");
        let DedupOutcome::Primary(guard) = dedup.acquire(&key).await else {
            panic!("应为主");
        };
        guard.complete(200, vec![], Bytes::from_static(b"x"));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(matches!(dedup.acquire(&key).await, DedupOutcome::Primary(_)));
    }

    #[tokio::test]
    async fn hop_by_hop_headers_stripped() {
        let dedup = test_dedup(60_000);
        let key = Deduplicator::key_for(b"body");
        let DedupOutcome::Primary(guard) = dedup.acquire(&key).await else {
            panic!("应为主");
        };
        guard.complete(
            200,
            vec![
                ("Transfer-Encoding".to_string(), "chunked".to_string()),
                ("content-type".to_string(), "application/json".to_string()),
                ("Connection".to_string(), "keep-alive".to_string()),
            ],
            Bytes::from_static(b"{}"),
        );
        let DedupOutcome::Replay(cached) = dedup.acquire(&key).await else {
            panic!("应回放");
        };
        assert_eq!(cached.headers.len(), 1);
        assert_eq!(cached.headers[0].0, "content-type");
    }

    #[tokio::test]
    async fn oversized_body_delivered_but_not_retained() {
        let dedup = test_dedup(60_000);
        let key = Deduplicator::key_for(b"body");
        let DedupOutcome::Primary(guard) = dedup.acquire(&key).await else {
            panic!("应为主");
        };

        let dedup2 = Arc::clone(&dedup);
        let key2 = key.clone();
        let waiter = tokio::spawn(async move { dedup2.acquire(&key2).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        guard.complete(200, vec![], Bytes::from(vec![0u8; 4096]));

        // 等待者仍收到完整结果
        match waiter.await.unwrap() {
            DedupOutcome::Replay(cached) => assert_eq!(cached.body.len(), 4096),
            DedupOutcome::Primary(_) => panic!("等待者应收到回放"),
        }
        // 但条目未保留，后续请求需要重新执行
        assert!(matches!(dedup.acquire(&key).await, DedupOutcome::Primary(_)));
    }

    #[test]
    fn key_is_stable_hex_sha256() {
        let key = Deduplicator::key_for(b"hello");
        assert_eq!(key.len(), 64);
        assert_eq!(key, Deduplicator::key_for(b"hello"));
        assert_ne!(key, Deduplicator::key_for(b"hello!"));
    }
}
