//! # 用量统计模块
//!
//! 路由决策与开销的即发即弃汇报。`emit` 永不阻塞请求路径、永不向其抛错：
//! 内存聚合同步更新，文件落盘交给后台任务，写失败吞掉并告警。

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::UsageConfig;
use crate::logging::{LogComponent, LogStage};
use crate::lwarn;
use crate::routing::Tier;

/// 单次完整请求的用量事件；每个成功完成的客户端请求恰好发射一次
#[derive(Debug, Clone, Serialize)]
pub struct UsageEvent {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub tier: Tier,
    pub cost_estimate: f64,
    pub baseline_cost: f64,
    pub savings: f64,
    pub latency_ms: u64,
    /// 实际发起的上游尝试次数（降级计数）
    pub attempts: usize,
}

/// `/stats` 返回的内存聚合
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub by_tier: BTreeMap<String, u64>,
    pub by_model: BTreeMap<String, u64>,
    pub total_cost_estimate: f64,
    pub total_baseline_cost: f64,
    pub mean_savings: f64,
    pub total_fallback_attempts: u64,
}

#[derive(Debug, Default)]
struct Aggregate {
    requests: u64,
    by_tier: BTreeMap<String, u64>,
    by_model: BTreeMap<String, u64>,
    total_cost: f64,
    total_baseline: f64,
    savings_sum: f64,
    fallback_attempts: u64,
}

/// 用量收集器
pub struct UsageCollector {
    tx: mpsc::UnboundedSender<UsageEvent>,
    aggregate: Arc<Mutex<Aggregate>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl UsageCollector {
    #[must_use]
    pub fn new(config: &UsageConfig) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<UsageEvent>();
        let dir = config.dir.clone();

        let writer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Some(dir) = &dir {
                    write_event(dir, &event).await;
                }
            }
        });

        Arc::new(Self {
            tx,
            aggregate: Arc::new(Mutex::new(Aggregate::default())),
            writer: Mutex::new(Some(writer)),
        })
    }

    /// 发射一个用量事件；即发即弃
    pub fn emit(&self, event: UsageEvent) {
        {
            let mut agg = self.aggregate.lock().expect("聚合锁");
            agg.requests += 1;
            *agg.by_tier.entry(event.tier.as_str().to_string()).or_default() += 1;
            *agg.by_model.entry(event.model.clone()).or_default() += 1;
            agg.total_cost += event.cost_estimate;
            agg.total_baseline += event.baseline_cost;
            agg.savings_sum += event.savings;
            agg.fallback_attempts += event.attempts as u64;
        }
        // 落盘失败与通道关闭都不回传错误
        let _ = self.tx.send(event);
    }

    /// 当前聚合快照
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let agg = self.aggregate.lock().expect("聚合锁");
        StatsSnapshot {
            requests: agg.requests,
            by_tier: agg.by_tier.clone(),
            by_model: agg.by_model.clone(),
            total_cost_estimate: agg.total_cost,
            total_baseline_cost: agg.total_baseline,
            mean_savings: if agg.requests == 0 {
                0.0
            } else {
                agg.savings_sum / agg.requests as f64
            },
            total_fallback_attempts: agg.fallback_attempts,
        }
    }

    /// 停止落盘任务
    pub fn close(&self) {
        if let Some(handle) = self.writer.lock().expect("落盘句柄锁").take() {
            handle.abort();
        }
    }
}

impl Drop for UsageCollector {
    fn drop(&mut self) {
        self.close();
    }
}

/// 把事件以JSONL追加到按天分割的文件
async fn write_event(dir: &PathBuf, event: &UsageEvent) {
    let filename = format!("usage-{}.jsonl", event.timestamp.format("%Y-%m-%d"));
    let path = dir.join(filename);

    let line = match serde_json::to_string(event) {
        Ok(json) => format!("{json}\n"),
        Err(e) => {
            lwarn!(
                "system",
                LogStage::Internal,
                LogComponent::Statistics,
                "serialize_failed",
                "用量事件序列化失败",
                error = %e
            );
            return;
        }
    };

    let result = async {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await
    }
    .await;

    if let Err(e) = result {
        lwarn!(
            "system",
            LogStage::Internal,
            LogComponent::Statistics,
            "write_failed",
            "用量日志写入失败，事件丢弃",
            path = %path.display(),
            error = %e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(model: &str, tier: Tier, cost: f64, baseline: f64) -> UsageEvent {
        UsageEvent {
            timestamp: Utc::now(),
            model: model.to_string(),
            tier,
            cost_estimate: cost,
            baseline_cost: baseline,
            savings: if baseline > 0.0 {
                (1.0 - cost / baseline).clamp(0.0, 1.0)
            } else {
                0.0
            },
            latency_ms: 42,
            attempts: 1,
        }
    }

    #[tokio::test]
    async fn aggregate_updates_synchronously() {
        let collector = UsageCollector::new(&UsageConfig::default());
        collector.emit(event("openai/gpt-4o-mini", Tier::Simple, 0.001, 0.01));
        collector.emit(event("openai/o3-mini", Tier::Reasoning, 0.02, 0.01));

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.requests, 2);
        assert_eq!(snapshot.by_tier.get("simple"), Some(&1));
        assert_eq!(snapshot.by_tier.get("reasoning"), Some(&1));
        assert_eq!(snapshot.by_model.get("openai/gpt-4o-mini"), Some(&1));
        assert!(snapshot.mean_savings > 0.0);
        collector.close();
    }

    #[tokio::test]
    async fn events_are_appended_to_daily_file() {
        let dir = tempfile::tempdir().unwrap();
        let collector = UsageCollector::new(&UsageConfig {
            dir: Some(dir.path().to_path_buf()),
        });
        collector.emit(event("openai/gpt-4o", Tier::Medium, 0.01, 0.02));

        // 等落盘任务消费
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let filename = format!("usage-{}.jsonl", Utc::now().format("%Y-%m-%d"));
        let content = std::fs::read_to_string(dir.path().join(filename)).unwrap();
        assert!(content.contains("openai/gpt-4o"));
        assert!(content.ends_with('\n'));
        collector.close();
    }
}
