//! # SSE 流式写出
//!
//! 心跳任务与合成任务共用一个写出端：帧级互斥保证心跳绝不插入半个数据帧，
//! 也绝不出现在首个数据帧之后。全部写出字节同时留存，供去重缓存回放。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use super::response_transform::HEARTBEAT_FRAME;

/// SSE 写出端
///
/// 一个请求一个实例：`send_frame` 写数据帧并关闭后续心跳，
/// `send_heartbeat` 仅在负载尚未开始时写心跳帧。
#[derive(Debug)]
pub struct SseWriter {
    tx: mpsc::Sender<Bytes>,
    /// 帧写出互斥：持有期间写捕获区并投递通道
    write_lock: Mutex<()>,
    /// 已写出首个负载帧后心跳停止
    payload_written: AtomicBool,
    /// 写出字节的完整捕获（去重缓存回放用）
    captured: std::sync::Mutex<Vec<u8>>,
}

impl SseWriter {
    /// 创建写出端与配套的响应体
    #[must_use]
    pub fn channel() -> (Arc<Self>, axum::body::Body) {
        let (tx, rx) = mpsc::channel::<Bytes>(32);
        let stream = ReceiverStream::new(rx).map(Ok::<_, std::convert::Infallible>);
        let body = axum::body::Body::from_stream(stream);
        (
            Arc::new(Self {
                tx,
                write_lock: Mutex::new(()),
                payload_written: AtomicBool::new(false),
                captured: std::sync::Mutex::new(Vec::new()),
            }),
            body,
        )
    }

    /// 写一个完整数据帧；返回 false 表示客户端已断开
    pub async fn send_frame(&self, frame: &str) -> bool {
        let _guard = self.write_lock.lock().await;
        self.payload_written.store(true, Ordering::SeqCst);
        self.captured
            .lock()
            .expect("捕获区锁")
            .extend_from_slice(frame.as_bytes());
        self.tx
            .send(Bytes::from(frame.as_bytes().to_vec()))
            .await
            .is_ok()
    }

    /// 写一个心跳帧；负载已开始时为空操作。返回 false 表示客户端已断开
    pub async fn send_heartbeat(&self) -> bool {
        let _guard = self.write_lock.lock().await;
        if self.payload_written.load(Ordering::SeqCst) {
            return true;
        }
        self.captured
            .lock()
            .expect("捕获区锁")
            .extend_from_slice(HEARTBEAT_FRAME.as_bytes());
        self.tx
            .send(Bytes::from_static(HEARTBEAT_FRAME.as_bytes()))
            .await
            .is_ok()
    }

    /// 已写出的全部字节
    #[must_use]
    pub fn captured_bytes(&self) -> Bytes {
        Bytes::from(self.captured.lock().expect("捕获区锁").clone())
    }

    /// 客户端断开（响应体接收端被丢弃）时完成
    pub async fn closed(&self) {
        self.tx.closed().await;
    }
}

/// 启动周期心跳任务
///
/// 首个心跳立即写出（流式前导），随后按间隔写出，直到负载开始或客户端断开。
#[must_use]
pub fn spawn_heartbeat(writer: Arc<SseWriter>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        if !writer.send_heartbeat().await {
            return;
        }
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // 首个tick立即到期，跳过
        loop {
            ticker.tick().await;
            if writer.payload_written.load(Ordering::SeqCst) {
                return;
            }
            if !writer.send_heartbeat().await {
                return;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn heartbeat_precedes_payload_and_stops_after() {
        let (writer, body) = SseWriter::channel();

        assert!(writer.send_heartbeat().await);
        assert!(writer.send_frame("data: {}\n\n").await);
        // 负载之后的心跳是空操作
        assert!(writer.send_heartbeat().await);

        let captured = writer.captured_bytes();
        let text = String::from_utf8(captured.to_vec()).unwrap();
        assert!(text.starts_with(": heartbeat\n\n"));
        assert!(text.ends_with("data: {}\n\n"));
        assert_eq!(text.matches(": heartbeat").count(), 1);

        // 响应体与捕获一致
        drop(writer);
        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(collected, captured);
    }

    #[tokio::test]
    async fn send_fails_after_client_disconnect() {
        let (writer, body) = SseWriter::channel();
        drop(body);
        assert!(!writer.send_frame("data: x\n\n").await);
    }

    #[tokio::test]
    async fn heartbeat_task_emits_immediately() {
        let (writer, _body) = SseWriter::channel();
        let handle = spawn_heartbeat(Arc::clone(&writer), Duration::from_secs(30));
        tokio::time::sleep(Duration::from_millis(50)).await;
        let text = String::from_utf8(writer.captured_bytes().to_vec()).unwrap();
        assert!(text.contains(": heartbeat\n\n"));
        handle.abort();
    }
}
