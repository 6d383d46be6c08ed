//! 内存实现
//!
//! 单 topic 的进程内通道，投递状态可供测试检查

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use kit_errors::{AppError, AppResult};
use tokio::sync::mpsc;

use crate::{Message, Publisher, Subscriber};

/// 一次投递的 ack/nack 记录
#[derive(Debug, Default)]
pub struct DeliveryState {
    acked: AtomicBool,
    nacked: AtomicBool,
}

impl DeliveryState {
    pub fn is_acked(&self) -> bool {
        self.acked.load(Ordering::SeqCst)
    }

    pub fn is_nacked(&self) -> bool {
        self.nacked.load(Ordering::SeqCst)
    }
}

/// 内存消息
pub struct MemoryMessage {
    data: Vec<u8>,
    state: Arc<DeliveryState>,
}

impl Message for MemoryMessage {
    fn data(&self) -> &[u8] {
        &self.data
    }

    fn ack(&self) {
        self.state.acked.store(true, Ordering::SeqCst);
    }

    fn nack(&self) {
        self.state.nacked.store(true, Ordering::SeqCst);
    }
}

/// 内存发布者
pub struct MemoryPublisher {
    tx: mpsc::Sender<Box<dyn Message>>,
    deliveries: Mutex<Vec<Arc<DeliveryState>>>,
}

impl MemoryPublisher {
    /// 已发布消息的投递记录，按发布顺序排列
    pub fn deliveries(&self) -> Vec<Arc<DeliveryState>> {
        self.deliveries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, data: Vec<u8>) -> AppResult<()> {
        let state = Arc::new(DeliveryState::default());
        let msg = MemoryMessage {
            data,
            state: state.clone(),
        };
        self.tx
            .send(Box::new(msg))
            .await
            .map_err(|_| AppError::external_service("subscriber closed"))?;
        self.deliveries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(state);
        Ok(())
    }
}

/// 内存订阅者，消息流只能取走一次
pub struct MemorySubscriber {
    rx: Mutex<Option<mpsc::Receiver<Box<dyn Message>>>>,
}

#[async_trait]
impl Subscriber for MemorySubscriber {
    async fn subscribe(&self) -> AppResult<mpsc::Receiver<Box<dyn Message>>> {
        self.rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| AppError::internal("memory subscriber already consumed"))
    }
}

/// 建立一对内存 publisher/subscriber
pub fn channel(capacity: usize) -> (MemoryPublisher, MemorySubscriber) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        MemoryPublisher {
            tx,
            deliveries: Mutex::new(Vec::new()),
        },
        MemorySubscriber {
            rx: Mutex::new(Some(rx)),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe_roundtrip() {
        let (publisher, subscriber) = channel(8);
        publisher.publish(b"hello".to_vec()).await.unwrap();

        let mut stream = subscriber.subscribe().await.unwrap();
        let msg = stream.recv().await.unwrap();
        assert_eq!(msg.data(), b"hello");

        msg.ack();
        let deliveries = publisher.deliveries();
        assert!(deliveries[0].is_acked());
        assert!(!deliveries[0].is_nacked());
    }

    #[tokio::test]
    async fn test_nack_recorded() {
        let (publisher, subscriber) = channel(8);
        publisher.publish(b"retry me".to_vec()).await.unwrap();

        let mut stream = subscriber.subscribe().await.unwrap();
        let msg = stream.recv().await.unwrap();
        msg.nack();
        assert!(publisher.deliveries()[0].is_nacked());
    }

    #[tokio::test]
    async fn test_subscribe_twice_fails() {
        let (_publisher, subscriber) = channel(1);
        subscriber.subscribe().await.unwrap();
        assert!(subscriber.subscribe().await.is_err());
    }

    #[tokio::test]
    async fn test_publish_after_subscriber_dropped() {
        let (publisher, subscriber) = channel(1);
        drop(subscriber.subscribe().await.unwrap());
        let err = publisher.publish(b"x".to_vec()).await.unwrap_err();
        assert!(matches!(err, AppError::ExternalService(_)));
    }
}
