//! kit-pubsub - 极简 publish/subscribe 接口
//!
//! 只定义边界 trait，传输实现由各后端 crate 提供。
//! 自带一个基于内存 channel 的实现，用于测试和本地开发。

use async_trait::async_trait;
use kit_errors::AppResult;
use tokio::sync::mpsc;

pub mod memory;

/// 一条待消费的消息
///
/// `ack`/`nack` 通知后端投递结果，只应调用其中一个、一次
pub trait Message: Send {
    /// 消息载荷
    fn data(&self) -> &[u8];

    /// 确认消费成功
    fn ack(&self);

    /// 拒绝，交回后端重投
    fn nack(&self);
}

/// 发布者：把一段数据发布到绑定的 topic
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, data: Vec<u8>) -> AppResult<()>;
}

/// 订阅者：产出一个消息流
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn subscribe(&self) -> AppResult<mpsc::Receiver<Box<dyn Message>>>;
}
