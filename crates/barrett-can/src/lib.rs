//! # Barrett CAN Layer
//!
//! CAN 硬件抽象层与 Puck 总线管理。
//!
//! - [`CanAdapter`]: 原始帧收发（SocketCAN / 仿真网络）
//! - [`CommunicationsBus`]: 上层使用的总线能力（按总线 ID 收发 + 事务锁）
//! - [`BusManager`]: 在 `CanAdapter` 之上按总线 ID 分拣应答的 `CommunicationsBus` 实现

use parking_lot::ReentrantMutex;
use std::time::Duration;
use thiserror::Error;

pub use barrett_protocol::BarrettFrame;

mod bus_manager;
pub use bus_manager::{BusConfig, BusManager};

#[cfg(target_os = "linux")]
pub mod socketcan;

#[cfg(target_os = "linux")]
pub use socketcan::SocketCanAdapter;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

/// CAN 适配层统一错误类型
#[derive(Error, Debug)]
pub enum CanError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] CanDeviceError),
    #[error("Read timeout")]
    Timeout,
    #[error("Buffer overflow")]
    BufferOverflow,
    #[error("Bus off")]
    BusOff,
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanDeviceErrorKind {
    Unknown,
    NotFound,
    InvalidFrame,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct CanDeviceError {
    pub kind: CanDeviceErrorKind,
    pub message: String,
}

impl CanDeviceError {
    pub fn new(kind: CanDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind == CanDeviceErrorKind::NotFound
    }
}

impl From<String> for CanDeviceError {
    fn from(message: String) -> Self {
        Self::new(CanDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for CanDeviceError {
    fn from(message: &str) -> Self {
        Self::new(CanDeviceErrorKind::Unknown, message)
    }
}

/// 原始 CAN 帧收发
pub trait CanAdapter {
    fn send(&mut self, frame: BarrettFrame) -> Result<(), CanError>;
    fn receive(&mut self) -> Result<BarrettFrame, CanError>;
    fn set_receive_timeout(&mut self, _timeout: Duration) {}
    fn receive_timeout(&mut self, timeout: Duration) -> Result<BarrettFrame, CanError> {
        self.set_receive_timeout(timeout);
        self.receive()
    }
    fn try_receive(&mut self) -> Result<Option<BarrettFrame>, CanError> {
        match self.receive_timeout(Duration::ZERO) {
            Ok(frame) => Ok(Some(frame)),
            Err(CanError::Timeout) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// 总线通信能力
///
/// 所有总线访问都由一把可重入的事务锁串行化：`send`/`receive` 内部都会获取它，
/// 调用方也可以通过 [`mutex`](Self::mutex) 持有它，把多步操作组合成一个不可打断的事务
/// （例如逐个写入多个 Puck 的位置寄存器时，避免控制线程的读取插入其中）。
pub trait CommunicationsBus: Send + Sync {
    /// 事务锁
    fn mutex(&self) -> &ReentrantMutex<()>;

    /// 发送消息到总线 ID（`data` 最多 8 字节）
    fn send(&self, bus_id: u32, data: &[u8]) -> Result<(), CanError>;

    /// 接收发往 `expected_bus_id` 的消息
    ///
    /// # 返回
    ///
    /// - `Ok(Some(frame))`: 收到消息
    /// - `Ok(None)`: 非阻塞模式下暂无消息
    /// - `Err(CanError::Timeout)`: 阻塞模式下超过总线超时时间仍未收到
    ///
    /// `realtime` 为 `true` 时使用较短的实时超时，保证控制周期内的最坏延迟有界。
    fn receive(
        &self,
        expected_bus_id: u32,
        blocking: bool,
        realtime: bool,
    ) -> Result<Option<BarrettFrame>, CanError>;
}
