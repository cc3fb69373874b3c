//! SocketCAN CAN 适配器实现
//!
//! 基于 Linux SocketCAN 子系统。Puck 总线只使用 11-bit 标准帧，
//! 收到的扩展帧与远程帧会被丢弃，错误帧转换为 [`CanError`]。
//!
//! ## 限制
//!
//! - **仅限 Linux 平台**
//! - **接口配置**：波特率由系统工具配置（`ip link set can0 type can bitrate 1000000`）
//! - **权限要求**：可能需要 `dialout` 组权限或 `sudo`

use crate::{BarrettFrame, CanAdapter, CanDeviceError, CanDeviceErrorKind, CanError};
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use socketcan::{
    BlockingCan, CanError as SocketCanError, CanErrorFrame, CanFrame, CanSocket, EmbeddedFrame,
    Frame, Socket, StandardId,
};
use std::os::fd::BorrowedFd;
use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant};
use tracing::{error, trace, warn};

/// SocketCAN 适配器
///
/// # 示例
///
/// ```no_run
/// use barrett_can::{BusManager, BusConfig, SocketCanAdapter};
///
/// let adapter = SocketCanAdapter::new("can0").unwrap();
/// let bus = BusManager::with_config(adapter, BusConfig::default());
/// ```
#[derive(Debug)]
pub struct SocketCanAdapter {
    socket: CanSocket,
    interface: String,
    read_timeout: Duration,
}

impl SocketCanAdapter {
    /// 打开 CAN 接口
    ///
    /// # 错误
    /// - `CanError::Device`: 接口不存在或无法打开
    /// - `CanError::Io`: 设置超时失败
    pub fn new(interface: impl Into<String>) -> Result<Self, CanError> {
        let interface = interface.into();

        let socket = CanSocket::open(&interface).map_err(|e| {
            CanError::Device(CanDeviceError::new(
                CanDeviceErrorKind::NotFound,
                format!(
                    "Failed to open CAN interface '{}': {}. Is it up? Try:\n  sudo ip link set up {}",
                    interface, e, interface
                ),
            ))
        })?;

        let read_timeout = Duration::from_millis(2);
        socket.set_read_timeout(read_timeout).map_err(CanError::Io)?;

        trace!("SocketCAN interface '{}' opened", interface);
        Ok(Self {
            socket,
            interface,
            read_timeout,
        })
    }

    /// 获取接口名称
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// 获取读超时时间
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    fn wait_readable(&self, timeout: Duration) -> Result<bool, CanError> {
        let fd = self.socket.as_raw_fd();
        let pollfd = PollFd::new(unsafe { BorrowedFd::borrow_raw(fd) }, PollFlags::POLLIN);
        let timeout_ms = timeout.as_millis().min(u16::MAX as u128) as u16;
        match poll(&mut [pollfd], PollTimeout::from(timeout_ms)) {
            Ok(0) => Ok(false),
            Ok(_) => Ok(true),
            Err(e) => Err(CanError::Io(std::io::Error::other(format!(
                "poll failed: {}",
                e
            )))),
        }
    }

    /// 错误帧 → `CanError`；可忽略的错误返回 `None`
    fn classify_error_frame(frame: CanFrame) -> Option<CanError> {
        let Ok(error_frame) = CanErrorFrame::try_from(frame) else {
            warn!("Received CAN error frame but failed to parse, ignoring");
            return None;
        };
        let socketcan_error = SocketCanError::from(error_frame);
        match &socketcan_error {
            SocketCanError::BusOff => {
                error!("CAN Bus Off error detected");
                Some(CanError::BusOff)
            },
            SocketCanError::ControllerProblem(problem) => {
                let problem_str = format!("{}", problem);
                if problem_str.to_lowercase().contains("overflow") {
                    error!("CAN Buffer Overflow detected: {}", problem);
                    Some(CanError::BufferOverflow)
                } else {
                    warn!("CAN Controller Problem: {}, ignoring", problem);
                    None
                }
            },
            _ => {
                warn!("CAN Error Frame received: {}, ignoring", socketcan_error);
                None
            },
        }
    }
}

impl CanAdapter for SocketCanAdapter {
    fn send(&mut self, frame: BarrettFrame) -> Result<(), CanError> {
        let can_frame = StandardId::new(frame.id as u16)
            .and_then(|id| CanFrame::new(id, frame.data_slice()))
            .ok_or_else(|| {
                CanError::Device(CanDeviceError::new(
                    CanDeviceErrorKind::InvalidFrame,
                    format!("Failed to create standard frame with ID 0x{:X}", frame.id),
                ))
            })?;

        self.socket.transmit(&can_frame).map_err(|e| {
            CanError::Io(std::io::Error::other(format!(
                "SocketCAN transmit error: {}",
                e
            )))
        })?;

        trace!("Sent CAN frame: ID=0x{:03X}, len={}", frame.id, frame.len);
        Ok(())
    }

    /// 接收一个标准数据帧（阻塞到读超时）
    fn receive(&mut self) -> Result<BarrettFrame, CanError> {
        let deadline = Instant::now() + self.read_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !self.wait_readable(remaining)? {
                return Err(CanError::Timeout);
            }

            let can_frame = self.socket.read_frame().map_err(CanError::Io)?;

            if can_frame.is_error_frame() {
                match Self::classify_error_frame(can_frame) {
                    Some(err) => return Err(err),
                    None => continue,
                }
            }
            if can_frame.is_extended() || can_frame.is_remote_frame() {
                trace!("Ignoring non-standard CAN frame: ID=0x{:X}", can_frame.raw_id());
                continue;
            }

            let frame = BarrettFrame::new(can_frame.raw_id(), can_frame.data());
            trace!("Received CAN frame: ID=0x{:03X}, len={}", frame.id, frame.len);
            return Ok(frame);
        }
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    fn receive_timeout(&mut self, timeout: Duration) -> Result<BarrettFrame, CanError> {
        let old_timeout = self.read_timeout;
        self.read_timeout = timeout;
        let result = self.receive();
        self.read_timeout = old_timeout;
        result
    }
}

impl Drop for SocketCanAdapter {
    fn drop(&mut self) {
        trace!("[Auto-Drop] SocketCAN interface '{}' closed", self.interface);
    }
}
