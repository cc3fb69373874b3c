//! # Barrett Protocol
//!
//! WAM 机械臂 Puck CAN 总线协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `ids`: 节点 ID / 总线 ID 换算与广播组常量
//! - `property`: 属性枚举与按 Puck 类型划分的属性 ID 表
//! - `role`: ROLE 寄存器位域
//! - `codec`: 请求帧构建与应答帧解析（标准应答、打包位置、打包力矩）
//!
//! ## 字节序
//!
//! 属性值使用 Intel（LSB 低位在前）小端字节序；
//! 打包位置/力矩帧按位拼接，高位在前。

pub mod codec;
pub mod ids;
pub mod property;
pub mod role;

// 重新导出常用类型
pub use codec::*;
pub use ids::*;
pub use property::*;
pub use role::*;

use thiserror::Error;

/// CAN 总线上的单个消息帧
///
/// `BarrettFrame` 是协议层和硬件层之间的中间抽象：
/// 协议层只构建/解析 `BarrettFrame`，CAN 层负责与 SocketCAN 等后端互转。
///
/// Puck 总线只使用 11-bit 标准帧，因此这里不区分扩展帧。
///
/// # 示例
///
/// ```rust
/// use barrett_protocol::BarrettFrame;
///
/// let frame = BarrettFrame::new(0x003, &[5]);
/// assert_eq!(frame.id(), 0x003);
/// assert_eq!(frame.data_slice(), &[5]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BarrettFrame {
    /// 总线 ID（11-bit）
    pub id: u32,

    /// 帧数据（固定 8 字节，未使用部分为 0）
    pub data: [u8; 8],

    /// 有效数据长度 (0-8)
    pub len: u8,

    /// 接收时间戳（微秒），0 表示不可用
    pub timestamp_us: u64,
}

impl BarrettFrame {
    /// 最大负载长度
    pub const MAX_LEN: usize = 8;

    /// 创建帧，超过 8 字节的部分被截断
    pub fn new(id: u32, data: &[u8]) -> Self {
        let mut fixed_data = [0u8; 8];
        let len = data.len().min(Self::MAX_LEN);
        fixed_data[..len].copy_from_slice(&data[..len]);

        Self {
            id,
            data: fixed_data,
            len: len as u8,
            timestamp_us: 0,
        }
    }

    /// 获取数据切片（只包含有效数据）
    pub fn data_slice(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// 获取总线 ID
    pub fn id(&self) -> u32 {
        self.id
    }
}

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: &'static str, actual: usize },

    #[error("Expected SET command, got GET request (byte 0 = 0x{byte:02X})")]
    InvalidCommandBit { byte: u8 },

    #[error("Expected property {expected}, got property {actual}")]
    PropertyMismatch { expected: u8, actual: u8 },

    #[error("Expected second data byte to be 0, got value of {value}")]
    ReservedByteNotZero { value: u8 },

    #[error("Property {property} is not defined for {puck_type} Pucks")]
    UnknownProperty {
        property: &'static str,
        puck_type: &'static str,
    },

    #[error("Too many torques for one packed message: {count} (max 4)")]
    TooManyTorques { count: usize },

    #[error("Invalid node ID: {id}")]
    InvalidNodeId { id: u32 },

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: &'static str, value: i32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_truncates_long_payload() {
        let frame = BarrettFrame::new(0x21, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        assert_eq!(frame.len, 8);
        assert_eq!(frame.data_slice(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_frame_zero_fills_unused_bytes() {
        let frame = BarrettFrame::new(0x21, &[0xAA]);
        assert_eq!(frame.data, [0xAA, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(frame.timestamp_us, 0);
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::PropertyMismatch {
            expected: 5,
            actual: 8,
        };
        assert_eq!(format!("{}", err), "Expected property 5, got property 8");

        let err = ProtocolError::InvalidLength {
            expected: "4 or 6",
            actual: 3,
        };
        assert!(format!("{}", err).contains("Invalid frame length"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_frame_serde() {
        let frame = BarrettFrame::new(0x0C3, &[0x80 | 5, 0, 2, 0]);
        let json = serde_json::to_string(&frame).unwrap();
        let back: BarrettFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(frame, back);
    }
}
