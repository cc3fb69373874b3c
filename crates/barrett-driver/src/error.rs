//! 驱动层错误类型定义

use barrett_can::CanError;
use barrett_protocol::{Property, ProtocolError};
use thiserror::Error;

/// 驱动层错误类型
///
/// 配置类错误（矩阵奇异、Puck 数量不符、力矩组不足）只会在构造时出现，
/// 传输类错误（`Can` / `Protocol`）会在每个控制周期向上传播，由执行管理器决定是否停机。
#[derive(Error, Debug)]
pub enum DriverError {
    /// CAN 驱动错误
    #[error("CAN driver error: {0}")]
    Can(#[from] CanError),

    /// 协议解析错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 配置无效
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Puck 数量与自由度不符
    #[error("Expected {expected} Pucks, got {actual}")]
    WrongPuckCount { expected: usize, actual: usize },

    /// j2mp 不可逆
    #[error("j2mp is singular")]
    SingularTransform,

    /// 力矩组 ID 不足
    #[error("Too few torque group IDs: need {needed}, got {provided}")]
    TooFewTorqueGroups { needed: usize, provided: usize },

    /// 组内 Puck 对同一属性的 ID 不一致
    #[error("Pucks have incompatible property lists for {property}")]
    IncompatibleProperty { property: Property },

    /// 安全模块返回了未知模式
    #[error("Invalid safety mode: {0}")]
    InvalidSafetyMode(i32),

    /// STAT 寄存器值无效
    #[error("Bad STAT value from Puck {id}: {value}")]
    BadStatus { id: u32, value: i32 },

    /// Puck 未能从 Monitor 固件中唤醒
    #[error("Failed to wake Puck {id}")]
    WakeFailed { id: u32 },

    /// 输入向量维度错误
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// 操作超时
    #[error("Operation timeout")]
    Timeout,

    /// 配置文件读取/解析失败
    #[error("Config file error: {0}")]
    ConfigFile(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_display() {
        // 测试 Can 错误
        let err = DriverError::Can(CanError::Timeout);
        assert!(format!("{}", err).contains("Read timeout"));

        // 测试 Protocol 错误
        let err = DriverError::Protocol(ProtocolError::ReservedByteNotZero { value: 3 });
        assert!(format!("{}", err).starts_with("Protocol error"));

        let err = DriverError::TooFewTorqueGroups {
            needed: 2,
            provided: 1,
        };
        assert_eq!(format!("{}", err), "Too few torque group IDs: need 2, got 1");

        let err = DriverError::IncompatibleProperty {
            property: Property::T,
        };
        assert!(format!("{}", err).contains("incompatible property lists"));
    }

    #[test]
    fn test_driver_error_from_conversions() {
        let err: DriverError = CanError::BusOff.into();
        assert!(matches!(err, DriverError::Can(CanError::BusOff)));

        let err: DriverError = ProtocolError::TooManyTorques { count: 5 }.into();
        assert!(matches!(err, DriverError::Protocol(_)));
    }
}
