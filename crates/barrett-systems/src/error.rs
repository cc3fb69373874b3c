//! 数据流图与执行管理器的错误类型

use barrett_driver::DriverError;
use thiserror::Error;

/// 图结构操作错误
///
/// 都是调用方的前置条件错误，不会被重试。
/// 两个不同执行管理器的混用不在此列，它会直接 `panic!`。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// 输入端口已连接（先 `disconnect` 或改用 `reconnect`）
    #[error("Input is already connected; disconnect it or use reconnect()")]
    AlreadyConnected,

    /// 输入端口未连接
    #[error("Input is not connected")]
    NotConnected,

    /// 连接或委托无效
    #[error("Invalid connection: {0}")]
    InvalidConnection(String),
}

/// 系统运行错误
#[derive(Error, Debug)]
pub enum SystemError {
    /// `operate()` 读取了未定义的输入
    #[error("Input of system '{system}' is undefined")]
    UndefinedInput { system: String },

    /// 图结构错误
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// 底层关节 I/O 错误
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// 执行管理器处于错误状态
    #[error("Execution manager is in the error state ({0}); call clear_error() first")]
    ErrorState(String),

    /// 系统自定义的运行错误
    #[error("operate() failed: {0}")]
    Operate(String),

    /// 控制周期内发生 panic
    #[error("Control loop panicked: {0}")]
    Panic(String),

    /// 参数无效
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// 无法创建控制线程
    #[error("Failed to spawn control thread: {0}")]
    Spawn(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_display() {
        assert_eq!(
            ConnectionError::NotConnected.to_string(),
            "Input is not connected"
        );
        let e = ConnectionError::InvalidConnection("delegation cycle".into());
        assert!(e.to_string().contains("delegation cycle"));
    }

    #[test]
    fn test_error_conversion() {
        let e: SystemError = ConnectionError::AlreadyConnected.into();
        assert!(matches!(
            e,
            SystemError::Connection(ConnectionError::AlreadyConnected)
        ));

        let e: SystemError = DriverError::Timeout.into();
        assert!(matches!(e, SystemError::Driver(DriverError::Timeout)));
        assert!(e.to_string().starts_with("Driver error"));
    }

    #[test]
    fn test_error_state_message() {
        let e = SystemError::ErrorState("bus off".into());
        let msg = e.to_string();
        assert!(msg.contains("bus off"));
        assert!(msg.contains("clear_error"));
    }
}
