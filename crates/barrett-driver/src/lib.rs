//! 驱动层模块
//!
//! 本模块提供 WAM 机械臂的低层关节 I/O，包括：
//! - Puck 事务端点（属性读写、唤醒）
//! - 广播组（打包位置读取、打包力矩写入）
//! - 安全模块（急停模式、限幅、零位标记、示教器状态）
//! - `LowLevelWam`：关节/电机/Puck 空间变换、零位标定、逐周期读写
//! - TOML 配置
//!
//! # 使用场景
//!
//! 控制循环通常不直接调用这里的接口，而是通过 `barrett-systems` 中的
//! `LowLevelWamWrapper` 把 `LowLevelWam` 接入数据流图。

mod clock;
pub mod config;
mod error;
pub mod low_level_wam;
mod motor_puck;
mod puck;
mod puck_group;
pub mod safety;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{BusSettings, ExecutionConfig, WamConfig, WamSettings};
pub use error::DriverError;
pub use low_level_wam::{LowLevelWam, ZeroOutcome};
pub use motor_puck::MotorPuck;
pub use puck::{Puck, WakeTiming};
pub use puck_group::PuckGroup;
pub use safety::{
    ParameterState, PendantButton, PendantState, SafetyInterlock, SafetyMode, SafetyModule,
    SafetyParameter,
};
