//! Barrett SDK - Barrett WAM 机械臂实时控制 Rust SDK
//!
//! # 架构设计
//!
//! 从底层到高层：
//!
//! - **协议层** (`protocol`): 帧、总线 ID、属性表、打包位置/力矩编解码
//! - **总线层** (`can`): `CommunicationsBus`、`BusManager`、SocketCAN 适配器
//! - **驱动层** (`driver`): Puck、安全模块、`LowLevelWam`、TOML 配置
//! - **系统层** (`systems`): 数据流图、执行管理器、常用系统
//!
//! # 快速开始
//!
//! ```rust
//! use barrett_sdk::prelude::*;
//!
//! barrett_sdk::init_logger();
//! let em = ManualExecutionManager::with_period(0.002);
//! let ramp = Ramp::new(1.0);
//! em.start_managing(&ramp);
//! ramp.start();
//! em.run_execution_cycle()?;
//! # Ok::<(), SystemError>(())
//! ```

pub use barrett_can as can;
pub use barrett_driver as driver;
pub use barrett_protocol as protocol;
pub use barrett_systems as systems;

mod logging;
pub mod prelude;

pub use logging::{init_logger, init_logger_with_filter};

pub use barrett_can::{BusConfig, BusManager, CanError, CommunicationsBus};
pub use barrett_driver::{DriverError, LowLevelWam, WamConfig};
pub use barrett_protocol::ProtocolError;
pub use barrett_systems::{
    ConnectionError, ExecutionManager, ManualExecutionManager, RealTimeExecutionManager,
    SystemError,
};
