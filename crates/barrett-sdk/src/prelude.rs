//! 常用类型
//!
//! ```rust
//! use barrett_sdk::prelude::*;
//! ```

pub use barrett_can::{BusManager, CommunicationsBus};
pub use barrett_driver::{
    DriverError, LowLevelWam, Puck, SafetyInterlock, SafetyMode, SafetyModule, WamConfig,
    WamSettings,
};
pub use barrett_systems::{
    Callback, ConnectionError, Constant, CycleContext, ExecutionManager, Input,
    LowLevelWamWrapper, ManualExecutionManager, Node, Output, PidController, PidGains, Ramp,
    RealTimeExecutionManager, Summer, System, SystemError, connect, disconnect, force_connect,
    reconnect,
};
