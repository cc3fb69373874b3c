//! 数据流图与执行管理器
//!
//! 控制程序由一组 [`Node`] 组成，节点之间通过类型化端口连接（[`Output`] → [`Input`]）。
//! 执行管理器每个周期更新它直接管理的节点；更新是拉取式的：
//! 节点先更新上游，再用同一周期的输入值调用自己的 `operate()`。
//!
//! # 执行管理器归属
//!
//! 连通分量（连接边和委托边，不区分方向）内所有节点关联同一个执行管理器。
//! 连接一个受管节点会让另一端整个分量受管；断开后不再与直接受管节点相连的部分变为未受管。
//! 试图把两个不同管理器的分量连在一起会 `panic!`。
//!
//! # 示例
//!
//! ```
//! use barrett_systems::{Constant, ExecutionManager, ManualExecutionManager, PidController, PidGains, connect};
//!
//! let em = ManualExecutionManager::with_period(0.002);
//! let reference = Constant::new(0.1);
//! let feedback = Constant::new(0.0);
//! let pid = PidController::new(PidGains::proportional(10.0));
//! connect(&reference.output, &pid.reference)?;
//! connect(&feedback.output, &pid.feedback)?;
//! em.start_managing(&pid);
//!
//! em.run_execution_cycle()?;
//! assert_eq!(pid.control.value(), Some(1.0));
//! # Ok::<(), barrett_systems::SystemError>(())
//! ```

mod connect;
mod error;
mod graph;
pub mod library;
pub mod manager;
mod port;
mod system;

pub use connect::{connect, disconnect, disconnect_output, force_connect, reconnect};
pub use error::{ConnectionError, SystemError};
pub use library::{
    Callback, Constant, LowLevelWamWrapper, PidController, PidGains, Ramp, Summer,
};
pub use manager::{
    CycleStatistics, ErrorCallback, ExecutionManager, ManagerCore, ManualExecutionManager,
    RealTimeExecutionManager,
};
pub use port::{Input, Output, PortBuilder};
pub use system::{CycleContext, NULL_TOKEN, Node, NodeId, System};
