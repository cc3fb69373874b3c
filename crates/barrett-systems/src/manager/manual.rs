use super::{ExecutionManager, ManagerCore};
use crate::error::SystemError;
use std::sync::Arc;

/// 手动执行管理器
///
/// 由调用方调用 [`run_execution_cycle`](Self::run_execution_cycle) 推进，
/// 适合仿真与测试。
#[derive(Debug)]
pub struct ManualExecutionManager {
    core: Arc<ManagerCore>,
}

impl ManualExecutionManager {
    /// 周期未知（-1）
    pub fn new() -> Self {
        Self::with_period(-1.0)
    }

    pub fn with_period(period: f64) -> Self {
        Self {
            core: ManagerCore::new(period),
        }
    }

    pub fn run_execution_cycle(&self) -> Result<(), SystemError> {
        self.core.run_execution_cycle()
    }
}

impl Default for ManualExecutionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionManager for ManualExecutionManager {
    fn core(&self) -> &Arc<ManagerCore> {
        &self.core
    }
}
