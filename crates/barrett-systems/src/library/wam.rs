//! 把 [`LowLevelWam`] 接入数据流图
//!
//! 拆成两个节点：
//! - [`WamSource`]: 每周期 `update()`，输出关节位置与速度
//! - [`WamSink`]: 输入关节力矩，每周期 `set_torques()`
//!
//! `WamSink` 内部还有一个连接到 `WamSource` 位置输出的输入，
//! 因此同一周期内总是先读位置再写力矩；力矩输入未定义时只读不写。

use crate::connect::connect;
use crate::error::SystemError;
use crate::manager::ExecutionManager;
use crate::port::{Input, Output};
use crate::system::{CycleContext, Node, System};
use barrett_driver::LowLevelWam;
use nalgebra::DVector;
use parking_lot::Mutex;
use std::sync::Arc;

/// 位置/速度输出节点
pub struct WamSource {
    pub joint_positions: Output<DVector<f64>>,
    pub joint_velocities: Output<DVector<f64>>,
    wam: Arc<Mutex<LowLevelWam>>,
}

impl System for WamSource {
    fn operate(&self, _ctx: &CycleContext) -> Result<(), SystemError> {
        let mut wam = self.wam.lock();
        wam.update()?;
        self.joint_positions.set_value(wam.joint_positions().clone());
        self.joint_velocities
            .set_value(wam.joint_velocities().clone());
        Ok(())
    }
}

/// 力矩输入节点
pub struct WamSink {
    pub torques: Input<DVector<f64>>,
    positions: Input<DVector<f64>>,
    wam: Arc<Mutex<LowLevelWam>>,
}

impl System for WamSink {
    fn operate(&self, _ctx: &CycleContext) -> Result<(), SystemError> {
        let mut wam = self.wam.lock();
        match self.torques.with_value(|jt| wam.set_torques(jt)) {
            Some(result) => Ok(result?),
            None => Err(self.torques.undefined()),
        }
    }
}

/// `LowLevelWam` 的系统包装
///
/// ```no_run
/// # use barrett_systems::{LowLevelWamWrapper, RealTimeExecutionManager, Constant, connect};
/// # fn demo(wam: barrett_driver::LowLevelWam) -> Result<(), barrett_systems::SystemError> {
/// let em = RealTimeExecutionManager::new(0.002)?;
/// let wrapper = LowLevelWamWrapper::new(wam)?;
/// let zero = Constant::new(nalgebra::DVector::zeros(wrapper.dof()));
/// connect(&zero.output, wrapper.input())?;
/// wrapper.start_managing(&em);
/// em.start()?;
/// # Ok(())
/// # }
/// ```
pub struct LowLevelWamWrapper {
    wam: Arc<Mutex<LowLevelWam>>,
    dof: usize,
    source: Node<WamSource>,
    sink: Node<WamSink>,
}

impl LowLevelWamWrapper {
    pub fn new(wam: LowLevelWam) -> Result<Self, SystemError> {
        let dof = wam.dof();
        let wam = Arc::new(Mutex::new(wam));
        let source = Node::new("wam_source", |ports| WamSource {
            joint_positions: ports.add_output(),
            joint_velocities: ports.add_output(),
            wam: Arc::clone(&wam),
        });
        let sink = Node::new("wam_sink", |ports| WamSink {
            torques: ports.add_input(),
            positions: ports.add_input(),
            wam: Arc::clone(&wam),
        });
        connect(&source.joint_positions, &sink.positions)?;
        Ok(Self {
            wam,
            dof,
            source,
            sink,
        })
    }

    pub fn dof(&self) -> usize {
        self.dof
    }

    /// 关节力矩输入
    pub fn input(&self) -> &Input<DVector<f64>> {
        &self.sink.torques
    }

    pub fn jp_output(&self) -> &Output<DVector<f64>> {
        &self.source.joint_positions
    }

    pub fn jv_output(&self) -> &Output<DVector<f64>> {
        &self.source.joint_velocities
    }

    pub fn source(&self) -> &Node<WamSource> {
        &self.source
    }

    pub fn sink(&self) -> &Node<WamSink> {
        &self.sink
    }

    /// 非实时访问底层对象（会与控制线程竞争同一把锁）
    pub fn wam(&self) -> &Arc<Mutex<LowLevelWam>> {
        &self.wam
    }

    /// 交给执行管理器；位置节点经由内部连接一起受管
    pub fn start_managing(&self, em: &impl ExecutionManager) {
        em.start_managing(&self.sink);
    }

    pub fn stop_managing(&self, em: &impl ExecutionManager) -> bool {
        em.stop_managing(&self.sink)
    }
}
