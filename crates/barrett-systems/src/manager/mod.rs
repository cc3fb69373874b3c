//! 执行管理器
//!
//! [`ManagerCore`] 保存受管节点集合、周期、更新令牌和结构变更锁；
//! [`ManualExecutionManager`] 由调用方逐周期驱动，[`RealTimeExecutionManager`] 在专用线程上周期运行。

mod manual;
mod realtime;
mod stats;

pub use manual::ManualExecutionManager;
pub use realtime::{ErrorCallback, RealTimeExecutionManager};
pub use stats::CycleStatistics;

use crate::error::SystemError;
use crate::graph;
use crate::system::{AnyNode, Node, NodeId, System, update_node};
use arc_swap::ArcSwap;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

#[derive(Clone)]
struct ManagedEntry {
    id: NodeId,
    node: Weak<dyn AnyNode>,
}

/// 执行管理器的共享核心
///
/// 节点持有其管理器核心的强引用；核心只弱引用受管节点，节点释放时自行注销。
pub struct ManagerCore {
    period: f64,
    mutex: ReentrantMutex<()>,
    managed: ArcSwap<Vec<ManagedEntry>>,
    token: AtomicU64,
}

impl ManagerCore {
    pub fn new(period: f64) -> Arc<Self> {
        Arc::new(Self {
            period,
            mutex: ReentrantMutex::new(()),
            managed: ArcSwap::from_pointee(Vec::new()),
            token: AtomicU64::new(0),
        })
    }

    /// 周期（秒）；未知时为 -1
    pub fn period(&self) -> f64 {
        self.period
    }

    /// 结构变更锁（可重入）
    ///
    /// 执行周期、启停、连接/断开都持有此锁。
    pub fn lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.mutex.lock()
    }

    /// 最近一个周期使用的令牌
    pub fn current_token(&self) -> u64 {
        self.token.load(Ordering::Acquire)
    }

    /// 直接受管的节点数量
    pub fn managed_count(&self) -> usize {
        self.managed.load().len()
    }

    fn next_token(&self) -> u64 {
        loop {
            let token = self.token.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
            if token != crate::NULL_TOKEN {
                return token;
            }
        }
    }

    fn manages(&self, id: NodeId) -> bool {
        self.managed.load().iter().any(|e| e.id == id)
    }

    pub(crate) fn start_managing(self: &Arc<Self>, node: Arc<dyn AnyNode>) {
        let _guard = self.lock();
        let header = node.header();
        if let Some(current) = header.manager() {
            assert!(
                Arc::ptr_eq(&current, self),
                "System '{}' is already managed by a different execution manager",
                header.name()
            );
        }

        header.set_direct(Some(Arc::clone(self)));
        if !self.manages(header.id()) {
            let mut next = self.managed.load().to_vec();
            next.push(ManagedEntry {
                id: header.id(),
                node: Arc::downgrade(&node),
            });
            self.managed.store(Arc::new(next));
        }
        graph::rederive(&node);
        debug!("Started managing system '{}'", header.name());
    }

    pub(crate) fn stop_managing(self: &Arc<Self>, node: &Arc<dyn AnyNode>) -> bool {
        let _guard = self.lock();
        let header = node.header();
        if !self.forget(header.id()) {
            return false;
        }
        header.set_direct(None);
        graph::rederive(node);
        debug!("Stopped managing system '{}'", header.name());
        true
    }

    /// 从受管集合中移除（不改动节点状态）
    pub(crate) fn forget(&self, id: NodeId) -> bool {
        let _guard = self.lock();
        let current = self.managed.load();
        if !current.iter().any(|e| e.id == id) {
            return false;
        }
        let next: Vec<ManagedEntry> = current.iter().filter(|e| e.id != id).cloned().collect();
        self.managed.store(Arc::new(next));
        true
    }

    /// 执行一个周期：递增令牌，依次更新每个直接受管节点
    ///
    /// # 错误
    ///
    /// 返回第一个失败节点的错误，后续节点本周期不再更新。
    pub fn run_execution_cycle(&self) -> Result<(), SystemError> {
        let _guard = self.lock();
        let token = self.next_token();
        let managed = self.managed.load();
        for entry in managed.iter() {
            if let Some(node) = entry.node.upgrade() {
                update_node(node.as_ref(), token, self.period)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ManagerCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerCore")
            .field("period", &self.period)
            .field("managed", &self.managed_count())
            .field("token", &self.current_token())
            .finish()
    }
}

/// 执行管理器的公共接口
pub trait ExecutionManager {
    fn core(&self) -> &Arc<ManagerCore>;

    /// 周期（秒）；未知时为 -1
    fn period(&self) -> f64 {
        self.core().period()
    }

    /// 直接管理 `node`；与它相连的整个连通分量随之受管
    ///
    /// # Panics
    ///
    /// `node` 已关联到另一个执行管理器。
    fn start_managing<S: System>(&self, node: &Node<S>) {
        self.core().start_managing(node.erased());
    }

    /// 停止直接管理 `node`；返回 `node` 此前是否由本管理器直接管理
    fn stop_managing<S: System>(&self, node: &Node<S>) -> bool {
        self.core().stop_managing(&node.erased())
    }

    /// `node` 是否（直接或间接）关联到本管理器
    fn is_managing<S: System>(&self, node: &Node<S>) -> bool {
        node.manager()
            .is_some_and(|m| Arc::ptr_eq(&m, self.core()))
    }
}
