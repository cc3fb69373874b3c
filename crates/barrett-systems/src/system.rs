//! 节点（System）
//!
//! 一个节点 = 名字 + 若干输入/输出端口 + 一个 [`System`] 实现的 `operate()`。
//! 节点以 [`Node<S>`] 句柄持有，克隆句柄共享同一个节点；最后一个句柄释放时
//! 执行强制清理：断开所有端口、解除所有委托、从执行管理器中移除，并重新推导邻居的管理器。
//!
//! # 示例
//!
//! ```
//! use barrett_systems::{CycleContext, Input, Node, Output, System, SystemError};
//!
//! struct Gain {
//!     input: Input<f64>,
//!     output: Output<f64>,
//!     gain: f64,
//! }
//!
//! impl System for Gain {
//!     fn operate(&self, _ctx: &CycleContext) -> Result<(), SystemError> {
//!         self.output.set_value(self.gain * self.input.get()?);
//!         Ok(())
//!     }
//! }
//!
//! let gain = Node::new("gain", |ports| Gain {
//!     input: ports.add_input(),
//!     output: ports.add_output(),
//!     gain: 2.0,
//! });
//! assert!(!gain.is_managed());
//! ```

use crate::error::SystemError;
use crate::graph;
use crate::manager::ManagerCore;
use crate::port::{ErasedInput, ErasedOutput, PortBuilder};
use parking_lot::Mutex;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// 空令牌：`update(NULL_TOKEN)` 总会执行计算
pub const NULL_TOKEN: u64 = 0;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// 进程内唯一的节点标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 一次 `operate()` 调用的上下文
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleContext {
    /// 本周期的更新令牌
    pub token: u64,
    /// 执行管理器周期（秒）；未知时为 -1
    pub period: f64,
}

/// 节点的计算逻辑
///
/// `operate()` 只在所有输入都已定义时被调用，应为每个输出写入新值。
/// 状态需要内部可变性（例如 `parking_lot::Mutex`），因为控制线程与用户线程共享节点。
pub trait System: Send + Sync + 'static {
    fn operate(&self, ctx: &CycleContext) -> Result<(), SystemError>;
}

pub(crate) trait AnyNode: Send + Sync {
    fn header(&self) -> &NodeHeader;
    fn operate(&self, ctx: &CycleContext) -> Result<(), SystemError>;
}

#[derive(Default)]
pub(crate) struct NodeState {
    manager: Option<Arc<ManagerCore>>,
    /// 是否由 `manager` 直接管理（而不是经由连接间接关联）
    direct: bool,
    token: u64,
}

pub(crate) struct NodeHeader {
    id: NodeId,
    name: String,
    inputs: Vec<Arc<dyn ErasedInput>>,
    outputs: Vec<Arc<dyn ErasedOutput>>,
    state: Mutex<NodeState>,
}

impl NodeHeader {
    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn manager(&self) -> Option<Arc<ManagerCore>> {
        self.state.lock().manager.clone()
    }

    pub(crate) fn direct_manager(&self) -> Option<Arc<ManagerCore>> {
        let state = self.state.lock();
        if state.direct {
            state.manager.clone()
        } else {
            None
        }
    }

    pub(crate) fn is_direct(&self) -> bool {
        self.state.lock().direct
    }

    pub(crate) fn set_direct(&self, manager: Option<Arc<ManagerCore>>) {
        let mut state = self.state.lock();
        state.direct = manager.is_some();
        state.manager = manager;
    }

    pub(crate) fn set_derived(&self, manager: Option<Arc<ManagerCore>>) {
        self.state.lock().manager = manager;
    }

    pub(crate) fn neighbors(&self, out: &mut Vec<Arc<dyn AnyNode>>) {
        for input in &self.inputs {
            input.neighbors(out);
        }
        for output in &self.outputs {
            output.neighbors(out);
        }
    }
}

impl Drop for NodeHeader {
    fn drop(&mut self) {
        let state = std::mem::take(self.state.get_mut());
        let _guard = state.manager.as_ref().map(|m| m.lock());
        if let (true, Some(manager)) = (state.direct, &state.manager) {
            manager.forget(self.id);
        }

        let mut affected = Vec::new();
        for output in &self.outputs {
            output.detach_all(&mut affected);
        }
        for input in &self.inputs {
            input.detach(&mut affected);
        }
        for node in &affected {
            graph::rederive(node);
        }
        trace!(
            "System '{}' {} dropped, {} neighbour(s) re-derived",
            self.name,
            self.id,
            affected.len()
        );
    }
}

struct NodeCell<S> {
    header: NodeHeader,
    system: S,
}

impl<S: System> AnyNode for NodeCell<S> {
    fn header(&self) -> &NodeHeader {
        &self.header
    }

    fn operate(&self, ctx: &CycleContext) -> Result<(), SystemError> {
        self.system.operate(ctx)
    }
}

/// 拉取式更新
///
/// 同一令牌只计算一次；先更新每个输入的上游节点，任一输入未定义时
/// 把本节点所有输出标记为未定义，否则调用 `operate()`。
pub(crate) fn update_node(node: &dyn AnyNode, token: u64, period: f64) -> Result<(), SystemError> {
    let header = node.header();
    {
        let mut state = header.state.lock();
        if token != NULL_TOKEN && state.token == token {
            return Ok(());
        }
        state.token = token;
    }

    let mut defined = true;
    for input in &header.inputs {
        defined &= input.pull(token, period)?;
    }

    if defined {
        node.operate(&CycleContext { token, period })
    } else {
        for output in &header.outputs {
            output.invalidate();
        }
        Ok(())
    }
}

/// 节点句柄
///
/// 解引用得到系统本身，用于访问端口和系统自己的方法。
pub struct Node<S: System> {
    cell: Arc<NodeCell<S>>,
}

impl<S: System> Node<S> {
    /// 创建节点
    ///
    /// # 参数
    ///
    /// - `name`: 节点名称（用于日志和错误信息）
    /// - `build`: 构造系统；通过 [`PortBuilder`] 登记端口
    pub fn new(name: impl Into<String>, build: impl FnOnce(&mut PortBuilder) -> S) -> Self {
        let name = name.into();
        let cell = Arc::new_cyclic(|weak: &Weak<NodeCell<S>>| {
            let parent: Weak<dyn AnyNode> = weak.clone();
            let mut ports = PortBuilder::new(parent);
            let system = build(&mut ports);
            NodeCell {
                header: NodeHeader {
                    id: NodeId::next(),
                    name,
                    inputs: ports.inputs,
                    outputs: ports.outputs,
                    state: Mutex::new(NodeState::default()),
                },
                system,
            }
        });
        Self { cell }
    }

    pub fn id(&self) -> NodeId {
        self.cell.header.id
    }

    pub fn name(&self) -> &str {
        &self.cell.header.name
    }

    /// 是否（直接或间接）关联到执行管理器
    pub fn is_managed(&self) -> bool {
        self.cell.header.manager().is_some()
    }

    /// 是否被执行管理器直接管理
    pub fn has_direct_manager(&self) -> bool {
        self.cell.header.is_direct()
    }

    pub fn manager(&self) -> Option<Arc<ManagerCore>> {
        self.cell.header.manager()
    }

    /// 上次更新使用的令牌
    pub fn last_token(&self) -> u64 {
        self.cell.header.state.lock().token
    }

    /// 以给定令牌更新节点
    ///
    /// 周期取所属执行管理器的周期，没有管理器时为 -1。
    pub fn update(&self, token: u64) -> Result<(), SystemError> {
        let period = self.manager().map_or(-1.0, |m| m.period());
        update_node(self.cell.as_ref(), token, period)
    }

    pub(crate) fn erased(&self) -> Arc<dyn AnyNode> {
        self.cell.clone()
    }
}

impl<S: System> Clone for Node<S> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<S: System> Deref for Node<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.cell.system
    }
}

impl<S: System> fmt::Debug for Node<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("managed", &self.is_managed())
            .finish()
    }
}
