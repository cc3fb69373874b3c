//! 连接与委托
//!
//! 所有结构变更都在相关执行管理器的锁内完成，结束后重新推导受影响连通分量的管理器。
//! 连接只会合并分量，断开可能把分量一分为二，其中不含直接受管节点的一半变为未受管。

use crate::error::ConnectionError;
use crate::graph::{assert_same_manager, managers_conflict, rederive, with_manager_lock};
use crate::port::{Input, InputSlot, Output, OutputSlot};
use crate::system::AnyNode;
use std::sync::{Arc, Weak};
use tracing::trace;

fn parent_of(parent: &Weak<dyn AnyNode>) -> Result<Arc<dyn AnyNode>, ConnectionError> {
    parent.upgrade().ok_or_else(|| {
        ConnectionError::InvalidConnection("port belongs to a system that has been dropped".into())
    })
}

fn rederive_parent<T: Clone + Send + 'static>(slot: &OutputSlot<T>) {
    if let Some(parent) = slot.parent.upgrade() {
        rederive(&parent);
    }
}

fn link<T: Clone + Send + 'static>(
    source: &Arc<OutputSlot<T>>,
    sink: &Arc<InputSlot<T>>,
    from: &Arc<dyn AnyNode>,
    to: &Arc<dyn AnyNode>,
) {
    assert_same_manager(from.as_ref(), to.as_ref());
    sink.attach(source);
    rederive(from);
    trace!(
        "Connected '{}' -> '{}'",
        from.header().name(),
        to.header().name()
    );
}

/// 连接 `output` → `input`
///
/// 若只有一端关联了执行管理器，另一端所在的整个连通分量随之受管。
///
/// # 错误
///
/// - [`ConnectionError::AlreadyConnected`]: `input` 已有连接
/// - [`ConnectionError::InvalidConnection`]: 端口所属节点已释放
///
/// # Panics
///
/// 两端分别关联了不同的执行管理器。
pub fn connect<T: Clone + Send + 'static>(
    output: &Output<T>,
    input: &Input<T>,
) -> Result<(), ConnectionError> {
    let (source, sink) = (output.slot(), input.slot());
    let from = parent_of(&source.parent)?;
    let to = parent_of(&sink.parent)?;

    with_manager_lock(&[&from, &to], || {
        if sink.is_connected() {
            return Err(ConnectionError::AlreadyConnected);
        }
        link(source, sink, &from, &to);
        Ok(())
    })
}

/// 把已连接的 `input` 改接到 `output`
///
/// 断开旧连接与建立新连接在同一次加锁内完成。
///
/// # 错误
///
/// - [`ConnectionError::NotConnected`]: `input` 当前没有连接
/// - [`ConnectionError::InvalidConnection`]: 端口所属节点已释放
///
/// # Panics
///
/// 断开旧连接后两端仍分别关联不同的执行管理器；panic 前旧连接已恢复。
pub fn reconnect<T: Clone + Send + 'static>(
    output: &Output<T>,
    input: &Input<T>,
) -> Result<(), ConnectionError> {
    let (source, sink) = (output.slot(), input.slot());
    let from = parent_of(&source.parent)?;
    let to = parent_of(&sink.parent)?;

    with_manager_lock(&[&from, &to], || {
        let old = sink.detach_source().ok_or(ConnectionError::NotConnected)?;
        rederive_parent(&old);
        rederive(&to);
        if managers_conflict(from.as_ref(), to.as_ref()) {
            // 恢复旧连接后再 panic，图保持调用前的状态
            sink.attach(&old);
            rederive(&to);
            assert_same_manager(from.as_ref(), to.as_ref());
        }
        link(source, sink, &from, &to);
        Ok(())
    })
}

/// 连接 `output` → `input`，`input` 已有连接时直接改接
pub fn force_connect<T: Clone + Send + 'static>(
    output: &Output<T>,
    input: &Input<T>,
) -> Result<(), ConnectionError> {
    let from = parent_of(&output.slot().parent)?;
    let to = parent_of(&input.slot().parent)?;

    with_manager_lock(&[&from, &to], || {
        if input.is_connected() {
            reconnect(output, input)
        } else {
            connect(output, input)
        }
    })
}

/// 断开 `input` 的连接
///
/// # 错误
///
/// `input` 未连接时返回 [`ConnectionError::NotConnected`]。
pub fn disconnect<T: Clone + Send + 'static>(input: &Input<T>) -> Result<(), ConnectionError> {
    let sink = input.slot();
    let to = parent_of(&sink.parent)?;

    with_manager_lock(&[&to], || {
        let old = sink.detach_source().ok_or(ConnectionError::NotConnected)?;
        rederive_parent(&old);
        rederive(&to);
        trace!("Disconnected input of '{}'", to.header().name());
        Ok(())
    })
}

/// 断开 `output` 的所有下游连接，返回断开的数量
pub fn disconnect_output<T: Clone + Send + 'static>(
    output: &Output<T>,
) -> Result<usize, ConnectionError> {
    let source = output.slot();
    let from = parent_of(&source.parent)?;

    with_manager_lock(&[&from], || {
        let mut affected = Vec::new();
        source.detach_inputs(&mut affected);
        rederive(&from);
        for node in &affected {
            rederive(node);
        }
        Ok(affected.len())
    })
}

impl<T: Clone + Send + 'static> Output<T> {
    /// 把本端口的值委托给 `target`
    ///
    /// 之后读取本端口得到 `target` 的当前值；执行管理器沿委托边传播，与普通连接相同。
    /// 已有委托时先解除。
    ///
    /// # 错误
    ///
    /// `target` 的委托链包含本端口（会形成环）时返回 [`ConnectionError::InvalidConnection`]。
    pub fn delegate_to(&self, target: &Output<T>) -> Result<(), ConnectionError> {
        let (slot, target_slot) = (self.slot(), target.slot());
        let from = parent_of(&slot.parent)?;
        let to = parent_of(&target_slot.parent)?;

        with_manager_lock(&[&from, &to], || {
            if target_slot.reaches(slot) {
                return Err(ConnectionError::InvalidConnection(
                    "delegation would form a cycle".into(),
                ));
            }
            if let Some(old) = slot.take_delegate() {
                rederive_parent(&old);
                rederive(&from);
            }
            assert_same_manager(from.as_ref(), to.as_ref());
            slot.set_delegate(Arc::clone(target_slot));
            rederive(&from);
            Ok(())
        })
    }

    /// 解除委托；未委托时什么也不做
    pub fn undelegate(&self) {
        let slot = self.slot();
        let Some(from) = slot.parent.upgrade() else {
            slot.take_delegate();
            return;
        };

        with_manager_lock(&[&from], || {
            if let Some(old) = slot.take_delegate() {
                rederive_parent(&old);
                rederive(&from);
            }
        })
    }
}
