//! 连通分量与执行管理器推导
//!
//! 不变量：同一连通分量（经由连接和委托边，不区分方向）内的所有节点关联同一个执行管理器，
//! 即分量内直接受管节点的管理器；分量内没有直接受管节点时全部为未受管。
//! 每次结构变更后对受影响节点调用 [`rederive`] 恢复该不变量。

use crate::manager::ManagerCore;
use crate::system::{AnyNode, NodeId};
use std::collections::HashSet;
use std::sync::Arc;

/// 从 `start` 出发的连通分量
pub(crate) fn component_of(start: &Arc<dyn AnyNode>) -> Vec<Arc<dyn AnyNode>> {
    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut stack = vec![Arc::clone(start)];
    let mut component = Vec::new();
    let mut neighbors = Vec::new();

    while let Some(node) = stack.pop() {
        if !seen.insert(node.header().id()) {
            continue;
        }
        node.header().neighbors(&mut neighbors);
        stack.append(&mut neighbors);
        component.push(node);
    }
    component
}

/// 重新推导 `start` 所在连通分量的执行管理器
///
/// # Panics
///
/// 分量内存在两个不同的直接管理器时 panic。
pub(crate) fn rederive(start: &Arc<dyn AnyNode>) {
    let component = component_of(start);

    let mut manager: Option<(Arc<ManagerCore>, &str)> = None;
    for node in &component {
        let Some(direct) = node.header().direct_manager() else {
            continue;
        };
        if let Some((existing, owner)) = &manager {
            assert!(
                Arc::ptr_eq(existing, &direct),
                "Systems '{}' and '{}' are connected but managed by different execution managers",
                owner,
                node.header().name()
            );
            continue;
        }
        manager = Some((direct, node.header().name()));
    }

    let manager = manager.map(|(m, _)| m);
    for node in &component {
        node.header().set_derived(manager.clone());
    }
}

/// 两个节点是否分别关联了不同的执行管理器
pub(crate) fn managers_conflict(a: &dyn AnyNode, b: &dyn AnyNode) -> bool {
    match (a.header().manager(), b.header().manager()) {
        (Some(x), Some(y)) => !Arc::ptr_eq(&x, &y),
        _ => false,
    }
}

/// 两个节点关联了不同的执行管理器时 panic
pub(crate) fn assert_same_manager(a: &dyn AnyNode, b: &dyn AnyNode) {
    assert!(
        !managers_conflict(a, b),
        "Cannot join systems '{}' and '{}': they are managed by different execution managers",
        a.header().name(),
        b.header().name()
    );
}

/// 在相关节点的执行管理器锁内执行结构变更
///
/// 控制线程在整个执行周期内持有该锁，因此结构变更不会在周期中途被观察到。
pub(crate) fn with_manager_lock<R>(nodes: &[&Arc<dyn AnyNode>], f: impl FnOnce() -> R) -> R {
    match nodes.iter().find_map(|n| n.header().manager()) {
        Some(manager) => {
            let _guard = manager.lock();
            f()
        }
        None => f(),
    }
}
