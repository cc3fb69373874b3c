//! 输入/输出端口
//!
//! 端口由所属节点独占。[`Input`]/[`Output`] 是系统结构体里持有的类型化句柄，
//! 节点头部另外保存一份类型擦除的引用，用于拉取更新、遍历连通分量和析构清理。
//!
//! 引用方向：
//! - `Input` 强引用它连接的 `Output`，`Output` 弱引用所有连接到它的 `Input`
//! - 委托方强引用被委托方，被委托方弱引用所有委托方
//! - 端口弱引用所属节点

use crate::error::SystemError;
use crate::system::{AnyNode, update_node};
use parking_lot::Mutex;
use std::ptr;
use std::sync::{Arc, Weak};

/// 类型擦除的输入端口
pub(crate) trait ErasedInput: Send + Sync {
    /// 连接的输出端口所属节点
    fn neighbors(&self, out: &mut Vec<Arc<dyn AnyNode>>);

    /// 更新上游节点，返回输入值是否已定义
    fn pull(&self, token: u64, period: f64) -> Result<bool, SystemError>;

    /// 断开连接，受影响的上游节点追加到 `affected`
    fn detach(&self, affected: &mut Vec<Arc<dyn AnyNode>>);
}

/// 类型擦除的输出端口
pub(crate) trait ErasedOutput: Send + Sync {
    /// 下游输入、委托方和被委托方所属节点
    fn neighbors(&self, out: &mut Vec<Arc<dyn AnyNode>>);

    /// 标记为未定义（委托中的端口不受影响）
    fn invalidate(&self);

    /// 断开所有连接并解除所有委托关系
    fn detach_all(&self, affected: &mut Vec<Arc<dyn AnyNode>>);
}

pub(crate) struct OutputSlot<T> {
    pub(crate) parent: Weak<dyn AnyNode>,
    state: Mutex<OutputState<T>>,
}

struct OutputState<T> {
    value: Option<T>,
    delegate: Option<Arc<OutputSlot<T>>>,
    delegators: Vec<Weak<OutputSlot<T>>>,
    inputs: Vec<Weak<InputSlot<T>>>,
}

impl<T: Clone + Send + 'static> OutputSlot<T> {
    fn new(parent: Weak<dyn AnyNode>) -> Self {
        Self {
            parent,
            state: Mutex::new(OutputState {
                value: None,
                delegate: None,
                delegators: Vec::new(),
                inputs: Vec::new(),
            }),
        }
    }

    /// 沿委托链找到真正保存值的端口并调用 `f`（调用时不持有任何端口锁）
    fn with_terminal<R>(&self, f: impl FnOnce(&OutputSlot<T>) -> R) -> R {
        let delegate = self.state.lock().delegate.clone();
        match delegate {
            Some(next) => next.with_terminal(f),
            None => f(self),
        }
    }

    pub(crate) fn value(&self) -> Option<T> {
        self.with_terminal(|slot| slot.state.lock().value.clone())
    }

    pub(crate) fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.with_terminal(|slot| slot.state.lock().value.as_ref().map(f))
    }

    pub(crate) fn is_defined(&self) -> bool {
        self.with_terminal(|slot| slot.state.lock().value.is_some())
    }

    fn store(&self, value: Option<T>) {
        self.state.lock().value = value;
    }

    pub(crate) fn has_delegate(&self) -> bool {
        self.state.lock().delegate.is_some()
    }

    fn connection_count(&self) -> usize {
        self.state
            .lock()
            .inputs
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    fn add_input(&self, input: &Arc<InputSlot<T>>) {
        self.state.lock().inputs.push(Arc::downgrade(input));
    }

    fn remove_input(&self, input: &InputSlot<T>) {
        self.state
            .lock()
            .inputs
            .retain(|w| !ptr::eq(w.as_ptr(), input));
    }

    /// 取出所有下游输入并把它们的源置空
    pub(crate) fn detach_inputs(&self, affected: &mut Vec<Arc<dyn AnyNode>>) {
        let inputs = std::mem::take(&mut self.state.lock().inputs);
        for input in inputs.iter().filter_map(Weak::upgrade) {
            let mut source = input.source.lock();
            if source.as_ref().is_some_and(|s| ptr::eq(Arc::as_ptr(s), self)) {
                *source = None;
            }
            drop(source);
            if let Some(parent) = input.parent.upgrade() {
                affected.push(parent);
            }
        }
    }

    /// `self` 的委托链上是否包含 `other`（包括自身）
    pub(crate) fn reaches(self: &Arc<Self>, other: &OutputSlot<T>) -> bool {
        let mut current = Arc::clone(self);
        loop {
            if ptr::eq(Arc::as_ptr(&current), other) {
                return true;
            }
            let next = current.state.lock().delegate.clone();
            match next {
                Some(next) => current = next,
                None => return false,
            }
        }
    }

    pub(crate) fn set_delegate(self: &Arc<Self>, target: Arc<Self>) {
        target.state.lock().delegators.push(Arc::downgrade(self));
        self.state.lock().delegate = Some(target);
    }

    pub(crate) fn take_delegate(&self) -> Option<Arc<Self>> {
        let delegate = self.state.lock().delegate.take();
        if let Some(target) = &delegate {
            target
                .state
                .lock()
                .delegators
                .retain(|w| !ptr::eq(w.as_ptr(), self));
        }
        delegate
    }
}

impl<T: Clone + Send + 'static> ErasedOutput for OutputSlot<T> {
    fn neighbors(&self, out: &mut Vec<Arc<dyn AnyNode>>) {
        let state = self.state.lock();
        for input in state.inputs.iter().filter_map(Weak::upgrade) {
            out.extend(input.parent.upgrade());
        }
        for delegator in state.delegators.iter().filter_map(Weak::upgrade) {
            out.extend(delegator.parent.upgrade());
        }
        if let Some(target) = &state.delegate {
            out.extend(target.parent.upgrade());
        }
    }

    fn invalidate(&self) {
        let mut state = self.state.lock();
        if state.delegate.is_none() {
            state.value = None;
        }
    }

    fn detach_all(&self, affected: &mut Vec<Arc<dyn AnyNode>>) {
        self.detach_inputs(affected);

        let delegators = std::mem::take(&mut self.state.lock().delegators);
        for delegator in delegators.iter().filter_map(Weak::upgrade) {
            let mut state = delegator.state.lock();
            if state
                .delegate
                .as_ref()
                .is_some_and(|d| ptr::eq(Arc::as_ptr(d), self))
            {
                state.delegate = None;
            }
            drop(state);
            affected.extend(delegator.parent.upgrade());
        }

        if let Some(target) = self.take_delegate() {
            affected.extend(target.parent.upgrade());
        }
    }
}

pub(crate) struct InputSlot<T> {
    pub(crate) parent: Weak<dyn AnyNode>,
    source: Mutex<Option<Arc<OutputSlot<T>>>>,
}

impl<T: Clone + Send + 'static> InputSlot<T> {
    fn new(parent: Weak<dyn AnyNode>) -> Self {
        Self {
            parent,
            source: Mutex::new(None),
        }
    }

    fn source(&self) -> Option<Arc<OutputSlot<T>>> {
        self.source.lock().clone()
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.source.lock().is_some()
    }

    pub(crate) fn attach(self: &Arc<Self>, output: &Arc<OutputSlot<T>>) {
        *self.source.lock() = Some(Arc::clone(output));
        output.add_input(self);
    }

    pub(crate) fn detach_source(&self) -> Option<Arc<OutputSlot<T>>> {
        let source = self.source.lock().take();
        if let Some(output) = &source {
            output.remove_input(self);
        }
        source
    }
}

impl<T: Clone + Send + 'static> ErasedInput for InputSlot<T> {
    fn neighbors(&self, out: &mut Vec<Arc<dyn AnyNode>>) {
        if let Some(source) = self.source() {
            out.extend(source.parent.upgrade());
        }
    }

    fn pull(&self, token: u64, period: f64) -> Result<bool, SystemError> {
        let Some(source) = self.source() else {
            return Ok(false);
        };
        source.with_terminal(|slot| {
            if let Some(parent) = slot.parent.upgrade() {
                update_node(parent.as_ref(), token, period)?;
            }
            Ok(slot.state.lock().value.is_some())
        })
    }

    fn detach(&self, affected: &mut Vec<Arc<dyn AnyNode>>) {
        if let Some(output) = self.detach_source() {
            affected.extend(output.parent.upgrade());
        }
    }
}

/// 在节点构造期间登记端口
///
/// 由 [`Node::new`](crate::Node::new) 传给构造闭包。
pub struct PortBuilder {
    parent: Weak<dyn AnyNode>,
    pub(crate) inputs: Vec<Arc<dyn ErasedInput>>,
    pub(crate) outputs: Vec<Arc<dyn ErasedOutput>>,
}

impl PortBuilder {
    pub(crate) fn new(parent: Weak<dyn AnyNode>) -> Self {
        Self {
            parent,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn add_input<T: Clone + Send + 'static>(&mut self) -> Input<T> {
        let slot = Arc::new(InputSlot::new(self.parent.clone()));
        self.inputs.push(slot.clone());
        Input { slot }
    }

    pub fn add_output<T: Clone + Send + 'static>(&mut self) -> Output<T> {
        let slot = Arc::new(OutputSlot::new(self.parent.clone()));
        self.outputs.push(slot.clone());
        Output { slot }
    }
}

/// 类型化输入端口
///
/// 最多连接一个 [`Output`]。在 `operate()` 中用 [`get`](Self::get) 或
/// [`with_value`](Self::with_value) 读取当前周期的上游值。
pub struct Input<T> {
    slot: Arc<InputSlot<T>>,
}

impl<T: Clone + Send + 'static> Input<T> {
    pub(crate) fn slot(&self) -> &Arc<InputSlot<T>> {
        &self.slot
    }

    pub fn is_connected(&self) -> bool {
        self.slot.is_connected()
    }

    /// 已连接且上游值已定义
    pub fn value_defined(&self) -> bool {
        self.slot.source().is_some_and(|s| s.is_defined())
    }

    pub fn value(&self) -> Option<T> {
        self.slot.source().and_then(|s| s.value())
    }

    /// 借用上游值，避免克隆（`f` 执行期间持有上游端口的锁）
    pub fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.slot.source().and_then(|s| s.with_value(f))
    }

    /// 读取上游值
    ///
    /// # 错误
    ///
    /// 未连接或上游值未定义时返回 [`SystemError::UndefinedInput`]。
    pub fn get(&self) -> Result<T, SystemError> {
        self.value().ok_or_else(|| self.undefined())
    }

    pub(crate) fn undefined(&self) -> SystemError {
        SystemError::UndefinedInput {
            system: self
                .slot
                .parent
                .upgrade()
                .map(|p| p.header().name().to_string())
                .unwrap_or_default(),
        }
    }
}

/// 类型化输出端口
///
/// 值槽要么已定义（上次计算结果），要么未定义（向下游传播“未就绪”）。
/// 可以委托给另一个输出端口，读取时透明地返回被委托方的值。
pub struct Output<T> {
    slot: Arc<OutputSlot<T>>,
}

impl<T: Clone + Send + 'static> Output<T> {
    pub(crate) fn slot(&self) -> &Arc<OutputSlot<T>> {
        &self.slot
    }

    /// 写入新值；若正在委托，先解除委托
    pub fn set_value(&self, value: T) {
        if self.slot.has_delegate() {
            self.undelegate();
        }
        self.slot.store(Some(value));
    }

    /// 标记为未定义；若正在委托，先解除委托
    pub fn set_undefined(&self) {
        if self.slot.has_delegate() {
            self.undelegate();
        }
        self.slot.store(None);
    }

    pub fn value(&self) -> Option<T> {
        self.slot.value()
    }

    pub fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.slot.with_value(f)
    }

    pub fn is_defined(&self) -> bool {
        self.slot.is_defined()
    }

    pub fn is_delegating(&self) -> bool {
        self.slot.has_delegate()
    }

    /// 连接到此端口的输入数量
    pub fn connection_count(&self) -> usize {
        self.slot.connection_count()
    }
}
