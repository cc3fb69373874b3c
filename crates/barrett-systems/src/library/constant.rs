use crate::error::SystemError;
use crate::port::Output;
use crate::system::{CycleContext, Node, System};
use parking_lot::Mutex;

/// 输出固定值
pub struct Constant<T> {
    pub output: Output<T>,
    value: Mutex<T>,
}

impl<T: Clone + Send + 'static> Constant<T> {
    pub fn new(value: T) -> Node<Self> {
        Node::new("constant", |ports| Self {
            output: ports.add_output(),
            value: Mutex::new(value),
        })
    }

    /// 修改输出值，下一周期生效
    pub fn set_value(&self, value: T) {
        *self.value.lock() = value;
    }

    pub fn value(&self) -> T {
        self.value.lock().clone()
    }
}

impl<T: Clone + Send + 'static> System for Constant<T> {
    fn operate(&self, _ctx: &CycleContext) -> Result<(), SystemError> {
        self.output.set_value(self.value.lock().clone());
        Ok(())
    }
}
