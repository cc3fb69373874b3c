use crate::error::SystemError;
use crate::port::{Input, Output};
use crate::system::{CycleContext, Node, System};

type CallbackFn<I, O> = Box<dyn Fn(&I) -> O + Send + Sync>;

/// 把闭包包装成系统：`output = f(input)`
pub struct Callback<I, O> {
    pub input: Input<I>,
    pub output: Output<O>,
    f: CallbackFn<I, O>,
}

impl<I, O> Callback<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, f: impl Fn(&I) -> O + Send + Sync + 'static) -> Node<Self> {
        Node::new(name, |ports| Self {
            input: ports.add_input(),
            output: ports.add_output(),
            f: Box::new(f),
        })
    }
}

impl<I, O> System for Callback<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    fn operate(&self, _ctx: &CycleContext) -> Result<(), SystemError> {
        let value = self
            .input
            .with_value(|input| (self.f)(input))
            .ok_or_else(|| self.input.undefined())?;
        self.output.set_value(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::Constant;
    use crate::{ExecutionManager, ManualExecutionManager, connect};

    #[test]
    fn test_callback_maps_value() {
        let em = ManualExecutionManager::new();
        let source = Constant::new(vec![1.0, 2.0, 3.0]);
        let norm = Callback::new("norm", |v: &Vec<f64>| v.iter().map(|x| x * x).sum::<f64>());
        connect(&source.output, &norm.input).unwrap();
        em.start_managing(&norm);

        em.run_execution_cycle().unwrap();
        assert_eq!(norm.output.value(), Some(14.0));
        assert_eq!(norm.name(), "norm");
    }
}
