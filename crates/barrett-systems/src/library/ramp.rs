use crate::error::SystemError;
use crate::port::Output;
use crate::system::{CycleContext, Node, System};
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy)]
struct RampState {
    running: bool,
    slope: f64,
    value: f64,
}

/// 斜坡信号
///
/// 运行时每周期输出增加 `slope * period`；停止时保持当前值，再次启动从保持值继续。
/// 创建后处于停止状态。
pub struct Ramp {
    pub output: Output<f64>,
    state: Mutex<RampState>,
}

impl Ramp {
    pub fn new(slope: f64) -> Node<Self> {
        Node::new("ramp", |ports| Self {
            output: ports.add_output(),
            state: Mutex::new(RampState {
                running: false,
                slope,
                value: 0.0,
            }),
        })
    }

    pub fn start(&self) {
        self.state.lock().running = true;
    }

    pub fn stop(&self) {
        self.state.lock().running = false;
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// 输出归零（不改变运行状态）
    pub fn reset(&self) {
        self.set_output(0.0);
    }

    pub fn set_output(&self, value: f64) {
        self.state.lock().value = value;
    }

    pub fn set_slope(&self, slope: f64) {
        self.state.lock().slope = slope;
    }

    pub fn slope(&self) -> f64 {
        self.state.lock().slope
    }
}

impl System for Ramp {
    fn operate(&self, ctx: &CycleContext) -> Result<(), SystemError> {
        let value = {
            let mut state = self.state.lock();
            if state.running {
                if ctx.period <= 0.0 {
                    return Err(SystemError::Operate(
                        "Ramp needs an execution manager with a known period".into(),
                    ));
                }
                state.value += state.slope * ctx.period;
            }
            state.value
        };
        self.output.set_value(value);
        Ok(())
    }
}
