use crate::error::SystemError;
use crate::port::{Input, Output};
use crate::system::{CycleContext, Node, System};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// PID 参数
///
/// 限幅为 `None` 时不限幅。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// 积分项绝对值上限
    pub integrator_limit: Option<f64>,
    /// 输出绝对值上限
    pub control_limit: Option<f64>,
}

impl PidGains {
    pub fn proportional(kp: f64) -> Self {
        Self {
            kp,
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
struct PidState {
    gains: PidGains,
    integral: f64,
    previous_error: f64,
}

/// 标量 PID 控制器
///
/// `error = reference - feedback`，`dt` 取执行管理器周期：
///
/// ```text
/// integral += error * dt            (限幅到 integrator_limit)
/// u = kp * error + ki * integral + kd * (error - previous_error) / dt
/// ```
///
/// `u` 再限幅到 `control_limit`。
pub struct PidController {
    pub reference: Input<f64>,
    pub feedback: Input<f64>,
    pub control: Output<f64>,
    state: Mutex<PidState>,
}

impl PidController {
    pub fn new(gains: PidGains) -> Node<Self> {
        Node::new("pid", |ports| Self {
            reference: ports.add_input(),
            feedback: ports.add_input(),
            control: ports.add_output(),
            state: Mutex::new(PidState {
                gains,
                ..Default::default()
            }),
        })
    }

    pub fn gains(&self) -> PidGains {
        self.state.lock().gains
    }

    /// 修改参数（控制线程运行期间也可调用）
    pub fn set_gains(&self, gains: PidGains) {
        self.state.lock().gains = gains;
    }

    pub fn set_kp(&self, kp: f64) {
        self.state.lock().gains.kp = kp;
    }

    pub fn set_ki(&self, ki: f64) {
        self.state.lock().gains.ki = ki;
    }

    pub fn set_kd(&self, kd: f64) {
        self.state.lock().gains.kd = kd;
    }

    /// 积分项和上次误差清零
    pub fn reset_integrator(&self) {
        let mut state = self.state.lock();
        state.integral = 0.0;
        state.previous_error = 0.0;
    }
}

fn saturate(value: f64, limit: Option<f64>) -> f64 {
    match limit {
        Some(limit) => value.clamp(-limit.abs(), limit.abs()),
        None => value,
    }
}

impl System for PidController {
    fn operate(&self, ctx: &CycleContext) -> Result<(), SystemError> {
        let dt = ctx.period;
        if dt <= 0.0 {
            return Err(SystemError::Operate(
                "PidController needs an execution manager with a known period".into(),
            ));
        }
        let error = self.reference.get()? - self.feedback.get()?;

        let u = {
            let mut state = self.state.lock();
            let gains = state.gains;
            state.integral = saturate(state.integral + error * dt, gains.integrator_limit);
            let u = gains.kp * error
                + gains.ki * state.integral
                + gains.kd * (error - state.previous_error) / dt;
            state.previous_error = error;
            saturate(u, gains.control_limit)
        };
        self.control.set_value(u);
        Ok(())
    }
}
