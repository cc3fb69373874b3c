//! 安全模块
//!
//! 安全模块是总线上的一个专用 Puck（通常 ID 10），负责急停、速度/力矩限幅和零位标记。
//! 上层只依赖 [`SafetyInterlock`] 能力接口；[`SafetyModule`] 是它的 Puck 实现。

use crate::{DriverError, Puck};
use barrett_protocol::{Property, PuckType};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// 速度故障历史长度；写入 IFAULT 可屏蔽下一次速度故障
pub const VELOCITY_FAULT_HISTORY_BUFFER_SIZE: i32 = 5;

/// 默认的模式轮询间隔
pub const DEFAULT_MODE_POLL: Duration = Duration::from_millis(250);

/// 未指定时使用的每牛米电流
pub const DEFAULT_IPNM: i32 = 2700;

/// 安全模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SafetyMode {
    EStop,
    ShiftIdle,
    ShiftActive,
}

impl SafetyMode {
    /// 显示名称
    pub fn as_str(self) -> &'static str {
        match self {
            SafetyMode::EStop => "E-stop",
            SafetyMode::ShiftIdle => "Shift-idle",
            SafetyMode::ShiftActive => "Shift-activate",
        }
    }
}

impl TryFrom<i32> for SafetyMode {
    type Error = DriverError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SafetyMode::EStop),
            1 => Ok(SafetyMode::ShiftIdle),
            2 => Ok(SafetyMode::ShiftActive),
            other => Err(DriverError::InvalidSafetyMode(other)),
        }
    }
}

impl From<SafetyMode> for i32 {
    fn from(mode: SafetyMode) -> i32 {
        match mode {
            SafetyMode::EStop => 0,
            SafetyMode::ShiftIdle => 1,
            SafetyMode::ShiftActive => 2,
        }
    }
}

impl fmt::Display for SafetyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 安全联锁能力
///
/// `LowLevelWam` 只通过这个接口与安全模块交互，测试中可以替换为内存实现。
pub trait SafetyInterlock: Send + Sync {
    /// 手臂是否已经标定过零位
    fn is_zeroed(&self) -> Result<bool, DriverError>;

    /// 标记手臂已标定零位
    fn set_zeroed(&self) -> Result<(), DriverError>;

    /// 忽略下一次速度故障（位置寄存器即将发生跳变）
    fn suppress_next_velocity_fault(&self) -> Result<(), DriverError>;

    /// 当前安全模式
    fn mode(&self) -> Result<SafetyMode, DriverError>;

    /// 设置速度限值（m/s）；`warning` 为 `None` 时取故障值的 90%
    fn set_velocity_limit(&self, fault: f64, warning: Option<f64>) -> Result<(), DriverError>;

    /// 设置力矩限值（Nm），按 `ipnm` 换算为电流；`warning` 为 `None` 时取故障值的 90%
    fn set_torque_limit(&self, fault: f64, warning: Option<f64>, ipnm: i32) -> Result<(), DriverError>;

    /// 阻塞直到进入指定模式，每 `poll` 查询一次
    fn wait_for_mode(&self, mode: SafetyMode, poll: Duration) -> Result<(), DriverError> {
        if self.mode()? == mode {
            return Ok(());
        }
        info!("Waiting for safety mode {}", mode);
        loop {
            spin_sleep::sleep(poll);
            if self.mode()? == mode {
                return Ok(());
            }
        }
    }

    /// 阻塞直到模式发生变化，返回新模式
    fn wait_for_mode_change(&self, poll: Duration) -> Result<SafetyMode, DriverError> {
        let original = self.mode()?;
        loop {
            spin_sleep::sleep(poll);
            let current = self.mode()?;
            if current != original {
                return Ok(current);
            }
        }
    }
}

/// 基于安全 Puck 的安全模块
#[derive(Debug, Clone)]
pub struct SafetyModule {
    puck: Puck,
}

impl SafetyModule {
    /// 包装一个安全 Puck
    ///
    /// # 错误
    ///
    /// - `DriverError::Configuration`: Puck 不是安全模块
    pub fn new(puck: Puck) -> Result<Self, DriverError> {
        if puck.puck_type() != PuckType::Safety {
            return Err(DriverError::Configuration(format!(
                "Puck {} is a {} Puck, not a safety module",
                puck.id(),
                puck.puck_type()
            )));
        }
        Ok(Self { puck })
    }

    pub fn puck(&self) -> &Puck {
        &self.puck
    }

    /// 读取示教器状态
    pub fn pendant_state(&self, realtime: bool) -> Result<PendantState, DriverError> {
        let pen = self.puck.get_property(Property::Pen, realtime)?;
        PendantState::from_raw(pen)
    }

    fn warning_or_default(fault: f64, warning: Option<f64>) -> f64 {
        match warning {
            Some(w) if w >= 0.0 => w,
            _ => 0.9 * fault,
        }
    }
}

impl SafetyInterlock for SafetyModule {
    fn is_zeroed(&self) -> Result<bool, DriverError> {
        Ok(self.puck.get_property(Property::Zero, false)? == 1)
    }

    fn set_zeroed(&self) -> Result<(), DriverError> {
        self.puck.set_property(Property::Zero, 1, false)
    }

    fn suppress_next_velocity_fault(&self) -> Result<(), DriverError> {
        debug!("Ignoring next velocity fault");
        self.puck
            .set_property(Property::Ifault, VELOCITY_FAULT_HISTORY_BUFFER_SIZE, false)
    }

    fn mode(&self) -> Result<SafetyMode, DriverError> {
        SafetyMode::try_from(self.puck.get_property(Property::Mode, false)?)
    }

    fn set_velocity_limit(&self, fault: f64, warning: Option<f64>) -> Result<(), DriverError> {
        // 0 表示永不触发速度故障
        if fault < 0.0 {
            return Err(DriverError::Configuration(format!(
                "Velocity fault limit must be non-negative, got {}",
                fault
            )));
        }
        let warning = Self::warning_or_default(fault, warning);
        self.puck
            .set_property(Property::Vl2, (fault * 4096.0) as i32, false)?;
        self.puck
            .set_property(Property::Vl1, (warning * 4096.0) as i32, false)
    }

    fn set_torque_limit(&self, fault: f64, warning: Option<f64>, ipnm: i32) -> Result<(), DriverError> {
        if fault <= 0.0 {
            return Err(DriverError::Configuration(format!(
                "Torque fault limit must be positive, got {}",
                fault
            )));
        }
        let warning = Self::warning_or_default(fault, warning);
        self.puck
            .set_property(Property::Tl2, (fault * ipnm as f64) as i32, false)?;
        self.puck
            .set_property(Property::Tl1, (warning * ipnm as f64) as i32, false)
    }
}

/// 示教器按钮状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendantButton {
    EStop,
    Idle,
    Activate,
    None,
}

/// 单项参数的安全状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ParameterState {
    Safe,
    Warning,
    Fault,
}

/// 示教器上显示的受监控参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyParameter {
    Velocity = 0,
    Torque = 1,
    Voltage = 2,
    Heartbeat = 3,
    Other = 4,
}

impl SafetyParameter {
    pub const ALL: [SafetyParameter; 5] = [
        SafetyParameter::Velocity,
        SafetyParameter::Torque,
        SafetyParameter::Voltage,
        SafetyParameter::Heartbeat,
        SafetyParameter::Other,
    ];
}

/// PEN 属性解码结果
///
/// 位布局（LSB = bit 0）：
///
/// | 位 | 含义 |
/// |---|---|
/// | 0..15 | 5 个参数，每个 3 bit 独热编码：bit0 = Safe，bit1 = Warning，bit2 = Fault |
/// | 16..23 | 数码管显示的字符 |
/// | 24 | Idle 指示灯 |
/// | 25 | Activate 指示灯 |
/// | 26, 27 | 按钮（低有效） |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendantState {
    pub pressed_button: PendantButton,
    pub activate_light: bool,
    pub idle_light: bool,
    pub displayed_character: u8,
    pub parameters: [ParameterState; 5],
}

impl PendantState {
    /// 从 PEN 属性值解码
    ///
    /// # 错误
    ///
    /// - `ProtocolError::InvalidValue`: 某个参数字段不是恰好一位被置位
    pub fn from_raw(pen: i32) -> Result<Self, DriverError> {
        let bits = pen as u32;
        let bit = |n: u32| bits & (1 << n) != 0;

        let pressed_button = match (bit(27), bit(26)) {
            (true, true) => PendantButton::None,
            (true, false) => PendantButton::Idle,
            (false, true) => PendantButton::Activate,
            (false, false) => PendantButton::EStop,
        };

        let mut parameters = [ParameterState::Safe; 5];
        for (i, state) in parameters.iter_mut().enumerate() {
            let field = (bits >> (3 * i)) & 0x7;
            if field.count_ones() != 1 {
                return Err(barrett_protocol::ProtocolError::InvalidValue {
                    field: "PEN",
                    value: pen,
                }
                .into());
            }
            *state = match field {
                0b001 => ParameterState::Safe,
                0b010 => ParameterState::Warning,
                _ => ParameterState::Fault,
            };
        }

        Ok(Self {
            pressed_button,
            activate_light: bit(25),
            idle_light: bit(24),
            displayed_character: ((bits >> 16) & 0xff) as u8,
            parameters,
        })
    }

    pub fn parameter(&self, parameter: SafetyParameter) -> ParameterState {
        self.parameters[parameter as usize]
    }

    pub fn all_safe(&self) -> bool {
        self.parameters.iter().all(|&p| p == ParameterState::Safe)
    }

    pub fn has_faults(&self) -> bool {
        self.parameters.contains(&ParameterState::Fault)
    }
}
