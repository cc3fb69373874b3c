//! WAM 配置
//!
//! 从 TOML 加载：
//!
//! ```toml
//! [wam]
//! puck_ids = [1, 2, 3, 4]
//! home = [0.0, -2.0, 0.0, 3.1]
//! j2mp = [[-42.0, 0.0, 0.0, 0.0], [0.0, 28.25, -28.25, 0.0], [0.0, -16.8155, -16.8155, 0.0], [0.0, 0.0, 0.0, -18.0]]
//!
//! [bus]
//! interface = "can0"
//!
//! [execution]
//! period_s = 0.002
//! ```

use crate::DriverError;
use barrett_can::BusConfig;
use barrett_protocol::{MAX_ID, MIN_ID};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 完整配置文件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WamConfig {
    pub wam: WamSettings,
    #[serde(default)]
    pub bus: BusSettings,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

/// 手臂参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WamSettings {
    /// 每个关节对应的 Puck ID，按关节顺序
    pub puck_ids: Vec<u32>,
    /// 零位姿态（关节空间，rad）
    pub home: Vec<f64>,
    /// 关节位置 → 电机位置矩阵，按行存储
    pub j2mp: Vec<Vec<f64>>,
    /// 绝对编码器零位角（rad）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zeroangle: Option<Vec<f64>>,
    /// 力矩广播组 ID；为空时使用下臂/上臂两个默认组
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub torque_group_ids: Vec<u32>,
    /// 安全模块的 Puck ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_puck_id: Option<u32>,
}

impl WamSettings {
    pub fn dof(&self) -> usize {
        self.puck_ids.len()
    }

    /// 检查各字段维度与取值范围
    pub fn validate(&self) -> Result<(), DriverError> {
        let dof = self.dof();
        if dof == 0 {
            return Err(DriverError::Configuration("puck_ids is empty".into()));
        }
        for (i, &id) in self.puck_ids.iter().enumerate() {
            if !(MIN_ID..=MAX_ID).contains(&id) {
                return Err(DriverError::Configuration(format!(
                    "puck_ids[{}] = {} is outside {}..={}",
                    i, id, MIN_ID, MAX_ID
                )));
            }
            if self.puck_ids[..i].contains(&id) {
                return Err(DriverError::Configuration(format!(
                    "Puck ID {} appears more than once",
                    id
                )));
            }
        }
        check_len("home", self.home.len(), dof)?;
        check_len("j2mp rows", self.j2mp.len(), dof)?;
        for (i, row) in self.j2mp.iter().enumerate() {
            check_len(&format!("j2mp[{}]", i), row.len(), dof)?;
        }
        check_finite("home", &self.home)?;
        for (i, row) in self.j2mp.iter().enumerate() {
            check_finite(&format!("j2mp[{}]", i), row)?;
        }
        if let Some(zeroangle) = &self.zeroangle {
            check_len("zeroangle", zeroangle.len(), dof)?;
            check_finite("zeroangle", zeroangle)?;
        }
        Ok(())
    }

    pub fn home_vector(&self) -> DVector<f64> {
        DVector::from_column_slice(&self.home)
    }

    pub fn zeroangle_vector(&self) -> Option<DVector<f64>> {
        self.zeroangle.as_deref().map(DVector::from_column_slice)
    }

    /// j2mp 转为矩阵（调用前应先 [`validate`](Self::validate)）
    pub fn j2mp_matrix(&self) -> DMatrix<f64> {
        let dof = self.dof();
        DMatrix::from_fn(dof, dof, |r, c| {
            self.j2mp
                .get(r)
                .and_then(|row| row.get(c))
                .copied()
                .unwrap_or(0.0)
        })
    }
}

fn check_finite(field: &str, values: &[f64]) -> Result<(), DriverError> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(DriverError::Configuration(format!(
            "{}[{}] = {} is not a finite number",
            field, i, values[i]
        ))),
        None => Ok(()),
    }
}

fn check_len(field: &str, actual: usize, expected: usize) -> Result<(), DriverError> {
    if actual != expected {
        return Err(DriverError::Configuration(format!(
            "{} has {} entries, expected {}",
            field, actual, expected
        )));
    }
    Ok(())
}

/// 总线参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    pub interface: String,
    pub timeout_ms: u64,
    pub realtime_timeout_ms: u64,
    pub buffer_capacity: usize,
}

impl Default for BusSettings {
    fn default() -> Self {
        let defaults = BusConfig::default();
        Self {
            interface: "can0".to_string(),
            timeout_ms: defaults.timeout.as_millis() as u64,
            realtime_timeout_ms: defaults.realtime_timeout.as_millis() as u64,
            buffer_capacity: defaults.buffer_capacity,
        }
    }
}

impl BusSettings {
    pub fn to_bus_config(&self) -> BusConfig {
        BusConfig {
            timeout: Duration::from_millis(self.timeout_ms),
            realtime_timeout: Duration::from_millis(self.realtime_timeout_ms),
            buffer_capacity: self.buffer_capacity,
        }
    }
}

/// 实时执行管理器参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// 控制周期（秒）
    pub period_s: f64,
    /// 是否尝试提升控制线程优先级
    pub thread_priority: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            period_s: 0.002,
            thread_priority: true,
        }
    }
}

impl ExecutionConfig {
    pub fn validate(&self) -> Result<(), DriverError> {
        if !(self.period_s.is_finite() && self.period_s > 0.0) {
            return Err(DriverError::Configuration(format!(
                "period_s must be positive, got {}",
                self.period_s
            )));
        }
        Ok(())
    }
}

impl WamConfig {
    /// 从 TOML 文本加载并校验
    pub fn from_toml_str(text: &str) -> Result<Self, DriverError> {
        let config: WamConfig =
            toml::from_str(text).map_err(|e| DriverError::ConfigFile(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载并校验
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DriverError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| DriverError::ConfigFile(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, DriverError> {
        toml::to_string_pretty(self).map_err(|e| DriverError::ConfigFile(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), DriverError> {
        self.wam.validate()?;
        self.execution.validate()
    }
}
