//! 低层关节 I/O
//!
//! `LowLevelWam` 持有每个关节的电机 Puck，以及关节空间、电机空间、Puck 计数空间之间的固定变换：
//!
//! | 矩阵 | 含义 |
//! |---|---|
//! | `j2mp` | 关节位置 → 电机位置 |
//! | `m2jp` | `j2mp` 的逆 |
//! | `j2mt` | 关节力矩 → 电机力矩（`m2jp` 的转置） |
//! | `j2pp` | 关节位置 → Puck 计数（`diag(cpr) * j2mp`） |
//! | `p2jp` | Puck 计数 → 关节位置（`m2jp * diag(rpc)`） |
//! | `j2pt` | 关节力矩 → Puck 电流（`diag(ipnm) * j2mt`） |
//!
//! 每个控制周期调用一次 [`update`](LowLevelWam::update)（读位置、差分求速度）
//! 和一次 [`set_torques`](LowLevelWam::set_torques)（打包写电流）。
//! 两者都不做重试，传输错误直接返回给调用方。

use crate::{
    Clock, DriverError, MonotonicClock, MotorPuck, Puck, PuckGroup, SafetyInterlock, WamSettings,
};
use barrett_can::CommunicationsBus;
use barrett_protocol::{
    BGRP_LOWER_WAM, BGRP_UPPER_WAM, BGRP_WAM, PUCKS_PER_TORQUE_GROUP, Property, RoleOption,
};
use nalgebra::{DMatrix, DVector};
use smallvec::SmallVec;
use std::f64::consts::{PI, TAU};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 低于此固件版本的 Puck 不在 MECH 上提供绝对编码器读数
pub const MIN_ABSOLUTE_ENCODER_VERS: i32 = 118;

/// 默认力矩广播组
pub const DEFAULT_TORQUE_GROUP_IDS: [u32; 2] = [BGRP_LOWER_WAM, BGRP_UPPER_WAM];

/// 零位标定的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroOutcome {
    /// 没有安全模块，无法判断是否已标定，跳过
    NoSafetyModule,
    /// 安全模块报告已经标定过
    AlreadyZeroed,
    /// 用绝对编码器补偿后定义位置
    Compensated,
    /// 直接把当前位置定义为 home
    Uncompensated,
}

/// 低层 WAM
pub struct LowLevelWam {
    bus: Arc<dyn CommunicationsBus>,
    pucks: Vec<MotorPuck>,
    safety: Option<Arc<dyn SafetyInterlock>>,
    wam_group: PuckGroup,
    torque_groups: SmallVec<[PuckGroup; 2]>,
    torque_prop_id: u8,

    home: DVector<f64>,
    j2mp: DMatrix<f64>,
    m2jp: DMatrix<f64>,
    j2mt: DMatrix<f64>,
    j2pp: DMatrix<f64>,
    p2jp: DMatrix<f64>,
    j2pt: DMatrix<f64>,

    pp_counts: Vec<i32>,
    pp: DVector<f64>,
    jp: DVector<f64>,
    jp_1: DVector<f64>,
    jv: DVector<f64>,
    pt: DVector<f64>,

    clock: Box<dyn Clock>,
    last_update: Duration,
}

impl fmt::Debug for LowLevelWam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LowLevelWam")
            .field("dof", &self.dof())
            .field("puck_ids", &self.pucks.iter().map(|p| p.puck().id()).collect::<Vec<_>>())
            .field("torque_groups", &self.torque_groups.iter().map(PuckGroup::id).collect::<Vec<_>>())
            .field("jp", &self.jp.as_slice())
            .finish()
    }
}

impl LowLevelWam {
    /// 按配置中的 Puck ID 连接 Puck 并构造
    pub fn from_config(
        bus: Arc<dyn CommunicationsBus>,
        settings: &WamSettings,
        safety: Option<Arc<dyn SafetyInterlock>>,
    ) -> Result<Self, DriverError> {
        settings.validate()?;
        let pucks = settings
            .puck_ids
            .iter()
            .map(|&id| Puck::new(Arc::clone(&bus), id))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(pucks, safety, settings)
    }

    /// 构造（使用单调时钟）
    ///
    /// # 参数
    ///
    /// - `pucks`: 每个关节一个 Puck，按关节顺序
    /// - `safety`: 安全联锁；`None` 时不做零位标定
    /// - `settings`: home、j2mp、可选的 zeroangle 与力矩组 ID
    ///
    /// # 错误
    ///
    /// - `DriverError::Configuration`: 配置维度错误
    /// - `DriverError::WrongPuckCount`: Puck 数量与配置的自由度不符
    /// - `DriverError::SingularTransform`: j2mp 不可逆
    /// - `DriverError::TooFewTorqueGroups`: 力矩组 ID 不够覆盖全部关节
    /// - `DriverError::IncompatibleProperty`: Puck 对 P/T 的属性 ID 不一致
    pub fn new(
        pucks: Vec<Puck>,
        safety: Option<Arc<dyn SafetyInterlock>>,
        settings: &WamSettings,
    ) -> Result<Self, DriverError> {
        Self::with_clock(pucks, safety, settings, Box::new(MonotonicClock::new()))
    }

    /// 构造并指定 `update` 使用的时间源
    pub fn with_clock(
        mut pucks: Vec<Puck>,
        safety: Option<Arc<dyn SafetyInterlock>>,
        settings: &WamSettings,
        clock: Box<dyn Clock>,
    ) -> Result<Self, DriverError> {
        let dof = settings.dof();
        if pucks.len() != dof {
            return Err(DriverError::WrongPuckCount {
                expected: dof,
                actual: pucks.len(),
            });
        }
        settings.validate()?;
        info!("Constructing LowLevelWam with {} DOF", dof);

        let zeroangle = settings.zeroangle_vector();
        if zeroangle.is_none() {
            warn!("Missing zeroangle vector: no zero-compensation");
        }

        let home = settings.home_vector();
        let j2mp = settings.j2mp_matrix();
        let m2jp = j2mp.clone().try_inverse().ok_or_else(|| {
            warn!("j2mp matrix is not invertible");
            DriverError::SingularTransform
        })?;
        let j2mt = m2jp.transpose();

        Puck::wake(&mut pucks)?;

        let group_ids: &[u32] = if settings.torque_group_ids.is_empty() {
            &DEFAULT_TORQUE_GROUP_IDS
        } else {
            &settings.torque_group_ids
        };
        let needed = dof.div_ceil(PUCKS_PER_TORQUE_GROUP);
        if needed > group_ids.len() {
            return Err(DriverError::TooFewTorqueGroups {
                needed,
                provided: group_ids.len(),
            });
        }
        let torque_groups: SmallVec<[PuckGroup; 2]> = pucks
            .chunks(PUCKS_PER_TORQUE_GROUP)
            .zip(group_ids)
            .map(|(members, &id)| PuckGroup::new(id, members.to_vec()))
            .collect();

        let wam_group = PuckGroup::new(BGRP_WAM, pucks.clone());
        for prop in [Property::P, Property::T] {
            if !wam_group.verify_property(prop) {
                warn!(
                    "Incompatible property {}: some Pucks may still be in Monitor, \
                     or have incompatible firmware versions or ROLEs",
                    prop
                );
                return Err(DriverError::IncompatibleProperty { property: prop });
            }
        }
        let torque_prop_id = wam_group.property_id(Property::T)?;

        let pucks = pucks
            .into_iter()
            .map(MotorPuck::new)
            .collect::<Result<Vec<_>, _>>()?;

        let cpr = DVector::from_iterator(dof, pucks.iter().map(MotorPuck::counts_per_rad));
        let rpc = DVector::from_iterator(dof, pucks.iter().map(MotorPuck::rads_per_count));
        let ipnm = DVector::from_iterator(dof, pucks.iter().map(|p| p.ipnm() as f64));
        let j2pp = DMatrix::from_diagonal(&cpr) * &j2mp;
        let p2jp = &m2jp * DMatrix::from_diagonal(&rpc);
        let j2pt = DMatrix::from_diagonal(&ipnm) * &j2mt;

        let bus = Arc::clone(pucks[0].puck().bus());
        let last_update = clock.now();
        let mut wam = Self {
            bus,
            pucks,
            safety,
            wam_group,
            torque_groups,
            torque_prop_id,
            home,
            j2mp,
            m2jp,
            j2mt,
            j2pp,
            p2jp,
            j2pt,
            pp_counts: vec![0; dof],
            pp: DVector::zeros(dof),
            jp: DVector::zeros(dof),
            jp_1: DVector::zeros(dof),
            jv: DVector::zeros(dof),
            pt: DVector::zeros(dof),
            clock,
            last_update,
        };

        wam.zero_calibrate(zeroangle.as_ref())?;

        // 取得 jp_1 与 last_update 的初值
        wam.update()?;
        wam.jv.fill(0.0);
        Ok(wam)
    }

    /// 零位标定
    ///
    /// 安全模块已标记为零位时什么都不做，因此可以重复调用。
    /// 提供 `zeroangle` 时用绝对编码器补偿：对旧固件、无绝对编码器或标定值越界的关节
    /// 跳过补偿并记录警告。
    pub fn zero_calibrate(&mut self, zeroangle: Option<&DVector<f64>>) -> Result<ZeroOutcome, DriverError> {
        let Some(safety) = self.safety.clone() else {
            warn!("No safety module: WAM may not be zeroed");
            return Ok(ZeroOutcome::NoSafetyModule);
        };
        if safety.is_zeroed()? {
            info!("WAM was already zeroed");
            return Ok(ZeroOutcome::AlreadyZeroed);
        }

        let Some(zeroangle) = zeroangle else {
            let home = self.home.clone();
            self.define_position(&home)?;
            info!("WAM zeroed without zero-compensation");
            return Ok(ZeroOutcome::Uncompensated);
        };
        if zeroangle.len() != self.dof() {
            return Err(DriverError::DimensionMismatch {
                expected: self.dof(),
                actual: zeroangle.len(),
            });
        }

        let mut current = DVector::zeros(self.dof());
        for (angle, motor) in current.iter_mut().zip(&self.pucks) {
            *angle = motor.counts_to_rad(motor.puck().get_property(Property::Mech, false)?);
        }

        let mut error = &self.j2mp * &self.home + zeroangle - current;
        for (i, motor) in self.pucks.iter().enumerate() {
            let puck = motor.puck();
            if puck.firmware_version() < MIN_ABSOLUTE_ENCODER_VERS {
                warn!("No zero-compensation for Puck {}: old firmware", puck.id());
                error[i] = 0.0;
            } else if !puck.has_option(RoleOption::MagEncOnSerial) {
                warn!("No zero-compensation for Puck {}: no absolute encoder", puck.id());
                error[i] = 0.0;
            } else if !(0.0..TAU).contains(&zeroangle[i]) || !error[i].is_finite() {
                warn!("No zero-compensation for Puck {}: bad calibration data", puck.id());
                error[i] = 0.0;
            } else {
                error[i] = wrap_to_pi(error[i]);
            }
        }

        let position = &self.home - &self.m2jp * error;
        self.define_position(&position)?;
        info!("WAM zeroed with zero-compensation");
        Ok(ZeroOutcome::Compensated)
    }

    /// 读取位置并更新速度（控制周期内调用）
    ///
    /// 速度是原始差分 `(jp - jp_prev) / dt`，不做滤波；两次调用之间时钟未前进
    /// （`dt == 0`）时速度为非有限值。
    pub fn update(&mut self) -> Result<(), DriverError> {
        let now = self.clock.now();
        self.wam_group
            .read_packed_positions_into(&mut self.pp_counts, true)?;
        for (dst, &counts) in self.pp.iter_mut().zip(&self.pp_counts) {
            *dst = counts as f64;
        }

        self.p2jp.mul_to(&self.pp, &mut self.jp);
        let dt = now.saturating_sub(self.last_update).as_secs_f64();
        self.jv.copy_from(&self.jp);
        self.jv -= &self.jp_1;
        self.jv /= dt;
        // TODO: reject velocity spikes (e.g. right after define_position) before they reach controllers

        self.jp_1.copy_from(&self.jp);
        self.last_update = now;
        Ok(())
    }

    /// 发送关节力矩（控制周期内调用，无应答）
    pub fn set_torques(&mut self, jt: &DVector<f64>) -> Result<(), DriverError> {
        if jt.len() != self.dof() {
            return Err(DriverError::DimensionMismatch {
                expected: self.dof(),
                actual: jt.len(),
            });
        }
        self.j2pt.mul_to(jt, &mut self.pt);

        let pt = self.pt.as_slice();
        for (group, chunk) in self.torque_groups.iter().zip(pt.chunks(PUCKS_PER_TORQUE_GROUP)) {
            MotorPuck::send_packed_torques(self.bus.as_ref(), group.id(), self.torque_prop_id, chunk)?;
        }
        Ok(())
    }

    /// 把当前姿态定义为 `jp`（直接改写每个 Puck 的位置寄存器）
    pub fn define_position(&mut self, jp: &DVector<f64>) -> Result<(), DriverError> {
        if jp.len() != self.dof() {
            return Err(DriverError::DimensionMismatch {
                expected: self.dof(),
                actual: jp.len(),
            });
        }
        // 位置会发生跳变
        if let Some(safety) = &self.safety {
            safety.suppress_next_velocity_fault()?;
        }

        self.j2pp.mul_to(jp, &mut self.pp);
        {
            // 与控制周期中的读取互斥
            let _guard = self.bus.mutex().lock();
            for (motor, &counts) in self.pucks.iter().zip(self.pp.iter()) {
                motor
                    .puck()
                    .set_property(Property::P, counts.floor() as i32, false)?;
            }
        }
        debug!("Defined joint position {:?}", jp.as_slice());

        if let Some(safety) = &self.safety {
            safety.set_zeroed()?;
        }
        Ok(())
    }

    pub fn dof(&self) -> usize {
        self.pucks.len()
    }

    pub fn joint_positions(&self) -> &DVector<f64> {
        &self.jp
    }

    pub fn joint_velocities(&self) -> &DVector<f64> {
        &self.jv
    }

    /// 最近一次读取或写入的 Puck 位置（计数）
    pub fn puck_positions(&self) -> &DVector<f64> {
        &self.pp
    }

    /// 最近一次发送的 Puck 电流
    pub fn puck_torques(&self) -> &DVector<f64> {
        &self.pt
    }

    pub fn home(&self) -> &DVector<f64> {
        &self.home
    }

    pub fn j2mp(&self) -> &DMatrix<f64> {
        &self.j2mp
    }

    pub fn m2jp(&self) -> &DMatrix<f64> {
        &self.m2jp
    }

    pub fn j2mt(&self) -> &DMatrix<f64> {
        &self.j2mt
    }

    pub fn j2pp(&self) -> &DMatrix<f64> {
        &self.j2pp
    }

    pub fn p2jp(&self) -> &DMatrix<f64> {
        &self.p2jp
    }

    pub fn j2pt(&self) -> &DMatrix<f64> {
        &self.j2pt
    }

    pub fn torque_groups(&self) -> &[PuckGroup] {
        &self.torque_groups
    }

    pub fn torque_property_id(&self) -> u8 {
        self.torque_prop_id
    }

    pub fn wam_group(&self) -> &PuckGroup {
        &self.wam_group
    }

    pub fn pucks(&self) -> &[MotorPuck] {
        &self.pucks
    }

    pub fn safety_module(&self) -> Option<&Arc<dyn SafetyInterlock>> {
        self.safety.as_ref()
    }

    pub fn bus(&self) -> &Arc<dyn CommunicationsBus> {
        &self.bus
    }
}

/// 把角度折回 [-π, π]
/// 把有限角度折回 [-π, π]
fn wrap_to_pi(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped == -PI && angle > 0.0 { PI } else { wrapped }
}
