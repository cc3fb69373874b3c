//! Puck 事务端点
//!
//! 每个 Puck 是总线上的一个节点（ID 1..=31）。属性读写使用标准请求/应答：
//! GET 发一个字节，应答落在 `encode_bus_id(id, FGRP_OTHER)` 上；SET 发六个字节，没有应答。
//!
//! 属性 ID 取决于 Puck 当前运行的固件（Monitor 或应用固件），
//! 所以每次读写都用 [`Puck::effective_type`] 查表。

use crate::DriverError;
use barrett_can::CommunicationsBus;
use barrett_protocol::{
    Property, PuckRole, PuckStatus, PuckType, RoleOption, encode_get_request, encode_set_request,
    parse_standard_reply, property_id, responds_to, standard_reply_bus_id, validate_node_id,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace};

/// 唤醒时序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeTiming {
    /// 依次唤醒两个 Puck 之间的间隔（等待上一个 Puck 的收发器下线）
    pub turn_off: Duration,
    /// 全部发出唤醒命令后的等待时间
    pub wake_up: Duration,
    /// 唤醒后读取 STAT 时的等待时间
    pub response: Duration,
}

impl Default for WakeTiming {
    fn default() -> Self {
        Self {
            turn_off: Duration::from_millis(10),
            wake_up: Duration::from_secs(1),
            response: Duration::from_millis(50),
        }
    }
}

/// 单个 Puck
#[derive(Clone)]
pub struct Puck {
    bus: Arc<dyn CommunicationsBus>,
    id: u32,
    vers: i32,
    role: PuckRole,
    puck_type: PuckType,
    effective_type: PuckType,
}

impl fmt::Debug for Puck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Puck")
            .field("id", &self.id)
            .field("vers", &self.vers)
            .field("puck_type", &self.puck_type)
            .field("effective_type", &self.effective_type)
            .finish()
    }
}

impl Puck {
    /// 连接到总线上的 Puck，读取 ROLE、VERS 与 STAT
    ///
    /// # 错误
    ///
    /// - `ProtocolError::InvalidNodeId`: ID 不在 1..=31
    /// - `DriverError::Can`: Puck 没有应答
    /// - `DriverError::BadStatus`: STAT 既不是 Reset 也不是 Ready
    pub fn new(bus: Arc<dyn CommunicationsBus>, id: u32) -> Result<Self, DriverError> {
        let id = validate_node_id(id)?;
        let mut puck = Self {
            bus,
            id,
            vers: -1,
            role: PuckRole::from_raw(0),
            puck_type: PuckType::Unknown,
            effective_type: PuckType::Monitor,
        };
        puck.update_role()?;
        puck.update_status()?;
        Ok(puck)
    }

    /// 重新读取 ROLE，更新 Puck 类型
    pub fn update_role(&mut self) -> Result<(), DriverError> {
        let raw = self.get_property_with(PuckType::Monitor, Property::Role, false)?;
        self.role = PuckRole::from_raw(raw);
        self.puck_type = self.role.puck_type();
        Ok(())
    }

    /// 重新读取 STAT 与 VERS
    ///
    /// STAT=Reset 表示 Puck 仍在 Monitor 固件中，此时按 Monitor 属性表通信。
    pub fn update_status(&mut self) -> Result<(), DriverError> {
        let stat = self.get_property_with(PuckType::Monitor, Property::Stat, false)?;
        self.effective_type = match PuckStatus::try_from(stat) {
            Ok(PuckStatus::Reset) => PuckType::Monitor,
            Ok(PuckStatus::Ready) => self.puck_type,
            _ => {
                error!("Puck {} reported bad STAT value {}", self.id, stat);
                return Err(DriverError::BadStatus {
                    id: self.id,
                    value: stat,
                });
            },
        };
        self.vers = self.get_property_with(PuckType::Monitor, Property::Vers, false)?;
        debug!(
            "Puck {}: type={}, effective={}, vers={}",
            self.id, self.puck_type, self.effective_type, self.vers
        );
        Ok(())
    }

    /// 读取属性（阻塞）
    ///
    /// `realtime` 为 `true` 时使用总线的实时超时。
    pub fn get_property(&self, prop: Property, realtime: bool) -> Result<i32, DriverError> {
        self.get_property_with(self.effective_type, prop, realtime)
    }

    fn get_property_with(
        &self,
        table: PuckType,
        prop: Property,
        realtime: bool,
    ) -> Result<i32, DriverError> {
        let prop_id = property_id(table, prop)?;
        Self::get_property_by_id(self.bus.as_ref(), self.id, prop_id, realtime)
    }

    /// 尝试读取属性：发出请求，等待 `wait`，然后非阻塞地取应答
    ///
    /// # 返回
    ///
    /// - `Ok(Some(value))`: 收到应答
    /// - `Ok(None)`: 没有应答
    pub fn try_get_property(&self, prop: Property, wait: Duration) -> Result<Option<i32>, DriverError> {
        let prop_id = self.property_id(prop)?;
        Self::try_get_property_by_id(self.bus.as_ref(), self.id, prop_id, wait)
    }

    /// 写入属性
    ///
    /// `blocking` 为 `true` 时随后读取一次 STAT，确认 Puck 已处理完这条 SET。
    pub fn set_property(&self, prop: Property, value: i32, blocking: bool) -> Result<(), DriverError> {
        let prop_id = self.property_id(prop)?;
        Self::set_property_by_id(self.bus.as_ref(), self.id, prop_id, value)?;
        if blocking {
            self.get_property(Property::Stat, false)?;
        }
        Ok(())
    }

    /// 按数值 ID 读取（阻塞）
    pub fn get_property_by_id(
        bus: &dyn CommunicationsBus,
        id: u32,
        prop_id: u8,
        realtime: bool,
    ) -> Result<i32, DriverError> {
        let _guard = bus.mutex().lock();
        let request = encode_get_request(id, prop_id);
        bus.send(request.id, request.data_slice())?;
        let reply = bus
            .receive(standard_reply_bus_id(id), true, realtime)?
            .ok_or(DriverError::Timeout)?;
        trace!("Puck {} property {} reply: {:?}", id, prop_id, reply.data_slice());
        Ok(parse_standard_reply(prop_id, reply.data_slice())?)
    }

    /// 按数值 ID 尝试读取
    pub fn try_get_property_by_id(
        bus: &dyn CommunicationsBus,
        id: u32,
        prop_id: u8,
        wait: Duration,
    ) -> Result<Option<i32>, DriverError> {
        let request = encode_get_request(id, prop_id);
        bus.send(request.id, request.data_slice())?;
        if !wait.is_zero() {
            spin_sleep::sleep(wait);
        }
        match bus.receive(standard_reply_bus_id(id), false, false)? {
            Some(reply) => Ok(Some(parse_standard_reply(prop_id, reply.data_slice())?)),
            None => Ok(None),
        }
    }

    /// 按数值 ID 写入（节点或广播组均可）
    pub fn set_property_by_id(
        bus: &dyn CommunicationsBus,
        id: u32,
        prop_id: u8,
        value: i32,
    ) -> Result<(), DriverError> {
        let request = encode_set_request(id, prop_id, value);
        bus.send(request.id, request.data_slice())?;
        Ok(())
    }

    /// 唤醒仍在 Monitor 固件中的 Puck（默认时序）
    pub fn wake(pucks: &mut [Puck]) -> Result<(), DriverError> {
        Self::wake_with_timing(pucks, WakeTiming::default())
    }

    /// 唤醒仍在 Monitor 固件中的 Puck
    ///
    /// 全部 Puck 已经醒着时直接返回。否则在持有总线事务锁的情况下依次写 STAT=Ready，
    /// 等待上电完成后逐个确认；任何一个没有以 Ready 应答都会失败。
    ///
    /// # 错误
    ///
    /// - `DriverError::WakeFailed`: 某个 Puck 没有应答，或应答不是 Ready
    pub fn wake_with_timing(pucks: &mut [Puck], timing: WakeTiming) -> Result<(), DriverError> {
        if pucks.iter().all(|p| p.effective_type != PuckType::Monitor) {
            return Ok(());
        }
        let bus = Arc::clone(&pucks[0].bus);
        let ready: i32 = PuckStatus::Ready.into();

        {
            // 上电期间总线上不能有其它通信，否则主机可能进入 bus-off
            let _guard = bus.mutex().lock();
            for puck in pucks.iter() {
                info!("Waking Puck {}", puck.id);
                puck.set_property(Property::Stat, ready, false)?;
                spin_sleep::sleep(timing.turn_off);
            }
            spin_sleep::sleep(timing.wake_up);
        }

        for puck in pucks.iter_mut() {
            match puck.try_get_property(Property::Stat, timing.response)? {
                Some(stat) if stat == ready => puck.update_status()?,
                Some(stat) => {
                    error!("Failed to wake Puck {}: STAT={}", puck.id, stat);
                    return Err(DriverError::WakeFailed { id: puck.id });
                },
                None => {
                    error!(
                        "Failed to wake Puck {}: no response after waiting {:.2}s",
                        puck.id,
                        timing.wake_up.as_secs_f64()
                    );
                    return Err(DriverError::WakeFailed { id: puck.id });
                },
            }
        }
        Ok(())
    }

    /// 当前固件中属性的数值 ID
    pub fn property_id(&self, prop: Property) -> Result<u8, DriverError> {
        Ok(property_id(self.effective_type, prop)?)
    }

    /// 当前固件是否支持该属性
    pub fn responds_to(&self, prop: Property) -> bool {
        responds_to(self.effective_type, prop)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn firmware_version(&self) -> i32 {
        self.vers
    }

    pub fn role(&self) -> PuckRole {
        self.role
    }

    /// ROLE 中是否带有某个硬件选项
    pub fn has_option(&self, option: RoleOption) -> bool {
        self.role.has_option(option)
    }

    /// 由 ROLE 推断出的类型
    pub fn puck_type(&self) -> PuckType {
        self.puck_type
    }

    /// 当前通信使用的属性表（Monitor 或 `puck_type`）
    pub fn effective_type(&self) -> PuckType {
        self.effective_type
    }

    pub fn bus(&self) -> &Arc<dyn CommunicationsBus> {
        &self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use barrett_can::BusManager;
    use barrett_can::mock::{SimMotorPuck, SimulatedPuckNetwork};

    fn fast_timing() -> WakeTiming {
        WakeTiming {
            turn_off: Duration::ZERO,
            wake_up: Duration::ZERO,
            response: Duration::ZERO,
        }
    }

    fn bus_with(net: &SimulatedPuckNetwork) -> Arc<dyn CommunicationsBus> {
        Arc::new(BusManager::new(net.clone()))
    }

    #[test]
    fn test_new_reads_role_and_status() {
        let net = SimulatedPuckNetwork::new();
        net.add_motor_puck(3, SimMotorPuck::default(), &[]);
        net.add_safety_puck(10, 150, false);
        let bus = bus_with(&net);

        let motor = Puck::new(Arc::clone(&bus), 3).unwrap();
        assert_eq!(motor.puck_type(), PuckType::Motor);
        assert_eq!(motor.effective_type(), PuckType::Motor);
        assert_eq!(motor.firmware_version(), 200);
        assert!(motor.has_option(RoleOption::MagEncOnSerial));

        let safety = Puck::new(bus, 10).unwrap();
        assert_eq!(safety.puck_type(), PuckType::Safety);
        assert_eq!(safety.firmware_version(), 150);
    }

    #[test]
    fn test_new_rejects_bad_id() {
        let net = SimulatedPuckNetwork::new();
        let result = Puck::new(bus_with(&net), 32);
        assert!(matches!(result, Err(DriverError::Protocol(_))));
    }

    #[test]
    fn test_missing_puck_times_out() {
        let net = SimulatedPuckNetwork::new();
        let result = Puck::new(bus_with(&net), 5);
        assert!(matches!(
            result,
            Err(DriverError::Can(barrett_can::CanError::Timeout))
        ));
    }

    #[test]
    fn test_bad_stat_value() {
        let net = SimulatedPuckNetwork::new();
        net.add_motor_puck(1, SimMotorPuck::default(), &[]);
        let bus = bus_with(&net);
        let stat = property_id(PuckType::Monitor, Property::Stat).unwrap();
        // 模拟 Puck 报告 STAT=Error
        Puck::set_property_by_id(bus.as_ref(), 1, stat, 1).unwrap();

        let result = Puck::new(bus, 1);
        assert!(matches!(
            result,
            Err(DriverError::BadStatus { id: 1, value: 1 })
        ));
    }

    #[test]
    fn test_get_and_set_property() {
        let net = SimulatedPuckNetwork::new();
        net.add_motor_puck(2, SimMotorPuck::default(), &[]);
        let puck = Puck::new(bus_with(&net), 2).unwrap();

        assert_eq!(puck.get_property(Property::Cts, false).unwrap(), 4096);
        puck.set_property(Property::P, -1234, true).unwrap();
        assert_eq!(net.property(2, Property::P), Some(-1234));
        assert_eq!(puck.get_property(Property::P, true).unwrap(), -1234);
    }

    #[test]
    fn test_try_get_property_without_reply() {
        let net = SimulatedPuckNetwork::new();
        net.add_motor_puck(2, SimMotorPuck::default(), &[]);
        let puck = Puck::new(bus_with(&net), 2).unwrap();

        net.set_silent(2, true);
        assert_eq!(puck.try_get_property(Property::Cts, Duration::ZERO).unwrap(), None);
        net.set_silent(2, false);
        assert_eq!(
            puck.try_get_property(Property::Cts, Duration::ZERO).unwrap(),
            Some(4096)
        );
    }

    #[test]
    fn test_wake_brings_monitor_pucks_online() {
        let net = SimulatedPuckNetwork::new();
        for id in 1..=2 {
            net.add_motor_puck(
                id,
                SimMotorPuck {
                    asleep: true,
                    ..SimMotorPuck::default()
                },
                &[],
            );
        }
        let bus = bus_with(&net);
        let mut pucks: Vec<_> = (1..=2).map(|id| Puck::new(Arc::clone(&bus), id).unwrap()).collect();
        assert!(pucks.iter().all(|p| p.effective_type() == PuckType::Monitor));
        // Monitor 固件不支持 CTS
        assert!(!pucks[0].responds_to(Property::Cts));

        Puck::wake_with_timing(&mut pucks, fast_timing()).unwrap();
        assert!(pucks.iter().all(|p| p.effective_type() == PuckType::Motor));
        assert!(pucks[0].responds_to(Property::Cts));
    }

    #[test]
    fn test_wake_fails_for_silent_puck() {
        let net = SimulatedPuckNetwork::new();
        net.add_motor_puck(
            4,
            SimMotorPuck {
                asleep: true,
                ..SimMotorPuck::default()
            },
            &[],
        );
        let bus = bus_with(&net);
        let mut pucks = vec![Puck::new(bus, 4).unwrap()];
        net.set_silent(4, true);

        let result = Puck::wake_with_timing(&mut pucks, fast_timing());
        assert!(matches!(result, Err(DriverError::WakeFailed { id: 4 })));
    }

    #[test]
    fn test_wake_is_noop_when_awake() {
        let net = SimulatedPuckNetwork::new();
        net.add_motor_puck(1, SimMotorPuck::default(), &[]);
        let bus = bus_with(&net);
        let mut pucks = vec![Puck::new(bus, 1).unwrap()];
        net.clear_sent();

        Puck::wake(&mut pucks).unwrap();
        assert!(net.sent_frames().is_empty());
    }
}
