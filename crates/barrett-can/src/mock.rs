//! 仿真 Puck 网络
//!
//! 在没有硬件的情况下模拟一组 Puck 的总线行为：
//!
//! - GET 请求 → 标准应答（发往节点）或打包位置应答（发往广播组的 P）
//! - SET 请求 → 写入属性；对 Monitor 状态的 Puck 写 STAT=Ready 会将其唤醒
//! - 打包力矩 → 按组内顺序写入各 Puck 的 T
//!
//! 所有应答在 `send` 时立即排入接收队列，因此仿真是确定性的。
//! `SimulatedPuckNetwork` 可以克隆：一份交给 `BusManager`，一份留在测试里检查状态。

use crate::{BarrettFrame, CanAdapter, CanError};
use barrett_protocol::{
    BGRP_WHOLE_BUS, GROUP_MASK, Property, PuckStatus, PuckType, SET_MASK, bus_id_to_to_node,
    decode_packed_torques, encode_position_reply, encode_standard_reply, is_group_id,
    property_id, role::product,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

/// 仿真电机 Puck 的参数
#[derive(Debug, Clone)]
pub struct SimMotorPuck {
    pub vers: i32,
    pub role: i32,
    pub cts: i32,
    pub ipnm: i32,
    pub position: i32,
    pub mech: i32,
    /// 上电后停留在 Monitor 固件
    pub asleep: bool,
}

impl Default for SimMotorPuck {
    fn default() -> Self {
        Self {
            vers: 200,
            // TATER + 串口绝对编码器
            role: product::TATER as i32 | 0x0100,
            cts: 4096,
            ipnm: 2700,
            position: 0,
            mech: 0,
            asleep: false,
        }
    }
}

#[derive(Debug)]
struct SimPuck {
    awake_type: PuckType,
    status: PuckStatus,
    props: HashMap<Property, i32>,
    groups: Vec<u32>,
    silent: bool,
}

impl SimPuck {
    fn effective_type(&self) -> PuckType {
        match self.status {
            PuckStatus::Ready => self.awake_type,
            _ => PuckType::Monitor,
        }
    }

    fn get(&self, prop: Property) -> i32 {
        match prop {
            Property::Stat => self.status.into(),
            _ => self.props.get(&prop).copied().unwrap_or(0),
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    pucks: BTreeMap<u32, SimPuck>,
    /// 组 ID → 按加入顺序排列的成员
    group_members: HashMap<u32, Vec<u32>>,
    rx: VecDeque<BarrettFrame>,
    sent: Vec<BarrettFrame>,
    reply_len: usize,
}

/// 仿真 Puck 网络（实现 [`CanAdapter`]）
#[derive(Debug, Clone)]
pub struct SimulatedPuckNetwork {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimulatedPuckNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPuckNetwork {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                reply_len: 6,
                ..SimState::default()
            })),
        }
    }

    /// 添加电机 Puck，并加入指定的广播组
    pub fn add_motor_puck(&self, id: u32, spec: SimMotorPuck, groups: &[u32]) {
        let props = HashMap::from([
            (Property::Vers, spec.vers),
            (Property::Role, spec.role),
            (Property::Id, id as i32),
            (Property::Cts, spec.cts),
            (Property::Ipnm, spec.ipnm),
            (Property::P, spec.position),
            (Property::Mech, spec.mech),
            (Property::T, 0),
        ]);
        let status = if spec.asleep {
            PuckStatus::Reset
        } else {
            PuckStatus::Ready
        };
        self.add_puck(id, PuckType::Motor, status, props, groups);
    }

    /// 添加安全模块 Puck
    pub fn add_safety_puck(&self, id: u32, vers: i32, zeroed: bool) {
        let props = HashMap::from([
            (Property::Vers, vers),
            (Property::Role, product::SAFETY as i32),
            (Property::Id, id as i32),
            (Property::Zero, zeroed as i32),
            (Property::Mode, 1),
        ]);
        self.add_puck(id, PuckType::Safety, PuckStatus::Ready, props, &[]);
    }

    fn add_puck(
        &self,
        id: u32,
        awake_type: PuckType,
        status: PuckStatus,
        props: HashMap<Property, i32>,
        groups: &[u32],
    ) {
        let mut state = self.state.lock();
        for &group in groups {
            state.group_members.entry(group | GROUP_MASK).or_default().push(id);
        }
        state.pucks.insert(
            id,
            SimPuck {
                awake_type,
                status,
                props,
                groups: groups.iter().map(|g| g | GROUP_MASK).collect(),
                silent: false,
            },
        );
    }

    /// 标准应答的长度（4 或 6）
    pub fn set_reply_len(&self, len: usize) {
        self.state.lock().reply_len = len;
    }

    /// 让某个 Puck 停止应答
    pub fn set_silent(&self, id: u32, silent: bool) {
        if let Some(puck) = self.state.lock().pucks.get_mut(&id) {
            puck.silent = silent;
        }
    }

    /// 直接写入 Puck 属性（绕过总线）
    pub fn set_property(&self, id: u32, prop: Property, value: i32) {
        if let Some(puck) = self.state.lock().pucks.get_mut(&id) {
            puck.props.insert(prop, value);
        }
    }

    /// 直接读取 Puck 属性（绕过总线）
    pub fn property(&self, id: u32, prop: Property) -> Option<i32> {
        self.state.lock().pucks.get(&id).map(|puck| puck.get(prop))
    }

    /// 向接收队列注入任意帧
    pub fn inject(&self, frame: BarrettFrame) {
        self.state.lock().rx.push_back(frame);
    }

    /// 主机发出的全部帧
    pub fn sent_frames(&self) -> Vec<BarrettFrame> {
        self.state.lock().sent.clone()
    }

    /// 清空发送日志
    pub fn clear_sent(&self) {
        self.state.lock().sent.clear();
    }

    fn recipients(state: &SimState, to: u32) -> Vec<u32> {
        if to == BGRP_WHOLE_BUS {
            state.pucks.keys().copied().collect()
        } else if is_group_id(to) {
            state.group_members.get(&to).cloned().unwrap_or_default()
        } else {
            state.pucks.contains_key(&to).then_some(to).into_iter().collect()
        }
    }

    fn handle(state: &mut SimState, frame: BarrettFrame) {
        let to = bus_id_to_to_node(frame.id);
        let data = frame.data_slice();
        if data.is_empty() {
            return;
        }
        let prop_id = data[0] & !SET_MASK;
        let is_set = data[0] & SET_MASK != 0;

        for id in Self::recipients(state, to) {
            let reply_len = state.reply_len;
            let Some(puck) = state.pucks.get_mut(&id) else {
                continue;
            };
            let pt = puck.effective_type();
            let Some(prop) = Property::from_id(pt, prop_id) else {
                continue;
            };

            if !is_set {
                if puck.silent {
                    continue;
                }
                let value = puck.get(prop);
                let reply = if prop == Property::P && is_group_id(to) {
                    encode_position_reply(id, value)
                } else {
                    encode_standard_reply(id, prop_id, value, reply_len)
                };
                state.rx.push_back(reply);
            } else if data.len() == 8 {
                let Ok((_, torques)) = decode_packed_torques(data) else {
                    continue;
                };
                let slot = state
                    .group_members
                    .get(&to)
                    .and_then(|members| members.iter().position(|&m| m == id));
                if let (Some(slot), Some(puck)) = (slot, state.pucks.get_mut(&id)) {
                    if slot < torques.len() {
                        puck.props.insert(prop, torques[slot]);
                    }
                }
            } else if data.len() >= 6 {
                let value = i32::from_le_bytes([data[2], data[3], data[4], data[5]]);
                if prop == Property::Stat {
                    if let Ok(status) = PuckStatus::try_from(value) {
                        puck.status = status;
                    }
                } else {
                    puck.props.insert(prop, value);
                }
            }
        }
    }
}

impl CanAdapter for SimulatedPuckNetwork {
    fn send(&mut self, frame: BarrettFrame) -> Result<(), CanError> {
        let mut state = self.state.lock();
        state.sent.push(frame);
        Self::handle(&mut state, frame);
        Ok(())
    }

    fn receive(&mut self) -> Result<BarrettFrame, CanError> {
        self.state.lock().rx.pop_front().ok_or(CanError::Timeout)
    }
}

/// 仿真网络中某类型 Puck 的属性 ID（测试辅助）
pub fn sim_property_id(puck_type: PuckType, prop: Property) -> u8 {
    property_id(puck_type, prop).unwrap_or(u8::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BusManager, CommunicationsBus};
    use barrett_protocol::{
        BGRP_LOWER_WAM, encode_get_request, encode_packed_torques, encode_set_request,
        parse_position_reply, parse_standard_reply, position_reply_bus_id, standard_reply_bus_id,
    };

    fn network() -> SimulatedPuckNetwork {
        let net = SimulatedPuckNetwork::new();
        for id in 1..=4 {
            net.add_motor_puck(
                id,
                SimMotorPuck {
                    position: id as i32 * 100,
                    ..SimMotorPuck::default()
                },
                &[BGRP_LOWER_WAM],
            );
        }
        net.add_safety_puck(10, 150, false);
        net
    }

    #[test]
    fn test_standard_get_reply() {
        let net = network();
        let bus = BusManager::new(net.clone());
        let cts = sim_property_id(PuckType::Motor, Property::Cts);

        let req = encode_get_request(2, cts);
        bus.send(req.id, req.data_slice()).unwrap();
        let reply = bus.receive(standard_reply_bus_id(2), true, false).unwrap().unwrap();
        assert_eq!(parse_standard_reply(cts, reply.data_slice()), Ok(4096));
    }

    #[test]
    fn test_group_position_reply() {
        let net = network();
        let bus = BusManager::new(net.clone());
        let p = sim_property_id(PuckType::Motor, Property::P);

        let req = encode_get_request(BGRP_LOWER_WAM, p);
        bus.send(req.id, req.data_slice()).unwrap();
        for id in 1..=4u32 {
            let reply = bus.receive(position_reply_bus_id(id), true, true).unwrap().unwrap();
            assert_eq!(parse_position_reply(reply.data_slice()), Ok(id as i32 * 100));
        }
    }

    #[test]
    fn test_set_and_packed_torques() {
        let net = network();
        let bus = BusManager::new(net.clone());
        let p = sim_property_id(PuckType::Motor, Property::P);
        let t = sim_property_id(PuckType::Motor, Property::T);

        let req = encode_set_request(3, p, -77);
        bus.send(req.id, req.data_slice()).unwrap();
        assert_eq!(net.property(3, Property::P), Some(-77));

        let frame = encode_packed_torques(BGRP_LOWER_WAM, t, &[10.0, 20.0, 30.0, 40.0]).unwrap();
        bus.send(frame.id, frame.data_slice()).unwrap();
        for id in 1..=4u32 {
            assert_eq!(net.property(id, Property::T), Some(id as i32 * 10));
        }
    }

    #[test]
    fn test_asleep_puck_wakes_on_stat_ready() {
        let net = SimulatedPuckNetwork::new();
        net.add_motor_puck(
            5,
            SimMotorPuck {
                asleep: true,
                ..SimMotorPuck::default()
            },
            &[],
        );
        assert_eq!(net.property(5, Property::Stat), Some(0));

        let mut adapter = net.clone();
        let stat = sim_property_id(PuckType::Monitor, Property::Stat);
        adapter.send(encode_set_request(5, stat, 2)).unwrap();
        assert_eq!(net.property(5, Property::Stat), Some(2));
    }

    #[test]
    fn test_enumerate_finds_pucks() {
        let net = network();
        let bus = BusManager::new(net.clone());
        assert_eq!(bus.enumerate().unwrap(), vec![1, 2, 3, 4, 10]);
    }
}
