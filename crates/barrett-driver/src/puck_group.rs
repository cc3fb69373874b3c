//! Puck 广播组
//!
//! 一次请求发往组 ID，组内每个成员各自应答；成员的顺序就是结果的顺序。

use crate::{DriverError, Puck};
use barrett_can::CommunicationsBus;
use barrett_protocol::{
    Property, encode_get_request, parse_position_reply, parse_standard_reply,
    position_reply_bus_id, standard_reply_bus_id,
};
use std::sync::Arc;

/// 一组共享广播 ID 的 Puck
#[derive(Debug, Clone)]
pub struct PuckGroup {
    id: u32,
    pucks: Vec<Puck>,
}

impl PuckGroup {
    /// 创建广播组
    ///
    /// # 参数
    ///
    /// - `id`: 广播组 ID（例如 `BGRP_WAM`）
    /// - `pucks`: 组成员，顺序决定读取结果与打包力矩的槽位
    pub fn new(id: u32, pucks: Vec<Puck>) -> Self {
        Self { id, pucks }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn pucks(&self) -> &[Puck] {
        &self.pucks
    }

    pub fn len(&self) -> usize {
        self.pucks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pucks.is_empty()
    }

    fn bus(&self) -> Result<&Arc<dyn CommunicationsBus>, DriverError> {
        self.pucks
            .first()
            .map(Puck::bus)
            .ok_or_else(|| DriverError::Configuration(format!("Puck group 0x{:03X} is empty", self.id)))
    }

    /// 组内所有成员是否把 `prop` 映射到同一个数值 ID
    pub fn verify_property(&self, prop: Property) -> bool {
        let mut ids = self.pucks.iter().map(|p| p.property_id(prop).ok());
        match ids.next() {
            Some(Some(first)) => ids.all(|id| id == Some(first)),
            _ => false,
        }
    }

    /// 组内统一的属性 ID
    ///
    /// # 错误
    ///
    /// - `DriverError::IncompatibleProperty`: 成员之间不一致
    pub fn property_id(&self, prop: Property) -> Result<u8, DriverError> {
        if !self.verify_property(prop) {
            return Err(DriverError::IncompatibleProperty { property: prop });
        }
        self.pucks[0].property_id(prop)
    }

    /// 广播读取，按成员顺序返回各自的标准应答
    pub fn get_property(&self, prop: Property, realtime: bool) -> Result<Vec<i32>, DriverError> {
        let prop_id = self.property_id(prop)?;
        let bus = self.bus()?;
        let _guard = bus.mutex().lock();

        let request = encode_get_request(self.id, prop_id);
        bus.send(request.id, request.data_slice())?;
        self.pucks
            .iter()
            .map(|puck| {
                let reply = bus
                    .receive(standard_reply_bus_id(puck.id()), true, realtime)?
                    .ok_or(DriverError::Timeout)?;
                Ok(parse_standard_reply(prop_id, reply.data_slice())?)
            })
            .collect()
    }

    /// 广播读取 P，各成员以打包位置格式应答
    pub fn get_property_packed_positions(&self, realtime: bool) -> Result<Vec<i32>, DriverError> {
        let mut positions = vec![0; self.pucks.len()];
        self.read_packed_positions_into(&mut positions, realtime)?;
        Ok(positions)
    }

    /// 与 [`get_property_packed_positions`](Self::get_property_packed_positions) 相同，
    /// 结果写入调用方提供的缓冲区（控制周期内不分配）
    pub fn read_packed_positions_into(&self, out: &mut [i32], realtime: bool) -> Result<(), DriverError> {
        if out.len() != self.pucks.len() {
            return Err(DriverError::DimensionMismatch {
                expected: self.pucks.len(),
                actual: out.len(),
            });
        }
        let prop_id = self.property_id(Property::P)?;
        let bus = self.bus()?;
        let _guard = bus.mutex().lock();

        let request = encode_get_request(self.id, prop_id);
        bus.send(request.id, request.data_slice())?;
        for (slot, puck) in out.iter_mut().zip(&self.pucks) {
            let reply = bus
                .receive(position_reply_bus_id(puck.id()), true, realtime)?
                .ok_or(DriverError::Timeout)?;
            *slot = parse_position_reply(reply.data_slice())?;
        }
        Ok(())
    }

    /// 广播写入
    pub fn set_property(&self, prop: Property, value: i32) -> Result<(), DriverError> {
        let prop_id = self.property_id(prop)?;
        Puck::set_property_by_id(self.bus()?.as_ref(), self.id, prop_id, value)
    }
}
