//! 电机 Puck：编码器与电流标定常数

use crate::{DriverError, Puck};
use barrett_can::CommunicationsBus;
use barrett_protocol::{Property, encode_packed_torques};
use std::f64::consts::TAU;

/// 电机 Puck
#[derive(Debug, Clone)]
pub struct MotorPuck {
    puck: Puck,
    cts: i32,
    rpc: f64,
    cpr: f64,
    ipnm: i32,
}

impl MotorPuck {
    /// 读取 CTS（每转计数）与 IPNM（每牛米电流）
    ///
    /// # 错误
    ///
    /// - `DriverError::Configuration`: CTS 不是正数
    pub fn new(puck: Puck) -> Result<Self, DriverError> {
        let cts = puck.get_property(Property::Cts, false)?;
        if cts <= 0 {
            return Err(DriverError::Configuration(format!(
                "Puck {} reported CTS={}",
                puck.id(),
                cts
            )));
        }
        let ipnm = puck.get_property(Property::Ipnm, false)?;
        Ok(Self {
            puck,
            cts,
            rpc: TAU / cts as f64,
            cpr: cts as f64 / TAU,
            ipnm,
        })
    }

    pub fn puck(&self) -> &Puck {
        &self.puck
    }

    pub fn counts_per_revolution(&self) -> i32 {
        self.cts
    }

    pub fn counts_per_rad(&self) -> f64 {
        self.cpr
    }

    pub fn rads_per_count(&self) -> f64 {
        self.rpc
    }

    pub fn ipnm(&self) -> i32 {
        self.ipnm
    }

    #[inline]
    pub fn counts_to_rad(&self, counts: i32) -> f64 {
        self.rpc * counts as f64
    }

    #[inline]
    pub fn rad_to_counts(&self, rad: f64) -> i32 {
        (self.cpr * rad).floor() as i32
    }

    /// 向力矩组发送一帧打包电流指令（无应答）
    ///
    /// # 参数
    ///
    /// - `group_id`: 力矩广播组
    /// - `prop_id`: 力矩属性的数值 ID
    /// - `torques`: 最多 4 个 Puck 电流值，按组内顺序
    pub fn send_packed_torques(
        bus: &dyn CommunicationsBus,
        group_id: u32,
        prop_id: u8,
        torques: &[f64],
    ) -> Result<(), DriverError> {
        let frame = encode_packed_torques(group_id, prop_id, torques)?;
        bus.send(frame.id, frame.data_slice())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use barrett_can::BusManager;
    use barrett_can::mock::{SimMotorPuck, SimulatedPuckNetwork, sim_property_id};
    use barrett_protocol::{BGRP_UPPER_WAM, PuckType};
    use std::sync::Arc;

    #[test]
    fn test_calibration_constants() {
        let net = SimulatedPuckNetwork::new();
        net.add_motor_puck(
            1,
            SimMotorPuck {
                cts: 40960,
                ipnm: 2500,
                ..SimMotorPuck::default()
            },
            &[],
        );
        let bus: Arc<dyn CommunicationsBus> = Arc::new(BusManager::new(net));
        let motor = MotorPuck::new(Puck::new(bus, 1).unwrap()).unwrap();

        assert_eq!(motor.counts_per_revolution(), 40960);
        assert_eq!(motor.ipnm(), 2500);
        assert!((motor.counts_per_rad() * motor.rads_per_count() - 1.0).abs() < 1e-12);
        assert!((motor.counts_to_rad(40960) - TAU).abs() < 1e-12);
        assert_eq!(motor.rad_to_counts(TAU + 1e-9), 40960);
    }

    #[test]
    fn test_zero_cts_is_rejected() {
        let net = SimulatedPuckNetwork::new();
        net.add_motor_puck(
            1,
            SimMotorPuck {
                cts: 0,
                ..SimMotorPuck::default()
            },
            &[],
        );
        let bus: Arc<dyn CommunicationsBus> = Arc::new(BusManager::new(net));
        let result = MotorPuck::new(Puck::new(bus, 1).unwrap());
        assert!(matches!(result, Err(DriverError::Configuration(_))));
    }

    #[test]
    fn test_send_packed_torques_three_members() {
        let net = SimulatedPuckNetwork::new();
        for id in 5..=7 {
            net.add_motor_puck(id, SimMotorPuck::default(), &[BGRP_UPPER_WAM]);
        }
        let bus = BusManager::new(net.clone());
        let t = sim_property_id(PuckType::Motor, Property::T);

        MotorPuck::send_packed_torques(&bus, BGRP_UPPER_WAM, t, &[-5.0, 6.9, 9000.0]).unwrap();
        assert_eq!(net.property(5, Property::T), Some(-5));
        assert_eq!(net.property(6, Property::T), Some(6));
        assert_eq!(net.property(7, Property::T), Some(8191));

        let too_many = MotorPuck::send_packed_torques(&bus, BGRP_UPPER_WAM, t, &[0.0; 5]);
        assert!(matches!(too_many, Err(DriverError::Protocol(_))));
    }
}
