//! LowLevelWamWrapper 集成测试（仿真 Puck 网络）

use barrett_can::mock::{SimMotorPuck, SimulatedPuckNetwork};
use barrett_can::{BusManager, CommunicationsBus};
use barrett_driver::{LowLevelWam, Puck, WamSettings};
use barrett_protocol::{BGRP_LOWER_WAM, BGRP_WAM, Property};
use barrett_systems::{
    Constant, ExecutionManager, LowLevelWamWrapper, ManualExecutionManager, SystemError, connect,
};
use nalgebra::DVector;
use std::sync::Arc;

fn wam4() -> (SimulatedPuckNetwork, LowLevelWam) {
    let net = SimulatedPuckNetwork::new();
    for id in 1..=4 {
        net.add_motor_puck(id, SimMotorPuck::default(), &[BGRP_WAM, BGRP_LOWER_WAM]);
    }
    let bus: Arc<dyn CommunicationsBus> = Arc::new(BusManager::new(net.clone()));
    let pucks = (1..=4)
        .map(|id| Puck::new(Arc::clone(&bus), id).unwrap())
        .collect();
    let settings = WamSettings {
        puck_ids: vec![1, 2, 3, 4],
        home: vec![0.0; 4],
        j2mp: vec![
            vec![-42.0, 0.0, 0.0, 0.0],
            vec![0.0, 28.25, -28.25, 0.0],
            vec![0.0, -16.8155, -16.8155, 0.0],
            vec![0.0, 0.0, 0.0, -18.0],
        ],
        zeroangle: None,
        torque_group_ids: Vec::new(),
        safety_puck_id: None,
    };
    let wam = LowLevelWam::new(pucks, None, &settings).unwrap();
    (net, wam)
}

// 测试：每周期读取位置并写出力矩
#[test]
fn test_wrapper_reads_positions_and_writes_torques() {
    let (net, wam) = wam4();
    let em = ManualExecutionManager::with_period(0.002);
    let wrapper = LowLevelWamWrapper::new(wam).unwrap();
    assert_eq!(wrapper.dof(), 4);

    let jt = DVector::from_vec(vec![1.0, -0.5, 0.25, 2.0]);
    let torques = Constant::new(jt.clone());
    connect(&torques.output, wrapper.input()).unwrap();
    wrapper.start_managing(&em);
    assert!(em.is_managing(wrapper.source()));
    assert!(em.is_managing(&torques));

    for (id, counts) in (1..=4).zip([100, -200, 300, -400]) {
        net.set_property(id, Property::P, counts);
    }
    em.run_execution_cycle().unwrap();

    let jp = wrapper.jp_output().value().unwrap();
    let expected = {
        let wam = wrapper.wam().lock();
        wam.p2jp() * DVector::from_vec(vec![100.0, -200.0, 300.0, -400.0])
    };
    for (a, e) in jp.iter().zip(expected.iter()) {
        assert!((a - e).abs() < 1e-12);
    }
    assert_eq!(wrapper.jv_output().value().unwrap().len(), 4);

    let pt = wrapper.wam().lock().j2pt() * &jt;
    for id in 1..=4u32 {
        let value = pt[id as usize - 1].clamp(-8191.0, 8191.0).floor() as i32;
        assert_eq!(net.property(id, Property::T), Some(value), "Puck {}", id);
    }
}

// 测试：力矩输入未连接时只读位置，不写力矩
#[test]
fn test_wrapper_without_torque_input() {
    let (net, wam) = wam4();
    let em = ManualExecutionManager::with_period(0.002);
    let wrapper = LowLevelWamWrapper::new(wam).unwrap();
    wrapper.start_managing(&em);

    net.set_property(2, Property::P, 1234);
    net.clear_sent();
    em.run_execution_cycle().unwrap();

    assert!(wrapper.jp_output().is_defined());
    assert!(wrapper.jp_output().value().unwrap().iter().any(|v| *v != 0.0));
    assert_eq!(net.property(1, Property::T), Some(0));

    assert!(wrapper.stop_managing(&em));
    assert!(!wrapper.source().is_managed());
}

// 测试：总线错误作为周期错误向上传播
#[test]
fn test_wrapper_propagates_bus_errors() {
    let (net, wam) = wam4();
    let em = ManualExecutionManager::with_period(0.002);
    let wrapper = LowLevelWamWrapper::new(wam).unwrap();
    wrapper.start_managing(&em);

    net.set_silent(3, true);
    assert!(matches!(
        em.run_execution_cycle(),
        Err(SystemError::Driver(_))
    ));
}

// 测试：力矩维度错误
#[test]
fn test_wrapper_rejects_wrong_torque_dimension() {
    let (_net, wam) = wam4();
    let em = ManualExecutionManager::with_period(0.002);
    let wrapper = LowLevelWamWrapper::new(wam).unwrap();
    let torques = Constant::new(DVector::from_vec(vec![0.0; 3]));
    connect(&torques.output, wrapper.input()).unwrap();
    wrapper.start_managing(&em);

    assert!(matches!(
        em.run_execution_cycle(),
        Err(SystemError::Driver(barrett_driver::DriverError::DimensionMismatch {
            expected: 4,
            actual: 3
        }))
    ));
}
