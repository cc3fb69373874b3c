//! SDK 门面测试

use barrett_can::mock::{SimMotorPuck, SimulatedPuckNetwork};
use barrett_sdk::prelude::*;
use barrett_sdk::protocol::{BGRP_LOWER_WAM, BGRP_WAM};
use nalgebra::DVector;
use serial_test::serial;
use std::sync::Arc;

const WAM4: &str = r#"
[wam]
puck_ids = [1, 2, 3, 4]
home = [0.0, -2.0, 0.0, 3.1]
j2mp = [[-42.0, 0.0, 0.0, 0.0], [0.0, 28.25, -28.25, 0.0], [0.0, -16.8155, -16.8155, 0.0], [0.0, 0.0, 0.0, -18.0]]
safety_puck_id = 10

[execution]
period_s = 0.002
thread_priority = false
"#;

// 测试：重复初始化日志无副作用
#[test]
#[serial]
fn test_init_logger_twice() {
    barrett_sdk::init_logger();
    barrett_sdk::init_logger_with_filter("barrett_systems=debug,info");
    barrett_sdk::init_logger_with_filter("not a [valid filter");
    log::info!("bridged from the log crate");
    tracing::info!("logger initialised");
}

// 测试：从配置文件到数据流图的完整链路
#[test]
#[serial]
fn test_config_to_control_loop() {
    let config = WamConfig::from_toml_str(WAM4).unwrap();

    let net = SimulatedPuckNetwork::new();
    for id in 1..=4 {
        net.add_motor_puck(id, SimMotorPuck::default(), &[BGRP_WAM, BGRP_LOWER_WAM]);
    }
    net.add_safety_puck(10, 150, false);
    let bus: Arc<dyn CommunicationsBus> =
        Arc::new(BusManager::with_config(net.clone(), config.bus.to_bus_config()));

    let safety_id = config.wam.safety_puck_id.unwrap();
    let safety: Arc<dyn SafetyInterlock> =
        Arc::new(SafetyModule::new(Puck::new(Arc::clone(&bus), safety_id).unwrap()).unwrap());
    let wam = LowLevelWam::from_config(Arc::clone(&bus), &config.wam, Some(Arc::clone(&safety)))
        .unwrap();
    assert!(safety.is_zeroed().unwrap());

    let em = ManualExecutionManager::with_period(config.execution.period_s);
    let wrapper = LowLevelWamWrapper::new(wam).unwrap();
    let hold = Constant::new(DVector::zeros(wrapper.dof()));
    connect(&hold.output, wrapper.input()).unwrap();
    wrapper.start_managing(&em);
    em.run_execution_cycle().unwrap();

    let jp = wrapper.jp_output().value().unwrap();
    for (a, home) in jp.iter().zip(&config.wam.home) {
        assert!((a - home).abs() <= std::f64::consts::TAU / 4096.0);
    }
}
