use std::time::Duration;

use opus_rs::loopback::LoopbackProxy;
use opus_rs::{
    ControllerConfig, DeviceProxy, DeviceState, LinkamStagePseudoMotor, MotorState,
    OpusController, ParameterValue, ProxyConnector, ProxyState, StageController, TransportError,
    AXIS,
};

fn connector(proxy: &LoopbackProxy) -> Box<dyn ProxyConnector> {
    let proxy = proxy.clone();
    Box::new(
        move |_device: &str| -> Result<Box<dyn DeviceProxy>, TransportError> {
            Ok(Box::new(proxy.clone()))
        },
    )
}

#[test]
fn test_visible_snapshot_then_infrared_with_peak() {
    let proxy = LoopbackProxy::new();
    let config = ControllerConfig::from_toml(
        r#"
        [transport]
        kind = "proxy"

        [acquisition]
        experiment = "E1"
        experiment_path = "/cfg"
        file_name = "cell"
        output_path = "/data"
        read_peak = true
        "#,
    )
    .unwrap();
    let mut opus = OpusController::from_config(&config, Some(connector(&proxy)), None).unwrap();

    // Camera picture first
    opus.set_axis_extra_par(AXIS, "opus_cam_intensity", ParameterValue::Int(30))
        .unwrap();
    opus.set_axis_extra_par(AXIS, "opus_mode", ParameterValue::Int(1))
        .unwrap();
    opus.pre_start_one(AXIS).unwrap();
    opus.start_one(AXIS).unwrap();
    proxy.push_state(ProxyState::On);
    proxy.set_last_output("1.5\n");
    assert_eq!(opus.state_one(AXIS).unwrap().0, DeviceState::Acquiring);
    proxy.push_state(ProxyState::On);
    assert_eq!(opus.state_one(AXIS).unwrap().0, DeviceState::Idle);

    // Then the spectrum
    opus.set_axis_extra_par(AXIS, "opus_mode", ParameterValue::Int(0))
        .unwrap();
    opus.pre_start_one(AXIS).unwrap();
    opus.start_one(AXIS).unwrap();
    assert_eq!(opus.read_one(AXIS).unwrap(), None);
    proxy.push_state(ProxyState::Running);
    assert_eq!(opus.state_one(AXIS).unwrap().0, DeviceState::Acquiring);
    proxy.push_state(ProxyState::On);
    assert_eq!(opus.state_one(AXIS).unwrap().0, DeviceState::Acquiring);
    proxy.set_last_output("0.9876\n");
    proxy.push_state(ProxyState::On);
    assert_eq!(
        opus.state_one(AXIS).unwrap(),
        (DeviceState::Idle, "The device is in ON state.".to_string())
    );
    assert_eq!(opus.read_one(AXIS).unwrap(), Some(0.9876));
    assert_eq!(opus.ref_one(AXIS).unwrap(), "file:///data/cell.0");

    assert_eq!(
        proxy.calls(),
        vec![
            "runOpusCMDSync COMMAND_LINE SendCommand(0,+{UNI='MOT56=2'});",
            "runOpusCMDSync COMMAND_LINE SendCommand(0,+{UNI='MOT56=130'});",
            "runOpusCMD take_snapshot /data cell",
            "runOpusCMD READ_PKA",
            "getLastOpusOutput",
            "runOpusCMDSync COMMAND_LINE SendCommand(0,+{UNI='MOT56=1'});",
            "runOpusCMD COMMAND_LINE MeasureSample (0, {EXP='E1', XPP='/cfg', NAM='cell', PTH='/data'});",
            "runOpusCMD READ_PKA",
            "getLastOpusOutput",
        ]
    );
}

#[test]
fn test_device_server_outage() {
    let proxy = LoopbackProxy::new();
    let config = ControllerConfig::from_toml("[transport]\nkind = \"proxy\"").unwrap();
    let mut opus = OpusController::from_config(&config, Some(connector(&proxy)), None).unwrap();

    opus.start_one(AXIS).unwrap();
    proxy.set_failing(true);
    assert_eq!(
        opus.state_one(AXIS).unwrap(),
        (DeviceState::Fault, "cannot connect to instrument".to_string())
    );
    assert!(opus.start_one(AXIS).is_err());

    proxy.set_failing(false);
    assert!(opus.pre_start_one(AXIS).unwrap());
    assert_eq!(opus.state(), DeviceState::Idle);
    opus.start_one(AXIS).unwrap();
    assert_eq!(opus.state(), DeviceState::Acquiring);
}

#[test]
fn test_stage_follows_temperature() {
    let proxy = LoopbackProxy::new();
    let mut stage = StageController::new("bl01/ct/opus", Box::new(proxy.clone()), Duration::ZERO);
    for (axis, name) in [(1, "x"), (2, "y"), (3, "z")] {
        stage.add_device(axis).unwrap();
        stage
            .set_axis_extra_par(axis, "axis_name", name.into())
            .unwrap();
    }

    proxy.set_sync_output("10.0");
    let current = [
        25.0,
        stage.read_one(1),
        stage.read_one(2),
        stage.read_one(3),
    ];
    assert_eq!(current, [25.0, 10.0, 10.0, 10.0]);

    let pseudo = LinkamStagePseudoMotor::new();
    let targets = pseudo.calc_all_physical(&[45.0], &current).unwrap();
    for axis in 1..=3 {
        stage.start_one(axis, targets[axis]).unwrap();
    }

    proxy.set_sync_output("M");
    assert_eq!(stage.state_one(2).unwrap().0, MotorState::Moving);
    proxy.set_sync_output("@");
    assert_eq!(stage.state_one(2).unwrap().0, MotorState::On);

    let calls = proxy.calls();
    assert_eq!(calls[3], format!("runOpusCMDSync send_serial_cmd !go x {}", targets[1]));
    assert_eq!(calls[5], format!("runOpusCMDSync send_serial_cmd !go z {}", targets[3]));
}
