//! Command surface tests against a fully wired simulated controller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Value, json};

use triax_api::dispatch::Dispatcher;
use triax_api::logbuf::{LogBuffer, LogCaptureLayer};
use triax_api::server;
use triax_common::config::SystemConfig;
use triax_common::consts::PROTOCOL_VERSION;
use triax_hal::{Relay, SimRig};
use triax_motion::axis::{Axis, AxisHardware};
use triax_motion::flags::SystemFlags;
use triax_motion::tasks;

struct Fixture {
    rig: Arc<SimRig>,
    flags: Arc<SystemFlags>,
    axes: Vec<Arc<Axis>>,
    logs: LogBuffer,
    dispatcher: Dispatcher,
}

fn fixture() -> Fixture {
    let config = SystemConfig::default();
    let rig = Arc::new(SimRig::new(config.axes.len()));
    let flags = Arc::new(SystemFlags::new(rig.relay()));
    let logs = LogBuffer::new();

    let mut axes = Vec::new();
    let mut handles = Vec::new();
    for (i, axis_config) in config.axes.iter().enumerate() {
        let io = rig.axis(i);
        let axis = Axis::attach(
            axis_config,
            AxisHardware {
                step: io.step.clone(),
                dir: io.dir.clone(),
                timer: io.timer.clone(),
                encoder: io.encoder.clone(),
                clock: rig.clock(),
            },
        );
        axes.push(axis.clone());
        handles.push(tasks::spawn(axis, flags.clone()).unwrap());
    }

    let dispatcher = Dispatcher::new(handles, flags.clone(), logs.clone());
    Fixture {
        rig,
        flags,
        axes,
        logs,
        dispatcher,
    }
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}

fn is_ack(response: &Value) -> bool {
    response["ACK"] == json!(true)
}

fn is_error(response: &Value) -> bool {
    response["ACK"] == json!(false) && response["ERROR"].is_string()
}

#[test]
fn protocol_version() {
    let f = fixture();
    let response = f.dispatcher.execute("PROTOCOL_VERSION", None);
    assert_eq!(response, json!({ "Version": PROTOCOL_VERSION }));
}

#[test]
fn unknown_command_reports_an_error() {
    let f = fixture();
    let response = f.dispatcher.execute("SELF_DESTRUCT", None);
    assert!(is_error(&response));
}

#[test]
fn control_enable_round_trip() {
    let f = fixture();
    // Query without parameters returns the current state.
    let response = f.dispatcher.execute("CONTROL_ENABLE", None);
    assert_eq!(response, json!({ "STATUS": false }));

    let response = f
        .dispatcher
        .execute("CONTROL_ENABLE", Some(&json!({ "enabled": true })));
    assert_eq!(response, json!({ "STATUS": true }));
    assert!(f.flags.control_enabled());
    assert!(f.rig.relay().is_on());

    let response = f
        .dispatcher
        .execute("CONTROL_ENABLE", Some(&json!({ "enabled": false })));
    assert_eq!(response, json!({ "STATUS": false }));
    assert!(!f.rig.relay().is_on());
}

#[test]
fn stall_control_round_trip() {
    let f = fixture();
    assert_eq!(
        f.dispatcher.execute("STALL_CONTROL", None),
        json!({ "STATUS": true })
    );
    assert_eq!(
        f.dispatcher
            .execute("STALL_CONTROL", Some(&json!({ "enabled": false }))),
        json!({ "STATUS": false })
    );
    assert!(!f.flags.stall_detection());
}

#[test]
fn free_run_starts_and_stop_halts_the_axis() {
    let f = fixture();
    let response = f.dispatcher.execute(
        "AXIS_FREE_RUN",
        Some(&json!({ "axis": "x", "dir": "CW", "speed": 500 })),
    );
    assert!(is_ack(&response));
    assert!(wait_until(Duration::from_secs(2), || {
        f.axes[0].kind() == triax_common::types::MotionKind::FreeRunning
    }));

    f.rig.advance_ms(50);
    assert!(f.rig.toggles(0) > 0);
    // The other axes are untouched.
    assert_eq!(f.rig.toggles(1), 0);
    assert_eq!(f.rig.toggles(2), 0);

    let response = f
        .dispatcher
        .execute("AXIS_STOP", Some(&json!({ "axis": "x" })));
    assert!(is_ack(&response));
    assert!(wait_until(Duration::from_secs(2), || {
        f.axes[0].kind() == triax_common::types::MotionKind::Stop
    }));
}

#[test]
fn free_run_with_zero_speed_is_ignored() {
    let f = fixture();
    let response = f.dispatcher.execute(
        "AXIS_FREE_RUN",
        Some(&json!({ "axis": "y", "dir": "CW", "speed": 0 })),
    );
    assert!(is_ack(&response));
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(f.axes[1].kind(), triax_common::types::MotionKind::Stop);
}

#[test]
fn free_run_validation_errors() {
    let f = fixture();
    assert!(is_error(&f.dispatcher.execute(
        "AXIS_FREE_RUN",
        Some(&json!({ "axis": "w", "dir": "CW", "speed": 500 }))
    )));
    assert!(is_error(&f.dispatcher.execute(
        "AXIS_FREE_RUN",
        Some(&json!({ "axis": "x", "dir": "SIDEWAYS", "speed": 500 }))
    )));
    assert!(is_error(&f.dispatcher.execute(
        "AXIS_FREE_RUN",
        Some(&json!({ "axis": "x", "dir": "CW", "speed": -5 }))
    )));
    assert!(is_error(&f.dispatcher.execute("AXIS_FREE_RUN", None)));
}

#[test]
fn stop_all_halts_every_axis() {
    let f = fixture();
    for axis in ["x", "y", "z"] {
        f.dispatcher.execute(
            "AXIS_FREE_RUN",
            Some(&json!({ "axis": axis, "dir": "CCW", "speed": 400 })),
        );
    }
    assert!(wait_until(Duration::from_secs(2), || {
        f.axes
            .iter()
            .all(|a| a.kind() == triax_common::types::MotionKind::FreeRunning)
    }));

    let response = f.dispatcher.execute("AXIS_STOP_ALL", None);
    assert!(is_ack(&response));
    assert!(wait_until(Duration::from_secs(2), || {
        f.axes
            .iter()
            .all(|a| a.kind() == triax_common::types::MotionKind::Stop)
    }));
}

#[test]
fn closed_loop_near_target_acks_and_updates_the_command() {
    let f = fixture();
    // Inside the arrival window: acknowledged, no pulses needed.
    let response = f.dispatcher.execute(
        "AXIS_CLOSED_LOOP",
        Some(&json!({ "axis": "x", "setpoint": 0.005 })),
    );
    assert!(is_ack(&response));
    assert!(wait_until(Duration::from_secs(2), || {
        f.axes[0].pos_cmd() == 5
    }));
    assert!(f.axes[0].is_already_there());
    assert_eq!(f.rig.toggles(0), 0);
}

#[test]
fn set_cal_point_writes_both_positions() {
    let f = fixture();
    let response = f.dispatcher.execute(
        "SET_CAL_POINT",
        Some(&json!({ "position_x": 1.0, "position_y": -0.5 })),
    );
    assert!(is_ack(&response));
    assert_eq!(f.axes[0].pos_act(), 1000);
    assert_eq!(f.axes[1].pos_act(), -500);
    assert_eq!(f.axes[2].pos_act(), 0);

    assert!(is_error(&f.dispatcher.execute(
        "SET_CAL_POINT",
        Some(&json!({ "position_x": 1.0 }))
    )));
}

#[test]
fn kp_set_tunings_validates_bounds() {
    let f = fixture();
    let response = f.dispatcher.execute(
        "KP_SET_TUNINGS",
        Some(&json!({
            "axis": "z",
            "kp": 50,
            "update": 200,
            "min": -50_000,
            "max": 50_000,
            "abs_min": 5000
        })),
    );
    assert!(is_ack(&response));

    // A ceiling at or above the frequency bound must be rejected.
    let response = f.dispatcher.execute(
        "KP_SET_TUNINGS",
        Some(&json!({
            "axis": "z",
            "kp": 50,
            "update": 200,
            "min": -200_000,
            "max": 200_000,
            "abs_min": 5000
        })),
    );
    assert!(is_error(&response));

    assert!(is_error(
        &f.dispatcher.execute("KP_SET_TUNINGS", Some(&json!({ "axis": "z" })))
    ));
}

#[test]
fn telemetry_reports_every_axis_and_the_flags() {
    let f = fixture();
    f.dispatcher
        .execute("CONTROL_ENABLE", Some(&json!({ "enabled": true })));
    f.dispatcher.execute(
        "SET_CAL_POINT",
        Some(&json!({ "position_x": 2.0, "position_y": 0.0 })),
    );

    let response = f.dispatcher.execute("TELEMETRIA", None);
    assert_eq!(response["control_enabled"], json!(true));
    assert_eq!(response["stall_detection"], json!(true));
    for axis in ["x", "y", "z"] {
        let entry = &response[axis];
        assert!(entry.is_object(), "missing axis {axis}");
        assert!(entry["posAct"].is_number());
        assert!(entry["posCmd"].is_number());
        assert_eq!(entry["stalled"], json!(false));
        assert_eq!(entry["type"], json!("STOP"));
        assert!(entry["dir"].is_string());
        assert_eq!(entry["offset"], json!(0));
    }
    assert_eq!(response["x"]["posAct"], json!(2.0));
}

#[test]
fn logs_command_drains_captured_lines() {
    use tracing_subscriber::layer::SubscriberExt;

    let f = fixture();
    let subscriber =
        tracing_subscriber::registry().with(LogCaptureLayer::new(f.logs.clone()));
    tracing::subscriber::with_default(subscriber, || {
        tracing::info!("first");
        tracing::warn!("second");
        tracing::info!("third");
    });

    let response = f
        .dispatcher
        .execute("LOGS", Some(&json!({ "quantity": 2 })));
    let msgs = response["DEBUG_MSGS"].as_array().unwrap();
    assert_eq!(msgs.len(), 2);
    assert!(msgs[0].as_str().unwrap().contains("first"));
    assert!(msgs[1].as_str().unwrap().contains("second"));

    let response = f
        .dispatcher
        .execute("LOGS", Some(&json!({ "quantity": 10 })));
    assert_eq!(response["DEBUG_MSGS"].as_array().unwrap().len(), 1);
}

#[test]
fn server_responds_to_framed_lines() {
    let f = fixture();
    let response = server::respond(&f.dispatcher, r#"{"command":"PROTOCOL_VERSION"}"#);
    assert_eq!(response, json!({ "Version": PROTOCOL_VERSION }));

    let response = server::respond(&f.dispatcher, "not json at all");
    assert!(is_error(&response));

    let response = server::respond(&f.dispatcher, r#"{"pars":{}}"#);
    assert!(is_error(&response));

    let response = server::respond(
        &f.dispatcher,
        r#"{"command":"CONTROL_ENABLE","pars":{"enabled":true}}"#,
    );
    assert_eq!(response, json!({ "STATUS": true }));
}
