use std::sync::Arc;

use super::*;
use crate::app::bus::message::{ConsoleLogRequest, GrantRevokeRequest, RunAdbCommandRequest};
use crate::app::error::{ERR_DEPENDENCY, ERR_VALIDATION};
use crate::app::models::Permission;
use crate::app::testing::{
    device, harness, Harness, RecordingNotifier, ScriptedConfirmation, ScriptedPhone,
};

const DUMP: &str = "      android.permission.CAMERA: granted=false
      android.permission.INTERNET: granted=true
";

struct Fixture {
    harness: Harness,
    controller: Arc<PermissionController>,
    notifier: Arc<RecordingNotifier>,
    confirmation: Arc<ScriptedConfirmation>,
}

fn fixture(phone: ScriptedPhone) -> Fixture {
    let harness = harness(phone.into_responder());
    let notifier = Arc::new(RecordingNotifier::default());
    let confirmation = Arc::new(ScriptedConfirmation::answering(true));
    let controller = Arc::new(PermissionController::new(
        Arc::clone(&harness.session),
        Arc::clone(&harness.dispatcher),
        Arc::clone(&confirmation) as Arc<dyn Confirmation>,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
    ));
    harness
        .bus
        .register(Arc::clone(&controller) as Arc<dyn Subscriber>);
    Fixture {
        harness,
        controller,
        notifier,
        confirmation,
    }
}

#[test]
fn registered_controller_covers_every_operator_request() {
    let fixture = fixture(ScriptedPhone::with_dump(DUMP));
    fixture
        .harness
        .bus
        .verify_handlers(&MessageKind::INBOUND)
        .expect("all handled");
    let err = fixture
        .harness
        .bus
        .verify_handlers(&[MessageKind::RequestRunCommandLineCommand])
        .expect_err("host-side kind");
    assert_eq!(err.code, ERR_VALIDATION);
}

#[test]
fn list_devices_replaces_listing_and_reuses_trace_id() {
    let fixture = fixture(ScriptedPhone::with_dump(DUMP));
    let response = fixture
        .controller
        .list_devices(Some("trace-devices".to_string()))
        .expect("devices");
    assert_eq!(response.trace_id, "trace-devices");
    assert_eq!(response.data.len(), 1);
    assert_eq!(response.data.devices[0].model, "Pixel_4");
    assert_eq!(fixture.harness.session.devices(), response.data);
    assert_eq!(fixture.harness.bridge.calls()[0], vec!["devices", "-l"]);
}

#[test]
fn list_devices_surfaces_bridge_error() {
    let phone = ScriptedPhone::with_dump(DUMP).fail("devices", "adb server version mismatch");
    let fixture = fixture(phone);
    let err = fixture.controller.list_devices(None).expect_err("error");
    assert_eq!(err.code, ERR_DEPENDENCY);
    assert!(!err.trace_id.is_empty());
}

#[test]
fn select_device_lists_when_serial_is_unknown() {
    let fixture = fixture(ScriptedPhone::with_dump(DUMP));
    let selected = fixture
        .controller
        .select_device(Some("ABC123"), None)
        .expect("select");
    assert_eq!(selected.data.map(|d| d.device), Some("sunfish".to_string()));
    assert_eq!(fixture.harness.bridge.calls_starting_with("devices").len(), 1);

    let err = fixture
        .controller
        .select_device(Some("NOPE"), None)
        .expect_err("missing");
    assert_eq!(err.code, ERR_VALIDATION);
    // The earlier selection survives a failed lookup.
    assert_eq!(
        fixture.harness.session.selected_device().map(|d| d.id),
        Some("ABC123".to_string())
    );
}

#[test]
fn list_apps_targets_selected_device() {
    let fixture = fixture(ScriptedPhone::with_dump(DUMP));
    fixture.harness.session.select_device(Some(device("ABC123")));
    let apps = fixture.controller.list_apps(true, None).expect("apps");
    assert_eq!(apps.data, vec![AndroidApp {
        package_name: "com.example".to_string(),
        apk_path: Some("/data/app/com.example-1/base.apk".to_string()),
        is_system: false,
    }]);
    assert_eq!(
        fixture.harness.bridge.calls()[0],
        vec!["-s", "ABC123", "shell", "pm", "list", "packages", "-f", "-3"]
    );
}

#[test]
fn selection_messages_refresh_permissions() {
    let fixture = fixture(ScriptedPhone::with_dump(DUMP));
    let bus = &fixture.harness.bus;

    bus.post(&Message::SelectedDevice(Some(device("ABC123"))));
    assert_eq!(fixture.harness.session.last_permissions(), None);
    assert!(fixture.harness.bridge.calls().is_empty());

    let report = bus.post(&Message::SelectedAndroidApp(Some(AndroidApp::from_package(
        "com.example",
    ))));
    assert_eq!(report.delivered, 1);
    let view = fixture.harness.session.last_permissions().expect("loaded");
    assert_eq!(view.permissions().map(|set| set.len()), Some(7));

    bus.post(&Message::SelectedAndroidApp(None));
    assert_eq!(fixture.harness.session.last_permissions(), None);
}

#[test]
fn grant_all_request_runs_bulk_grant() {
    let fixture = fixture(ScriptedPhone::with_dump(DUMP));
    fixture.harness.select("ABC123", "com.example");

    let report = fixture.harness.bus.post(&Message::GrantAllPermissions);
    assert_eq!(report.delivered, 1);
    assert_eq!(fixture.confirmation.prompts(), vec!["Grant 6 missing permissions?"]);
    assert_eq!(fixture.notifier.messages(), vec!["Done!"]);
    assert_eq!(
        fixture.harness.bridge.calls_starting_with("shell pm grant"),
        vec!["shell pm grant com.example android.permission.CAMERA"]
    );
}

#[test]
fn grant_revoke_request_uses_message_kind() {
    let fixture = fixture(ScriptedPhone::with_dump(DUMP));
    fixture.harness.select("ABC123", "com.example");

    fixture
        .harness
        .bus
        .post(&Message::GrantRevokePermission(GrantRevokeRequest {
            permission: Permission::global_setting("hidden_api_policy", false),
            grant: true,
        }));

    assert_eq!(
        fixture.harness.bridge.calls_starting_with("shell settings put"),
        vec!["shell settings put global hidden_api_policy 1"]
    );
    assert!(fixture.notifier.messages().is_empty());
}

#[test]
fn unknown_permission_request_is_reported_to_operator() {
    let fixture = fixture(ScriptedPhone::with_dump(DUMP));
    fixture.harness.select("ABC123", "com.example");

    let report = fixture
        .harness
        .bus
        .post(&Message::GrantRevokePermission(GrantRevokeRequest {
            permission: Permission::runtime("android.permission.NOPE", false),
            grant: true,
        }));

    assert_eq!(report.failed, 1);
    let messages = fixture.notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("Error: android.permission.NOPE"));
}

#[test]
fn run_adb_command_request_notifies_outcome() {
    let phone = ScriptedPhone::with_dump(DUMP).fail("reboot", "error: closed");
    let fixture = fixture(phone);

    fixture
        .harness
        .bus
        .post(&Message::RunAdbCommand(RunAdbCommandRequest {
            command: "shell input keyevent 26".to_string(),
        }));
    fixture
        .harness
        .bus
        .post(&Message::RunAdbCommand(RunAdbCommandRequest {
            command: "reboot".to_string(),
        }));

    assert_eq!(fixture.notifier.messages(), vec!["Success!", "error: closed"]);
}

#[test]
fn reload_drops_vanished_device() {
    let mut phone = ScriptedPhone::with_dump(DUMP);
    phone.devices =
        "List of devices attached\nXYZ789 device model:Pixel_7 device:panther\n".to_string();
    let fixture = fixture(phone);
    fixture.harness.select("ABC123", "com.example");

    let report = fixture.harness.bus.post(&Message::ReloadDevices);

    assert_eq!(report.delivered, 1);
    assert!(fixture.harness.session.selected_device().is_none());
    assert_eq!(fixture.harness.session.devices().len(), 1);
    // Without a device there is nothing to dump.
    assert!(fixture.harness.bridge.calls_starting_with("shell dumpsys").is_empty());
}

#[test]
fn console_log_and_toggle_are_accepted() {
    let fixture = fixture(ScriptedPhone::with_dump(DUMP));
    let bus = &fixture.harness.bus;
    let report = bus.post(&Message::ConsoleLog(ConsoleLogRequest {
        message: "hello from host".to_string(),
    }));
    assert_eq!(report.delivered, 1);
    assert_eq!(bus.post(&Message::ToggleDevOptions).delivered, 1);
    assert!(fixture.harness.bridge.calls().is_empty());
}

#[test]
fn direct_calls_validate_input() {
    let fixture = fixture(ScriptedPhone::with_dump(DUMP));
    assert_eq!(
        fixture.controller.run_adb_command("  ", None).expect_err("empty").code,
        ERR_VALIDATION
    );
    assert_eq!(
        fixture.controller.set_permission("", None, true, None).expect_err("empty").code,
        ERR_VALIDATION
    );
    assert_eq!(
        fixture.controller.select_app(Some(" "), None).expect_err("empty").code,
        ERR_VALIDATION
    );
    let outcome = fixture
        .controller
        .set_permission("android.permission.CAMERA", None, true, None)
        .expect("no selection");
    assert_eq!(outcome.data, SingleGrantOutcome::NoSelection);
}

#[test]
fn lone_device_is_selected_automatically() {
    let fixture = fixture(ScriptedPhone::with_dump(DUMP));
    let selected = fixture
        .controller
        .select_only_device(Some("trace-only".to_string()))
        .expect("select");
    assert_eq!(selected.trace_id, "trace-only");
    assert_eq!(selected.data.map(|d| d.id), Some("ABC123".to_string()));
    assert_eq!(
        fixture.harness.session.selected_device().map(|d| d.id),
        Some("ABC123".to_string())
    );
}

#[test]
fn several_devices_leave_selection_empty() {
    let mut phone = ScriptedPhone::with_dump(DUMP);
    phone.devices = "List of devices attached
ABC123 device model:Pixel_4 device:sunfish
XYZ789 device model:Pixel_7 device:panther
"
    .to_string();
    let fixture = fixture(phone);
    let selected = fixture.controller.select_only_device(None).expect("listing");
    assert_eq!(selected.data, None);
    assert!(fixture.harness.session.selected_device().is_none());
    assert_eq!(fixture.harness.session.devices().len(), 2);
}

#[test]
fn argv_reaches_adb_with_embedded_quotes_intact() {
    let fixture = fixture(ScriptedPhone::with_dump(DUMP));
    fixture.harness.session.select_device(Some(device("ABC123")));
    let argv = vec!["shell".to_string(), "echo \"hi there\"".to_string()];

    let response = fixture.controller.run_adb_argv(&argv, None).expect("run");

    assert!(response.data.error_text().is_none());
    assert_eq!(
        fixture.harness.bridge.calls()[0],
        vec!["-s", "ABC123", "shell", "echo \"hi there\""]
    );
    assert_eq!(fixture.notifier.messages(), vec!["Success!"]);
}

#[test]
fn unbalanced_adb_request_is_reported_without_running() {
    let fixture = fixture(ScriptedPhone::with_dump(DUMP));
    let report = fixture
        .harness
        .bus
        .post(&Message::RunAdbCommand(RunAdbCommandRequest {
            command: "shell \"pm list".to_string(),
        }));
    assert_eq!(report.failed, 1);
    assert!(fixture.harness.bridge.calls().is_empty());
    let messages = fixture.notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("Error: Unbalanced quoting"));
}
