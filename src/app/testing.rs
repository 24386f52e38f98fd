//! Scripted stand-ins for the bridge process and the operator.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::app::adb::dispatcher::CommandDispatcher;
use crate::app::bus::{Envelope, EventBus, Message, Transport, TransportError};
use crate::app::config::AdbSettings;
use crate::app::models::{AndroidApp, CommandLineResult, Device};
use crate::app::operator::{Confirmation, Notifier};
use crate::app::state::Session;

pub(crate) type Responder = Box<dyn Fn(&str) -> Option<CommandLineResult> + Send + Sync>;

/// Answers command-line requests synchronously. The responder sees the adb
/// arguments joined by spaces with any leading `-s <serial>` removed;
/// `None` means the bridge never answers.
pub(crate) struct FakeBridge {
    bus: Weak<EventBus>,
    calls: Mutex<Vec<Vec<String>>>,
    responder: Responder,
}

impl FakeBridge {
    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().expect("calls").clone()
    }

    /// Recorded calls whose command (serial stripped) starts with `prefix`.
    pub(crate) fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .iter()
            .map(|args| command_text(args))
            .filter(|command| command.starts_with(prefix))
            .collect()
    }
}

impl Transport for FakeBridge {
    fn send(&self, envelope: Envelope) -> Result<(), TransportError> {
        let Ok(Message::RunCommandLine(request)) = envelope.open() else {
            return Ok(());
        };
        let args = request.args.unwrap_or_default();
        let answer = (self.responder)(&command_text(&args));
        self.calls.lock().expect("calls").push(args);
        let (Some(answer), Some(bus)) = (answer, self.bus.upgrade()) else {
            return Ok(());
        };
        let reply = Envelope::wrap(
            &Message::CommandLineResult(answer),
            envelope.correlation_id.clone(),
            "fake-bridge",
        )
        .map_err(|err| TransportError::Closed(err.error))?;
        bus.receive(reply);
        Ok(())
    }

    fn send_encoded(&self, encoded: String) -> Result<(), TransportError> {
        let envelope =
            Envelope::from_json(&encoded).map_err(|err| TransportError::Closed(err.error))?;
        self.send(envelope)
    }
}

fn command_text(args: &[String]) -> String {
    let rest = match args {
        [flag, _serial, rest @ ..] if flag == "-s" => rest,
        all => all,
    };
    rest.join(" ")
}

pub(crate) struct Harness {
    pub bus: Arc<EventBus>,
    pub session: Arc<Session>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub bridge: Arc<FakeBridge>,
}

pub(crate) fn harness(responder: Responder) -> Harness {
    let bus = Arc::new(EventBus::new());
    let bridge = Arc::new(FakeBridge {
        bus: Arc::downgrade(&bus),
        calls: Mutex::new(Vec::new()),
        responder,
    });
    bus.attach_transport(Arc::clone(&bridge) as Arc<dyn Transport>);
    let session = Arc::new(Session::new());
    let dispatcher = Arc::new(
        CommandDispatcher::new(Arc::clone(&bus), Arc::clone(&session), &AdbSettings::default())
            .with_timeout(Duration::from_millis(200)),
    );
    Harness {
        bus,
        session,
        dispatcher,
        bridge,
    }
}

impl Harness {
    pub(crate) fn select(&self, serial: &str, package: &str) {
        self.session.select_device(Some(device(serial)));
        self.session.select_app(Some(AndroidApp::from_package(package)));
    }
}

pub(crate) fn device(id: &str) -> Device {
    Device {
        id: id.to_string(),
        model: "Pixel_4".to_string(),
        device: "sunfish".to_string(),
    }
}

/// A phone with one installed package. Commands containing a `failures`
/// needle answer with the paired error.
#[derive(Clone, Default)]
pub(crate) struct ScriptedPhone {
    pub devices: String,
    pub packages: String,
    pub dump: String,
    pub allowed_ops: Vec<String>,
    pub setting_value: String,
    pub failures: Vec<(String, String)>,
}

impl ScriptedPhone {
    pub(crate) fn with_dump(dump: &str) -> Self {
        Self {
            devices: "List of devices attached\nABC123 device model:Pixel_4 device:sunfish\n"
                .to_string(),
            packages: "package:/data/app/com.example-1/base.apk=com.example\n".to_string(),
            dump: dump.to_string(),
            setting_value: "0\n".to_string(),
            ..Self::default()
        }
    }

    pub(crate) fn allow(mut self, op: &str) -> Self {
        self.allowed_ops.push(op.to_string());
        self
    }

    pub(crate) fn fail(mut self, needle: &str, error: &str) -> Self {
        self.failures.push((needle.to_string(), error.to_string()));
        self
    }

    pub(crate) fn respond(&self, command: &str) -> CommandLineResult {
        if let Some((_, error)) = self
            .failures
            .iter()
            .find(|(needle, _)| command.contains(needle.as_str()))
        {
            return CommandLineResult::failed("", error.clone());
        }
        if command.starts_with("devices") {
            return CommandLineResult::ok(self.devices.clone());
        }
        if command.starts_with("shell pm list packages") {
            return CommandLineResult::ok(self.packages.clone());
        }
        if command.starts_with("shell dumpsys package") {
            return CommandLineResult::ok(self.dump.clone());
        }
        if let Some(op) = command
            .strip_prefix("shell appops get ")
            .and_then(|rest| rest.split(' ').nth(1))
        {
            let mode = if self.allowed_ops.iter().any(|allowed| allowed == op) {
                "allow"
            } else {
                "default"
            };
            return CommandLineResult::ok(format!("{op}: {mode}\n"));
        }
        if command.starts_with("shell settings get global") {
            return CommandLineResult::ok(self.setting_value.clone());
        }
        CommandLineResult::ok("")
    }

    pub(crate) fn into_responder(self) -> Responder {
        Box::new(move |command| Some(self.respond(command)))
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub(crate) fn messages(&self) -> Vec<String> {
        self.messages.lock().expect("messages").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.lock().expect("messages").push(message.to_string());
    }
}

pub(crate) struct ScriptedConfirmation {
    answer: bool,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedConfirmation {
    pub(crate) fn answering(answer: bool) -> Self {
        Self {
            answer,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts").clone()
    }
}

impl Confirmation for ScriptedConfirmation {
    fn confirm(&self, message: &str) -> bool {
        self.prompts.lock().expect("prompts").push(message.to_string());
        self.answer
    }
}
