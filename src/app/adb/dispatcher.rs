use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::app::adb::args::split_command_line;
use crate::app::adb::locator::resolve_adb_program;
use crate::app::bus::{EventBus, Message, MessageKind};
use crate::app::config::{AdbSettings, DEFAULT_COMMAND_TIMEOUT_MS};
use crate::app::error::AppError;
use crate::app::models::{CommandLineRequest, CommandLineResult, Device};
use crate::app::state::Session;

pub const ADB_COMMAND_TIMEOUT: Duration = Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS);

/// Turns bridge operations into command-line requests and awaits their
/// results through the event bus.
pub struct CommandDispatcher {
    bus: Arc<EventBus>,
    session: Arc<Session>,
    adb_program: String,
    prepend_current_path: bool,
    timeout: Duration,
}

impl CommandDispatcher {
    pub fn new(bus: Arc<EventBus>, session: Arc<Session>, adb: &AdbSettings) -> Self {
        Self {
            bus,
            session,
            adb_program: resolve_adb_program(&adb.command_path),
            prepend_current_path: adb.prepend_current_path,
            timeout: ADB_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn adb_program(&self) -> &str {
        &self.adb_program
    }

    /// Runs `adb [-s <selected>] <suffix>`. The suffix is split like a shell
    /// would, so `shell "dumpsys package x"` stays one shell argument.
    pub fn run_adb_command(
        &self,
        suffix: &str,
        trace_id: &str,
    ) -> Result<CommandLineResult, AppError> {
        let args = split_command_line(suffix, trace_id)?;
        let device = self.session.selected_device();
        self.run_adb_args(device.as_ref(), args, trace_id)
    }

    pub fn run_adb_shell_command(
        &self,
        shell_command: &str,
        trace_id: &str,
    ) -> Result<CommandLineResult, AppError> {
        let device = self.session.selected_device();
        self.run_adb_args(
            device.as_ref(),
            vec!["shell".to_string(), shell_command.to_string()],
            trace_id,
        )
    }

    /// Same as [`Self::run_adb_command`] but against an explicit device
    /// snapshot instead of the live selection.
    pub fn run_adb_args(
        &self,
        device: Option<&Device>,
        args: Vec<String>,
        trace_id: &str,
    ) -> Result<CommandLineResult, AppError> {
        let request = CommandLineRequest {
            command: self.adb_program.clone(),
            args: Some(build_adb_args(device, args)),
            prepend_current_path: self.prepend_current_path,
        };
        self.run_command_line(request, trace_id)
    }

    pub fn run_command_line(
        &self,
        request: CommandLineRequest,
        trace_id: &str,
    ) -> Result<CommandLineResult, AppError> {
        debug!(
            trace_id = %trace_id,
            command = %request.command,
            args = ?request.args,
            "dispatching command line"
        );
        let response = self.bus.post_and_wait_for_response(
            &Message::RunCommandLine(request),
            MessageKind::ResponseRunCommandLineCommand,
            self.timeout,
            trace_id,
        )?;
        match response {
            Message::CommandLineResult(result) => {
                if let Some(error) = result.error_text() {
                    warn!(trace_id = %trace_id, error = %error, "command line reported an error");
                }
                Ok(result)
            }
            other => Err(AppError::system(
                format!("Expected a command-line result, got {}", other.kind()),
                trace_id,
            )),
        }
    }
}

/// The device flag goes right after the executable, ahead of the caller's
/// arguments.
pub fn build_adb_args(device: Option<&Device>, args: Vec<String>) -> Vec<String> {
    let mut full = Vec::with_capacity(args.len() + 2);
    if let Some(device) = device {
        full.push("-s".to_string());
        full.push(device.id.clone());
    }
    full.extend(args);
    full
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::bus::{Envelope, Transport, TransportError};
    use std::sync::{Mutex, Weak};

    /// Answers every request synchronously with a canned result and records
    /// what was asked.
    struct EchoTransport {
        bus: Weak<EventBus>,
        seen: Mutex<Vec<CommandLineRequest>>,
        answer: Option<CommandLineResult>,
    }

    impl Transport for EchoTransport {
        fn send(&self, envelope: Envelope) -> Result<(), TransportError> {
            if let Ok(Message::RunCommandLine(request)) = envelope.open() {
                self.seen.lock().expect("seen").push(request);
            }
            let (Some(answer), Some(bus)) = (self.answer.clone(), self.bus.upgrade()) else {
                return Ok(());
            };
            let reply = Envelope::wrap(
                &Message::CommandLineResult(answer),
                envelope.correlation_id.clone(),
                "echo",
            )
            .map_err(|err| TransportError::Closed(err.error))?;
            bus.receive(reply);
            Ok(())
        }

        fn send_encoded(&self, _encoded: String) -> Result<(), TransportError> {
            Err(TransportError::Closed("not used".to_string()))
        }
    }

    fn dispatcher(
        answer: Option<CommandLineResult>,
    ) -> (CommandDispatcher, Arc<EchoTransport>, Arc<Session>) {
        let bus = Arc::new(EventBus::new());
        let transport = Arc::new(EchoTransport {
            bus: Arc::downgrade(&bus),
            seen: Mutex::new(Vec::new()),
            answer,
        });
        bus.attach_transport(Arc::clone(&transport) as Arc<dyn Transport>);
        let session = Arc::new(Session::new());
        let settings = AdbSettings {
            command_path: "\"bin/adb\"".to_string(),
            prepend_current_path: true,
        };
        let dispatcher = CommandDispatcher::new(bus, Arc::clone(&session), &settings)
            .with_timeout(Duration::from_millis(200));
        (dispatcher, transport, session)
    }

    #[test]
    fn inserts_device_flag_after_executable_when_selected() {
        let (dispatcher, transport, session) = dispatcher(Some(CommandLineResult::ok("ok")));
        dispatcher.run_adb_command("devices -l", "t1").expect("unselected");
        session.select_device(Some(Device {
            id: "ABC123".to_string(),
            model: "Pixel_4".to_string(),
            device: "sunfish".to_string(),
        }));
        dispatcher
            .run_adb_shell_command("dumpsys package com.example", "t2")
            .expect("selected");

        let seen = transport.seen.lock().expect("seen");
        assert_eq!(seen[0].command, "bin/adb");
        assert!(seen[0].prepend_current_path);
        assert_eq!(seen[0].args.as_deref(), Some(&["devices".to_string(), "-l".to_string()][..]));
        assert_eq!(
            seen[1].args.clone().expect("args"),
            vec!["-s", "ABC123", "shell", "dumpsys package com.example"]
        );
    }

    #[test]
    fn quoted_suffix_keeps_shell_command_whole() {
        let (dispatcher, transport, _session) = dispatcher(Some(CommandLineResult::ok("")));
        dispatcher
            .run_adb_command("shell \"settings get global hidden_api_policy\"", "t")
            .expect("run");
        let seen = transport.seen.lock().expect("seen");
        assert_eq!(
            seen[0].args.clone().expect("args"),
            vec!["shell", "settings get global hidden_api_policy"]
        );
    }

    #[test]
    fn embedded_quotes_survive_the_suffix() {
        let (dispatcher, transport, _session) = dispatcher(Some(CommandLineResult::ok("")));
        dispatcher
            .run_adb_command(r#"shell 'echo "hi there"'"#, "t")
            .expect("run");
        let seen = transport.seen.lock().expect("seen");
        assert_eq!(
            seen[0].args.clone().expect("args"),
            vec!["shell", "echo \"hi there\""]
        );
    }

    #[test]
    fn unbalanced_suffix_is_rejected_before_sending() {
        let (dispatcher, transport, _session) = dispatcher(Some(CommandLineResult::ok("")));
        let err = dispatcher
            .run_adb_command("shell \"pm list", "t-unbalanced")
            .expect_err("unbalanced");
        assert_eq!(err.code, crate::app::error::ERR_VALIDATION);
        assert!(transport.seen.lock().expect("seen").is_empty());
    }

    #[test]
    fn error_result_is_returned_uninterpreted() {
        let (dispatcher, _transport, _session) =
            dispatcher(Some(CommandLineResult::failed("", "error: device offline")));
        let result = dispatcher.run_adb_command("devices", "t").expect("result");
        assert_eq!(result.error_text(), Some("error: device offline"));
    }

    #[test]
    fn silent_counterpart_surfaces_timeout() {
        let (dispatcher, transport, _session) = dispatcher(None);
        let err = dispatcher.run_adb_command("devices -l", "t-timeout").expect_err("timeout");
        assert!(err.is_timeout());
        assert_eq!(transport.seen.lock().expect("seen").len(), 1);
    }

    #[test]
    fn build_args_without_device_passes_through() {
        assert_eq!(
            build_adb_args(None, vec!["devices".to_string()]),
            vec!["devices".to_string()]
        );
    }
}
