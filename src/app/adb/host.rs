//! The external side of the event bus: receives command-line requests over
//! a channel, runs them as subprocesses and posts correlated results back.

use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::app::adb::locator::resolve_command_program;
use crate::app::adb::runner::{run_command_with_timeout, CommandOutput};
use crate::app::bus::{Envelope, Message, Transport, TransportError};
use crate::app::error::AppError;
use crate::app::models::{CommandLineRequest, CommandLineResult};

pub enum Wire {
    Structured(Envelope),
    Encoded(String),
}

pub struct ChannelTransport {
    outbound: Mutex<mpsc::Sender<Wire>>,
}

impl ChannelTransport {
    fn push(&self, wire: Wire) -> Result<(), TransportError> {
        let guard = self
            .outbound
            .lock()
            .map_err(|_| TransportError::Closed("transport lock poisoned".to_string()))?;
        guard
            .send(wire)
            .map_err(|_| TransportError::Closed("command host stopped".to_string()))
    }
}

impl Transport for ChannelTransport {
    fn send(&self, envelope: Envelope) -> Result<(), TransportError> {
        self.push(Wire::Structured(envelope))
    }

    fn send_encoded(&self, encoded: String) -> Result<(), TransportError> {
        self.push(Wire::Encoded(encoded))
    }
}

pub type ReplySink = Arc<dyn Fn(Envelope) + Send + Sync>;

pub type Executor =
    Arc<dyn Fn(&Path, &[String], Duration, &str) -> Result<CommandOutput, AppError> + Send + Sync>;

pub struct CommandLineHost {
    current_dir: PathBuf,
    timeout: Duration,
    executor: Executor,
}

impl CommandLineHost {
    pub fn new(timeout: Duration) -> Self {
        let executor: Executor = Arc::new(
            |program: &Path, args: &[String], timeout: Duration, trace_id: &str| {
                run_command_with_timeout(program, args, timeout, trace_id)
            },
        );
        Self::with_executor(timeout, executor)
    }

    pub fn with_executor(timeout: Duration, executor: Executor) -> Self {
        Self {
            current_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            timeout,
            executor,
        }
    }

    /// Starts the host loop. Every request runs on its own thread, so
    /// replies may come back in any order. The loop ends once every clone
    /// of the returned transport is dropped.
    pub fn spawn(self, reply: ReplySink) -> ChannelTransport {
        let (tx, rx) = mpsc::channel::<Wire>();
        let host = Arc::new(self);
        thread::spawn(move || {
            for wire in rx {
                let host = Arc::clone(&host);
                let reply = Arc::clone(&reply);
                thread::spawn(move || host.serve(wire, &reply));
            }
            debug!("command host loop ended");
        });
        ChannelTransport {
            outbound: Mutex::new(tx),
        }
    }

    fn serve(&self, wire: Wire, reply: &ReplySink) {
        let envelope = match wire {
            Wire::Structured(envelope) => envelope,
            Wire::Encoded(raw) => match Envelope::from_json(&raw) {
                Ok(envelope) => envelope,
                Err(err) => {
                    warn!(error = %err, "command host dropped undecodable message");
                    return;
                }
            },
        };
        let correlation_id = envelope.correlation_id.clone();
        let trace_id = correlation_id.clone().unwrap_or_default();
        let request = match envelope.open() {
            Ok(Message::RunCommandLine(request)) => request,
            Ok(other) => {
                warn!(kind = %other.kind(), "command host ignores message kind");
                return;
            }
            Err(err) => {
                warn!(trace_id = %trace_id, error = %err, "command host dropped malformed request");
                return;
            }
        };

        let result = self.handle(&request, &trace_id);
        match Envelope::wrap(&Message::CommandLineResult(result), correlation_id, &trace_id) {
            Ok(envelope) => reply(envelope),
            Err(err) => {
                warn!(trace_id = %trace_id, error = %err, "failed to encode command result")
            }
        }
    }

    pub fn handle(&self, request: &CommandLineRequest, trace_id: &str) -> CommandLineResult {
        let program = resolve_command_program(
            &request.command,
            request.prepend_current_path,
            &self.current_dir,
        );
        let args = request.args.clone().unwrap_or_default();
        info!(
            trace_id = %trace_id,
            program = %program.display(),
            args = ?args,
            "running command line"
        );
        match (self.executor)(&program, &args, self.timeout, trace_id) {
            Ok(output) => {
                debug!(
                    trace_id = %trace_id,
                    exit_code = ?output.exit_code,
                    "command line finished"
                );
                output.into_result()
            }
            Err(err) => {
                warn!(trace_id = %trace_id, error = %err, "command line failed to run");
                CommandLineResult::failed("", err.error)
            }
        }
    }
}
