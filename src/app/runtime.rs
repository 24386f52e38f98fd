use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::{info, warn};

use crate::app::adb::dispatcher::CommandDispatcher;
use crate::app::adb::host::{CommandLineHost, ReplySink};
use crate::app::adb::locator::{resolve_adb_program, validate_adb_program};
use crate::app::bus::{Envelope, EventBus, MessageKind, Subscriber, Transport};
use crate::app::config::AppConfig;
use crate::app::controller::PermissionController;
use crate::app::error::AppError;
use crate::app::operator::{Confirmation, Notifier};
use crate::app::state::Session;

pub struct Runtime {
    pub config: AppConfig,
    pub bus: Arc<EventBus>,
    pub session: Arc<Session>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub controller: Arc<PermissionController>,
}

/// Starts a subprocess-backed command host and wires the session around it.
pub fn start(
    config: AppConfig,
    confirmation: Arc<dyn Confirmation>,
    notifier: Arc<dyn Notifier>,
) -> Result<Runtime, AppError> {
    let host = CommandLineHost::new(Duration::from_millis(config.command.host_timeout_ms));
    start_with_host(config, host, confirmation, notifier)
}

pub fn start_with_host(
    config: AppConfig,
    host: CommandLineHost,
    confirmation: Arc<dyn Confirmation>,
    notifier: Arc<dyn Notifier>,
) -> Result<Runtime, AppError> {
    if !config.adb.prepend_current_path {
        validate_adb_program(&resolve_adb_program(&config.adb.command_path))
            .map_err(|message| AppError::validation(message, ""))?;
    }

    let session = Arc::new(Session::new());
    let bus = Arc::new(EventBus::new());

    let weak_bus: Weak<EventBus> = Arc::downgrade(&bus);
    let reply: ReplySink = Arc::new(move |envelope: Envelope| match weak_bus.upgrade() {
        Some(bus) => bus.receive(envelope),
        None => warn!(kind = %envelope.kind, "reply arrived after the bus was dropped"),
    });
    let transport = host.spawn(reply);
    bus.attach_transport(Arc::new(transport) as Arc<dyn Transport>);

    let dispatcher = Arc::new(
        CommandDispatcher::new(Arc::clone(&bus), Arc::clone(&session), &config.adb)
            .with_timeout(Duration::from_millis(config.command.timeout_ms)),
    );

    let controller = Arc::new(PermissionController::new(
        Arc::clone(&session),
        Arc::clone(&dispatcher),
        confirmation,
        notifier,
    ));
    bus.register(Arc::clone(&controller) as Arc<dyn Subscriber>);
    verify_operator_handlers(&bus)?;

    info!(
        adb = %dispatcher.adb_program(),
        timeout_ms = config.command.timeout_ms,
        host_timeout_ms = config.command.host_timeout_ms,
        "runtime started"
    );
    Ok(Runtime {
        config,
        bus,
        session,
        dispatcher,
        controller,
    })
}

/// Every operator kind must reach a subscriber; otherwise posts of that kind
/// would be dropped silently.
fn verify_operator_handlers(bus: &EventBus) -> Result<(), AppError> {
    bus.verify_handlers(&MessageKind::INBOUND)
}
