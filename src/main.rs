use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use permission_wrangler_lib::app::config::{load_config, save_config, AppConfig};
use permission_wrangler_lib::app::controller::PermissionController;
use permission_wrangler_lib::app::error::AppError;
use permission_wrangler_lib::app::logging::init_logging;
use permission_wrangler_lib::app::models::{CommandResponse, PermissionKind, PermissionView};
use permission_wrangler_lib::app::operator::{AutoConfirm, Confirmation, Notifier};
use permission_wrangler_lib::app::permissions::bulk::BulkGrantOutcome;
use permission_wrangler_lib::app::permissions::reconcile::SingleGrantOutcome;
use permission_wrangler_lib::app::runtime;

#[derive(Debug, Parser)]
#[command(
    name = "permission_wrangler",
    version,
    about = "Inspect adb-attached Android devices and grant or revoke app permissions"
)]
struct Cli {
    /// Device serial to target
    #[arg(short, long, global = true, env = "ANDROID_SERIAL")]
    serial: Option<String>,

    /// Print responses as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the effective configuration
    Config {
        /// Write it to the config file, keeping a backup of the previous one
        #[arg(long)]
        save: bool,
    },
    #[command(flatten)]
    Device(DeviceCommand),
}

#[derive(Debug, Subcommand)]
enum DeviceCommand {
    /// List attached devices
    Devices,
    /// List installed packages on the selected device
    Apps {
        /// Only third-party packages
        #[arg(long)]
        third_party: bool,
    },
    /// Show runtime, app-ops and setting permissions of a package
    Permissions { package: String },
    /// Grant every missing permission of a package, one at a time
    GrantAll {
        package: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Grant one permission
    Grant {
        package: String,
        permission: String,
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
    },
    /// Revoke one permission
    Revoke {
        package: String,
        permission: String,
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
    },
    /// Run a raw adb command against the selected device
    Adb {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Runtime,
    Appops,
    Setting,
}

impl From<KindArg> for PermissionKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Runtime => PermissionKind::Runtime,
            KindArg::Appops => PermissionKind::AppOps,
            KindArg::Setting => PermissionKind::GlobalSetting,
        }
    }
}

struct PromptConfirmation;

impl Confirmation for PromptConfirmation {
    fn confirm(&self, message: &str) -> bool {
        match dialoguer::Confirm::new()
            .with_prompt(message)
            .default(false)
            .interact()
        {
            Ok(answer) => answer,
            Err(err) => {
                warn!(error = %err, "confirmation prompt failed; treating as declined");
                false
            }
        }
    }
}

struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, message: &str) {
        eprintln!("{message}");
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match load_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.logging.log_level);
    debug!(command = ?cli.command, "dispatching command");

    match run(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(
                trace_id = %err.trace_id,
                code = %err.code,
                error = %err.error,
                "command failed"
            );
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, config: AppConfig) -> Result<(), AppError> {
    match cli.command {
        Command::Config { save } => show_config(&config, save),
        Command::Device(command) => run_device_command(command, cli.serial, cli.json, config),
    }
}

fn show_config(config: &AppConfig, save: bool) -> Result<(), AppError> {
    if save {
        let path = save_config(config)?;
        info!(path = %path.display(), "configuration saved");
        eprintln!("saved {}", path.display());
    }
    let rendered = serde_json::to_string_pretty(config)
        .map_err(|err| AppError::system(format!("Failed to render config: {err}"), ""))?;
    println!("{rendered}");
    Ok(())
}

fn run_device_command(
    command: DeviceCommand,
    serial: Option<String>,
    json: bool,
    config: AppConfig,
) -> Result<(), AppError> {
    let confirmation: Arc<dyn Confirmation> = match &command {
        DeviceCommand::GrantAll { yes: true, .. } => Arc::new(AutoConfirm(true)),
        _ => Arc::new(PromptConfirmation),
    };
    let runtime = runtime::start(config, confirmation, Arc::new(ConsoleNotifier))?;
    let controller = runtime.controller.as_ref();
    match serial.as_deref().filter(|serial| !serial.trim().is_empty()) {
        Some(serial) => {
            controller.select_device(Some(serial), None)?;
        }
        None if targets_package(&command) => {
            controller.select_only_device(None)?;
        }
        None => {}
    }

    match command {
        DeviceCommand::Devices => {
            let response = controller.list_devices(None)?;
            emit(json, &response, |devices| {
                for device in devices.iter() {
                    println!("{}\t{}\t{}", device.id, device.model, device.device);
                }
            })
        }
        DeviceCommand::Apps { third_party } => {
            let response = controller.list_apps(third_party, None)?;
            emit(json, &response, |apps| {
                for app in apps {
                    let origin = if app.is_system { "system" } else { "user" };
                    println!("{}\t{origin}", app.package_name);
                }
            })
        }
        DeviceCommand::Permissions { package } => {
            let response = load_permissions(controller, &package)?;
            emit(json, &response, print_view)
        }
        DeviceCommand::GrantAll { package, .. } => {
            controller.select_app(Some(&package), None)?;
            let response = controller.grant_all_missing(None)?;
            emit(json, &response, |outcome| match outcome {
                BulkGrantOutcome::Completed { granted } => println!("granted {}", granted.len()),
                BulkGrantOutcome::Failed { granted, failed, .. } => {
                    println!("granted {} before {} failed", granted.len(), failed.name)
                }
                BulkGrantOutcome::Cancelled { pending } => {
                    println!("cancelled; {pending} still missing")
                }
                BulkGrantOutcome::NothingToGrant | BulkGrantOutcome::NoSelection => {}
            })?;
            response.data.into_result(&response.trace_id)
        }
        DeviceCommand::Grant {
            package,
            permission,
            kind,
        } => set_one(controller, json, &package, &permission, kind, true),
        DeviceCommand::Revoke {
            package,
            permission,
            kind,
        } => set_one(controller, json, &package, &permission, kind, false),
        DeviceCommand::Adb { args } => {
            let response = controller.run_adb_argv(&args, None)?;
            emit(json, &response, |result| print!("{}", result.out))?;
            match response.data.error_text() {
                Some(error) => Err(AppError::dependency(error, response.trace_id)),
                None => Ok(()),
            }
        }
    }
}

fn targets_package(command: &DeviceCommand) -> bool {
    matches!(
        command,
        DeviceCommand::Permissions { .. }
            | DeviceCommand::GrantAll { .. }
            | DeviceCommand::Grant { .. }
            | DeviceCommand::Revoke { .. }
    )
}

fn load_permissions(
    controller: &PermissionController,
    package: &str,
) -> Result<CommandResponse<PermissionView>, AppError> {
    controller.select_app(Some(package), None)?;
    let response = controller.fetch_permissions(None)?;
    if response.data == PermissionView::NoSelection {
        return Err(AppError::no_selection(response.trace_id));
    }
    Ok(response)
}

fn set_one(
    controller: &PermissionController,
    json: bool,
    package: &str,
    permission: &str,
    kind: Option<KindArg>,
    grant: bool,
) -> Result<(), AppError> {
    controller.select_app(Some(package), None)?;
    let response =
        controller.set_permission(permission, kind.map(PermissionKind::from), grant, None)?;
    emit(json, &response, |outcome| {
        if let SingleGrantOutcome::Applied { permission, grant } = outcome {
            let verb = if *grant { "granted" } else { "revoked" };
            println!("{verb} {} ({})", permission.name, permission.kind);
        }
    })?;
    response.data.into_result(&response.trace_id)
}

fn print_view(view: &PermissionView) {
    let Some(set) = view.permissions() else {
        return;
    };
    for permission in &set.permissions {
        let mark = if permission.granted { 'x' } else { ' ' };
        println!("[{mark}] {} ({})", permission.name, permission.kind);
    }
}

fn emit<T: Serialize>(
    json: bool,
    response: &CommandResponse<T>,
    human: impl FnOnce(&T),
) -> Result<(), AppError> {
    if json {
        let rendered = serde_json::to_string_pretty(response).map_err(|err| {
            AppError::system(format!("Failed to render response: {err}"), &response.trace_id)
        })?;
        println!("{rendered}");
    } else {
        human(&response.data);
    }
    Ok(())
}
