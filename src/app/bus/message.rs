use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::app::error::AppError;
use crate::app::models::{
    AndroidApp, CommandLineRequest, CommandLineResult, Device, Permission,
};

/// Wire names match the counterpart's message type names.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MessageKind {
    RequestRunCommandLineCommand,
    ResponseRunCommandLineCommand,
    RequestGrantAllPermissions,
    RequestGrantRevokePermission,
    RequestReloadDevices,
    RequestRunAdbCommand,
    RequestConsoleLog,
    RequestToggleDevOptions,
    SelectedDevice,
    SelectedAndroidApp,
}

impl MessageKind {
    pub const ALL: [MessageKind; 10] = [
        MessageKind::RequestRunCommandLineCommand,
        MessageKind::ResponseRunCommandLineCommand,
        MessageKind::RequestGrantAllPermissions,
        MessageKind::RequestGrantRevokePermission,
        MessageKind::RequestReloadDevices,
        MessageKind::RequestRunAdbCommand,
        MessageKind::RequestConsoleLog,
        MessageKind::RequestToggleDevOptions,
        MessageKind::SelectedDevice,
        MessageKind::SelectedAndroidApp,
    ];

    /// Operator-side kinds the session must handle. The command-line pair is
    /// served by the host.
    pub const INBOUND: [MessageKind; 8] = [
        MessageKind::RequestGrantAllPermissions,
        MessageKind::RequestGrantRevokePermission,
        MessageKind::RequestReloadDevices,
        MessageKind::RequestRunAdbCommand,
        MessageKind::RequestConsoleLog,
        MessageKind::RequestToggleDevOptions,
        MessageKind::SelectedDevice,
        MessageKind::SelectedAndroidApp,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::RequestRunCommandLineCommand => "RequestRunCommandLineCommand",
            MessageKind::ResponseRunCommandLineCommand => "ResponseRunCommandLineCommand",
            MessageKind::RequestGrantAllPermissions => "RequestGrantAllPermissions",
            MessageKind::RequestGrantRevokePermission => "RequestGrantRevokePermission",
            MessageKind::RequestReloadDevices => "RequestReloadDevices",
            MessageKind::RequestRunAdbCommand => "RequestRunAdbCommand",
            MessageKind::RequestConsoleLog => "RequestConsoleLog",
            MessageKind::RequestToggleDevOptions => "RequestToggleDevOptions",
            MessageKind::SelectedDevice => "SelectedDevice",
            MessageKind::SelectedAndroidApp => "SelectedAndroidApp",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GrantRevokeRequest {
    pub permission: Permission,
    pub grant: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunAdbCommandRequest {
    pub command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsoleLogRequest {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    RunCommandLine(CommandLineRequest),
    CommandLineResult(CommandLineResult),
    GrantAllPermissions,
    GrantRevokePermission(GrantRevokeRequest),
    ReloadDevices,
    RunAdbCommand(RunAdbCommandRequest),
    ConsoleLog(ConsoleLogRequest),
    ToggleDevOptions,
    SelectedDevice(Option<Device>),
    SelectedAndroidApp(Option<AndroidApp>),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::RunCommandLine(_) => MessageKind::RequestRunCommandLineCommand,
            Message::CommandLineResult(_) => MessageKind::ResponseRunCommandLineCommand,
            Message::GrantAllPermissions => MessageKind::RequestGrantAllPermissions,
            Message::GrantRevokePermission(_) => MessageKind::RequestGrantRevokePermission,
            Message::ReloadDevices => MessageKind::RequestReloadDevices,
            Message::RunAdbCommand(_) => MessageKind::RequestRunAdbCommand,
            Message::ConsoleLog(_) => MessageKind::RequestConsoleLog,
            Message::ToggleDevOptions => MessageKind::RequestToggleDevOptions,
            Message::SelectedDevice(_) => MessageKind::SelectedDevice,
            Message::SelectedAndroidApp(_) => MessageKind::SelectedAndroidApp,
        }
    }

    pub fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Message::RunCommandLine(request) => serde_json::to_value(request),
            Message::CommandLineResult(result) => serde_json::to_value(result),
            Message::GrantRevokePermission(request) => serde_json::to_value(request),
            Message::RunAdbCommand(request) => serde_json::to_value(request),
            Message::ConsoleLog(request) => serde_json::to_value(request),
            Message::SelectedDevice(device) => serde_json::to_value(device),
            Message::SelectedAndroidApp(app) => serde_json::to_value(app),
            Message::GrantAllPermissions | Message::ReloadDevices | Message::ToggleDevOptions => {
                Ok(serde_json::Value::Null)
            }
        }
    }

    /// Rebuilds a message from an inbound `{kind, payload}` pair.
    pub fn from_parts(
        kind: MessageKind,
        payload: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        let message = match kind {
            MessageKind::RequestRunCommandLineCommand => Message::RunCommandLine(decode(payload)?),
            MessageKind::ResponseRunCommandLineCommand => {
                Message::CommandLineResult(decode(payload)?)
            }
            MessageKind::RequestGrantAllPermissions => Message::GrantAllPermissions,
            MessageKind::RequestGrantRevokePermission => {
                Message::GrantRevokePermission(decode(payload)?)
            }
            MessageKind::RequestReloadDevices => Message::ReloadDevices,
            MessageKind::RequestRunAdbCommand => Message::RunAdbCommand(decode(payload)?),
            MessageKind::RequestConsoleLog => Message::ConsoleLog(decode(payload)?),
            MessageKind::RequestToggleDevOptions => Message::ToggleDevOptions,
            MessageKind::SelectedDevice => Message::SelectedDevice(decode(payload)?),
            MessageKind::SelectedAndroidApp => Message::SelectedAndroidApp(decode(payload)?),
        };
        Ok(message)
    }
}

fn decode<T: DeserializeOwned>(payload: serde_json::Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(payload)
}

/// What crosses the process boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub kind: MessageKind,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Replies echo the id of the request they answer.
    #[serde(default, rename = "correlationId", skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl Envelope {
    pub fn wrap(
        message: &Message,
        correlation_id: Option<String>,
        trace_id: &str,
    ) -> Result<Self, AppError> {
        let payload = message.payload().map_err(|err| {
            AppError::system(
                format!("Failed to encode {} payload: {err}", message.kind()),
                trace_id,
            )
        })?;
        Ok(Self {
            kind: message.kind(),
            payload,
            correlation_id,
        })
    }

    pub fn open(&self) -> Result<Message, AppError> {
        Message::from_parts(self.kind, self.payload.clone()).map_err(|err| {
            AppError::system(format!("Failed to decode {} payload: {err}", self.kind), "")
        })
    }

    pub fn to_json(&self) -> Result<String, AppError> {
        serde_json::to_string(self)
            .map_err(|err| AppError::system(format!("Failed to encode envelope: {err}"), ""))
    }

    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        serde_json::from_str(raw)
            .map_err(|err| AppError::system(format!("Failed to decode envelope: {err}"), ""))
    }
}
