//! Control channel entry points
//!
//! Property writes that only touch [`SharedConfiguration`] are applied on the
//! caller's thread. Everything that touches a container goes to the UI
//! thread's mailbox in receipt order. Nothing here blocks or reports back to
//! the caller; bad input is logged and dropped.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use posebridge_core::{
    BodyPart, BridgeError, BridgeResult, ComputeDelegate, ContainerId, ModelVariant, Orientation,
    PropValue, SharedConfiguration,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::ui::UiHandle;

/// One-shot commands understood by the container
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Command {
    Create = 1,
}

impl Command {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::Create => "create",
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Command::Create),
            _ => None,
        }
    }
}

/// Command identifier as the control channel sends it
///
/// Hosts send either the integer code or a string; strings may hold the
/// command name or the code in decimal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandId {
    Code(i64),
    Name(String),
}

impl CommandId {
    pub fn resolve(&self) -> Option<Command> {
        match self {
            CommandId::Code(code) => Command::from_code(*code),
            CommandId::Name(name) => match name.trim().parse::<i64>() {
                Ok(code) => Command::from_code(code),
                Err(_) => (name == Command::Create.name()).then_some(Command::Create),
            },
        }
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandId::Code(code) => write!(f, "{}", code),
            CommandId::Name(name) => write!(f, "{}", name),
        }
    }
}

impl From<Command> for CommandId {
    fn from(command: Command) -> Self {
        CommandId::Code(i64::from(command.code()))
    }
}

/// Name-to-code table advertised to the control channel
pub fn command_map() -> HashMap<&'static str, i32> {
    HashMap::from([(Command::Create.name(), Command::Create.code())])
}

/// Wire form of a control-channel message
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlMessage {
    SetProperty {
        container: ContainerId,
        key: String,
        value: PropValue,
    },
    Command {
        root: ContainerId,
        command: CommandId,
        #[serde(default)]
        args: Vec<PropValue>,
    },
    SwitchCamera,
}

/// Routes property updates and commands
#[derive(Clone)]
pub struct CommandDispatcher {
    config: Arc<SharedConfiguration>,
    ui: UiHandle,
}

impl CommandDispatcher {
    pub fn new(config: Arc<SharedConfiguration>, ui: UiHandle) -> Self {
        CommandDispatcher { config, ui }
    }

    pub fn config(&self) -> &Arc<SharedConfiguration> {
        &self.config
    }

    /// Apply a property update, logging and dropping bad input
    pub fn set_property(&self, container: ContainerId, key: &str, value: PropValue) {
        if let Err(err) = self.try_set_property(container, key, value) {
            debug!(container = %container, key, %err, "property dropped");
        }
    }

    /// Apply a property update, reporting why it was dropped
    pub fn try_set_property(
        &self,
        container: ContainerId,
        key: &str,
        value: PropValue,
    ) -> BridgeResult<()> {
        trace!(container = %container, key, ?value, "set property");

        if let Some(part) = BodyPart::from_property_key(key) {
            let enabled = value
                .as_bool()
                .ok_or_else(|| expected(key, "bool", &value))?;
            self.config.set_body_part(part, enabled);
            return Ok(());
        }

        match key {
            "width" => self.ui.set_width(container, positive_dimension(key, &value)?),
            "height" => self.ui.set_height(container, positive_dimension(key, &value)?),
            "orientation" => {
                let orientation = value
                    .as_str()
                    .and_then(Orientation::parse)
                    .ok_or_else(|| expected(key, "portrait|landscape", &value))?;
                self.config.set_orientation(orientation);
                Ok(())
            }
            "model" => {
                let model = match &value {
                    PropValue::Str(name) => ModelVariant::parse(name),
                    other => other.as_int().and_then(ModelVariant::from_code),
                }
                .ok_or_else(|| expected(key, "lite|full|heavy", &value))?;
                self.config.set_model(model);
                Ok(())
            }
            "delegate" => {
                let delegate = match &value {
                    PropValue::Str(name) => ComputeDelegate::parse(name),
                    other => other.as_int().and_then(ComputeDelegate::from_code),
                }
                .ok_or_else(|| expected(key, "CPU|GPU", &value))?;
                self.config.set_delegate(delegate);
                Ok(())
            }
            "eventHz" => {
                let hz = value
                    .as_int()
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(|| expected(key, "non-negative int", &value))?;
                self.config.set_event_hz(hz);
                Ok(())
            }
            "showOverlay" => {
                let show = value
                    .as_bool()
                    .ok_or_else(|| expected(key, "bool", &value))?;
                self.config.set_show_overlay(show);
                Ok(())
            }
            "numPoses" => {
                let n = value
                    .as_int()
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(|| expected(key, "non-negative int", &value))?;
                self.config.set_num_poses(n);
                Ok(())
            }
            "minPoseDetectionConfidence" => {
                self.config
                    .set_min_detection_confidence(confidence(key, &value)?);
                Ok(())
            }
            "minPoseTrackingConfidence" => {
                self.config
                    .set_min_tracking_confidence(confidence(key, &value)?);
                Ok(())
            }
            "minPosePresenceConfidence" => {
                self.config
                    .set_min_presence_confidence(confidence(key, &value)?);
                Ok(())
            }
            _ => Err(BridgeError::UnknownProperty(key.to_string())),
        }
    }

    /// Route a one-shot command, logging and dropping bad input
    pub fn dispatch_command(&self, root: ContainerId, command: &CommandId, args: &[PropValue]) {
        match self.try_dispatch_command(root, command, args) {
            Ok(()) => {}
            Err(err @ BridgeError::UnknownCommand(_)) => {
                warn!(root = %root, %err, "command ignored");
            }
            Err(err) => debug!(root = %root, command = %command, %err, "command dropped"),
        }
    }

    pub fn try_dispatch_command(
        &self,
        root: ContainerId,
        command: &CommandId,
        args: &[PropValue],
    ) -> BridgeResult<()> {
        let resolved = command
            .resolve()
            .ok_or_else(|| BridgeError::UnknownCommand(command.to_string()))?;

        match resolved {
            Command::Create => {
                let target = match args.first() {
                    None => root,
                    Some(arg) => arg
                        .as_int()
                        .and_then(ContainerId::from_i64)
                        .ok_or_else(|| expected("create[0]", "container id", arg))?,
                };
                debug!(container = %target, "create requested");
                self.ui.create(target)
            }
        }
    }

    /// Flip the camera on the most recently created live controller
    pub fn switch_capture_source(&self) {
        if let Err(err) = self.ui.switch_camera() {
            debug!(%err, "camera switch dropped");
        }
    }

    pub fn dispatch(&self, message: ControlMessage) {
        match message {
            ControlMessage::SetProperty {
                container,
                key,
                value,
            } => self.set_property(container, &key, value),
            ControlMessage::Command {
                root,
                command,
                args,
            } => self.dispatch_command(root, &command, &args),
            ControlMessage::SwitchCamera => self.switch_capture_source(),
        }
    }

    /// Decode and apply one JSON control message
    pub fn dispatch_json(&self, json: &str) {
        match decode_message(json) {
            Ok(message) => self.dispatch(message),
            Err(err) => warn!(%err, "control message dropped"),
        }
    }
}

impl fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDispatcher").finish_non_exhaustive()
    }
}

pub fn decode_message(json: &str) -> BridgeResult<ControlMessage> {
    serde_json::from_str(json).map_err(|e| BridgeError::MalformedMessage(e.to_string()))
}

fn expected(key: &str, what: &str, got: &PropValue) -> BridgeError {
    BridgeError::malformed(key, format!("expected {}, got {}", what, got.type_name()))
}

fn positive_dimension(key: &str, value: &PropValue) -> BridgeResult<u32> {
    value
        .as_int()
        .filter(|v| *v > 0)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| expected(key, "positive int", value))
}

fn confidence(key: &str, value: &PropValue) -> BridgeResult<f32> {
    value
        .as_f64()
        .map(|v| v as f32)
        .ok_or_else(|| expected(key, "finite number", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::UiMessage;
    use tokio::sync::mpsc;

    fn dispatcher() -> (CommandDispatcher, mpsc::UnboundedReceiver<UiMessage>) {
        let (ui, rx) = UiHandle::detached();
        (CommandDispatcher::new(SharedConfiguration::shared(), ui), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<UiMessage>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            out.push(match message {
                UiMessage::SetWidth(id, w) => format!("width {} {}", id, w),
                UiMessage::SetHeight(id, h) => format!("height {} {}", id, h),
                UiMessage::Create(id) => format!("create {}", id),
                other => other.name().to_string(),
            });
        }
        out
    }

    #[test]
    fn test_config_properties_apply_synchronously() {
        let (d, mut rx) = dispatcher();
        let root = ContainerId::new(7);

        d.set_property(root, "face", true.into());
        d.set_property(root, "model", "heavy".into());
        d.set_property(root, "delegate", "CPU".into());
        d.set_property(root, "orientation", "Landscape".into());
        d.set_property(root, "eventHz", 15.into());

        let snap = d.config().snapshot();
        assert!(snap.is_enabled(BodyPart::Face));
        assert_eq!(snap.model, ModelVariant::Heavy);
        assert_eq!(snap.delegate, ComputeDelegate::Cpu);
        assert_eq!(snap.orientation, Orientation::Landscape);
        assert_eq!(snap.event_hz, 15);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_integer_codes() {
        let (d, _rx) = dispatcher();
        let root = ContainerId::new(7);

        d.set_property(root, "model", 0.into());
        assert_eq!(d.config().model(), ModelVariant::Full);
        d.set_property(root, "delegate", 0.into());
        assert_eq!(d.config().delegate(), ComputeDelegate::Cpu);
        d.set_property(root, "model", 9.into());
        assert_eq!(d.config().model(), ModelVariant::Full);
    }

    #[test]
    fn test_malformed_values_dropped() {
        let (d, _rx) = dispatcher();
        let root = ContainerId::new(7);

        assert!(matches!(
            d.try_set_property(root, "face", 1.into()),
            Err(BridgeError::MalformedValue { .. })
        ));
        assert!(matches!(
            d.try_set_property(root, "eventHz", (-5).into()),
            Err(BridgeError::MalformedValue { .. })
        ));
        assert!(matches!(
            d.try_set_property(root, "zoom", 2.into()),
            Err(BridgeError::UnknownProperty(_))
        ));
        assert_eq!(d.config().snapshot(), SharedConfiguration::new().snapshot());
    }

    #[test]
    fn test_confidence_clamped() {
        let (d, _rx) = dispatcher();
        let root = ContainerId::new(7);
        d.set_property(root, "minPoseTrackingConfidence", 1.5.into());
        assert_eq!(d.config().min_tracking_confidence(), 1.0);
        d.set_property(root, "minPoseTrackingConfidence", PropValue::Float(f64::NAN));
        assert_eq!(d.config().min_tracking_confidence(), 1.0);
    }

    #[test]
    fn test_geometry_goes_to_ui_thread_in_order() {
        let (d, mut rx) = dispatcher();
        let root = ContainerId::new(7);

        d.set_property(root, "width", 480.into());
        d.set_property(root, "height", 640.0.into());
        d.set_property(root, "width", 0.into());
        d.set_property(root, "height", (-1).into());
        d.dispatch_command(root, &CommandId::Code(1), &[]);

        assert_eq!(
            drain(&mut rx),
            vec!["width 7 480", "height 7 640", "create 7"]
        );
    }

    #[test]
    fn test_create_targets_first_argument() {
        let (d, mut rx) = dispatcher();
        let root = ContainerId::new(1);

        d.dispatch_command(root, &CommandId::Name("create".into()), &[12.into()]);
        d.dispatch_command(root, &CommandId::Name("1".into()), &[PropValue::Float(13.0)]);
        d.dispatch_command(root, &CommandId::Code(1), &["twelve".into()]);
        d.dispatch_command(root, &CommandId::Code(4), &[]);

        assert_eq!(drain(&mut rx), vec!["create 12", "create 13"]);
        assert!(matches!(
            d.try_dispatch_command(root, &CommandId::Name("zoom".into()), &[]),
            Err(BridgeError::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_command_map() {
        let map = command_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map["create"], 1);
    }

    #[test]
    fn test_dispatch_json() {
        let (d, mut rx) = dispatcher();

        d.dispatch_json(r#"{"type":"setProperty","container":7,"key":"torso","value":true}"#);
        d.dispatch_json(r#"{"type":"setProperty","container":7,"key":"width","value":480}"#);
        d.dispatch_json(r#"{"type":"command","root":7,"command":"create","args":[9]}"#);
        d.dispatch_json(r#"{"type":"command","root":7,"command":1}"#);
        d.dispatch_json(r#"{"type":"switchCamera"}"#);
        d.dispatch_json(r#"{"type":"launchRockets"}"#);
        d.dispatch_json("not json");

        assert!(d.config().body_part_enabled(BodyPart::Torso));
        assert_eq!(
            drain(&mut rx),
            vec!["width 7 480", "create 9", "create 7", "switch_camera"]
        );
    }

    #[test]
    fn test_control_message_wire_form() {
        let message = ControlMessage::Command {
            root: ContainerId::new(3),
            command: Command::Create.into(),
            args: vec![PropValue::Int(3)],
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "command", "root": 3, "command": 1, "args": [3]})
        );
        assert_eq!(decode_message(&json.to_string()).unwrap(), message);
    }
}
