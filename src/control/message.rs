//! Inbound control messages
//!
//! The remote viewer sends loosely typed JSON objects. Decoding is lenient:
//! every recognised key is interpreted independently and a key with an
//! unexpected type is skipped without affecting the others.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const KEY_PAUSE: &str = "pause";
pub const KEY_EXIT: &str = "exit";
pub const KEY_INTERVAL: &str = "interval";
pub const KEY_ROTATION_AXIS: &str = "rotation axis";
pub const KEY_WEIGHT: &str = "weight";
pub const KEY_ISO_THRESHOLD: &str = "iso threshold";
pub const KEY_INTERPOLATION: &str = "interpolation";
pub const KEY_DISTANCE_RELATIVE: &str = "distance relative";

/// A decoded steering patch; absent fields leave state unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    /// Flip the pause flag once
    pub pause_toggle: bool,
    /// New render interval, already clamped to at least 1
    pub target_render_interval: Option<u32>,
    pub exit_requested: bool,
    pub rotation_axis: Option<[f32; 4]>,
    pub channel_weights: Option<Vec<f32>>,
    pub iso_thresholds: Option<Vec<f32>>,
    pub interpolation: Option<bool>,
    pub relative_distance: Option<f32>,
}

/// `true`, or a non-zero number
fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        _ => false,
    }
}

fn number_array(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

/// Interpret a number as a render interval: fractional values are
/// truncated, the result is clamped to `1..=u32::MAX`
fn interval(value: &Value) -> Option<u32> {
    let n = match value {
        Value::Number(n) => n,
        _ => return None,
    };
    let raw = match n.as_i64() {
        Some(i) => i,
        None => n.as_f64()?.trunc() as i64,
    };
    Some(raw.clamp(1, u32::MAX as i64) as u32)
}

impl ControlMessage {
    /// Decode a viewer message; anything but an object yields an empty patch
    pub fn decode(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };

        let mut msg = Self::default();
        if let Some(v) = obj.get(KEY_PAUSE) {
            msg.pause_toggle = truthy(v);
        }
        if let Some(v) = obj.get(KEY_EXIT) {
            msg.exit_requested = truthy(v);
        }
        msg.target_render_interval = obj.get(KEY_INTERVAL).and_then(interval);
        msg.rotation_axis = obj
            .get(KEY_ROTATION_AXIS)
            .and_then(number_array)
            .and_then(|v| <[f32; 4]>::try_from(v).ok());
        msg.channel_weights = obj.get(KEY_WEIGHT).and_then(number_array);
        msg.iso_thresholds = obj.get(KEY_ISO_THRESHOLD).and_then(number_array);
        msg.interpolation = obj.get(KEY_INTERPOLATION).and_then(Value::as_bool);
        msg.relative_distance = obj
            .get(KEY_DISTANCE_RELATIVE)
            .and_then(Value::as_f64)
            .map(|f| f as f32);
        msg
    }

    /// Whether the message changes nothing
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn touches_settings(&self) -> bool {
        self.rotation_axis.is_some()
            || self.channel_weights.is_some()
            || self.iso_thresholds.is_some()
            || self.interpolation.is_some()
            || self.relative_distance.is_some()
    }
}

/// Current rendering parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    pub rotation_axis: [f32; 4],
    pub channel_weights: Vec<f32>,
    pub iso_thresholds: Vec<f32>,
    pub interpolation: bool,
    pub relative_distance: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            rotation_axis: [1.0, 1.0, 0.0, 1.0],
            channel_weights: vec![7.0, 7.0, 7.0, 0.0, 0.0],
            iso_thresholds: vec![1.0, 1.0, 1.0],
            interpolation: true,
            relative_distance: 2.5,
        }
    }
}

impl RenderSettings {
    /// Encode as a viewer message
    pub fn to_message(&self) -> Value {
        let mut obj = Map::new();
        obj.insert(KEY_ROTATION_AXIS.into(), floats(&self.rotation_axis));
        obj.insert(KEY_WEIGHT.into(), floats(&self.channel_weights));
        obj.insert(KEY_ISO_THRESHOLD.into(), floats(&self.iso_thresholds));
        obj.insert(KEY_INTERPOLATION.into(), Value::Bool(self.interpolation));
        obj.insert(
            KEY_DISTANCE_RELATIVE.into(),
            Value::from(self.relative_distance as f64),
        );
        Value::Object(obj)
    }

    fn patch(&mut self, msg: &ControlMessage) {
        if let Some(axis) = msg.rotation_axis {
            self.rotation_axis = axis;
        }
        if let Some(ref w) = msg.channel_weights {
            self.channel_weights = w.clone();
        }
        if let Some(ref iso) = msg.iso_thresholds {
            self.iso_thresholds = iso.clone();
        }
        if let Some(i) = msg.interpolation {
            self.interpolation = i;
        }
        if let Some(d) = msg.relative_distance {
            self.relative_distance = d;
        }
    }
}

pub(crate) fn floats(values: &[f32]) -> Value {
    Value::Array(values.iter().map(|&v| Value::from(v as f64)).collect())
}

/// What [`ControlState::apply`] changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedControl {
    pub pause_toggled: bool,
    /// The new interval, if the message carried one
    pub interval: Option<u32>,
    pub exit_requested: bool,
    pub settings_changed: bool,
}

/// Steering state owned by the session
#[derive(Debug, Clone, PartialEq)]
pub struct ControlState {
    pub paused: bool,
    pub render_interval: u32,
    pub settings: RenderSettings,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            paused: false,
            render_interval: 1,
            settings: RenderSettings::default(),
        }
    }
}

impl ControlState {
    /// Apply a decoded message; each field applies independently
    pub fn apply(&mut self, msg: &ControlMessage) -> AppliedControl {
        if msg.pause_toggle {
            self.paused = !self.paused;
        }
        if let Some(interval) = msg.target_render_interval {
            self.render_interval = interval.max(1);
        }
        self.settings.patch(msg);
        AppliedControl {
            pause_toggled: msg.pause_toggle,
            interval: msg.target_render_interval.map(|i| i.max(1)),
            exit_requested: msg.exit_requested,
            settings_changed: msg.touches_settings(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_non_object_decodes_empty() {
        assert!(ControlMessage::decode(&json!(null)).is_empty());
        assert!(ControlMessage::decode(&json!([1, 2])).is_empty());
        assert!(ControlMessage::decode(&json!("pause")).is_empty());
    }

    #[test]
    fn test_pause_truthiness() {
        assert!(ControlMessage::decode(&json!({"pause": true})).pause_toggle);
        assert!(ControlMessage::decode(&json!({"pause": 1})).pause_toggle);
        assert!(!ControlMessage::decode(&json!({"pause": false})).pause_toggle);
        assert!(!ControlMessage::decode(&json!({"pause": 0})).pause_toggle);
        assert!(!ControlMessage::decode(&json!({"pause": "yes"})).pause_toggle);
    }

    #[test]
    fn test_interval_clamped() {
        let d = |v| ControlMessage::decode(&v).target_render_interval;
        assert_eq!(d(json!({"interval": 5})), Some(5));
        assert_eq!(d(json!({"interval": 0})), Some(1));
        assert_eq!(d(json!({"interval": -3})), Some(1));
        assert_eq!(d(json!({"interval": 2.9})), Some(2));
        assert_eq!(d(json!({"interval": "5"})), None);
    }

    #[test]
    fn test_malformed_fields_skipped_independently() {
        let msg = ControlMessage::decode(&json!({
            "rotation axis": [1, 0, 0],
            "weight": [1, "x"],
            "iso threshold": [0.5, 0.5, 0.5],
            "interpolation": 3,
            "exit": 0,
            "unknown": 1
        }));
        assert_eq!(msg.rotation_axis, None);
        assert_eq!(msg.channel_weights, None);
        assert_eq!(msg.iso_thresholds, Some(vec![0.5, 0.5, 0.5]));
        assert_eq!(msg.interpolation, None);
        assert!(!msg.exit_requested);
    }

    #[test]
    fn test_double_toggle_restores() {
        let mut state = ControlState::default();
        let toggle = ControlMessage::decode(&json!({"pause": true}));
        state.apply(&toggle);
        assert!(state.paused);
        state.apply(&toggle);
        assert!(!state.paused);
    }

    #[test]
    fn test_apply_reports_changes() {
        let mut state = ControlState::default();
        let applied = state.apply(&ControlMessage::decode(&json!({
            "interval": 4,
            "distance relative": 1.5
        })));
        assert_eq!(applied.interval, Some(4));
        assert!(applied.settings_changed);
        assert!(!applied.pause_toggled);
        assert_eq!(state.render_interval, 4);
        assert_eq!(state.settings.relative_distance, 1.5);
    }

    #[test]
    fn test_settings_message_keys() {
        let msg = RenderSettings::default().to_message();
        assert_eq!(msg["rotation axis"], json!([1.0, 1.0, 0.0, 1.0]));
        assert_eq!(msg["weight"], json!([7.0, 7.0, 7.0, 0.0, 0.0]));
        assert_eq!(msg["interpolation"], json!(true));
        assert_eq!(msg["distance relative"], json!(2.5));
    }
}
