use serde::{Deserialize, Serialize};

use crate::{Result, VisualizerError};

pub const BLOOM_PASS: &str = "bloomPass";
pub const BLOOM_STRENGTH: &str = "bloomStrength";
pub const BLOOM_RADIUS: &str = "bloomRadius";
pub const BLOOM_THRESHOLD: &str = "bloomThreshold";
pub const AFTERIMAGE_PASS: &str = "afterimagePass";
pub const AFTERIMAGE_DAMP: &str = "afterimageDamp";
pub const ANTIALIAS: &str = "antialias";

fn is_false(value: &bool) -> bool {
    !*value
}

/// Bounded, steppable scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeParameter {
    pub value: f32,
    pub min: f32,
    pub max: f32,
    pub step: f32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub do_not_show: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_name: Option<String>,
}

/// Boolean switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleParameter {
    pub is_on: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub do_not_show: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_name: Option<String>,
}

/// A user-facing knob. The variant follows from the shape of the data
/// (`isOn` versus `value`/`min`/`max`/`step`) and never changes once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigurableParameter {
    Toggle(ToggleParameter),
    Range(RangeParameter),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    Toggle,
    Range,
}

impl ParameterKind {
    fn label(self) -> &'static str {
        match self {
            Self::Toggle => "toggle",
            Self::Range => "range",
        }
    }
}

impl ConfigurableParameter {
    pub fn range(value: f32, min: f32, max: f32, step: f32) -> Self {
        Self::Range(RangeParameter {
            value,
            min,
            max,
            step,
            do_not_show: false,
            parameter_name: None,
        })
    }

    pub fn toggle(is_on: bool) -> Self {
        Self::Toggle(ToggleParameter {
            is_on,
            do_not_show: false,
            parameter_name: None,
        })
    }

    /// Places the parameter in a display group.
    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        let group = Some(group.into());
        match &mut self {
            Self::Toggle(toggle) => toggle.parameter_name = group,
            Self::Range(range) => range.parameter_name = group,
        }
        self
    }

    /// Keeps the parameter active but out of UI enumeration.
    pub fn hidden(mut self) -> Self {
        match &mut self {
            Self::Toggle(toggle) => toggle.do_not_show = true,
            Self::Range(range) => range.do_not_show = true,
        }
        self
    }

    pub fn kind(&self) -> ParameterKind {
        match self {
            Self::Toggle(_) => ParameterKind::Toggle,
            Self::Range(_) => ParameterKind::Range,
        }
    }

    pub fn do_not_show(&self) -> bool {
        match self {
            Self::Toggle(toggle) => toggle.do_not_show,
            Self::Range(range) => range.do_not_show,
        }
    }

    pub fn group(&self) -> Option<&str> {
        match self {
            Self::Toggle(toggle) => toggle.parameter_name.as_deref(),
            Self::Range(range) => range.parameter_name.as_deref(),
        }
    }
}

/// A value written from outside (config file, UI) into an existing parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Number(f32),
}

/// Ordered parameter map. Insertion order is display order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ParameterSet {
    entries: Vec<(String, ConfigurableParameter)>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post-processing knobs every visualizer carries.
    pub fn baseline() -> Self {
        let mut set = Self::new();
        set.push(BLOOM_PASS, ConfigurableParameter::toggle(false).in_group("bloom"));
        set.push(
            BLOOM_STRENGTH,
            ConfigurableParameter::range(0.8, 0.0, 2.0, 0.1).in_group("bloom"),
        );
        set.push(
            BLOOM_RADIUS,
            ConfigurableParameter::range(1.0, 0.0, 2.0, 0.1).in_group("bloom"),
        );
        set.push(
            BLOOM_THRESHOLD,
            ConfigurableParameter::range(0.1, 0.0, 2.0, 0.1).in_group("bloom"),
        );
        set.push(
            AFTERIMAGE_PASS,
            ConfigurableParameter::toggle(false).in_group("afterimage"),
        );
        set.push(
            AFTERIMAGE_DAMP,
            ConfigurableParameter::range(0.5, 0.0, 1.0, 0.1).in_group("afterimage"),
        );
        set.push(ANTIALIAS, ConfigurableParameter::toggle(true).in_group("antialias"));
        set
    }

    fn push(&mut self, key: &str, parameter: ConfigurableParameter) {
        self.entries.push((key.to_string(), parameter));
    }

    /// Number of parameters, hidden ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True for a set without even the baseline knobs.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `key` names a parameter in this set.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Parameter stored under `key`.
    pub fn get(&self, key: &str) -> Option<&ConfigurableParameter> {
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, parameter)| parameter)
    }

    /// Every entry in display order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigurableParameter)> {
        self.entries
            .iter()
            .map(|(name, parameter)| (name.as_str(), parameter))
    }

    /// Adds a parameter, or replaces an existing one of the same variant.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        parameter: ConfigurableParameter,
    ) -> Result<()> {
        let key = key.into();
        match self.entries.iter_mut().find(|(name, _)| *name == key) {
            Some((_, existing)) if existing.kind() == parameter.kind() => {
                *existing = parameter;
                Ok(())
            }
            Some((_, existing)) => Err(VisualizerError::ParameterKindMismatch {
                key,
                expected: existing.kind().label(),
            }),
            None => {
                self.entries.push((key, parameter));
                Ok(())
            }
        }
    }

    /// Mutable toggle; fails if `key` is missing or holds a range.
    pub fn toggle_mut(&mut self, key: &str) -> Result<&mut ToggleParameter> {
        match self.find_mut(key)? {
            ConfigurableParameter::Toggle(toggle) => Ok(toggle),
            ConfigurableParameter::Range(_) => Err(mismatch(key, ParameterKind::Toggle)),
        }
    }

    /// Mutable range; fails if `key` is missing or holds a toggle.
    pub fn range_mut(&mut self, key: &str) -> Result<&mut RangeParameter> {
        match self.find_mut(key)? {
            ConfigurableParameter::Range(range) => Ok(range),
            ConfigurableParameter::Toggle(_) => Err(mismatch(key, ParameterKind::Range)),
        }
    }

    /// Current state of a toggle.
    pub fn is_on(&self, key: &str) -> Result<bool> {
        match self.find(key)? {
            ConfigurableParameter::Toggle(toggle) => Ok(toggle.is_on),
            ConfigurableParameter::Range(_) => Err(mismatch(key, ParameterKind::Toggle)),
        }
    }

    /// Current value of a range.
    pub fn value(&self, key: &str) -> Result<f32> {
        match self.find(key)? {
            ConfigurableParameter::Range(range) => Ok(range.value),
            ConfigurableParameter::Toggle(_) => Err(mismatch(key, ParameterKind::Range)),
        }
    }

    /// Switches a toggle on or off.
    pub fn set_toggle(&mut self, key: &str, is_on: bool) -> Result<()> {
        self.toggle_mut(key)?.is_on = is_on;
        Ok(())
    }

    /// Writes a range value; values outside `min..=max` are rejected.
    pub fn set_value(&mut self, key: &str, value: f32) -> Result<()> {
        let range = self.range_mut(key)?;
        if !(range.min..=range.max).contains(&value) {
            return Err(VisualizerError::ParameterOutOfRange {
                key: key.to_string(),
                value,
                min: range.min,
                max: range.max,
            });
        }
        range.value = value;
        Ok(())
    }

    /// Writes an external value, routed by its variant to
    /// [`set_toggle`](Self::set_toggle) or [`set_value`](Self::set_value).
    pub fn apply(&mut self, key: &str, value: ParameterValue) -> Result<()> {
        match value {
            ParameterValue::Bool(is_on) => self.set_toggle(key, is_on),
            ParameterValue::Number(number) => self.set_value(key, number),
        }
    }

    /// Presentable view of the set: hidden entries are left out and
    /// consecutive entries sharing a group name are gathered together.
    pub fn schema(&self) -> ParameterSchema {
        let mut groups: Vec<ParameterGroup> = Vec::new();
        for (key, parameter) in self.iter().filter(|(_, p)| !p.do_not_show()) {
            let entry = SchemaEntry {
                key: key.to_string(),
                parameter: parameter.clone(),
            };
            match groups.last_mut() {
                Some(group) if group.name.as_deref() == parameter.group() => {
                    group.entries.push(entry)
                }
                _ => groups.push(ParameterGroup {
                    name: parameter.group().map(str::to_string),
                    entries: vec![entry],
                }),
            }
        }
        ParameterSchema { groups }
    }

    fn find(&self, key: &str) -> Result<&ConfigurableParameter> {
        self.get(key)
            .ok_or_else(|| VisualizerError::UnknownParameter(key.to_string()))
    }

    fn find_mut(&mut self, key: &str) -> Result<&mut ConfigurableParameter> {
        self.entries
            .iter_mut()
            .find(|(name, _)| name == key)
            .map(|(_, parameter)| parameter)
            .ok_or_else(|| VisualizerError::UnknownParameter(key.to_string()))
    }
}

fn mismatch(key: &str, expected: ParameterKind) -> VisualizerError {
    VisualizerError::ParameterKindMismatch {
        key: key.to_string(),
        expected: expected.label(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaEntry {
    pub key: String,
    #[serde(flatten)]
    pub parameter: ConfigurableParameter,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterGroup {
    pub name: Option<String>,
    pub entries: Vec<SchemaEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSchema {
    pub groups: Vec<ParameterGroup>,
}

impl ParameterSchema {
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.groups
            .iter()
            .flat_map(|group| group.entries.iter().map(|entry| entry.key.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_carries_post_processing_knobs() {
        let set = ParameterSet::baseline();
        assert_eq!(set.len(), 7);
        assert!(!set.is_on(BLOOM_PASS).unwrap());
        assert!(set.is_on(ANTIALIAS).unwrap());
        assert_eq!(set.value(BLOOM_STRENGTH).unwrap(), 0.8);
        assert_eq!(set.value(AFTERIMAGE_DAMP).unwrap(), 0.5);
    }

    #[test]
    fn variant_is_fixed() {
        let mut set = ParameterSet::baseline();
        let err = set.set_value(BLOOM_PASS, 1.0).unwrap_err();
        assert!(matches!(
            err,
            VisualizerError::ParameterKindMismatch { expected: "range", .. }
        ));
        assert!(set
            .insert(BLOOM_STRENGTH, ConfigurableParameter::toggle(true))
            .is_err());
        assert!(set.is_on(BLOOM_STRENGTH).is_err());
    }

    #[test]
    fn range_writes_are_bounded() {
        let mut set = ParameterSet::baseline();
        set.set_value(AFTERIMAGE_DAMP, 0.9).unwrap();
        assert_eq!(set.value(AFTERIMAGE_DAMP).unwrap(), 0.9);
        assert!(matches!(
            set.set_value(AFTERIMAGE_DAMP, 1.5),
            Err(VisualizerError::ParameterOutOfRange { .. })
        ));
        assert!(matches!(
            set.apply("missing", ParameterValue::Bool(true)),
            Err(VisualizerError::UnknownParameter(_))
        ));
    }

    #[test]
    fn schema_skips_hidden_and_groups_adjacent_entries() {
        let mut set = ParameterSet::baseline();
        set.insert(
            "zSeparation",
            ConfigurableParameter::range(-6.0, -10.0, -2.0, 1.0).hidden(),
        )
        .unwrap();
        set.insert("speed", ConfigurableParameter::range(0.1, 0.0, 0.5, 0.01))
            .unwrap();
        set.insert("yPos", ConfigurableParameter::range(-2.0, -10.0, 10.0, 1.0))
            .unwrap();

        let schema = set.schema();
        let names: Vec<_> = schema.groups.iter().map(|g| g.name.as_deref()).collect();
        assert_eq!(
            names,
            vec![Some("bloom"), Some("afterimage"), Some("antialias"), None]
        );
        assert_eq!(schema.groups[0].entries.len(), 4);
        assert_eq!(schema.groups[3].entries.len(), 2);
        assert!(!schema.keys().any(|key| key == "zSeparation"));
        assert!(set.contains("zSeparation"));
    }

    #[test]
    fn variant_is_detected_from_shape() {
        let toggle: ConfigurableParameter =
            serde_json::from_str(r#"{"isOn": true, "parameterName": "bloom"}"#).unwrap();
        assert_eq!(toggle.kind(), ParameterKind::Toggle);
        assert_eq!(toggle.group(), Some("bloom"));

        let range: ConfigurableParameter = serde_json::from_str(
            r#"{"value": 0.5, "min": 0.0, "max": 1.0, "step": 0.1, "doNotShow": true}"#,
        )
        .unwrap();
        assert_eq!(range.kind(), ParameterKind::Range);
        assert!(range.do_not_show());
    }

    #[test]
    fn schema_serializes_flat_entries() {
        let json = serde_json::to_value(ParameterSet::baseline().schema()).unwrap();
        let first = &json["groups"][0]["entries"][0];
        assert_eq!(first["key"], "bloomPass");
        assert_eq!(first["isOn"], false);
        assert_eq!(first["parameterName"], "bloom");
    }
}
