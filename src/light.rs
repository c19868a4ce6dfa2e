//! Lights registered on a bridge.

use serde::{Deserialize, Serialize};

/// A light registered on the bridge.
///
/// Only the attributes the wizard touches are modelled; the bridge sends a
/// lot more and those fields are ignored on decode.
///
/// # Example
///
/// ```
/// use hue_pairing_rs::Light;
///
/// let mut light = Light::new("7", "LivingColors 1", true);
/// light.set_on(false);
/// assert!(!light.is_on());
/// ```
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Light {
    #[serde(skip)]
    id: String,
    name: String,
    #[serde(default)]
    state: LightState,
    #[serde(rename = "type")]
    kind: Option<String>,
    modelid: Option<String>,
    uniqueid: Option<String>,
}

/// On/off state of a light, as reported by the bridge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct LightState {
    #[serde(default)]
    pub on: bool,
    #[serde(default)]
    pub reachable: Option<bool>,
}

/// Body of `PUT /lights/<id>/state`.
#[derive(Debug, Serialize)]
pub(crate) struct StateUpdate {
    pub on: bool,
}

impl Light {
    pub fn new(id: &str, name: &str, on: bool) -> Self {
        Light {
            id: id.to_string(),
            name: name.to_string(),
            state: LightState {
                on,
                reachable: None,
            },
            kind: None,
            modelid: None,
            uniqueid: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_on(&self) -> bool {
        self.state.on
    }

    /// `None` when the bridge didn't say.
    pub fn is_reachable(&self) -> Option<bool> {
        self.state.reachable
    }

    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    pub fn model_id(&self) -> Option<&str> {
        self.modelid.as_deref()
    }

    pub fn set_on(&mut self, on: bool) {
        self.state.on = on;
    }

    pub(crate) fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub(crate) fn state_update(&self) -> StateUpdate {
        StateUpdate { on: self.state.on }
    }

    fn numeric_id(&self) -> Option<u64> {
        self.id.parse().ok()
    }
}

/// Order lights the way the bridge assigns ids: oldest first, so the last
/// entry is the most recently added light. Non-numeric ids sort last.
pub(crate) fn sort_by_id(lights: &mut [Light]) {
    lights.sort_by(|a, b| {
        let key = |l: &Light| (l.numeric_id().unwrap_or(u64::MAX), l.id.clone());
        key(a).cmp(&key(b))
    });
}
