//! Run configuration for the provisioning wizard.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, DurationSeconds, serde_as};
use strum_macros::{Display, EnumString};

use crate::discovery::DiscoveryStrategy;
use crate::errors::Error;
use crate::user::UserRegistration;

type Result<T> = std::result::Result<T, Error>;

/// What to do when a scan reports more than one new light.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum MultipleLightsPolicy {
    /// Abort; the wizard can't tell which light is the operator's.
    #[default]
    Fail,
    /// Take the most recently discovered light (highest id).
    PickLatest,
}

/// How the operator answers confirmation prompts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ConfirmationStyle {
    /// Explicit yes/no question.
    #[default]
    YesNo,
    /// Any key continues; there is no way to answer "no".
    AnyKey,
}

/// Immutable set of run parameters, loaded once at startup.
///
/// Every field has a default, so an empty TOML file (or no file at all)
/// yields the stock wizard: local-only discovery, a one minute link-button
/// window polled every second and a thirty second light scan.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Only look for bridges on the local network (SSDP).
    pub offline: bool,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub authentication_waiting_time: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub authentication_attempt_interval: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub light_scan_waiting_time: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub remote_settle_time: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub blink_pause: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub ssdp_window: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub request_timeout: Duration,
    /// Skip bridge lookup and use this host.
    pub bridge_host: Option<String>,
    /// Reuse an existing bridge user instead of pressing the link button.
    pub username: Option<String>,
    pub multiple_lights: MultipleLightsPolicy,
    pub register_remote: bool,
    /// Debugging aid: skip touchlink and use the last light the bridge knows.
    pub use_last_existing_light: bool,
    /// Leave the API user on the bridge when the wizard exits.
    pub keep_user: bool,
    pub confirmation: ConfirmationStyle,
    pub app_name: String,
    pub device_type: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            offline: true,
            authentication_waiting_time: Duration::from_secs(60),
            authentication_attempt_interval: Duration::from_millis(1000),
            light_scan_waiting_time: Duration::from_secs(30),
            remote_settle_time: Duration::from_secs(5),
            blink_pause: Duration::from_millis(1000),
            ssdp_window: Duration::from_millis(3000),
            request_timeout: Duration::from_secs(10),
            bridge_host: None,
            username: None,
            multiple_lights: MultipleLightsPolicy::Fail,
            register_remote: true,
            use_last_existing_light: false,
            keep_user: false,
            confirmation: ConfirmationStyle::YesNo,
            app_name: "living-on-hue".to_string(),
            device_type: "cli".to_string(),
        }
    }
}

impl Config {
    /// Parse a TOML document; missing keys fall back to the defaults.
    ///
    /// The result is not validated: command-line overrides still apply on
    /// top of it, so call [`Config::validate`] once they are in.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.authentication_attempt_interval.is_zero() {
            return Err(Error::Config(
                "authentication_attempt_interval must be positive".into(),
            ));
        }
        if self.authentication_attempt_interval >= self.authentication_waiting_time {
            return Err(Error::Config(
                "authentication_attempt_interval must be shorter than authentication_waiting_time"
                    .into(),
            ));
        }
        if self.blink_pause.is_zero() {
            return Err(Error::Config("blink_pause must be positive".into()));
        }
        self.registration().map(|_| ())
    }

    /// Pre-known bridge host, if any. Empty strings count as unset.
    pub fn bridge_host(&self) -> Option<&str> {
        self.bridge_host.as_deref().filter(|h| !h.is_empty())
    }

    /// Pre-known API username, if any. Empty strings count as unset.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref().filter(|u| !u.is_empty())
    }

    pub fn discovery_strategy(&self) -> DiscoveryStrategy {
        if self.offline {
            DiscoveryStrategy::Local
        } else {
            DiscoveryStrategy::Exhaustive
        }
    }

    pub fn registration(&self) -> Result<UserRegistration> {
        UserRegistration::new(&self.app_name, &self.device_type)
    }
}
