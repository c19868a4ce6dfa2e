//! Capabilities the provisioning workflow needs from a bridge.
//!
//! [`crate::Provisioner`] only talks to these traits. [`crate::HueDiscovery`]
//! and [`crate::BridgeClient`] implement them over the network; tests plug in
//! scripted fakes.

use std::future::Future;

use crate::discovery::{DiscoveredBridge, DiscoveryStrategy};
use crate::errors::Error;
use crate::history::HistorySummary;
use crate::light::Light;
use crate::user::UserRegistration;

type Result<T> = std::result::Result<T, Error>;

/// Finds bridges and opens client sessions to them.
pub trait Discovery: Send + Sync {
    type Client: BridgeApi;

    /// Look for bridges using the given strategy.
    fn discover(
        &self,
        strategy: DiscoveryStrategy,
    ) -> impl Future<Output = Result<Vec<DiscoveredBridge>>> + Send;

    /// Bind a client to `bridge`. `username` may be absent until authentication.
    fn connect(&self, bridge: &DiscoveredBridge, username: Option<&str>) -> Self::Client;
}

/// A session with one bridge.
pub trait BridgeApi: Send + Sync {
    fn host(&self) -> &str;

    /// API username, `None` until authenticated.
    fn username(&self) -> Option<&str>;

    fn set_username(&mut self, username: String);

    /// Liveness probe.
    fn ping(&self) -> impl Future<Output = Result<()>> + Send;

    /// Register a new API user. Fails while the link button is unpressed.
    fn create_user(
        &self,
        registration: &UserRegistration,
    ) -> impl Future<Output = Result<String>> + Send;

    fn delete_user(&self, username: &str) -> impl Future<Output = Result<()>> + Send;

    /// Start a device scan. Results show up in [`BridgeApi::new_lights`] later.
    fn scan_for_new_lights(&self) -> impl Future<Output = Result<()>> + Send;

    /// Lights found by the last scan, oldest first.
    fn new_lights(&self) -> impl Future<Output = Result<Vec<Light>>> + Send;

    /// Every light known to the bridge, oldest first.
    fn lights(&self) -> impl Future<Output = Result<Vec<Light>>> + Send;

    /// Persist the on/off state of `light`.
    fn save_light(&self, light: &Light) -> impl Future<Output = Result<()>> + Send;

    /// Broadcast a touchlink pairing request.
    fn touchlink(&self) -> impl Future<Output = Result<()>> + Send;

    /// Request history for diagnostics, when the client keeps one.
    fn diagnostics(&self) -> impl Future<Output = Option<HistorySummary>> + Send {
        async { None }
    }
}
