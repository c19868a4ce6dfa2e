//! # hue_pairing_rs
//!
//! An interactive wizard that provisions a Philips Hue bridge and pairs a
//! LivingColors light (and its remote) with it.
//!
//! The wizard is a strictly linear state machine, see [`Provisioner`]:
//!
//! 1. **Discover** the bridge (SSDP, optionally the N-UPnP portal too), or use
//!    a configured host.
//! 2. **Init client** for that host.
//! 3. **Test connection** with a ping.
//! 4. **Authenticate** by polling user registration until the operator
//!    presses the link button, or reuse a configured username.
//! 5. **Register light** through touchlink and a device scan.
//! 6. **Test light** by switching it off and on again.
//! 7. **Register remote** through a second touchlink.
//! 8. **Cleanup** by removing the API user again.
//!
//! Any failure aborts the run; cleanup still happens.
//!
//! ## Quick Start
//!
//! ```ignore
//! use hue_pairing_rs::{Config, ConsoleOperator, HueDiscovery, Provisioner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), hue_pairing_rs::Error> {
//!     let config = Config::default();
//!     let http = reqwest::Client::builder()
//!         .timeout(config.request_timeout)
//!         .build()
//!         .expect("http client");
//!     let discovery = HueDiscovery::new(http, config.ssdp_window)?;
//!     let operator = ConsoleOperator::new(config.confirmation);
//!
//!     let provisioned = Provisioner::new(config, discovery, operator).run().await?;
//!     println!("Paired {}", provisioned.light.name());
//!     Ok(())
//! }
//! ```
//!
//! ## Seams
//!
//! [`Provisioner`] only depends on the [`Discovery`], [`BridgeApi`] and
//! [`Operator`] traits. [`HueDiscovery`], [`BridgeClient`] and
//! [`ConsoleOperator`] are the network and terminal implementations.
//!
//! ## Communication
//!
//! Bridges are found with an SSDP M-SEARCH on `239.255.255.250:1900` and,
//! when online, through `https://discovery.meethue.com/`. Everything else is
//! plain HTTP against the bridge's v1 REST API.

mod bridge;
mod client;
mod config;
mod discovery;
mod errors;
mod history;
mod light;
mod operator;
pub mod runtime;
mod user;
mod workflow;

// Re-export public API
pub use bridge::{BridgeApi, Discovery};
pub use client::{BridgeClient, BridgeConfig};
pub use config::{Config, ConfirmationStyle, MultipleLightsPolicy};
pub use discovery::{
    DiscoveredBridge, DiscoveryStrategy, HueDiscovery, NUPNP_URL, SSDP_ADDR, discover_nupnp,
    discover_ssdp, parse_ssdp_response,
};
pub use errors::Error;
pub use history::HistorySummary;
pub use light::Light;
pub use operator::{ConsoleOperator, Operator};
pub use user::UserRegistration;
pub use workflow::{Provisioned, Provisioner, Step, select_bridge, select_new_light};
