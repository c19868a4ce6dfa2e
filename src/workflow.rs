//! The provisioning state machine.
//!
//! One linear pass: discover → init client → test connection → authenticate
//! → register light → test light → register remote → cleanup. Every step
//! either hands over to the next one or ends the run with an [`Error`];
//! cleanup runs exactly once on every path out.

use std::time::Duration;

use log::{debug, info, trace, warn};
use strum_macros::Display;

use crate::bridge::{BridgeApi, Discovery};
use crate::config::{Config, MultipleLightsPolicy};
use crate::discovery::DiscoveredBridge;
use crate::errors::Error;
use crate::history::HistorySummary;
use crate::light::Light;
use crate::operator::Operator;
use crate::runtime;

type Result<T> = std::result::Result<T, Error>;

const LIGHT_INSTRUCTIONS: &[&str] = &[
    "",
    "To register your LivingColors light, we'll enable touchlink in your bridge.",
    "Don't worry, that's a temporary change.",
    "",
    "To make sure we get this right:",
    "1. Put your LivingColors light close to your bridge",
    "2. Make sure both your LivingColors light and bridge are on",
    "3. Make sure you don't have any other (ZigBee, e.g. LivingColors, hue) lights and remotes near the bridge",
];

const REMOTE_INSTRUCTIONS: &[&str] = &[
    "",
    "Now let's pair your LivingColors remote with the bridge.",
    "",
    "To make sure we get this right:",
    "1. Put the remote right next to your bridge",
    "2. Make sure there are no other (ZigBee, e.g. LivingColors, hue) lights and remotes near the bridge",
    "3. Keep the remote there until we tell you otherwise",
];

/// Workflow steps, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Step {
    Discover,
    InitClient,
    TestConnection,
    Authenticate,
    RegisterLight,
    TestLight,
    RegisterRemote,
    Cleanup,
}

/// What a completed run set up.
#[derive(Debug, Clone, PartialEq)]
pub struct Provisioned {
    pub bridge_host: String,
    pub light: Light,
    /// Whether the API user was deleted from the bridge on the way out.
    pub user_removed: bool,
}

/// Session state of one run. Each slot is filled at most once.
struct Context<C> {
    client: Option<C>,
    light: Option<Light>,
    authenticated: bool,
    user_removed: bool,
    steps: Vec<Step>,
}

impl<C> Default for Context<C> {
    fn default() -> Self {
        Context {
            client: None,
            light: None,
            authenticated: false,
            user_removed: false,
            steps: Vec::new(),
        }
    }
}

fn enter(steps: &mut Vec<Step>, step: Step) {
    info!("step: {step}");
    steps.push(step);
}

/// Drives the wizard against a bridge capability and an operator.
///
/// # Example
///
/// ```no_run
/// use hue_pairing_rs::{Config, ConsoleOperator, HueDiscovery, Provisioner};
///
/// # async fn run() -> Result<(), hue_pairing_rs::Error> {
/// let config = Config::default();
/// let discovery = HueDiscovery::new(reqwest::Client::new(), config.ssdp_window)?;
/// let operator = ConsoleOperator::new(config.confirmation);
/// let provisioned = Provisioner::new(config, discovery, operator).run().await?;
/// println!("paired {}", provisioned.light.name());
/// # Ok(())
/// # }
/// ```
pub struct Provisioner<D: Discovery, O: Operator> {
    config: Config,
    discovery: D,
    operator: O,
    steps: Vec<Step>,
}

impl<D: Discovery, O: Operator> Provisioner<D, O> {
    pub fn new(config: Config, discovery: D, operator: O) -> Self {
        Provisioner {
            config,
            discovery,
            operator,
            steps: Vec::new(),
        }
    }

    pub fn operator(&self) -> &O {
        &self.operator
    }

    /// Steps entered by the last [`Provisioner::run`], in order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Run the whole workflow, then clean up.
    ///
    /// A provisioning error wins over a cleanup error; when both happen the
    /// cleanup error is only logged.
    pub async fn run(&mut self) -> Result<Provisioned> {
        let mut ctx = Context::default();
        let result = self.provision(&mut ctx).await;

        if let Err(e) = &result {
            warn!("provisioning failed: {e}");
            if let Some(client) = ctx.client.as_ref() {
                if let Some(summary) = client.diagnostics().await {
                    log_conversation(&summary);
                }
            }
        }

        let cleanup = self.cleanup(&mut ctx).await;
        self.steps = std::mem::take(&mut ctx.steps);

        match (result, cleanup) {
            (Ok(provisioned), Ok(())) => Ok(Provisioned {
                user_removed: ctx.user_removed,
                ..provisioned
            }),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup)) => {
                warn!("cleanup failed as well: {cleanup}");
                Err(e)
            }
        }
    }

    async fn provision(&mut self, ctx: &mut Context<D::Client>) -> Result<Provisioned> {
        enter(&mut ctx.steps, Step::Discover);
        let bridge = self.discover().await?;

        enter(&mut ctx.steps, Step::InitClient);
        let client = ctx
            .client
            .insert(self.discovery.connect(&bridge, self.config.username()));

        enter(&mut ctx.steps, Step::TestConnection);
        self.test_connection(client).await?;

        enter(&mut ctx.steps, Step::Authenticate);
        self.authenticate(client).await?;
        ctx.authenticated = true;

        enter(&mut ctx.steps, Step::RegisterLight);
        let light = if self.config.use_last_existing_light {
            self.last_existing_light(client).await?
        } else {
            self.register_light(client).await?
        };
        let light = ctx.light.insert(light);

        enter(&mut ctx.steps, Step::TestLight);
        self.test_light(client, light).await?;

        if self.config.register_remote {
            enter(&mut ctx.steps, Step::RegisterRemote);
            self.register_remote(client, light).await?;
        }

        Ok(Provisioned {
            bridge_host: client.host().to_string(),
            light: light.clone(),
            user_removed: false,
        })
    }

    async fn discover(&mut self) -> Result<DiscoveredBridge> {
        if let Some(host) = self.config.bridge_host() {
            debug!("using configured bridge host {host}");
            return Ok(DiscoveredBridge::from_host(host));
        }

        self.operator.print(&["Looking for bridges..."]);
        let strategy = self.config.discovery_strategy();
        let bridges = self
            .discovery
            .discover(strategy).await
            .map_err(|e| match e {
                Error::Discovery(_) => e,
                other => Error::Discovery(other.to_string()),
            })?;

        select_bridge(bridges)
    }

    async fn test_connection(&mut self, client: &D::Client) -> Result<()> {
        client.ping().await?;
        info!("bridge at {} is reachable", client.host());
        self.operator.print(&[&format!(
            "Found a bridge accessible on {}",
            client.host()
        )]);
        Ok(())
    }

    /// Race the link-button window against a registration poll loop.
    ///
    /// The loop sleeps one interval before every attempt. Whichever side
    /// finishes first drops the other.
    async fn authenticate(&mut self, client: &mut D::Client) -> Result<()> {
        if client.username().is_some() {
            info!("reusing configured API user");
            return Ok(());
        }

        let registration = self.config.registration()?;
        let window = self.config.authentication_waiting_time;
        let interval = self.config.authentication_attempt_interval;

        self.operator.print(&[
            "",
            "Press the link-button on the bridge so that we can authenticate.",
            &format!("You have {} to do it.", describe(window)),
        ]);

        let poll = async {
            let mut attempt = 0u32;
            loop {
                runtime::sleep(interval).await;
                attempt += 1;
                match client.create_user(&registration).await {
                    Ok(username) => {
                        debug!("authenticated after {attempt} attempt(s)");
                        return username;
                    }
                    Err(e) if e.is_link_button_not_pressed() => {
                        trace!("authentication attempt {attempt}: link button not pressed yet")
                    }
                    Err(e) => debug!("authentication attempt {attempt} failed: {e}"),
                }
            }
        };

        let username = runtime::timeout(window, poll).await
            .map_err(|_| Error::LinkButtonNotPressed(window))?;

        client.set_username(username);
        self.operator.print(&["Successfully authenticated."]);
        Ok(())
    }

    async fn register_light(&mut self, client: &D::Client) -> Result<Light> {
        self.operator.print(LIGHT_INSTRUCTIONS);
        self.require_confirmation("Ready to register your light?").await?;

        client.touchlink().await?;

        let scan = self.config.light_scan_waiting_time;
        self.operator.print(&[
            "",
            "Your LivingColors light should start blinking at any moment.",
            "Detecting your light...",
            &format!("This can take up to {}.", describe(scan)),
        ]);

        client.scan_for_new_lights().await?;
        runtime::sleep(scan).await;
        let found = client.new_lights().await?;
        debug!("scan reported {} new light(s)", found.len());

        let light = select_new_light(found, self.config.multiple_lights)?;
        debug!(
            "new light {} is a {} (model {})",
            light.id(),
            light.kind().unwrap_or("light of unknown type"),
            light.model_id().unwrap_or("?")
        );
        self.operator.print(&[
            "",
            &format!("Found your light, its name is {}.", light.name()),
        ]);
        Ok(light)
    }

    async fn last_existing_light(&mut self, client: &D::Client) -> Result<Light> {
        let light = client.lights().await?.pop().ok_or(Error::NoLights)?;
        self.operator.print(&[&format!("Using light \"{}\"", light.name())]);
        Ok(light)
    }

    /// Off, pause, on, then ask whether that was visible.
    async fn test_light(&mut self, client: &D::Client, light: &mut Light) -> Result<()> {
        self.operator.print(&[
            "",
            "To make sure we got the right light, we're gonna turn it off and on again.",
        ]);
        self.require_confirmation("Turn the light off and on now?").await?;

        if light.is_reachable() == Some(false) {
            warn!("bridge reports light {} as unreachable", light.id());
        }
        light.set_on(false);
        client.save_light(light).await?;

        runtime::sleep(self.config.blink_pause).await;

        light.set_on(true);
        client.save_light(light).await?;

        self.require_confirmation("Did the light go off and on again?").await
    }

    async fn register_remote(&mut self, client: &D::Client, light: &mut Light) -> Result<()> {
        self.operator.print(REMOTE_INSTRUCTIONS);
        self.require_confirmation("Ready to register your remote?").await?;

        client.touchlink().await?;
        self.operator.print(&["", "Pairing your remote, hold on for a moment..."]);
        runtime::sleep(self.config.remote_settle_time).await;

        self.require_confirmation("Did the LED on your remote blink a few times?").await?;
        self.require_confirmation("Can you switch your light on and off with the remote?").await?;

        self.test_light(client, light).await
    }

    async fn cleanup(&mut self, ctx: &mut Context<D::Client>) -> Result<()> {
        enter(&mut ctx.steps, Step::Cleanup);

        let Some(client) = ctx.client.as_ref() else {
            return Ok(());
        };
        if !ctx.authenticated {
            return Ok(());
        }
        let Some(username) = client.username().map(String::from) else {
            return Ok(());
        };
        if self.config.keep_user {
            info!("keeping API user on the bridge");
            return Ok(());
        }

        info!("removing API user from the bridge");
        client.delete_user(&username).await?;
        ctx.user_removed = true;
        Ok(())
    }

    async fn require_confirmation(&mut self, prompt: &str) -> Result<()> {
        if self.operator.confirm(prompt).await? {
            Ok(())
        } else {
            Err(Error::Declined(prompt.to_string()))
        }
    }
}

/// Exactly one bridge, or an error saying why not.
pub fn select_bridge(mut bridges: Vec<DiscoveredBridge>) -> Result<DiscoveredBridge> {
    match bridges.len() {
        0 => Err(Error::NoBridges),
        1 => Ok(bridges.remove(0)),
        n => Err(Error::MultipleBridges(n)),
    }
}

/// Pick the operator's light out of a scan result ordered oldest first.
pub fn select_new_light(mut found: Vec<Light>, policy: MultipleLightsPolicy) -> Result<Light> {
    match (found.len(), policy) {
        (0, _) => Err(Error::NoNewLight),
        (1, _) | (_, MultipleLightsPolicy::PickLatest) => found.pop().ok_or(Error::NoNewLight),
        (n, MultipleLightsPolicy::Fail) => Err(Error::MultipleNewLights(n)),
    }
}

fn describe(duration: Duration) -> String {
    if duration.subsec_millis() != 0 {
        return format!("{} milliseconds", duration.as_millis());
    }
    match duration.as_secs() {
        1 => "1 second".to_string(),
        60 => "1 minute".to_string(),
        s if s > 0 && s % 60 == 0 => format!("{} minutes", s / 60),
        s if s > 60 => format!(
            "{} and {}",
            describe(Duration::from_secs(s - s % 60)),
            describe(Duration::from_secs(s % 60))
        ),
        s => format!("{s} seconds"),
    }
}

fn log_conversation(summary: &HistorySummary) {
    debug!(
        "bridge conversation: {} request(s), {} answered",
        summary.send_count, summary.receive_count
    );
    for line in &summary.recent {
        debug!("  {line}");
    }
    if let Some(request) = &summary.last_request {
        warn!("last bridge request: {request}");
    }
    if let Some(error) = &summary.last_error {
        warn!("last bridge error: {error}");
    }
}
