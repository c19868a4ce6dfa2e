//! Command-line wizard that provisions a Hue bridge.
//!
//! Run with no arguments for the stock wizard; every flag only overrides
//! the built-in defaults (or the `--config` file).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use log::LevelFilter;

use hue_pairing_rs::{
    Config, ConfirmationStyle, ConsoleOperator, Error, HueDiscovery, MultipleLightsPolicy,
    Provisioned, Provisioner,
};

#[derive(Parser, Debug)]
#[command(name = "hue-pair")]
#[command(
    about = "Provision a Hue bridge and pair a LivingColors light and remote",
    long_about = None
)]
struct Cli {
    /// TOML file with configuration overrides
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Skip discovery and use this bridge host
    #[arg(long)]
    bridge_host: Option<String>,

    /// Reuse an existing API user instead of pressing the link button
    #[arg(long)]
    username: Option<String>,

    /// Also ask the vendor portal for bridges (needs internet access)
    #[arg(long)]
    online: bool,

    /// Seconds to wait for the link button
    #[arg(long)]
    auth_timeout: Option<u64>,

    /// Seconds to wait for the light scan
    #[arg(long)]
    scan_wait: Option<u64>,

    /// What to do when more than one new light shows up (fail, pick-latest)
    #[arg(long)]
    multiple_lights: Option<MultipleLightsPolicy>,

    /// Don't pair a remote
    #[arg(long)]
    no_remote: bool,

    /// Debugging: skip touchlink and use the last light on the bridge
    #[arg(long)]
    use_last_light: bool,

    /// Leave the API user on the bridge when done
    #[arg(long)]
    keep_user: bool,

    /// Confirm prompts with any key instead of yes/no
    #[arg(long)]
    any_key: bool,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn into_config(self) -> Result<Config, Error> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if self.bridge_host.is_some() {
            config.bridge_host = self.bridge_host;
        }
        if self.username.is_some() {
            config.username = self.username;
        }
        if self.online {
            config.offline = false;
        }
        if let Some(secs) = self.auth_timeout {
            config.authentication_waiting_time = std::time::Duration::from_secs(secs);
        }
        if let Some(secs) = self.scan_wait {
            config.light_scan_waiting_time = std::time::Duration::from_secs(secs);
        }
        if let Some(policy) = self.multiple_lights {
            config.multiple_lights = policy;
        }
        if self.no_remote {
            config.register_remote = false;
        }
        if self.use_last_light {
            config.use_last_existing_light = true;
        }
        if self.keep_user {
            config.keep_user = true;
        }
        if self.any_key {
            config.confirmation = ConfirmationStyle::AnyKey;
        }

        config.validate()?;
        Ok(config)
    }
}

fn log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

async fn run(config: Config) -> Result<Provisioned, Error> {
    let http = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| Error::http("build", e))?;
    let discovery = HueDiscovery::new(http, config.ssdp_window)?;
    let operator = ConsoleOperator::new(config.confirmation);

    Provisioner::new(config, discovery, operator).run().await
}

fn abort(err: &Error) -> ExitCode {
    for line in err.operator_message() {
        eprintln!("{line}");
    }
    eprintln!("Aborting...");
    ExitCode::FAILURE
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(log_level(cli.verbose))
        .parse_default_env()
        .init();

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => return abort(&e),
    };

    match run(config).await {
        Ok(provisioned) => {
            println!();
            println!(
                "All done! \"{}\" is paired with the bridge at {}.",
                provisioned.light.name(),
                provisioned.bridge_host
            );
            ExitCode::SUCCESS
        }
        Err(e) => abort(&e),
    }
}
