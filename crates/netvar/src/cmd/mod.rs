use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Subcommand};
use netvar_list::{ClientConfig, Declaration, ListOptions};
use netvar_transport::{DEFAULT_BROADCAST_ENDPOINT, DEFAULT_PORT};

use crate::exit::{list_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod definition;
pub mod inspect;
pub mod listen;
pub mod set;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Mirror a list and print changes as frames arrive.
    Listen(ListenArgs),
    /// Check a captured frame (hex) against a declaration.
    Inspect(InspectArgs),
    /// Set one or more variables and send them.
    Set(SetArgs),
    /// Print the GVL definition for a declaration.
    Definition(DefinitionArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, format),
        Command::Inspect(args) => inspect::run(args, format),
        Command::Set(args) => set::run(args, format),
        Command::Definition(args) => definition::run(args),
        Command::Version(args) => version::run(args),
    }
}

/// Socket settings shared by commands that touch the network.
#[derive(Args, Debug, Clone)]
pub struct NetArgs {
    /// Destination host for outbound frames.
    #[arg(long, env = "NETVAR_ENDPOINT", default_value = DEFAULT_BROADCAST_ENDPOINT)]
    pub endpoint: String,
    /// Local port to listen on.
    #[arg(long, env = "NETVAR_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Remote port to send to. Default: same as --port.
    #[arg(long, env = "NETVAR_SEND_PORT")]
    pub send_port: Option<u16>,
}

impl NetArgs {
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::default()
            .with_endpoint(self.endpoint.clone())
            .with_port(self.port);
        config.transport.send_port = self.send_port;
        config
    }
}

/// List identity and behavior shared by commands that open a list.
#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// List identifier.
    #[arg(long, short = 'l')]
    pub list_id: u16,
    /// JSON declaration file: an array of {name, idx, kind, value}.
    #[arg(long, value_name = "FILE")]
    pub decl: PathBuf,
    /// Send the whole list as one packed frame.
    #[arg(long)]
    pub packed: bool,
    /// Re-send the list periodically at this interval (e.g. 1s, 250ms).
    #[arg(long, value_name = "INTERVAL")]
    pub cyclic: Option<String>,
}

impl ListArgs {
    pub fn options(&self) -> CliResult<ListOptions> {
        let mut options = ListOptions::default().with_packed(self.packed);
        if let Some(interval) = &self.cyclic {
            options = options.with_cyclic(parse_duration(interval)?);
        }
        Ok(options)
    }

    pub fn declaration(&self) -> CliResult<Declaration> {
        load_declaration(&self.decl)
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub net: NetArgs,
    /// List identifier.
    #[arg(long, short = 'l')]
    pub list_id: u16,
    /// JSON declaration file. Without it, raw frames are printed.
    #[arg(long, value_name = "FILE")]
    pub decl: Option<PathBuf>,
    /// Exit after N events.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Frame bytes as hex (whitespace and `:` separators allowed).
    pub hex: String,
    /// JSON declaration file describing the list layout.
    #[arg(long, value_name = "FILE")]
    pub decl: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SetArgs {
    #[command(flatten)]
    pub net: NetArgs,
    #[command(flatten)]
    pub list: ListArgs,
    /// Assignment NAME=VALUE; repeat for several variables.
    #[arg(long = "var", value_name = "NAME=VALUE", required = true)]
    pub vars: Vec<String>,
}

#[derive(Args, Debug)]
pub struct DefinitionArgs {
    #[command(flatten)]
    pub list: ListArgs,
    /// Broadcast address written into the definition.
    #[arg(long, env = "NETVAR_ENDPOINT", default_value = DEFAULT_BROADCAST_ENDPOINT)]
    pub endpoint: String,
    /// Port written into the definition.
    #[arg(long, env = "NETVAR_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn load_declaration(path: &Path) -> CliResult<Declaration> {
    let text = std::fs::read_to_string(path).map_err(|err| {
        CliError::new(USAGE, format!("cannot read {}: {err}", path.display()))
    })?;
    Declaration::from_json(&text)
        .map_err(|err| list_error(&format!("declaration {}", path.display()), err))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "ms")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(match unit {
        "s" => Duration::from_secs(value),
        _ => Duration::from_millis(value),
    })
}
