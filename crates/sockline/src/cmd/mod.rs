use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod unpack;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Break a frame into its outer and inner packets.
    Decode(DecodeArgs),
    /// Build an event or acknowledgement frame.
    Encode(EncodeArgs),
    /// Split a polling body into its packets.
    Unpack(UnpackArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Decode(args) => decode::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Unpack(args) => unpack::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// One text frame, for example `42/chat,1["message","hi"]`.
    pub frame: String,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Event name.
    #[arg(required_unless_present = "ack")]
    pub event: Option<String>,
    /// Namespace to address.
    #[arg(long, short = 'n', default_value = "/")]
    pub namespace: String,
    /// Correlation id; asks the peer for an acknowledgement.
    #[arg(long)]
    pub id: Option<u64>,
    /// Arguments as a JSON array.
    #[arg(long, default_value = "[]")]
    pub args: String,
    /// Build an acknowledgement for `--id` instead of an event.
    #[arg(long, requires = "id", conflicts_with = "event")]
    pub ack: bool,
}

#[derive(Args, Debug)]
pub struct UnpackArgs {
    /// Polling body, for example `2:408:42["hi"]`.
    pub body: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
