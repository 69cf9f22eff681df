use anyhow::bail;
use beacon::{
    Settings,
    config::{DEFAULT_PACK_SIZE, GEOHASH_PRECISION, MAX_SLOT_ATTEMPTS},
};
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Runtime configuration for the `beacon` binary.
///
/// Tunables are read from CLI arguments or environment variables (a `.env`
/// file is honoured). Defaults match the library's.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "beacon",
    version,
    about = "Inspect ids, ring searches and campaigns against an in-memory backend"
)]
pub struct CliArgs {
    /// Recipients per campaign pack.
    ///
    /// Environment variable: `PACK_SIZE`
    #[arg(long, global = true, env = "PACK_SIZE", default_value_t = DEFAULT_PACK_SIZE)]
    pub pack_size: usize,

    /// Attempts per sequence allocation before giving up on slot conflicts.
    ///
    /// Environment variable: `MAX_SLOT_ATTEMPTS`
    #[arg(long, global = true, env = "MAX_SLOT_ATTEMPTS", default_value_t = MAX_SLOT_ATTEMPTS)]
    pub max_slot_attempts: usize,

    /// Geohash precision used by the ring search (1..=12).
    ///
    /// Environment variable: `GEOHASH_PRECISION`
    #[arg(long, global = true, env = "GEOHASH_PRECISION", default_value_t = GEOHASH_PRECISION)]
    pub geohash_precision: usize,

    /// Log output format.
    ///
    /// Environment variable: `LOG_FORMAT`
    #[arg(long, global = true, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the geohash batches covering a circular area.
    Rings(AreaArgs),
    /// Decode a composed id, root, message id or media id.
    Decode(DecodeArgs),
    /// Mint push keys.
    PushKey(PushKeyArgs),
    /// Run a chat exchange and a campaign against an in-memory backend.
    Simulate(SimulateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct AreaArgs {
    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,
    #[arg(long, allow_hyphen_values = true)]
    pub lon: f64,
    #[arg(long, default_value_t = 5.0)]
    pub radius_km: f64,
    /// Perimeter samples, clamped to 8..=12.
    #[arg(long, default_value_t = 12)]
    pub samples: usize,
}

#[derive(Args, Debug, Clone)]
pub struct DecodeArgs {
    pub input: String,
}

#[derive(Args, Debug, Clone)]
pub struct PushKeyArgs {
    #[arg(long, default_value_t = 1)]
    pub count: usize,
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub area: AreaArgs,
    /// Users seeded inside the area.
    #[arg(long, default_value_t = 200)]
    pub users: usize,
    /// Maximum campaign recipients.
    #[arg(long, default_value_t = 50)]
    pub limit: usize,
    #[arg(long, default_value_t = 100)]
    pub price: u64,
    /// Chat messages exchanged before the campaign runs.
    #[arg(long, default_value_t = 3)]
    pub messages: usize,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub settings: Settings,
    pub log_format: LogFormat,
    pub command: Command,
}

impl TryFrom<CliArgs> for AppConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.pack_size == 0 {
            bail!("PACK_SIZE must be greater than 0");
        }
        if args.max_slot_attempts == 0 {
            bail!("MAX_SLOT_ATTEMPTS must be greater than 0");
        }
        if !(1..=12).contains(&args.geohash_precision) {
            bail!(
                "GEOHASH_PRECISION ({}) must be between 1 and 12",
                args.geohash_precision
            );
        }
        if let Command::Rings(area) | Command::Simulate(SimulateArgs { area, .. }) = &args.command
        {
            if !(area.radius_km.is_finite() && area.radius_km > 0.0) {
                bail!("radius must be a positive number of kilometres");
            }
        }

        Ok(Self {
            settings: Settings {
                max_slot_attempts: args.max_slot_attempts,
                pack_size: args.pack_size,
                geohash_precision: args.geohash_precision,
            },
            log_format: args.log_format,
            command: args.command,
        })
    }
}
