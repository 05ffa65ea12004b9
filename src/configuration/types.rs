use clap::Args;
use std::net::IpAddr;
use std::path::PathBuf;

/// Command-line and environment overrides, applied on top of the file.
///
/// Every field is optional: an absent flag leaves the configured value alone.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    /// IP address to listen on
    #[arg(long, env = "SNARE_BIND_ADDRESS")]
    pub bind_address: Option<IpAddr>,

    /// TCP port to listen on
    #[arg(short, long, env = "SNARE_PORT")]
    pub port: Option<u16>,

    /// Path of the CSV request log
    #[arg(long, env = "SNARE_LOG_PATH")]
    pub log_path: Option<PathBuf>,

    /// Identifier written in the HoneypotName column
    #[arg(long, env = "SNARE_HONEYPOT_NAME")]
    pub honeypot_name: Option<String>,

    /// Largest request body, in bytes, read for form capture
    #[arg(long, env = "SNARE_MAX_BODY_BYTES")]
    pub max_body_bytes: Option<u64>,
}
