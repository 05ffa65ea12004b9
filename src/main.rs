use clap::Parser;
use log::{error, info};
use snare::configuration::config::Config;
use snare::configuration::types::ConfigOverrides;
use snare::controller::controller_handler::Controller;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "snare")]
#[command(version)]
#[command(about = "Catch-all HTTP honeypot that logs every request to CSV")]
struct Args {
    /// Optional TOML configuration file
    #[arg(short, long, env = "SNARE_CONFIG")]
    config_file: Option<PathBuf>,

    #[command(flatten)]
    overrides: ConfigOverrides,
}

#[tokio::main]
async fn main() {
    // RUST_LOG takes precedence over the default level
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_target(false)
        .init();

    println!(
        "
 ___ _ __   __ _ _ __ ___
/ __| '_ \\ / _` | '__/ _ \\
\\__ \\ | | | (_| | | |  __/
|___/_| |_|\\__,_|_|  \\___|
=============================
  catch-all HTTP capture v{}
=============================
",
        env!("CARGO_PKG_VERSION")
    );

    let args = Args::parse();

    info!("Importing configuration");
    let config = match Config::load(args.config_file.as_deref(), &args.overrides) {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to import configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Configuration imported successfully");

    let controller = match Controller::new(config) {
        Ok(controller) => controller,
        Err(e) => {
            error!("Unable to create a controller instance: {}, exiting...", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = controller.run().await {
        error!("Error occurred in the controller process: {}, exiting...", e);
        std::process::exit(1);
    }
    info!("Exiting");
}
