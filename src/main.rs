mod cli;
mod cmd;
mod command;
mod config;
mod error;
mod image;
mod logger;
mod registry;
mod runtime;
mod sandbox;
mod session;
mod shell;
mod spinner;
mod version;

use console::style;
use tracing::{error, info};

fn main() {
    if let Err(err) = logger::init() {
        eprintln!("drm: logging disabled: {:#}", err);
    }
    info!(args = ?std::env::args().collect::<Vec<_>>(), "drm start");

    let code = match cli::run() {
        Ok(code) => {
            info!(code, "drm finished successfully");
            code
        }
        Err(err) => {
            error!(error = ?err, "drm failed");
            eprintln!("{} {:#}", style("error:").red().bold(), err);
            error::exit_code_for(&err)
        }
    };
    std::process::exit(code);
}
