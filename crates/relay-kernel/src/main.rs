use relay_kernel::{command, execute, load_config, logging};
use std::path::PathBuf;

#[tokio::main]
async fn main() {
    let matches = command().get_matches();

    let config = match load_config(matches.get_one::<PathBuf>("config").map(PathBuf::as_path)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(2);
        }
    };
    logging::init(&config.log_level, matches.get_flag("json-logs"));

    match execute(&matches, config).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Command failed");
            eprintln!("error: {e:#}");
            std::process::exit(2);
        }
    }
}
