use std::process::ExitCode;

use restcmd_config::RelayConfig;

fn main() -> ExitCode {
    let config = match RelayConfig::load() {
        Ok(config) => config,
        Err(error) => error.exit(),
    };
    match restcmdd::run_daemon(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("restcmdd: {error}");
            ExitCode::FAILURE
        }
    }
}
