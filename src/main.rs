use std::path::PathBuf;
use std::process::ExitCode;

use learning_engine::config::Config;
use learning_engine::logging;
use learning_engine::replay;

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            return ExitCode::from(2);
        }
    };
    let _log_guard = logging::init_tracing(&config.log_level, config.file_log_dir.as_deref());

    let Some(path) = std::env::args_os().nth(1).map(PathBuf::from) else {
        eprintln!("usage: learning-engine-replay <fixture.json>");
        return ExitCode::from(2);
    };

    tracing::info!(fixture = %path.display(), "replaying fixture");
    let report = match replay::run_file(&path, &config.engine) {
        Ok(report) => report,
        Err(err) => {
            tracing::error!(error = %err, "replay failed");
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&report) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to encode report");
            ExitCode::FAILURE
        }
    }
}
