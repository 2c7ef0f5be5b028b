use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;

use rc_remote::launcher;
use rc_remote::logger;

#[derive(Parser)]
#[command(about = "Starts the service binary from the newest versioned release folder")]
struct Args {
    /// Folder holding one subfolder per release, named by version
    #[arg(long, default_value = "/home/pi/robotcar/restserver")]
    base_dir: PathBuf,

    /// File to start inside the chosen release folder
    #[arg(long, default_value = "Paregov.RobotCar.Rest.Service.dll")]
    binary: String,

    /// Program the binary is passed to; empty runs the binary directly
    #[arg(long, default_value = "dotnet")]
    runner: String,

    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    logger::init(args.log_level)?;

    let Some(target) = launcher::find_newest(&args.base_dir, &args.binary)? else {
        log::error!("No versioned subfolders found in {}", args.base_dir.display());
        return Ok(ExitCode::FAILURE);
    };
    log::info!("Newest release: {}", target.display());

    let runner = Some(args.runner.as_str()).filter(|r| !r.is_empty());
    let output = match launcher::launch(runner, &target) {
        Ok(output) => output,
        Err(e) => {
            log::error!("Could not start {}: {}", runner.unwrap_or("release binary"), e);
            return Ok(ExitCode::FAILURE);
        }
    };

    log::info!("stdout: {}", String::from_utf8_lossy(&output.stdout).trim_end());
    log::info!("stderr: {}", String::from_utf8_lossy(&output.stderr).trim_end());

    if output.status.success() {
        Ok(ExitCode::SUCCESS)
    } else {
        log::error!("Service exited with {}", output.status);
        Ok(ExitCode::FAILURE)
    }
}
