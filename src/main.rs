// What you SEE:
// • The projector flashes green for a moment while the camera finds the screen.
// • Then a black canvas with a column of buttons on the left.
// • Move a red laser dot over the canvas and it leaves a trail.
// • Hover the dot on a button to clear, recolor, resize or quit.
// • Keys: C clear, W/B/G/Y color, [ ] thinner/thicker, S/Q/Esc quit.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use laser_graffiti::{Config, run_session};

#[derive(Parser, Debug)]
#[command(name = "laser-graffiti")]
#[command(version, about = "Draw on a projected canvas with a laser pointer", long_about = None)]
struct Args {
    /// Config file (default: <config dir>/laser-graffiti/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera device index
    #[arg(short, long)]
    device: Option<u32>,

    /// Network stream URL; overrides --device
    #[arg(short, long)]
    url: Option<String>,

    /// Flip the canvas left-right before display
    #[arg(short, long)]
    mirror: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(device) = args.device {
        config.camera.device = device;
    }
    if args.url.is_some() {
        config.camera.url = args.url;
    }
    if args.mirror {
        config.display.mirror = true;
    }

    match run_session(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
