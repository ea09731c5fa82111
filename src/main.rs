//! spotlight-slideshow
//!
//! Opens one headless slideshow window per image source and hands the
//! spotlight around between them until Ctrl+C.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use spotlight_slideshow::config::Config;
use spotlight_slideshow::logging;
use spotlight_slideshow::slide::default_loader;
use spotlight_slideshow::slide::scan::collect_image_paths;
use spotlight_slideshow::spotlight::{SpotlightScheduler, WindowHandle};
use spotlight_slideshow::viewer::Viewer;

#[derive(Debug, Default, PartialEq)]
struct Args {
    sources: Vec<String>,
    delay: Option<f64>,
    duration: Option<f64>,
    config: Option<PathBuf>,
    help: bool,
}

fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;
    if args.help {
        print_help();
        return Ok(());
    }

    // Keep the file writer alive until exit
    let _log_guard = match logging::init_logging() {
        Ok(guard) => Some(guard),
        Err(e) => {
            logging::init_stderr_logging();
            warn!("File logging unavailable: {:#}", e);
            None
        }
    };

    info!("spotlight-slideshow starting...");

    if args.sources.is_empty() {
        print_help();
        bail!("No image sources given");
    }

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    info!("Configuration loaded from {:?}", config.config_path());

    if let Some(delay) = args.delay {
        config.slideshow.default_delay_secs = delay;
    }
    if let Some(duration) = args.duration {
        config.spotlight.duration_secs = duration;
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let scheduler = SpotlightScheduler::new(
        config.spotlight_timing(),
        config.engine_timing(),
        default_loader(),
        runtime.handle().clone(),
    );
    let shutdown = CancellationToken::new();

    let mut viewers = Vec::new();
    for (n, source) in args.sources.iter().enumerate() {
        let paths = match resolve_source(source) {
            Ok(paths) => paths,
            Err(e) => {
                warn!("Skipping source '{}': {:#}", source, e);
                continue;
            }
        };

        let instance = scheduler.register(WindowHandle::new(format!("window-{}", n + 1)));
        let added = instance.engine().add_slide_paths(&paths);
        info!(
            "{} shows {} of {} images from '{}'",
            instance.window().label(),
            added,
            paths.len(),
            source
        );

        viewers.push(Viewer::attach(
            &instance,
            &scheduler,
            runtime.handle(),
            shutdown.clone(),
        ));
    }

    if scheduler.is_empty() {
        bail!("None of the sources could be opened");
    }

    if config.spotlight.autostart {
        // A lone window is exempt from rotation and runs by itself
        if scheduler.len() == 1 {
            for instance in scheduler.instances() {
                instance.engine().start();
            }
        }
        scheduler.start();
    } else {
        info!("Spotlight autostart disabled, every window plays freely");
        for instance in scheduler.instances() {
            instance.engine().start();
        }
    }

    let ctrl_c = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received, shutting down...");
        ctrl_c.cancel();
    })
    .context("Failed to install Ctrl+C handler")?;

    runtime.block_on(shutdown.cancelled());

    scheduler.shutdown();
    runtime.block_on(async {
        for viewer in viewers {
            viewer.closed().await;
        }
    });

    info!("Shutdown complete");
    Ok(())
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => parsed.help = true,
            "--delay" => parsed.delay = Some(parse_secs(&arg, args.next())?),
            "--duration" => parsed.duration = Some(parse_secs(&arg, args.next())?),
            "--config" => {
                let value = args.next().context("--config needs a path")?;
                parsed.config = Some(PathBuf::from(value));
            }
            flag if flag.starts_with("--") => bail!("Unknown option: {}", flag),
            _ => parsed.sources.push(arg),
        }
    }

    Ok(parsed)
}

fn parse_secs(flag: &str, value: Option<String>) -> Result<f64> {
    let value = value.with_context(|| format!("{} needs a number of seconds", flag))?;
    let secs: f64 = value
        .parse()
        .with_context(|| format!("Invalid value for {}: {}", flag, value))?;
    if !secs.is_finite() || secs < 0.0 {
        bail!("{} must be a finite number of seconds, got {}", flag, value);
    }
    Ok(secs)
}

/// A directory becomes its sorted images, anything else a comma-separated file list
fn resolve_source(source: &str) -> Result<Vec<PathBuf>> {
    let path = Path::new(source);
    if path.is_dir() {
        return Ok(collect_image_paths(path)?);
    }

    let paths: Vec<PathBuf> = source
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(PathBuf::from)
        .collect();

    if paths.is_empty() {
        bail!("No files listed");
    }
    Ok(paths)
}

fn print_help() {
    println!("spotlight-slideshow - Slideshows that take turns in the spotlight");
    println!();
    println!("USAGE:");
    println!("    spotlight-slideshow [OPTIONS] <SOURCE>...");
    println!();
    println!("Each SOURCE opens one window: a directory of images, or a");
    println!("comma-separated list of image files.");
    println!();
    println!("OPTIONS:");
    println!("    --delay <SECS>       Seconds per slide (at most 5)");
    println!("    --duration <SECS>    Seconds each window keeps the spotlight");
    println!("    --config <PATH>      Read settings from this file");
    println!("    -h, --help           Print this help message");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG             Set log level (e.g., debug, info, warn)");
    println!("    SPOTLIGHT_LOG_PATH   Override the log directory");
}
