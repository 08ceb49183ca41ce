//! Moth command-line host.
//!
//! Runs cartridges headless on a fixed-step loop, optionally with the
//! interactive stdin debugger attached.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use moth_engine::Cartridge;

mod debug;

#[derive(Debug, Parser)]
#[command(name = "moth", version, about = "Tiny headless fantasy console", author)]
struct Cli {
    /// Enable verbose engine logging.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a cartridge.
    Run {
        /// Cartridge directory.
        cart: PathBuf,

        /// Stop after this many frames (default: run until fault or quit).
        #[arg(long)]
        frames: Option<u64>,

        /// Fixed-step simulation rate.
        #[arg(long, default_value_t = 60.0)]
        fps: f64,

        /// Watchdog budget in seconds; 0 disables the watchdog.
        #[arg(long, default_value_t = 5.0, value_name = "SECONDS")]
        watchdog: f64,

        /// Attach the interactive debugger (reads commands from stdin).
        #[arg(long)]
        debug: bool,

        /// Seed a breakpoint before the cartridge starts. Repeatable.
        #[arg(long = "break", value_name = "FILE:LINE")]
        breakpoints: Vec<String>,
    },

    /// Load a cartridge and report on it without running it.
    Check {
        /// Cartridge directory.
        cart: PathBuf,
    },
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    simple_logger::SimpleLogger::new().with_level(level).init()?;

    match cli.command {
        Commands::Run {
            cart,
            frames,
            fps,
            watchdog,
            debug,
            breakpoints,
        } => run(&cart, frames, fps, watchdog, debug, &breakpoints),
        Commands::Check { cart } => check(&cart),
    }
}

fn run(
    cart_path: &std::path::Path,
    frames: Option<u64>,
    fps: f64,
    watchdog: f64,
    debug: bool,
    breakpoints: &[String],
) -> color_eyre::Result<()> {
    let mut cart = Cartridge::new()?;
    let debugger = cart.debugger();

    for spec in breakpoints {
        let (file, line) = debug::parse_location(spec)
            .ok_or_else(|| color_eyre::eyre::eyre!("invalid breakpoint `{spec}`, expected FILE:LINE"))?;
        debugger.add_breakpoint(&file, line);
    }
    if watchdog > 0.0 {
        cart.engine()
            .set_watchdog(true, Duration::from_secs_f64(watchdog));
    }

    let controller = if debug {
        debugger.set_enabled(true);
        Some(debug::ReplSession::attach(
            cart.engine_mut(),
            debugger.clone(),
        ))
    } else {
        None
    };

    cart.load(cart_path)?;
    if let Some(controller) = &controller {
        for source in cart.engine().sources() {
            controller.add_source(&source.name, &source.code);
        }
    }
    cart.start()?;
    println!("{} {}", "running".green().bold(), cart.title());

    let dt = 1.0 / fps;
    let mut frame: u64 = 0;
    loop {
        if frames.is_some_and(|limit| frame >= limit) {
            break;
        }
        if let Some(controller) = &controller {
            controller.poll();
            if controller.quit_requested() {
                println!("{}", "debugger quit".yellow());
                break;
            }
        }
        cart.update(dt)?;
        cart.draw(1.0)?;
        frame += 1;
        std::thread::sleep(Duration::from_secs_f64(dt));
    }

    println!("{} after {frame} frames", "finished".green().bold());
    Ok(())
}

fn check(cart_path: &std::path::Path) -> color_eyre::Result<()> {
    let mut cart = Cartridge::new()?;
    cart.load(cart_path)?;
    println!("{} {}", "ok".green().bold(), cart.title());
    if let Some(author) = &cart.manifest().author {
        println!("  author: {author}");
    }
    for source in cart.engine().sources() {
        println!("  {} ({} lines)", source.name, source.code.lines().count());
    }
    for entry in ["boot", "update", "draw"] {
        let defined: bool = cart
            .engine_mut()
            .eval(&format!("return type({entry}) == 'function'"))?;
        let marker = if defined { "+".green() } else { "-".dimmed() };
        println!("  {marker} {entry}");
    }
    Ok(())
}
