mod cli;

use clap::Parser;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use iv_prefetch::{Handle, Manager, Navigator, PrefetchError};

use crate::cli::{parse_script, Cli, Command};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let config = match cli.config() {
        Ok(c) => c,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let commands = match cli.script.as_deref().map(parse_script).transpose() {
        Ok(c) => c,
        Err(e) => {
            log::error!("Bad script: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let manager = match Manager::open(&cli.dir, config) {
        Ok(m) => m,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if manager.size() == 0 {
        log::error!("No image files found.");
        return ExitCode::FAILURE;
    }

    let start_time = Instant::now();
    let timeout = Duration::from_millis(cli.timeout);
    let mut nav = Navigator::new(&manager, cli.width, cli.height);

    let result = match commands {
        Some(commands) => run_script(&mut nav, cli.start, &commands, timeout),
        None => walk_all(&mut nav, cli.start, timeout),
    };

    match result {
        Ok(shown) => {
            log::info!(
                "Showed {} images in {:.2}s ({} left in listing)",
                shown,
                start_time.elapsed().as_secs_f64(),
                manager.size()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn walk_all(nav: &mut Navigator, start: usize, timeout: Duration) -> Result<usize, PrefetchError> {
    let mut shown = 0;
    let mut handle = Some(nav.go_to(start)?);
    while let Some(h) = handle {
        if display(&h, timeout) {
            shown += 1;
        }
        handle = nav.next()?;
    }
    Ok(shown)
}

fn run_script(
    nav: &mut Navigator,
    start: usize,
    commands: &[Command],
    timeout: Duration,
) -> Result<usize, PrefetchError> {
    let mut shown = 0;
    if display(&nav.go_to(start)?, timeout) {
        shown += 1;
    }

    for cmd in commands {
        let handle = match *cmd {
            Command::Next => nav.next()?,
            Command::Prev => nav.prev()?,
            Command::Reload => Some(nav.show()?),
            Command::Delete => nav.delete_current()?,
            Command::Resize(w, h) => Some(nav.resize(w, h)?),
            Command::GoTo(pos) => Some(nav.go_to(pos)?),
        };

        match handle {
            Some(h) => {
                if display(&h, timeout) {
                    shown += 1;
                }
            }
            None => log::info!("[{:?}] nothing to show at {}", cmd, nav.current()),
        }
    }
    Ok(shown)
}

/// Waits for `handle` the way the viewer would before painting it.
fn display(handle: &Handle, timeout: Duration) -> bool {
    let start = Instant::now();
    log::debug!("{} loading...", handle.file_name);

    match handle.wait_timeout(timeout) {
        Some(Ok(res)) => {
            log::info!(
                "[{}] {} {}x{} (source {}x{}, {}, {} bytes) after {}ms",
                res.position,
                res.file_name,
                res.image.width,
                res.image.height,
                res.image.source_width,
                res.image.source_height,
                res.image.format_name,
                res.image.file_size,
                start.elapsed().as_millis()
            );
            true
        }
        Some(Err(e)) if e.is_canceled() => {
            log::debug!("[{}] {} canceled", handle.position, handle.file_name);
            false
        }
        Some(Err(e)) => {
            log::warn!("[{}] Could not load {}: {}", handle.position, handle.file_name, e);
            false
        }
        None => {
            log::warn!(
                "[{}] {} still loading after {}ms",
                handle.position,
                handle.file_name,
                timeout.as_millis()
            );
            false
        }
    }
}
