use clap::Parser;
use std::time::Duration;

use iv_prefetch::config::parse_filter;
use iv_prefetch::PrefetchConfig;

pub const HELP_SCRIPT: &str = "\
Navigation script (--script), tokens separated by spaces or commas:
  n             : Next image
  p             : Previous image
  r             : Reload current image
  d             : Delete current file from disk
  s<W>x<H>      : Resize frame, e.g. s1920x1080
  g<N>          : Go to position N
";

#[derive(Parser)]
#[command(name = "iv", about = "Headless prefetching image walker", after_help = HELP_SCRIPT)]
pub struct Cli {
    /// Directory to walk
    pub dir: std::path::PathBuf,

    /// Frame width the images are fitted into
    #[arg(long, default_value = "1280")]
    pub width: u32,

    /// Frame height the images are fitted into
    #[arg(long, default_value = "720")]
    pub height: u32,

    /// Decode worker threads (default: CPU count, 2..=8)
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Work queue capacity
    #[arg(long, default_value = "10")]
    pub queue: usize,

    /// Images prefetched on each side of the current one
    #[arg(long, default_value = "5")]
    pub radius: usize,

    /// Queued work farther than this from the current image is dropped
    #[arg(long, default_value = "10")]
    pub stale: usize,

    /// Cached images farther than this from the current image are evicted
    #[arg(long, default_value = "15")]
    pub reap: usize,

    /// Reaper period in milliseconds
    #[arg(long, default_value = "50")]
    pub reap_interval: u64,

    /// Resize filter: nearest, triangle, catmull-rom, gaussian, lanczos3
    #[arg(long, default_value = "triangle")]
    pub filter: String,

    /// Follow symbolic links (default: false)
    #[arg(long)]
    pub follow_links: bool,

    /// Start position
    #[arg(long, default_value = "0")]
    pub start: usize,

    /// Navigation script; without it every image is visited once
    #[arg(short, long)]
    pub script: Option<String>,

    /// Per-image wait limit in milliseconds
    #[arg(long, default_value = "30000")]
    pub timeout: u64,
}

impl Cli {
    pub fn config(&self) -> Result<PrefetchConfig, String> {
        let filter = parse_filter(&self.filter)
            .ok_or_else(|| format!("unknown resize filter '{}'", self.filter))?;

        let mut config = PrefetchConfig::default()
            .with_queue_capacity(self.queue)
            .with_window_radius(self.radius)
            .with_stale_distance(self.stale)
            .with_reap_distance(self.reap)
            .with_reap_interval(Duration::from_millis(self.reap_interval.max(1)))
            .with_filter(filter)
            .with_follow_links(self.follow_links);
        if let Some(t) = self.threads {
            config = config.with_threads(t);
        }
        config.check_distances()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Next,
    Prev,
    Reload,
    Delete,
    Resize(u32, u32),
    GoTo(usize),
}

pub fn parse_script(s: &str) -> Result<Vec<Command>, String> {
    s.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(parse_command)
        .collect()
}

fn parse_command(token: &str) -> Result<Command, String> {
    match token {
        "n" => return Ok(Command::Next),
        "p" => return Ok(Command::Prev),
        "r" => return Ok(Command::Reload),
        "d" => return Ok(Command::Delete),
        _ => {}
    }

    if let Some(dims) = token.strip_prefix('s') {
        let (w, h) = dims
            .split_once('x')
            .ok_or_else(|| format!("bad resize '{}', expected s<W>x<H>", token))?;
        let w = w.parse::<u32>().map_err(|e| format!("{}: {}", token, e))?;
        let h = h.parse::<u32>().map_err(|e| format!("{}: {}", token, e))?;
        return Ok(Command::Resize(w, h));
    }

    if let Some(pos) = token.strip_prefix('g') {
        let pos = pos.parse::<usize>().map_err(|e| format!("{}: {}", token, e))?;
        return Ok(Command::GoTo(pos));
    }

    Err(format!("unknown command '{}'", token))
}
