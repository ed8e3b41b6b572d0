use std::time::Duration;

use image::imageops::FilterType;

/// Tuning knobs for the prefetch manager.
#[derive(Debug, Clone)]
pub struct PrefetchConfig {
    /// Number of decode worker threads.
    pub threads: usize,
    /// Maximum number of positions waiting in the work queue.
    pub queue_capacity: usize,
    /// Positions on each side of a request that get prefetched.
    pub window_radius: usize,
    /// Dequeued work farther than this from the last request is dropped.
    pub stale_distance: usize,
    /// Cached entries farther than this from the last request are reaped.
    pub reap_distance: usize,
    pub reap_interval: Duration,
    pub filter: FilterType,
    pub follow_links: bool,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .clamp(2, 8);

        Self {
            threads,
            queue_capacity: 10,
            window_radius: 5,
            stale_distance: 10,
            reap_distance: 15,
            reap_interval: Duration::from_millis(50),
            filter: FilterType::Triangle,
            follow_links: false,
        }
    }
}

impl PrefetchConfig {
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_window_radius(mut self, radius: usize) -> Self {
        self.window_radius = radius;
        self
    }

    pub fn with_stale_distance(mut self, distance: usize) -> Self {
        self.stale_distance = distance;
        self
    }

    pub fn with_reap_distance(mut self, distance: usize) -> Self {
        self.reap_distance = distance;
        self
    }

    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }

    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    /// Neighbours scheduled by a request must survive both the stale check
    /// and the reaper, or they get dropped and rescheduled on every request.
    pub fn check_distances(&self) -> Result<(), String> {
        if self.window_radius > self.stale_distance {
            return Err(format!(
                "window radius {} exceeds stale distance {}",
                self.window_radius, self.stale_distance
            ));
        }
        if self.window_radius > self.reap_distance {
            return Err(format!(
                "window radius {} exceeds reap distance {}",
                self.window_radius, self.reap_distance
            ));
        }
        Ok(())
    }
}

pub fn parse_filter(s: &str) -> Option<FilterType> {
    match s.trim().to_lowercase().as_str() {
        "nearest" => Some(FilterType::Nearest),
        "triangle" | "bilinear" => Some(FilterType::Triangle),
        "catmull-rom" | "catmullrom" | "bicubic" => Some(FilterType::CatmullRom),
        "gaussian" => Some(FilterType::Gaussian),
        "lanczos3" | "lanczos" => Some(FilterType::Lanczos3),
        _ => None,
    }
}
