use std::sync::atomic::Ordering;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::manager::Shared;

/// Periodic sweep that drops cache entries far from the last request.
pub(crate) struct Reaper {
    stop: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl Reaper {
    pub fn spawn(shared: &Arc<Shared>) -> Self {
        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let interval = shared.config.reap_interval;

        let handle = {
            let shared = Arc::clone(shared);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("iv-reaper".into())
                .spawn(move || run(shared, stop, interval))
        };
        let handle = match handle {
            Ok(h) => Some(h),
            Err(e) => {
                log::error!("Failed to spawn reaper: {}", e);
                None
            }
        };

        Self { stop, handle }
    }

    pub fn stop(&mut self) {
        {
            let (lock, cvar) = &*self.stop;
            *lock.lock().unwrap() = true;
            cvar.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run(shared: Arc<Shared>, stop: Arc<(Mutex<bool>, Condvar)>, interval: Duration) {
    let (lock, cvar) = &*stop;
    let mut stopped = lock.lock().unwrap();
    while !*stopped {
        stopped = cvar.wait_timeout(stopped, interval).unwrap().0;
        if *stopped {
            break;
        }
        reap(&shared);
    }
}

/// One sweep. Returns the number of evicted entries.
pub(crate) fn reap(shared: &Shared) -> usize {
    let mut cache = shared.cache.lock().unwrap();
    let last = shared.last_requested.load(Ordering::Acquire);
    let tolerance = shared.config.reap_distance;

    let evicted = cache.evict_where(|idx| idx.abs_diff(last) > tolerance);
    if evicted > 0 {
        log::debug!(
            "reaped {} entries around {}, {} remain",
            evicted,
            last,
            cache.len()
        );
    }
    evicted
}
