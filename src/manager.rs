use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::cache::{CacheState, EntryStatus, Handle};
use crate::config::PrefetchConfig;
use crate::error::PrefetchError;
use crate::files::DirectoryIndex;
use crate::loader::{spawn_decode_workers, FrameSize, ImageCodec, ImageCrateCodec};
use crate::queue::WorkQueue;
use crate::reaper::Reaper;

// ---------------------------------------------------------------------------
// State shared by the caller, the decode workers and the reaper
// ---------------------------------------------------------------------------

pub(crate) struct Shared {
    /// Guards the cache map together with the directory listing.
    pub cache: Mutex<CacheState>,
    pub queue: WorkQueue,
    pub last_requested: AtomicUsize,
    pub config: PrefetchConfig,
    pub codec: Arc<dyn ImageCodec>,
}

impl Shared {
    pub fn new(dir: DirectoryIndex, config: PrefetchConfig, codec: Arc<dyn ImageCodec>) -> Self {
        if let Err(e) = config.check_distances() {
            log::warn!("{}; prefetched neighbours will be dropped and rescheduled", e);
        }
        Self {
            cache: Mutex::new(CacheState::new(dir)),
            queue: WorkQueue::new(config.queue_capacity),
            last_requested: AtomicUsize::new(0),
            config,
            codec,
        }
    }

    /// Schedules the window around `idx` and returns the caller's handle.
    pub fn request(&self, idx: usize, width: u32, height: u32) -> Result<Handle, PrefetchError> {
        if width == 0 || height == 0 {
            return Err(PrefetchError::InvalidFrame { width, height });
        }
        let frame = FrameSize::new(width, height);

        let (handle, mut scheduled) = {
            let mut cache = self.cache.lock().unwrap();
            let size = cache.dir().size();
            if idx >= size {
                return Err(PrefetchError::PreconditionViolation {
                    position: idx,
                    size,
                });
            }
            if self.queue.is_closed() {
                // Nothing would ever drain or reap new entries.
                let name = cache.dir().file_at(idx).map(|f| f.file_name.clone());
                return Ok(Handle::canceled(idx, name.unwrap_or_default()));
            }
            self.last_requested.store(idx, Ordering::Release);

            let radius = self.config.window_radius;
            let lo = idx.saturating_sub(radius);
            let hi = idx.saturating_add(radius).min(size - 1);
            let scheduled: Vec<usize> = (lo..=hi).filter(|&i| cache.schedule(i, frame)).collect();

            (cache.attach(idx), scheduled)
        };

        if let Some(pos) = scheduled.iter().position(|&i| i == idx) {
            scheduled.remove(pos);
            if self.queue.put_front(idx).is_err() {
                log::debug!("queue closed, canceling request for {}", idx);
                let mut cache = self.cache.lock().unwrap();
                cache.evict(idx);
                for i in scheduled {
                    cache.evict(i);
                }
                return Ok(handle);
            }
        }

        for i in scheduled {
            // Prefetch is best-effort.
            if self.queue.put_back(i).is_err() {
                break;
            }
        }

        Ok(handle)
    }

    pub fn cancel(&self, position: usize, generation: u64) -> bool {
        self.cache.lock().unwrap().cancel_waiter(position, generation)
    }

    pub fn delete(&self, idx: usize) -> Result<(), PrefetchError> {
        let mut cache = self.cache.lock().unwrap();
        let size = cache.dir().size();
        if idx >= size {
            return Err(PrefetchError::PreconditionViolation {
                position: idx,
                size,
            });
        }

        // Both steps happen under the cache lock, so no worker can complete
        // an entry between the file disappearing and the keys being dropped.
        cache.dir_mut().delete(idx)?;
        let evicted = cache.evict_where(|k| k >= idx);
        log::debug!("delete {}: invalidated {} cache entries", idx, evicted);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Public facade
// ---------------------------------------------------------------------------

/// Prefetching image cache over one directory.
///
/// Owns the decode workers and the reaper; both stop on [`Manager::shutdown`]
/// or when the manager is dropped.
pub struct Manager {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    reaper: Option<Reaper>,
}

impl Manager {
    pub fn open(dir: impl AsRef<Path>, config: PrefetchConfig) -> Result<Self, PrefetchError> {
        let index = DirectoryIndex::open(dir.as_ref(), config.follow_links)?;
        let codec = Arc::new(ImageCrateCodec::new(config.filter));
        Ok(Self::with_codec(index, config, codec))
    }

    pub fn with_codec(
        index: DirectoryIndex,
        config: PrefetchConfig,
        codec: Arc<dyn ImageCodec>,
    ) -> Self {
        let threads = config.threads;
        let shared = Arc::new(Shared::new(index, config, codec));
        let workers = spawn_decode_workers(&shared, threads);
        let reaper = Reaper::spawn(&shared);
        log::info!("Prefetch manager started with {} decode workers", workers.len());

        Self {
            shared,
            workers,
            reaper: Some(reaper),
        }
    }

    /// Requests the image at `position` fitted into a `width`x`height` frame.
    pub fn request(&self, position: usize, width: u32, height: u32) -> Result<Handle, PrefetchError> {
        self.shared.request(position, width, height)
    }

    /// Cancels `handle` unless a newer request has already replaced it.
    pub fn cancel(&self, handle: &Handle) -> bool {
        self.shared.cancel(handle.position, handle.generation())
    }

    /// Like [`Manager::cancel`] for a handle the caller no longer holds.
    pub fn cancel_generation(&self, position: usize, generation: u64) -> bool {
        self.shared.cancel(position, generation)
    }

    pub fn delete(&self, position: usize) -> Result<(), PrefetchError> {
        self.shared.delete(position)
    }

    pub fn size(&self) -> usize {
        self.shared.cache.lock().unwrap().dir().size()
    }

    pub fn file_name(&self, position: usize) -> Option<String> {
        self.shared
            .cache
            .lock()
            .unwrap()
            .dir()
            .file_at(position)
            .map(|f| f.file_name.clone())
    }

    pub fn last_requested(&self) -> usize {
        self.shared.last_requested.load(Ordering::Acquire)
    }

    pub fn cached_positions(&self) -> Vec<usize> {
        self.shared.cache.lock().unwrap().positions()
    }

    pub fn status(&self, position: usize) -> Option<EntryStatus> {
        self.shared.cache.lock().unwrap().status(position)
    }

    pub fn shutdown(&mut self) {
        if self.shared.queue.is_closed() && self.workers.is_empty() {
            return;
        }
        log::debug!("shutting down prefetch manager");

        self.shared.queue.close();
        if let Some(mut reaper) = self.reaper.take() {
            reaper.stop();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        // Drop everything so pending handles observe cancellation.
        self.shared.cache.lock().unwrap().evict_where(|_| true);
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
