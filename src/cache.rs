use std::cell::OnceCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use crate::error::LoadError;
use crate::files::DirectoryIndex;
use crate::loader::{DecodedImage, FrameSize};

// ---------------------------------------------------------------------------
// Results and caller handles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ImageResult {
    pub position: usize,
    pub file_name: String,
    pub image: Arc<DecodedImage>,
}

pub type LoadResult = Result<ImageResult, LoadError>;

/// Caller side of a request. Resolves once, on whichever thread finishes
/// the decode; a dropped sender reads as [`LoadError::Canceled`].
#[derive(Debug)]
pub struct Handle {
    pub position: usize,
    pub file_name: String,
    generation: u64,
    rx: Receiver<LoadResult>,
    result: OnceCell<LoadResult>,
}

impl Handle {
    fn new(position: usize, file_name: String, generation: u64, rx: Receiver<LoadResult>) -> Self {
        Self {
            position,
            file_name,
            generation,
            rx,
            result: OnceCell::new(),
        }
    }

    fn resolved(position: usize, file_name: String, result: LoadResult) -> Self {
        let (_, rx) = mpsc::channel();
        let handle = Self::new(position, file_name, 0, rx);
        let _ = handle.result.set(result);
        handle
    }

    pub(crate) fn canceled(position: usize, file_name: String) -> Self {
        Self::resolved(position, file_name, Err(LoadError::Canceled))
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Blocks until the request resolves.
    pub fn wait(&self) -> LoadResult {
        self.result
            .get_or_init(|| self.rx.recv().unwrap_or(Err(LoadError::Canceled)))
            .clone()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<LoadResult> {
        if let Some(r) = self.result.get() {
            return Some(r.clone());
        }
        let r = match self.rx.recv_timeout(timeout) {
            Ok(r) => r,
            Err(RecvTimeoutError::Timeout) => return None,
            Err(RecvTimeoutError::Disconnected) => Err(LoadError::Canceled),
        };
        Some(self.result.get_or_init(|| r).clone())
    }

    /// Non-blocking poll.
    pub fn try_result(&self) -> Option<LoadResult> {
        if let Some(r) = self.result.get() {
            return Some(r.clone());
        }
        let r = match self.rx.try_recv() {
            Ok(r) => r,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(LoadError::Canceled),
        };
        Some(self.result.get_or_init(|| r).clone())
    }
}

// ---------------------------------------------------------------------------
// Cache entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntryStatus {
    Pending,
    InProgress,
    Ready,
}

struct Waiter {
    generation: u64,
    tx: Sender<LoadResult>,
}

struct CacheEntry {
    id: u64,
    file_name: String,
    frame: FrameSize,
    status: EntryStatus,
    image: Option<Arc<DecodedImage>>,
    /// Dropping the waiter cancels the handle holding its receiver.
    waiter: Option<Waiter>,
}

/// Work claimed by a decode worker.
#[derive(Debug, Clone)]
pub struct Job {
    pub position: usize,
    pub entry_id: u64,
    pub path: PathBuf,
    pub file_name: String,
    pub frame: FrameSize,
}

// ---------------------------------------------------------------------------
// Cache state (shared between callers, workers and the reaper via one Mutex)
// ---------------------------------------------------------------------------

pub struct CacheState {
    dir: DirectoryIndex,
    entries: HashMap<usize, CacheEntry>,
    next_ticket: u64,
}

impl CacheState {
    pub fn new(dir: DirectoryIndex) -> Self {
        Self {
            dir,
            entries: HashMap::new(),
            next_ticket: 1,
        }
    }

    fn ticket(&mut self) -> u64 {
        let t = self.next_ticket;
        self.next_ticket += 1;
        t
    }

    pub fn dir(&self) -> &DirectoryIndex {
        &self.dir
    }

    pub fn dir_mut(&mut self) -> &mut DirectoryIndex {
        &mut self.dir
    }

    pub fn contains(&self, idx: usize) -> bool {
        self.entries.contains_key(&idx)
    }

    pub fn status(&self, idx: usize) -> Option<EntryStatus> {
        self.entries.get(&idx).map(|e| e.status)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn positions(&self) -> Vec<usize> {
        let mut keys: Vec<usize> = self.entries.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Ensures a matching entry exists for `idx`. Returns true when a fresh
    /// `Pending` entry had to be created.
    pub fn schedule(&mut self, idx: usize, frame: FrameSize) -> bool {
        let Some(file) = self.dir.file_at(idx) else {
            return false;
        };
        let name = file.file_name.clone();

        if let Some(existing) = self.entries.get(&idx) {
            if existing.file_name == name && existing.frame == frame {
                return false;
            }
            log::info!(
                "wrong filename or frame size at idx {} | {} {}x{}",
                idx,
                existing.file_name,
                existing.frame.width,
                existing.frame.height
            );
        }

        let id = self.ticket();
        self.entries.insert(
            idx,
            CacheEntry {
                id,
                file_name: name,
                frame,
                status: EntryStatus::Pending,
                image: None,
                waiter: None,
            },
        );
        true
    }

    /// Returns a handle for `idx`, replacing (and thereby canceling) any
    /// earlier waiter on the same entry.
    pub fn attach(&mut self, idx: usize) -> Handle {
        let generation = self.ticket();
        let Some(entry) = self.entries.get_mut(&idx) else {
            let name = self
                .dir
                .file_at(idx)
                .map(|f| f.file_name.clone())
                .unwrap_or_default();
            return Handle::canceled(idx, name);
        };

        if entry.status == EntryStatus::Ready {
            if let Some(image) = &entry.image {
                let result = ImageResult {
                    position: idx,
                    file_name: entry.file_name.clone(),
                    image: Arc::clone(image),
                };
                return Handle::resolved(idx, entry.file_name.clone(), Ok(result));
            }
        }

        let (tx, rx) = mpsc::channel();
        if entry.waiter.replace(Waiter { generation, tx }).is_some() {
            log::debug!("superseded waiter at idx {}", idx);
        }
        Handle::new(idx, entry.file_name.clone(), generation, rx)
    }

    /// `Pending -> InProgress`. `None` if there is nothing to do for `idx`.
    pub fn claim(&mut self, idx: usize) -> Option<Job> {
        let entry = self.entries.get_mut(&idx)?;
        if entry.status != EntryStatus::Pending {
            return None;
        }
        let path = self.dir.file_at(idx)?.path.clone();
        entry.status = EntryStatus::InProgress;

        Some(Job {
            position: idx,
            entry_id: entry.id,
            path,
            file_name: entry.file_name.clone(),
            frame: entry.frame,
        })
    }

    fn claimed_entry(&mut self, job: &Job) -> Option<&mut CacheEntry> {
        self.entries
            .get_mut(&job.position)
            .filter(|e| e.id == job.entry_id && e.status == EntryStatus::InProgress)
    }

    /// Publishes a finished decode. Returns false if the entry was evicted or
    /// replaced while the job ran.
    pub fn complete(&mut self, job: &Job, image: Arc<DecodedImage>) -> bool {
        let Some(entry) = self.claimed_entry(job) else {
            log::debug!("dropping result for {}, entry is gone", job.position);
            return false;
        };

        entry.status = EntryStatus::Ready;
        entry.image = Some(Arc::clone(&image));
        if let Some(waiter) = entry.waiter.take() {
            let result = ImageResult {
                position: job.position,
                file_name: entry.file_name.clone(),
                image,
            };
            // Receiver may already be gone.
            let _ = waiter.tx.send(Ok(result));
        }
        true
    }

    /// Resolves the waiter with a decode failure and drops the entry so a
    /// later request retries it.
    pub fn fail(&mut self, job: &Job, reason: String) -> bool {
        let Some(entry) = self.claimed_entry(job) else {
            return false;
        };
        if let Some(waiter) = entry.waiter.take() {
            let _ = waiter.tx.send(Err(LoadError::Decode(reason)));
        }
        self.entries.remove(&job.position);
        true
    }

    pub fn evict(&mut self, idx: usize) -> bool {
        self.entries.remove(&idx).is_some()
    }

    pub fn evict_where<F>(&mut self, mut pred: F) -> usize
    where
        F: FnMut(usize) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|&idx, _| !pred(idx));
        before - self.entries.len()
    }

    /// Cancels the waiter on `idx` only if it is still the one handed out
    /// with `generation`.
    pub fn cancel_waiter(&mut self, idx: usize, generation: u64) -> bool {
        let Some(entry) = self.entries.get_mut(&idx) else {
            return false;
        };
        match &entry.waiter {
            Some(w) if w.generation == generation => {
                entry.waiter = None;
                true
            }
            _ => false,
        }
    }
}
