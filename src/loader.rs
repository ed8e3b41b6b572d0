use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::fs;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::cache::Job;
use crate::manager::Shared;

// ---------------------------------------------------------------------------
// Decoded image data (CPU side, fitted to the requested frame)
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct DecodedImage {
    pub rgba_bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Dimensions of the file before resizing.
    pub source_width: u32,
    pub source_height: u32,
    pub file_size: u64,
    pub format_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Largest size with the source's aspect ratio that fits inside `frame`.
pub fn fit_into_frame(source: FrameSize, frame: FrameSize) -> FrameSize {
    let sratio = source.width as f64 / source.height.max(1) as f64;
    let tratio = frame.width as f64 / frame.height.max(1) as f64;

    let (w, h) = if sratio > tratio {
        (frame.width, (frame.width as f64 / sratio) as u32)
    } else {
        ((frame.height as f64 * sratio) as u32, frame.height)
    };

    FrameSize::new(w.max(1), h.max(1))
}

// ---------------------------------------------------------------------------
// Pixel decode / resize capability
// ---------------------------------------------------------------------------

pub trait ImageCodec: Send + Sync {
    fn decode(&self, path: &Path) -> image::ImageResult<DynamicImage>;

    fn resize(&self, img: &DynamicImage, width: u32, height: u32) -> DynamicImage;
}

/// Codec backed by the `image` crate.
pub struct ImageCrateCodec {
    filter: FilterType,
}

impl ImageCrateCodec {
    pub fn new(filter: FilterType) -> Self {
        Self { filter }
    }
}

impl Default for ImageCrateCodec {
    fn default() -> Self {
        Self::new(FilterType::Triangle)
    }
}

impl ImageCodec for ImageCrateCodec {
    fn decode(&self, path: &Path) -> image::ImageResult<DynamicImage> {
        image::ImageReader::open(path)?.with_guessed_format()?.decode()
    }

    fn resize(&self, img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        if img.dimensions() == (width, height) {
            return img.clone();
        }
        img.resize_exact(width, height, self.filter)
    }
}

fn load_fitted(codec: &dyn ImageCodec, job: &Job) -> Result<DecodedImage, String> {
    let file_size = fs::metadata(&job.path).map(|m| m.len()).unwrap_or(0);

    let start = Instant::now();
    let img = codec
        .decode(&job.path)
        .map_err(|e| format!("{}: {}", job.path.display(), e))?;
    log::debug!(
        "loading done {} ({}) in {}ms",
        job.position,
        job.file_name,
        start.elapsed().as_millis()
    );

    let (source_width, source_height) = img.dimensions();
    if source_width == 0 || source_height == 0 {
        return Err(format!("{}: empty image", job.path.display()));
    }

    let start = Instant::now();
    let fitted = fit_into_frame(FrameSize::new(source_width, source_height), job.frame);
    let scaled = codec.resize(&img, fitted.width, fitted.height);
    log::debug!(
        "scaling done {} ({}) to {}x{} in {}ms",
        job.position,
        job.file_name,
        fitted.width,
        fitted.height,
        start.elapsed().as_millis()
    );

    let format_name = job
        .path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("unknown")
        .to_uppercase();
    let (width, height) = scaled.dimensions();

    Ok(DecodedImage {
        rgba_bytes: scaled.to_rgba8().into_raw(),
        width,
        height,
        source_width,
        source_height,
        file_size,
        format_name,
    })
}

// ---------------------------------------------------------------------------
// Background decode workers
// ---------------------------------------------------------------------------

pub(crate) fn spawn_decode_workers(shared: &Arc<Shared>, num_threads: usize) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::with_capacity(num_threads);
    for id in 0..num_threads {
        let shared = Arc::clone(shared);
        let spawned = thread::Builder::new()
            .name(format!("iv-decode-{}", id))
            .spawn(move || run_worker(id, shared));
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(e) => log::error!("Failed to spawn decode worker {}: {}", id, e),
        }
    }
    handles
}

fn run_worker(id: usize, shared: Arc<Shared>) {
    log::debug!("decode worker {} started", id);

    while let Some(idx) = shared.queue.take() {
        let job = {
            let mut cache = shared.cache.lock().unwrap();

            if !cache.contains(idx) {
                log::debug!("worker {}: no entry for {}, skipping", id, idx);
                continue;
            }

            let last = shared.last_requested.load(Ordering::Acquire);
            if idx.abs_diff(last) > shared.config.stale_distance {
                log::debug!(
                    "worker {}: request {} is too old, last requested is {}",
                    id,
                    idx,
                    last
                );
                cache.evict(idx);
                continue;
            }

            match cache.claim(idx) {
                Some(job) => job,
                None => {
                    log::debug!("worker {}: {} is already being handled", id, idx);
                    continue;
                }
            }
        };

        let start = Instant::now();
        log::debug!("worker {}: loading start {} ({})", id, idx, job.file_name);
        let result = load_fitted(shared.codec.as_ref(), &job);

        let mut cache = shared.cache.lock().unwrap();
        match result {
            Ok(decoded) => {
                log::info!(
                    "Decoded {} ({}) {}x{} in {}ms",
                    idx,
                    job.file_name,
                    decoded.width,
                    decoded.height,
                    start.elapsed().as_millis()
                );
                cache.complete(&job, Arc::new(decoded));
            }
            Err(e) => {
                log::warn!("Could not load {}: {}", idx, e);
                cache.fail(&job, e);
            }
        }
    }

    log::debug!("decode worker {} stopped", id);
}
