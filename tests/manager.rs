use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use image::{DynamicImage, ImageError};
use iv_prefetch::{
    DirectoryIndex, EntryStatus, ImageCodec, LoadError, Manager, PrefetchConfig, PrefetchError,
};

const WAIT: Duration = Duration::from_secs(10);

/// Decodes every file as a blank raster of a fixed size and counts calls.
/// Files whose name contains "corrupt" fail; an optional gate holds decodes
/// until the test releases it.
struct CountingCodec {
    width: u32,
    height: u32,
    calls: Mutex<HashMap<PathBuf, usize>>,
    gate: Option<Arc<(Mutex<bool>, Condvar)>>,
}

impl CountingCodec {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            calls: Mutex::new(HashMap::new()),
            gate: None,
        }
    }

    fn gated(width: u32, height: u32) -> (Self, Arc<(Mutex<bool>, Condvar)>) {
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        let mut codec = Self::new(width, height);
        codec.gate = Some(Arc::clone(&gate));
        (codec, gate)
    }

    fn calls_for(&self, name: &str) -> usize {
        let calls = self.calls.lock().unwrap();
        calls
            .iter()
            .filter(|(p, _)| p.file_name().is_some_and(|n| n == name))
            .map(|(_, c)| *c)
            .sum()
    }
}

impl ImageCodec for CountingCodec {
    fn decode(&self, path: &Path) -> image::ImageResult<DynamicImage> {
        *self.calls.lock().unwrap().entry(path.to_path_buf()).or_insert(0) += 1;

        if let Some(gate) = &self.gate {
            let (lock, cvar) = &**gate;
            let mut open = lock.lock().unwrap();
            while !*open {
                open = cvar.wait(open).unwrap();
            }
        }

        if path.to_string_lossy().contains("corrupt") {
            return Err(ImageError::IoError(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "bad header",
            )));
        }
        Ok(DynamicImage::new_rgba8(self.width, self.height))
    }

    fn resize(&self, img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        img.resize_exact(width, height, image::imageops::FilterType::Nearest)
    }
}

fn open_gate(gate: &Arc<(Mutex<bool>, Condvar)>) {
    let (lock, cvar) = &**gate;
    *lock.lock().unwrap() = true;
    cvar.notify_all();
}

fn make_dir(names: &[String]) -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    for name in names {
        File::create(tmp.path().join(name)).unwrap();
    }
    tmp
}

fn numbered(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("img{:04}.jpg", i)).collect()
}

fn start(tmp: &tempfile::TempDir, config: PrefetchConfig, codec: Arc<CountingCodec>) -> Manager {
    let index = DirectoryIndex::open(tmp.path(), false).unwrap();
    Manager::with_codec(index, config, codec)
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

#[test]
fn every_position_resolves_to_its_file() {
    let names = numbered(25);
    let tmp = make_dir(&names);
    let codec = Arc::new(CountingCodec::new(64, 48));
    let m = start(&tmp, PrefetchConfig::default().with_threads(3), codec);

    for (i, name) in names.iter().enumerate() {
        let handle = m.request(i, 32, 32).unwrap();
        assert_eq!(&handle.file_name, name);
        let res = handle.wait_timeout(WAIT).unwrap().unwrap();
        assert_eq!(res.position, i);
        assert_eq!(&res.file_name, name);
        assert_eq!((res.image.width, res.image.height), (32, 24));
    }
}

#[test]
fn cached_image_is_decoded_once() {
    let names: Vec<String> = ["a.jpg", "b.jpg", "c.jpg", "d.jpg"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let tmp = make_dir(&names);
    let codec = Arc::new(CountingCodec::new(200, 200));
    let m = start(&tmp, PrefetchConfig::default().with_threads(2), Arc::clone(&codec));

    let first = m.request(0, 100, 100).unwrap();
    assert_eq!(first.wait_timeout(WAIT).unwrap().unwrap().file_name, "a.jpg");

    let second = m.request(1, 100, 100).unwrap();
    assert_eq!(second.wait_timeout(WAIT).unwrap().unwrap().file_name, "b.jpg");

    let again = m.request(0, 100, 100).unwrap();
    let res = again.try_result().expect("served from cache").unwrap();
    assert_eq!(res.file_name, "a.jpg");
    assert_eq!(codec.calls_for("a.jpg"), 1);
    assert_eq!(m.size(), 4);
}

#[test]
fn rerequest_cancels_only_the_older_handle() {
    let tmp = make_dir(&numbered(3));
    let (codec, gate) = CountingCodec::gated(10, 10);
    let m = start(&tmp, PrefetchConfig::default().with_threads(1), Arc::new(codec));

    let older = m.request(1, 10, 10).unwrap();
    let newer = m.request(1, 10, 10).unwrap();

    assert!(matches!(older.try_result(), Some(Err(LoadError::Canceled))));
    assert!(newer.try_result().is_none());

    open_gate(&gate);
    let res = newer.wait_timeout(WAIT).unwrap().unwrap();
    assert_eq!(res.position, 1);
    // Still canceled, never fulfilled later.
    assert!(matches!(older.wait(), Err(LoadError::Canceled)));
}

#[test]
fn cancel_resolves_a_live_handle_once() {
    let tmp = make_dir(&numbered(3));
    let (codec, gate) = CountingCodec::gated(10, 10);
    let m = start(&tmp, PrefetchConfig::default().with_threads(1), Arc::new(codec));

    let handle = m.request(2, 10, 10).unwrap();
    assert!(handle.try_result().is_none());

    assert!(m.cancel(&handle));
    assert!(matches!(handle.try_result(), Some(Err(LoadError::Canceled))));
    assert!(!m.cancel(&handle));

    // The decode still lands in the cache for the next caller.
    open_gate(&gate);
    assert!(wait_until(|| m.status(2) == Some(EntryStatus::Ready)));
    let again = m.request(2, 10, 10).unwrap();
    assert_eq!(again.try_result().unwrap().unwrap().position, 2);
}

#[test]
fn stale_work_is_dropped_at_dequeue() {
    let tmp = make_dir(&numbered(60));
    let (codec, gate) = CountingCodec::gated(10, 10);
    let codec = Arc::new(codec);
    // Reaper effectively off: only the dequeue check can drop entries.
    let config = PrefetchConfig::default()
        .with_threads(1)
        .with_queue_capacity(64)
        .with_reap_distance(1000);
    let m = start(&tmp, config, Arc::clone(&codec));

    let h0 = m.request(0, 10, 10).unwrap();
    assert!(wait_until(|| codec.calls_for("img0000.jpg") == 1));
    let h3 = m.request(3, 10, 10).unwrap();
    let _h50 = m.request(50, 10, 10).unwrap();
    open_gate(&gate);

    let mut expected = vec![0];
    expected.extend(45..=55);
    assert!(wait_until(|| m.cached_positions() == expected));
    assert!((1..=8).all(|p| m.status(p).is_none()));
    assert!((1..=8).all(|p| codec.calls_for(&format!("img{:04}.jpg", p)) == 0));

    assert!(matches!(h3.wait_timeout(WAIT), Some(Err(LoadError::Canceled))));
    assert_eq!(h0.wait_timeout(WAIT).unwrap().unwrap().position, 0);
}

#[test]
fn delete_drops_downstream_entries() {
    let names = numbered(12);
    let tmp = make_dir(&names);
    let codec = Arc::new(CountingCodec::new(10, 10));
    let m = start(&tmp, PrefetchConfig::default().with_threads(2), codec);

    m.request(5, 10, 10).unwrap().wait_timeout(WAIT).unwrap().unwrap();
    assert!(wait_until(|| (0..=10).all(|p| m.status(p) == Some(EntryStatus::Ready))));

    m.delete(6).unwrap();

    assert_eq!(m.size(), 11);
    assert_eq!(m.file_name(6).as_deref(), Some(names[7].as_str()));
    let cached = m.cached_positions();
    assert_eq!(cached, (0..6).collect::<Vec<_>>());
    assert!(!tmp.path().join(&names[6]).exists());

    let res = m.request(6, 10, 10).unwrap().wait_timeout(WAIT).unwrap().unwrap();
    assert_eq!(res.file_name, names[7]);
}

#[test]
fn delete_out_of_range_is_rejected() {
    let tmp = make_dir(&numbered(2));
    let m = start(&tmp, PrefetchConfig::default(), Arc::new(CountingCodec::new(1, 1)));
    assert!(matches!(
        m.delete(2),
        Err(PrefetchError::PreconditionViolation { position: 2, size: 2 })
    ));
    assert!(matches!(
        m.request(9, 10, 10),
        Err(PrefetchError::PreconditionViolation { .. })
    ));
}

#[test]
fn reaper_keeps_only_the_neighbourhood() {
    let tmp = make_dir(&numbered(150));
    let codec = Arc::new(CountingCodec::new(4, 4));
    let config = PrefetchConfig::default()
        .with_threads(2)
        .with_reap_interval(Duration::from_millis(5));
    let m = start(&tmp, config, codec);

    m.request(0, 10, 10).unwrap().wait_timeout(WAIT).unwrap().unwrap();
    m.request(100, 10, 10).unwrap().wait_timeout(WAIT).unwrap().unwrap();

    assert!(wait_until(|| {
        m.cached_positions()
            .iter()
            .all(|p| (85..=115).contains(p))
    }));
    assert_eq!(m.last_requested(), 100);
}

#[test]
fn decode_failure_resolves_and_pool_keeps_going() {
    let names = vec!["a.jpg".to_string(), "b_corrupt.jpg".to_string(), "c.jpg".to_string()];
    let tmp = make_dir(&names);
    let m = start(
        &tmp,
        PrefetchConfig::default().with_threads(1),
        Arc::new(CountingCodec::new(8, 8)),
    );

    let bad = m.request(1, 8, 8).unwrap();
    match bad.wait_timeout(WAIT).unwrap() {
        Err(LoadError::Decode(msg)) => assert!(msg.contains("bad header")),
        other => panic!("expected decode failure, got {:?}", other),
    }
    assert_ne!(m.status(1), Some(EntryStatus::InProgress));

    let good = m.request(2, 8, 8).unwrap();
    assert_eq!(good.wait_timeout(WAIT).unwrap().unwrap().file_name, "c.jpg");
}

#[test]
fn fitted_raster_matches_frame() {
    let tmp = make_dir(&numbered(1));
    let m = start(
        &tmp,
        PrefetchConfig::default().with_threads(1),
        Arc::new(CountingCodec::new(4000, 2000)),
    );

    let res = m.request(0, 800, 800).unwrap().wait_timeout(WAIT).unwrap().unwrap();
    assert_eq!((res.image.width, res.image.height), (800, 400));
    assert_eq!((res.image.source_width, res.image.source_height), (4000, 2000));
}

#[test]
fn shutdown_cancels_pending_and_later_requests() {
    let tmp = make_dir(&numbered(4));
    let (codec, gate) = CountingCodec::gated(10, 10);
    let mut m = start(&tmp, PrefetchConfig::default().with_threads(1), Arc::new(codec));

    let pending = m.request(2, 10, 10).unwrap();
    let gate_opener = {
        let gate = Arc::clone(&gate);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            open_gate(&gate);
        })
    };
    m.shutdown();
    gate_opener.join().unwrap();

    // Either the in-flight decode landed before the cache was cleared, or
    // the handle was canceled; it never hangs.
    assert!(pending.wait_timeout(WAIT).is_some());

    let late = m.request(0, 10, 10).unwrap();
    assert!(matches!(late.wait_timeout(WAIT), Some(Err(LoadError::Canceled))));
    let again = m.request(3, 10, 10).unwrap();
    assert!(matches!(again.try_result(), Some(Err(LoadError::Canceled))));
    assert!(m.cached_positions().is_empty());
}
