//! Prefetching image cache for a directory viewer.
//!
//! [`Manager`] keeps a window of decoded, frame-fitted images around the
//! position the viewer last asked for, using a fixed pool of decode threads
//! fed from a bounded priority queue, and a periodic reaper that evicts
//! entries the viewer has moved away from.

pub mod cache;
pub mod config;
pub mod error;
pub mod files;
pub mod loader;
pub mod manager;
pub mod queue;
mod reaper;
pub mod session;

pub use cache::{EntryStatus, Handle, ImageResult, LoadResult};
pub use config::PrefetchConfig;
pub use error::{LoadError, PrefetchError};
pub use files::{DirectoryEntry, DirectoryIndex};
pub use loader::{fit_into_frame, DecodedImage, FrameSize, ImageCodec, ImageCrateCodec};
pub use manager::Manager;
pub use session::Navigator;
