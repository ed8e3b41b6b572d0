use crate::cache::Handle;
use crate::error::PrefetchError;
use crate::loader::FrameSize;
use crate::manager::Manager;

/// Headless viewer session: tracks the displayed position and frame size
/// and turns navigation into manager requests.
pub struct Navigator<'a> {
    manager: &'a Manager,
    current: usize,
    frame: FrameSize,
    /// (position, generation) of the handle last shown.
    shown: Option<(usize, u64)>,
}

impl<'a> Navigator<'a> {
    pub fn new(manager: &'a Manager, width: u32, height: u32) -> Self {
        Self {
            manager,
            current: 0,
            frame: FrameSize::new(width, height),
            shown: None,
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn frame(&self) -> FrameSize {
        self.frame
    }

    pub fn go_to(&mut self, idx: usize) -> Result<Handle, PrefetchError> {
        let size = self.manager.size();
        if idx >= size {
            return Err(PrefetchError::PreconditionViolation { position: idx, size });
        }
        self.current = idx;
        self.show()
    }

    /// Requests the current position, canceling whatever was shown before.
    pub fn show(&mut self) -> Result<Handle, PrefetchError> {
        let handle = self
            .manager
            .request(self.current, self.frame.width, self.frame.height)?;

        if let Some((pos, generation)) = self.shown.replace((handle.position, handle.generation())) {
            if pos != handle.position {
                self.manager.cancel_generation(pos, generation);
            }
        }
        Ok(handle)
    }

    pub fn next(&mut self) -> Result<Option<Handle>, PrefetchError> {
        if self.current + 1 >= self.manager.size() {
            return Ok(None);
        }
        self.current += 1;
        self.show().map(Some)
    }

    pub fn prev(&mut self) -> Result<Option<Handle>, PrefetchError> {
        if self.current == 0 {
            return Ok(None);
        }
        self.current -= 1;
        self.show().map(Some)
    }

    /// New frame size; cached entries for the old size get rebuilt.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<Handle, PrefetchError> {
        if width == 0 || height == 0 {
            return Err(PrefetchError::InvalidFrame { width, height });
        }
        self.frame = FrameSize::new(width, height);
        self.show()
    }

    /// Deletes the displayed file and shows whatever now sits at its
    /// position. `None` once the listing is empty.
    pub fn delete_current(&mut self) -> Result<Option<Handle>, PrefetchError> {
        self.manager.delete(self.current)?;
        self.shown = None;

        let size = self.manager.size();
        if size == 0 {
            self.current = 0;
            return Ok(None);
        }
        self.current = self.current.min(size - 1);
        self.show().map(Some)
    }
}
