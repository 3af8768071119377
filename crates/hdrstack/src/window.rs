use std::collections::VecDeque;

use crate::error::StageError;

/// Bounded FIFO over the most recently received frames.
///
/// In the exposure pipeline `T` is [`crate::FrameHandle`]: the window holds
/// references to textures owned elsewhere, never copies of pixel data.
///
/// Eviction is deliberately split from insertion. The driving loop runs
/// `push` → [`snapshot`] → render → [`evict_oldest_if_full`], so the
/// compositing pass can still read the frame that is about to leave the
/// window. `push` itself only trims when a caller skips that protocol and
/// overfills the window, which keeps the length bounded by the capacity at
/// all times.
///
/// [`snapshot`]: FrameWindow::snapshot
/// [`evict_oldest_if_full`]: FrameWindow::evict_oldest_if_full
pub struct FrameWindow<T> {
    frames: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> FrameWindow<T> {
    /// Creates an empty window holding at most `capacity` frames.
    pub fn new(capacity: usize) -> Result<Self, StageError> {
        if capacity == 0 {
            return Err(StageError::InvalidInput(
                "window capacity must be at least 1".into(),
            ));
        }
        Ok(Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    /// Appends `frame` at the back, dropping frames from the front if the
    /// window would otherwise exceed its capacity.
    pub fn push(&mut self, frame: T) {
        self.frames.push_back(frame);
        while self.frames.len() > self.capacity {
            self.frames.pop_front();
            tracing::debug!(
                capacity = self.capacity,
                "window overfull; dropped oldest frame"
            );
        }
    }

    /// Handles of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.frames.iter().cloned().collect()
    }

    /// Drops the oldest frame once the window is full. Invoke only after
    /// the render consuming the current snapshot has completed.
    pub fn evict_oldest_if_full(&mut self) {
        if self.frames.len() >= self.capacity {
            self.frames.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
