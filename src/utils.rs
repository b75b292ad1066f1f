use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

// round and saturate a channel value to 8 bits
pub(crate) fn clamp(val: f64) -> u8 {
    if val < 0.0 {
        0
    } else if val > 255.0 {
        255
    } else {
        val.round() as u8
    }
}

// single slot shared between the compose thread and a consumer
struct Slot<T> {
    value: Option<T>,
    closed: bool,
}

/// Latest-wins hand-off: `publish` overwrites whatever the consumer has not
/// taken yet, so a slow consumer only ever sees the newest frame.
pub struct LatestFrame<T> {
    state: Arc<(Mutex<Slot<T>>, Condvar)>,
}

impl<T> Clone for LatestFrame<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T> Default for LatestFrame<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LatestFrame<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new((
                Mutex::new(Slot {
                    value: None,
                    closed: false,
                }),
                Condvar::new(),
            )),
        }
    }

    /// Stores `value`, returning the unread value it displaced.
    pub fn publish(&self, value: T) -> Option<T> {
        let (lock, cvar) = &*self.state;
        let mut slot = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let dropped = slot.value.replace(value);
        cvar.notify_all();
        dropped
    }

    /// Takes the current value without waiting.
    pub fn try_take(&self) -> Option<T> {
        let (lock, _) = &*self.state;
        let mut slot = lock.lock().unwrap_or_else(PoisonError::into_inner);
        slot.value.take()
    }

    /// Waits up to `timeout` for a value. Returns `None` on timeout or once
    /// the slot is closed and empty.
    pub fn take(&self, timeout: Duration) -> Option<T> {
        let (lock, cvar) = &*self.state;
        let slot = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut slot, _) = cvar
            .wait_timeout_while(slot, timeout, |s| s.value.is_none() && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);
        slot.value.take()
    }

    /// Marks the producer as finished and wakes waiting consumers.
    pub fn close(&self) {
        let (lock, cvar) = &*self.state;
        let mut slot = lock.lock().unwrap_or_else(PoisonError::into_inner);
        slot.closed = true;
        cvar.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        let (lock, _) = &*self.state;
        lock.lock().unwrap_or_else(PoisonError::into_inner).closed
    }
}

/// Frame rate averaged over the last `window` frames.
pub struct FrameRate {
    fps: VecDeque<f32>,
    window: usize,
    last_frame_time: Option<Instant>,
}

impl FrameRate {
    pub fn new(window: usize) -> Self {
        Self {
            fps: VecDeque::new(),
            window: window.max(1),
            last_frame_time: None,
        }
    }

    /// Records a frame finished at `now`.
    pub fn tick(&mut self, now: Instant) {
        if let Some(last) = self.last_frame_time {
            let elapsed = now.duration_since(last).as_secs_f32();
            if elapsed > 0.0 {
                self.fps.push_back(1.0 / elapsed);
                if self.fps.len() > self.window {
                    self.fps.pop_front();
                }
            }
        }
        self.last_frame_time = Some(now);
    }

    pub fn get_mean(&self) -> Option<f32> {
        if self.fps.is_empty() {
            None
        } else {
            Some(self.fps.iter().sum::<f32>() / self.fps.len() as f32)
        }
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::new(10)
    }
}
