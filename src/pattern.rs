//! on/off pattern loop on a dedicated thread
//!
//! the thread parks between steps; `stop` clears the flag, unparks it and
//! joins, so a stop returns as soon as the output has been switched off
//! rather than after the current step runs out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::DeliveryError;

pub struct PatternLoop {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PatternLoop {
    /// drive `output` with `pattern` (on, off, on, off... in ms)
    ///
    /// `output(true)` switches the device on. it is always left off when the
    /// loop ends.
    pub fn spawn<F>(name: String, pattern: Vec<u64>, repeat: bool, mut output: F) -> Result<Self, DeliveryError>
    where
        F: FnMut(bool) + Send + 'static,
    {
        if pattern.iter().all(|&ms| ms == 0) {
            return Err(DeliveryError::Playback("pattern has no duration".into()));
        }

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = std::thread::Builder::new()
            .name(name)
            .spawn(move || {
                'outer: loop {
                    for (step, &ms) in pattern.iter().enumerate() {
                        output(step % 2 == 0);
                        if !park_unless_stopped(&flag, Duration::from_millis(ms)) {
                            break 'outer;
                        }
                    }
                    if !repeat {
                        break;
                    }
                }
                output(false);
            })
            .map_err(|e| DeliveryError::Playback(format!("failed to spawn pattern thread: {}", e)))?;

        Ok(Self { running, handle: Some(handle) })
    }

    /// stop the pattern and wait for the output to be released
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                tracing::warn!("[GPIO] pattern thread panicked");
            }
        }
    }
}

impl Drop for PatternLoop {
    fn drop(&mut self) {
        self.halt();
    }
}

/// returns false as soon as the flag is cleared
fn park_unless_stopped(flag: &AtomicBool, total: Duration) -> bool {
    let deadline = Instant::now() + total;
    while flag.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        // spurious wake-ups just go round again
        std::thread::park_timeout(deadline - now);
    }
    false
}
