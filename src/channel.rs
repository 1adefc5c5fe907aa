//! Channel-based delivery of detector notifications.
//!
//! The detector is normally polled from the application's UI timer. These
//! adapters move the poll loop onto a background thread instead and hand the
//! notifications over through a bounded channel, for applications that
//! process input on their own worker or in an async runtime.
//!
//! # Example (Sync)
//!
//! ```no_run
//! use deckpad::channel::detector_channel;
//! use deckpad::{CaptureConfig, InputDetector};
//! use std::time::Duration;
//!
//! let detector = InputDetector::start(CaptureConfig::default());
//! let (handle, rx) = detector_channel(detector, 64).expect("failed to start poller");
//!
//! while let Ok(delivery) = rx.recv_timeout(Duration::from_secs(5)) {
//!     println!("{:?} (passthrough = {})", delivery.notification, delivery.passthrough);
//! }
//!
//! handle.stop().unwrap();
//! ```

use crate::detector::InputDetector;
use crate::error::{Error, Result};
use crate::event::{Notification, NotificationHandler};
use crate::shared::SharedChannel;
use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

/// A notification together with the passthrough flag sampled for its poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub notification: Notification,
    pub passthrough: bool,
}

/// Handle to a background poll loop.
///
/// Dropping the handle stops the loop and shuts the detector down.
pub struct DetectorHandle {
    running: Arc<AtomicBool>,
    channel: Option<SharedChannel>,
    thread_handle: Option<JoinHandle<()>>,
}

impl DetectorHandle {
    /// Stop polling, shut the detector down and wait for the thread.
    pub fn stop(mut self) -> Result<()> {
        self.stop_inner()
    }

    /// Check if the poll loop is still running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Toggle passthrough on the detector's channel.
    pub fn set_passthrough(&self, enabled: bool) {
        if let Some(channel) = &self.channel {
            channel.set_passthrough(enabled);
        }
    }

    fn stop_inner(&mut self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(handle) = self.thread_handle.take() {
            handle
                .join()
                .map_err(|_| Error::ThreadError("failed to join poll thread".into()))?;
        }

        Ok(())
    }
}

impl Drop for DetectorHandle {
    fn drop(&mut self) {
        let _ = self.stop_inner();
    }
}

/// Handler that forwards notifications into a bounded sync channel.
struct ChannelHandler {
    sender: SyncSender<Delivery>,
}

impl NotificationHandler for ChannelHandler {
    fn handle_notification(&mut self, notification: &Notification, passthrough: bool) {
        // Never block the poll loop on a slow consumer.
        let _ = self.sender.try_send(Delivery {
            notification: *notification,
            passthrough,
        });
    }
}

/// Run `detector`'s poll loop on a background thread, feeding `handler`.
///
/// The loop polls every `poll_interval` from the detector's configuration
/// and shuts the detector down when it stops.
pub fn spawn_poller<H>(mut detector: InputDetector, mut handler: H) -> Result<DetectorHandle>
where
    H: NotificationHandler + Send + 'static,
{
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    let channel = detector.channel().cloned();
    let interval = detector.config().poll_interval;

    let thread_handle = thread::Builder::new()
        .name("deckpad-poller".into())
        .spawn(move || {
            debug!("poll loop started");
            while running_clone.load(Ordering::SeqCst) {
                detector.poll(&mut handler);
                thread::sleep(interval);
            }
            detector.shutdown();
            debug!("poll loop stopped");
        })
        .map_err(|e| Error::ThreadError(e.to_string()))?;

    Ok(DetectorHandle {
        running,
        channel,
        thread_handle: Some(thread_handle),
    })
}

/// Poll `detector` in the background and deliver into a bounded channel.
///
/// # Arguments
///
/// * `capacity` - Maximum number of deliveries to buffer. When the buffer is
///   full new notifications are dropped.
pub fn detector_channel(
    detector: InputDetector,
    capacity: usize,
) -> Result<(DetectorHandle, Receiver<Delivery>)> {
    let (sender, receiver) = mpsc::sync_channel(capacity);
    let handle = spawn_poller(detector, ChannelHandler { sender })?;
    Ok((handle, receiver))
}

#[cfg(feature = "tokio")]
pub use tokio_channel::*;

#[cfg(feature = "tokio")]
mod tokio_channel {
    use super::*;
    use tokio::sync::mpsc as tokio_mpsc;

    /// Handler that forwards notifications into a tokio channel.
    struct TokioChannelHandler {
        sender: tokio_mpsc::Sender<Delivery>,
    }

    impl NotificationHandler for TokioChannelHandler {
        fn handle_notification(&mut self, notification: &Notification, passthrough: bool) {
            let _ = self.sender.try_send(Delivery {
                notification: *notification,
                passthrough,
            });
        }
    }

    /// Poll `detector` in the background and deliver into a tokio channel.
    ///
    /// ```ignore
    /// use deckpad::channel::detector_async_channel;
    /// use deckpad::{CaptureConfig, InputDetector};
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let detector = InputDetector::start(CaptureConfig::default());
    ///     let (_handle, mut rx) = detector_async_channel(detector, 64).unwrap();
    ///     while let Some(delivery) = rx.recv().await {
    ///         println!("{:?}", delivery.notification);
    ///     }
    /// }
    /// ```
    pub fn detector_async_channel(
        detector: InputDetector,
        capacity: usize,
    ) -> Result<(DetectorHandle, tokio_mpsc::Receiver<Delivery>)> {
        let (sender, receiver) = tokio_mpsc::channel(capacity);
        let handle = spawn_poller(detector, TokioChannelHandler { sender })?;
        Ok((handle, receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureConfig;
    use crate::keypad::{SC_NUMPAD0, SC_NUMPAD8};
    use std::time::Duration;

    fn detector() -> (InputDetector, SharedChannel) {
        let channel = SharedChannel::new_in_process();
        channel.initialize(true);
        let config = CaptureConfig::default().with_poll_interval(Duration::from_millis(2));
        (InputDetector::with_channel(config, channel.clone()), channel)
    }

    #[test]
    fn test_deliveries_arrive_in_order() {
        let (detector, channel) = detector();
        let (handle, rx) = detector_channel(detector, 16).unwrap();
        assert!(handle.is_running());

        channel.push_event(SC_NUMPAD8);
        channel.push_event(SC_NUMPAD0);

        let timeout = Duration::from_secs(2);
        assert_eq!(
            rx.recv_timeout(timeout).unwrap(),
            Delivery {
                notification: Notification::GridActivate { row: 0, col: 1 },
                passthrough: false,
            }
        );
        assert_eq!(
            rx.recv_timeout(timeout).unwrap().notification,
            Notification::NavigateBack
        );

        handle.stop().unwrap();
        assert!(!channel.running(), "detector shut down with the loop");
    }

    #[test]
    fn test_handle_controls_passthrough() {
        let (detector, channel) = detector();
        let (handle, rx) = detector_channel(detector, 16).unwrap();

        handle.set_passthrough(true);
        assert!(channel.passthrough());
        channel.push_event(SC_NUMPAD8);
        let delivery = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(delivery.passthrough);

        drop(handle);
        assert!(!channel.running());
    }

    #[test]
    fn test_full_buffer_drops_instead_of_blocking() {
        let (detector, channel) = detector();
        let (handle, rx) = detector_channel(detector, 1).unwrap();

        for _ in 0..4 {
            channel.push_event(SC_NUMPAD8);
        }
        thread::sleep(Duration::from_millis(50));
        handle.stop().unwrap();

        assert_eq!(rx.try_iter().count(), 1);
    }

    #[cfg(feature = "tokio")]
    #[tokio::test]
    async fn test_async_channel_delivers() {
        let (detector, channel) = detector();
        let (handle, mut rx) = detector_async_channel(detector, 16).unwrap();

        channel.publish_numlock(false);
        let delivery = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.notification, Notification::NumLockChanged { off: false });

        handle.stop().unwrap();
    }
}
