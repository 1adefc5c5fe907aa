//! Sync channel example - receive notifications on another thread.
//!
//! Run with: cargo run --example channel_sync
//!
//! The detector is polled on a background thread and notifications arrive
//! through a bounded channel. Runs until 20 notifications were received.

use deckpad::channel::detector_channel;
use deckpad::{CaptureConfig, InputDetector, Notification};
use std::time::Duration;

fn main() {
    println!("deckpad channel example (sync)");
    println!("==============================\n");

    let detector = InputDetector::start(CaptureConfig::default());
    if !detector.is_available() {
        eprintln!("Capture unavailable: {:?}", detector.status());
        std::process::exit(1);
    }

    let (handle, rx) = detector_channel(detector, 64).expect("Failed to start poller");

    let mut received = 0u32;
    while received < 20 {
        match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(delivery) => {
                received += 1;
                match delivery.notification {
                    Notification::NumLockChanged { off } => {
                        println!("[{}] Num Lock {}", received, if off { "off" } else { "on" });
                    }
                    Notification::GridActivate { row, col } => {
                        println!(
                            "[{}] Cell ({}, {}){}",
                            received,
                            row,
                            col,
                            if delivery.passthrough { " (passthrough)" } else { "" }
                        );
                    }
                    Notification::NavigateBack => println!("[{}] Back", received),
                }
            }
            Err(_) => {
                // Timeout - nothing pressed.
            }
        }
    }

    handle.stop().expect("Failed to stop poller");
}
