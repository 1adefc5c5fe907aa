//! Poll loop example - drive a console "deck" from the numeric keypad.
//!
//! Run with: cargo run --example poll_loop
//!
//! Build the host first (`cargo build --bin deckpad-host`) so it sits next to
//! the example binary, or point `DECKPAD_HOST` at it. Turn Num Lock off and
//! press the keypad digits; `0` goes back. Runs for 30 seconds.

use deckpad::{CaptureConfig, CaptureStatus, DeckShell, InputDetector, SystemNumLock, VisibilityPolicy};
use std::time::{Duration, Instant};

/// Prints every call instead of drawing a window.
struct ConsoleDeck {
    path: Vec<(u8, u8)>,
}

impl DeckShell for ConsoleDeck {
    fn show_window(&mut self) {
        println!("[deck] shown");
    }

    fn hide_window(&mut self) {
        println!("[deck] hidden");
    }

    fn activate_cell(&mut self, row: u8, col: u8) {
        self.path.push((row, col));
        println!("[deck] open ({}, {}) -> depth {}", row, col, self.path.len());
    }

    fn navigate_back(&mut self) {
        if self.path.pop().is_some() {
            println!("[deck] back -> depth {}", self.path.len());
        }
    }

    fn sync_foreground_folder(&mut self) {
        match deckpad::foreground_executable() {
            Some(exe) => println!("[deck] foreground is {}", exe),
            None => println!("[deck] no foreground application"),
        }
    }
}

fn main() {
    println!("deckpad poll loop example");
    println!("=========================\n");

    let mut config = CaptureConfig::default();
    if let Some(path) = std::env::var_os("DECKPAD_HOST") {
        config = config.with_host_executable(path);
    }
    let interval = config.poll_interval;

    let mut detector = InputDetector::start(config);
    if let CaptureStatus::Unavailable(reason) = detector.status() {
        eprintln!("Capture unavailable: {}", reason);
        std::process::exit(1);
    }

    let mut policy = VisibilityPolicy::new(ConsoleDeck { path: Vec::new() }, SystemNumLock);
    let deadline = Instant::now() + Duration::from_secs(30);

    while Instant::now() < deadline {
        detector.poll(&mut policy);
        std::thread::sleep(interval);
    }

    if let Some(stats) = detector.statistics() {
        println!("\n{}", stats);
    }
    detector.shutdown();
}
