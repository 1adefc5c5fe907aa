//! Notification recorder example - record a session and replay it.
//!
//! Usage:
//!   cargo run --example recorder --features recorder -- record session.json
//!   cargo run --example recorder --features recorder -- replay session.json

use std::env;

#[cfg(feature = "recorder")]
use deckpad::{CaptureConfig, InputDetector, Notification, NotificationRecorder, Recording};
#[cfg(feature = "recorder")]
use std::time::{Duration, Instant};

fn main() -> deckpad::Result<()> {
    #[cfg(not(feature = "recorder"))]
    {
        eprintln!("This example requires the 'recorder' feature.");
        eprintln!("Run with: cargo run --example recorder --features recorder -- ...");
        std::process::exit(1);
    }

    #[cfg(feature = "recorder")]
    {
        let args: Vec<String> = env::args().collect();

        if args.len() < 3 {
            println!("Usage:");
            println!("  {} record <filename>  - Record for 10 seconds", args[0]);
            println!("  {} replay <filename>  - Replay with original timing", args[0]);
            return Ok(());
        }

        let command = &args[1];
        let filename = &args[2];

        match command.as_str() {
            "record" => {
                println!("Recording for 10 seconds...");
                println!("Turn Num Lock off and use the keypad!");

                let config = CaptureConfig::default();
                let interval = config.poll_interval;
                let mut detector = InputDetector::start(config);
                let mut recorder =
                    NotificationRecorder::new(|n: &Notification, _: bool| println!("  {:?}", n));

                let deadline = Instant::now() + Duration::from_secs(10);
                while Instant::now() < deadline {
                    detector.poll(&mut recorder);
                    std::thread::sleep(interval);
                }
                detector.shutdown();

                let (_, recording) = recorder.finish();
                let recording = recording.with_description("keypad session");
                recording.save(filename)?;
                println!(
                    "\nSaved {} notifications ({:?}) to {}",
                    recording.len(),
                    recording.duration(),
                    filename
                );
            }
            "replay" => {
                let recording = Recording::load(filename)?;
                println!("Replaying {} notifications...", recording.len());
                recording.replay_timed(
                    &mut |n: &Notification, passthrough: bool| {
                        println!("  {:?} (passthrough = {})", n, passthrough)
                    },
                    1.0,
                )?;
            }
            _ => {
                println!("Unknown command: {}", command);
            }
        }

        Ok(())
    }
}
