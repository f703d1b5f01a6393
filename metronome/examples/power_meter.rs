//! Example recording a simulated power meter.
//!
//! This example shows how to:
//! - Bind a getter that reports several fields
//! - Record at a fixed rate for a bounded window
//! - Read the store live from another thread
//! - Save the recording, reload it, and extract plot curves
//!
//! Run with: `RUST_LOG=metronome=debug cargo run -p metronome --example power_meter`

use std::thread;
use std::time::{Duration, Instant};

use metronome::{Recorder, Row, SamplingConfig, SeriesStore, Value};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("⏱  metronome power meter example");

    // Simulated meter: a slow sine wave on top of a 200 W base load
    let started = Instant::now();
    let mut recorder = Recorder::with_getter(&["power", "state"], move || {
        let t = started.elapsed().as_secs_f64();
        let power = 200.0 + 50.0 * (t * std::f64::consts::TAU / 2.0).sin();
        let state = if power > 220.0 { "high" } else { "normal" };
        Ok(Row::from([
            ("power".to_string(), Value::from(power)),
            ("state".to_string(), Value::from(state)),
        ]))
    })?;

    // 10 Hz for 3 seconds
    let config = SamplingConfig::new(10.0, Some(Duration::from_secs(3)))?;
    recorder.start_with(config)?;

    // Watch the store from another thread while the recorder fills it
    let live = recorder.series();
    let watcher = thread::spawn(move || {
        for _ in 0..5 {
            thread::sleep(Duration::from_millis(500));
            println!("  live: {} row(s), latest time {:?}", live.len(), live.latest_time());
        }
    });

    recorder.wait()?;
    let _ = watcher.join();
    println!("\n📊 {recorder}");

    let path = std::env::temp_dir().join("metronome-power-meter.json");
    recorder.save(&path)?;
    println!("💾 saved to {}", path.display());

    // Offline: reload and plot
    let store = SeriesStore::load(&path)?;
    for curve in metronome::plot::curves(&store) {
        let peak = curve
            .points
            .iter()
            .map(|[_, y]| *y)
            .fold(f64::NEG_INFINITY, f64::max);
        println!("  {}: {} point(s), peak {peak:.1}", curve.field, curve.points.len());
    }

    Ok(())
}
