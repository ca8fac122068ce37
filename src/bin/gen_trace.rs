//! Synthetic trace generator.
//!
//! Produces deterministic trace files for tests and benchmarks: a number of
//! frames, each with draw work spread across a number of recorded threads,
//! presented from thread 0. Same seed, same trace.

use retrace_rs::trace::{CallOp, TraceWriter};
use std::path::PathBuf;
use std::process;

/// xorshift64* — small deterministic PRNG, no dependency needed.
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> XorShift64 {
        XorShift64 {
            state: seed | 1, // zero state would be a fixed point
        }
    }

    fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    fn below(&mut self, bound: u32) -> u32 {
        (self.next() % u64::from(bound.max(1))) as u32
    }
}

fn usage(exe: &str) -> ! {
    eprintln!("usage: {exe} [--frames=N] [--threads=N] [--seed=N] OUT");
    process::exit(2);
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let exe = args.first().map(String::as_str).unwrap_or("gen_trace");

    let mut frames: u32 = 16;
    let mut threads: u32 = 2;
    let mut seed: u64 = 1;
    let mut out: Option<PathBuf> = None;

    for arg in &args[1..] {
        if let Some(v) = arg.strip_prefix("--frames=") {
            frames = v.parse().unwrap_or_else(|_| usage(exe));
        } else if let Some(v) = arg.strip_prefix("--threads=") {
            threads = v.parse().unwrap_or_else(|_| usage(exe));
        } else if let Some(v) = arg.strip_prefix("--seed=") {
            seed = v.parse().unwrap_or_else(|_| usage(exe));
        } else if arg.starts_with("--") {
            usage(exe);
        } else if out.is_some() {
            usage(exe);
        } else {
            out = Some(PathBuf::from(arg));
        }
    }

    let Some(out) = out else { usage(exe) };
    let threads = threads.max(1);

    let mut writer = match TraceWriter::create(&out) {
        Ok(writer) => writer,
        Err(err) => {
            eprintln!("error: failed to create {}: {err}", out.display());
            process::exit(1);
        }
    };

    let mut rng = XorShift64::new(seed);
    let mut result = (|| -> std::io::Result<()> {
        writer.write_call(
            0,
            &CallOp::Viewport {
                width: 256,
                height: 256,
            },
        )?;
        for frame in 0..frames {
            writer.write_call(
                0,
                &CallOp::Clear {
                    color: [rng.below(256) as u8, 0, 0, 255],
                },
            )?;
            for thread in 0..threads {
                // A run of draws per thread keeps handoffs realistic: long
                // same-thread stretches with occasional switches.
                for _ in 0..1 + rng.below(4) {
                    writer.write_call(
                        thread,
                        &CallOp::FillRect {
                            x: rng.below(192),
                            y: rng.below(192),
                            w: 1 + rng.below(64),
                            h: 1 + rng.below(64),
                            color: [
                                rng.below(256) as u8,
                                rng.below(256) as u8,
                                rng.below(256) as u8,
                                255,
                            ],
                        },
                    )?;
                }
            }
            if frame % 8 == 7 {
                writer.write_call(
                    0,
                    &CallOp::Marker {
                        text: format!("frame {frame}"),
                    },
                )?;
            }
            writer.write_call(0, &CallOp::Present)?;
        }
        Ok(())
    })();
    if result.is_ok() {
        result = writer.finish().map(|_| ());
    }

    if let Err(err) = result {
        eprintln!("error: failed to write {}: {err}", out.display());
        process::exit(1);
    }
}
