use retrace_rs::callset::CallSet;
use retrace_rs::driver::{DriverOptions, SoftDriver};
use retrace_rs::output::{OutputSink, StdoutSink};
use retrace_rs::profile::ProfileOptions;
use retrace_rs::replay::{replay, ReplayConfig, ReplayOutcome};
use retrace_rs::trace::TraceReader;
use std::io::{self, BufRead};
use std::path::Path;
use std::process;
use std::sync::Arc;
use std::time::Instant;

fn usage(exe: &str) {
    println!(
        "Usage: {exe} [OPTION] TRACE [...]\n\
         Replay TRACE.\n\
         \n\
         \x20 -b           benchmark mode (no error checking or warning messages)\n\
         \x20 -pcpu        cpu profiling (cpu times per call)\n\
         \x20 -pgpu        gpu profiling (gpu times per draw call)\n\
         \x20 -ppd         pixels drawn profiling (pixels drawn per draw call)\n\
         \x20 -c PREFIX    compare against snapshots\n\
         \x20 -C CALLSET   calls to compare (default is every frame)\n\
         \x20 -core        use core profile\n\
         \x20 -db          use a double buffer visual (default)\n\
         \x20 -sb          use a single buffer visual\n\
         \x20 -s PREFIX    take snapshots; `-` for PNM stdout output\n\
         \x20 -S CALLSET   calls to snapshot (default is every frame)\n\
         \x20 -v           increase output verbosity\n\
         \x20 -D CALLNO    dump state at specific call no\n\
         \x20 -w           wait for input on final frame"
    );
}

/// Consumes the value of a flag like `-s PREFIX`, or exits with usage.
fn flag_value<'a>(args: &'a [String], i: &mut usize, exe: &str, flag: &str) -> &'a str {
    *i += 1;
    match args.get(*i) {
        Some(value) => value,
        None => {
            eprintln!("error: option {flag} requires an argument");
            usage(exe);
            process::exit(1);
        }
    }
}

fn parse_callset(spec: &str, exe: &str, flag: &str) -> CallSet {
    match spec.parse() {
        Ok(set) => set,
        Err(err) => {
            eprintln!("error: option {flag}: {err}");
            usage(exe);
            process::exit(1);
        }
    }
}

fn wait_for_input() {
    let mut line = String::new();
    let _ = io::stdin().lock().read_line(&mut line);
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let exe = args
        .first()
        .map(String::as_str)
        .unwrap_or("retrace")
        .to_string();

    let mut verbosity: i32 = 0;
    let mut debug = true;
    let mut double_buffer = true;
    let mut core_profile = false;
    let mut profile = ProfileOptions::default();
    let mut snapshot_prefix: Option<String> = None;
    let mut compare_prefix: Option<String> = None;
    let mut snapshot_frequency = CallSet::empty();
    let mut compare_frequency = CallSet::empty();
    let mut dump_state_at: Option<u32> = None;
    let mut wait_on_finish = false;

    let mut i = 1;
    while i < args.len() {
        let arg = args[i].as_str();
        if !arg.starts_with('-') {
            break;
        }
        match arg {
            "--" => {
                i += 1;
                break;
            }
            "--help" => {
                usage(&exe);
                return;
            }
            "-b" => {
                debug = false;
                verbosity = -1;
            }
            "-pcpu" | "-pgpu" | "-ppd" => {
                debug = false;
                verbosity = -1;
                match arg {
                    "-pcpu" => profile.cpu = true,
                    "-pgpu" => profile.gpu = true,
                    _ => profile.pixels = true,
                }
            }
            "-c" => {
                compare_prefix = Some(flag_value(&args, &mut i, &exe, "-c").to_string());
                if compare_frequency.is_empty() {
                    compare_frequency = CallSet::frame();
                }
            }
            "-C" => {
                let spec = flag_value(&args, &mut i, &exe, "-C");
                compare_frequency = parse_callset(spec, &exe, "-C");
                if compare_prefix.is_none() {
                    compare_prefix = Some(String::new());
                }
            }
            "-D" => {
                let value = flag_value(&args, &mut i, &exe, "-D");
                match value.parse::<u32>() {
                    Ok(no) => dump_state_at = Some(no),
                    Err(_) => {
                        eprintln!("error: option -D: bad call number {value:?}");
                        usage(&exe);
                        process::exit(1);
                    }
                }
                verbosity = -2;
            }
            "-core" => core_profile = true,
            "-db" => double_buffer = true,
            "-sb" => double_buffer = false,
            "-s" => {
                let prefix = flag_value(&args, &mut i, &exe, "-s").to_string();
                if snapshot_frequency.is_empty() {
                    snapshot_frequency = CallSet::frame();
                }
                if prefix == "-" {
                    // PNM goes to stdout: keep it clean of progress lines.
                    verbosity = -2;
                }
                snapshot_prefix = Some(prefix);
            }
            "-S" => {
                let spec = flag_value(&args, &mut i, &exe, "-S");
                snapshot_frequency = parse_callset(spec, &exe, "-S");
                if snapshot_prefix.is_none() {
                    snapshot_prefix = Some(String::new());
                }
            }
            "-v" => verbosity += 1,
            "-w" => wait_on_finish = true,
            _ => {
                eprintln!("error: unknown option {arg}");
                usage(&exe);
                process::exit(1);
            }
        }
        i += 1;
    }

    let profiling = profile.any();
    let sink: Arc<dyn OutputSink> = Arc::new(StdoutSink::new());

    for path in &args[i..] {
        let source = match TraceReader::open(Path::new(path)) {
            Ok(source) => source,
            Err(err) => {
                eprintln!("error: failed to open {path}: {err}");
                process::exit(1);
            }
        };

        let config = ReplayConfig {
            snapshot_prefix: snapshot_prefix.clone(),
            compare_prefix: compare_prefix.clone(),
            snapshot_frequency: snapshot_frequency.clone(),
            compare_frequency: compare_frequency.clone(),
            dump_state_at,
            verbosity,
            profile,
            driver_options: DriverOptions {
                double_buffer,
                core_profile,
                check_errors: debug,
            },
        };

        let start = Instant::now();
        let report = replay(
            Box::new(source),
            Box::new(SoftDriver::new()),
            Arc::clone(&sink),
            config,
        );
        let elapsed = start.elapsed().as_secs_f64();

        if report.outcome == ReplayOutcome::StoppedAtStateDump {
            sink.flush();
            process::exit(0);
        }

        if verbosity >= -1 || profiling {
            let fps = if elapsed > 0.0 {
                f64::from(report.stats.frames) / elapsed
            } else {
                0.0
            };
            sink.write_line(&format!(
                "Rendered {} frames in {elapsed:.3} secs, average of {fps:.3} fps",
                report.stats.frames
            ));
        }

        if wait_on_finish {
            sink.flush();
            wait_for_input();
        }
    }

    sink.flush();
}
