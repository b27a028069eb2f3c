// Copyright 2020 the btrace project developers. See the COPYRIGHT
// file at the top-level directory of this distribution.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use clap::{Arg, Command};
use log::{error, warn};
use simplelog::{
    ColorChoice, ConfigBuilder, Level, LevelFilter, TermLogger, TerminalMode, WriteLogger,
};

fn make_app() -> Command<'static> {
    Command::new("btrace-dump")
        .version(clap::crate_version!())
        .about("Captures this process's call stack and prints it as a report.")
        .arg(Arg::new("crash").long("crash").long_help(
            "Raise a fatal signal and print the stack trace from its handler (unix only).

This exercises the path a real crash reporter takes: the report is produced \
while the process is already going down, then the process aborts.",
        ))
        .arg(
            Arg::new("output-file")
                .long("output-file")
                .takes_value(true)
                .allow_invalid_utf8(true)
                .help("Where to write the report (if unspecified, stdout is used)"),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .takes_value(true)
                .allow_invalid_utf8(true)
                .help("Where to write logs to (if unspecified, stderr is used)"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .possible_values(&["off", "error", "warn", "info", "debug", "trace"])
                .default_value("error")
                .takes_value(true)
                .help("Set the logging level."),
        )
}

fn main() {
    let matches = make_app().get_matches();

    let output_file = matches
        .value_of_os("output-file")
        .map(|os_str| Path::new(os_str).to_owned());

    let log_file = matches
        .value_of_os("log-file")
        .map(|os_str| Path::new(os_str).to_owned());

    let verbosity = match matches.value_of("verbose").unwrap() {
        "off" => LevelFilter::Off,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Error,
    };

    // Init the logger (and make trace logging less noisy)
    if let Some(log_path) = log_file {
        match File::create(&log_path) {
            Ok(log_file) => {
                let _ = WriteLogger::init(
                    verbosity,
                    ConfigBuilder::new()
                        .set_location_level(LevelFilter::Off)
                        .set_time_level(LevelFilter::Off)
                        .set_thread_level(LevelFilter::Off)
                        .set_target_level(LevelFilter::Off)
                        .build(),
                    log_file,
                );
            }
            Err(err) => {
                eprintln!("failed to create log file {}: {}", log_path.display(), err);
                std::process::exit(1);
            }
        }
    } else {
        let _ = TermLogger::init(
            verbosity,
            ConfigBuilder::new()
                .set_location_level(LevelFilter::Off)
                .set_time_level(LevelFilter::Off)
                .set_thread_level(LevelFilter::Off)
                .set_target_level(LevelFilter::Off)
                .set_level_color(Level::Trace, None)
                .build(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        );
    }

    if matches.is_present("crash") {
        #[cfg(unix)]
        fault::provoke();
        #[cfg(not(unix))]
        {
            error!("--crash is only supported on unix targets");
            std::process::exit(1);
        }
    }

    let report = second_level();

    match output_file {
        Some(path) => match File::create(&path).and_then(|mut f| f.write_all(report.as_bytes())) {
            Ok(()) => {}
            Err(err) => {
                error!("failed to write {}: {}", path.display(), err);
                std::process::exit(1);
            }
        },
        None => print!("{}", report),
    }
}

// A short call chain so the report has something to show besides main.

#[inline(never)]
fn second_level() -> String {
    std::hint::black_box(first_level())
}

#[inline(never)]
fn first_level() -> String {
    let stack = btrace::capture();
    if stack.info != btrace::CaptureInfo::Ok {
        warn!("capture terminated with {:?}", stack.info);
    }
    btrace::render(&stack)
}

/// Demonstrates capturing from inside a fatal-signal handler.
#[cfg(unix)]
mod fault {
    use log::warn;

    extern "C" fn on_fatal_signal(signal: libc::c_int) {
        let report = btrace::render_current();
        eprintln!("signal: {}", signal);
        eprintln!("{}", report);
        std::process::abort();
    }

    pub fn provoke() -> ! {
        warn!("raising SIGSEGV on purpose");
        // SAFETY: installing a handler and raising the signal on this
        // thread; the handler never returns.
        unsafe {
            libc::signal(libc::SIGSEGV, on_fatal_signal as libc::sighandler_t);
            libc::raise(libc::SIGSEGV);
        }
        unreachable!("the fatal-signal handler aborts");
    }
}
