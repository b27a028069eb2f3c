// Copyright 2020 the btrace project developers. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Stack traces of the running process, rendered as text.
//!
//! [`capture`] walks the calling thread's stack and resolves every
//! return address it finds to a module/file/line/symbol as far as the
//! platform's native facilities allow. [`render`] turns the result into
//! a line-per-frame report. Both are cheap enough, and careful enough
//! about allocation during the walk, to be useful from a fatal-signal
//! handler as well as from ordinary diagnostic logging.
//!
//! ```
//! let stack = btrace::capture();
//! assert!(stack.depth() <= btrace::MAX_FRAMES);
//! print!("{}", btrace::render(&stack));
//! ```
//!
//! Report lines have the form `location(line): symbol`, where the
//! location is the source file when line information exists and the
//! containing module otherwise. Addresses nothing could be found for
//! stay in the report as `module: unknown symbol @ 0x...` rather than
//! being dropped. On targets with no walker at all the report is the
//! single line `stacktrace: unsupported platform`.

mod buffer;
mod frame;
mod symbolize;
mod walker;

pub use frame::{Capture, CaptureInfo, StackFrame};
pub use walker::MAX_FRAMES;

use buffer::TextBuffer;
use frame::Resolution;
use tracing::trace;

/// Captures the calling thread's stack, from the caller's frame outward
/// to the root of the call stack.
///
/// The walk stops at the bottom of the stack, at [`MAX_FRAMES`], or at
/// the first sign of a corrupted stack; [`Capture::info`] records
/// which. None of those are errors: the capture is usable in every
/// case, and dropping it releases everything it holds.
#[inline(never)]
pub fn capture() -> Capture {
    let raw = walker::walk_current();
    let frames = symbolize::resolve(&raw);
    trace!("capture: {} frames, {:?}", frames.len(), raw.info);
    Capture {
        frames,
        info: raw.info,
    }
}

/// Renders `capture` as a report with one newline-terminated line per
/// frame, innermost first.
///
/// The capture is only read; rendering it again produces byte-identical
/// text, and the capture remains valid afterwards.
pub fn render(capture: &Capture) -> String {
    let mut out = TextBuffer::new();

    if capture.info == CaptureInfo::UnsupportedPlatform {
        out.append(format_args!("stacktrace: unsupported platform\n"));
        return out.finish();
    }

    for frame in &capture.frames {
        render_frame(&mut out, frame);
    }
    out.finish()
}

/// Captures and renders in one step, discarding the intermediate
/// capture.
#[inline(never)]
pub fn render_current() -> String {
    render(&capture())
}

fn render_frame(out: &mut TextBuffer, frame: &StackFrame) {
    match frame.resolution {
        Resolution::Symbolized => {
            let symbol = frame.function.as_deref().unwrap_or("unknown symbol");
            match frame.source_file.as_deref().or_else(|| frame.module.as_deref()) {
                Some(location) => out.append(format_args!(
                    "{}({}): {}\n",
                    location,
                    frame.source_line.unwrap_or(0),
                    symbol,
                )),
                None => out.append(format_args!("{:#x}: {}\n", frame.instruction, symbol)),
            }
        }
        Resolution::Unknown => match frame.module.as_deref() {
            Some(module) => out.append(format_args!(
                "{}: unknown symbol @ {:#x}\n",
                module, frame.instruction
            )),
            None => out.append(format_args!("{:#x}: unknown symbol\n", frame.instruction)),
        },
        Resolution::Stopped => match frame.module.as_deref() {
            Some(module) => out.append(format_args!("{}: trace generation stopped\n", module)),
            None => out.append(format_args!(
                "{:#x}: trace generation stopped\n",
                frame.instruction
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved_frame() -> StackFrame {
        StackFrame {
            instruction: 0x401234,
            module: Some("/usr/bin/app".into()),
            source_file: Some("/src/app.c".into()),
            source_line: Some(42),
            function: Some("main".into()),
            resolution: Resolution::Symbolized,
        }
    }

    #[test]
    fn resolved_frame_renders_file_line_symbol() {
        let capture = Capture {
            frames: vec![resolved_frame()],
            info: CaptureInfo::Ok,
        };
        assert_eq!(render(&capture), "/src/app.c(42): main\n");
    }

    #[test]
    fn missing_line_renders_as_zero() {
        let mut frame = resolved_frame();
        frame.source_file = None;
        frame.source_line = None;
        let capture = Capture {
            frames: vec![frame],
            info: CaptureInfo::Ok,
        };
        assert_eq!(render(&capture), "/usr/bin/app(0): main\n");
    }

    #[test]
    fn unresolved_frame_renders_placeholder_and_address() {
        let mut frame = StackFrame::unresolved(0x7f2a1c004511);
        frame.module = Some("module.so".into());
        let capture = Capture {
            frames: vec![frame, StackFrame::unresolved(0xdeadbeef)],
            info: CaptureInfo::Ok,
        };
        assert_eq!(
            render(&capture),
            "module.so: unknown symbol @ 0x7f2a1c004511\n0xdeadbeef: unknown symbol\n"
        );
    }

    #[test]
    fn stopped_frame_renders_fixed_marker() {
        let mut frame = StackFrame::unresolved(0x1000);
        frame.resolution = Resolution::Stopped;
        let capture = Capture {
            frames: vec![frame],
            info: CaptureInfo::Ok,
        };
        assert_eq!(render(&capture), "0x1000: trace generation stopped\n");
    }

    #[test]
    fn unsupported_platform_renders_single_fixed_line() {
        let capture = Capture {
            frames: Vec::new(),
            info: CaptureInfo::UnsupportedPlatform,
        };
        assert_eq!(render(&capture), "stacktrace: unsupported platform\n");
        assert_eq!(capture.depth(), 0);
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
    #[test]
    fn unsupported_platform_report_is_the_whole_output() {
        assert_eq!(render_current(), "stacktrace: unsupported platform\n");
    }
}
