// Copyright 2020 the btrace project developers. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! The result of one stack capture, prior to rendering.

/// How well symbol lookup went for a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolution {
    /// A symbol (and possibly file/line) was found for the address.
    Symbolized,
    /// No loaded module or symbol covers the address.
    Unknown,
    /// The external resolution tool could not be run; this frame and
    /// everything after it were left unresolved.
    Stopped,
}

/// One entry of a captured stack, resolved as far as the platform allowed.
///
/// Immutable once produced by [`capture`][crate::capture].
#[derive(Debug, Clone)]
pub struct StackFrame {
    /// The raw return address recorded during the walk.
    pub instruction: u64,
    /// Path of the loaded module containing `instruction`, if any.
    pub module: Option<String>,
    /// Source file of the enclosing line record, if known.
    pub source_file: Option<String>,
    /// Source line, if known. Renders as `0` when absent.
    pub source_line: Option<u32>,
    /// Name of the enclosing function or symbol, if known.
    pub function: Option<String>,
    pub(crate) resolution: Resolution,
}

impl StackFrame {
    /// A frame for which no symbol information could be found.
    pub(crate) fn unresolved(instruction: u64) -> StackFrame {
        StackFrame {
            instruction,
            module: None,
            source_file: None,
            source_line: None,
            function: None,
            resolution: Resolution::Unknown,
        }
    }

    /// Whether a symbol was found for this frame.
    pub fn is_resolved(&self) -> bool {
        self.resolution == Resolution::Symbolized
    }
}

/// Metadata describing how a capture's walk terminated.
///
/// None of these are errors; a capture is usable in every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureInfo {
    /// The walk reached the bottom of the call stack.
    Ok,
    /// The walk hit the maximum frame bound and was cut short.
    Truncated,
    /// A frame's program counter equaled its own return address, which
    /// only happens when the stack has overflowed or been corrupted.
    /// The walk stopped at that frame instead of looping.
    Overflowed,
    /// No walker exists for this platform; the capture is empty.
    UnsupportedPlatform,
}

/// A bounded, ordered stack capture for the calling thread.
///
/// Frame 0 is the immediate caller of [`capture`][crate::capture]; the
/// last frame is the outermost caller the walker could reach. The
/// capture is a plain value: dropping it releases everything.
#[derive(Debug, Clone)]
pub struct Capture {
    /// The resolved frames, innermost first.
    pub frames: Vec<StackFrame>,
    /// How the walk terminated.
    pub info: CaptureInfo,
}

impl Capture {
    /// The number of frames held.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}
