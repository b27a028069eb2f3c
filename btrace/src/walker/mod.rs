// Copyright 2020 the btrace project developers. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Enumerates raw return addresses for the calling thread.
//!
//! Exactly one backend is compiled in per target; there is no runtime
//! selection. Every backend writes into a fixed-size record so the walk
//! itself never touches the heap, which matters when the walk runs
//! under a fault handler whose allocator state is suspect.

use crate::frame::CaptureInfo;

#[cfg(any(target_os = "linux", target_os = "macos"))]
mod unix;
#[cfg(any(target_os = "linux", target_os = "macos"))]
pub(crate) use unix::walk_current;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub(crate) use windows::walk_current;

#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
mod unsupported;
#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
pub(crate) use unsupported::walk_current;

/// Upper bound on recorded frames. Walks that reach it are cut short
/// and flagged [`CaptureInfo::Truncated`].
#[cfg(target_os = "linux")]
pub const MAX_FRAMES: usize = 1024;
/// Upper bound on recorded frames. Walks that reach it are cut short
/// and flagged [`CaptureInfo::Truncated`].
#[cfg(target_os = "macos")]
pub const MAX_FRAMES: usize = 128;
/// Upper bound on recorded frames. Walks that reach it are cut short
/// and flagged [`CaptureInfo::Truncated`].
#[cfg(windows)]
pub const MAX_FRAMES: usize = 256;
/// Upper bound on recorded frames. This target has no walker, so
/// captures are always empty.
#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
pub const MAX_FRAMES: usize = 0;

/// Library-internal frames sitting between the platform's collection
/// call and the caller of `capture`. The walk drops these so that the
/// first recorded frame is the caller's.
#[cfg(any(target_os = "linux", target_os = "macos", windows))]
const SKIP_FRAMES: usize = 2;

/// The raw outcome of one walk: up to [`MAX_FRAMES`] return addresses
/// and the termination status.
pub(crate) struct RawCapture {
    addrs: [usize; MAX_FRAMES],
    len: usize,
    pub info: CaptureInfo,
}

impl RawCapture {
    pub(crate) fn empty(info: CaptureInfo) -> RawCapture {
        RawCapture {
            addrs: [0; MAX_FRAMES],
            len: 0,
            info,
        }
    }

    /// Records one more return address. Callers check the bound first.
    #[cfg(any(target_os = "linux", target_os = "macos", windows))]
    fn push(&mut self, addr: usize) {
        self.addrs[self.len] = addr;
        self.len += 1;
    }

    #[cfg(windows)]
    fn is_full(&self) -> bool {
        self.len == MAX_FRAMES
    }

    /// The recorded addresses, innermost first.
    pub(crate) fn addresses(&self) -> &[usize] {
        &self.addrs[..self.len]
    }
}
