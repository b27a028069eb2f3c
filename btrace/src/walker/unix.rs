// Copyright 2020 the btrace project developers. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Address collection through the `backtrace(3)` facility.

use libc::{c_int, c_void};
use tracing::trace;

use super::{RawCapture, MAX_FRAMES, SKIP_FRAMES};
use crate::frame::CaptureInfo;

/// Collects raw return addresses for the calling thread, innermost
/// first, dropping this library's own frames.
#[inline(never)]
pub(crate) fn walk_current() -> RawCapture {
    let mut scratch = [std::ptr::null_mut::<c_void>(); MAX_FRAMES + SKIP_FRAMES];

    // SAFETY: backtrace writes at most `scratch.len()` entries and
    // reads nothing else.
    let captured = unsafe { libc::backtrace(scratch.as_mut_ptr(), scratch.len() as c_int) };
    let captured = captured.max(0) as usize;

    let mut raw = RawCapture::empty(CaptureInfo::Ok);
    if captured == scratch.len() {
        raw.info = CaptureInfo::Truncated;
    }

    for &addr in scratch[..captured].iter().skip(SKIP_FRAMES) {
        let addr = addr as usize;
        if addr == 0 {
            // Bottom of the call stack.
            break;
        }
        raw.push(addr);
    }

    trace!(
        "walk: kept {} of {} raw frames ({:?})",
        raw.len,
        captured,
        raw.info
    );
    raw
}
