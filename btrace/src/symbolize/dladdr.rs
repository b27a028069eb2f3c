// Copyright 2020 the btrace project developers. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Direct resolution through the dynamic loader's `dladdr`.
//!
//! The loader's own tables are the symbol database here; they carry the
//! nearest enclosing symbol and the module path, but no source lines,
//! so line numbers stay absent on this backend.

use std::ffi::CStr;
use std::mem;

use tracing::trace;

use crate::frame::{Resolution, StackFrame};
use crate::walker::RawCapture;

pub(crate) fn resolve(raw: &RawCapture) -> Vec<StackFrame> {
    let frames: Vec<StackFrame> = raw
        .addresses()
        .iter()
        .map(|&addr| resolve_one(addr))
        .collect();
    trace!(
        "symbolize: {} of {} frames resolved",
        frames.iter().filter(|f| f.is_resolved()).count(),
        frames.len()
    );
    frames
}

fn resolve_one(addr: usize) -> StackFrame {
    let mut frame = StackFrame::unresolved(addr as u64);

    let mut info: libc::Dl_info = unsafe { mem::zeroed() };
    // SAFETY: dladdr only inspects the address and fills `info`.
    let rc = unsafe { libc::dladdr(addr as *const libc::c_void, &mut info) };
    if rc == 0 {
        return frame;
    }

    if !info.dli_fname.is_null() {
        // SAFETY: dladdr yielded a NUL-terminated path owned by the
        // loader.
        frame.module = Some(
            unsafe { CStr::from_ptr(info.dli_fname) }
                .to_string_lossy()
                .into_owned(),
        );
    }
    if !info.dli_sname.is_null() {
        // SAFETY: likewise for the symbol name.
        frame.function = Some(
            unsafe { CStr::from_ptr(info.dli_sname) }
                .to_string_lossy()
                .into_owned(),
        );
        frame.resolution = Resolution::Symbolized;
    }

    frame
}
