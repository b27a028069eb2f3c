// Copyright 2020 the btrace project developers. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Address collection through `RtlCaptureContext` and `StackWalk64`.

use std::mem;

use tracing::trace;
use windows_sys::Win32::Foundation::GetLastError;
use windows_sys::Win32::System::Diagnostics::Debug::{
    AddrModeFlat, RtlCaptureContext, StackWalk64, SymFunctionTableAccess64, SymGetModuleBase64,
    CONTEXT, STACKFRAME64,
};
use windows_sys::Win32::System::SystemInformation::{
    IMAGE_FILE_MACHINE_AMD64, IMAGE_FILE_MACHINE_I386,
};
use windows_sys::Win32::System::Threading::{GetCurrentProcess, GetCurrentThread};

use super::{RawCapture, SKIP_FRAMES};
use crate::frame::CaptureInfo;
use crate::symbolize::ensure_symbol_db;

/// Walks the calling thread's stack frame by frame, innermost first,
/// dropping this library's own frames.
///
/// The walk ends when `StackWalk64` reports it cannot continue, when a
/// zero return address marks the bottom of the stack, when the frame
/// bound is hit, or when a frame's program counter equals its own
/// return address (an overflowed or corrupted stack; walking on would
/// loop forever).
#[inline(never)]
pub(crate) fn walk_current() -> RawCapture {
    // StackWalk64 consults the module table built by the symbol
    // database initialization.
    ensure_symbol_db();

    // SAFETY: both pseudo-handles are valid for the life of the process.
    let process = unsafe { GetCurrentProcess() };
    let thread = unsafe { GetCurrentThread() };

    let mut context: CONTEXT = unsafe { mem::zeroed() };
    // SAFETY: the context is writable and properly aligned.
    unsafe { RtlCaptureContext(&mut context) };

    let mut frame: STACKFRAME64 = unsafe { mem::zeroed() };
    #[cfg(target_arch = "x86")]
    let image_type = {
        frame.AddrPC.Offset = context.Eip as u64;
        frame.AddrPC.Mode = AddrModeFlat;
        frame.AddrFrame.Offset = context.Ebp as u64;
        frame.AddrFrame.Mode = AddrModeFlat;
        frame.AddrStack.Offset = context.Esp as u64;
        frame.AddrStack.Mode = AddrModeFlat;
        IMAGE_FILE_MACHINE_I386
    };
    #[cfg(target_arch = "x86_64")]
    let image_type = {
        frame.AddrPC.Offset = context.Rip;
        frame.AddrPC.Mode = AddrModeFlat;
        frame.AddrFrame.Offset = context.Rsp;
        frame.AddrFrame.Mode = AddrModeFlat;
        frame.AddrStack.Offset = context.Rsp;
        frame.AddrStack.Mode = AddrModeFlat;
        IMAGE_FILE_MACHINE_AMD64
    };

    let mut raw = RawCapture::empty(CaptureInfo::Ok);
    let mut skipped = 0;

    loop {
        // SAFETY: frame and context stay alive and exclusive for the
        // duration of the call; the table-access and module-base
        // callbacks are the DbgHelp-provided defaults.
        let ok = unsafe {
            StackWalk64(
                image_type as u32,
                process,
                thread,
                &mut frame,
                &mut context as *mut CONTEXT as *mut _,
                None,
                Some(SymFunctionTableAccess64),
                Some(SymGetModuleBase64),
                None,
            )
        };
        if ok == 0 {
            // SAFETY: trivially safe thread-local read.
            let err = unsafe { GetLastError() };
            trace!("walk: StackWalk64 stopped, error {}", err);
            break;
        }

        if frame.AddrPC.Offset == frame.AddrReturn.Offset {
            raw.info = CaptureInfo::Overflowed;
            break;
        }

        if skipped < SKIP_FRAMES {
            skipped += 1;
        } else {
            if raw.is_full() {
                raw.info = CaptureInfo::Truncated;
                break;
            }
            raw.push(frame.AddrPC.Offset as usize);
        }

        if frame.AddrReturn.Offset == 0 {
            // Bottom of the call stack.
            break;
        }
    }

    trace!("walk: kept {} frames ({:?})", raw.addresses().len(), raw.info);
    raw
}
