// Copyright 2020 the btrace project developers. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Direct resolution through the DbgHelp symbol database.

use std::ffi::CStr;
use std::mem;
use std::ptr;
use std::sync::Once;

use tracing::trace;
use windows_sys::Win32::System::Diagnostics::Debug::{
    SymGetLineFromAddr64, SymGetSymFromAddr64, SymInitialize, IMAGEHLP_LINE64, IMAGEHLP_SYMBOL64,
};
use windows_sys::Win32::System::Threading::GetCurrentProcess;

use crate::frame::{Resolution, StackFrame};
use crate::walker::RawCapture;

/// Longest symbol name DbgHelp is asked to copy out.
const MAX_SYMBOL_LEN: usize = 1024;

static SYMBOL_DB_INIT: Once = Once::new();

/// Builds the process-wide DbgHelp symbol database on first use.
///
/// Initialization enumerates every loaded module and is expensive, so
/// it runs at most once per process and is never torn down; the callers
/// that need it most are usually about to terminate anyway.
pub(crate) fn ensure_symbol_db() {
    SYMBOL_DB_INIT.call_once(|| {
        // SAFETY: the pseudo-handle is always valid; a null search path
        // selects the default symbol locations, and TRUE asks DbgHelp
        // to enumerate the process's modules itself.
        unsafe {
            SymInitialize(GetCurrentProcess(), ptr::null(), 1);
        }
    });
}

/// `IMAGEHLP_SYMBOL64` with its variable-length name tail.
#[repr(C)]
struct SymbolBuffer {
    symbol: IMAGEHLP_SYMBOL64,
    name_tail: [u8; MAX_SYMBOL_LEN],
}

pub(crate) fn resolve(raw: &RawCapture) -> Vec<StackFrame> {
    ensure_symbol_db();
    // SAFETY: the pseudo-handle is always valid.
    let process = unsafe { GetCurrentProcess() };

    let frames: Vec<StackFrame> = raw
        .addresses()
        .iter()
        .map(|&addr| resolve_one(process, addr as u64))
        .collect();
    trace!(
        "symbolize: {} of {} frames resolved",
        frames.iter().filter(|f| f.is_resolved()).count(),
        frames.len()
    );
    frames
}

fn resolve_one(process: isize, addr: u64) -> StackFrame {
    let mut frame = StackFrame::unresolved(addr);

    let mut line: IMAGEHLP_LINE64 = unsafe { mem::zeroed() };
    line.SizeOfStruct = mem::size_of::<IMAGEHLP_LINE64>() as u32;
    let mut line_displacement = 0u32;
    // SAFETY: `line` is writable and carries its own size.
    let have_line =
        unsafe { SymGetLineFromAddr64(process, addr, &mut line_displacement, &mut line) } != 0;
    if have_line {
        if !line.FileName.is_null() {
            // SAFETY: DbgHelp yielded a NUL-terminated path that stays
            // valid until the next Sym* call on this thread.
            frame.source_file = Some(
                unsafe { CStr::from_ptr(line.FileName.cast()) }
                    .to_string_lossy()
                    .into_owned(),
            );
        }
        frame.source_line = Some(line.LineNumber);
    }

    let mut buffer: SymbolBuffer = unsafe { mem::zeroed() };
    buffer.symbol.SizeOfStruct = mem::size_of::<IMAGEHLP_SYMBOL64>() as u32;
    buffer.symbol.MaxNameLength = MAX_SYMBOL_LEN as u32;
    let mut sym_displacement = 0u64;
    // SAFETY: the buffer reserves MaxNameLength bytes past the struct
    // for the name, as the API requires.
    let have_symbol =
        unsafe { SymGetSymFromAddr64(process, addr, &mut sym_displacement, &mut buffer.symbol) }
            != 0;
    if have_symbol {
        // SAFETY: DbgHelp NUL-terminates the name it copied in.
        frame.function = Some(
            unsafe { CStr::from_ptr(buffer.symbol.Name.as_ptr().cast()) }
                .to_string_lossy()
                .into_owned(),
        );
        frame.resolution = Resolution::Symbolized;
    }

    frame
}
