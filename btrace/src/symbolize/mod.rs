// Copyright 2020 the btrace project developers. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Maps raw return addresses to module/file/line/symbol information.
//!
//! One resolution strategy is compiled in per target. Per-address
//! failures never fail a capture: whatever cannot be resolved is kept
//! as a marked, raw-address frame.

#[cfg(target_os = "linux")]
mod addr2line;
#[cfg(target_os = "linux")]
pub(crate) use addr2line::resolve;

#[cfg(target_os = "macos")]
mod dladdr;
#[cfg(target_os = "macos")]
pub(crate) use dladdr::resolve;

#[cfg(windows)]
mod dbghelp;
#[cfg(windows)]
pub(crate) use dbghelp::{ensure_symbol_db, resolve};

#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
pub(crate) fn resolve(_raw: &crate::walker::RawCapture) -> Vec<crate::frame::StackFrame> {
    Vec::new()
}

/// Why a batch of addresses could not be pushed through the external
/// resolution tool. Absorbed into per-frame markers; callers of the
/// public API never see it.
#[cfg(target_os = "linux")]
#[derive(Debug, thiserror::Error)]
pub(crate) enum SymbolError {
    #[error("could not run the address resolution tool: {0}")]
    ToolUnavailable(#[from] std::io::Error),
    #[error("the address resolution tool exited with {0}")]
    ToolFailed(std::process::ExitStatus),
}
