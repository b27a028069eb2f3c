// Copyright 2020 the btrace project developers. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Batch resolution through the `addr2line` tool.
//!
//! `dladdr` identifies each address's containing module and load base;
//! every unique module then gets one `addr2line` invocation covering
//! all of its addresses, and the tool's line-oriented output is read
//! back into the capture. If the tool cannot be spawned at all, the
//! frames that still lack symbols are marked stopped and the capture
//! is returned as-is; partial results beat no results.

use std::ffi::CStr;
use std::mem;
use std::process::{Command, Stdio};

use tracing::{trace, warn};

use super::SymbolError;
use crate::frame::{Resolution, StackFrame};
use crate::walker::RawCapture;

/// Load address of non-relocated executables. An address whose module
/// is based here is already relative as far as the tool is concerned.
/// Position-independent mains never have this base, so the check is
/// inert under address-space randomization.
const FIXED_EXEC_BASE: usize = 0x400000;

struct ModuleHit {
    path: String,
    base: usize,
}

/// Looks up the module containing `addr` in the dynamic loader's
/// tables.
fn module_for(addr: usize) -> Option<ModuleHit> {
    let mut info: libc::Dl_info = unsafe { mem::zeroed() };
    // SAFETY: dladdr only inspects the address and fills `info`.
    let rc = unsafe { libc::dladdr(addr as *const libc::c_void, &mut info) };
    if rc == 0 || info.dli_fname.is_null() {
        return None;
    }
    // SAFETY: dladdr yielded a NUL-terminated path owned by the loader.
    let path = unsafe { CStr::from_ptr(info.dli_fname) }
        .to_string_lossy()
        .into_owned();
    Some(ModuleHit {
        path,
        base: info.dli_fbase as usize,
    })
}

fn tool_relative(addr: usize, base: usize) -> usize {
    if base == FIXED_EXEC_BASE {
        addr
    } else {
        addr - base
    }
}

/// Runs `addr2line` once over every given address of one module and
/// returns its output lines.
fn run_tool(module: &str, addrs: &[usize]) -> Result<Vec<String>, SymbolError> {
    let mut cmd = Command::new("addr2line");
    cmd.arg("-e").arg(module).args(["-f", "-C", "-p"]);
    for &addr in addrs {
        cmd.arg(format!("{:#x}", addr));
    }
    let output = cmd
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .map_err(SymbolError::ToolUnavailable)?;
    if !output.status.success() {
        return Err(SymbolError::ToolFailed(output.status));
    }
    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_owned)
        .collect())
}

/// Parses one `addr2line -f -C -p` output line into
/// `(function, file, line)`. Anything unexpected counts as unresolved.
fn parse_line(line: &str) -> Option<(String, Option<String>, Option<u32>)> {
    // "main at /src/app.c:42", or "?? ??:0" when nothing matched.
    if line.starts_with("??") {
        return None;
    }
    let (function, location) = line.split_once(" at ")?;
    if function.is_empty() {
        return None;
    }
    // Inlining annotations trail in parentheses.
    let location = location.split(" (").next().unwrap_or(location);
    let (file, lineno) = location.rsplit_once(':')?;
    if file.starts_with("??") {
        return Some((function.to_owned(), None, None));
    }
    let lineno = lineno.parse::<u32>().ok().filter(|&n| n != 0);
    Some((function.to_owned(), Some(file.to_owned()), lineno))
}

pub(crate) fn resolve(raw: &RawCapture) -> Vec<StackFrame> {
    let addrs = raw.addresses();
    let mut frames: Vec<StackFrame> = addrs
        .iter()
        .map(|&addr| StackFrame::unresolved(addr as u64))
        .collect();

    // Group frame indices by containing module, first-seen order.
    let mut groups: Vec<(String, usize, Vec<usize>)> = Vec::new();
    for (idx, &addr) in addrs.iter().enumerate() {
        let hit = match module_for(addr) {
            Some(hit) => hit,
            None => continue,
        };
        frames[idx].module = Some(hit.path.clone());
        match groups.iter_mut().find(|(path, _, _)| *path == hit.path) {
            Some((_, _, indices)) => indices.push(idx),
            None => groups.push((hit.path, hit.base, vec![idx])),
        }
    }

    let mut stopped = false;
    for (module, base, indices) in &groups {
        if stopped {
            for &idx in indices {
                frames[idx].resolution = Resolution::Stopped;
            }
            continue;
        }

        let tool_addrs: Vec<usize> = indices
            .iter()
            .map(|&idx| tool_relative(addrs[idx], *base))
            .collect();
        trace!("symbolize: {} addresses in {}", tool_addrs.len(), module);

        match run_tool(module, &tool_addrs) {
            Ok(lines) => {
                for (&idx, line) in indices.iter().zip(lines.iter()) {
                    if let Some((function, file, lineno)) = parse_line(line) {
                        frames[idx].function = Some(function);
                        frames[idx].source_file = file;
                        frames[idx].source_line = lineno;
                        frames[idx].resolution = Resolution::Symbolized;
                    }
                }
            }
            Err(SymbolError::ToolUnavailable(err)) => {
                warn!("symbolize: cannot spawn addr2line: {}", err);
                for &idx in indices {
                    frames[idx].resolution = Resolution::Stopped;
                }
                stopped = true;
            }
            Err(err @ SymbolError::ToolFailed(_)) => {
                // The tool ran but rejected this module; its frames stay
                // unresolved and other modules still get their shot.
                warn!("symbolize: {} ({})", err, module);
            }
        }
    }

    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fully_resolved_line() {
        let parsed = parse_line("main at /src/app.c:42").unwrap();
        assert_eq!(parsed.0, "main");
        assert_eq!(parsed.1.as_deref(), Some("/src/app.c"));
        assert_eq!(parsed.2, Some(42));
    }

    #[test]
    fn parses_function_without_location() {
        let parsed = parse_line("frob_widget at ??:0").unwrap();
        assert_eq!(parsed.0, "frob_widget");
        assert_eq!(parsed.1, None);
        assert_eq!(parsed.2, None);
    }

    #[test]
    fn strips_inline_annotation() {
        let parsed = parse_line("inner at /src/app.c:10 (inlined by outer)").unwrap();
        assert_eq!(parsed.1.as_deref(), Some("/src/app.c"));
        assert_eq!(parsed.2, Some(10));
    }

    #[test]
    fn unknown_markers_are_unresolved() {
        assert!(parse_line("?? ??:0").is_none());
        assert!(parse_line("?? at ??:0").is_none());
        assert!(parse_line("").is_none());
        assert!(parse_line("garbage with no separator").is_none());
    }

    #[test]
    fn zero_line_number_is_absent() {
        let parsed = parse_line("start at /src/crt.c:0").unwrap();
        assert_eq!(parsed.2, None);
    }

    #[test]
    fn own_function_has_a_module() {
        let hit = module_for(resolve as usize).expect("test binary not found");
        assert!(!hit.path.is_empty());
    }

    #[test]
    fn synthetic_address_has_no_module() {
        assert!(module_for(0x10).is_none());
    }

    #[test]
    fn fixed_base_addresses_are_not_adjusted() {
        assert_eq!(tool_relative(0x401234, FIXED_EXEC_BASE), 0x401234);
        assert_eq!(tool_relative(0x7f00_0000_1234, 0x7f00_0000_0000), 0x1234);
    }
}
