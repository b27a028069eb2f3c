// Copyright 2020 the btrace project developers. See the COPYRIGHT
// file at the top-level directory of this distribution.

use btrace::{render, Capture, CaptureInfo, MAX_FRAMES};

#[ctor::ctor]
fn init_logging() {
    env_logger::builder().is_test(true).init();
}

/// Calls itself `depth` times before capturing, so the capture's top
/// frames are a known chain.
#[inline(never)]
fn chain(depth: usize) -> Capture {
    if depth == 0 {
        btrace::capture()
    } else {
        std::hint::black_box(chain(depth - 1))
    }
}

#[test]
fn capture_is_nonempty_and_bounded() {
    let stack = chain(0);
    assert!(stack.depth() > 0);
    assert!(stack.depth() <= MAX_FRAMES);
    assert_eq!(stack.info, CaptureInfo::Ok);
}

#[test]
fn deeper_chains_capture_more_frames_innermost_first() {
    let shallow = chain(0);
    let deep = chain(3);

    // Three more active calls, three more frames, at the top.
    assert_eq!(deep.depth(), shallow.depth() + 3);

    // Below the frames that differ, both captures see the same stack.
    let common = shallow.depth().saturating_sub(2);
    let shallow_tail = &shallow.frames[shallow.depth() - common..];
    let deep_tail = &deep.frames[deep.depth() - common..];
    for (a, b) in shallow_tail.iter().zip(deep_tail) {
        assert_eq!(a.instruction, b.instruction);
    }
}

#[test]
fn over_deep_chain_truncates_at_the_bound() {
    let stack = chain(MAX_FRAMES + 100);
    assert_eq!(stack.depth(), MAX_FRAMES);
    assert_eq!(stack.info, CaptureInfo::Truncated);
}

#[test]
fn render_emits_one_line_per_frame() {
    let stack = chain(2);
    let report = render(&stack);
    assert!(report.ends_with('\n'));
    assert_eq!(report.lines().count(), stack.depth());
}

#[test]
fn render_is_idempotent() {
    let stack = chain(1);
    let first = render(&stack);
    let second = render(&stack);
    assert_eq!(first, second);

    // The capture is still usable afterwards.
    assert!(stack.depth() > 0);
}

#[test]
fn render_current_produces_a_report() {
    let report = btrace::render_current();
    assert!(report.ends_with('\n'));
    assert!(!report.is_empty());
}
