// Copyright 2020 the btrace project developers. See the COPYRIGHT
// file at the top-level directory of this distribution.

use super::RawCapture;
use crate::frame::CaptureInfo;

/// There is no unwinder for this target; the capture stays empty and
/// says so, rather than failing the caller.
pub(crate) fn walk_current() -> RawCapture {
    RawCapture::empty(CaptureInfo::UnsupportedPlatform)
}
