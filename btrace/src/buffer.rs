// Copyright 2020 the btrace project developers. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! An append-only text buffer that grows by doubling.
//!
//! Reports are assembled without knowing their final size up front, so
//! every append first measures the formatted text with a dry-run pass
//! and only then commits it, doubling the backing capacity as needed.

use std::fmt::{self, Write};

/// Size of the initial allocation, and the unit every later capacity is
/// a power-of-two multiple of.
const INITIAL_CAPACITY: usize = 1024;

pub(crate) struct TextBuffer {
    storage: String,
}

/// Measures how many bytes a format invocation would produce.
struct CountingWriter(usize);

impl fmt::Write for CountingWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0 += s.len();
        Ok(())
    }
}

impl TextBuffer {
    pub fn new() -> TextBuffer {
        TextBuffer {
            storage: String::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Appends formatted text, growing the buffer first if it would not
    /// fit. Growth doubles the capacity until the new content fits;
    /// content written earlier is preserved across the reallocation. If
    /// the allocator cannot satisfy the request the process aborts.
    pub fn append(&mut self, args: fmt::Arguments<'_>) {
        let mut counter = CountingWriter(0);
        // Counting never fails.
        let _ = counter.write_fmt(args);
        let needed = self.storage.len() + counter.0;

        if needed > self.storage.capacity() {
            let mut target = self.storage.capacity().max(INITIAL_CAPACITY);
            while target < needed {
                target *= 2;
            }
            self.storage.reserve_exact(target - self.storage.len());
        }

        // Formatting into a String cannot fail.
        let _ = self.storage.write_fmt(args);
    }

    /// Hands the accumulated text to the caller.
    pub fn finish(self) -> String {
        self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty_with_initial_capacity() {
        let buf = TextBuffer::new();
        assert_eq!(buf.storage.len(), 0);
        assert_eq!(buf.storage.capacity(), INITIAL_CAPACITY);
    }

    #[test]
    fn append_advances_by_formatted_length() {
        let mut buf = TextBuffer::new();
        buf.append(format_args!("{}({}): {}\n", "file.rs", 12, "main"));
        assert_eq!(buf.storage.len(), "file.rs(12): main\n".len());
        buf.append(format_args!("{:#x}\n", 0x7f2a1c004511u64));
        assert_eq!(buf.finish(), "file.rs(12): main\n0x7f2a1c004511\n");
    }

    #[test]
    fn growth_doubles_until_content_fits() {
        let mut buf = TextBuffer::new();
        let line = "x".repeat(600);
        buf.append(format_args!("{}", line));
        assert_eq!(buf.storage.capacity(), INITIAL_CAPACITY);

        // A second 600-byte line exceeds 1024, forcing one doubling.
        buf.append(format_args!("{}", line));
        assert_eq!(buf.storage.capacity(), 2 * INITIAL_CAPACITY);
        assert_eq!(buf.storage.len(), 1200);
    }

    #[test]
    fn oversized_append_doubles_repeatedly() {
        let mut buf = TextBuffer::new();
        let big = "y".repeat(5000);
        buf.append(format_args!("{}", big));

        let cap = buf.storage.capacity();
        assert!(cap >= 5000);
        assert_eq!(cap % INITIAL_CAPACITY, 0);
        assert!((cap / INITIAL_CAPACITY).is_power_of_two());
    }

    #[test]
    fn growth_preserves_prior_content() {
        let mut buf = TextBuffer::new();
        buf.append(format_args!("first line\n"));
        let big = "z".repeat(4096);
        buf.append(format_args!("{}", big));

        let out = buf.finish();
        assert!(out.starts_with("first line\n"));
        assert_eq!(out.len(), "first line\n".len() + 4096);
    }
}
