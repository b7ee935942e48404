use log::info;

/// Backing store of the monitor output buffer; one byte stays reserved, and
/// a full buffer stops accepting bytes, terminators included.
pub const BUFFER_SIZE: usize = 0x10000;

const CAPACITY: usize = BUFFER_SIZE - 1;

/// Line-buffering sink for the byte stream privileged firmware writes to its
/// serial monitor port. Completed lines go to the diagnostic channel and are
/// handed back to the caller.
pub struct SerialMonitor {
    buf: Vec<u8>,
    line: String,
}

impl Default for SerialMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialMonitor {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            line: String::new(),
        }
    }

    /// Accept one byte from the firmware.
    ///
    /// A full buffer drops the byte, terminators included. A terminator on an
    /// empty buffer is dropped too, suppressing leading blank lines. A
    /// terminator otherwise flushes: the accumulated line is reported and
    /// returned, and the cursor resets.
    pub fn push(&mut self, byte: u8) -> Option<&str> {
        if self.buf.len() >= CAPACITY {
            return None;
        }
        if byte == b'\r' || byte == b'\n' {
            if self.buf.is_empty() {
                return None;
            }
            self.line = String::from_utf8_lossy(&self.buf).into_owned();
            self.buf.clear();
            info!("hypervisor serial output: \"{}\"", self.line);
            return Some(&self.line);
        }
        self.buf.push(byte);
        None
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminator_flushes_the_accumulated_line() {
        let mut sink = SerialMonitor::new();
        assert_eq!(sink.push(b'H'), None);
        assert_eq!(sink.push(b'i'), None);
        assert_eq!(sink.push(b'\r'), Some("Hi"));
        assert!(sink.is_empty());
    }

    #[test]
    fn leading_terminators_are_suppressed() {
        let mut sink = SerialMonitor::new();
        assert_eq!(sink.push(b'\r'), None);
        assert_eq!(sink.push(b'\n'), None);
        assert!(sink.is_empty());
    }

    #[test]
    fn lf_terminates_like_cr() {
        let mut sink = SerialMonitor::new();
        sink.push(b'o');
        sink.push(b'k');
        assert_eq!(sink.push(b'\n'), Some("ok"));
    }

    #[test]
    fn consecutive_lines_reuse_the_buffer() {
        let mut sink = SerialMonitor::new();
        sink.push(b'a');
        assert_eq!(sink.push(b'\r'), Some("a"));
        // CR+LF: the LF lands on an empty buffer and vanishes.
        assert_eq!(sink.push(b'\n'), None);
        sink.push(b'b');
        assert_eq!(sink.push(b'\n'), Some("b"));
    }

    #[test]
    fn overflow_bytes_are_dropped_silently() {
        let mut sink = SerialMonitor::new();
        for _ in 0..CAPACITY {
            sink.push(b'x');
        }
        // The buffer is full now; data and terminators alike are swallowed.
        assert_eq!(sink.push(b'y'), None);
        assert_eq!(sink.push(b'\r'), None);
    }

    #[test]
    fn non_utf8_bytes_degrade_lossily() {
        let mut sink = SerialMonitor::new();
        sink.push(0xFF);
        sink.push(b'!');
        let line = sink.push(b'\r').expect("line should flush");
        assert!(line.ends_with('!'));
    }
}
