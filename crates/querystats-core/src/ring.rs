//! Reserved event ring buffer.
//!
//! A fixed-size circular byte buffer with independent read/write cursors
//! that wrap modulo the capacity. Nothing on the recording path produces
//! events into it yet; it is sized at init and reset alongside the table as
//! reserved capacity for a future raw-event stream, so what matters today
//! is that the cursor arithmetic is wrap-safe and refuses to overwrite
//! unread data.

/// Fixed-capacity circular byte buffer.
#[derive(Debug)]
pub struct EventRingBuffer {
    buf: Vec<u8>,
    write_pos: usize,
    read_pos: usize,
    /// Bytes written but not yet read; disambiguates full from empty when
    /// the cursors coincide.
    used: usize,
}

impl EventRingBuffer {
    /// Creates a buffer of exactly `size` bytes, zero-filled.
    pub fn new(size: usize) -> Self {
        Self {
            buf: vec![0; size],
            write_pos: 0,
            read_pos: 0,
            used: 0,
        }
    }

    /// Total capacity, bytes.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes written but not yet read.
    pub fn len(&self) -> usize {
        self.used
    }

    /// True when no unread bytes remain.
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Appends `bytes` at the write cursor, wrapping past the end of the
    /// buffer. Returns false and leaves the buffer untouched when the
    /// payload would overwrite unread data.
    pub fn write(&mut self, bytes: &[u8]) -> bool {
        if bytes.is_empty() {
            return true;
        }
        if bytes.len() > self.capacity() - self.used {
            return false;
        }
        let cap = self.capacity();
        let first = bytes.len().min(cap - self.write_pos);
        self.buf[self.write_pos..self.write_pos + first].copy_from_slice(&bytes[..first]);
        self.buf[..bytes.len() - first].copy_from_slice(&bytes[first..]);
        self.write_pos = (self.write_pos + bytes.len()) % cap;
        self.used += bytes.len();
        true
    }

    /// Consumes up to `max_len` unread bytes from the read cursor, wrapping
    /// like `write`. Returns fewer bytes (possibly none) when less is
    /// available.
    pub fn read(&mut self, max_len: usize) -> Vec<u8> {
        let n = max_len.min(self.used);
        if n == 0 {
            return Vec::new();
        }
        let cap = self.capacity();
        let first = n.min(cap - self.read_pos);
        let mut out = Vec::with_capacity(n);
        out.extend_from_slice(&self.buf[self.read_pos..self.read_pos + first]);
        out.extend_from_slice(&self.buf[..n - first]);
        self.read_pos = (self.read_pos + n) % cap;
        self.used -= n;
        out
    }

    /// Rewinds both cursors and drops any unread bytes.
    pub fn reset(&mut self) {
        self.write_pos = 0;
        self.read_pos = 0;
        self.used = 0;
    }
}
