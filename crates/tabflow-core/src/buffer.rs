//! A growable byte store with a read cursor and a write cursor, used to
//! accumulate partial lines at codec boundaries and to hold encoder
//! output per channel.

/// Growable byte buffer with distinct `read_pos`/`len` cursors.
/// `compact` shifts unread bytes to the front when the read cursor has
/// advanced, bounding memory growth for a long-lived decoder or channel.
#[derive(Debug, Default)]
pub struct Buffer {
    data: Vec<u8>,
    read_pos: usize,
}

impl Buffer {
    pub fn new() -> Self {
        Buffer {
            data: Vec::new(),
            read_pos: 0,
        }
    }

    /// Append bytes to the write end.
    pub fn push(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Unread bytes between the read cursor and the write end.
    pub fn unread(&self) -> &[u8] {
        &self.data[self.read_pos..]
    }

    pub fn unread_len(&self) -> usize {
        self.data.len() - self.read_pos
    }

    pub fn is_empty(&self) -> bool {
        self.unread_len() == 0
    }

    /// Advance the read cursor past `n` bytes already consumed by the
    /// caller (e.g. a decoder that scanned a complete line).
    pub fn consume(&mut self, n: usize) {
        self.read_pos = (self.read_pos + n).min(self.data.len());
    }

    /// Shift unread bytes to the front and drop everything before the
    /// read cursor. Called opportunistically so a long-lived buffer
    /// doesn't grow unbounded as `read_pos` advances.
    pub fn compact(&mut self) {
        if self.read_pos == 0 {
            return;
        }
        self.data.drain(0..self.read_pos);
        self.read_pos = 0;
    }

    /// Drain every unread byte out, leaving the buffer empty. Used by
    /// channel pull operations.
    pub fn drain_all(&mut self) -> Vec<u8> {
        let out = self.data[self.read_pos..].to_vec();
        self.data.clear();
        self.read_pos = 0;
        out
    }

    /// Drain up to `max` unread bytes into `out`, returning the number
    /// of bytes written. Used by the channel `pull(channel, out_buf)`
    /// API which hands back a caller-sized slice at a time.
    pub fn drain_into(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.unread_len());
        out[..n].copy_from_slice(&self.data[self.read_pos..self.read_pos + n]);
        self.read_pos += n;
        self.compact();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_consume_tracks_cursor() {
        let mut buf = Buffer::new();
        buf.push(b"hello world");
        assert_eq!(buf.unread(), b"hello world");
        buf.consume(6);
        assert_eq!(buf.unread(), b"world");
    }

    #[test]
    fn compact_shifts_and_drops_consumed_bytes() {
        let mut buf = Buffer::new();
        buf.push(b"abcdef");
        buf.consume(3);
        buf.compact();
        assert_eq!(buf.unread(), b"def");
        buf.push(b"ghi");
        assert_eq!(buf.unread(), b"defghi");
    }

    #[test]
    fn drain_into_respects_caller_buffer_size() {
        let mut buf = Buffer::new();
        buf.push(b"0123456789");
        let mut out = [0u8; 4];
        let n = buf.drain_into(&mut out);
        assert_eq!(n, 4);
        assert_eq!(&out, b"0123");
        assert_eq!(buf.unread(), b"456789");
    }
}
