//! Scope-keyed growable byte buffers, the VM's polymorphic carrier for strings.

use crate::consts::STRING_BUFFER_BLOCK_SIZE;

#[derive(Debug, Clone)]
struct StringBuffer {
    id: i32,
    level: u32,
    /// Append (write) cursor; also the buffer's logical length.
    offset: usize,
    /// Random-access read/write cursor, independent of `offset`.
    rw_offset: usize,
    data: Vec<u8>,
}

impl StringBuffer {
    fn fresh(id: i32, level: u32) -> Self {
        Self {
            id,
            level,
            offset: 0,
            rw_offset: 0,
            data: vec![0u8; STRING_BUFFER_BLOCK_SIZE],
        }
    }

    fn reacquire(&mut self, id: i32, level: u32) {
        self.id = id;
        self.level = level;
        self.offset = 0;
        self.rw_offset = 0;
    }

    fn append_bytes(&mut self, bytes: &[u8]) {
        let needed = self.offset + bytes.len() + 1;
        if needed > self.data.len() {
            self.data.resize(needed.next_multiple_of(STRING_BUFFER_BLOCK_SIZE), 0);
        }
        self.data[self.offset..self.offset + bytes.len()].copy_from_slice(bytes);
        self.offset += bytes.len();
        self.data[self.offset] = 0;
    }

    fn as_bytes(&self) -> &[u8] {
        &self.data[..self.offset]
    }
}

/// Owns every live and free-listed [`StringBuffer`], plus the call-depth level at which
/// newly created buffers are tagged.
///
/// This lives on [`crate::interpreter::Vm`] rather than as a process-wide global: the
/// source's design note calls out the scope/call-depth boundary as a message ("set
/// level") rather than a free variable, and in Rust that message naturally becomes a
/// method on an owned manager instead of a global the whole process shares.
#[derive(Debug, Default)]
pub struct StringBufferManager {
    /// Buffers currently owned by some live call frame, most-recently-created last.
    live: Vec<StringBuffer>,
    /// Buffers released by `RET`, available for reuse, LIFO.
    free: Vec<StringBuffer>,
    level: u32,
}

impl StringBufferManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_level(&mut self, level: u32) {
        self.level = level;
    }

    fn find_mut(&mut self, id: i32) -> Option<&mut StringBuffer> {
        self.live.iter_mut().find(|b| b.id == id)
    }

    /// `CSB id`: ensure a buffer with `id` exists at the current level, reusing a
    /// free-list entry if one is available.
    pub fn create(&mut self, id: i32) {
        if self.live.iter().any(|b| b.id == id && b.level == self.level) {
            return;
        }
        let mut buf = match self.free.pop() {
            Some(mut reused) => {
                reused.reacquire(id, self.level);
                reused
            }
            None => StringBuffer::fresh(id, self.level),
        };
        buf.data[0] = 0;
        self.live.push(buf);
    }

    pub fn clear(&mut self, id: i32) {
        if let Some(buf) = self.find_mut(id) {
            buf.offset = 0;
            buf.data[0] = 0;
        }
    }

    pub fn append_char(&mut self, id: i32, c: u8) {
        if let Some(buf) = self.find_mut(id) {
            buf.append_bytes(&[c]);
        }
    }

    pub fn append_number(&mut self, id: i32, n: i32) {
        if let Some(buf) = self.find_mut(id) {
            buf.append_bytes(n.to_string().as_bytes());
        }
    }

    pub fn append_float(&mut self, id: i32, f: f32) {
        if let Some(buf) = self.find_mut(id) {
            buf.append_bytes(format!("{f:.6}").as_bytes());
        }
    }

    pub fn append_string(&mut self, id: i32, s: &[u8]) {
        if let Some(buf) = self.find_mut(id) {
            buf.append_bytes(s);
        }
    }

    pub fn append_buffer(&mut self, dst: i32, src: i32) {
        let Some(src_bytes) = self.find_mut(src).map(|b| b.as_bytes().to_vec()) else {
            return;
        };
        if let Some(buf) = self.find_mut(dst) {
            buf.append_bytes(&src_bytes);
        }
    }

    pub fn get(&self, id: i32) -> Option<&[u8]> {
        self.live.iter().find(|b| b.id == id).map(|b| b.as_bytes())
    }

    pub fn length(&self, id: i32) -> i32 {
        self.live
            .iter()
            .find(|b| b.id == id)
            .map(|b| b.offset as i32)
            .unwrap_or(0)
    }

    /// Bounded to `<= append offset`, mirroring the source's strict `<` acceptance test.
    pub fn set_rw_offset(&mut self, id: i32, offset: usize) {
        if let Some(buf) = self.find_mut(id) {
            if offset < buf.offset {
                buf.rw_offset = offset;
            }
        }
    }

    pub fn char_at_offset(&self, id: i32) -> u8 {
        self.live
            .iter()
            .find(|b| b.id == id)
            .filter(|b| b.rw_offset < b.offset)
            .map(|b| b.data[b.rw_offset])
            .unwrap_or(0)
    }

    /// Storing a NUL truncates the buffer at the cursor; storing past the append
    /// offset is a no-op.
    pub fn set_char_at_offset(&mut self, id: i32, c: u8) {
        if let Some(buf) = self.find_mut(id) {
            if buf.rw_offset < buf.offset {
                buf.data[buf.rw_offset] = c;
                if c == 0 {
                    buf.offset = buf.rw_offset;
                }
            }
        }
    }

    /// `RET`: release every buffer at `outgoing_level` to the free-list, in LIFO order.
    pub fn free_level(&mut self, outgoing_level: u32) {
        let mut i = 0;
        while i < self.live.len() {
            if self.live[i].level == outgoing_level {
                let buf = self.live.remove(i);
                self.free.push(buf);
            } else {
                i += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::StringBufferManager;

    #[test]
    fn create_and_append_round_trips_through_get() {
        let mut mgr = StringBufferManager::new();
        mgr.create(1);
        mgr.append_string(1, b"hello ");
        mgr.append_number(1, 42);
        assert_eq!(mgr.get(1), Some(b"hello 42".as_slice()));
    }

    #[test]
    fn buffers_created_at_a_level_are_released_when_that_level_returns() {
        let mut mgr = StringBufferManager::new();
        mgr.set_level(1);
        mgr.create(5);
        mgr.append_string(5, b"scoped");
        mgr.free_level(1);
        assert_eq!(mgr.get(5), None);
    }

    #[test]
    fn a_freed_buffer_is_reused_and_starts_empty() {
        let mut mgr = StringBufferManager::new();
        mgr.set_level(1);
        mgr.create(5);
        mgr.append_string(5, b"first call");
        mgr.free_level(1);

        mgr.set_level(1);
        mgr.create(7);
        assert_eq!(mgr.get(7), Some(b"".as_slice()));
    }

    #[test]
    fn set_rw_offset_rejects_positions_at_or_past_the_append_cursor() {
        let mut mgr = StringBufferManager::new();
        mgr.create(1);
        mgr.append_string(1, b"abc");
        mgr.set_rw_offset(1, 1);
        assert_eq!(mgr.char_at_offset(1), b'b');
        mgr.set_rw_offset(1, 3);
        assert_eq!(mgr.char_at_offset(1), b'b');
    }

    #[test]
    fn writing_a_nul_through_set_char_at_offset_truncates_the_buffer() {
        let mut mgr = StringBufferManager::new();
        mgr.create(1);
        mgr.append_string(1, b"abcdef");
        mgr.set_rw_offset(1, 2);
        mgr.set_char_at_offset(1, 0);
        assert_eq!(mgr.get(1), Some(b"ab".as_slice()));
    }
}
