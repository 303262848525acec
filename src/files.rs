//! Fixed-capacity VM file-descriptor slot table.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::{FromRawFd, IntoRawFd, RawFd};

use crate::consts::MAX_OPEN_FILES;
use crate::error::RecoverableError;

#[derive(Debug, Clone, Copy)]
struct Slot {
    fd: RawFd,
    mode: char,
}

/// Slots 0/1/2 are pre-populated for stdin/stdout/stderr; `mode_char` is lower-case for
/// text and upper-case for binary transfers.
pub struct FileTable {
    slots: [Option<Slot>; MAX_OPEN_FILES],
    active_read_fd: RawFd,
    active_write_fd: RawFd,
}

impl Default for FileTable {
    fn default() -> Self {
        let mut slots = [None; MAX_OPEN_FILES];
        slots[0] = Some(Slot { fd: 0, mode: 'r' });
        slots[1] = Some(Slot { fd: 1, mode: 'w' });
        slots[2] = Some(Slot { fd: 2, mode: 'w' });
        Self {
            slots,
            active_read_fd: 0,
            active_write_fd: 1,
        }
    }
}

impl FileTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn free_index(&self) -> Option<usize> {
        (3..MAX_OPEN_FILES).find(|&i| self.slots[i].is_none())
    }

    fn find_index(&self, fd: RawFd) -> Option<usize> {
        if fd < 0 {
            return None;
        }
        (3..MAX_OPEN_FILES).find(|&i| matches!(self.slots[i], Some(s) if s.fd == fd))
    }

    fn mode_of(&self, fd: RawFd) -> Option<char> {
        (0..MAX_OPEN_FILES)
            .find(|&i| matches!(self.slots[i], Some(s) if s.fd == fd))
            .and_then(|i| self.slots[i].map(|s| s.mode))
    }

    /// `OFD`: opens `path` (text if `mode` is lower-case, binary if upper-case) and
    /// returns a VM fd, or an error if there is no free slot or the open failed.
    pub fn open(&mut self, path: &str, mode: char) -> Result<RawFd, RecoverableError> {
        let lower = mode.to_ascii_lowercase();
        if lower != 'r' && lower != 'w' {
            return Err(RecoverableError::FileOpenFailure);
        }
        let idx = self.free_index().ok_or(RecoverableError::FileOpenFailure)?;
        let file = if lower == 'r' {
            OpenOptions::new().read(true).open(path)
        } else {
            OpenOptions::new().write(true).create(true).truncate(true).open(path)
        }
        .map_err(|_| RecoverableError::FileOpenFailure)?;
        let fd = file.into_raw_fd();
        self.slots[idx] = Some(Slot { fd, mode });
        Ok(fd)
    }

    /// `CFD`: closes a previously opened fd. Returns an error (including on a repeated
    /// close of the same fd) rather than panicking, matching "not found" semantics.
    pub fn close(&mut self, fd: RawFd) -> Result<(), RecoverableError> {
        let idx = self.find_index(fd).ok_or(RecoverableError::Io)?;
        self.slots[idx] = None;
        unsafe {
            drop(File::from_raw_fd(fd));
        }
        Ok(())
    }

    /// `SFD`: selects the active read-fd or write-fd, based on the slot's own mode.
    pub fn set_active(&mut self, fd: RawFd) -> Result<(), RecoverableError> {
        let mode = self.mode_of(fd).ok_or(RecoverableError::Io)?;
        match mode.to_ascii_lowercase() {
            'r' => self.active_read_fd = fd,
            'w' => self.active_write_fd = fd,
            _ => return Err(RecoverableError::Io),
        }
        Ok(())
    }

    pub fn set_extern_write_fd(&mut self, fd: RawFd, mode: char) -> Result<(), RecoverableError> {
        if self.find_index(fd).is_some() {
            return Err(RecoverableError::Io);
        }
        let idx = self.free_index().ok_or(RecoverableError::Io)?;
        self.slots[idx] = Some(Slot { fd, mode });
        Ok(())
    }

    pub fn clear_extern_fd(&mut self, fd: RawFd) -> Result<(), RecoverableError> {
        let idx = self.find_index(fd).ok_or(RecoverableError::Io)?;
        self.slots[idx] = None;
        Ok(())
    }

    fn write_bytes(&self, bytes: &[u8]) -> Result<(), RecoverableError> {
        let mut file = unsafe { File::from_raw_fd(self.active_write_fd) };
        let result = file.write_all(bytes).map_err(|_| RecoverableError::Io);
        std::mem::forget(file);
        result
    }

    fn active_write_mode(&self) -> char {
        self.mode_of(self.active_write_fd).unwrap_or('w')
    }

    fn active_read_mode(&self) -> char {
        self.mode_of(self.active_read_fd).unwrap_or('r')
    }

    pub fn write_string(&self, s: &[u8]) -> Result<(), RecoverableError> {
        self.write_bytes(s)
    }

    pub fn write_num(&self, n: i32) -> Result<(), RecoverableError> {
        if self.active_write_mode() == 'W' {
            self.write_bytes(&n.to_ne_bytes())
        } else {
            self.write_bytes(n.to_string().as_bytes())
        }
    }

    pub fn write_float(&self, f: f32) -> Result<(), RecoverableError> {
        if self.active_write_mode() == 'W' {
            self.write_bytes(&f.to_ne_bytes())
        } else {
            self.write_bytes(format!("{f}").as_bytes())
        }
    }

    pub fn write_char(&self, c: u8) -> Result<(), RecoverableError> {
        if self.active_write_mode() == 'W' {
            self.write_bytes(&[c])
        } else {
            self.write_bytes(&[c])
        }
    }

    fn read_byte(&self) -> Option<u8> {
        let fd = self.active_read_fd;
        let mut file = unsafe { File::from_raw_fd(fd) };
        let mut byte = [0u8; 1];
        let result = file.read_exact(&mut byte).ok();
        std::mem::forget(file);
        result.map(|_| byte[0])
    }

    /// `RDC`: reads one character from the active read fd.
    pub fn read_char(&self) -> Result<u8, RecoverableError> {
        self.read_byte().ok_or(RecoverableError::Io)
    }

    /// `RDN`: reads an integer. In binary mode, a raw 4-byte read; in text mode, a small
    /// state machine that skips leading whitespace, accepts an optional `-`, then
    /// accumulates decimal digits until (and consuming) a non-digit terminator.
    pub fn read_num(&self) -> Result<i32, RecoverableError> {
        if self.active_read_mode() == 'R' {
            let mut buf = [0u8; 4];
            for b in buf.iter_mut() {
                *b = self.read_byte().ok_or(RecoverableError::Io)?;
            }
            return Ok(i32::from_ne_bytes(buf));
        }
        let mut sign = 1i32;
        let mut seen_digit = false;
        let mut value: i64 = 0;
        loop {
            let Some(ch) = self.read_byte() else {
                break;
            };
            if !seen_digit {
                match ch {
                    b' ' | b'\t' => continue,
                    b'-' => {
                        sign = -1;
                        continue;
                    }
                    b'0'..=b'9' => {
                        seen_digit = true;
                        value = (ch - b'0') as i64;
                    }
                    _ => break,
                }
            } else if ch.is_ascii_digit() {
                value = value * 10 + (ch - b'0') as i64;
            } else {
                break;
            }
        }
        Ok((value * sign as i64) as i32)
    }

    pub fn active_write_fd(&self) -> RawFd {
        self.active_write_fd
    }
}

#[cfg(test)]
mod tests {
    use super::FileTable;
    use std::fs;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("tcvm-test-{name}-{}", std::process::id()))
    }

    #[test]
    fn stdin_stdout_stderr_are_preopened_and_cannot_be_reused_as_free_slots() {
        let mut table = FileTable::new();
        // fd 1 (stdout) is already occupied; opening any new file must land in slot 3+.
        let path = temp_path("preopen");
        let fd = table.open(path.to_str().unwrap(), 'w').unwrap();
        assert_ne!(fd, 0);
        assert_ne!(fd, 1);
        assert_ne!(fd, 2);
        table.close(fd).unwrap();
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn text_mode_write_num_and_write_char_round_trip_through_a_real_file() {
        let mut table = FileTable::new();
        let path = temp_path("textio");
        let fd = table.open(path.to_str().unwrap(), 'w').unwrap();
        table.set_active(fd).unwrap();
        table.write_num(42).unwrap();
        table.write_char(b'\n').unwrap();
        table.close(fd).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "42\n");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn binary_mode_write_num_emits_raw_native_endian_bytes() {
        let mut table = FileTable::new();
        let path = temp_path("binio");
        let fd = table.open(path.to_str().unwrap(), 'W').unwrap();
        table.set_active(fd).unwrap();
        table.write_num(0x01020304).unwrap();
        table.close(fd).unwrap();

        let contents = fs::read(&path).unwrap();
        assert_eq!(contents, 0x01020304i32.to_ne_bytes());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn closing_an_unknown_fd_reports_an_error_rather_than_panicking() {
        let mut table = FileTable::new();
        assert!(table.close(999).is_err());
    }

    #[test]
    fn reading_from_a_written_file_recovers_the_decimal_text() {
        let mut write_table = FileTable::new();
        let path = temp_path("roundtrip");
        let wfd = write_table.open(path.to_str().unwrap(), 'w').unwrap();
        write_table.set_active(wfd).unwrap();
        write_table.write_num(-7).unwrap();
        write_table.close(wfd).unwrap();

        let mut read_table = FileTable::new();
        let rfd = read_table.open(path.to_str().unwrap(), 'r').unwrap();
        read_table.set_active(rfd).unwrap();
        assert_eq!(read_table.read_num().unwrap(), -7);
        read_table.close(rfd).unwrap();
        let _ = fs::remove_file(&path);
    }
}
