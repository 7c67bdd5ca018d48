//! Input access: plain or gzip-compressed text, read as logical lines.

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Opens `path`, transparently decompressing gzip content.
pub fn open(path: &Path) -> io::Result<Box<dyn BufRead>> {
    let f = File::open(path)?;
    // Larger buffer reduces syscalls on big files.
    let mut r = BufReader::with_capacity(1 << 20, f);
    let gzipped = r.fill_buf()?.starts_with(&GZIP_MAGIC);
    if gzipped {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(r))))
    } else {
        Ok(Box::new(r))
    }
}

/// Logical lines of a reader.
///
/// A line is everything up to `\n` however long, so records the server wrote
/// in one go are never split. Invalid UTF-8 is replaced, not rejected.
pub struct LogicalLines<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> LogicalLines<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, buf: Vec::new() }
    }
}

impl<R: BufRead> Iterator for LogicalLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                if self.buf.last() == Some(&b'\n') {
                    self.buf.pop();
                    if self.buf.last() == Some(&b'\r') {
                        self.buf.pop();
                    }
                }
                Some(Ok(String::from_utf8_lossy(&self.buf).into_owned()))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Each call reopens the file, so every pass starts from the beginning.
pub fn lines(path: &Path) -> io::Result<LogicalLines<Box<dyn BufRead>>> {
    Ok(LogicalLines::new(open(path)?))
}

pub fn count_lines(path: &Path) -> io::Result<usize> {
    let mut n = 0;
    for line in lines(path)? {
        line?;
        n += 1;
    }
    Ok(n)
}
