//! Line sources
//!
//! The pipeline consumes lines from a [`LineSource`] and knows nothing
//! about files, offsets, or watching for new input.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use meghaduta_core::{Error, Result};

/// Supplier of raw lines in a stable order.
pub trait LineSource {
    /// The next line without its terminator, or `None` when exhausted.
    fn next_line(&mut self) -> Result<Option<String>>;
}

/// Lines from any buffered reader.
#[derive(Debug)]
pub struct ReaderLineSource<R: BufRead> {
    reader: R,
    lines_read: u64,
}

impl<R: BufRead> ReaderLineSource<R> {
    /// Wrap a reader.
    pub fn new(reader: R) -> Self {
        ReaderLineSource {
            reader,
            lines_read: 0,
        }
    }

    /// Lines returned so far.
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }
}

impl<R: BufRead> LineSource for ReaderLineSource<R> {
    fn next_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .map_err(|e| Error::Source(format!("line {}: {}", self.lines_read + 1, e)))?;
        if read == 0 {
            return Ok(None);
        }

        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        self.lines_read += 1;
        Ok(Some(line))
    }
}

/// Lines of one file, read once from the start.
#[derive(Debug)]
pub struct FileLineSource {
    path: PathBuf,
    inner: ReaderLineSource<BufReader<File>>,
}

impl FileLineSource {
    /// Open `path` for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .map_err(|e| Error::Source(format!("cannot open '{}': {}", path.display(), e)))?;
        Ok(FileLineSource {
            path,
            inner: ReaderLineSource::new(BufReader::new(file)),
        })
    }

    /// File being read.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LineSource for FileLineSource {
    fn next_line(&mut self) -> Result<Option<String>> {
        self.inner.next_line()
    }
}

/// Lines from an in-memory iterator.
#[derive(Debug, Clone)]
pub struct IterLineSource<I> {
    lines: I,
}

impl<I> IterLineSource<I>
where
    I: Iterator,
    I::Item: Into<String>,
{
    /// Wrap anything iterable over lines.
    pub fn new(lines: impl IntoIterator<IntoIter = I>) -> Self {
        IterLineSource {
            lines: lines.into_iter(),
        }
    }
}

impl<I> LineSource for IterLineSource<I>
where
    I: Iterator,
    I::Item: Into<String>,
{
    fn next_line(&mut self) -> Result<Option<String>> {
        Ok(self.lines.next().map(Into::into))
    }
}
