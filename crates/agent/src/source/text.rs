//! Text source reader -- byte-offset tailing.
//!
//! Each poll opens the file, seeks to the stored offset and reads at most
//! `max_lines` lines. A file shorter than the offset has been rotated or
//! truncated; reading restarts at offset 0.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

use crate::error::AgentError;

/// One line read from a text source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLine {
    /// Line content without the trailing line terminator
    pub text: String,
    /// Offset just past this line
    pub end_offset: u64,
}

/// Lines read in one poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextBatch {
    /// Non-blank lines in file order
    pub lines: Vec<TextLine>,
    /// Offset after everything consumed, blank lines included
    pub next_offset: u64,
    /// The file was shorter than the requested offset
    pub rotated: bool,
}

/// Reader over one line-oriented file.
#[derive(Debug, Clone)]
pub struct TextReader {
    path: PathBuf,
    max_lines: usize,
}

impl TextReader {
    pub fn new(path: impl AsRef<Path>, max_lines: usize) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_lines: max_lines.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file length, the starting offset of a first run.
    pub async fn end_offset(&self) -> Result<u64, AgentError> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| AgentError::read_failed(self.path.display(), e))?;
        Ok(metadata.len())
    }

    /// Reads lines starting at `offset`.
    ///
    /// A last line without terminator is returned as well; its
    /// `end_offset` is the end of the file.
    pub async fn read_from(&self, offset: u64) -> Result<TextBatch, AgentError> {
        let file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| AgentError::read_failed(self.path.display(), e))?;

        let len = file
            .metadata()
            .await
            .map_err(|e| AgentError::read_failed(self.path.display(), e))?
            .len();

        let (start, rotated) = if len < offset {
            (0, true)
        } else {
            (offset, false)
        };

        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(start))
            .await
            .map_err(|e| AgentError::read_failed(self.path.display(), e))?;

        let mut batch = TextBatch {
            lines: Vec::new(),
            next_offset: start,
            rotated,
        };
        let mut buf = Vec::with_capacity(512);
        let mut consumed = 0_usize;

        while consumed < self.max_lines {
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(|e| AgentError::read_failed(self.path.display(), e))?;
            if n == 0 {
                break;
            }
            consumed += 1;
            batch.next_offset += n as u64;

            let text = String::from_utf8_lossy(&buf);
            let text = text.trim_end_matches(['\n', '\r']);
            if text.trim().is_empty() {
                continue;
            }
            batch.lines.push(TextLine {
                text: text.to_owned(),
                end_offset: batch.next_offset,
            });
        }

        Ok(batch)
    }
}
