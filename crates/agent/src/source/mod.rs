//! Source readers
//!
//! - [`text`]: byte-offset tailing of line-oriented files
//! - [`evtx`]: (timestamp, record id) tailing of Windows Event Log files
//!
//! [`detect_kind`] decides which reader a monitor task uses.

pub mod evtx;
pub mod text;

use std::path::Path;

use tokio::io::AsyncReadExt;

use loglens_core::types::SourceKind;

use crate::error::AgentError;

pub use evtx::{EventLogReader, EventRecord, EvtxFileReader};
pub use text::{TextBatch, TextLine, TextReader};

/// File signature of the Windows Event Log format.
pub const EVTX_MAGIC: &[u8; 8] = b"ElfFile\0";

/// Determines the kind of a source.
///
/// The `.evtx` extension is authoritative; otherwise the first bytes are
/// checked for the event log signature.
pub async fn detect_kind(path: &Path) -> Result<SourceKind, AgentError> {
    let has_evtx_extension = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("evtx"));
    if has_evtx_extension {
        return Ok(SourceKind::StructuredLog);
    }

    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| AgentError::read_failed(path.display(), e))?;

    let mut header = [0_u8; 8];
    let mut filled = 0;
    while filled < header.len() {
        let n = file
            .read(&mut header[filled..])
            .await
            .map_err(|e| AgentError::read_failed(path.display(), e))?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    if filled == header.len() && &header == EVTX_MAGIC {
        Ok(SourceKind::StructuredLog)
    } else {
        Ok(SourceKind::Text)
    }
}
