//! LOCAL INFILE upload.
//!
//! The server answers `LOAD DATA LOCAL INFILE` with a 0xFB packet naming a
//! client-side file. The client streams that file back as ordinary packets
//! continuing the exchange's sequence, then ends the upload with an empty
//! packet. Failures are never fatal: the empty packet is still sent and the
//! command fails once the server's final OK/ERR arrives.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use sqlwire_core::Error;
use tracing::{debug, info, warn};

use crate::error::{client_code, local_infile_error};
use crate::protocol::writer::MEDIUM_BUFFER_SIZE;
use crate::protocol::{PacketHeader, PacketWriter};

/// Bytes read from the file per packet.
pub const INFILE_CHUNK_SIZE: usize = MEDIUM_BUFFER_SIZE - PacketHeader::SIZE;

/// Result of one upload step.
#[derive(Debug)]
pub enum InfileStep {
    /// A chunk was written; call again once it has been sent.
    More,
    /// The terminating empty packet was written.
    Done,
    /// Reading failed mid-file; the terminating packet was written and the
    /// command must fail with this error.
    Failed(Error),
}

/// An upload in progress.
#[derive(Debug)]
pub struct LocalInfile {
    path: PathBuf,
    file: File,
    chunk: Vec<u8>,
    sent: u64,
}

impl LocalInfile {
    /// Open the file the server asked for.
    #[allow(clippy::result_large_err)]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            local_infile_error(
                client_code::ER_LOCAL_INFILE_NOT_READABLE,
                format!("LOCAL INFILE command failed: {}", e),
            )
        })?;
        debug!(path = %path.display(), "local infile opened");
        Ok(Self {
            path: path.to_path_buf(),
            file,
            chunk: vec![0; INFILE_CHUNK_SIZE],
            sent: 0,
        })
    }

    /// Bytes uploaded so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Write the next chunk of the file into `writer`.
    ///
    /// Each call frames at most one chunk so the caller can drain the
    /// writer to the transport between calls.
    pub fn step(&mut self, writer: &mut PacketWriter) -> InfileStep {
        let read = loop {
            match self.file.read(&mut self.chunk) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "local infile read failed");
                    finish(writer);
                    return InfileStep::Failed(local_infile_error(
                        client_code::ER_LOCAL_INFILE_NOT_READABLE,
                        format!("LOCAL INFILE command failed: {}", e),
                    ));
                }
            }
        };

        if read == 0 {
            finish(writer);
            info!(path = %self.path.display(), bytes = self.sent, "local infile sent");
            return InfileStep::Done;
        }

        writer.write_bytes(&self.chunk[..read]);
        writer.flush_buffer(false);
        self.sent += read as u64;
        InfileStep::More
    }
}

/// Flush anything pending and terminate the upload.
fn finish(writer: &mut PacketWriter) {
    if !writer.is_empty() {
        writer.flush_buffer(false);
    }
    writer.write_empty_packet();
}

/// Refuse an upload without touching the filesystem.
///
/// Writes the terminating empty packet and returns the error the command
/// resolves with.
pub fn refuse(writer: &mut PacketWriter, requested: &str) -> Error {
    warn!(file = %requested, "LOCAL INFILE requested but disabled");
    finish(writer);
    local_infile_error(
        client_code::ER_LOCAL_INFILE_DISABLED,
        format!(
            "LOCAL INFILE command failed: local infile is disabled, cannot send '{}'",
            requested
        ),
    )
}

/// Answer an unreadable file the same way as a refusal.
pub fn abort(writer: &mut PacketWriter, err: Error) -> Error {
    finish(writer);
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn payload_lengths(frames: &[Vec<u8>]) -> Vec<usize> {
        frames
            .iter()
            .map(|f| usize::from(f[0]) | usize::from(f[1]) << 8 | usize::from(f[2]) << 16)
            .collect()
    }

    #[test]
    fn test_streams_file_then_empty_packet() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let content: Vec<u8> = (0..INFILE_CHUNK_SIZE + 10).map(|i| (i % 251) as u8).collect();
        file.write_all(&content).unwrap();

        let mut writer = PacketWriter::default();
        writer.start_packet(2);
        let mut upload = LocalInfile::open(file.path()).unwrap();
        let mut frames = Vec::new();
        loop {
            let step = upload.step(&mut writer);
            frames.extend(writer.take_frames());
            match step {
                InfileStep::More => {}
                InfileStep::Done => break,
                InfileStep::Failed(e) => panic!("unexpected failure: {e}"),
            }
        }

        assert_eq!(payload_lengths(&frames), vec![INFILE_CHUNK_SIZE, 10, 0]);
        let sequences: Vec<u8> = frames.iter().map(|f| f[3]).collect();
        assert_eq!(sequences, vec![2, 3, 4]);
        let uploaded: Vec<u8> = frames.iter().flat_map(|f| f[4..].to_vec()).collect();
        assert_eq!(uploaded, content);
        assert_eq!(upload.sent(), content.len() as u64);
        assert_eq!(writer.sequence(), 5);
    }

    #[test]
    fn test_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut writer = PacketWriter::default();
        writer.start_packet(1);
        let mut upload = LocalInfile::open(file.path()).unwrap();
        assert!(matches!(upload.step(&mut writer), InfileStep::Done));
        assert_eq!(writer.take_frames(), vec![vec![0, 0, 0, 1]]);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalInfile::open(dir.path().join("absent.csv")).unwrap_err();
        assert_eq!(err.code(), Some(client_code::ER_LOCAL_INFILE_NOT_READABLE));
        assert_eq!(err.sqlstate(), Some("22000"));
        assert!(err.to_string().contains("LOCAL INFILE command failed"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_refuse_sends_empty_packet() {
        let mut writer = PacketWriter::default();
        writer.start_packet(2);
        let err = refuse(&mut writer, "/etc/passwd");
        assert_eq!(writer.take_frames(), vec![vec![0, 0, 0, 2]]);
        assert_eq!(err.code(), Some(client_code::ER_LOCAL_INFILE_DISABLED));
        assert_eq!(err.sqlstate(), Some("22000"));
    }
}
