//! Replays a recorded event-stream transcript through the frame reader.

use std::path::Path;

use workbench_ai::{FrameConfig, StreamFrameReader};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    pub text: String,
    pub events: usize,
    pub dropped_frames: usize,
    pub terminated: bool,
}

/// Feeds `transcript` to a reader `chunk_size` bytes at a time, mimicking a
/// network that splits frames arbitrarily.
pub fn replay_bytes(transcript: &[u8], chunk_size: usize, config: FrameConfig) -> ReplayReport {
    let mut reader = StreamFrameReader::new(config);
    let mut events = 0;
    for chunk in transcript.chunks(chunk_size.max(1)) {
        reader.push_chunk(chunk);
        while reader.next_event().is_some() {
            events += 1;
        }
    }
    events += reader.finish().len();
    ReplayReport {
        text: reader.text().to_string(),
        events,
        dropped_frames: reader.dropped_frames(),
        terminated: reader.is_finished(),
    }
}

pub fn replay_file(
    path: &Path,
    chunk_size: usize,
    config: FrameConfig,
) -> Result<ReplayReport, std::io::Error> {
    let transcript = std::fs::read(path)?;
    Ok(replay_bytes(&transcript, chunk_size, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    const TRANSCRIPT: &str = concat!(
        ": keep-alive\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hol\"}}]}\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
        "data: [DONE]\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n",
    );

    #[test]
    fn chunking_does_not_change_the_text() {
        for chunk_size in [1, 2, 7, 64, 4096] {
            let report = replay_bytes(TRANSCRIPT.as_bytes(), chunk_size, FrameConfig::default());
            assert_eq!(report.text, "Hola", "chunk size {chunk_size}");
            assert!(report.terminated);
            assert_eq!(report.dropped_frames, 0);
        }
    }

    #[test]
    fn replays_a_transcript_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TRANSCRIPT.as_bytes()).unwrap();

        let report = replay_file(file.path(), 5, FrameConfig::default()).unwrap();
        assert_eq!(report.text, "Hola");
        assert_eq!(report.events, 3);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(replay_file(&dir.path().join("absent.txt"), 8, FrameConfig::default()).is_err());
    }
}
