use std::fs::File;
use std::io::Read;

use crossbeam::channel::{self, Receiver, Sender};
use tracing::debug;

use ChatStatError::GenericFailure;

use crate::{ChatStatError, Patterns, Report, LINE_DELIMITER};

const CHUNK_SIZE: usize = 1024 * 1024;
const MAX_NUMBER_IN_FLIGHT_CHUNKS: usize = 32; // effectively 32 + number of processors

pub(super) fn crunch(file: File, patterns: &Patterns, jobs: usize) -> Result<Report, ChatStatError> {
    let (chunks_sender, chunks_receiver) = channel::bounded(MAX_NUMBER_IN_FLIGHT_CHUNKS);
    let (reports_sender, reports_receiver) = channel::unbounded();

    spawn_processors(file.metadata()?.len(), jobs, patterns, chunks_receiver, reports_sender);
    chunk_file(file, chunks_sender)?;

    Ok(reports_receiver.into_iter().fold(Report::new(), Report::merge))
}

fn chunk_file(mut file: File, chunks: Sender<Vec<u8>>) -> Result<(), ChatStatError> {
    let mut current_chunk = Vec::with_capacity(CHUNK_SIZE);
    loop {
        let limit = u64::try_from(CHUNK_SIZE - current_chunk.len()).map_err(|e| GenericFailure(e.into()))?;
        let bytes_read = file.by_ref().take(limit).read_to_end(&mut current_chunk)?;
        if bytes_read == 0 {
            break;
        }
        match current_chunk.iter().rposition(|byte| byte == &LINE_DELIMITER) {
            Some(delimiter_index) => {
                let mut next_chunk = Vec::with_capacity(CHUNK_SIZE);
                next_chunk.extend_from_slice(&current_chunk[(delimiter_index + 1)..]);
                current_chunk.truncate(delimiter_index + 1);
                chunks.send(current_chunk).map_err(|e| GenericFailure(e.into()))?;
                current_chunk = next_chunk;
            }
            None if current_chunk.len() >= CHUNK_SIZE => {
                return Err(GenericFailure("Line longer than a chunk".into()));
            }
            // end of file reached in the middle of the last line
            None => {}
        }
    }
    if !current_chunk.is_empty() {
        chunks.send(current_chunk).map_err(|e| GenericFailure(e.into()))?;
    }
    Ok(())
}

fn spawn_processors(
    file_size: u64,
    jobs: usize,
    patterns: &Patterns,
    chunks: Receiver<Vec<u8>>,
    reports: Sender<Report>,
) {
    let number_of_chunks = usize::try_from(file_size).unwrap_or(usize::MAX) / CHUNK_SIZE;
    let number_of_processors = jobs.min(num_cpus::get()).min(number_of_chunks.max(1));
    debug!("Spawning {} chunk processor(s)", number_of_processors);
    (0..number_of_processors).for_each(|_| {
        spawn_processor(
            LineChunkProcessor {
                patterns: patterns.clone(),
            },
            chunks.clone(),
            reports.clone(),
        )
    });
}

fn spawn_processor<T: ChunkProcessor>(processor: T, chunks: Receiver<Vec<u8>>, reports: Sender<Report>) {
    std::thread::spawn(move || {
        let mut report = Report::new();
        chunks
            .into_iter()
            .for_each(|chunk| processor.process(&chunk, &mut report));
        // main thread has already left
        reports.send(report).unwrap_or(());
    });
}

trait ChunkProcessor: Send + 'static {
    fn process(&self, chunk: &[u8], report: &mut Report);
}

struct LineChunkProcessor {
    patterns: Patterns,
}

impl ChunkProcessor for LineChunkProcessor {
    fn process(&self, chunk: &[u8], report: &mut Report) {
        // every chunk but possibly the last ends with a delimiter, which does not start another line
        chunk
            .strip_suffix(&[LINE_DELIMITER])
            .unwrap_or(chunk)
            .split(|byte| *byte == LINE_DELIMITER)
            .for_each(|line| report.process(line, &self.patterns));
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use chrono::NaiveDate;
    use tempfile::NamedTempFile;

    use super::*;

    fn file_with(content: &[u8]) -> File {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.reopen().unwrap()
    }

    #[test]
    fn test_chunk_processor_keeps_empty_lines() {
        let processor = LineChunkProcessor {
            patterns: Patterns::default(),
        };
        let mut report = Report::new();

        processor.process(b"3/14/23 Alice: hi\n\n3/14/23 Bob: yo\n", &mut report);

        assert_eq!(report.lines(), 3);
        assert_eq!(report.errors(), 1);
        assert_eq!(report.table().len(), 2);
    }

    #[test]
    fn test_chunk_file_flushes_unterminated_last_line() {
        let (sender, receiver) = channel::unbounded();

        chunk_file(file_with(b"3/14/23 Alice: hi\n3/14/23 Bob: yo"), sender).unwrap();

        let chunks: Vec<Vec<u8>> = receiver.into_iter().collect();
        assert_eq!(chunks, vec![b"3/14/23 Alice: hi\n".to_vec(), b"3/14/23 Bob: yo".to_vec()]);
    }

    #[test]
    fn test_chunk_file_rejects_oversized_line() {
        let (sender, _receiver) = channel::unbounded();

        let result = chunk_file(file_with(&vec![b'x'; CHUNK_SIZE + 1]), sender);

        assert!(matches!(result, Err(GenericFailure(_))));
    }

    #[test]
    fn test_crunch_across_chunks() {
        let line = b"1/1/24 Carol: a message long enough to fill chunks quickly\n";
        let repeats = 3 * CHUNK_SIZE / line.len();
        let content: Vec<u8> = line.iter().copied().cycle().take(line.len() * repeats).collect();

        let report = crunch(file_with(&content), &Patterns::default(), 4).unwrap();

        assert_eq!(report.lines(), repeats);
        assert_eq!(report.errors(), 0);
        assert_eq!(
            report.table().count(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), "Carol"),
            Some(repeats as u64)
        );
    }
}
