//! # Block Feed
//!
//! Newline-delimited JSON `ChainBlock` records read from a file or stdin.
//! Blank lines are skipped. A malformed line is reported with its line
//! number and does not end the feed.

use shared_types::ChainBlock;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;

/// Path value that selects stdin.
pub const STDIN_FEED: &str = "-";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Failed to open block feed {}: {message}", .path.display())]
    Open { path: PathBuf, message: String },

    #[error("Failed to read block feed at line {line}: {message}")]
    Read { line: u64, message: String },

    #[error("Malformed block at line {line}: {message}")]
    Malformed { line: u64, message: String },
}

type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;

pub struct BlockFeed {
    lines: LinesStream<BufReader<BoxedReader>>,
    line: u64,
}

impl BlockFeed {
    /// Open `path`, or stdin when `path` is `-`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, FeedError> {
        let path = path.as_ref();
        if path == Path::new(STDIN_FEED) {
            return Ok(Self::from_reader(tokio::io::stdin()));
        }
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| FeedError::Open {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        Ok(Self::from_reader(file))
    }

    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let reader: BoxedReader = Box::new(reader);
        Self {
            lines: LinesStream::new(BufReader::new(reader).lines()),
            line: 0,
        }
    }

    /// Next block, or `None` at end of input.
    pub async fn next_block(&mut self) -> Option<Result<ChainBlock, FeedError>> {
        loop {
            let next = self.lines.next().await?;
            self.line += 1;
            let text = match next {
                Ok(text) => text,
                Err(e) => {
                    return Some(Err(FeedError::Read {
                        line: self.line,
                        message: e.to_string(),
                    }))
                }
            };
            if text.trim().is_empty() {
                continue;
            }
            return Some(serde_json::from_str(&text).map_err(|e| FeedError::Malformed {
                line: self.line,
                message: e.to_string(),
            }));
        }
    }

    /// Lines consumed so far, blank lines included.
    pub fn lines_read(&self) -> u64 {
        self.line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HASH_1: &str = "0x0100000000000000000000000000000000000000000000000000000000000000";
    const HASH_2: &str = "0x0200000000000000000000000000000000000000000000000000000000000000";
    const ZERO: &str = "0x0000000000000000000000000000000000000000000000000000000000000000";

    fn feed(text: String) -> BlockFeed {
        BlockFeed::from_reader(Cursor::new(text.into_bytes()))
    }

    #[tokio::test]
    async fn test_reads_blocks_and_skips_blank_lines() {
        let text = format!(
            "{{\"number\":1,\"hash\":\"{HASH_1}\",\"parent_hash\":\"{ZERO}\"}}\n\n   \n{{\"number\":2,\"hash\":\"{HASH_2}\",\"parent_hash\":\"{HASH_1}\"}}\n"
        );
        let mut feed = feed(text);

        let first = feed.next_block().await.unwrap().unwrap();
        assert_eq!(first.number, 1);
        assert!(first.events.is_empty());

        let second = feed.next_block().await.unwrap().unwrap();
        assert_eq!(second.number, 2);
        assert_eq!(second.parent_hash, first.hash);

        assert!(feed.next_block().await.is_none());
        assert_eq!(feed.lines_read(), 4);
    }

    #[tokio::test]
    async fn test_malformed_line_reports_line_number_and_continues() {
        let text = format!(
            "not json\n{{\"number\":1,\"hash\":\"{HASH_1}\",\"parent_hash\":\"{ZERO}\"}}\n"
        );
        let mut feed = feed(text);

        match feed.next_block().await {
            Some(Err(FeedError::Malformed { line, .. })) => assert_eq!(line, 1),
            other => panic!("expected malformed line, got {:?}", other),
        }
        assert_eq!(feed.next_block().await.unwrap().unwrap().number, 1);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let result = BlockFeed::open("/nonexistent/feed.jsonl").await;
        assert!(matches!(result, Err(FeedError::Open { .. })));
    }
}
