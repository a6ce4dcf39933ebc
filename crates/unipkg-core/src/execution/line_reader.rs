use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

/// One logical line of process output. Lines terminated by a bare `\r` are
/// progress redraws and are not final.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct OutputLine {
    pub text: String,
    pub is_final: bool,
}

impl OutputLine {
    pub fn new(text: impl Into<String>, is_final: bool) -> Self {
        Self {
            text: text.into(),
            is_final,
        }
    }
}

/// Byte-at-a-time line splitter.
///
/// `\n` and `\r\n` end a final line. A `\r` followed by anything else ends a
/// progress line, and the following byte starts the next line. Lines are
/// decoded lossily and trimmed; blank lines are swallowed.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buffer: Vec<u8>,
    pending_cr: bool,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, byte: u8) -> Option<OutputLine> {
        if self.pending_cr {
            self.pending_cr = false;
            return match byte {
                b'\n' => self.emit(true),
                b'\r' => {
                    let line = self.emit(false);
                    self.pending_cr = true;
                    line
                }
                other => {
                    let line = self.emit(false);
                    self.buffer.push(other);
                    line
                }
            };
        }

        match byte {
            b'\n' => self.emit(true),
            b'\r' => {
                self.pending_cr = true;
                None
            }
            other => {
                self.buffer.push(other);
                None
            }
        }
    }

    /// Flushes whatever is pending once the stream has ended.
    pub fn finish(&mut self) -> Option<OutputLine> {
        self.pending_cr = false;
        self.emit(true)
    }

    fn emit(&mut self, is_final: bool) -> Option<OutputLine> {
        let raw = std::mem::take(&mut self.buffer);
        let text = String::from_utf8_lossy(&raw).trim().to_string();
        if text.is_empty() {
            None
        } else {
            Some(OutputLine { text, is_final })
        }
    }
}

pub struct LineReader<R> {
    reader: BufReader<R>,
    splitter: LineSplitter,
    finished: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            splitter: LineSplitter::new(),
            finished: false,
        }
    }

    /// Next line, or `None` once the stream is exhausted.
    pub async fn next_line(&mut self) -> Option<OutputLine> {
        while !self.finished {
            match self.reader.read_u8().await {
                Ok(byte) => {
                    if let Some(line) = self.splitter.push(byte) {
                        return Some(line);
                    }
                }
                Err(error) => {
                    if error.kind() != std::io::ErrorKind::UnexpectedEof {
                        tracing::debug!(error = %error, "process output stream closed with error");
                    }
                    self.finished = true;
                    return self.splitter.finish();
                }
            }
        }
        None
    }
}

pub fn split_lines(bytes: &[u8]) -> Vec<OutputLine> {
    let mut splitter = LineSplitter::new();
    let mut lines: Vec<OutputLine> = bytes.iter().filter_map(|b| splitter.push(*b)).collect();
    lines.extend(splitter.finish());
    lines
}

/// Final lines of captured output, the input every table parser works on.
pub fn final_lines(raw: &str) -> Vec<String> {
    split_lines(raw.as_bytes())
        .into_iter()
        .filter(|line| line.is_final)
        .map(|line| line.text)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{LineReader, OutputLine, final_lines, split_lines};

    #[test]
    fn bare_cr_yields_progress_line_and_carries_next_byte() {
        let lines = split_lines(b"a\rb\r\nc\n");
        assert_eq!(
            lines,
            vec![
                OutputLine::new("a", false),
                OutputLine::new("b", true),
                OutputLine::new("c", true),
            ]
        );
    }

    #[test]
    fn trailing_fragment_is_flushed_once_as_final() {
        let lines = split_lines(b"Downloading 10%\rDownloading 55%");
        assert_eq!(
            lines,
            vec![
                OutputLine::new("Downloading 10%", false),
                OutputLine::new("Downloading 55%", true),
            ]
        );
    }

    #[test]
    fn blank_lines_and_spinner_padding_are_swallowed() {
        let lines = split_lines(b"\n\n  \r\n   - \r   \\ \rName  Id\r\n");
        assert_eq!(
            lines,
            vec![
                OutputLine::new("-", false),
                OutputLine::new("\\", false),
                OutputLine::new("Name  Id", true),
            ]
        );
    }

    #[test]
    fn consecutive_carriage_returns_do_not_merge_lines() {
        let lines = split_lines(b"one\r\rtwo\n");
        assert_eq!(
            lines,
            vec![OutputLine::new("one", false), OutputLine::new("two", true)]
        );
    }

    #[test]
    fn final_lines_drop_progress_redraws() {
        assert_eq!(
            final_lines("  - \r  | \rHeader\r\n---\r\nrow 1\n"),
            vec!["Header", "---", "row 1"]
        );
    }

    #[tokio::test]
    async fn async_reader_matches_sync_splitter() {
        let input: &[u8] = b"Installing\r 45%\r\nDone\npartial";
        let mut reader = LineReader::new(input);

        let mut lines = Vec::new();
        while let Some(line) = reader.next_line().await {
            lines.push(line);
        }

        assert_eq!(lines, split_lines(input));
        assert_eq!(lines.last(), Some(&OutputLine::new("partial", true)));
        assert_eq!(reader.next_line().await, None);
    }
}
