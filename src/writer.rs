//! Output sink collapsing repeated messages

use std::io::{self, Write};

use crate::report::OutputMessage;

/// Write one line per message, collapsing runs of equal consecutive messages
pub(crate) struct DedupSink<W: Write> {
    writer: W,
    pending: Option<(OutputMessage, usize)>,
    /// Prefix lines with the run length
    counts: bool,
}

impl<W: Write> DedupSink<W> {
    pub(crate) fn new(writer: W, counts: bool) -> Self {
        Self {
            writer,
            pending: None,
            counts,
        }
    }

    pub(crate) fn push(&mut self, message: OutputMessage) -> io::Result<()> {
        if let Some((prev, count)) = self.pending.as_mut() {
            if prev.message_equals(&message) {
                *count += 1;
                return Ok(());
            }
        }
        self.write_pending()?;
        self.pending = Some((message, 1));
        Ok(())
    }

    /// Write the last pending message, and flush the underlying writer
    pub(crate) fn flush(&mut self) -> io::Result<()> {
        self.write_pending()?;
        self.writer.flush()
    }

    fn write_pending(&mut self) -> io::Result<()> {
        if let Some((message, count)) = self.pending.take() {
            if self.counts {
                writeln!(self.writer, "{count} {message}")?;
            } else {
                writeln!(self.writer, "{message}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{analyze::Statistics, report::PathResult};

    fn path(p: &str) -> OutputMessage {
        OutputMessage::Path(PathResult {
            path: p.to_owned(),
            tags: vec![],
            parsed: None,
        })
    }

    fn write_all(messages: Vec<OutputMessage>, counts: bool) -> String {
        let mut buf = Vec::new();
        let mut sink = DedupSink::new(&mut buf, counts);
        for message in messages {
            sink.push(message).unwrap();
        }
        sink.flush().unwrap();
        drop(sink);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn collapse_runs() {
        let _ = simple_logger::SimpleLogger::new().init();

        assert_eq!(
            write_all(
                vec![path("/a"), path("/a"), path("/b"), path("/a"), path("/a"), path("/a")],
                true
            ),
            "2 /a\n1 /b\n3 /a\n"
        );
        assert_eq!(
            write_all(vec![path("/a"), path("/a"), path("/b")], false),
            "/a\n/b\n"
        );
    }

    #[test]
    fn statistics_not_collapsed() {
        let _ = simple_logger::SimpleLogger::new().init();

        let output = write_all(
            vec![
                OutputMessage::Statistics(Statistics::default()),
                OutputMessage::Statistics(Statistics::default()),
            ],
            true,
        );
        assert_eq!(output.lines().count(), 2);
        assert!(output.lines().all(|l| l.starts_with("1 statistics ")));
    }

    #[test]
    fn empty() {
        let _ = simple_logger::SimpleLogger::new().init();

        assert_eq!(write_all(vec![], true), "");
    }
}
