use std::io;
use std::io::Read;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::thread::JoinHandle;

use encoding_rs::Encoding;

const READ_CHUNK: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn thread_name(self) -> &'static str {
        match self {
            Stream::Stdout => "depkit-stdout",
            Stream::Stderr => "depkit-stderr",
        }
    }
}

/// Lines captured from a child, in arrival order per stream and overall.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CapturedOutput {
    pub(crate) stdout: Vec<String>,
    pub(crate) stderr: Vec<String>,
    pub(crate) interleaved: Vec<String>,
}

/// Shared destination for the reader threads of one launch.
#[derive(Debug, Clone, Default)]
pub(crate) struct OutputSink {
    inner: Arc<Mutex<CapturedOutput>>,
}

impl OutputSink {
    fn push(&self, stream: Stream, line: String) {
        let mut captured = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match stream {
            Stream::Stdout => captured.stdout.push(line.clone()),
            Stream::Stderr => captured.stderr.push(line.clone()),
        }
        captured.interleaved.push(line);
    }

    /// Starts a thread that decodes `reader` until end of file.
    pub(crate) fn spawn_reader<R>(
        &self,
        reader: R,
        stream: Stream,
        encoding: &'static Encoding,
    ) -> io::Result<JoinHandle<()>>
    where
        R: Read + Send + 'static,
    {
        let sink = self.clone();
        std::thread::Builder::new()
            .name(stream.thread_name().to_string())
            .spawn(move || sink.read_lines(reader, stream, encoding))
    }

    fn read_lines<R: Read>(&self, mut reader: R, stream: Stream, encoding: &'static Encoding) {
        let mut decoder = encoding.new_decoder();
        let mut pending = String::new();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let read = match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    // Closing the write end on Windows surfaces as a broken pipe.
                    if err.kind() != io::ErrorKind::BrokenPipe {
                        tracing::debug!(?stream, "output reader stopped: {err}");
                    }
                    break;
                }
            };
            decode_into(&mut decoder, &chunk[..read], &mut pending, false);
            self.drain_complete_lines(&mut pending, stream);
        }
        decode_into(&mut decoder, &[], &mut pending, true);
        self.drain_complete_lines(&mut pending, stream);
        if !pending.is_empty() {
            self.push(stream, clean_line(&pending));
        }
    }

    fn drain_complete_lines(&self, pending: &mut String, stream: Stream) {
        while let Some(end) = pending.find('\n') {
            let line = clean_line(&pending[..end]);
            pending.drain(..=end);
            self.push(stream, line);
        }
    }

    /// Consumes the sink once every reader has been joined.
    pub(crate) fn finish(self) -> CapturedOutput {
        let captured = match Arc::try_unwrap(self.inner) {
            Ok(mutex) => mutex.into_inner().unwrap_or_else(PoisonError::into_inner),
            Err(shared) => shared
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        };
        CapturedOutput {
            stdout: trim_blank_edges(captured.stdout),
            stderr: trim_blank_edges(captured.stderr),
            interleaved: trim_blank_edges(captured.interleaved),
        }
    }
}

fn decode_into(decoder: &mut encoding_rs::Decoder, bytes: &[u8], out: &mut String, last: bool) {
    let needed = decoder
        .max_utf8_buffer_length(bytes.len())
        .unwrap_or(bytes.len().saturating_mul(3) + 16);
    out.reserve(needed);
    let (_, _, had_errors) = decoder.decode_to_string(bytes, out, last);
    if had_errors {
        tracing::trace!("replaced malformed sequences in captured output");
    }
}

fn clean_line(line: &str) -> String {
    line.trim_end_matches(['\r', '\0']).to_string()
}

pub(crate) fn trim_blank_edges(mut lines: Vec<String>) -> Vec<String> {
    let is_blank = |line: &String| line.trim().is_empty();
    while lines.last().is_some_and(is_blank) {
        lines.pop();
    }
    let leading = lines.iter().take_while(|line| is_blank(line)).count();
    lines.drain(..leading);
    lines
}
