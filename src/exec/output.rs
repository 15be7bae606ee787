// src/exec/output.rs

//! Line-prefixed output shared by every process a runner spawns.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use crossterm::style::{Color, Stylize};

/// Shared destination for guarded-command output.
///
/// Each call writes one complete buffer under the lock, so lines coming from
/// different processes (or stdout and stderr of one process) never interleave
/// mid-line.
#[derive(Clone)]
pub struct OutputSink {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSink").finish_non_exhaustive()
    }
}

impl Default for OutputSink {
    fn default() -> Self {
        Self::stdout()
    }
}

impl OutputSink {
    /// Sink writing to the guard's own stdout.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Write `line` preceded by `prefix`, terminating it with a newline if it
    /// has none.
    pub fn write_prefixed(&self, prefix: &str, line: &[u8]) -> io::Result<()> {
        let mut buf = Vec::with_capacity(prefix.len() + line.len() + 1);
        buf.extend_from_slice(prefix.as_bytes());
        buf.extend_from_slice(line);
        if !line.ends_with(b"\n") {
            buf.push(b'\n');
        }
        self.write_all_locked(&buf)
    }

    fn write_all_locked(&self, buf: &[u8]) -> io::Result<()> {
        let mut out = self.lock();
        out.write_all(buf)?;
        out.flush()
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn Write + Send>> {
        // A panic while holding the lock leaves a usable writer behind.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_all_locked(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock().flush()
    }
}

/// Writer that inserts a prefix at the start of every line of a raw byte
/// stream (used for pseudo-terminal output, which is not line-buffered).
#[derive(Debug)]
pub struct PrefixWriter<W: Write> {
    inner: W,
    prefix: String,
    at_line_start: bool,
}

impl<W: Write> PrefixWriter<W> {
    pub fn new(inner: W, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
            at_line_start: true,
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for PrefixWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.prefix.is_empty() {
            return self.inner.write_all(buf).map(|_| buf.len());
        }

        let mut out = Vec::with_capacity(buf.len() + self.prefix.len());
        for segment in buf.split_inclusive(|b| *b == b'\n') {
            if self.at_line_start {
                out.extend_from_slice(self.prefix.as_bytes());
            }
            out.extend_from_slice(segment);
            self.at_line_start = segment.ends_with(b"\n");
        }
        self.inner.write_all(&out)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

const PALETTE: [Color; 6] = [
    Color::Green,
    Color::Cyan,
    Color::Magenta,
    Color::Yellow,
    Color::Blue,
    Color::Red,
];

/// Render a prefix spec such as `"app |@green"` or `"api |@208"`.
///
/// Text after the last `@` names a colour (a crossterm colour name or an ANSI
/// 256 index); an unknown colour leaves the text uncoloured. A trailing space
/// is added so output does not run into the prefix.
pub fn format_prefix(spec: &str) -> String {
    let (text, color) = match spec.rsplit_once('@') {
        Some((text, name)) => (text, parse_color(name)),
        None => (spec, None),
    };
    if text.is_empty() {
        return String::new();
    }

    let trimmed = text.trim_end();
    let trailing = &text[trimmed.len()..];
    let trailing = if trailing.is_empty() { " " } else { trailing };

    match color {
        Some(color) => format!("{}{}", trimmed.with(color), trailing),
        None => format!("{trimmed}{trailing}"),
    }
}

/// Prefix used when a guard names none: the program's file name with a
/// colour picked from a hash of the whole command line.
pub fn default_prefix(args: &[String]) -> String {
    let program = args
        .first()
        .map(|p| {
            std::path::Path::new(p)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.clone())
        })
        .unwrap_or_default();

    let hash = blake3::hash(args.join("\0").as_bytes());
    let idx = hash.as_bytes()[0] as usize % PALETTE.len();

    format!("{} ", format!("{program} |").with(PALETTE[idx]))
}

fn parse_color(name: &str) -> Option<Color> {
    let name = name.trim();
    if let Ok(n) = name.parse::<u8>() {
        return Some(Color::AnsiValue(n));
    }
    Color::try_from(name.to_lowercase().as_str()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Buf(Arc<Mutex<Vec<u8>>>);

    impl Write for Buf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Buf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn prefix_writer_handles_split_lines() {
        let mut w = PrefixWriter::new(Vec::new(), "> ");
        w.write_all(b"hel").unwrap();
        w.write_all(b"lo\nwor").unwrap();
        w.write_all(b"ld\n\n").unwrap();
        assert_eq!(String::from_utf8(w.into_inner()).unwrap(), "> hello\n> world\n> \n");
    }

    #[test]
    fn sink_terminates_lines() {
        let buf = Buf::default();
        let sink = OutputSink::new(buf.clone());
        sink.write_prefixed("a | ", b"one\n").unwrap();
        sink.write_prefixed("a | ", b"two").unwrap();
        assert_eq!(buf.text(), "a | one\na | two\n");
    }

    #[test]
    fn prefix_colour_is_optional() {
        assert_eq!(format_prefix("app |"), "app | ");
        assert_eq!(format_prefix("app |@nonsense"), "app | ");
        assert_eq!(format_prefix(""), "");

        let coloured = format_prefix("app |@green");
        assert!(coloured.contains("app |"));
        assert!(coloured.contains('\u{1b}'), "{coloured:?}");
    }

    #[test]
    fn default_prefix_is_stable() {
        let args = vec!["/usr/bin/cargo".to_string(), "test".to_string()];
        assert_eq!(default_prefix(&args), default_prefix(&args));
        assert!(default_prefix(&args).contains("cargo |"));
    }
}
