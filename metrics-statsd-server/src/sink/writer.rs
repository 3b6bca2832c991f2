use std::io::Write as _;

#[derive(Clone, Copy)]
pub(crate) enum LineValue {
    Integer(u64),
    FloatingPoint(f64),
}

/// Writes metric points in the Graphite plaintext format.
///
/// Each point is written as `<path> <value> <timestamp>\n`. Integers are written as-is, while floating-point values are
/// always written in fixed-point notation with six decimal places, to match what existing statsd implementations send.
/// Every line in a payload shares the same timestamp.
pub(crate) struct LineWriter {
    buf: Vec<u8>,
    timestamp: u64,
    int_writer: itoa::Buffer,
    lines: usize,
}

impl LineWriter {
    /// Creates a new `LineWriter` stamping every line with `timestamp`, in Unix seconds.
    pub fn new(timestamp: u64) -> Self {
        Self { buf: Vec::new(), timestamp, int_writer: itoa::Buffer::new(), lines: 0 }
    }

    /// Writes a single line.
    ///
    /// The metric path is built by concatenating `prefix`, `key`, and `suffix`, none of which are escaped: the caller
    /// is responsible for passing sanitized keys.
    pub fn write_line(&mut self, prefix: &str, key: &str, suffix: &str, value: LineValue) {
        self.buf.extend_from_slice(prefix.as_bytes());
        self.buf.extend_from_slice(key.as_bytes());
        self.buf.extend_from_slice(suffix.as_bytes());
        self.buf.push(b' ');

        match value {
            LineValue::Integer(v) => {
                self.buf.extend_from_slice(self.int_writer.format(v).as_bytes());
            }
            LineValue::FloatingPoint(v) => {
                // Writing to a `Vec<u8>` can't fail.
                let _ = write!(self.buf, "{:.6}", v);
            }
        }

        self.buf.push(b' ');
        self.buf.extend_from_slice(self.int_writer.format(self.timestamp).as_bytes());
        self.buf.push(b'\n');
        self.lines += 1;
    }

    /// Number of lines written so far.
    pub fn lines(&self) -> usize {
        self.lines
    }

    /// Consumes the writer, returning the payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::{LineValue, LineWriter};

    #[test]
    fn writes_lines() {
        let mut writer = LineWriter::new(1_700_000_000);
        writer.write_line("stats.", "foo", "", LineValue::FloatingPoint(0.1));
        writer.write_line("stats_counts.", "foo", "", LineValue::FloatingPoint(-2.0));
        writer.write_line("stats.timers.", "bar", ".count", LineValue::Integer(7));

        assert_eq!(writer.lines(), 3);
        assert_eq!(
            String::from_utf8(writer.into_payload()).unwrap(),
            "stats.foo 0.100000 1700000000\n\
             stats_counts.foo -2.000000 1700000000\n\
             stats.timers.bar.count 7 1700000000\n"
        );
    }

    #[test]
    fn empty_writer() {
        let writer = LineWriter::new(0);
        assert_eq!(writer.lines(), 0);
        assert!(writer.into_payload().is_empty());
    }
}
