/// Fixed-width tabular output, matching the acceptance format: 16-wide
/// right-aligned cells, `+` separators, long values truncated with `...`,
/// and a bounded response buffer that elides overflow.
pub const COL_WIDTH: usize = 16;
const RECORD_COUNT_LENGTH: usize = 40;
pub const BUFFER_LENGTH: usize = 8192;

/// The bounded byte buffer a statement's rows are rendered into. Once the
/// budget is spent, further rows are dropped and the footer is prefixed
/// with an ellipsis marker.
pub struct ResponseBuffer {
    data: String,
    ellipsis: bool,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        ResponseBuffer {
            data: String::new(),
            ellipsis: false,
        }
    }

    fn append(&mut self, s: &str) {
        if !self.ellipsis && self.data.len() + RECORD_COUNT_LENGTH + s.len() < BUFFER_LENGTH {
            self.data.push_str(s);
        } else {
            self.ellipsis = true;
        }
    }

    /// Append without the row budget; used for small utility output.
    pub fn append_unbounded(&mut self, s: &str) {
        self.data.push_str(s);
    }

    pub fn into_string(self) -> String {
        self.data
    }
}

impl Default for ResponseBuffer {
    fn default() -> Self {
        ResponseBuffer::new()
    }
}

/// Renders rows of a fixed column count.
pub struct RecordPrinter {
    num_cols: usize,
}

impl RecordPrinter {
    pub fn new(num_cols: usize) -> Self {
        assert!(num_cols > 0);
        RecordPrinter { num_cols }
    }

    /// `+------------------+...` line.
    pub fn print_separator(&self, buf: &mut ResponseBuffer) {
        let mut line = String::new();
        for _ in 0..self.num_cols {
            line.push('+');
            line.push_str(&"-".repeat(COL_WIDTH + 2));
        }
        line.push_str("+\n");
        buf.append(&line);
    }

    /// `| value | value |` line; values wider than a cell are truncated
    /// with a `...` marker.
    pub fn print_record(&self, rec: &[String], buf: &mut ResponseBuffer) {
        assert_eq!(rec.len(), self.num_cols);
        let mut line = String::new();
        for col in rec {
            let cell = if col.len() > COL_WIDTH {
                format!("{}...", &col[..COL_WIDTH - 3])
            } else {
                col.clone()
            };
            line.push_str(&format!("| {:>width$} ", cell, width = COL_WIDTH));
        }
        line.push_str("|\n");
        buf.append(&line);
    }

    /// Footer with the row count, prefixed by the elision marker when the
    /// buffer overflowed.
    pub fn print_record_count(num_rec: usize, buf: &mut ResponseBuffer) {
        if buf.ellipsis {
            buf.append_unbounded("... ...\n");
        }
        buf.append_unbounded(&format!("Total record(s): {}\n", num_rec));
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_row_format() {
        let printer = RecordPrinter::new(2);
        let mut buf = ResponseBuffer::new();
        printer.print_separator(&mut buf);
        printer.print_record(
            &[String::from("id"), String::from("name")],
            &mut buf,
        );
        printer.print_separator(&mut buf);
        printer.print_record(&[String::from("2"), String::from("by")], &mut buf);
        printer.print_separator(&mut buf);
        RecordPrinter::print_record_count(1, &mut buf);
        let out = buf.into_string();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!("+------------------+------------------+", lines[0]);
        assert_eq!("|               id |             name |", lines[1]);
        assert_eq!("|                2 |               by |", lines[3]);
        assert_eq!("Total record(s): 1", lines[5]);
    }

    #[test]
    fn test_truncation() {
        let printer = RecordPrinter::new(1);
        let mut buf = ResponseBuffer::new();
        printer.print_record(
            &[String::from("abcdefghijklmnopqrstuvwxyz")],
            &mut buf,
        );
        let out = buf.into_string();
        assert!(out.contains("abcdefghijklm..."));
    }

    #[test]
    fn test_bounded_buffer_elides() {
        let printer = RecordPrinter::new(1);
        let mut buf = ResponseBuffer::new();
        for i in 0..1000 {
            printer.print_record(&[format!("row{}", i)], &mut buf);
        }
        RecordPrinter::print_record_count(1000, &mut buf);
        let out = buf.into_string();
        assert!(out.len() < BUFFER_LENGTH + 64);
        assert!(out.contains("... ...\n"));
        assert!(out.ends_with("Total record(s): 1000\n"));
    }
}
