/// One complete CSV record; `line` is the 1-based physical line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalRow {
    pub line: usize,
    pub text: String,
}

/// Quoted row still open when the input ran out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnterminatedRow {
    pub line: usize,
    pub physical_lines: usize,
}

/// Merges physical lines into logical rows by tracking quote parity.
///
/// The header line is consumed on construction and never yielded. A row stays
/// open while the number of `"` characters accumulated for it is odd; the line
/// break swallowed by the split is restored before the next physical line is
/// appended. Blank rows are skipped. If the document ends while a row is still
/// open the tail is not yielded; it is reported through [`LogicalRows::unterminated`].
pub struct LogicalRows<'a> {
    lines: std::iter::Enumerate<std::str::Split<'a, char>>,
    pending: String,
    pending_start: usize,
    pending_lines: usize,
    quote_count: usize,
    physical_lines: usize,
    unterminated: Option<UnterminatedRow>,
}

impl<'a> LogicalRows<'a> {
    pub fn new(document: &'a str) -> Self {
        let mut lines = document.split('\n').enumerate();
        let physical_lines = usize::from(lines.next().is_some());

        Self {
            lines,
            pending: String::new(),
            pending_start: 0,
            pending_lines: 0,
            quote_count: 0,
            physical_lines,
            unterminated: None,
        }
    }

    /// Physical lines consumed so far, header included.
    pub fn physical_lines(&self) -> usize {
        self.physical_lines
    }

    pub fn unterminated(&self) -> Option<&UnterminatedRow> {
        self.unterminated.as_ref()
    }

    fn take_pending(&mut self) -> (usize, String) {
        let start = self.pending_start;
        self.pending_lines = 0;
        self.quote_count = 0;
        (start, std::mem::take(&mut self.pending))
    }
}

impl Iterator for LogicalRows<'_> {
    type Item = LogicalRow;

    fn next(&mut self) -> Option<LogicalRow> {
        while let Some((index, raw_line)) = self.lines.next() {
            self.physical_lines += 1;
            let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);

            if self.pending_lines == 0 {
                self.pending_start = index + 1;
            }
            self.pending.push_str(line);
            self.pending_lines += 1;
            self.quote_count += line.matches('"').count();

            if self.quote_count % 2 == 1 {
                self.pending.push('\n');
                continue;
            }

            let (start, text) = self.take_pending();
            if text.trim().is_empty() {
                continue;
            }

            return Some(LogicalRow { line: start, text });
        }

        if self.pending_lines > 0 {
            self.unterminated = Some(UnterminatedRow {
                line: self.pending_start,
                physical_lines: self.pending_lines,
            });
            self.take_pending();
        }

        None
    }
}
