use restyle_core::TerminalSurface;

/// Lines kept before the oldest ones are dropped.
const SCROLLBACK: usize = 5_000;

/// Minimal line/cursor emulator backing the chat transcript.
///
/// Understands carriage return, line feed and backspace, which is all the
/// controller writes. Printable characters overwrite whatever is under the
/// cursor, padding with spaces when the cursor sits past the end of a line.
#[derive(Debug, Clone)]
pub struct Transcript {
    lines: Vec<Vec<char>>,
    row: usize,
    col: usize,
}

impl Default for Transcript {
    fn default() -> Self {
        Self {
            lines: vec![Vec::new()],
            row: 0,
            col: 0,
        }
    }
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.lines.iter().map(|line| line.iter().collect())
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// (row, column) of the cursor.
    pub fn cursor(&self) -> (usize, usize) {
        (self.row, self.col)
    }

    fn put(&mut self, c: char) {
        let line = &mut self.lines[self.row];
        if self.col < line.len() {
            line[self.col] = c;
        } else {
            line.resize(self.col, ' ');
            line.push(c);
        }
        self.col += 1;
    }

    fn line_feed(&mut self) {
        self.row += 1;
        if self.row == self.lines.len() {
            self.lines.push(Vec::new());
        }
        if self.lines.len() > SCROLLBACK {
            let excess = self.lines.len() - SCROLLBACK;
            self.lines.drain(..excess);
            self.row -= excess;
        }
    }
}

impl TerminalSurface for Transcript {
    fn write(&mut self, text: &str) {
        for c in text.chars() {
            match c {
                '\r' => self.col = 0,
                '\n' => self.line_feed(),
                '\x08' => self.col = self.col.saturating_sub(1),
                '\t' => {
                    for _ in 0..(4 - self.col % 4) {
                        self.put(' ');
                    }
                }
                c if c.is_control() => {}
                c => self.put(c),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen(t: &Transcript) -> Vec<String> {
        t.lines().collect()
    }

    #[test]
    fn test_crlf_starts_new_line() {
        let mut t = Transcript::new();
        t.write("Loading model...\r\nModel ready.\r\n> ");
        assert_eq!(screen(&t), vec!["Loading model...", "Model ready.", "> "]);
        assert_eq!(t.cursor(), (2, 2));
    }

    #[test]
    fn test_backspace_erase_sequence() {
        let mut t = Transcript::new();
        t.write("> abc");
        t.write("\x08 \x08");
        assert_eq!(screen(&t), vec!["> ab "]);
        assert_eq!(t.cursor(), (0, 4));
        t.write("d");
        assert_eq!(screen(&t), vec!["> abd"]);
    }

    #[test]
    fn test_carriage_return_overwrites() {
        let mut t = Transcript::new();
        t.write("hello\rJ");
        assert_eq!(screen(&t), vec!["Jello"]);
    }

    #[test]
    fn test_bare_line_feed_keeps_column() {
        let mut t = Transcript::new();
        t.write("ab\ncd");
        assert_eq!(screen(&t), vec!["ab", "  cd"]);
    }

    #[test]
    fn test_backspace_at_line_start_stays_put() {
        let mut t = Transcript::new();
        t.write("\x08\x08x");
        assert_eq!(screen(&t), vec!["x"]);
    }

    #[test]
    fn test_scrollback_is_bounded() {
        let mut t = Transcript::new();
        for i in 0..(SCROLLBACK + 10) {
            t.write(&format!("{i}\r\n"));
        }
        assert_eq!(t.line_count(), SCROLLBACK);
        assert_eq!(t.cursor().0, SCROLLBACK - 1);
        assert_eq!(t.lines().next().unwrap(), "11");
    }
}
