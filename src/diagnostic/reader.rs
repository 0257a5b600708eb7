//! Line cursor shared by the matchers of one output stream.

/// A forward-only line cursor with push-back.
///
/// Matchers that need read-ahead pull lines through [`LineReader::read_line`]
/// and return the ones they did not use with [`LineReader::push_back`].
/// Pushed-back lines are handed out again before the underlying source is
/// consulted, most recent first.
pub struct LineReader<'a> {
    lines: Box<dyn Iterator<Item = String> + 'a>,
    pushed: Vec<String>,
}

impl<'a> LineReader<'a> {
    /// Wrap any line source.
    pub fn new<I>(lines: I) -> Self
    where
        I: IntoIterator<Item = String>,
        I::IntoIter: 'a,
    {
        Self { lines: Box::new(lines.into_iter()), pushed: Vec::new() }
    }

    /// Create a reader over a block of text.
    pub fn from_text(text: &'a str) -> Self {
        Self::new(text.lines().map(str::to_string))
    }

    /// Read the next line, or `None` at end of stream.
    pub fn read_line(&mut self) -> Option<String> {
        self.pushed.pop().or_else(|| self.lines.next())
    }

    /// Look at the next line without consuming it.
    pub fn peek(&mut self) -> Option<&str> {
        if self.pushed.is_empty() {
            let line = self.lines.next()?;
            self.pushed.push(line);
        }
        self.pushed.last().map(String::as_str)
    }

    /// Return a line so the next [`read_line`](Self::read_line) yields it.
    pub fn push_back(&mut self, line: String) {
        self.pushed.push(line);
    }

    /// Whether pushed-back lines are waiting to be read again.
    pub fn has_pushed_back(&self) -> bool {
        !self.pushed.is_empty()
    }
}

impl std::fmt::Debug for LineReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineReader").field("pushed", &self.pushed).finish()
    }
}
