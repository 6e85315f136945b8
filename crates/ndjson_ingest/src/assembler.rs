/// Accumulates text chunks and splits them into complete lines.
///
/// Everything after the last `\n` seen so far is retained as the fragment and prefixed to the
/// next chunk. Lines are returned without their terminating newline, in feed order; consecutive
/// newlines yield empty lines, which callers are expected to skip.
#[derive(Debug, Clone, Default)]
pub struct LineAssembler {
    fragment: String,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` to the retained fragment and returns every line it completes.
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;
        while let Some(idx) = rest.find('\n') {
            let mut line = std::mem::take(&mut self.fragment);
            line.push_str(&rest[..idx]);
            lines.push(line);
            rest = &rest[idx + 1..];
        }
        self.fragment.push_str(rest);
        lines
    }

    /// The incomplete trailing segment retained between feeds.
    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    pub fn pending_bytes(&self) -> usize {
        self.fragment.len()
    }

    /// Removes and returns the retained fragment.
    pub fn take_fragment(&mut self) -> String {
        std::mem::take(&mut self.fragment)
    }

    /// Drops the retained fragment. Must be called before a restarted stream is fed.
    pub fn reset(&mut self) {
        self.fragment.clear();
    }
}
