/// Frame width in characters, counted before newline escaping.
pub const FRAME_CHARS: usize = 50;
/// Last frame of every response stream.
pub const DONE_FRAME: &str = "DONE";
pub const ERROR_FRAME: &str = "I apologize, but I encountered an error. Please try again.";
/// Stored as the assistant turn when the model produced no text.
pub const EMPTY_RESPONSE: &str =
    "I apologize, but I encountered an error processing your request. Please try again.";

/// Newlines become the two characters `\n` so a frame fits on one event-stream line.
/// Carriage returns also end an event-stream line and are dropped.
pub fn escape_newlines(s: &str) -> String {
    s.replace('\r', "").replace('\n', "\\n")
}

/// Regroups model fragments into fixed-width frames.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: String,
    pending_chars: usize,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fragment and returns every frame that is now complete.
    pub fn push(&mut self, fragment: &str) -> Vec<String> {
        self.pending.push_str(fragment);
        self.pending_chars += fragment.chars().count();

        let mut frames = Vec::new();
        while self.pending_chars >= FRAME_CHARS {
            let split = self
                .pending
                .char_indices()
                .nth(FRAME_CHARS)
                .map(|(i, _)| i)
                .unwrap_or(self.pending.len());
            let rest = self.pending.split_off(split);
            frames.push(escape_newlines(&self.pending));
            self.pending = rest;
            self.pending_chars -= FRAME_CHARS;
        }
        frames
    }

    /// Whatever is left, if anything.
    pub fn finish(&mut self) -> Option<String> {
        self.pending_chars = 0;
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(escape_newlines(&rest))
    }
}
