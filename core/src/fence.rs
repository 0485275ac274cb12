//! Incremental fence splitter
//!
//! The streaming advisor emits prose reasoning followed by a single fenced
//! code block containing the fix. Chunks arrive at arbitrary boundaries — a
//! fence marker can be split across two chunks — so the splitter carries
//! unresolved trailing backticks between pushes. Everything before the first
//! marker is narrative and is released as soon as it is known to be
//! narrative; everything after it belongs to the code block.

const FENCE: &str = "```";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SplitterState {
    /// Before the first fence marker: text is narrative
    Narrative,
    /// Inside the fence's opening line, consuming the language tag
    FenceHeader,
    /// Inside the code block
    Code,
    /// After the closing marker: everything else is discarded
    Done,
}

/// Output of [`FenceSplitter::finish`]
#[derive(Debug, Clone)]
pub struct FenceSplit {
    /// Narrative text still held back when the stream ended (only possible
    /// when the stream ends on a partial marker and no fence ever opened)
    pub trailing_reasoning: Option<String>,
    /// Content of the fenced block, `None` when no fence was observed
    pub code: Option<String>,
}

/// Streaming splitter for "prose, then one fenced code block".
#[derive(Debug)]
pub struct FenceSplitter {
    state: SplitterState,
    /// Unresolved trailing backticks (0..=2 chars) from the previous push
    carry: String,
    code: String,
    fence_seen: bool,
}

impl Default for FenceSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl FenceSplitter {
    pub fn new() -> Self {
        Self {
            state: SplitterState::Narrative,
            carry: String::new(),
            code: String::new(),
            fence_seen: false,
        }
    }

    /// True once the opening fence marker has been observed.
    ///
    /// From that instant no further narrative is released: trailing chunks
    /// belong to the code block, not the prose.
    pub fn fence_seen(&self) -> bool {
        self.fence_seen
    }

    /// Feed one chunk; returns narrative text released by this chunk.
    pub fn push(&mut self, chunk: &str) -> Option<String> {
        let mut buffer = std::mem::take(&mut self.carry);
        buffer.push_str(chunk);
        let mut released = String::new();

        loop {
            match self.state {
                SplitterState::Narrative => {
                    if let Some(index) = buffer.find(FENCE) {
                        released.push_str(&buffer[..index]);
                        buffer = buffer[index + FENCE.len()..].to_string();
                        self.fence_seen = true;
                        self.state = SplitterState::FenceHeader;
                    } else {
                        let keep = trailing_backticks(&buffer).min(FENCE.len() - 1);
                        let split_at = buffer.len() - keep;
                        released.push_str(&buffer[..split_at]);
                        self.carry = buffer[split_at..].to_string();
                        break;
                    }
                }
                SplitterState::FenceHeader => {
                    // Discard the language tag up to and including the newline
                    if let Some(index) = buffer.find('\n') {
                        buffer = buffer[index + 1..].to_string();
                        self.state = SplitterState::Code;
                    } else {
                        // Header still incomplete; nothing here is code yet
                        self.carry = buffer;
                        break;
                    }
                }
                SplitterState::Code => {
                    if let Some(index) = buffer.find(FENCE) {
                        self.code.push_str(&buffer[..index]);
                        self.state = SplitterState::Done;
                        buffer.clear();
                        break;
                    } else {
                        let keep = trailing_backticks(&buffer).min(FENCE.len() - 1);
                        let split_at = buffer.len() - keep;
                        self.code.push_str(&buffer[..split_at]);
                        self.carry = buffer[split_at..].to_string();
                        break;
                    }
                }
                SplitterState::Done => break,
            }
        }

        if released.is_empty() {
            None
        } else {
            Some(released)
        }
    }

    /// End of stream: resolve anything still carried.
    pub fn finish(mut self) -> FenceSplit {
        let carry = std::mem::take(&mut self.carry);
        let trailing_reasoning = match self.state {
            SplitterState::Narrative if !carry.is_empty() => Some(carry),
            SplitterState::Code => {
                // Unclosed fence: carried backticks were code after all
                self.code.push_str(&carry);
                None
            }
            _ => None,
        };

        let code = if self.fence_seen {
            let trimmed = self.code.trim_end_matches('\n').to_string();
            Some(trimmed)
        } else {
            None
        };

        FenceSplit {
            trailing_reasoning,
            code,
        }
    }
}

/// Number of '`' characters at the end of the buffer
fn trailing_backticks(buffer: &str) -> usize {
    buffer.chars().rev().take_while(|c| *c == '`').count()
}
