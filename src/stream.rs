//! Tagged chunk stream between an exchange worker and its client.
//!
//! One exchange produces one linear stream. Every chunk carries its origin so
//! a client can render model prose and tool output differently from the tag
//! alone; ordering on the channel is emission order.

use std::sync::mpsc::{self, Receiver, Sender};

/// Origin of one streamed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOrigin {
    /// Model-produced prose, forwarded fragment by fragment.
    Assistant,
    /// One complete tool output, forwarded as a single atomic block.
    Tool,
}

impl ChunkOrigin {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// One ordered piece of exchange output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedChunk {
    pub origin: ChunkOrigin,
    pub text: String,
}

impl TaggedChunk {
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            origin: ChunkOrigin::Assistant,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn tool(text: impl Into<String>) -> Self {
        Self {
            origin: ChunkOrigin::Tool,
            text: text.into(),
        }
    }

    /// Renders the chunk for transports without chunk structure, wrapping
    /// tool output in visible delimiters so it stays distinguishable from
    /// prose in a flat text stream.
    #[must_use]
    pub fn render_plain(&self) -> String {
        match self.origin {
            ChunkOrigin::Assistant => self.text.clone(),
            ChunkOrigin::Tool => format!("\n[tool]\n{}\n[/tool]\n", self.text),
        }
    }
}

/// Sending half of an exchange stream.
///
/// A dropped receiver flips the mux to disconnected; sends become no-ops and
/// the worker observes the state to wind the exchange down without losing
/// the in-flight tool step.
#[derive(Debug)]
pub struct StreamMux {
    sender: Sender<TaggedChunk>,
    connected: bool,
}

impl StreamMux {
    /// Creates a connected mux plus the client's receiving end.
    #[must_use]
    pub fn channel() -> (Self, Receiver<TaggedChunk>) {
        let (sender, receiver) = mpsc::channel();
        (
            Self {
                sender,
                connected: true,
            },
            receiver,
        )
    }

    /// Forwards one assistant fragment. Returns false once the client is gone.
    pub fn send_assistant(&mut self, text: &str) -> bool {
        self.send(TaggedChunk::assistant(text))
    }

    /// Forwards one complete tool output block. Returns false once the client
    /// is gone.
    pub fn send_tool(&mut self, text: &str) -> bool {
        self.send(TaggedChunk::tool(text))
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn send(&mut self, chunk: TaggedChunk) -> bool {
        if !self.connected {
            return false;
        }

        if self.sender.send(chunk).is_err() {
            self.connected = false;
        }

        self.connected
    }
}
