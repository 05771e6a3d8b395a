use crate::models::ChatMessage;
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Inner {
    pending: Vec<ChatMessage>,
    history: Vec<ChatMessage>,
}

/// Chat messages waiting for the next tally tick.
///
/// One lock guards both sides so a drain never sees half of an append and a
/// message can never land in two drains. Everything appended is also kept in
/// the round's history, which draining does not touch.
#[derive(Debug, Default)]
pub struct MessageBuffer {
    inner: Mutex<Inner>,
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, msg: ChatMessage) {
        let mut inner = self.inner.lock();
        inner.history.push(msg.clone());
        inner.pending.push(msg);
    }

    pub fn append_batch(&self, msgs: impl IntoIterator<Item = ChatMessage>) {
        for msg in msgs {
            self.append(msg);
        }
    }

    /// Takes everything buffered so far and leaves the buffer empty.
    pub fn drain(&self) -> Vec<ChatMessage> {
        std::mem::take(&mut self.inner.lock().pending)
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.inner.lock().history.clone()
    }
}

#[cfg(test)]
impl MessageBuffer {
    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().pending.is_empty()
    }
}
