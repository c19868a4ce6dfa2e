//! Request log of one bridge session, reported when a run fails.
//!
//! Only request lines are kept, never bodies: the bridge hands out the API
//! username in a response body.

/// Direction of a recorded message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Send,
    Receive,
}

/// One request line, username already redacted by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub msg_type: MessageType,
    /// e.g. `PUT /api/<user>/config`
    pub request: String,
}

impl HistoryEntry {
    fn render(&self) -> String {
        match self.msg_type {
            MessageType::Send => format!("> {}", self.request),
            MessageType::Receive => format!("< {}", self.request),
        }
    }
}

/// Bounded log of the bridge conversation.
#[derive(Debug, Clone)]
pub struct MessageHistory {
    entries: Vec<HistoryEntry>,
    last_error: Option<String>,
    max_entries: usize,
}

impl Default for MessageHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageHistory {
    pub const DEFAULT_MAX_ENTRIES: usize = 20;

    pub fn new() -> Self {
        Self::with_max_entries(Self::DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            last_error: None,
            max_entries,
        }
    }

    pub fn record(&mut self, msg_type: MessageType, request: &str) {
        self.entries.push(HistoryEntry {
            msg_type,
            request: request.to_string(),
        });

        if self.entries.len() > self.max_entries {
            self.entries.remove(0);
        }
    }

    pub fn record_error(&mut self, error: &str) {
        self.last_error = Some(error.to_string());
    }

    pub fn summary(&self) -> HistorySummary {
        let count = |t: MessageType| self.entries.iter().filter(|e| e.msg_type == t).count();
        HistorySummary {
            send_count: count(MessageType::Send),
            receive_count: count(MessageType::Receive),
            last_request: self
                .entries
                .iter()
                .rev()
                .find(|e| e.msg_type == MessageType::Send)
                .map(|e| e.request.clone()),
            last_error: self.last_error.clone(),
            recent: self.entries.iter().map(HistoryEntry::render).collect(),
        }
    }
}

/// What a failed run logs about the bridge conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySummary {
    pub send_count: usize,
    pub receive_count: usize,
    pub last_request: Option<String>,
    pub last_error: Option<String>,
    /// Oldest first, `>` for requests and `<` for answered requests.
    pub recent: Vec<String>,
}
