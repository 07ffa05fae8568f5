/// Minimal event type for traceability.
///
/// Library crates do not link a logger; engine components emit events here
/// and the hosting binary forwards drained events to its own logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Index of the visibility pass the event belongs to.
    pub pass: u64,
    pub kind: &'static str,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct EventBus {
    events: Vec<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, pass: u64, kind: &'static str, message: impl Into<String>) {
        self.events.push(Event {
            pass,
            kind,
            message: message.into(),
        });
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn drain(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}
