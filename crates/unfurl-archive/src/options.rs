use std::path::PathBuf;
use std::sync::Arc;

/// Observable side effects of an extraction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtractEvent {
    /// A regular file was fully written.
    FileWritten { path: PathBuf, bytes: u64 },
    /// A failed extraction removed what it had created.
    RolledBack { path: PathBuf },
}

pub type EventCallback = Arc<dyn Fn(&ExtractEvent) + Send + Sync>;

#[derive(Clone, Default)]
pub struct ExtractOptions {
    pub strip_components: usize,
    pub remove_on_fail: bool,
    pub on_event: Option<EventCallback>,
}

impl ExtractOptions {
    pub fn strip_components(mut self, n: usize) -> Self {
        self.strip_components = n;
        self
    }

    pub fn remove_on_fail(mut self, enabled: bool) -> Self {
        self.remove_on_fail = enabled;
        self
    }

    pub fn on_event(mut self, callback: EventCallback) -> Self {
        self.on_event = Some(callback);
        self
    }

    pub(crate) fn emit(&self, event: ExtractEvent) {
        if let Some(callback) = &self.on_event {
            callback(&event);
        }
    }
}
