use parking_lot::Mutex;
use tracing::info;

/// Opens a creative's destination. Called synchronously on activation and
/// never gated on engagement recording.
pub trait Navigator: Send + Sync {
    fn open(&self, url: &str);
}

/// Navigator for headless hosts: logs and remembers every destination opened.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    opened: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn open(&self, url: &str) {
        info!(url, "Opening advertisement destination");
        self.opened.lock().push(url.to_string());
    }
}
