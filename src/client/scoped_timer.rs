use tokio::time::Instant;
use tracing::trace;

/// Traces how long a registry call took when dropped
pub(crate) struct ScopedTimer {
    start: Instant,
    name: &'static str,
    member_id: String,
}

impl ScopedTimer {
    pub(crate) fn new(
        name: &'static str,
        member_id: &str,
    ) -> Self {
        Self {
            start: Instant::now(),
            name,
            member_id: member_id.to_string(),
        }
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        trace!(
            target: "timing",
            member = %self.member_id,
            "[TIMING] {} took {} ms",
            self.name,
            elapsed.as_millis()
        );
    }
}
