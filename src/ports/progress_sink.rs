/// Where the fetcher and orchestrator send their human-readable progress lines.
///
/// In production this is the job registry's log appender bound to one job id;
/// tests inject their own sink. Keeping this behind a trait decouples the
/// fetch logic from the job model.
pub trait ProgressSink: Send + Sync {
    fn log(&self, message: String);
}

/// Sink that drops every line, for callers that do not track progress
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn log(&self, _message: String) {}
}
