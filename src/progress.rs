// src/progress.rs

//! Percentage progress reporting
//!
//! Long operations report integer percentages to an optional caller sink.
//! `Progress` wraps the sink and enforces the reporting contract: values
//! are clamped to 0..=100, never decrease, and the same value is never
//! reported twice in a row.

use tracing::info;

/// Receives percentage updates
pub trait ProgressSink {
    fn report(&mut self, percent: u8);
}

impl<F: FnMut(u8)> ProgressSink for F {
    fn report(&mut self, percent: u8) {
        self(percent)
    }
}

/// Sink that logs each update through tracing
#[derive(Debug)]
pub struct LogSink {
    name: String,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ProgressSink for LogSink {
    fn report(&mut self, percent: u8) {
        info!("{}: {}%", self.name, percent);
    }
}

/// Monotonic, deduplicating view over an optional sink
pub struct Progress<'a> {
    sink: Option<&'a mut dyn ProgressSink>,
    last: Option<u8>,
}

impl<'a> Progress<'a> {
    pub fn new(sink: Option<&'a mut dyn ProgressSink>) -> Self {
        Self { sink, last: None }
    }

    /// Progress that reports nowhere
    pub fn silent() -> Self {
        Self::new(None)
    }

    /// Last value handed to the sink
    pub fn last(&self) -> Option<u8> {
        self.last
    }

    pub fn report(&mut self, percent: u32) {
        let percent = percent.min(100) as u8;
        if self.last.is_some_and(|last| percent <= last) {
            return;
        }
        self.last = Some(percent);
        if let Some(sink) = self.sink.as_mut() {
            sink.report(percent);
        }
    }

    /// Report `now/total` of the way from `span.start` to `span.finish`
    pub fn report_within(&mut self, span: Span, now: u64, total: u64) {
        self.report(span.at(now, total));
    }

    pub fn finish(&mut self) {
        self.report(100);
    }
}

/// A sub-range of an operation's 0..=100 scale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: u32,
    pub finish: u32,
}

impl Span {
    /// Range of step `done` out of `count` equal steps
    pub fn step(done: usize, count: usize) -> Self {
        let count = count.max(1) as u64;
        Self {
            start: (100 * done as u64 / count) as u32,
            finish: (100 * (done as u64 + 1) / count).min(100) as u32,
        }
    }

    /// Percentage `now/total` of the way through the range
    pub fn at(&self, now: u64, total: u64) -> u32 {
        if total == 0 {
            return self.start;
        }
        let now = now.min(total);
        let width = u64::from(self.finish.saturating_sub(self.start));
        self.start + (width * now / total) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_are_monotonic_and_unique() {
        let mut seen = Vec::new();
        let mut sink = |p: u8| seen.push(p);
        let mut progress = Progress::new(Some(&mut sink));

        for p in [0, 0, 50, 25, 50, 75, 250, 100] {
            progress.report(p);
        }
        assert_eq!(progress.last(), Some(100));
        drop(progress);

        assert_eq!(seen, vec![0, 50, 75, 100]);
    }

    #[test]
    fn test_silent_progress_tracks_last() {
        let mut progress = Progress::silent();
        progress.report(40);
        progress.finish();
        assert_eq!(progress.last(), Some(100));
    }

    #[test]
    fn test_step_spans() {
        assert_eq!(Span::step(0, 3), Span { start: 0, finish: 33 });
        assert_eq!(Span::step(1, 3), Span { start: 33, finish: 66 });
        assert_eq!(Span::step(2, 3), Span { start: 66, finish: 100 });
        assert_eq!(Span::step(0, 0), Span { start: 0, finish: 100 });
    }

    #[test]
    fn test_span_interpolation() {
        let span = Span { start: 50, finish: 100 };
        assert_eq!(span.at(0, 200), 50);
        assert_eq!(span.at(100, 200), 75);
        assert_eq!(span.at(500, 200), 100);
        assert_eq!(span.at(10, 0), 50);
    }

    #[test]
    fn test_report_within_dedups_byte_updates() {
        let mut seen = Vec::new();
        let mut sink = |p: u8| seen.push(p);
        let mut progress = Progress::new(Some(&mut sink));
        let span = Span::step(1, 2);

        for now in [0, 1, 2, 500, 1000] {
            progress.report_within(span, now, 1000);
        }
        drop(progress);

        assert_eq!(seen, vec![50, 75, 100]);
    }
}
