//! Progress notification.
//!
//! Every report is a completed fraction in `0.0..=1.0`. Sinks are advisory:
//! they cannot pause or cancel the work that reports to them.

use std::sync::mpsc::SyncSender;

pub trait ProgressSink {
    fn report(&self, fraction: f32);
}

impl<F> ProgressSink for F
where
    F: Fn(f32),
{
    fn report(&self, fraction: f32) {
        self(fraction)
    }
}

/// Discards every report.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _fraction: f32) {}
}

/// Forwards reports into a bounded channel.
///
/// When the channel is full or its receiver is gone the report is dropped, so a
/// slow consumer never stalls a build.
pub struct ChannelProgress {
    sender: SyncSender<f32>,
}

impl ChannelProgress {
    pub fn new(sender: SyncSender<f32>) -> Self {
        Self { sender }
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, fraction: f32) {
        let _ = self.sender.try_send(fraction);
    }
}

pub(crate) fn fraction(done: usize, total: usize) -> f32 {
    if total == 0 {
        1.0
    } else {
        done as f32 / total as f32
    }
}
