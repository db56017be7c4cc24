//! Periodic transport buffer maintenance.
//!
//! Long-running sessions accumulate stale frames in the transport's internal
//! buffers; this loop discards them on a fixed cadence, alternating between
//! the video and audio buffers so the two are never flushed back to back.
//!
//! The thread is detached on purpose. It only touches the shared transport
//! handle and holds no other resources, so process teardown does not wait
//! for it.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::transport::{StreamId, Transport};

/// Run the alternating clean cycle until cancellation.
///
/// Each half-cycle sleeps the full cadence first, so the initial flush only
/// happens after the stream has been live for one interval.
pub fn run_maintenance(
    transport: &dyn Transport,
    stream: StreamId,
    cadence: Duration,
    cancelled: &dyn Fn() -> bool,
) {
    loop {
        if sleep_cancellable(cadence, cancelled) {
            return;
        }
        log::debug!("flushing stale video buffer");
        transport.clean_video_buf(stream);

        if sleep_cancellable(cadence, cancelled) {
            return;
        }
        log::debug!("flushing stale audio buffer");
        transport.clean_audio_buf(stream);
    }
}

/// Sleep in short slices so a cancellation request is noticed promptly.
/// Returns true when cancelled.
fn sleep_cancellable(total: Duration, cancelled: &dyn Fn() -> bool) -> bool {
    let slice = Duration::from_millis(200).min(total);
    let mut remaining = total;
    while !remaining.is_zero() {
        if cancelled() {
            return true;
        }
        let step = slice.min(remaining);
        thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
    cancelled()
}

/// Spawn the maintenance loop on a detached named thread.
pub fn spawn(
    transport: Arc<dyn Transport>,
    stream: StreamId,
    cadence: Duration,
    shutdown: Arc<crate::shutdown::ShutdownController>,
) {
    let builder = thread::Builder::new().name("camrelay-maintenance".into());
    let spawned = builder.spawn(move || {
        run_maintenance(transport.as_ref(), stream, cadence, &|| {
            shutdown.cancel_requested()
        });
        log::debug!("maintenance loop stopped");
    });
    if let Err(e) = spawned {
        log::warn!("failed to spawn maintenance thread: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Event, ScriptedTransport};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn alternates_video_then_audio_flushes() {
        let transport = ScriptedTransport::new();
        let checks = AtomicUsize::new(0);
        // Each half-cycle polls the cancel check twice; six false answers
        // let video, audio, video flush before the loop stops.
        run_maintenance(&transport, StreamId(0), Duration::from_millis(1), &|| {
            checks.fetch_add(1, Ordering::SeqCst) >= 6
        });

        let events = transport.events();
        let flushes: Vec<&Event> = events
            .iter()
            .filter(|e| matches!(e, Event::CleanVideo | Event::CleanAudio))
            .collect();
        assert_eq!(flushes, vec![&Event::CleanVideo, &Event::CleanAudio, &Event::CleanVideo]);
    }

    #[test]
    fn cancellation_before_the_first_interval_flushes_nothing() {
        let transport = ScriptedTransport::new();
        run_maintenance(&transport, StreamId(0), Duration::from_secs(60), &|| true);
        assert!(transport.events().is_empty());
    }
}
