use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use fieldtrack_core::RgbImage;
use fieldtrack_events::{Publish, PublishStats};
use fieldtrack_tags::FiducialDetector;
use serde::{Deserialize, Serialize};

use super::source::{Clock, FrameError, FrameSource};
use super::Pipeline;

/// Frame acquisition retry policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceParams {
    /// Extra attempts after a failed read before the frame is skipped.
    pub max_read_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for SourceParams {
    fn default() -> Self {
        Self {
            max_read_retries: 3,
            retry_delay_ms: 10,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub frames_processed: usize,
    pub frames_skipped: usize,
    pub transitions: usize,
    pub telemetry: PublishStats,
}

fn read_with_retries<S: FrameSource + ?Sized>(
    source: &mut S,
    params: &SourceParams,
) -> Result<Option<RgbImage>, FrameError> {
    let mut attempt = 0;
    loop {
        match source.next_frame() {
            Err(err) if attempt < params.max_read_retries => {
                log::debug!("frame read failed ({err}), retry {}", attempt + 1);
                attempt += 1;
                if params.retry_delay_ms > 0 {
                    std::thread::sleep(Duration::from_millis(params.retry_delay_ms));
                }
            }
            other => return other,
        }
    }
}

/// Pull frames until the source ends or `stop` is raised, then shut the
/// pipeline down (which publishes the offline message).
///
/// Read failures never end the loop; a read that still fails after the
/// configured retries is counted as a skipped frame.
pub fn run_frames<D, P, S, C>(
    pipeline: &mut Pipeline<D, P>,
    source: &mut S,
    clock: &C,
    params: &SourceParams,
    stop: &AtomicBool,
) -> RunSummary
where
    D: FiducialDetector,
    P: Publish,
    S: FrameSource + ?Sized,
    C: Clock + ?Sized,
{
    let mut summary = RunSummary::default();
    while !stop.load(Ordering::Relaxed) {
        match read_with_retries(source, params) {
            Ok(Some(frame)) => {
                let report = pipeline.process_frame(&frame.view(), clock.now());
                summary.frames_processed += 1;
                if report.event.is_some() {
                    summary.transitions += 1;
                }
            }
            Ok(None) => {
                log::info!("frame source exhausted");
                break;
            }
            Err(err) => {
                log::warn!("skipping frame: {err}");
                summary.frames_skipped += 1;
            }
        }
    }
    pipeline.shutdown(clock.now());
    summary.telemetry = pipeline.telemetry_stats();
    log::info!(
        "run finished: {} frames, {} skipped, {} transitions",
        summary.frames_processed,
        summary.frames_skipped,
        summary.transitions
    );
    summary
}
