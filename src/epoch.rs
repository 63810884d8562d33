//! Task epochs from the session-type labels of the spike stream.
//!
//! A run of consecutive spikes with the same session type becomes one epoch
//! spanning the first to the last spike of the run. Gaps between runs are not
//! attributed to either task.

use serde::Serialize;

use crate::types::{Epoch, SessionType, SpikeRecord};

/// Two spikes at the same time but with different session types.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimestampTie {
    pub time: f64,
    /// Type of the run that ends at `time`
    pub closed: SessionType,
    /// Type of the run that starts at `time`
    pub opened: SessionType,
}

/// Output of [`segment_epochs`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segmentation {
    /// Epochs in time order
    pub epochs: Vec<Epoch>,
    /// Session-type changes that happened between identical timestamps
    pub ties: Vec<TimestampTie>,
}

/// Splits a time-sorted spike stream into task epochs.
///
/// Records must already be sorted by `time_seconds`; records sharing a
/// timestamp are taken in the order given, so the first of them decides which
/// run the boundary belongs to. Each such boundary is reported in
/// [`Segmentation::ties`]. An empty stream gives no epochs.
pub fn segment_epochs<'a, I>(records: I) -> Segmentation
where
    I: IntoIterator<Item = &'a SpikeRecord>,
{
    let mut segmentation = Segmentation::default();
    let mut current: Option<Epoch> = None;

    for record in records {
        let time = record.time_seconds;
        if let Some(run) = current.as_mut() {
            debug_assert!(time >= run.end_time, "spike stream is not time-sorted");
            if run.session_type == record.session_type {
                run.end_time = time;
                continue;
            }
            if run.end_time == time {
                log::warn!(
                    "session type changes from {} to {} at identical time {}s",
                    run.session_type,
                    record.session_type,
                    time
                );
                segmentation.ties.push(TimestampTie {
                    time,
                    closed: run.session_type,
                    opened: record.session_type,
                });
            }
            segmentation.epochs.push(*run);
        }
        current = Some(Epoch {
            session_type: record.session_type,
            start_time: time,
            end_time: time,
        });
    }

    segmentation.epochs.extend(current);
    segmentation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionType::*;

    fn spike(time: f64, session_type: SessionType) -> SpikeRecord {
        SpikeRecord {
            time_seconds: time,
            peak_amplitudes: [0.0; 4],
            waveform_areas: [0.0; 4],
            waveform_width: 0.0,
            waveform_height: 0.0,
            position: None,
            session_type,
        }
    }

    fn epochs_of(stream: &[SpikeRecord]) -> Vec<(SessionType, f64, f64)> {
        segment_epochs(stream)
            .epochs
            .iter()
            .map(|e| (e.session_type, e.start_time, e.end_time))
            .collect()
    }

    #[test]
    fn runs_become_epochs() {
        let stream = [spike(0.5, Baseline), spike(0.6, Baseline), spike(1.2, EscherStaircase)];
        assert_eq!(
            epochs_of(&stream),
            vec![(Baseline, 0.5, 0.6), (EscherStaircase, 1.2, 1.2)]
        );
    }

    #[test]
    fn empty_stream_has_no_epochs() {
        let stream: [SpikeRecord; 0] = [];
        let segmentation = segment_epochs(&stream);
        assert!(segmentation.epochs.is_empty());
        assert!(segmentation.ties.is_empty());
    }

    #[test]
    fn returning_task_opens_a_new_epoch() {
        let stream = [
            spike(1.0, Baseline),
            spike(2.0, Baseline),
            spike(10.0, MagicCarpet),
            spike(15.0, MagicCarpet),
            spike(20.0, Baseline),
            spike(21.0, Baseline),
        ];
        let epochs = segment_epochs(&stream).epochs;
        assert_eq!(epochs.len(), 3);
        assert_eq!(epochs[2].session_type, Baseline);
        assert_eq!(epochs[2].start_time, 20.0);

        // ordered, non-overlapping, spanning the whole stream
        for pair in epochs.windows(2) {
            assert!(pair[0].end_time <= pair[1].start_time);
        }
        assert_eq!(epochs.first().map(|e| e.start_time), Some(1.0));
        assert_eq!(epochs.last().map(|e| e.end_time), Some(21.0));
    }

    #[test]
    fn identical_timestamps_keep_given_order() {
        let stream = [
            spike(1.0, Baseline),
            spike(3.0, Baseline),
            spike(3.0, EscherStaircase),
            spike(4.0, EscherStaircase),
        ];
        let segmentation = segment_epochs(&stream);
        assert_eq!(
            epochs_of(&stream),
            vec![(Baseline, 1.0, 3.0), (EscherStaircase, 3.0, 4.0)]
        );
        assert_eq!(
            segmentation.ties,
            vec![TimestampTie {
                time: 3.0,
                closed: Baseline,
                opened: EscherStaircase
            }]
        );
    }

    #[test]
    fn single_spike_is_a_zero_length_epoch() {
        let stream = [spike(7.25, MagicCarpet)];
        let epochs = segment_epochs(&stream).epochs;
        assert_eq!(epochs.len(), 1);
        assert_eq!(epochs[0].duration(), 0.0);
    }
}
