/// Downsample a chronological stream of events into frames of a fixed wall-clock width.
///
/// The client calls `prepare` with the timestamp of every event *before* folding the event into its
/// own state.  When the event lands at or past the end of the current bucket, `prepare` returns a
/// `Crossing`, and the client must then take a snapshot of its state (which now represents the end
/// of the bucket that was just left) and hand it to `record_data`.  That snapshot is attached to
/// every boundary that was crossed, so an event that jumps across several empty buckets still
/// produces one frame per boundary.  At the end of the stream `wrap` adds a frame for the trailing,
/// partial bucket.
///
/// Frames are labeled with the boundary time at which the bucket ended.  Buckets are aligned to
/// the epoch (see `truncate_to_grain`).
use crate::dates::{serialize_log_time, truncate_to_grain, Timestamp};

use chrono::Duration;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame<T> {
    #[serde(serialize_with = "serialize_log_time")]
    pub timestamp: Timestamp,
    pub data: T,
}

/// The boundaries spanned by a crossing: `previous` is the end of the bucket that was left, `next`
/// is the start of the bucket that was entered.  They are equal unless buckets were skipped.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crossing {
    pub previous: Timestamp,
    pub next: Timestamp,
}

pub struct TimeBuckets<T> {
    grain: Duration,
    current_end: Option<Timestamp>,
    frames: Vec<Frame<T>>,
}

impl<T: Clone> TimeBuckets<T> {
    pub fn new(grain: Duration) -> TimeBuckets<T> {
        TimeBuckets {
            grain: std::cmp::max(grain, Duration::seconds(1)),
            current_end: None,
            frames: vec![],
        }
    }

    pub fn prepare(&mut self, t: Timestamp) -> Option<Crossing> {
        match self.current_end {
            None => {
                self.current_end = Some(truncate_to_grain(t, self.grain) + self.grain);
                None
            }
            Some(end) if t < end => None,
            Some(end) => {
                let start = truncate_to_grain(t, self.grain);
                self.current_end = Some(start + self.grain);
                Some(Crossing {
                    previous: end,
                    next: start,
                })
            }
        }
    }

    pub fn record_data(&mut self, data: T, crossing: Crossing) {
        let mut boundary = crossing.previous;
        while boundary < crossing.next {
            self.frames.push(Frame {
                timestamp: boundary,
                data: data.clone(),
            });
            boundary = boundary + self.grain;
        }
        self.frames.push(Frame {
            timestamp: crossing.next,
            data,
        });
    }

    /// Close the trailing bucket with the final state and return all frames.  If `prepare` was
    /// never called there are no frames at all.

    pub fn wrap(mut self, data: T) -> Vec<Frame<T>> {
        if let Some(end) = self.current_end {
            self.frames.push(Frame {
                timestamp: end,
                data,
            });
        }
        self.frames
    }
}

#[cfg(test)]
use crate::dates::{format_log_time, parse_timestamp};

#[cfg(test)]
fn feed(buckets: &mut TimeBuckets<usize>, times: &[&str]) {
    // The state is simply the number of events seen so far.
    let mut n = 0;
    for t in times {
        if let Some(c) = buckets.prepare(parse_timestamp(t).unwrap()) {
            buckets.record_data(n, c);
        }
        n += 1;
    }
}

#[test]
fn test_no_events() {
    let buckets = TimeBuckets::<usize>::new(Duration::hours(6));
    assert!(buckets.wrap(0).is_empty());
}

#[test]
fn test_single_bucket() {
    let mut buckets = TimeBuckets::new(Duration::hours(6));
    feed(&mut buckets, &["2024-03-01T06:00:00", "2024-03-01T07:00:00", "2024-03-01T11:59:59"]);
    let frames = buckets.wrap(3);
    assert!(frames.len() == 1);
    assert!(format_log_time(frames[0].timestamp) == "2024-03-01T12:00:00");
    assert!(frames[0].data == 3);
}

#[test]
fn test_adjacent_buckets() {
    let mut buckets = TimeBuckets::new(Duration::hours(6));
    feed(&mut buckets, &["2024-03-01T01:00:00", "2024-03-01T05:00:00", "2024-03-01T06:00:00"]);
    let frames = buckets.wrap(3);
    assert!(frames.len() == 2);
    assert!(format_log_time(frames[0].timestamp) == "2024-03-01T06:00:00");
    assert!(frames[0].data == 2);
    assert!(format_log_time(frames[1].timestamp) == "2024-03-01T12:00:00");
    assert!(frames[1].data == 3);
}

#[test]
fn test_skipped_buckets() {
    // Nothing happens between 04:00 and 20:00, so the buckets ending at 06, 12 and 18 all get the
    // state as of 04:00, and no boundary goes without a frame.
    let mut buckets = TimeBuckets::new(Duration::hours(6));
    feed(&mut buckets, &["2024-03-01T04:00:00", "2024-03-01T20:00:00"]);
    let frames = buckets.wrap(2);
    let times = frames
        .iter()
        .map(|f| format_log_time(f.timestamp))
        .collect::<Vec<String>>();
    assert!(
        times
            == vec![
                "2024-03-01T06:00:00",
                "2024-03-01T12:00:00",
                "2024-03-01T18:00:00",
                "2024-03-02T00:00:00",
            ]
    );
    assert!(frames.iter().map(|f| f.data).collect::<Vec<usize>>() == vec![1, 1, 1, 2]);
    for w in frames.windows(2) {
        assert!(w[1].timestamp - w[0].timestamp == Duration::hours(6));
    }
}

#[test]
fn test_earlier_timestamp_does_not_cross() {
    let mut buckets = TimeBuckets::<usize>::new(Duration::hours(1));
    assert!(buckets
        .prepare(parse_timestamp("2024-03-01T10:30:00").unwrap())
        .is_none());
    assert!(buckets
        .prepare(parse_timestamp("2024-03-01T09:59:00").unwrap())
        .is_none());
    let c = buckets
        .prepare(parse_timestamp("2024-03-01T11:00:00").unwrap())
        .unwrap();
    assert!(c.previous == c.next);
    assert!(format_log_time(c.next) == "2024-03-01T11:00:00");
}
