// Misc utilities useful to both nblog and nbstats.

mod configs;
mod dates;
mod students;
mod timebuckets;

// A structure representing the configuration of one course.

pub use configs::CourseConfig;

// Read a course configuration from a file.

pub use configs::read_course_config;

// Types and utilities for manipulating timestamps.

pub use dates::Timestamp;

// Parse a &str in log format into a Timestamp.

pub use dates::parse_timestamp;

// Format a Timestamp in log format or day-key format.

pub use dates::format_day_time;
pub use dates::format_log_time;

// Return the timestamp with various parts cleared out, or pushed to the end of the day.

pub use dates::end_of_day;
pub use dates::truncate_to_day;
pub use dates::truncate_to_grain;

// serde `serialize_with` helpers for timestamps in reports.

pub use dates::serialize_day_times;
pub use dates::serialize_log_time;
pub use dates::serialize_log_times;

// Parse a WwDdHhMm duration.

pub use dates::parse_duration;

// Predicate separating genuine learners from staff and artefact accounts.

pub use students::StudentFilter;

// Fixed-grain downsampling of an event stream into animation frames.

pub use timebuckets::Crossing;
pub use timebuckets::Frame;
pub use timebuckets::TimeBuckets;
