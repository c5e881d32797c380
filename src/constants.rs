//! Reserved words of the value space
//!
//! Every key and value is a signed 64-bit word. The bottom of the range is
//! reserved: `NULL` marks an absent value and the next three words are
//! stream markers owned by higher layers. Usable values start at `MIN_VALUE`.

/// Absent value / empty slot sentinel
pub const NULL: i64 = i64::MIN;

/// End-of-stream marker (reserved, unused by the engine)
pub const END_OF_STREAM: i64 = i64::MIN + 1;

/// End-of-line marker (reserved, unused by the engine)
pub const END_OF_LINE: i64 = i64::MIN + 2;

/// End-of-record marker (reserved, unused by the engine)
pub const END_OF_RECORD: i64 = i64::MIN + 3;

/// Smallest value a map accepts
pub const MIN_VALUE: i64 = i64::MIN + 4;

/// Largest value a map accepts
pub const MAX_VALUE: i64 = i64::MAX;

/// Largest usable key
pub const MAX_KEY: i64 = i64::MAX;

/// True for the three stream markers between `NULL` and `MIN_VALUE`.
#[inline]
pub fn is_reserved(value: i64) -> bool {
    value > NULL && value < MIN_VALUE
}
