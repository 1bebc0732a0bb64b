//! Log record configuration and polling (service 0xB7)
//!
//! The ECU assembles a record from a list of RAM locations once, then
//! returns the whole record for every bare `0xB7` request. The caller paces
//! the requests with a [`SamplePacer`].

mod engine;
mod pacer;

pub use engine::{LogRecordEngine, MemoryLocation, RecordLayout, MAX_LOCATIONS};
pub use pacer::{run_polling_loop, RecordSource, SamplePacer};

/// A polled log record: `[byte_count, 0xF7, channel bytes...]`
pub type RawRecord = crate::kwp::ResponseRecord;
