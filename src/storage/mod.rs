// Bottom two layers of the engine: fixed-size blocks on disk (`file`), the
// write-ahead log built on top of them (`log`), and the pinned page cache
// sitting above both (`buffer`).

pub mod buffer;
pub mod file;
pub mod log;

pub use buffer::{Buffer, BufferMgr};
pub use file::{BlockId, FileMgr, Page};
pub use log::{LogIterator, LogMgr};
