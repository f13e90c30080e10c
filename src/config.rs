use std::time::Duration;

/// Tuning knobs for a `SimpleDb` instance.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Directory holding one file per table plus the log file.
    pub data_dir: String,
    /// Name of the log file within `data_dir`.
    pub log_file: String,
    /// Fixed size, in bytes, of every block.
    pub block_size: usize,
    /// Number of buffer-pool frames.
    pub buffer_pool_size: usize,
    /// How long `BufferMgr::pin` and `LockTable::slock`/`xlock` wait before
    /// aborting (`BufferAbort`/`LockAbort`).
    pub max_time: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            log_file: "simpledb.log".to_string(),
            block_size: 512,
            buffer_pool_size: 8,
            max_time: Duration::from_secs(10),
        }
    }
}
