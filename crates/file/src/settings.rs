//! Persister configuration

use std::time::Duration;

/// Tuning knobs for [`LockedFileDataPersister`](crate::LockedFileDataPersister)
///
/// The defaults suit a value touched by a handful of cooperating processes:
/// a held lock is retried a few times with linear back-off, and the
/// committed file is kept open between operations so repeated loads are
/// served from memory.
#[derive(Debug, Clone)]
pub struct FileDataPersisterSettings {
    /// Retries after a failed lock-file acquisition (attempt *n* waits
    /// `n × retry_delay` first).
    pub num_retries: u32,
    /// Base of the linear back-off between lock attempts.
    pub retry_delay: Duration,
    /// Keep a read-write handle on the committed file between operations
    /// and serve loads from an in-memory replica of it.
    pub exclusive_mode: bool,
}

impl Default for FileDataPersisterSettings {
    fn default() -> Self {
        FileDataPersisterSettings {
            num_retries: 3,
            retry_delay: Duration::from_millis(100),
            exclusive_mode: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = FileDataPersisterSettings::default();
        assert_eq!(settings.num_retries, 3);
        assert_eq!(settings.retry_delay, Duration::from_millis(100));
        assert!(settings.exclusive_mode);
    }
}
