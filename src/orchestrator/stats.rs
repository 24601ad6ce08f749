/// Counters for the transfer side of a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DownloadStats {
    batches: usize,
    failed_batches: usize,
    requests: usize,
}

impl DownloadStats {
    /// Creates a stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of batches handed to the transfer mechanism.
    #[must_use]
    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Number of batches that returned a non-zero status.
    #[must_use]
    pub fn failed_batches(&self) -> usize {
        self.failed_batches
    }

    /// Total requests submitted across all batches.
    #[must_use]
    pub fn requests(&self) -> usize {
        self.requests
    }

    pub(super) fn record_batch(&mut self, size: usize, status: i32) {
        self.batches += 1;
        self.requests += size;
        if status != 0 {
            self.failed_batches += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_start_at_zero() {
        let stats = DownloadStats::new();
        assert_eq!(stats.batches(), 0);
        assert_eq!(stats.failed_batches(), 0);
        assert_eq!(stats.requests(), 0);
    }

    #[test]
    fn test_record_batch_counts_failures() {
        let mut stats = DownloadStats::new();
        stats.record_batch(10, 0);
        stats.record_batch(3, 7);

        assert_eq!(stats.batches(), 2);
        assert_eq!(stats.failed_batches(), 1);
        assert_eq!(stats.requests(), 13);
    }
}
