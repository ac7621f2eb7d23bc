//! Progress reporting for payload transfers.

/// Progress information for an upload payload transfer.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    /// Bytes handed to the transport so far
    pub done: u64,
    /// Total bytes to transfer
    pub total: u64,
    /// Name of the file being transferred
    pub filename: String,
}

impl TransferProgress {
    /// Create a new progress report.
    pub fn new(done: u64, total: u64, filename: impl Into<String>) -> Self {
        Self {
            done,
            total,
            filename: filename.into(),
        }
    }

    /// Get progress as a fraction (0.0 to 1.0).
    ///
    /// An empty payload counts as complete.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.done as f64 / self.total as f64).min(1.0)
    }

    /// Get progress as a percentage (0.0 to 100.0).
    pub fn percent(&self) -> f64 {
        self.fraction() * 100.0
    }

    /// Check if transfer is complete.
    pub fn is_complete(&self) -> bool {
        self.done >= self.total
    }
}

/// Type alias for progress callback function.
///
/// The callback receives progress information and can return `false` to cancel the transfer.
pub type ProgressCallback = Box<dyn FnMut(&TransferProgress) -> bool + Send>;

/// Create a simple progress callback that prints to stdout.
///
/// # Example
/// ```no_run
/// use nomadlib::progress::make_progress_bar;
///
/// let callback = make_progress_bar();
/// ```
pub fn make_progress_bar() -> ProgressCallback {
    Box::new(|progress: &TransferProgress| {
        let percent = progress.percent();
        let bar_width = 40;
        let filled = (progress.fraction() * bar_width as f64) as usize;
        let empty = bar_width - filled;

        print!(
            "\r[{}{}] {:.1}% {} - {}/{} bytes",
            "=".repeat(filled),
            " ".repeat(empty),
            percent,
            progress.filename,
            progress.done,
            progress.total
        );

        if progress.is_complete() {
            println!();
        }

        use std::io::Write;
        let _ = std::io::stdout().flush();

        true // Continue transfer
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction() {
        let progress = TransferProgress::new(25, 100, "upload.tar.gz");
        assert_eq!(progress.fraction(), 0.25);
        assert_eq!(progress.percent(), 25.0);
        assert!(!progress.is_complete());

        let done = TransferProgress::new(100, 100, "upload.tar.gz");
        assert_eq!(done.fraction(), 1.0);
        assert!(done.is_complete());
    }

    #[test]
    fn test_empty_payload_is_complete() {
        let progress = TransferProgress::new(0, 0, "empty.tar.gz");
        assert_eq!(progress.fraction(), 1.0);
        assert!(progress.is_complete());
    }

    #[test]
    fn test_callback_can_cancel() {
        let mut seen = Vec::new();
        let mut callback: ProgressCallback = Box::new(move |p: &TransferProgress| {
            seen.push(p.done);
            p.done < 50
        });
        assert!(callback(&TransferProgress::new(10, 100, "f")));
        assert!(!callback(&TransferProgress::new(60, 100, "f")));
    }
}
