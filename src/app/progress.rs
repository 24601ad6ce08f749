//! Progress bar for the hashing pass.

use std::sync::Arc;

use archive_fetch_core::checksum::VerifyProgressCallback;
use indicatif::{ProgressBar, ProgressStyle};

/// Creates a verification bar and the callback that drives it.
///
/// The bar learns its length from the first callback, since the number of
/// files that survive pre-validation is not known up front.
pub(crate) fn verify_progress_bar() -> (ProgressBar, VerifyProgressCallback) {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner} verifying [{bar:30}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let handle = bar.clone();
    let callback: VerifyProgressCallback = Arc::new(move |done, total| {
        let total = u64::try_from(total).unwrap_or(u64::MAX);
        if handle.length() != Some(total) {
            handle.set_length(total);
        }
        handle.set_position(u64::try_from(done).unwrap_or(u64::MAX));
    });

    (bar, callback)
}
