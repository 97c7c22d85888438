//! Change batch to notification payload.

use lr_watch::ChangeRecord;

use super::logger::Logger;

/// Separator between `op:path` segments.
const SEGMENT_SEPARATOR: char = ';';

/// Fold a batch into a single payload string.
///
/// Segments are `op:path`, joined by `;` in batch order with no trailing
/// separator. An empty batch yields an empty payload. Every record is logged
/// at debug level.
pub fn aggregate(batch: &[ChangeRecord], logger: &dyn Logger) -> String {
    let mut payload = String::new();
    for record in batch {
        logger.debug(
            "livereload: file changed",
            &[("op", &record.op), ("path", &record.path)],
        );
        if !payload.is_empty() {
            payload.push(SEGMENT_SEPARATOR);
        }
        payload.push_str(record.op.as_str());
        payload.push(':');
        payload.push_str(&record.path);
    }
    payload
}
