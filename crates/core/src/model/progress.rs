/// Percent of `total` covered by `completed`, rounded half away from zero and
/// clamped to 100.
///
/// A `total` of zero yields 0 rather than dividing by zero. Every progress
/// figure in the crate (assignments, program overviews, schedule stats) goes
/// through this function.
#[must_use]
pub fn completion_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total);
    // Integer form of round(100 * completed / total).
    let pct = (completed * 200 + total) / (total * 2);
    u8::try_from(pct.min(100)).unwrap_or(100)
}
