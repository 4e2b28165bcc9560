//! Forward outcome labeling: the realized return over the holding period.

/// Relative close-to-close change from `index` to `index + check_days`.
///
/// `None` when the horizon runs past the end of the series or the price at
/// `index` is zero. Indices near the series end are expected to have no
/// outcome yet; this is not an error.
pub fn forward_return(closes: &[f64], index: usize, check_days: usize) -> Option<f64> {
    let future = index.checked_add(check_days)?;
    let current = *closes.get(index)?;
    let later = *closes.get(future)?;
    if current == 0.0 || !current.is_finite() {
        return None;
    }
    Some((later - current) / current)
}
