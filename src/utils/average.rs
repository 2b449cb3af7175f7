//! Size-weighted running averages.

use bigdecimal::BigDecimal;
use num_traits::Zero;

/// Fold a sized sample into a running average.
///
/// `count` is the size the running average was computed over, before the
/// sample is applied. Prices are integers on chain, so the result is
/// truncated to an integer. A zero total size yields zero.
pub fn merge_average(
    count: &BigDecimal,
    average: &BigDecimal,
    delta: &BigDecimal,
    sample: &BigDecimal,
) -> BigDecimal {
    let total = count + delta;
    if total.is_zero() {
        return BigDecimal::zero();
    }
    let weighted = count * average + delta * sample;
    (weighted / total).with_scale(0)
}
