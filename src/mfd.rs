use crate::error::{NrmlError, Result};

/// 震源1つの MFD から得る最大マグニチュードと総発生率（年あたり）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MfdTotals {
    pub max_magnitude: f64,
    pub occurrence_rate: f64,
}

/// 打ち切り Gutenberg-Richter 則
pub fn truncated_gutenberg_richter(
    a_value_cumulative: f64,
    b_value: f64,
    min_magnitude: f64,
    max_magnitude: f64,
) -> Result<MfdTotals> {
    if max_magnitude < min_magnitude {
        return Err(NrmlError::Inconsistent(format!(
            "maxMagnitude {} is below minMagnitude {}",
            max_magnitude, min_magnitude
        )));
    }

    let occurrence_rate = 10f64.powf(a_value_cumulative - b_value * min_magnitude)
        - 10f64.powf(a_value_cumulative - b_value * max_magnitude);

    Ok(MfdTotals {
        max_magnitude,
        occurrence_rate,
    })
}

/// 等間隔離散化インクリメンタル MFD
pub fn evenly_discretized(min_value: f64, bin_size: f64, rates: &[f64]) -> Result<MfdTotals> {
    if rates.is_empty() {
        return Err(NrmlError::Inconsistent(
            "evenlyDiscretizedIncrementalMFD has no rates".to_string(),
        ));
    }

    Ok(MfdTotals {
        max_magnitude: min_value + (rates.len() - 1) as f64 * bin_size,
        occurrence_rate: rates.iter().sum(),
    })
}

/// 複数の MFD をまとめる：最大マグニチュードは最大値、発生率は合計
pub fn combine<I>(mfds: I) -> Option<MfdTotals>
where
    I: IntoIterator<Item = MfdTotals>,
{
    mfds.into_iter().reduce(|acc, mfd| MfdTotals {
        max_magnitude: acc.max_magnitude.max(mfd.max_magnitude),
        occurrence_rate: acc.occurrence_rate + mfd.occurrence_rate,
    })
}
