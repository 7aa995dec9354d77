//! Positional lag features of a target column.

use tracing::{debug, info};

use crate::cyclical::FeatureError;
use crate::frame::TimeSeriesFrame;

pub const DEFAULT_TARGET_COL: &str = "y";

const LAG_COLUMN_PREFIX: &str = "y_lag_";

pub fn lag_column_name(lag: usize) -> String {
    format!("{LAG_COLUMN_PREFIX}{lag}")
}

/// Adds one `y_lag_<k>` column per entry of `lags`, in place.
///
/// Row `i` of `y_lag_<k>` holds row `i - k` of `target_col`; the first `k`
/// rows are missing. The shift follows the current row order only. A lag of
/// zero copies the target, and a repeated lag rewrites the same column.
pub fn add_lag_features(
    frame: &mut TimeSeriesFrame,
    target_col: &str,
    lags: &[usize],
) -> Result<(), FeatureError> {
    let target = frame
        .column(target_col)
        .ok_or_else(|| FeatureError::MissingColumn(target_col.to_string()))?;

    let shifted: Vec<(String, _)> = lags
        .iter()
        .map(|lag| (lag_column_name(*lag), target.shifted(*lag)))
        .collect();

    for (name, column) in shifted {
        debug!(
            component = "features",
            event = "features.lag.column",
            target_col,
            column = %name
        );
        frame.insert_column(name, column)?;
    }

    info!(
        component = "features",
        event = "features.lag.added",
        target_col,
        lags = ?lags,
        rows = frame.height()
    );

    Ok(())
}
