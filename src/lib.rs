//! Helpers for a time-series modeling workflow.
//!
//! - cyclical calendar features and lag features on a [`TimeSeriesFrame`]
//! - Pareto front plots and `.npz` bundles for multi-objective runs

mod cyclical;
mod frame;
mod lags;
mod npz;
mod observability;
mod pareto;
mod render;

pub use cyclical::{
    add_cyclical_features, parse_timestamp, CyclicalEncoding, FeatureError, CYCLICAL_COLUMNS,
    DAY_PERIOD, DEFAULT_TIME_COL, HALFHOUR_PERIOD, MONTH_PERIOD, SCRATCH_COLUMNS,
};
pub use frame::{Column, ColumnKind, FrameError, TimeSeriesFrame};
pub use lags::{add_lag_features, lag_column_name, DEFAULT_TARGET_COL};
pub use npz::{read_npz, write_npz, NpzError};
pub use observability::{
    init_logging, logging_config_from_env, LogFormat, LoggingConfig, LoggingInitError,
};
pub use pareto::{
    artifact_stem, plot_and_save_pareto, plot_and_save_pareto_at, plot_pareto, DisplayFront,
    ParetoFront, Population, ReportConfig, ReportError, SavedPareto, ShapeError,
    FRONT_ARRAY_NAME, OBJECTIVE_COUNT, POPULATION_ARRAY_NAME,
};
pub use render::{PlotStyle, RenderContext};
