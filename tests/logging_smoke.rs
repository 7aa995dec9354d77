use std::io;
use std::io::Write;
use std::sync::{Arc, Mutex};

use forecast_utils::{
    add_cyclical_features, add_lag_features, plot_pareto, Column, ParetoFront, PlotStyle,
    RenderContext, TimeSeriesFrame,
};
use ndarray::array;
use tempfile::tempdir;
use tracing::dispatcher::with_default;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriter;

#[derive(Clone, Default)]
struct SharedWriter {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedWriter {
    fn output_string(&self) -> String {
        let bytes = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        String::from_utf8_lossy(&bytes).to_string()
    }
}

struct SharedWriterGuard {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        out.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_logs(max_level: Level, f: impl FnOnce()) -> String {
    let writer = SharedWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_max_level(max_level)
        .with_writer(writer.clone())
        .finish();
    let dispatch = tracing::Dispatch::new(subscriber);

    with_default(&dispatch, f);
    writer.output_string()
}

fn events(logs: &str) -> Vec<serde_json::Value> {
    logs.lines()
        .map(|line| serde_json::from_str(line).expect("each log line is JSON"))
        .collect()
}

fn has_event(logs: &str, name: &str) -> bool {
    events(logs)
        .iter()
        .any(|event| event["fields"]["event"] == name)
}

#[test]
fn feature_functions_emit_structured_events() {
    let logs = capture_logs(Level::DEBUG, || {
        let mut frame = TimeSeriesFrame::new()
            .with_column("ds", Column::text(["2024-01-01 00:00", ""]))
            .expect("ds column")
            .with_column("y", Column::float([1.0, 2.0]))
            .expect("y column");
        add_cyclical_features(&mut frame, "ds").expect("cyclical features");
        add_lag_features(&mut frame, "y", &[1]).expect("lag features");
    });

    assert!(has_event(&logs, "features.cyclical.parse_text"));
    assert!(has_event(&logs, "features.lag.column"));

    let cyclical = events(&logs)
        .into_iter()
        .find(|event| event["fields"]["event"] == "features.cyclical.added")
        .expect("cyclical event");
    assert_eq!(cyclical["fields"]["component"], "features");
    assert_eq!(cyclical["fields"]["missing_timestamps"], 1);
    assert_eq!(cyclical["fields"]["rows"], 2);
}

#[test]
fn info_level_hides_debug_events() {
    let logs = capture_logs(Level::INFO, || {
        let mut frame = TimeSeriesFrame::new()
            .with_column("y", Column::float([1.0, 2.0]))
            .expect("y column");
        add_lag_features(&mut frame, "y", &[1]).expect("lag features");
    });

    assert!(has_event(&logs, "features.lag.added"));
    assert!(!has_event(&logs, "features.lag.column"));
}

#[test]
fn plotting_reports_saved_image_and_skipped_points() {
    let dir = tempdir().expect("temp dir");
    let out = dir.path().join("front.png");
    let ctx = RenderContext::new(PlotStyle {
        dpi: 30,
        ..PlotStyle::default()
    });

    let logs = capture_logs(Level::INFO, || {
        let front = ParetoFront::new(array![[0.5, f64::INFINITY], [0.6, 1.0]]).expect("front");
        plot_pareto(&front, &ctx, &out).expect("plot succeeds");
    });

    assert!(has_event(&logs, "pareto.plot.non_finite_skipped"));
    assert!(has_event(&logs, "pareto.plot.saved"));
}
