use prometheus::{HistogramVec, IntCounterVec, Opts, register_histogram_vec, register_int_counter_vec};

/// Per-reconciler Prometheus instrumentation, registered on the process-wide
/// default registry so `prometheus::gather()` picks it up regardless of
/// which reconciler created it. One instance per controller
/// (`ControllerMetrics::new("organizations")`, `"vdcs"`, ...).
pub struct ControllerMetrics {
    pub reconcile_counter: IntCounterVec,
    pub read_histogram: HistogramVec,
    pub write_histogram: HistogramVec,
    pub action_counter: IntCounterVec,
}

impl ControllerMetrics {
    pub fn new(reconciler: &str) -> Self {
        let reconcile_counter = register_int_counter_vec!(
            Opts::new(
                format!("ovim_{reconciler}_reconcile_total"),
                "total reconciles performed"
            ),
            &["name", "namespace"]
        )
        .expect("register reconcile_counter");
        let read_histogram = register_histogram_vec!(
            format!("ovim_{reconciler}_read_seconds"),
            "time spent in the read phase of reconciliation",
            &["name", "namespace", "action"]
        )
        .expect("register read_histogram");
        let write_histogram = register_histogram_vec!(
            format!("ovim_{reconciler}_write_seconds"),
            "time spent in the write phase of reconciliation",
            &["name", "namespace", "action"]
        )
        .expect("register write_histogram");
        let action_counter = register_int_counter_vec!(
            Opts::new(
                format!("ovim_{reconciler}_action_total"),
                "reconcile actions taken, by kind"
            ),
            &["name", "namespace", "action"]
        )
        .expect("register action_counter");
        Self {
            reconcile_counter,
            read_histogram,
            write_histogram,
            action_counter,
        }
    }
}
