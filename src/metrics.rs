//metrics.rs
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    HistogramOpts, HistogramVec, Opts,
};

lazy_static! {
    // Task metrics
    pub static ref TASK_RUNS: CounterVec = register_counter_vec!(
        Opts::new("task_runs_total", "Scheduled task invocations by outcome"),
        &["task", "outcome"]
    )
    .unwrap();

    pub static ref TASK_DURATION: HistogramVec = register_histogram_vec!(
        HistogramOpts::new("task_duration_seconds", "Time taken by one task invocation")
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        &["task"]
    )
    .unwrap();

    // Notification metrics
    pub static ref NOTIFICATIONS_SENT: CounterVec = register_counter_vec!(
        Opts::new("notifications_sent_total", "Users notified, by notification type"),
        &["notification_type"]
    )
    .unwrap();

    pub static ref NOTIFICATIONS_SKIPPED: CounterVec = register_counter_vec!(
        Opts::new("notifications_skipped_total", "Users skipped, by notification type and reason"),
        &["notification_type", "reason"]
    )
    .unwrap();

    pub static ref DELIVERY_FAILURES: CounterVec = register_counter_vec!(
        Opts::new("notification_delivery_failures_total", "Users whose every device rejected the push"),
        &["notification_type"]
    )
    .unwrap();

    pub static ref USER_ERRORS: CounterVec = register_counter_vec!(
        Opts::new("notification_user_errors_total", "Per-user processing errors"),
        &["notification_type"]
    )
    .unwrap();

    // Chain metrics
    pub static ref TRANSACTIONS_SUBMITTED: Counter = register_counter!(Opts::new(
        "transactions_submitted_total",
        "Contract calls accepted by the RPC node"
    ))
    .unwrap();

    pub static ref TRANSACTION_FAILURES: Counter = register_counter!(Opts::new(
        "transaction_failures_total",
        "Contract calls that failed before a hash was returned"
    ))
    .unwrap();
}

// Function to expose metrics endpoint
pub fn metrics_handler() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return format!("Error encoding metrics: {}", e);
    }

    match String::from_utf8(buffer) {
        Ok(metrics) => metrics,
        Err(e) => format!("Error converting metrics to string: {}", e),
    }
}
