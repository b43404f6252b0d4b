use once_cell::sync::OnceCell;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{KeyValue, global};
use tracing::info;

struct CrewMetrics {
    runs: Counter<u64>,
    tasks: Counter<u64>,
    task_duration_ms: Histogram<f64>,
    capability_calls: Counter<u64>,
}

static METRICS: OnceCell<CrewMetrics> = OnceCell::new();

fn handles() -> &'static CrewMetrics {
    METRICS.get_or_init(|| {
        let meter: Meter = global::meter("crewsearch.crew");
        CrewMetrics {
            runs: meter
                .u64_counter("crew_runs_total")
                .with_description("Crew runs by terminal status")
                .init(),
            tasks: meter
                .u64_counter("crew_tasks_total")
                .with_description("Task executions by role and outcome")
                .init(),
            task_duration_ms: meter
                .f64_histogram("crew_task_duration_ms")
                .with_description("Task runtime in milliseconds")
                .init(),
            capability_calls: meter
                .u64_counter("capability_invocations_total")
                .with_description("Capability invocations by capability and outcome")
                .init(),
        }
    })
}

/// Hint to operators that OTEL metrics export can be configured externally.
pub fn init_metrics_from_env(service_name: &str) {
    if std::env::var("CREWSEARCH_OTEL_METRICS_ENDPOINT").is_ok() {
        info!(
            target = "telemetry",
            "CREWSEARCH_OTEL_METRICS_ENDPOINT detected for {service_name}. Configure an OTLP meter provider in your deployment to export crew metrics."
        );
    }
}

pub(crate) fn record_crew_run(status: &'static str, tasks_completed: usize) {
    handles().runs.add(
        1,
        &[
            KeyValue::new("status", status),
            KeyValue::new("tasks_completed", tasks_completed as i64),
        ],
    );
}

pub(crate) fn record_task(role: &str, outcome: &'static str, duration_ms: u64) {
    let metrics = handles();
    let attrs = [
        KeyValue::new("role", role.to_string()),
        KeyValue::new("outcome", outcome),
    ];
    metrics.tasks.add(1, &attrs);
    metrics.task_duration_ms.record(duration_ms as f64, &attrs);
}

pub(crate) fn record_capability(capability: &str, success: bool) {
    handles().capability_calls.add(
        1,
        &[
            KeyValue::new("capability", capability.to_string()),
            KeyValue::new("success", success),
        ],
    );
}
