pub type Result<T> = std::result::Result<T, MetricError>;

/// Failure of a single metric. Never fatal for the process: callers render it
/// as "unavailable"/"unknown" and carry on with the other metrics.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetricError {
    #[error("{metric} unavailable: {reason}")]
    MetricUnavailable { metric: String, reason: String },

    #[error("{metric} query failed")]
    TransientQueryFailure { metric: String },

    #[error("could not initialize {resource}: {reason}")]
    InitializationFailure { resource: String, reason: String },
}

impl MetricError {
    pub fn unavailable(metric: &str, reason: impl ToString) -> Self {
        Self::MetricUnavailable {
            metric: metric.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn transient(metric: &str) -> Self {
        Self::TransientQueryFailure {
            metric: metric.to_string(),
        }
    }

    pub fn initialization(resource: &str, reason: impl ToString) -> Self {
        Self::InitializationFailure {
            resource: resource.to_string(),
            reason: reason.to_string(),
        }
    }
}
