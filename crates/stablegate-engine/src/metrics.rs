//! Operation metrics.
//!
//! The engine reports one observation per public operation through an
//! injected [`EngineMetrics`]. Nothing is registered globally; a
//! [`PrometheusMetrics`] instance owns its own registry so several engines
//! can coexist in one process (and in one test binary).

use std::time::Duration;

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use stablegate_types::{Result, StableGateError};

/// Public engine operations that are measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Quote,
    Reserve,
    CashOut,
    Cancel,
    Sweep,
}

impl Operation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Reserve => "reserve",
            Self::CashOut => "cash_out",
            Self::Cancel => "cancel",
            Self::Sweep => "sweep",
        }
    }
}

/// Result of a measured operation. Failures carry the error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Err(&'static str),
}

impl Outcome {
    #[must_use]
    pub fn of<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::Ok,
            Err(e) => Self::Err(e.code()),
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Err(code) => code,
        }
    }
}

pub trait EngineMetrics: Send + Sync {
    fn observe(&self, op: Operation, elapsed: Duration, outcome: Outcome);
}

/// Discards every observation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl EngineMetrics for NoopMetrics {
    fn observe(&self, _op: Operation, _elapsed: Duration, _outcome: Outcome) {}
}

/// Prometheus-backed metrics with a private registry.
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    operations: IntCounterVec,
    latency: HistogramVec,
}

impl PrometheusMetrics {
    /// Create the collectors and register them.
    ///
    /// # Errors
    /// `Internal` if a collector cannot be created or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let operations = IntCounterVec::new(
            Opts::new("stablegate_operations_total", "engine operations by outcome"),
            &["op", "outcome"],
        )
        .map_err(prom_err)?;
        let latency = HistogramVec::new(
            HistogramOpts::new("stablegate_operation_seconds", "engine operation latency (s)"),
            &["op"],
        )
        .map_err(prom_err)?;
        registry
            .register(Box::new(operations.clone()))
            .map_err(prom_err)?;
        registry.register(Box::new(latency.clone())).map_err(prom_err)?;
        Ok(Self {
            registry,
            operations,
            latency,
        })
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Count of observations for `(op, outcome)`.
    #[must_use]
    pub fn count(&self, op: Operation, outcome: Outcome) -> u64 {
        self.operations
            .with_label_values(&[op.as_str(), outcome.label()])
            .get()
    }

    /// Render the registry in the Prometheus text exposition format.
    ///
    /// # Errors
    /// `Internal` if encoding fails.
    pub fn gather_text(&self) -> Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buf)
            .map_err(prom_err)?;
        String::from_utf8(buf).map_err(|e| StableGateError::Internal(format!("metrics utf8: {e}")))
    }
}

impl EngineMetrics for PrometheusMetrics {
    fn observe(&self, op: Operation, elapsed: Duration, outcome: Outcome) {
        self.operations
            .with_label_values(&[op.as_str(), outcome.label()])
            .inc();
        self.latency
            .with_label_values(&[op.as_str()])
            .observe(elapsed.as_secs_f64());
    }
}

fn prom_err(e: prometheus::Error) -> StableGateError {
    StableGateError::Internal(format!("metrics: {e}"))
}
