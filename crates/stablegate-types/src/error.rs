//! Error types for the StableGate engine.
//!
//! All errors use the `SG_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Configuration / input errors
//! - 2xx: Pricing errors
//! - 3xx: Quote / reservation lifecycle errors
//! - 4xx: Risk limit errors
//! - 5xx: Ledger errors
//! - 9xx: Infrastructure / internal errors

use thiserror::Error;

use crate::QuoteId;

/// Central error enum for all StableGate operations.
#[derive(Debug, Error)]
pub enum StableGateError {
    // =================================================================
    // Configuration / Input Errors (1xx)
    // =================================================================
    /// The asset is not configured on this engine.
    #[error("SG_ERR_100: Asset not supported: {0}")]
    NotSupported(String),

    /// The amount is zero, negative or otherwise unusable.
    #[error("SG_ERR_101: Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    /// The decimal carries more fractional digits than the unit scale.
    #[error("SG_ERR_102: Precision exceeds supported scale: {value} has more than {decimals} decimals")]
    PrecisionLoss { value: String, decimals: u32 },

    /// A fixed-point computation does not fit in 64 bits.
    #[error("SG_ERR_103: Arithmetic overflow: {0}")]
    Overflow(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("SG_ERR_104: Configuration error: {0}")]
    Configuration(String),

    // =================================================================
    // Pricing Errors (2xx)
    // =================================================================
    /// No oracle sample, or the latest sample is older than the max age.
    #[error("SG_ERR_200: Price unavailable for {pair}")]
    PriceUnavailable { pair: String },

    /// The market moved beyond the asset's slippage tolerance since quoting.
    #[error("SG_ERR_201: Slippage exceeded: quoted {quoted}, observed {observed}, max {max_bps} bps")]
    SlippageExceeded {
        quoted: i64,
        observed: i64,
        max_bps: u32,
    },

    // =================================================================
    // Quote / Reservation Lifecycle Errors (3xx)
    // =================================================================
    /// The quote was never issued, was already reserved, or was purged.
    #[error("SG_ERR_300: Quote not found: {0}")]
    QuoteNotFound(QuoteId),

    /// The quote's TTL elapsed before reservation.
    #[error("SG_ERR_301: Quote expired: {0}")]
    QuoteExpired(QuoteId),

    /// The reserve amount differs from the quoted amount.
    #[error("SG_ERR_302: Quote amount mismatch: quoted {quoted} units, got {requested} units")]
    QuoteAmountMismatch { quoted: i64, requested: i64 },

    /// No outstanding reservation with this ID.
    #[error("SG_ERR_303: Reservation not found: {0}")]
    ReservationNotFound(QuoteId),

    /// The reservation expired and its inventory was released.
    #[error("SG_ERR_304: Reservation expired: {0}")]
    ReservationExpired(QuoteId),

    /// The reservation was already cashed out.
    #[error("SG_ERR_305: Reservation already consumed: {0}")]
    ReservationConsumed(QuoteId),

    // =================================================================
    // Risk Limit Errors (4xx)
    // =================================================================
    /// The reservation would push today's issuance over the daily cap.
    #[error("SG_ERR_400: Daily cap exceeded: used {used}, requested {requested}, cap {cap}")]
    DailyCapExceeded { used: i64, requested: i64, cap: i64 },

    /// Not enough soft inventory available for the reservation.
    #[error("SG_ERR_401: Insufficient soft inventory: need {needed}, have {available}")]
    InsufficientReserve { needed: i64, available: i64 },

    // =================================================================
    // Ledger Errors (5xx)
    // =================================================================
    /// available + reserved + payouts no longer equals the soft inventory.
    #[error("SG_ERR_500: Conservation invariant violation: {reason}")]
    ConservationViolation { reason: String },

    /// A ledger bucket would go negative.
    #[error("SG_ERR_501: Ledger underflow in {bucket} for {asset}")]
    LedgerUnderflow { asset: String, bucket: &'static str },

    // =================================================================
    // Infrastructure / Internal (9xx)
    // =================================================================
    /// A durable store write or read failed.
    #[error("SG_ERR_900: Persistence error: {0}")]
    Persistence(String),

    /// Serialization / deserialization error.
    #[error("SG_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// I/O error (disk).
    #[error("SG_ERR_902: I/O error: {0}")]
    Io(String),

    /// Unrecoverable internal error.
    #[error("SG_ERR_903: Internal error: {0}")]
    Internal(String),
}

/// Coarse error taxonomy used by callers that only need to decide whether a
/// request is retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown asset or bad engine configuration.
    Configuration,
    /// Request payload cannot be represented (bad amount, precision, overflow).
    InvalidInput,
    /// Oracle sample missing or stale. Retry later.
    Staleness,
    /// Quote or reservation lifetime elapsed.
    Expiry,
    /// Identifier unknown.
    NotFound,
    /// Request disagrees with previously committed state.
    Consistency,
    /// Slippage, daily cap or inventory limit.
    RiskLimit,
    /// Reservation already cashed out.
    Lifecycle,
    /// Storage or internal failure.
    Internal,
}

impl StableGateError {
    /// The stable `SG_ERR_nnn` code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotSupported(_) => "SG_ERR_100",
            Self::InvalidAmount { .. } => "SG_ERR_101",
            Self::PrecisionLoss { .. } => "SG_ERR_102",
            Self::Overflow(_) => "SG_ERR_103",
            Self::Configuration(_) => "SG_ERR_104",
            Self::PriceUnavailable { .. } => "SG_ERR_200",
            Self::SlippageExceeded { .. } => "SG_ERR_201",
            Self::QuoteNotFound(_) => "SG_ERR_300",
            Self::QuoteExpired(_) => "SG_ERR_301",
            Self::QuoteAmountMismatch { .. } => "SG_ERR_302",
            Self::ReservationNotFound(_) => "SG_ERR_303",
            Self::ReservationExpired(_) => "SG_ERR_304",
            Self::ReservationConsumed(_) => "SG_ERR_305",
            Self::DailyCapExceeded { .. } => "SG_ERR_400",
            Self::InsufficientReserve { .. } => "SG_ERR_401",
            Self::ConservationViolation { .. } => "SG_ERR_500",
            Self::LedgerUnderflow { .. } => "SG_ERR_501",
            Self::Persistence(_) => "SG_ERR_900",
            Self::Serialization(_) => "SG_ERR_901",
            Self::Io(_) => "SG_ERR_902",
            Self::Internal(_) => "SG_ERR_903",
        }
    }

    /// Which family of the taxonomy this error belongs to.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotSupported(_) | Self::Configuration(_) => ErrorKind::Configuration,
            Self::InvalidAmount { .. } | Self::PrecisionLoss { .. } | Self::Overflow(_) => {
                ErrorKind::InvalidInput
            }
            Self::PriceUnavailable { .. } => ErrorKind::Staleness,
            Self::QuoteExpired(_) | Self::ReservationExpired(_) => ErrorKind::Expiry,
            Self::QuoteNotFound(_) | Self::ReservationNotFound(_) => ErrorKind::NotFound,
            Self::QuoteAmountMismatch { .. } => ErrorKind::Consistency,
            Self::SlippageExceeded { .. }
            | Self::DailyCapExceeded { .. }
            | Self::InsufficientReserve { .. } => ErrorKind::RiskLimit,
            Self::ReservationConsumed(_) => ErrorKind::Lifecycle,
            Self::ConservationViolation { .. }
            | Self::LedgerUnderflow { .. }
            | Self::Persistence(_)
            | Self::Serialization(_)
            | Self::Io(_)
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status the gateway layer answers with for this error.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotSupported(_) | Self::QuoteNotFound(_) => 404,
            Self::ReservationNotFound(_) | Self::QuoteAmountMismatch { .. } => 422,
            Self::QuoteExpired(_)
            | Self::ReservationExpired(_)
            | Self::ReservationConsumed(_)
            | Self::SlippageExceeded { .. }
            | Self::InsufficientReserve { .. } => 409,
            Self::DailyCapExceeded { .. } => 429,
            Self::PriceUnavailable { .. } => 503,
            Self::InvalidAmount { .. } | Self::PrecisionLoss { .. } | Self::Overflow(_) => 400,
            Self::Configuration(_)
            | Self::ConservationViolation { .. }
            | Self::LedgerUnderflow { .. }
            | Self::Persistence(_)
            | Self::Serialization(_)
            | Self::Io(_)
            | Self::Internal(_) => 500,
        }
    }

    /// Whether a client may retry the same request later and expect a
    /// different answer.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Staleness | ErrorKind::RiskLimit | ErrorKind::Internal
        )
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, StableGateError>;

impl From<std::io::Error> for StableGateError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StableGateError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
