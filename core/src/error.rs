//! Central error types for the trading runtime.
//!
//! Each subsystem owns a small `thiserror`-derived enum; [`BotError`] aggregates them for
//! callers that need a single error type (e.g. `MarketEngineManager` construction).

use thiserror::Error;

/// Errors returned by [`crate::config`] validation and by components that fail at
/// construction time (account sync exhausted retries, recovery setup, …).
#[derive(Debug, Clone, Error)]
pub enum BotError {
    #[error("account error: {0}")]
    Account(#[from] AccountError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("router error: {0}")]
    Router(#[from] RouterError),

    #[error("rest error: {0}")]
    Rest(#[from] RestError),

    #[error("construction failed: {0}")]
    Construction(String),
}

/// Errors returned by `AccountManager` operations.
#[derive(Debug, Clone, Copy, Error)]
pub enum AccountError {
    #[error("market not registered")]
    UnknownMarket,
    #[error("reservation amount must be positive")]
    NonPositiveAmount,
    #[error("insufficient available balance")]
    InsufficientFunds,
}

/// Errors returned by `MarketEngine::submit`, matching the reservation/transport outcomes
/// named in the error-handling design.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("order rejected: {0}")]
    OrderRejected(String),
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("market not supported")]
    MarketNotSupported,
    #[error("internal error: {0}")]
    InternalError(String),
}

/// Errors surfaced by `EventRouter`.
#[derive(Debug, Clone, Copy, Error)]
pub enum RouterError {
    #[error("failed to parse message")]
    ParseFailure,
    #[error("code/market conflict in message")]
    Conflict,
    #[error("market not registered")]
    UnknownMarket,
}

/// Transport-level error taxonomy consumed (not produced) by the core; the external REST
/// client classifies its own failures into this shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RestError {
    #[error("dns resolution failed")]
    ResolveFailed,
    #[error("connection failed")]
    ConnectFailed,
    #[error("handshake failed")]
    HandshakeFailed,
    #[error("write failed")]
    WriteFailed,
    #[error("read failed")]
    ReadFailed,
    #[error("request timed out")]
    Timeout,
    #[error("bad status: {0}")]
    BadStatus(u16),
    #[error("invalid argument")]
    InvalidArgument,
    #[error("parse error")]
    ParseError,
    #[error("unknown error")]
    Unknown,
}

/// Indicates the receiving side of an internal channel was dropped.
///
/// Mirrors the reference framework's `RxDropped` marker, adapted from `tokio::sync::mpsc`
/// to `std::sync::mpsc` since this crate's channels are synchronous.
#[derive(Debug, Clone, Copy, Error)]
#[error("receiver dropped")]
pub struct RxDropped;

impl<T> From<std::sync::mpsc::SendError<T>> for RxDropped {
    fn from(_: std::sync::mpsc::SendError<T>) -> Self {
        Self
    }
}
