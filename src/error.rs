//! Error types for session establishment, tunnel I/O and scheduling.
//!
//! This module defines all errors that can occur while dialing the jump host,
//! negotiating the telnet tunnel, tearing sessions down and configuring the
//! recurring schedule.

use thiserror::Error;

/// Errors that can occur while managing the session pool.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The secure transport to the jump host could not be established.
    ///
    /// Covers authentication and network failures as well as the connect
    /// timeout. No session is created for the entry.
    #[error("transport error: {0}")]
    TransportError(String),

    /// The terminal channel could not be opened after the transport succeeded.
    ///
    /// The session is still tracked, but marked disconnected.
    #[error("channel error: {0}")]
    ChannelError(String),

    /// The tunnel's stream pair has been closed.
    #[error("channel disconnect on read")]
    ChannelDisconnectError,

    /// No decisive output arrived before the idle threshold was exceeded.
    #[error("protocol idle timeout: {0}")]
    ProtocolTimeout(String),

    /// The requested schedule period is below the allowed minimum.
    #[error("schedule period {period} is too low, it cannot be less than {minimum}")]
    PeriodTooLow { period: u64, minimum: u64 },

    /// The pool cannot be cleared until the schedule has been halted.
    #[error("This cannot be done while the schedule is running.")]
    ScheduleRunning,

    /// The scheduler was halted and has not been re-armed since.
    #[error("scheduler is halted, connect or add sessions before configuring it again")]
    SchedulerHalted,

    /// The session request was malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Graceful teardown of a session failed.
    #[error("teardown of {addr} failed: {reason}")]
    TeardownError { addr: String, reason: String },

    /// An error occurred in the async-ssh2-tokio library.
    #[error("async ssh2 error: {0}")]
    Ssh2Error(#[from] async_ssh2_tokio::Error),

    /// An error occurred in the russh library.
    #[error("russh error: {0}")]
    RusshError(#[from] russh::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_errors_convert_with_question_mark() {
        fn fails() -> Result<(), ConnectError> {
            let handshake: Result<(), russh::Error> = Err(russh::Error::Disconnect);
            handshake?;
            Ok(())
        }
        let err = fails().expect_err("converted");
        assert!(matches!(err, ConnectError::RusshError(_)));
        assert!(err.to_string().starts_with("russh error"));
    }

    #[test]
    fn teardown_error_names_the_session() {
        let err = ConnectError::TeardownError {
            addr: "10.0.0.1:23".to_string(),
            reason: "channel close refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "teardown of 10.0.0.1:23 failed: channel close refused"
        );
    }
}
