use crate::cdp::CdpError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- setup errors ----------------------------------------------
    #[error("unsupported path format `{0}`, only `path` is supported")]
    PathFormatUnsupported(String),
    #[error("attach arguments must contain a port")]
    MissingAttachPort,

    // --------------------------------- request errors --------------------------------------------
    #[error("stack frame not valid")]
    StackFrameNotValid,
    #[error("runtime is not connected")]
    RuntimeNotConnected,
    #[error("source request has an illegal handle {0}")]
    SourceRequestIllegalHandle(i64),
    #[error("setting value is not supported for this variable")]
    SetValueNotSupported,
    #[error("evaluate failed: {0}")]
    EvaluateFailed(String),

    // --------------------------------- breakpoint errors -----------------------------------------
    #[error("breakpoint ignored, no source mapping for {0}")]
    BreakpointIgnoredNoMapping(String),
    #[error("breakpoint ignored, no target path for {0}")]
    BreakpointIgnoredNoTargetPath(String),
    #[error("timeout after {0} ms while setting breakpoints")]
    BreakpointsTimeout(u64),
    #[error("invalid hit condition `{0}`")]
    InvalidHitCondition(String),

    // --------------------------------- transport errors ------------------------------------------
    #[error(transparent)]
    Cdp(#[from] CdpError),
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Return a hint to an interface - continue the session after error or tear it down.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::PathFormatUnsupported(_) => false,
            Error::MissingAttachPort => false,
            Error::StackFrameNotValid => false,
            Error::RuntimeNotConnected => false,
            Error::SourceRequestIllegalHandle(_) => false,
            Error::SetValueNotSupported => false,
            Error::EvaluateFailed(_) => false,
            Error::BreakpointIgnoredNoMapping(_) => false,
            Error::BreakpointIgnoredNoTargetPath(_) => false,
            Error::BreakpointsTimeout(_) => false,
            Error::InvalidHitCondition(_) => false,
            Error::Json(_) => false,
            Error::Cdp(e) => matches!(e, CdpError::Disconnected),

            // a broken transport cannot be recovered
            Error::IO(_) => true,
        }
    }
}

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "adapter", "{:#}", e);
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "adapter", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}

/// Transforms `Result` into `Option` and put error into debug logs if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        $crate::_error!(log::debug, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::debug, $res, $msg)
    };
}
