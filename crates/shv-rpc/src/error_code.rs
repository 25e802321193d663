/// The RPC error code table (spec §4.4).
///
/// `Unknown` keeps `Value -> ErrorCode` decoding total: a newer peer that
/// sends a code this table doesn't list still round-trips through here
/// instead of becoming another place a message gets silently dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidRequest,
    MethodNotFound,
    InvalidParam,
    MethodCallException,
    LoginRequired,
    UserIDRequired,
    NotImplemented,
    TryAgainLater,
    RequestInvalid,
    Unknown(i64),
}

impl ErrorCode {
    pub fn code(self) -> i64 {
        match self {
            ErrorCode::InvalidRequest => 1,
            ErrorCode::MethodNotFound => 2,
            ErrorCode::InvalidParam => 3,
            ErrorCode::MethodCallException => 5,
            ErrorCode::LoginRequired => 6,
            ErrorCode::UserIDRequired => 7,
            ErrorCode::NotImplemented => 8,
            ErrorCode::TryAgainLater => 9,
            ErrorCode::RequestInvalid => 10,
            ErrorCode::Unknown(c) => c,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            1 => ErrorCode::InvalidRequest,
            2 => ErrorCode::MethodNotFound,
            3 => ErrorCode::InvalidParam,
            5 => ErrorCode::MethodCallException,
            6 => ErrorCode::LoginRequired,
            7 => ErrorCode::UserIDRequired,
            8 => ErrorCode::NotImplemented,
            9 => ErrorCode::TryAgainLater,
            10 => ErrorCode::RequestInvalid,
            other => ErrorCode::Unknown(other),
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCode::InvalidRequest => "InvalidRequest",
            ErrorCode::MethodNotFound => "MethodNotFound",
            ErrorCode::InvalidParam => "InvalidParam",
            ErrorCode::MethodCallException => "MethodCallException",
            ErrorCode::LoginRequired => "LoginRequired",
            ErrorCode::UserIDRequired => "UserIDRequired",
            ErrorCode::NotImplemented => "NotImplemented",
            ErrorCode::TryAgainLater => "TryAgainLater",
            ErrorCode::RequestInvalid => "RequestInvalid",
            ErrorCode::Unknown(c) => return write!(f, "Unknown({c})"),
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_round_trips() {
        for ec in [
            ErrorCode::InvalidRequest,
            ErrorCode::MethodNotFound,
            ErrorCode::InvalidParam,
            ErrorCode::MethodCallException,
            ErrorCode::LoginRequired,
            ErrorCode::UserIDRequired,
            ErrorCode::NotImplemented,
            ErrorCode::TryAgainLater,
            ErrorCode::RequestInvalid,
        ] {
            assert_eq!(ErrorCode::from_code(ec.code()), ec);
        }
    }

    #[test]
    fn unknown_code_is_total() {
        assert_eq!(ErrorCode::from_code(42), ErrorCode::Unknown(42));
    }
}
