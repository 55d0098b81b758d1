//! Error taxonomy shared by every engine component

use thiserror::Error;

use crate::fixed::FixedError;
use crate::types::TokenId;

/// Numeric codes surfaced to RPC callers
pub mod rpc_code {
    pub const AMOUNT_OUT_OF_RANGE: i32 = -3;
    pub const INVALID_ADDRESS_OR_KEY: i32 = -5;
    pub const INVALID_PARAMETER: i32 = -8;
    pub const VERIFY_REJECTED: i32 = -26;
    pub const INVALID_REQUEST: i32 = -32600;
}

/// Errors raised while validating or applying an event
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoanError {
    /// Amount is zero, negative or carries too many decimals
    #[error("Amount out of range: {0}")]
    AmountOutOfRange(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Token {0} does not exist!")]
    UnknownToken(String),

    /// Arguments could not be parsed
    #[error("Invalid parameter: {0}")]
    MalformedArgs(String),

    /// Input is well-formed but rejected by a business rule
    #[error("{0}")]
    Validation(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("No live fixed prices for {0}")]
    PriceNotLive(String),

    #[error("Vault does not have enough collateralization ratio defined by loan scheme - {0}")]
    RatioViolation(String),

    #[error("Cannot change vault with locked token {0}")]
    TokenLocked(TokenId),

    #[error("Vault {0} is under liquidation")]
    Liquidated(String),

    /// Post-condition self-check failed; the block must be invalidated
    #[error("Invariant breach: {0}")]
    InvariantBreach(String),

    #[error("Arithmetic overflow")]
    Overflow,
}

impl LoanError {
    /// Map onto the RPC numeric code
    pub fn rpc_code(&self) -> i32 {
        match self {
            LoanError::AmountOutOfRange(_) => rpc_code::AMOUNT_OUT_OF_RANGE,
            LoanError::InvalidAddress(_) | LoanError::UnknownToken(_) => {
                rpc_code::INVALID_ADDRESS_OR_KEY
            }
            LoanError::MalformedArgs(_) => rpc_code::INVALID_PARAMETER,
            LoanError::Validation(_)
            | LoanError::Authorization(_)
            | LoanError::PriceNotLive(_)
            | LoanError::RatioViolation(_)
            | LoanError::TokenLocked(_)
            | LoanError::Liquidated(_) => rpc_code::VERIFY_REJECTED,
            LoanError::InvariantBreach(_) | LoanError::Overflow => rpc_code::INVALID_REQUEST,
        }
    }

    /// Fatal errors invalidate the whole block
    pub fn is_fatal(&self) -> bool {
        matches!(self, LoanError::InvariantBreach(_))
    }
}

impl From<FixedError> for LoanError {
    fn from(e: FixedError) -> Self {
        match e {
            FixedError::Overflow => LoanError::Overflow,
            FixedError::Parse(s) => LoanError::MalformedArgs(format!("Invalid decimal: {}", s)),
            FixedError::Precision(s, _) => LoanError::AmountOutOfRange(s),
        }
    }
}

pub type LoanResult<T> = Result<T, LoanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_codes() {
        assert_eq!(LoanError::AmountOutOfRange("x".into()).rpc_code(), -3);
        assert_eq!(LoanError::UnknownToken("x".into()).rpc_code(), -5);
        assert_eq!(LoanError::MalformedArgs("x".into()).rpc_code(), -8);
        assert_eq!(LoanError::RatioViolation("x".into()).rpc_code(), -26);
        assert_eq!(LoanError::TokenLocked(TokenId(3)).rpc_code(), -26);
        assert_eq!(LoanError::InvariantBreach("x".into()).rpc_code(), -32600);
    }

    #[test]
    fn test_fixed_error_conversion() {
        let e: LoanError = FixedError::Overflow.into();
        assert_eq!(e, LoanError::Overflow);
        let e: LoanError = FixedError::Precision("1.123456789".into(), 8).into();
        assert!(matches!(e, LoanError::AmountOutOfRange(_)));
    }
}
