//! `"<decimal>@<token>"` amounts and token references

use core::fmt;
use core::str::FromStr;

use crate::error::LoanError;
use crate::fixed::Amount;

/// How a caller names a token: numeric id, symbol, or `SYMBOL#id`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenRef {
    Id(u32),
    Symbol(String),
    SymbolWithId(String, u32),
}

impl FromStr for TokenRef {
    type Err = LoanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(LoanError::UnknownToken(s.to_string()));
        }
        if s.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse::<u32>()
                .map(TokenRef::Id)
                .map_err(|_| LoanError::UnknownToken(s.to_string()));
        }
        if let Some((symbol, id)) = s.rsplit_once('#') {
            let id = id
                .parse::<u32>()
                .map_err(|_| LoanError::UnknownToken(s.to_string()))?;
            return Ok(TokenRef::SymbolWithId(symbol.to_string(), id));
        }
        Ok(TokenRef::Symbol(s.to_string()))
    }
}

impl fmt::Display for TokenRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenRef::Id(id) => write!(f, "{}", id),
            TokenRef::Symbol(symbol) => f.write_str(symbol),
            TokenRef::SymbolWithId(symbol, id) => write!(f, "{}#{}", symbol, id),
        }
    }
}

/// Parsed `"<decimal>@<token>"`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenAmount {
    pub amount: Amount,
    pub token: TokenRef,
}

impl FromStr for TokenAmount {
    type Err = LoanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, token) = s.split_once('@').ok_or_else(|| {
            LoanError::MalformedArgs(format!(
                "Invalid amount '{}', expected <amount>@<token>",
                s
            ))
        })?;
        let amount: Amount = value
            .parse()
            .map_err(|e| LoanError::AmountOutOfRange(format!("{}: {}", s, e)))?;
        if !amount.is_positive() {
            return Err(LoanError::AmountOutOfRange(format!(
                "Amount out of range: {}",
                s
            )));
        }
        Ok(TokenAmount {
            amount,
            token: token.parse()?,
        })
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.amount, self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_ref_forms() {
        assert_eq!("0".parse::<TokenRef>().unwrap(), TokenRef::Id(0));
        assert_eq!(
            "DUSD".parse::<TokenRef>().unwrap(),
            TokenRef::Symbol("DUSD".to_string())
        );
        assert_eq!(
            "TSLA#5".parse::<TokenRef>().unwrap(),
            TokenRef::SymbolWithId("TSLA".to_string(), 5)
        );
        assert!("TSLA#x".parse::<TokenRef>().is_err());
    }

    #[test]
    fn test_token_amount_parse() {
        let ta: TokenAmount = "10.5@DFI".parse().unwrap();
        assert_eq!(ta.amount.to_string(), "10.50000000");
        assert_eq!(ta.token, TokenRef::Symbol("DFI".to_string()));
        assert_eq!(ta.to_string(), "10.50000000@DFI");
    }

    #[test]
    fn test_token_amount_rejects() {
        assert!(matches!(
            "10DFI".parse::<TokenAmount>(),
            Err(LoanError::MalformedArgs(_))
        ));
        assert!(matches!(
            "0@DFI".parse::<TokenAmount>(),
            Err(LoanError::AmountOutOfRange(_))
        ));
        assert!(matches!(
            "1.000000001@DFI".parse::<TokenAmount>(),
            Err(LoanError::AmountOutOfRange(_))
        ));
    }
}
