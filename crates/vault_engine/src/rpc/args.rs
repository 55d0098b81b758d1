//! Positional JSON argument helpers

use serde_json::{Map, Value};
use vault_common::{Address, Amount, Height, LoanError, LoanResult, TokenAmount, TokenRef, TxId};

fn missing(name: &str) -> LoanError {
    LoanError::MalformedArgs(format!("missing argument '{}'", name))
}

fn wrong_type(name: &str, expected: &str) -> LoanError {
    LoanError::MalformedArgs(format!("argument '{}' must be {}", name, expected))
}

/// Positional argument, `null` counts as absent
pub fn get<'a>(params: &'a [Value], index: usize) -> Option<&'a Value> {
    params.get(index).filter(|v| !v.is_null())
}

pub fn required<'a>(params: &'a [Value], index: usize, name: &str) -> LoanResult<&'a Value> {
    get(params, index).ok_or_else(|| missing(name))
}

pub fn as_str<'a>(value: &'a Value, name: &str) -> LoanResult<&'a str> {
    value.as_str().ok_or_else(|| wrong_type(name, "a string"))
}

pub fn str_arg<'a>(params: &'a [Value], index: usize, name: &str) -> LoanResult<&'a str> {
    as_str(required(params, index, name)?, name)
}

pub fn opt_str<'a>(params: &'a [Value], index: usize, name: &str) -> LoanResult<Option<&'a str>> {
    get(params, index).map(|v| as_str(v, name)).transpose()
}

pub fn object<'a>(value: &'a Value, name: &str) -> LoanResult<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| wrong_type(name, "an object"))
}

pub fn field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}

pub fn required_field<'a>(obj: &'a Map<String, Value>, key: &str) -> LoanResult<&'a Value> {
    field(obj, key).ok_or_else(|| missing(key))
}

pub fn address(value: &Value, name: &str) -> LoanResult<Address> {
    Address::parse(as_str(value, name)?)
}

pub fn txid(value: &Value, name: &str) -> LoanResult<TxId> {
    TxId::parse(as_str(value, name)?)
}

pub fn token_ref(value: &Value, name: &str) -> LoanResult<TokenRef> {
    match value {
        Value::String(s) => s.parse(),
        Value::Number(n) => n.to_string().parse(),
        _ => Err(wrong_type(name, "a token id or symbol")),
    }
}

/// Decimal given as a string or a JSON number
pub fn decimal(value: &Value, name: &str) -> LoanResult<Amount> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return Err(wrong_type(name, "a decimal")),
    };
    text.parse::<Amount>().map_err(LoanError::from)
}

pub fn height(value: &Value, name: &str) -> LoanResult<Height> {
    match value {
        Value::Number(n) => n.as_u64().ok_or_else(|| wrong_type(name, "a non-negative integer")),
        Value::String(s) => s.parse().map_err(|_| wrong_type(name, "a non-negative integer")),
        _ => Err(wrong_type(name, "a non-negative integer")),
    }
}

pub fn ratio(value: &Value, name: &str) -> LoanResult<u32> {
    let raw = height(value, name)?;
    u32::try_from(raw).map_err(|_| LoanError::AmountOutOfRange(format!("{} {}", name, raw)))
}

pub fn boolean(value: &Value, name: &str) -> LoanResult<bool> {
    value.as_bool().ok_or_else(|| wrong_type(name, "a boolean"))
}

pub fn opt_bool(obj: &Map<String, Value>, key: &str) -> LoanResult<Option<bool>> {
    field(obj, key).map(|v| boolean(v, key)).transpose()
}

pub fn opt_string(obj: &Map<String, Value>, key: &str) -> LoanResult<Option<String>> {
    field(obj, key)
        .map(|v| as_str(v, key).map(str::to_string))
        .transpose()
}

pub fn token_amount(value: &Value, name: &str) -> LoanResult<TokenAmount> {
    as_str(value, name)?.parse()
}

/// `"x@T"` or `["x@T", "y@U"]`
pub fn token_amounts(value: &Value, name: &str) -> LoanResult<Vec<TokenAmount>> {
    match value {
        Value::String(s) => Ok(vec![s.parse()?]),
        Value::Array(items) => items.iter().map(|v| token_amount(v, name)).collect(),
        _ => Err(wrong_type(name, "an amount or a list of amounts")),
    }
}

/// Governance values are accepted as strings, booleans or numbers
pub fn attribute_text(value: &Value, name: &str) -> LoanResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(wrong_type(name, "a string, boolean or number")),
    }
}
