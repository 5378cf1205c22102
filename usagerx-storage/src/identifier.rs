//! SQL identifier checks. Table and column names are the only parts of a
//! statement not carried as bound parameters, so they must pass this gate.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref IDENTIFIER: Regex =
        Regex::new("^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("identifier pattern is valid");
}

pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Double-quotes `name` after validating it; `None` for anything else.
pub fn quote_identifier(name: &str) -> Option<String> {
    is_valid_identifier(name).then(|| format!("\"{name}\""))
}
