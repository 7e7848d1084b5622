//! ============================================================================
//! Routing Numbers - ABA checksum validation for payout setup
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// Digit weights of the ABA checksum, repeating every three positions
const WEIGHTS: [u32; 9] = [3, 7, 1, 3, 7, 1, 3, 7, 1];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingNumberError {
    #[error("Routing number must have 9 digits, got {0}")]
    WrongLength(usize),

    #[error("Routing number checksum does not match")]
    Checksum,
}

/// True when `value` is exactly nine ASCII digits with a valid checksum
pub fn validate_routing_number(value: &str) -> bool {
    if value.len() != 9 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    checksum(value) % 10 == 0
}

fn checksum(digits: &str) -> u32 {
    digits
        .bytes()
        .zip(WEIGHTS)
        .map(|(b, w)| u32::from(b - b'0') * w)
        .sum()
}

/// A validated nine-digit bank routing number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingNumber(String);

impl RoutingNumber {
    /// Parse user input; non-digits are stripped first, as the banking form does
    pub fn parse(input: &str) -> Result<Self, RoutingNumberError> {
        let digits: String = input.chars().filter(char::is_ascii_digit).collect();
        if digits.len() != 9 {
            return Err(RoutingNumberError::WrongLength(digits.len()));
        }
        if !validate_routing_number(&digits) {
            return Err(RoutingNumberError::Checksum);
        }
        Ok(Self(digits))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Federal Reserve routing symbol (first four digits)
    pub fn fed_routing_symbol(&self) -> &str {
        self.0.get(..4).unwrap_or_default()
    }
}

impl fmt::Display for RoutingNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
