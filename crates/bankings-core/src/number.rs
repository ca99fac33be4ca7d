//! Account number layout and generation.
//!
//! Every account number is 19 decimal digits:
//!
//! | positions | width | content                         |
//! |-----------|-------|---------------------------------|
//! | 0..5      | 5     | prefix `40817`                  |
//! | 5..8      | 3     | ISO 4217 numeric currency code  |
//! | 8         | 1     | control digit                   |
//! | 9..12     | 3     | branch code `001`               |
//! | 12..19    | 7     | zero-padded random suffix       |
//!
//! The control digit is computed over `prefix + currency + branch`. Downstream
//! consumers parse positionally, so this layout is part of the external contract.

use crate::checksum::weighted_complement;
use crate::error::ProvisioningError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const ACCOUNT_PREFIX: &str = "40817";
pub const BRANCH_CODE: &str = "001";
pub const SUFFIX_WIDTH: usize = 7;
pub const SUFFIX_SPACE: u32 = 10_000_000;

/// Validated three-digit numeric currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub const WIDTH: usize = 3;

    pub fn parse(raw: &str) -> Result<Self, ProvisioningError> {
        if raw.len() != Self::WIDTH || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ProvisioningError::InvalidCurrency(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// Zero-pads numeric codes, so `36` becomes `"036"`.
    pub fn from_numeric(code: u64) -> Result<Self, ProvisioningError> {
        if code > 999 {
            return Err(ProvisioningError::InvalidCurrency(code.to_string()));
        }
        Ok(Self(format!("{:03}", code)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn digit_values(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.bytes().map(|b| b - b'0')
    }
}

impl FromStr for CurrencyCode {
    type Err = ProvisioningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<CurrencyCode> for String {
    fn from(value: CurrencyCode) -> Self {
        value.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Currency as it arrives on the wire: either a string or a bare JSON number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CurrencyInput {
    Text(String),
    Numeric(u64),
}

impl TryFrom<CurrencyInput> for CurrencyCode {
    type Error = ProvisioningError;

    fn try_from(value: CurrencyInput) -> Result<Self, Self::Error> {
        match value {
            CurrencyInput::Text(raw) => Self::parse(&raw),
            CurrencyInput::Numeric(code) => Self::from_numeric(code),
        }
    }
}

impl From<&str> for CurrencyInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Fixed-width account number. Construct through [`AccountNumberFactory`] or
/// [`AccountNumber::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct AccountNumber(String);

impl AccountNumber {
    pub const LEN: usize = 19;
    pub const CURRENCY_RANGE: std::ops::Range<usize> = 5..8;
    pub const CONTROL_POSITION: usize = 8;
    pub const BRANCH_RANGE: std::ops::Range<usize> = 9..12;
    pub const SUFFIX_RANGE: std::ops::Range<usize> = 12..19;

    /// Parse and check layout, prefix, branch, and control digit.
    pub fn parse(raw: &str) -> Result<Self, ProvisioningError> {
        let invalid = |reason: &str| {
            ProvisioningError::InvalidRequest(format!("account number '{}': {}", raw, reason))
        };

        if raw.len() != Self::LEN {
            return Err(invalid("wrong length"));
        }
        if !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("non-digit characters"));
        }
        if !raw.starts_with(ACCOUNT_PREFIX) {
            return Err(invalid("unknown prefix"));
        }

        let number = Self(raw.to_string());
        if number.branch_code() != BRANCH_CODE {
            return Err(invalid("unknown branch code"));
        }
        if !number.verify_control_digit() {
            return Err(invalid("control digit mismatch"));
        }
        Ok(number)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric form. Always fits: 19 digits led by `4` stays below `u64::MAX`.
    pub fn as_u64(&self) -> u64 {
        self.0
            .bytes()
            .fold(0u64, |acc, b| acc * 10 + u64::from(b - b'0'))
    }

    pub fn currency(&self) -> &str {
        &self.0[Self::CURRENCY_RANGE]
    }

    pub fn control_digit(&self) -> u8 {
        self.0.as_bytes()[Self::CONTROL_POSITION] - b'0'
    }

    pub fn branch_code(&self) -> &str {
        &self.0[Self::BRANCH_RANGE]
    }

    pub fn suffix(&self) -> &str {
        &self.0[Self::SUFFIX_RANGE]
    }

    /// Recompute the checksum over prefix, currency, and branch and compare it
    /// with the stored control digit.
    pub fn verify_control_digit(&self) -> bool {
        let bytes = self.0.as_bytes();
        let checked: Vec<u8> = bytes[..Self::CONTROL_POSITION]
            .iter()
            .chain(&bytes[Self::BRANCH_RANGE])
            .map(|b| b - b'0')
            .collect();
        weighted_complement(&checked) == self.control_digit()
    }
}

impl From<AccountNumber> for String {
    fn from(value: AccountNumber) -> Self {
        value.0
    }
}

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds account numbers for a currency.
///
/// Suffixes come from the thread-local generator, which is seeded from the OS
/// per thread. Uniqueness is not checked against issued numbers.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountNumberFactory;

impl AccountNumberFactory {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self, currency: &CurrencyCode) -> AccountNumber {
        let suffix = rand::thread_rng().gen_range(0..SUFFIX_SPACE);
        self.assemble(currency, suffix)
    }

    /// Fresh number for `currency` that never equals `previous`.
    pub fn regenerate(&self, currency: &CurrencyCode, previous: &AccountNumber) -> AccountNumber {
        loop {
            let next = self.generate(currency);
            if &next != previous {
                return next;
            }
        }
    }

    /// Validate a raw currency code, then generate.
    pub fn generate_from_str(&self, raw: &str) -> Result<AccountNumber, ProvisioningError> {
        if raw.is_empty() {
            tracing::warn!("currency code is empty");
        }
        let currency = CurrencyCode::parse(raw).map_err(|err| {
            tracing::warn!(currency = raw, error = %err, "rejecting currency code");
            err
        })?;
        Ok(self.generate(&currency))
    }

    /// Deterministic assembly with a caller-chosen suffix (reduced modulo the
    /// suffix space).
    pub fn assemble(&self, currency: &CurrencyCode, suffix: u32) -> AccountNumber {
        let checked: Vec<u8> = ACCOUNT_PREFIX
            .bytes()
            .map(|b| b - b'0')
            .chain(currency.digit_values())
            .chain(BRANCH_CODE.bytes().map(|b| b - b'0'))
            .collect();
        let control = weighted_complement(&checked);

        AccountNumber(format!(
            "{}{}{}{}{:0width$}",
            ACCOUNT_PREFIX,
            currency,
            control,
            BRANCH_CODE,
            suffix % SUFFIX_SPACE,
            width = SUFFIX_WIDTH
        ))
    }
}
