use crate::error::ProvisioningError;

/// Compute the control digit of a decimal digit string.
///
/// Digits at even positions (0-indexed) are weighted 2, odd positions 1. The
/// control digit is the mod-10 complement of the weighted sum, so appending it
/// to the weighted sum always yields a multiple of ten.
pub fn control_digit(digits: &str) -> Result<u8, ProvisioningError> {
    let values = digits
        .chars()
        .enumerate()
        .map(|(position, found)| {
            found
                .to_digit(10)
                .map(|digit| digit as u8)
                .ok_or(ProvisioningError::NonDigit { position, found })
        })
        .collect::<Result<Vec<u8>, _>>()?;

    Ok(weighted_complement(&values))
}

/// Checksum over already-validated digit values (each in `0..=9`).
pub(crate) fn weighted_complement(values: &[u8]) -> u8 {
    let sum: u32 = values
        .iter()
        .enumerate()
        .map(|(position, value)| {
            let weight = if position % 2 == 0 { 2 } else { 1 };
            weight * u32::from(*value)
        })
        .sum();

    ((10 - sum % 10) % 10) as u8
}

/// Same as [`control_digit`] but returns the ASCII character.
pub fn control_char(digits: &str) -> Result<char, ProvisioningError> {
    Ok(char::from(b'0' + control_digit(digits)?))
}
