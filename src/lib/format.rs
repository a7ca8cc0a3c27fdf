//! Display helpers shared by the CLI report and any other presentation layer.

use alloy_primitives::U256;
use chrono::DateTime;

pub const ETHER_DECIMALS: u8 = 18;
pub const USDC_DECIMALS: u8 = 6;

/// Exact fixed-point rendering of `value / 10^decimals`, trailing zeros trimmed.
pub fn format_units(value: U256, decimals: u8) -> String {
    if value.is_zero() {
        return "0".to_string();
    }
    let divisor = U256::from(10u64).pow(U256::from(decimals));
    let whole = value / divisor;
    let fraction = value % divisor;
    if fraction.is_zero() {
        return whole.to_string();
    }
    let mut digits = fraction.to_string();
    while digits.len() < decimals as usize {
        digits.insert(0, '0');
    }
    let digits = digits.trim_end_matches('0');
    format!("{whole}.{digits}")
}

pub fn wei_to_ether(value: U256) -> String {
    format_units(value, ETHER_DECIMALS)
}

pub fn wei_to_usdc(value: U256) -> String {
    format_units(value, USDC_DECIMALS)
}

/// Groups the integer part with commas and rounds the fraction half-up to
/// `fraction_digits`. Non-numeric input renders as `"0"`.
pub fn format_grouped(value: &str, fraction_digits: usize) -> String {
    let value = value.trim();
    let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));
    if (whole.is_empty() && fraction.is_empty())
        || !whole.chars().all(|ch| ch.is_ascii_digit())
        || !fraction.chars().all(|ch| ch.is_ascii_digit())
    {
        return "0".to_string();
    }

    let mut whole_digits: Vec<u8> = if whole.is_empty() {
        vec![0]
    } else {
        whole.bytes().map(|b| b - b'0').collect()
    };
    let mut fraction_digits_vec: Vec<u8> = fraction.bytes().map(|b| b - b'0').collect();
    let round_up = fraction_digits_vec
        .get(fraction_digits)
        .map(|digit| *digit >= 5)
        .unwrap_or(false);
    fraction_digits_vec.resize(fraction_digits, 0);

    if round_up {
        let mut carry = true;
        for digit in fraction_digits_vec.iter_mut().rev() {
            if !carry {
                break;
            }
            *digit += 1;
            carry = *digit == 10;
            if carry {
                *digit = 0;
            }
        }
        for digit in whole_digits.iter_mut().rev() {
            if !carry {
                break;
            }
            *digit += 1;
            carry = *digit == 10;
            if carry {
                *digit = 0;
            }
        }
        if carry {
            whole_digits.insert(0, 1);
        }
    }

    while whole_digits.len() > 1 && whole_digits[0] == 0 {
        whole_digits.remove(0);
    }

    let mut grouped = String::new();
    for (index, digit) in whole_digits.iter().enumerate() {
        if index > 0 && (whole_digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push((b'0' + digit) as char);
    }
    if fraction_digits > 0 {
        grouped.push('.');
        grouped.extend(fraction_digits_vec.iter().map(|digit| (b'0' + digit) as char));
    }
    grouped
}

pub fn format_address(address: &str) -> String {
    let address = address.trim().to_ascii_lowercase();
    if address.len() <= 10 || !address.is_ascii() {
        return address;
    }
    format!("{}...{}", &address[..6], &address[address.len() - 4..])
}

pub fn format_timestamp(secs: u64) -> String {
    if secs == 0 {
        return "N/A".to_string();
    }
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%b %d, %Y %H:%M").to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_units_exactly() {
        assert_eq!(wei_to_ether(U256::ZERO), "0");
        assert_eq!(
            wei_to_ether(U256::from(1_500_000_000_000_000_000u64)),
            "1.5"
        );
        assert_eq!(wei_to_ether(U256::from(1u64)), "0.000000000000000001");
        assert_eq!(wei_to_usdc(U256::from(2_000_000u64)), "2");
        assert_eq!(wei_to_usdc(U256::from(1_234_567u64)), "1.234567");

        let huge = U256::from(10u64).pow(U256::from(40u64));
        assert_eq!(wei_to_ether(huge), "10000000000000000000000");
    }

    #[test]
    fn groups_and_rounds() {
        assert_eq!(format_grouped("1234567.891", 2), "1,234,567.89");
        assert_eq!(format_grouped("999.995", 2), "1,000.00");
        assert_eq!(format_grouped("12", 2), "12.00");
        assert_eq!(format_grouped("0.5", 0), "1");
        assert_eq!(format_grouped("abc", 2), "0");
    }

    #[test]
    fn truncates_addresses() {
        assert_eq!(
            format_address("0x28BE6260DBB7872DE5EFFC9A4A73C85B7405A8C0"),
            "0x28be...a8c0"
        );
        assert_eq!(format_address(""), "");
    }

    #[test]
    fn formats_timestamps() {
        assert_eq!(format_timestamp(0), "N/A");
        assert_eq!(format_timestamp(1_735_823_040), "Jan 02, 2025 13:04");
    }
}
