//! Conversion of raw on-chain balances.
//!
//! Raw balances are kept as `U256`. The decimal value is derived for display
//! and for the `evm_balance_decimal` gauge only, and is approximate: it is a
//! `f64` and therefore carries roughly 15-17 significant digits.

use alloy::primitives::{utils::format_units, U256};
use tracing::error;

/// Parse a hex quantity such as `0xde0b6b3a7640000`.
///
/// The `0x`/`0X` prefix is optional. Malformed input (including values wider
/// than 256 bits) is logged and yields zero.
pub fn hex_to_u256(hex: &str) -> U256 {
    let digits = hex
        .strip_prefix("0x")
        .or_else(|| hex.strip_prefix("0X"))
        .unwrap_or(hex);

    let parsed = if digits.is_empty() {
        Err("no hex digits".to_string())
    } else {
        U256::from_str_radix(digits, 16).map_err(|e| e.to_string())
    };

    match parsed {
        Ok(value) => value,
        Err(e) => {
            error!(value = %hex, error = %e, "Failed to convert hex to integer");
            U256::ZERO
        }
    }
}

/// Scale a raw balance down by `10^decimals`.
///
/// Up to 77 decimals the raw value is first rendered exactly as a decimal
/// string and parsed once, so the only loss is the final rounding to `f64`.
/// Larger scales fall back to float division.
pub fn to_decimal(raw: U256, decimals: u32) -> f64 {
    if let Ok(decimals) = u8::try_from(decimals) {
        if let Ok(formatted) = format_units(raw, decimals) {
            if let Ok(value) = formatted.parse::<f64>() {
                return value;
            }
        }
    }

    to_f64(raw) / 10f64.powi(decimals.min(i32::MAX as u32) as i32)
}

/// Nearest `f64` to a raw balance, for gauges.
pub fn to_f64(raw: U256) -> f64 {
    raw.to_string().parse::<f64>().unwrap_or(0.0)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` under a local subscriber and return its result with everything logged.
    pub(crate) fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let value = tracing::subscriber::with_default(subscriber, f);
        let logs = String::from_utf8_lossy(&buffer.0.lock().unwrap()).into_owned();
        (value, logs)
    }

    const ONE_ETHER: u128 = 1_000_000_000_000_000_000;

    #[test]
    fn parses_prefixed_and_bare_hex() {
        assert_eq!(hex_to_u256("0xde0b6b3a7640000"), U256::from(ONE_ETHER));
        assert_eq!(hex_to_u256("de0b6b3a7640000"), U256::from(ONE_ETHER));
        assert_eq!(hex_to_u256("0XDE0B6B3A7640000"), U256::from(ONE_ETHER));
        assert_eq!(hex_to_u256("0x0"), U256::ZERO);
    }

    #[test]
    fn malformed_hex_is_zero_and_logged() {
        for input in ["not-hex", "0x", ""] {
            let (value, logs) = capture_logs(|| hex_to_u256(input));
            assert_eq!(value, U256::ZERO, "input {:?}", input);
            assert!(
                logs.contains("Failed to convert hex to integer"),
                "input {:?} was not logged",
                input
            );
        }
    }

    #[test]
    fn valid_hex_logs_nothing() {
        let (value, logs) = capture_logs(|| hex_to_u256("0x0"));
        assert_eq!(value, U256::ZERO);
        assert!(logs.is_empty());
    }

    #[test]
    fn handles_balances_beyond_u128() {
        let raw = hex_to_u256("0x1000000000000000000000000000000000");
        assert_eq!(raw, U256::from(1u8) << 132);
    }

    #[test]
    fn one_ether_is_one() {
        assert_eq!(to_decimal(U256::from(ONE_ETHER), 18), 1.0);
    }

    #[test]
    fn scales_by_chain_decimals() {
        assert_eq!(to_decimal(U256::from(2_500_000u64), 6), 2.5);
        assert_eq!(to_decimal(U256::from(42u64), 0), 42.0);
        assert_eq!(to_decimal(U256::ZERO, 18), 0.0);
    }

    #[test]
    fn very_large_scales_fall_back_to_division() {
        let value = to_decimal(U256::from(10u64).pow(U256::from(70u64)), 80);
        assert!((value - 1e-10).abs() < 1e-20);
    }
}
