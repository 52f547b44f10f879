// ── Entropy ───────────────────────────────────────────────────────────────────
//
// Cryptographically secure random bytes from the operating system's source.

use crate::error::{Record, Result};
use crate::platform::{Entropy, EntropySys};

/// Fill `buf` with OS entropy.  An empty buffer succeeds trivially.
pub fn get_entropy(buf: &mut [u8]) -> Result<()> {
    if buf.is_empty() {
        return Ok(());
    }
    Entropy::fill(buf).record()
}

/// `N` bytes of OS entropy.
pub fn entropy_array<const N: usize>() -> Result<[u8; N]> {
    let mut out = [0u8; N];
    get_entropy(&mut out)?;
    Ok(out)
}

/// A uniformly distributed `u64` from OS entropy.
pub fn next_u64() -> Result<u64> {
    entropy_array::<8>().map(u64::from_ne_bytes)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(all(test, not(oskit_backend = "fallback")))]
mod tests {
    use super::*;

    /// Critical value of χ² with 255 degrees of freedom at p = 0.05 (95% confidence).
    const CHI_SQUARED_CRITICAL: f64 = 293.248;

    fn chi_squared(bytes: &[u8]) -> f64 {
        let mut bins = [0u64; 256];
        for &b in bytes {
            bins[b as usize] += 1;
        }
        let expected = bytes.len() as f64 / 256.0;
        bins.iter()
            .map(|&observed| {
                let d = observed as f64 - expected;
                d * d / expected
            })
            .sum()
    }

    #[test]
    fn sixteen_bytes_are_not_all_zero() {
        let bytes: [u8; 16] = entropy_array().expect("entropy");
        assert!(bytes.iter().any(|&b| b != 0));
    }

    #[test]
    fn empty_buffer_is_fine() {
        get_entropy(&mut []).expect("empty");
    }

    #[test]
    fn consecutive_draws_differ() {
        assert_ne!(next_u64().expect("a"), next_u64().expect("b"));
    }

    #[test]
    fn large_request_is_filled() {
        // Larger than a single getrandom/getentropy call returns.
        let mut buf = vec![0u8; 300_000];
        get_entropy(&mut buf).expect("entropy");
        assert!(buf[buf.len() - 64..].iter().any(|&b| b != 0));
    }

    #[test]
    fn byte_distribution_is_uniform() {
        // A fair source fails a single sample about one time in twenty; three
        // failures in a row would point at a real bias.
        let mut buf = vec![0u8; 1_000_000];
        let mut scores = Vec::new();
        for _ in 0..3 {
            get_entropy(&mut buf).expect("entropy");
            let score = chi_squared(&buf);
            if score <= CHI_SQUARED_CRITICAL {
                return;
            }
            scores.push(score);
        }
        panic!("chi-squared above {CHI_SQUARED_CRITICAL} in every sample: {scores:?}");
    }
}

#[cfg(all(test, oskit_backend = "fallback"))]
mod fallback_tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn entropy_is_unsupported() {
        let err = get_entropy(&mut [0u8; 4]).expect_err("no source");
        assert_eq!(err.code, ErrorCode::UnsupportedOperation);
        crate::error::clear();
    }
}
