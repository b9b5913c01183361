//! PLL divider lookup and synthesis.
//!
//! A PLL output is `fout = (m + k / 65536) * fin / (p << s)`. Rates are
//! resolved against a per-PLL divider table first; rates the table does not
//! cover get dividers synthesized from the reference clock.

use exynos_ect::PllFrequency;

/// Accepted pre-divider range.
pub const P_RANGE: core::ops::RangeInclusive<u32> = 1..=63;
/// Accepted main-divider range.
pub const M_RANGE: core::ops::RangeInclusive<u32> = 64..=1023;
/// Accepted post-scaler range.
pub const S_RANGE: core::ops::RangeInclusive<u32> = 0..=5;

/// Computes the output frequency in Hz of a divider set.
#[must_use]
pub fn fout_hz(fin_hz: u32, p: u32, m: u32, s: u32, k: u32) -> u64 {
    if p == 0 || s >= 32 {
        return 0;
    }
    // K is a signed 16-bit fraction of M.
    let k = i64::from(k as u16 as i16);
    let num = (i64::from(m) * 65536 + k) * i64::from(fin_hz);
    let den = (i64::from(p) << s) * 65536;
    u64::try_from(num / den).unwrap_or(0)
}

/// Packs P/M/S into the FVMAP PMS word, `P << 24 | M << 12 | S << 8`.
#[must_use]
pub const fn pms_word(f: &PllFrequency) -> u32 {
    (f.p << 24) | ((f.m & 0xfff) << 12) | ((f.s & 0xf) << 8)
}

/// Finds the table entry for `rate_khz`.
///
/// Entries match on kHz first. When `rate_hz` is given, entries whose
/// frequency agrees with it to 10 Hz, then to 100 Hz, match as well.
#[must_use]
pub fn lookup(table: &[PllFrequency], rate_khz: u32, rate_hz: Option<u32>) -> Option<PllFrequency> {
    if let Some(f) = table.iter().find(|f| f.frequency / 1000 == rate_khz) {
        return Some(*f);
    }
    let hz = rate_hz?;
    [10, 100]
        .into_iter()
        .find_map(|scale| table.iter().find(|f| f.frequency / scale == hz / scale))
        .copied()
}

/// Synthesizes integer dividers whose output is closest to `rate_hz`.
///
/// Returns `None` for a zero rate or when no divider set lies in range.
#[must_use]
pub fn synthesize(fin_hz: u32, rate_hz: u32) -> Option<PllFrequency> {
    if rate_hz == 0 || fin_hz == 0 {
        return None;
    }
    let mut best: Option<(u64, PllFrequency)> = None;
    for s in S_RANGE {
        for p in P_RANGE {
            let div = u64::from(p) << s;
            let ideal = (u64::from(rate_hz) * div + u64::from(fin_hz) / 2) / u64::from(fin_hz);
            let Ok(m) = u32::try_from(ideal) else {
                continue;
            };
            if !M_RANGE.contains(&m) {
                continue;
            }
            let fout = fout_hz(fin_hz, p, m, s, 0);
            let diff = fout.abs_diff(u64::from(rate_hz));
            if best.is_none_or(|(d, _)| diff < d) {
                let frequency = u32::try_from(fout).unwrap_or(u32::MAX);
                best = Some((diff, PllFrequency::new(frequency, p, m, s, 0)));
                if diff == 0 {
                    return best.map(|(_, f)| f);
                }
            }
        }
    }
    best.map(|(_, f)| f)
}

/// Resolves `rate_khz` to dividers: table first, synthesis second.
#[must_use]
pub fn resolve(table: &[PllFrequency], fin_hz: u32, rate_khz: u32) -> Option<PllFrequency> {
    let rate_hz = rate_khz.checked_mul(1000);
    lookup(table, rate_khz, rate_hz).or_else(|| synthesize(fin_hz, rate_hz?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FIN_HZ, G3D_PLL_TABLE};

    #[test]
    fn fout_integer_and_fractional() {
        assert_eq!(fout_hz(FIN_HZ, 4, 140, 0, 0), 910_000_000);
        assert_eq!(fout_hz(FIN_HZ, 4, 123, 3, 0), 99_937_500);
        // K is signed: 0x8000 takes half an M step off.
        assert_eq!(fout_hz(FIN_HZ, 1, 100, 0, 0x8000), 2_587_000_000);
        assert_eq!(fout_hz(FIN_HZ, 1, 100, 0, 0x4000), 2_606_500_000);
        assert_eq!(fout_hz(FIN_HZ, 0, 100, 0, 0), 0);
    }

    #[test]
    fn pms_packing() {
        let f = PllFrequency::new(910_000_000, 4, 140, 0, 0);
        assert_eq!(pms_word(&f), 0x0408_C000);
        let f = PllFrequency::new(99_937_000, 4, 123, 3, 0);
        assert_eq!(pms_word(&f), (4 << 24) | (123 << 12) | (3 << 8));
    }

    #[test]
    fn lookup_by_khz_then_hz() {
        assert_eq!(lookup(&G3D_PLL_TABLE, 910_000, None).map(|f| f.m), Some(140));
        // 432250000 Hz lists as 432250 kHz, not 433000.
        assert_eq!(lookup(&G3D_PLL_TABLE, 433_000, None), None);
        assert_eq!(lookup(&G3D_PLL_TABLE, 432_250, None).map(|f| f.m), Some(133));
        // No kHz match, but 99937000 and 99937050 agree to 100 Hz.
        assert_eq!(
            lookup(&G3D_PLL_TABLE, 99_938, Some(99_937_050)).map(|f| f.frequency),
            Some(99_937_000)
        );
        assert_eq!(lookup(&G3D_PLL_TABLE, 1, Some(1_000)), None);
    }

    #[test]
    fn synthesis_hits_exact_rates() {
        let f = synthesize(FIN_HZ, 520_000_000).unwrap();
        assert_eq!(fout_hz(FIN_HZ, f.p, f.m, f.s, f.k), 520_000_000);
        assert!(P_RANGE.contains(&f.p) && M_RANGE.contains(&f.m) && S_RANGE.contains(&f.s));
        assert!(synthesize(FIN_HZ, 0).is_none());
        // Far above what M and S allow.
        assert!(synthesize(FIN_HZ, u32::MAX).is_some_and(|f| f.m <= 1023));
    }

    #[test]
    fn resolve_prefers_table() {
        assert_eq!(resolve(&G3D_PLL_TABLE, FIN_HZ, 650_000).map(|f| f.m), Some(100));
        let f = resolve(&[], FIN_HZ, 650_000).unwrap();
        assert_eq!(fout_hz(FIN_HZ, f.p, f.m, f.s, 0), 650_000_000);
    }
}
