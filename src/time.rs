/*
 * Copyright 2026 the sfs contributors
 *
 * This file is part of sfs.
 *
 * sfs is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * sfs is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * sfs. If not, see <https://www.gnu.org/licenses/>.
 */

//! Conversion between host wall-clock time and the on-disk 48.16
//! fixed-point timestamp (units of 1/65536 second).
//!
//! The reference conversion computes this with `round()` over `double`s
//! and has a latent bug in the reverse direction (masking a single bit
//! instead of the low 16 bits when reconstructing the sub-second
//! remainder). This module is an integer-exact reimplementation of the
//! intended semantics, not a translation of that bug.

use std::time::{SystemTime, UNIX_EPOCH};

/// Numerator/denominator of the nanosecond <-> 1/65536s conversion factor:
/// `128 / 1_953_125 == 1 / 15_258.78...`, i.e. `nsec * 128 / 1_953_125`
/// yields units of 1/65536 second.
const NUM: i128 = 128;
const DEN: i128 = 1_953_125;

/// Rounds `n / d` to the nearest integer, ties away from zero. `n` is
/// always non-negative in this module's callers, so "away from zero" and
/// "half up" coincide.
fn round_div(n: i128, d: i128) -> i128 {
    (2 * n + d) / (2 * d)
}

/// Converts a host `(seconds, nanoseconds)` pair into the on-disk 48.16
/// fixed-point timestamp.
///
/// `nsec` is expected to be in `0..1_000_000_000`, matching
/// `std::time::Duration`'s convention.
pub fn to_timestamp(sec: i64, nsec: u32) -> i64 {
    let frac = round_div(nsec as i128 * NUM, DEN) as i64;
    (sec << 16) + frac
}

/// Converts an on-disk timestamp back into a `(seconds, nanoseconds)` pair.
pub fn from_timestamp(timestamp: i64) -> (i64, u32) {
    let sec = timestamp >> 16;
    let rest = (timestamp & 0xFFFF) as i128;
    let nsec = round_div(rest * DEN, NUM) as u32;
    (sec, nsec)
}

/// Returns the on-disk timestamp for the current wall-clock time.
pub fn now() -> i64 {
    let d = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch");
    to_timestamp(d.as_secs() as i64, d.subsec_nanos())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn roundtrip_zero() {
        assert_eq!(from_timestamp(to_timestamp(0, 0)), (0, 0));
    }

    #[test]
    fn roundtrip_spread() {
        for sec in [0i64, 1, 59, 1_700_000_000] {
            for nsec in [0u32, 1, 500_000_000, 999_999_999] {
                let ts = to_timestamp(sec, nsec);
                let (s2, n2) = from_timestamp(ts);
                assert_eq!(s2, sec);
                // The conversion is lossy below ~15.26us; round-trip error
                // must stay within one on-disk tick (1/65536s = 15258ns).
                let diff = (n2 as i64 - nsec as i64).abs();
                assert!(diff <= 15_259, "nsec {nsec} -> {n2} (diff {diff})");
            }
        }
    }

    #[test]
    fn monotonic_within_a_second() {
        let mut prev = to_timestamp(10, 0);
        for nsec in (0..1_000_000_000u32).step_by(1_000_000) {
            let ts = to_timestamp(10, nsec);
            assert!(ts >= prev);
            prev = ts;
        }
    }
}
