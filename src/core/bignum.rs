//! Arbitrary-Precision Unsigned Integers
//!
//! Just enough big-number arithmetic to run Diffie-Hellman over a
//! configured prime modulus.
//!
//! ```text
//! limbs: [ L0 | L1 | L2 | ... | Ln-1 ]     value = Σ Li · 2^(32·i)
//!          ^ least significant      ^ most significant, never zero
//! ```
//!
//! Every value is kept normalized: the most significant stored limb is
//! non-zero and zero is the empty limb vector. All operations return new,
//! normalized values; scratch buffers live only for the duration of a call.

use std::cmp::Ordering;
use std::fmt;

/// A single limb.
pub type Limb = u32;

const LIMB_BITS: usize = 32;
const LIMB_BASE: u64 = 1 << LIMB_BITS;
const LIMB_MASK: u64 = LIMB_BASE - 1;

/// Arithmetic misuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BigNumError {
    /// Subtracted a larger value from a smaller one.
    #[error("subtraction underflow")]
    Underflow,

    /// Division or reduction by zero.
    #[error("division by zero")]
    DivideByZero,

    /// Value does not fit the requested fixed width.
    #[error("value needs {needed} bytes, width is {width}")]
    Overflow {
        /// Bytes the value needs.
        needed: usize,
        /// Bytes available.
        width: usize,
    },
}

/// Arbitrary-precision unsigned integer.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct BigNum {
    limbs: Vec<Limb>,
}

impl BigNum {
    /// The value zero.
    pub fn zero() -> Self {
        Self { limbs: Vec::new() }
    }

    /// The value one.
    pub fn one() -> Self {
        Self { limbs: vec![1] }
    }

    /// Build from a machine integer.
    pub fn from_u64(value: u64) -> Self {
        let mut n = Self {
            limbs: vec![value as Limb, (value >> LIMB_BITS) as Limb],
        };
        n.normalize();
        n
    }

    fn from_limbs(limbs: Vec<Limb>) -> Self {
        let mut n = Self { limbs };
        n.normalize();
        n
    }

    fn normalize(&mut self) {
        while self.limbs.last() == Some(&0) {
            self.limbs.pop();
        }
    }

    /// True for zero.
    pub fn is_zero(&self) -> bool {
        self.limbs.is_empty()
    }

    /// Number of significant limbs.
    pub fn limb_count(&self) -> usize {
        self.limbs.len()
    }

    /// Number of significant bits.
    pub fn bit_len(&self) -> usize {
        match self.limbs.last() {
            Some(top) => self.limbs.len() * LIMB_BITS - top.leading_zeros() as usize,
            None => 0,
        }
    }

    /// Test bit `i` (0 is least significant).
    pub fn bit(&self, i: usize) -> bool {
        self.limbs
            .get(i / LIMB_BITS)
            .map(|limb| (limb >> (i % LIMB_BITS)) & 1 == 1)
            .unwrap_or(false)
    }

    /// Lowest 64 bits.
    pub fn low_u64(&self) -> u64 {
        let lo = self.limbs.first().copied().unwrap_or(0) as u64;
        let hi = self.limbs.get(1).copied().unwrap_or(0) as u64;
        lo | (hi << LIMB_BITS)
    }

    // ========================================================================
    // Byte conversion
    // ========================================================================

    /// Parse a big-endian byte buffer. Leading zero bytes are ignored.
    pub fn from_be_bytes(bytes: &[u8]) -> Self {
        let limbs = bytes
            .rchunks(4)
            .map(|chunk| chunk.iter().fold(0 as Limb, |acc, &b| (acc << 8) | b as Limb))
            .collect();
        Self::from_limbs(limbs)
    }

    /// Parse a little-endian byte buffer.
    pub fn from_le_bytes(bytes: &[u8]) -> Self {
        let mut be = bytes.to_vec();
        be.reverse();
        Self::from_be_bytes(&be)
    }

    /// Minimal big-endian encoding. Zero encodes as an empty buffer.
    pub fn to_be_bytes(&self) -> Vec<u8> {
        self.limbs
            .iter()
            .rev()
            .flat_map(|limb| limb.to_be_bytes())
            .skip_while(|&b| b == 0)
            .collect()
    }

    /// Minimal little-endian encoding.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = self.to_be_bytes();
        out.reverse();
        out
    }

    /// Big-endian encoding zero-padded to exactly `width` bytes.
    pub fn to_be_bytes_padded(&self, width: usize) -> Result<Vec<u8>, BigNumError> {
        let minimal = self.to_be_bytes();
        if minimal.len() > width {
            return Err(BigNumError::Overflow {
                needed: minimal.len(),
                width,
            });
        }
        let mut out = vec![0u8; width - minimal.len()];
        out.extend_from_slice(&minimal);
        Ok(out)
    }

    /// Parse a hex string (big-endian, optional `0x` prefix, whitespace ignored).
    pub fn from_hex(text: &str) -> Result<Self, hex::FromHexError> {
        let mut digits: String = text
            .trim_start_matches("0x")
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if digits.len() % 2 == 1 {
            digits.insert(0, '0');
        }
        Ok(Self::from_be_bytes(&hex::decode(digits)?))
    }

    /// Lowercase hex, no prefix. Zero renders as `0`.
    pub fn to_hex(&self) -> String {
        if self.is_zero() {
            return "0".to_string();
        }
        hex::encode(self.to_be_bytes())
    }

    // ========================================================================
    // Arithmetic
    // ========================================================================

    /// `self + other`.
    pub fn add(&self, other: &BigNum) -> BigNum {
        let (long, short) = if self.limbs.len() >= other.limbs.len() {
            (&self.limbs, &other.limbs)
        } else {
            (&other.limbs, &self.limbs)
        };

        let mut out = Vec::with_capacity(long.len() + 1);
        let mut carry = 0u64;
        for (i, &a) in long.iter().enumerate() {
            let sum = a as u64 + short.get(i).copied().unwrap_or(0) as u64 + carry;
            out.push(sum as Limb);
            carry = sum >> LIMB_BITS;
        }
        if carry != 0 {
            out.push(carry as Limb);
        }
        BigNum::from_limbs(out)
    }

    /// `self - other`, failing when `other > self`.
    pub fn sub(&self, other: &BigNum) -> Result<BigNum, BigNumError> {
        if *self < *other {
            return Err(BigNumError::Underflow);
        }

        let mut out = Vec::with_capacity(self.limbs.len());
        let mut borrow = 0i64;
        for (i, &a) in self.limbs.iter().enumerate() {
            let mut diff = a as i64 - other.limbs.get(i).copied().unwrap_or(0) as i64 - borrow;
            borrow = 0;
            if diff < 0 {
                diff += LIMB_BASE as i64;
                borrow = 1;
            }
            out.push(diff as Limb);
        }
        Ok(BigNum::from_limbs(out))
    }

    /// `self * other` (schoolbook).
    pub fn mul(&self, other: &BigNum) -> BigNum {
        if self.is_zero() || other.is_zero() {
            return BigNum::zero();
        }

        let mut out = vec![0 as Limb; self.limbs.len() + other.limbs.len()];
        for (i, &a) in self.limbs.iter().enumerate() {
            let mut carry = 0u64;
            for (j, &b) in other.limbs.iter().enumerate() {
                let t = a as u64 * b as u64 + out[i + j] as u64 + carry;
                out[i + j] = t as Limb;
                carry = t >> LIMB_BITS;
            }
            out[i + other.limbs.len()] = carry as Limb;
        }
        BigNum::from_limbs(out)
    }

    /// Quotient and remainder of `self / divisor`.
    pub fn div_rem(&self, divisor: &BigNum) -> Result<(BigNum, BigNum), BigNumError> {
        if divisor.is_zero() {
            return Err(BigNumError::DivideByZero);
        }
        if *self < *divisor {
            return Ok((BigNum::zero(), self.clone()));
        }
        if divisor.limbs.len() == 1 {
            let (q, r) = self.div_rem_limb(divisor.limbs[0]);
            return Ok((q, BigNum::from_u64(r as u64)));
        }
        Ok(self.div_rem_knuth(divisor))
    }

    /// `self mod modulus`.
    pub fn rem(&self, modulus: &BigNum) -> Result<BigNum, BigNumError> {
        self.div_rem(modulus).map(|(_, r)| r)
    }

    fn div_rem_limb(&self, divisor: Limb) -> (BigNum, Limb) {
        let mut quotient = vec![0 as Limb; self.limbs.len()];
        let mut rem = 0u64;
        for i in (0..self.limbs.len()).rev() {
            let cur = (rem << LIMB_BITS) | self.limbs[i] as u64;
            quotient[i] = (cur / divisor as u64) as Limb;
            rem = cur % divisor as u64;
        }
        (BigNum::from_limbs(quotient), rem as Limb)
    }

    /// Knuth, TAOCP vol. 2, 4.3.1 Algorithm D. Divisor has at least two limbs.
    fn div_rem_knuth(&self, divisor: &BigNum) -> (BigNum, BigNum) {
        let n = divisor.limbs.len();
        let shift = divisor.limbs[n - 1].leading_zeros();

        let vn = shl_limbs(&divisor.limbs, shift);
        let mut un = shl_limbs(&self.limbs, shift);
        // The shifted dividend always carries one extra limb.
        if un.len() == self.limbs.len() {
            un.push(0);
        }

        let m = self.limbs.len() - n;
        let mut q = vec![0 as Limb; m + 1];

        for j in (0..=m).rev() {
            let num = ((un[j + n] as u64) << LIMB_BITS) | un[j + n - 1] as u64;
            let mut qhat = num / vn[n - 1] as u64;
            let mut rhat = num % vn[n - 1] as u64;

            while qhat >= LIMB_BASE
                || qhat * vn[n - 2] as u64 > ((rhat << LIMB_BITS) | un[j + n - 2] as u64)
            {
                qhat -= 1;
                rhat += vn[n - 1] as u64;
                if rhat >= LIMB_BASE {
                    break;
                }
            }

            // Multiply and subtract.
            let mut k = 0i64;
            for i in 0..n {
                let p = qhat * vn[i] as u64;
                let t = un[i + j] as i64 - k - (p & LIMB_MASK) as i64;
                un[i + j] = t as Limb;
                k = (p >> LIMB_BITS) as i64 - (t >> LIMB_BITS);
            }
            let t = un[j + n] as i64 - k;
            un[j + n] = t as Limb;

            if t < 0 {
                // Estimate was one too large; add the divisor back.
                qhat -= 1;
                let mut carry = 0u64;
                for i in 0..n {
                    let sum = un[i + j] as u64 + vn[i] as u64 + carry;
                    un[i + j] = sum as Limb;
                    carry = sum >> LIMB_BITS;
                }
                un[j + n] = un[j + n].wrapping_add(carry as Limb);
            }
            q[j] = qhat as Limb;
        }

        un.truncate(n);
        let remainder = shr_limbs(&un, shift);
        (BigNum::from_limbs(q), BigNum::from_limbs(remainder))
    }

    /// `self^exponent mod modulus`.
    ///
    /// Left-to-right square-and-multiply: every exponent bit costs one
    /// squaring and reduction, set bits add a multiply and reduction.
    pub fn modpow(&self, exponent: &BigNum, modulus: &BigNum) -> Result<BigNum, BigNumError> {
        if modulus.is_zero() {
            return Err(BigNumError::DivideByZero);
        }

        let base = self.rem(modulus)?;
        let mut result = BigNum::one().rem(modulus)?;

        for i in (0..exponent.bit_len()).rev() {
            result = result.mul(&result).rem(modulus)?;
            if exponent.bit(i) {
                result = result.mul(&base).rem(modulus)?;
            }
        }
        Ok(result)
    }
}

fn shl_limbs(limbs: &[Limb], shift: u32) -> Vec<Limb> {
    if shift == 0 {
        return limbs.to_vec();
    }
    let mut out = Vec::with_capacity(limbs.len() + 1);
    let mut carry = 0 as Limb;
    for &limb in limbs {
        out.push((limb << shift) | carry);
        carry = limb >> (LIMB_BITS as u32 - shift);
    }
    out.push(carry);
    out
}

fn shr_limbs(limbs: &[Limb], shift: u32) -> Vec<Limb> {
    if shift == 0 {
        return limbs.to_vec();
    }
    let mut out = vec![0 as Limb; limbs.len()];
    for i in 0..limbs.len() {
        let high = limbs.get(i + 1).copied().unwrap_or(0);
        out[i] = (limbs[i] >> shift) | (high << (LIMB_BITS as u32 - shift));
    }
    out
}

impl Ord for BigNum {
    fn cmp(&self, other: &Self) -> Ordering {
        self.limbs
            .len()
            .cmp(&other.limbs.len())
            .then_with(|| self.limbs.iter().rev().cmp(other.limbs.iter().rev()))
    }
}

impl PartialOrd for BigNum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<u64> for BigNum {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl fmt::Debug for BigNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BigNum(0x{})", self.to_hex())
    }
}

impl fmt::Display for BigNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn big(v: u128) -> BigNum {
        BigNum::from_be_bytes(&v.to_be_bytes())
    }

    fn to_u128(n: &BigNum) -> u128 {
        let bytes = n.to_be_bytes_padded(16).unwrap();
        u128::from_be_bytes(bytes.try_into().unwrap())
    }

    #[test]
    fn test_zero_is_empty() {
        assert!(BigNum::zero().is_zero());
        assert_eq!(BigNum::zero().limb_count(), 0);
        assert_eq!(BigNum::from_u64(0), BigNum::zero());
        assert_eq!(BigNum::from_be_bytes(&[0, 0, 0, 0, 0]), BigNum::zero());
        assert!(BigNum::zero().to_be_bytes().is_empty());
    }

    #[test]
    fn test_normalized_after_sub() {
        let a = big(1 << 64);
        let b = big((1 << 64) - 1);
        let d = a.sub(&b).unwrap();
        assert_eq!(d, BigNum::one());
        assert_eq!(d.limb_count(), 1);
    }

    #[test]
    fn test_sub_underflow() {
        assert_eq!(
            BigNum::from_u64(3).sub(&BigNum::from_u64(4)),
            Err(BigNumError::Underflow)
        );
    }

    #[test]
    fn test_divide_by_zero() {
        let a = BigNum::from_u64(10);
        assert_eq!(a.div_rem(&BigNum::zero()), Err(BigNumError::DivideByZero));
        assert_eq!(
            a.modpow(&BigNum::one(), &BigNum::zero()),
            Err(BigNumError::DivideByZero)
        );
    }

    #[test]
    fn test_padded_overflow() {
        let a = big(0x1_0000);
        assert_eq!(
            a.to_be_bytes_padded(2),
            Err(BigNumError::Overflow { needed: 3, width: 2 })
        );
        assert_eq!(a.to_be_bytes_padded(4).unwrap(), vec![0, 1, 0, 0]);
    }

    #[test]
    fn test_hex_round_trip() {
        let n = BigNum::from_hex("0x1 23456789 abcdef").unwrap();
        assert_eq!(n.to_hex(), "0123456789abcdef");
        assert_eq!(BigNum::from_hex("0").unwrap(), BigNum::zero());
    }

    #[test]
    fn test_modpow_zero_exponent() {
        let m = BigNum::from_u64(7);
        assert_eq!(
            BigNum::from_u64(5).modpow(&BigNum::zero(), &m).unwrap(),
            BigNum::one()
        );
        // 1 mod 1 is 0
        assert_eq!(
            BigNum::from_u64(5).modpow(&BigNum::zero(), &BigNum::one()).unwrap(),
            BigNum::zero()
        );
    }

    #[test]
    fn test_multi_limb_division() {
        let n = BigNum::from_hex("800000000000000000000003").unwrap();
        let d = BigNum::from_hex("200000000000000000000001").unwrap();
        let (q, r) = n.div_rem(&d).unwrap();
        assert_eq!(q.mul(&d).add(&r), n);
        assert!(r < d);
    }

    #[test]
    fn test_le_bytes() {
        let n = BigNum::from_u64(0x0102_0304);
        assert_eq!(n.to_le_bytes(), vec![4, 3, 2, 1]);
        assert_eq!(BigNum::from_le_bytes(&[4, 3, 2, 1]), n);
    }

    proptest! {
        #[test]
        fn prop_bytes_round_trip(bytes in prop::collection::vec(any::<u8>(), 64)) {
            let n = BigNum::from_be_bytes(&bytes);
            prop_assert_eq!(n.to_be_bytes_padded(64).unwrap(), bytes);
        }

        #[test]
        fn prop_add_sub_inverse(
            a in prop::collection::vec(any::<u8>(), 0..48),
            b in prop::collection::vec(any::<u8>(), 0..48),
        ) {
            let a = BigNum::from_be_bytes(&a);
            let b = BigNum::from_be_bytes(&b);
            let sum = a.add(&b);
            prop_assert_eq!(sum.sub(&b).unwrap(), a.clone());
            prop_assert_eq!(sum.sub(&a).unwrap(), b);
        }

        #[test]
        fn prop_small_arithmetic_matches_u128(a in any::<u64>(), b in any::<u64>()) {
            let x = BigNum::from_u64(a);
            let y = BigNum::from_u64(b);
            prop_assert_eq!(to_u128(&x.mul(&y)), a as u128 * b as u128);
            prop_assert_eq!(to_u128(&x.add(&y)), a as u128 + b as u128);
            prop_assert_eq!(x.cmp(&y), a.cmp(&b));
        }

        #[test]
        fn prop_div_rem_identity(
            n in prop::collection::vec(any::<u8>(), 1..80),
            d in prop::collection::vec(any::<u8>(), 1..40),
        ) {
            let n = BigNum::from_be_bytes(&n);
            let d = BigNum::from_be_bytes(&d);
            prop_assume!(!d.is_zero());
            let (q, r) = n.div_rem(&d).unwrap();
            prop_assert!(r < d);
            prop_assert_eq!(q.mul(&d).add(&r), n);
        }

        #[test]
        fn prop_modpow_matches_repeated_multiplication(
            base in any::<u32>(),
            exp in 0u32..64,
            modulus in 1u64..u64::MAX,
        ) {
            let m = modulus as u128;
            let mut expected = 1u128 % m;
            for _ in 0..exp {
                expected = expected * (base as u128 % m) % m;
            }
            let got = BigNum::from_u64(base as u64)
                .modpow(&BigNum::from_u64(exp as u64), &BigNum::from_u64(modulus))
                .unwrap();
            prop_assert_eq!(to_u128(&got), expected);
        }
    }
}
