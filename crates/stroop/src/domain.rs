//! Sets of integer values represented as sorted lists of non-overlapping
//! closed intervals, and the saturating set arithmetic that the expansion
//! rewrites rely on.

use std::{iter::empty, ops::RangeInclusive};

use rangelist::{IntervalIterator, RangeList};

use crate::{
	helpers::{cap_add, cap_mul, cap_sub, div_ceil, div_floor},
	IntVal,
};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// A set of integer values, stored as a sorted union of non-overlapping
/// closed intervals over the signed 64-bit range.
///
/// Arithmetic on bounds saturates at the representation limits, mirroring
/// the behavior of the saturating arithmetic used for linear constraint
/// bounds.
pub struct Domain(RangeList<IntVal>);

impl Domain {
	/// Create the set containing the values of both `self` and `other`.
	pub fn union_with(&self, other: &Domain) -> Domain {
		let pairs = self
			.iter()
			.chain(other.iter())
			.map(|r| (*r.start(), *r.end()))
			.collect();
		Domain::from_interval_pairs(pairs)
	}

	/// Create the exact set of sums `a + b` with `a` in `self` and `b` in
	/// `other`.
	pub fn addition_with(&self, other: &Domain) -> Domain {
		let mut pairs = Vec::new();
		for a in self.iter() {
			for b in other.iter() {
				pairs.push((cap_add(*a.start(), *b.start()), cap_add(*a.end(), *b.end())));
			}
		}
		Domain::from_interval_pairs(pairs)
	}

	/// Create the set of all values not contained in `self`.
	pub fn complement(&self) -> Domain {
		let mut pairs = Vec::new();
		let mut next = IntVal::MIN;
		for r in self.iter() {
			if *r.start() > next {
				pairs.push((next, *r.start() - 1));
			}
			if *r.end() == IntVal::MAX {
				return Domain::from_interval_pairs(pairs);
			}
			next = *r.end() + 1;
		}
		pairs.push((next, IntVal::MAX));
		Domain::from_interval_pairs(pairs)
	}

	/// Create the set containing the single value `value`.
	pub fn constant(value: IntVal) -> Domain {
		Domain(RangeList::from(value..=value))
	}

	/// Whether `value` is contained in the set.
	pub fn contains(&self, value: IntVal) -> bool {
		self.0.contains(&value)
	}

	/// Create an interval superset of the products `a * b` with `a` in `self`
	/// and `b` in `other`, without tracking holes within interval products.
	pub fn continuous_multiplication_by(&self, other: &Domain) -> Domain {
		let mut pairs = Vec::new();
		for a in self.iter() {
			for b in other.iter() {
				let corners = [
					cap_mul(*a.start(), *b.start()),
					cap_mul(*a.start(), *b.end()),
					cap_mul(*a.end(), *b.start()),
					cap_mul(*a.end(), *b.end()),
				];
				let lo = corners.iter().copied().min().unwrap();
				let hi = corners.iter().copied().max().unwrap();
				pairs.push((lo, hi));
			}
		}
		Domain::from_interval_pairs(pairs)
	}

	/// Create the set containing the values of `self` that are not contained
	/// in `other`.
	pub fn difference(&self, other: &Domain) -> Domain {
		Domain(self.0.diff(&other.0))
	}

	/// Create the empty set.
	pub fn empty() -> Domain {
		Domain(RangeList::from_iter(empty::<RangeInclusive<IntVal>>()))
	}

	/// Normalize a list of (possibly overlapping, possibly unsorted) interval
	/// pairs into a [`Domain`].
	fn from_interval_pairs(mut pairs: Vec<(IntVal, IntVal)>) -> Domain {
		pairs.retain(|(lo, hi)| lo <= hi);
		pairs.sort_unstable();
		let mut merged: Vec<(IntVal, IntVal)> = Vec::with_capacity(pairs.len());
		for (lo, hi) in pairs {
			if let Some(last) = merged.last_mut() {
				if lo <= cap_add(last.1, 1) {
					last.1 = last.1.max(hi);
					continue;
				}
			}
			merged.push((lo, hi));
		}
		Domain(RangeList::from_iter(merged.into_iter().map(|(l, u)| l..=u)))
	}

	/// Create the set containing exactly the given values.
	pub fn from_values(values: &[IntVal]) -> Domain {
		Domain::from_interval_pairs(values.iter().map(|&v| (v, v)).collect())
	}

	/// Create the full set of representable values.
	pub fn full() -> Domain {
		Domain::range(IntVal::MIN, IntVal::MAX)
	}

	/// Create the exact set of values `x` such that `coeff * x` is contained
	/// in `self`.
	pub fn inverse_multiplication_by(&self, coeff: IntVal) -> Domain {
		if coeff == 0 {
			return if self.contains(0) {
				Domain::full()
			} else {
				Domain::empty()
			};
		}
		let mut pairs = Vec::new();
		for r in self.iter() {
			let (lo, hi) = if coeff > 0 {
				(div_ceil(*r.start(), coeff), div_floor(*r.end(), coeff))
			} else {
				(div_ceil(*r.end(), coeff), div_floor(*r.start(), coeff))
			};
			pairs.push((lo, hi));
		}
		Domain::from_interval_pairs(pairs)
	}

	/// Create the set containing the values of both `self` and `other`.
	pub fn intersection(&self, other: &Domain) -> Domain {
		Domain(self.0.intersect(&other.0))
	}

	/// Whether the set contains no values.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Whether the set contains exactly one value.
	pub fn is_fixed(&self) -> bool {
		self.size() == 1
	}

	/// Iterate over the intervals of the set.
	pub fn iter(&self) -> impl Iterator<Item = RangeInclusive<IntVal>> + '_ {
		self.0.iter()
	}

	/// The largest negative value in the set, if any.
	pub(crate) fn largest_negative(&self) -> Option<IntVal> {
		let mut result = None;
		for r in self.iter() {
			if *r.start() < 0 {
				result = Some((*r.end()).min(-1));
			} else {
				break;
			}
		}
		result
	}

	/// The largest value in the set.
	///
	/// The set must not be empty.
	pub fn max(&self) -> IntVal {
		*self.0.upper_bound().unwrap()
	}

	/// The smallest value in the set.
	///
	/// The set must not be empty.
	pub fn min(&self) -> IntVal {
		*self.0.lower_bound().unwrap()
	}

	/// Create an interval superset of the products `coeff * a` with `a` in
	/// `self`, without tracking the holes introduced by scaling.
	pub fn multiplication_by(&self, coeff: IntVal) -> Domain {
		if coeff == 0 {
			return if self.is_empty() {
				Domain::empty()
			} else {
				Domain::constant(0)
			};
		}
		let pairs = self
			.iter()
			.map(|r| {
				if coeff > 0 {
					(cap_mul(*r.start(), coeff), cap_mul(*r.end(), coeff))
				} else {
					(cap_mul(*r.end(), coeff), cap_mul(*r.start(), coeff))
				}
			})
			.collect();
		Domain::from_interval_pairs(pairs)
	}

	/// Create the set of negated values of `self`.
	pub fn negation(&self) -> Domain {
		let pairs = self
			.iter()
			.map(|r| (r.end().saturating_neg(), r.start().saturating_neg()))
			.collect();
		Domain::from_interval_pairs(pairs)
	}

	/// The number of intervals making up the set.
	pub fn num_intervals(&self) -> usize {
		self.0.iter().count()
	}

	/// Create an interval superset of the quotients `a / d` (truncated
	/// division) with `a` in `self` and nonzero `d` in `divisor`.
	pub fn positive_division_by_superset(&self, divisor: &Domain) -> Domain {
		if self.is_empty() {
			return Domain::empty();
		}
		let mut divisors = Vec::new();
		if !divisor.is_empty() {
			if divisor.min() != 0 {
				divisors.push(divisor.min());
			}
			if divisor.max() != 0 {
				divisors.push(divisor.max());
			}
		}
		divisors.extend(divisor.smallest_positive());
		divisors.extend(divisor.largest_negative());
		if divisors.is_empty() {
			return Domain::empty();
		}
		let mut lo = IntVal::MAX;
		let mut hi = IntVal::MIN;
		for &num in &[self.min(), self.max()] {
			for &d in &divisors {
				let q = num / d;
				lo = lo.min(q);
				hi = hi.max(q);
			}
		}
		Domain::range(lo, hi)
	}

	/// Create an interval superset of the values `a mod m` (result taking the
	/// sign of `a`) with `a` in `self` and `m` in `modulo`.
	pub fn positive_modulo_by_superset(&self, modulo: &Domain) -> Domain {
		if self.is_empty() || modulo.is_empty() {
			return Domain::empty();
		}
		let bound = cap_sub(modulo.min().saturating_abs().max(modulo.max().saturating_abs()), 1);
		if bound < 0 {
			return Domain::empty();
		}
		let lo = if self.min() < 0 {
			self.min().max(-bound)
		} else {
			0
		};
		let hi = if self.max() > 0 {
			self.max().min(bound)
		} else {
			0
		};
		Domain::range(lo, hi)
	}

	/// Create the set of values between `lb` and `ub`, inclusive. The result
	/// is empty when `lb > ub`.
	pub fn range(lb: IntVal, ub: IntVal) -> Domain {
		if lb > ub {
			Domain::empty()
		} else {
			Domain(RangeList::from(lb..=ub))
		}
	}

	/// The number of values in the set, saturating at [`IntVal::MAX`].
	pub fn size(&self) -> IntVal {
		let mut total: u128 = 0;
		for r in self.iter() {
			total += (*r.end() as i128 - *r.start() as i128 + 1) as u128;
		}
		total.min(IntVal::MAX as u128) as IntVal
	}

	/// The smallest positive value in the set, if any.
	pub(crate) fn smallest_positive(&self) -> Option<IntVal> {
		for r in self.iter() {
			if *r.end() >= 1 {
				return Some((*r.start()).max(1));
			}
		}
		None
	}

	/// The single value of the set, if it is fixed.
	pub fn value(&self) -> Option<IntVal> {
		if self.is_fixed() {
			Some(self.min())
		} else {
			None
		}
	}

	/// Iterate over the values of the set in ascending order.
	///
	/// This should only be used when the size of the set is known to be
	/// small.
	pub fn values(&self) -> impl Iterator<Item = IntVal> + '_ {
		self.0.iter().flatten()
	}
}

impl From<RangeInclusive<IntVal>> for Domain {
	fn from(value: RangeInclusive<IntVal>) -> Self {
		Domain::range(*value.start(), *value.end())
	}
}

#[cfg(test)]
mod tests {
	use itertools::Itertools;

	use crate::{domain::Domain, IntVal};

	#[test]
	fn test_basic_queries() {
		let d = Domain::from_values(&[1, 2, 3, 7, 9]);
		assert_eq!(d.size(), 5);
		assert_eq!(d.min(), 1);
		assert_eq!(d.max(), 9);
		assert_eq!(d.num_intervals(), 3);
		assert!(d.contains(7));
		assert!(!d.contains(8));
		assert_eq!(d.values().collect_vec(), vec![1, 2, 3, 7, 9]);
		assert!(Domain::empty().is_empty());
		assert_eq!(Domain::constant(4).value(), Some(4));
		assert_eq!(d.value(), None);
		assert!(Domain::range(3, 2).is_empty());
	}

	#[test]
	fn test_set_operations() {
		let a = Domain::from_values(&[1, 2, 3, 7]);
		let b = Domain::from_values(&[2, 3, 4, 8]);
		assert_eq!(a.intersection(&b), Domain::from_values(&[2, 3]));
		assert_eq!(a.union_with(&b), Domain::from_values(&[1, 2, 3, 4, 7, 8]));
		assert_eq!(a.difference(&b), Domain::from_values(&[1, 7]));

		let c = Domain::range(0, 5).complement();
		assert!(!c.contains(0));
		assert!(!c.contains(5));
		assert!(c.contains(-1));
		assert!(c.contains(6));
		assert_eq!(c.complement(), Domain::range(0, 5));
	}

	#[test]
	fn test_negation_and_addition() {
		let a = Domain::from_values(&[1, 2, 5]);
		assert_eq!(a.negation(), Domain::from_values(&[-5, -2, -1]));
		let b = Domain::from_values(&[0, 10]);
		assert_eq!(
			a.addition_with(&b),
			Domain::from_values(&[1, 2, 5, 11, 12, 15])
		);
		assert_eq!(
			a.addition_with(&Domain::constant(-1)),
			Domain::from_values(&[0, 1, 4])
		);
	}

	#[test]
	fn test_multiplication() {
		let a = Domain::range(1, 3);
		assert_eq!(a.multiplication_by(3), Domain::range(3, 9));
		assert_eq!(a.multiplication_by(-2), Domain::range(-6, -2));
		assert_eq!(a.multiplication_by(0), Domain::constant(0));

		let b = Domain::range(-2, 3);
		assert_eq!(
			a.continuous_multiplication_by(&b),
			Domain::range(-6, 9)
		);
	}

	#[test]
	fn test_inverse_multiplication() {
		// 3 * x in [3, 10] <=> x in [1, 3]
		assert_eq!(
			Domain::range(3, 10).inverse_multiplication_by(3),
			Domain::range(1, 3)
		);
		// -2 * x in [-7, 5] <=> x in [-2, 3]
		assert_eq!(
			Domain::range(-7, 5).inverse_multiplication_by(-2),
			Domain::range(-2, 3)
		);
		// 5 * x in [-14, -12] has no solution
		assert!(Domain::range(-14, -12)
			.inverse_multiplication_by(5)
			.is_empty());
	}

	#[test]
	fn test_division_envelope() {
		let num = Domain::range(-10, 21);
		let div = Domain::from_values(&[2, 3, 7]);
		let env = num.positive_division_by_superset(&div);
		for n in num.values() {
			for d in div.values() {
				assert!(env.contains(n / d), "{} / {} outside envelope", n, d);
			}
		}
		// Negative divisors flip the sign of the quotient.
		let div = Domain::from_values(&[-3, -2]);
		let env = num.positive_division_by_superset(&div);
		assert!(env.contains(-10));
		assert!(env.contains(5));
	}

	#[test]
	fn test_modulo_envelope() {
		let expr = Domain::range(-4, 17);
		let m = Domain::from_values(&[3, 5]);
		let env = expr.positive_modulo_by_superset(&m);
		for x in expr.values() {
			for m in m.values() {
				assert!(env.contains(x % m), "{} % {} outside envelope", x, m);
			}
		}
		assert_eq!(env, Domain::range(-4, 4));

		// A non-negative expression cannot have a negative remainder.
		let env = Domain::range(0, 100).positive_modulo_by_superset(&Domain::constant(10));
		assert_eq!(env, Domain::range(0, 9));
	}

	#[test]
	fn test_interval_normalization() {
		let d = Domain::from_values(&[3, 1, 2, 3, 9]);
		assert_eq!(d, Domain::range(1, 3).union_with(&Domain::constant(9)));
		assert_eq!(d.num_intervals(), 2);
		assert_eq!(d.size(), 4);
		assert_eq!(
			Domain::full().size(),
			IntVal::MAX,
			"full domain size saturates"
		);
	}
}
