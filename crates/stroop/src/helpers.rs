//! Small arithmetic helpers shared by the domain library and the expansion
//! rewrites: saturating operations, rounding division, and a solver for
//! two-variable linear Diophantine equations.

use crate::IntVal;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// A base solution of the equation `a * x + b * y = cte`, with the
/// coefficients reduced by their greatest common divisor.
///
/// All integer solutions of the original equation are `(x0 + b * z, y0 - a *
/// z)` for integer `z`, using the *reduced* coefficients stored here.
pub(crate) struct DiophantineSolution {
	/// The reduced first coefficient.
	pub(crate) a: IntVal,
	/// The reduced second coefficient.
	pub(crate) b: IntVal,
	/// Base solution value for the first variable.
	pub(crate) x0: IntVal,
	/// Base solution value for the second variable.
	pub(crate) y0: IntVal,
}

/// Saturating addition on [`IntVal`].
pub(crate) fn cap_add(a: IntVal, b: IntVal) -> IntVal {
	a.saturating_add(b)
}

/// Saturating multiplication on [`IntVal`].
pub(crate) fn cap_mul(a: IntVal, b: IntVal) -> IntVal {
	a.saturating_mul(b)
}

/// Saturating subtraction on [`IntVal`].
pub(crate) fn cap_sub(a: IntVal, b: IntVal) -> IntVal {
	a.saturating_sub(b)
}

/// Division rounding towards positive infinity.
pub(crate) fn div_ceil(a: IntVal, b: IntVal) -> IntVal {
	let d = a / b;
	if a % b != 0 && ((a < 0) != (b < 0)) {
		d
	} else if a % b != 0 {
		d + 1
	} else {
		d
	}
}

/// Division rounding towards negative infinity.
pub(crate) fn div_floor(a: IntVal, b: IntVal) -> IntVal {
	let d = a / b;
	if a % b != 0 && ((a < 0) != (b < 0)) {
		d - 1
	} else {
		d
	}
}

/// The greatest common divisor of two non-negative values.
pub(crate) fn gcd(mut a: IntVal, mut b: IntVal) -> IntVal {
	debug_assert!(a >= 0 && b >= 0);
	while b != 0 {
		(a, b) = (b, a % b);
	}
	a
}

/// Solve the Diophantine equation `a * x + b * y = cte` for nonzero `a` and
/// `b`.
///
/// Returns `None` when the equation has no integer solution, or when the
/// base solution cannot be represented without overflow.
pub(crate) fn solve_diophantine_pair(
	a: IntVal,
	b: IntVal,
	cte: IntVal,
) -> Option<DiophantineSolution> {
	debug_assert!(a != 0 && b != 0);
	if a == IntVal::MIN || b == IntVal::MIN {
		return None;
	}
	let g = gcd(a.abs(), b.abs());
	if cte % g != 0 {
		return None;
	}
	let (a, b, cte) = (a / g, b / g, cte / g);

	// Extended Euclid on the absolute values, fixing up the signs afterwards.
	let (mut r0, mut r1) = (a.abs(), b.abs());
	let (mut s0, mut s1) = (1 as IntVal, 0 as IntVal);
	let (mut t0, mut t1) = (0 as IntVal, 1 as IntVal);
	while r1 != 0 {
		let q = r0 / r1;
		(r0, r1) = (r1, r0 - q * r1);
		(s0, s1) = (s1, s0.checked_sub(q.checked_mul(s1)?)?);
		(t0, t1) = (t1, t0.checked_sub(q.checked_mul(t1)?)?);
	}
	debug_assert_eq!(r0, 1);
	let u = if a < 0 { -s0 } else { s0 };
	let v = if b < 0 { -t0 } else { t0 };
	let x0 = u.checked_mul(cte)?;
	let y0 = v.checked_mul(cte)?;
	debug_assert_eq!(a.checked_mul(x0)?.checked_add(b.checked_mul(y0)?)?, cte);
	Some(DiophantineSolution { a, b, x0, y0 })
}
