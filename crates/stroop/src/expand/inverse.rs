//! Expansion of the inverse constraint by sharing value-encoding literals
//! between the two permutation arrays.

use std::collections::BTreeSet;

use itertools::Itertools;
use tracing::debug;

use crate::{
	context::PresolveContext,
	domain::Domain,
	model::{Constraint, ConstraintRecord},
	IntVal, VarRef,
};

/// Remove from the domain of every variable in `direct` the values `j` for
/// which `inverse[j]` cannot take the matching position. Returns `false`
/// when a domain becomes empty.
fn filter_inverse_domain(
	ctx: &mut PresolveContext,
	direct: &[VarRef],
	inverse: &[VarRef],
) -> bool {
	for (i, &var) in direct.iter().enumerate() {
		let mut possible_values = Vec::new();
		let mut removed_value = false;
		for j in ctx.domain_of(var).values() {
			if ctx.ref_contains(inverse[j as usize], i as IntVal) {
				possible_values.push(j);
			} else {
				removed_value = true;
			}
		}
		if removed_value
			&& !ctx.intersect_domain_with(var, &Domain::from_values(&possible_values))
		{
			debug!("empty domain for a variable in inverse expansion");
			return false;
		}
	}
	true
}

/// Rewrite `inverse(f, g)`, which states `f[i] = j <=> g[j] = i`, by
/// filtering both domain directions and then binding the value encodings of
/// the two arrays to each other.
pub(crate) fn expand_inverse(ctx: &mut PresolveContext, record: &mut ConstraintRecord) {
	let Constraint::Inverse(inverse) = &record.constraint else {
		unreachable!()
	};
	let f_direct = inverse.f_direct.clone();
	let f_inverse = inverse.f_inverse.clone();
	let n = f_direct.len();
	debug_assert_eq!(n, f_inverse.len());

	// Restrict the domains to the position range. A variable appearing with
	// both signs ends up fixed at zero here.
	let mut used_variables = BTreeSet::new();
	for &r in f_direct.iter().chain(&f_inverse) {
		let _ = used_variables.insert(r.var());
		if !ctx.intersect_domain_with(r, &Domain::range(0, n as IntVal - 1)) {
			debug!("empty domain for a variable in inverse expansion");
			return;
		}
	}

	// With duplicate variables the directional filter below can miss
	// incompatibilities, so exclude the colliding positions up front.
	if used_variables.len() != 2 * n {
		for i in 0..n {
			for j in 0..n {
				if i == j || f_direct[i].var() != f_inverse[j].var() {
					continue;
				}
				let colliding = Domain::from_values(&[i as IntVal, j as IntVal]);
				if !ctx.intersect_domain_with(f_direct[i], &colliding.complement()) {
					return;
				}
			}
		}
	}

	// This reaches the fixed point in one pass over both directions when all
	// variables are distinct.
	if !filter_inverse_domain(ctx, &f_direct, &f_inverse) {
		return;
	}
	if !filter_inverse_domain(ctx, &f_inverse, &f_direct) {
		return;
	}

	// Associate a literal to f[i] = j and share it with g[j] = i. This is
	// only correct because the domains are tight now.
	for (i, &f_i) in f_direct.iter().enumerate() {
		for j in ctx.domain_of(f_i).values().collect_vec() {
			let g_j = f_inverse[j as usize];
			if let Some(g_j_i) = ctx.has_var_value_encoding(g_j, i as IntVal) {
				ctx.insert_var_value_encoding(g_j_i, f_i, j);
			} else {
				let f_i_j = ctx.get_or_create_var_value_encoding(f_i, j);
				ctx.insert_var_value_encoding(f_i_j, g_j, i as IntVal);
			}
		}
	}

	record.clear();
	ctx.update_rule_stats("inverse: expanded");
}
