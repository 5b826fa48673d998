//! Expansion of all-different constraints, driven by a scan of how the rest
//! of the model uses their variables.

use std::collections::BTreeSet;

use itertools::Itertools;
use tracing::debug;

use crate::{
	context::PresolveContext,
	domain::Domain,
	model::{AllDifferent, Constraint, ConstraintRecord, LinearConstraint},
	IntVal, VarIndex,
};

/// Whether a linear constraint is a single-variable equality or
/// disequality with a constant, i.e. the shape of a value-encoding link.
fn is_var_eq_or_neq_value(ctx: &PresolveContext, lin: &LinearConstraint) -> bool {
	if lin.vars.len() != 1 {
		return false;
	}
	if lin.domain.is_fixed() {
		return true;
	}
	lin.domain
		.inverse_multiplication_by(lin.coeffs[0])
		.complement()
		.intersection(&ctx.domain_of(lin.vars[0]))
		.is_fixed()
}

/// Scan the constraints of every variable of an all-different to decide its
/// expansion.
///
/// Expansion is desired when a variable's individual value equalities are
/// used elsewhere (it is, or will be, fully encoded): tables, automata,
/// element indices, inverses, and single-variable (dis)equalities. Keeping
/// the high-level form is desired when a variable's bounds are used: lin-max,
/// intervals, and fixed-domain linear constraints over at least three terms.
/// The per-variable classification is cached across all-differents.
fn scan_model_and_decide_all_diff_expansion(
	ctx: &PresolveContext,
	all_diff: &AllDifferent,
	domain_of_var_is_used: &mut BTreeSet<VarIndex>,
	bounds_of_var_are_used: &mut BTreeSet<VarIndex>,
	processed_variables: &mut BTreeSet<VarIndex>,
) -> (bool, bool) {
	let mut at_least_one_var_domain_is_used = false;
	let mut at_least_one_var_bound_is_used = false;

	for expr in &all_diff.exprs {
		if expr.vars.is_empty() {
			continue;
		}
		debug_assert_eq!(expr.vars.len(), 1);
		let var = expr.vars[0].var();
		if ctx.ref_is_fixed(expr.vars[0]) {
			continue;
		}

		let domain_is_used;
		let bounds_are_used;
		if !processed_variables.insert(var) {
			domain_is_used = domain_of_var_is_used.contains(&var);
			bounds_are_used = bounds_of_var_are_used.contains(&var);
		} else {
			let mut domain_used = false;
			let mut bounds_used = false;
			// Boolean constraints are ignored; all-differents too, since
			// their expansion is exactly what is being decided.
			for ct_index in ctx.var_to_constraints(var) {
				match &ctx.working_model.constraints[ct_index].constraint {
					Constraint::LinMax(_) => bounds_used = true,
					Constraint::Linear(lin) => {
						if is_var_eq_or_neq_value(ctx, lin) && lin.vars[0].var() == var {
							domain_used = true;
						} else if lin.vars.len() > 2 && lin.domain.is_fixed() {
							// All-different cuts only help alongside a linear
							// constraint with a fixed right-hand side.
							bounds_used = true;
						}
					}
					Constraint::Element(element) => {
						if element.index.var() == var {
							domain_used = true;
						}
					}
					Constraint::Inverse(_) => domain_used = true,
					Constraint::Table(_) => domain_used = true,
					Constraint::Automaton(_) => domain_used = true,
					Constraint::Interval(_) => bounds_used = true,
					_ => {}
				}
				if domain_used && bounds_used {
					break;
				}
			}
			if domain_used {
				let _ = domain_of_var_is_used.insert(var);
			}
			if bounds_used {
				let _ = bounds_of_var_are_used.insert(var);
			}
			domain_is_used = domain_used;
			bounds_are_used = bounds_used;
		}

		at_least_one_var_domain_is_used |= domain_is_used;
		at_least_one_var_bound_is_used |= bounds_are_used;
		if at_least_one_var_domain_is_used && at_least_one_var_bound_is_used {
			break;
		}
	}

	(
		at_least_one_var_domain_is_used,
		at_least_one_var_bound_is_used,
	)
}

/// Whether the size of the value union makes a Boolean expansion
/// worthwhile.
fn all_diff_should_be_expanded(
	ctx: &PresolveContext,
	union_of_domains: &Domain,
	all_diff: &AllDifferent,
) -> bool {
	let num_exprs = all_diff.exprs.len();
	if union_of_domains.size() <= 2 * num_exprs as IntVal || union_of_domains.size() <= 32 {
		return true;
	}
	let num_fully_encoded = all_diff
		.exprs
		.iter()
		.filter(|expr| ctx.is_fully_encoded(expr))
		.count();
	num_fully_encoded == num_exprs && union_of_domains.size() < 256
}

/// Decide and, when warranted, perform the expansion of an all-different
/// into per-value at-most-one (or exactly-one) constraints.
pub(crate) fn maybe_expand_all_diff(
	ctx: &mut PresolveContext,
	record: &mut ConstraintRecord,
	domain_of_var_is_used: &mut BTreeSet<VarIndex>,
	bounds_of_var_are_used: &mut BTreeSet<VarIndex>,
	processed_variables: &mut BTreeSet<VarIndex>,
) {
	let Constraint::AllDiff(all_diff) = &record.constraint else {
		unreachable!()
	};
	if all_diff.exprs.len() <= 1 {
		return;
	}
	// The value expansion below needs affine expressions.
	if all_diff.exprs.iter().any(|expr| expr.vars.len() > 1) {
		return;
	}
	let all_diff = all_diff.clone();

	let expand_all_diff_from_parameters = ctx.params().expand_alldiff_constraints();
	let (expand_all_diff_from_usage, keep_after_expansion) = scan_model_and_decide_all_diff_expansion(
		ctx,
		&all_diff,
		domain_of_var_is_used,
		bounds_of_var_are_used,
		processed_variables,
	);

	let mut union_of_domains = ctx.domain_super_set_of(&all_diff.exprs[0]);
	for expr in &all_diff.exprs[1..] {
		union_of_domains = union_of_domains.union_with(&ctx.domain_super_set_of(expr));
	}

	let expand_all_diff_from_size = all_diff_should_be_expanded(ctx, &union_of_domains, &all_diff);

	let should_expand = expand_all_diff_from_parameters
		|| (expand_all_diff_from_size && (expand_all_diff_from_usage || !keep_after_expansion));
	if !should_expand {
		return;
	}

	let is_a_permutation = all_diff.exprs.len() as IntVal == union_of_domains.size();

	// Per value, collect the expressions that can take it; each value can be
	// assigned at most once, exactly once for a permutation.
	for value in union_of_domains.values().collect_vec() {
		let mut possible_exprs = Vec::new();
		let mut fixed_expression_count = 0;
		for expr in &all_diff.exprs {
			if !ctx.expr_contains(expr, value) {
				continue;
			}
			possible_exprs.push(expr.clone());
			if ctx.expr_is_fixed(expr) {
				fixed_expression_count += 1;
			}
		}

		if fixed_expression_count > 1 {
			ctx.notify_that_model_is_unsat("all_diff: two expressions fixed to the same value");
			return;
		} else if fixed_expression_count == 1 {
			for expr in &possible_exprs {
				if ctx.expr_is_fixed(expr) {
					continue;
				}
				if !ctx.intersect_expr_domain_with(expr, &Domain::constant(value).complement()) {
					debug!("empty domain for a variable in all_diff expansion");
					return;
				}
			}
		}

		let mut literals = Vec::new();
		for expr in &possible_exprs {
			// The propagation above may have removed the value from an
			// expression after it was collected.
			if !ctx.expr_contains(expr, value) {
				continue;
			}
			// A fixed expression encodes as the true literal; two of them
			// would already have failed above.
			literals.push(ctx.get_or_create_affine_value_encoding(expr, value));
		}
		let _ = ctx.add_constraint(ConstraintRecord::new(if is_a_permutation {
			Constraint::ExactlyOne(literals)
		} else {
			Constraint::AtMostOne(literals)
		}));
	}

	ctx.update_rule_stats(&format!(
		"all_diff:{} expanded{}",
		if is_a_permutation { " permutation" } else { "" },
		if keep_after_expansion { " and kept" } else { "" }
	));
	if !keep_after_expansion {
		record.clear();
	}
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeSet;

	use crate::{
		context::{Params, PresolveContext},
		domain::Domain,
		expand::all_different::maybe_expand_all_diff,
		model::{
			AllDifferent, Constraint, ConstraintRecord, LinearExpr, Model, Table,
		},
		VarRef,
	};

	/// Run [`maybe_expand_all_diff`] on the record at the given index with
	/// fresh scanner caches, the way the driver's second pass does.
	fn run_all_diff(ctx: &mut PresolveContext, index: usize) -> ConstraintRecord {
		let mut record = std::mem::replace(
			&mut ctx.working_model.constraints[index],
			ConstraintRecord::new(Constraint::Dummy),
		);
		let mut domain_used = BTreeSet::new();
		let mut bounds_used = BTreeSet::new();
		let mut processed = BTreeSet::new();
		maybe_expand_all_diff(
			ctx,
			&mut record,
			&mut domain_used,
			&mut bounds_used,
			&mut processed,
		);
		record
	}

	#[test]
	fn test_permutation_expands_to_exactly_ones() {
		let mut model = Model::default();
		let vars: Vec<VarRef> = (0..3)
			.map(|_| VarRef::from(model.new_var(Domain::range(1, 3))))
			.collect();
		// The variables are also constrained by a table, so their value
		// encodings are useful elsewhere.
		let _ = model.add_constraint(ConstraintRecord::new(Constraint::Table(Table {
			vars: vars.clone(),
			tuples: vec![vec![1, 2, 3], vec![3, 2, 1]],
			negated: false,
		})));
		let all_diff = model.add_constraint(ConstraintRecord::new(Constraint::AllDiff(
			AllDifferent {
				exprs: vars.iter().map(|&v| LinearExpr::from_ref(v)).collect(),
			},
		)));
		let mut ctx = PresolveContext::new(model, Params::default()).unwrap();

		let record = run_all_diff(&mut ctx, all_diff);
		assert!(record.is_cleared());
		assert!(!ctx.model_is_unsat());

		// Three values over three expressions form a permutation: one
		// exactly-one per value.
		let exactly_ones = ctx
			.working_model
			.constraints
			.iter()
			.filter(|c| matches!(&c.constraint, Constraint::ExactlyOne(lits) if lits.len() == 3))
			.count();
		assert_eq!(exactly_ones, 3);
		assert_eq!(ctx.rule_stats()["all_diff: permutation expanded"], 1);
	}

	#[test]
	fn test_at_most_one_when_not_a_permutation() {
		let mut model = Model::default();
		let vars: Vec<VarRef> = (0..2)
			.map(|_| VarRef::from(model.new_var(Domain::range(1, 3))))
			.collect();
		let all_diff = model.add_constraint(ConstraintRecord::new(Constraint::AllDiff(
			AllDifferent {
				exprs: vars.iter().map(|&v| LinearExpr::from_ref(v)).collect(),
			},
		)));
		let mut ctx = PresolveContext::new(model, Params::default()).unwrap();

		let record = run_all_diff(&mut ctx, all_diff);
		assert!(record.is_cleared());
		let at_most_ones = ctx
			.working_model
			.constraints
			.iter()
			.filter(|c| matches!(&c.constraint, Constraint::AtMostOne(_)))
			.count();
		assert_eq!(at_most_ones, 3);
	}

	#[test]
	fn test_two_fixed_expressions_are_unsat() {
		let mut model = Model::default();
		let a = VarRef::from(model.new_var(Domain::constant(2)));
		let b = VarRef::from(model.new_var(Domain::constant(2)));
		let c = VarRef::from(model.new_var(Domain::range(1, 3)));
		let all_diff = model.add_constraint(ConstraintRecord::new(Constraint::AllDiff(
			AllDifferent {
				exprs: [a, b, c].iter().map(|&v| LinearExpr::from_ref(v)).collect(),
			},
		)));
		let mut ctx = PresolveContext::new(model, Params::default()).unwrap();

		let _ = run_all_diff(&mut ctx, all_diff);
		assert!(ctx.model_is_unsat());
	}

	#[test]
	fn test_single_fixed_expression_prunes_others() {
		let mut model = Model::default();
		let a = VarRef::from(model.new_var(Domain::constant(2)));
		let b = VarRef::from(model.new_var(Domain::range(1, 3)));
		let all_diff = model.add_constraint(ConstraintRecord::new(Constraint::AllDiff(
			AllDifferent {
				exprs: [a, b].iter().map(|&v| LinearExpr::from_ref(v)).collect(),
			},
		)));
		let mut ctx = PresolveContext::new(model, Params::default()).unwrap();

		let record = run_all_diff(&mut ctx, all_diff);
		assert!(record.is_cleared());
		assert!(!ctx.model_is_unsat());
		assert_eq!(ctx.domain_of(b), Domain::from_values(&[1, 3]));
	}

	#[test]
	fn test_large_domains_without_usage_are_kept() {
		let mut model = Model::default();
		let vars: Vec<VarRef> = (0..2)
			.map(|_| VarRef::from(model.new_var(Domain::range(0, 1000))))
			.collect();
		let all_diff = model.add_constraint(ConstraintRecord::new(Constraint::AllDiff(
			AllDifferent {
				exprs: vars.iter().map(|&v| LinearExpr::from_ref(v)).collect(),
			},
		)));
		let mut ctx = PresolveContext::new(model, Params::default()).unwrap();

		let record = run_all_diff(&mut ctx, all_diff);
		assert!(!record.is_cleared());
		assert!(ctx.working_model.constraints.iter().all(|c| c.is_cleared()
			|| matches!(c.constraint, Constraint::AllDiff(_) | Constraint::Dummy)));

		// The parameter forces the expansion regardless of the size.
		let mut model = Model::default();
		let vars: Vec<VarRef> = (0..2)
			.map(|_| VarRef::from(model.new_var(Domain::range(0, 40))))
			.collect();
		let all_diff = model.add_constraint(ConstraintRecord::new(Constraint::AllDiff(
			AllDifferent {
				exprs: vars.iter().map(|&v| LinearExpr::from_ref(v)).collect(),
			},
		)));
		let params = Params::default().with_expand_alldiff_constraints(true);
		let mut ctx = PresolveContext::new(model, params).unwrap();
		let record = run_all_diff(&mut ctx, all_diff);
		assert!(record.is_cleared());
	}
}
