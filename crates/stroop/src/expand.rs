//! Expansion of high-level constraints into lower-level primitives.
//!
//! The driver makes two passes over the working model. The first pass
//! rewrites the constraints that may fully encode variables (reservoir,
//! modulo, product, element, inverse, automaton, and table constraints);
//! the second pass decides the fate of all-different constraints based on
//! how the rest of the model uses their variables, and rewrites small
//! linear disequalities whose encodings already exist. Constraints appended
//! during a pass are not themselves expanded.

pub(crate) mod all_different;
pub(crate) mod automaton;
pub(crate) mod element;
pub(crate) mod int_mod;
pub(crate) mod int_prod;
pub(crate) mod inverse;
pub(crate) mod linear;
pub(crate) mod reservoir;
pub(crate) mod table;

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::{
	context::PresolveContext,
	model::{Constraint, ConstraintRecord},
	IntVal, VarRef,
};

/// Dispatch decision for a single constraint record in a driver pass.
enum Action {
	AllDiff,
	Automaton,
	ComplexLinear,
	Element,
	IntMod,
	IntProd,
	Inverse,
	Reservoir,
	ReservoirUnsupported,
	Skip,
	SmallLinear,
	Table,
}

/// Add the constraint `literal => expr in reachable_values`, choosing the
/// smaller of a clause over the reachable encodings and a conjunction of
/// negated unreachable encodings. Values outside `encoding` cannot occur.
pub(crate) fn add_imply_in_reachable_values(
	ctx: &mut PresolveContext,
	literal: VarRef,
	mut reachable_values: Vec<IntVal>,
	encoding: &BTreeMap<IntVal, VarRef>,
) {
	reachable_values.sort_unstable();
	reachable_values.dedup();
	if reachable_values.len() == encoding.len() {
		return;
	}
	if reachable_values.len() <= encoding.len() / 2 {
		let literals = reachable_values.iter().map(|v| encoding[v]).collect();
		let _ = ctx.add_constraint(ConstraintRecord::enforced(
			vec![literal],
			Constraint::BoolOr(literals),
		));
	} else {
		let reachable: BTreeSet<IntVal> = reachable_values.into_iter().collect();
		let literals = encoding
			.iter()
			.filter(|&(value, _)| !reachable.contains(value))
			.map(|(_, &lit)| !lit)
			.collect();
		let _ = ctx.add_constraint(ConstraintRecord::enforced(
			vec![literal],
			Constraint::BoolAnd(literals),
		));
	}
}

/// Rewrite the constraints of the working model into lower-level
/// primitives. Expansion runs at most once per model; re-running is a
/// no-op.
pub fn expand_model(ctx: &mut PresolveContext) {
	if ctx.params().disable_constraint_expansion() || ctx.model_is_unsat() {
		return;
	}
	// None of the rewrites creates a constraint that itself needs expansion,
	// so a single run suffices.
	if ctx.model_is_expanded() {
		return;
	}

	ctx.initialize_new_domains();
	ctx.clear_precedence_cache();

	// First pass: constraints that may fully encode variables.
	let num_constraints = ctx.working_model.constraints.len();
	for c in 0..num_constraints {
		let action = match &ctx.working_model.constraints[c].constraint {
			Constraint::Linear(lin) => {
				// Complex linear constraints are normally deferred to the
				// final expansion pass run after the main presolve.
				if lin.domain.num_intervals() > 1 && !ctx.params().cp_model_presolve() {
					Action::ComplexLinear
				} else {
					Action::Skip
				}
			}
			Constraint::Reservoir(reservoir) => {
				if !ctx.params().expand_reservoir_constraints() {
					Action::Skip
				} else if reservoir
					.level_changes
					.iter()
					.any(|change| !ctx.expr_is_fixed(change))
				{
					Action::ReservoirUnsupported
				} else {
					Action::Reservoir
				}
			}
			Constraint::IntMod(_) => Action::IntMod,
			Constraint::IntProd(_) => Action::IntProd,
			Constraint::Element(_) => Action::Element,
			Constraint::Inverse(_) => Action::Inverse,
			Constraint::Automaton(_) => Action::Automaton,
			Constraint::Table(_) => Action::Table,
			_ => Action::Skip,
		};
		if matches!(action, Action::ReservoirUnsupported) {
			ctx.update_rule_stats(
				"reservoir: expansion is not supported with variable level changes",
			);
			continue;
		}
		if matches!(action, Action::Skip) {
			continue;
		}

		let mut record = std::mem::replace(
			&mut ctx.working_model.constraints[c],
			ConstraintRecord::new(Constraint::Dummy),
		);
		match action {
			Action::ComplexLinear => linear::expand_complex_linear(ctx, &mut record),
			Action::Reservoir => reservoir::expand_reservoir(ctx, &mut record),
			Action::IntMod => int_mod::expand_int_mod(ctx, &mut record),
			Action::IntProd => int_prod::expand_int_prod(ctx, &mut record),
			Action::Element => element::expand_element(ctx, &mut record),
			Action::Inverse => inverse::expand_inverse(ctx, &mut record),
			Action::Automaton => automaton::expand_automaton(ctx, &mut record),
			Action::Table => table::expand_table(ctx, &mut record),
			_ => unreachable!(),
		}
		ctx.working_model.constraints[c] = record;

		ctx.update_new_constraints_variable_usage();
		ctx.update_constraint_variable_usage(c);
		if ctx.model_is_unsat() {
			debug!("unsat after expansion of constraint {c}");
			return;
		}
	}

	// Second pass: constraints whose expansion depends on the encodings the
	// first pass created.
	let mut domain_of_var_is_used = BTreeSet::new();
	let mut bounds_of_var_are_used = BTreeSet::new();
	let mut processed_variables = BTreeSet::new();
	let num_constraints = ctx.working_model.constraints.len();
	for c in 0..num_constraints {
		let action = match &ctx.working_model.constraints[c].constraint {
			Constraint::AllDiff(_) => Action::AllDiff,
			Constraint::Linear(_) => Action::SmallLinear,
			_ => Action::Skip,
		};
		if matches!(action, Action::Skip) {
			continue;
		}

		let mut record = std::mem::replace(
			&mut ctx.working_model.constraints[c],
			ConstraintRecord::new(Constraint::Dummy),
		);
		match action {
			Action::AllDiff => all_different::maybe_expand_all_diff(
				ctx,
				&mut record,
				&mut domain_of_var_is_used,
				&mut bounds_of_var_are_used,
				&mut processed_variables,
			),
			Action::SmallLinear => linear::expand_some_linear_of_size_two(ctx, &mut record),
			_ => unreachable!(),
		}
		ctx.working_model.constraints[c] = record;

		ctx.update_new_constraints_variable_usage();
		ctx.update_constraint_variable_usage(c);
		if ctx.model_is_unsat() {
			debug!("unsat after expansion of constraint {c}");
			return;
		}
	}

	// The precedence cache does not survive variable substitution in later
	// presolve passes; drop it now that expansion is done.
	ctx.clear_precedence_cache();
	ctx.initialize_new_domains();
	ctx.write_domains_to_model();
	ctx.notify_that_model_is_expanded();
}

/// Rewrite the multi-interval linear constraints that the first pass
/// deferred while the main presolve was still going to run.
pub fn final_linear_expansion(ctx: &mut PresolveContext) {
	if ctx.params().disable_constraint_expansion() || ctx.model_is_unsat() {
		return;
	}
	let num_constraints = ctx.working_model.constraints.len();
	for c in 0..num_constraints {
		let complex = matches!(
			&ctx.working_model.constraints[c].constraint,
			Constraint::Linear(lin) if lin.domain.num_intervals() > 1
		);
		if !complex {
			continue;
		}
		let mut record = std::mem::replace(
			&mut ctx.working_model.constraints[c],
			ConstraintRecord::new(Constraint::Dummy),
		);
		linear::expand_complex_linear(ctx, &mut record);
		ctx.working_model.constraints[c] = record;
		ctx.update_new_constraints_variable_usage();
		ctx.update_constraint_variable_usage(c);
		if ctx.model_is_unsat() {
			return;
		}
	}
}

/// Add clauses equating `literals[i]` with `encoding[values[i]]`, relying
/// on the implicit exactly-one over the fully encoded values: a value is
/// taken exactly when one of its supporting tuples is selected.
pub(crate) fn link_literals_and_values(
	ctx: &mut PresolveContext,
	literals: &[VarRef],
	values: &[IntVal],
	encoding: &BTreeMap<IntVal, VarRef>,
) {
	debug_assert_eq!(literals.len(), values.len());
	let mut encoding_lit_to_support: BTreeMap<VarRef, Vec<VarRef>> = BTreeMap::new();
	for (&lit, value) in literals.iter().zip(values) {
		encoding_lit_to_support
			.entry(encoding[value])
			.or_default()
			.push(lit);
	}

	for (encoding_lit, support) in encoding_lit_to_support {
		debug_assert!(!support.is_empty());
		if support.len() == 1 {
			ctx.store_boolean_equality_relation(encoding_lit, support[0]);
		} else {
			let mut clause = vec![!encoding_lit];
			for &lit in &support {
				clause.push(lit);
				ctx.add_implication(lit, encoding_lit);
			}
			let _ = ctx.add_constraint(ConstraintRecord::new(Constraint::BoolOr(clause)));
		}
	}
}

#[cfg(test)]
mod tests {
	use crate::{
		context::{Params, PresolveContext},
		domain::Domain,
		expand::expand_model,
		model::{Constraint, ConstraintRecord, Element, Model},
		VarRef,
	};

	#[test]
	fn test_driver_is_idempotent() {
		let mut model = Model::default();
		let index = model.new_var(Domain::range(0, 2));
		let target = model.new_var(Domain::range(0, 10));
		let vars = [5, 7, 5].map(|v| VarRef::from(model.new_var(Domain::constant(v))));
		let _ = model.add_constraint(ConstraintRecord::new(Constraint::Element(Element {
			index: VarRef::from(index),
			target: VarRef::from(target),
			vars: vars.to_vec(),
		})));

		let mut ctx = PresolveContext::new(model, Params::default()).unwrap();
		expand_model(&mut ctx);
		assert!(ctx.model_is_expanded());
		let num_constraints = ctx.working_model.constraints.len();
		let num_vars = ctx.working_model.variables.len();

		expand_model(&mut ctx);
		assert_eq!(ctx.working_model.constraints.len(), num_constraints);
		assert_eq!(ctx.working_model.variables.len(), num_vars);
	}

	#[test]
	fn test_driver_respects_disable_flag() {
		let mut model = Model::default();
		let index = model.new_var(Domain::range(0, 1));
		let target = model.new_var(Domain::range(0, 10));
		let vars = [3, 4].map(|v| VarRef::from(model.new_var(Domain::constant(v))));
		let _ = model.add_constraint(ConstraintRecord::new(Constraint::Element(Element {
			index: VarRef::from(index),
			target: VarRef::from(target),
			vars: vars.to_vec(),
		})));

		let params = Params::default().with_disable_constraint_expansion(true);
		let mut ctx = PresolveContext::new(model, params).unwrap();
		expand_model(&mut ctx);
		assert!(!ctx.model_is_expanded());
		assert_eq!(ctx.working_model.constraints.len(), 1);
		assert!(!ctx.working_model.constraints[0].is_cleared());
	}

	#[test]
	fn test_driver_writes_domains_back() {
		let mut model = Model::default();
		let index = model.new_var(Domain::range(-5, 17));
		let target = model.new_var(Domain::range(0, 100));
		let vars = [5, 7, 5].map(|v| VarRef::from(model.new_var(Domain::constant(v))));
		let _ = model.add_constraint(ConstraintRecord::new(Constraint::Element(Element {
			index: VarRef::from(index),
			target: VarRef::from(target),
			vars: vars.to_vec(),
		})));

		let mut ctx = PresolveContext::new(model, Params::default()).unwrap();
		expand_model(&mut ctx);
		assert!(!ctx.model_is_unsat());
		assert_eq!(
			ctx.working_model.variables[index].domain,
			Domain::range(0, 2)
		);
		assert_eq!(
			ctx.working_model.variables[target].domain,
			Domain::from_values(&[5, 7])
		);
	}
}
