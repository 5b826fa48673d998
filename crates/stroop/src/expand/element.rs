//! Expansion of the element constraint `vars[index] == target` into value
//! encodings and linking clauses.

use std::collections::BTreeMap;

use tracing::debug;

use crate::{
	context::PresolveContext,
	domain::Domain,
	model::{Constraint, ConstraintRecord, Element, LinearConstraint, LinearExpr},
	IntVal, VarRef,
};

/// The special case `vars[index] == index`: the index must be a fixed point
/// of the array.
fn expand_element_with_target_equal_index(
	ctx: &mut PresolveContext,
	record: &mut ConstraintRecord,
	element: &Element,
) {
	let index_ref = element.index;
	let index_domain = ctx.domain_of(index_ref);
	let valid_indices: Vec<IntVal> = index_domain
		.values()
		.filter(|&v| ctx.ref_contains(element.vars[v as usize], v))
		.collect();
	if (valid_indices.len() as IntVal) < index_domain.size() {
		if !ctx.intersect_domain_with(index_ref, &Domain::from_values(&valid_indices)) {
			debug!("no compatible variable domains in element expansion");
			return;
		}
		ctx.update_rule_stats("element: reduced index domain");
	}

	for v in ctx.domain_of(index_ref).values().collect::<Vec<_>>() {
		let var = element.vars[v as usize];
		if ctx.ref_is_fixed(var) && ctx.ref_fixed_value(var) == v {
			continue;
		}
		let index_literal = ctx.get_or_create_var_value_encoding(index_ref, v);
		ctx.add_imply_in_domain(index_literal, var, Domain::constant(v));
	}
	ctx.update_rule_stats("element: expanded with special case target = index");
	record.clear();
}

/// The case where every entry of the array is fixed: the constraint reduces
/// to a pure mapping between index and target encodings.
fn expand_constant_array_element(
	ctx: &mut PresolveContext,
	record: &mut ConstraintRecord,
	element: &Element,
) {
	let index_ref = element.index;
	let target_ref = element.target;
	let index_domain = ctx.domain_of(index_ref);

	// Count the indices supporting each array value.
	let mut value_usage: BTreeMap<IntVal, usize> = BTreeMap::new();
	for v in index_domain.values() {
		debug_assert!(ctx.ref_is_fixed(element.vars[v as usize]));
		*value_usage
			.entry(ctx.ref_fixed_value(element.vars[v as usize]))
			.or_default() += 1;
	}

	// While the exactly-one is implied by the index encoding, stating it
	// explicitly lets presolve detect the structure.
	let mut exactly_one = Vec::new();
	let mut supports: BTreeMap<IntVal, Vec<VarRef>> = BTreeMap::new();
	for v in index_domain.values() {
		let index_literal = ctx.get_or_create_var_value_encoding(index_ref, v);
		exactly_one.push(index_literal);
		let value = ctx.ref_fixed_value(element.vars[v as usize]);
		if value_usage[&value] > 1 {
			let target_literal = ctx.get_or_create_var_value_encoding(target_ref, value);
			ctx.add_implication(index_literal, target_literal);
			supports.entry(value).or_default().push(index_literal);
		} else {
			// A value with a single support can reuse the index literal as
			// the target encoding.
			ctx.insert_var_value_encoding(index_literal, target_ref, value);
		}
	}
	let _ = ctx.add_constraint(ConstraintRecord::new(Constraint::ExactlyOne(exactly_one)));

	// If all index literals supporting a value are false, the value is
	// impossible for the target.
	for (value, index_literals) in supports {
		let target_literal = ctx.get_or_create_var_value_encoding(target_ref, value);
		let mut clause = vec![!target_literal];
		clause.extend(index_literals);
		let _ = ctx.add_constraint(ConstraintRecord::new(Constraint::BoolOr(clause)));
	}

	ctx.update_rule_stats("element: expanded value element");
	record.clear();
}

/// The general case with non-fixed entries in the array.
fn expand_variable_element(
	ctx: &mut PresolveContext,
	record: &mut ConstraintRecord,
	element: &Element,
) {
	let index_ref = element.index;
	let target_ref = element.target;
	let index_domain = ctx.domain_of(index_ref);

	let mut exactly_one = Vec::new();
	for v in index_domain.values() {
		let var = element.vars[v as usize];
		let var_domain = ctx.domain_of(var);
		let index_literal = ctx.get_or_create_var_value_encoding(index_ref, v);
		exactly_one.push(index_literal);

		if var_domain.is_fixed() {
			ctx.add_imply_in_domain(index_literal, target_ref, var_domain);
		} else {
			let mut lin = LinearConstraint::new(Domain::constant(0));
			lin.add_expr(&LinearExpr::from_ref(var), 1);
			lin.add_expr(&LinearExpr::from_ref(target_ref), -1);
			let _ = ctx.add_constraint(ConstraintRecord::enforced(
				vec![index_literal],
				Constraint::Linear(lin),
			));
		}
	}
	let _ = ctx.add_constraint(ConstraintRecord::new(Constraint::ExactlyOne(exactly_one)));

	ctx.update_rule_stats("element: expanded");
	record.clear();
}

/// Rewrite an element constraint, after restricting the index to the array
/// and pruning values without support between index, array, and target.
pub(crate) fn expand_element(ctx: &mut PresolveContext, record: &mut ConstraintRecord) {
	let Constraint::Element(element) = &record.constraint else {
		unreachable!()
	};
	let element = element.clone();
	let size = element.vars.len();

	// The element constraint is zero based.
	if !ctx.intersect_domain_with(element.index, &Domain::range(0, size as IntVal - 1)) {
		debug!("empty domain for the index variable in element expansion");
		return;
	}

	if element.index == element.target {
		expand_element_with_target_equal_index(ctx, record, &element);
		return;
	}

	// Prune the index to positions whose entry can match the target, and
	// collect the values those entries can reach.
	let index_domain = ctx.domain_of(element.index);
	let target_domain = ctx.domain_of(element.target);
	let mut all_constants = true;
	let mut valid_indices = Vec::new();
	let mut reached_domain = Domain::empty();
	for v in index_domain.values() {
		let var_domain = ctx.domain_of(element.vars[v as usize]);
		if var_domain.intersection(&target_domain).is_empty() {
			continue;
		}
		valid_indices.push(v);
		reached_domain = reached_domain.union_with(&var_domain);
		if !var_domain.is_fixed() {
			all_constants = false;
		}
	}

	if (valid_indices.len() as IntVal) < index_domain.size() {
		if !ctx.intersect_domain_with(element.index, &Domain::from_values(&valid_indices)) {
			debug!("no compatible variable domains in element expansion");
			return;
		}
		ctx.update_rule_stats("element: reduced index domain");
	}

	let mut target_domain_changed = false;
	if !ctx.intersect_domain_with_change(element.target, &reached_domain, &mut target_domain_changed)
	{
		return;
	}
	if target_domain_changed {
		ctx.update_rule_stats("element: reduced target domain");
	}

	if all_constants {
		expand_constant_array_element(ctx, record, &element);
	} else {
		expand_variable_element(ctx, record, &element);
	}
}
