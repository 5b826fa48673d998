//! Expansion of positive and negative table constraints, including tuple
//! compression and the reduction of columns that only carry a cost.

use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use crate::{
	context::PresolveContext,
	domain::Domain,
	helpers::{cap_add, cap_mul},
	model::{Constraint, ConstraintRecord, LinearConstraint, LinearExpr, Table},
	IntVal, VarRef,
};

/// Sentinel cell value standing for "any value of the column's domain".
pub(crate) const TABLE_ANY_VALUE: IntVal = IntVal::MIN;

/// Merge tuples that differ in exactly one column when their values cover
/// the column's whole domain, replacing the column by [`TABLE_ANY_VALUE`].
/// Also sorts and deduplicates the tuples.
pub(crate) fn compress_tuples(domain_sizes: &[IntVal], tuples: &mut Vec<Vec<IntVal>>) {
	tuples.sort();
	tuples.dedup();
	for col in 0..domain_sizes.len() {
		let mut masked: Vec<(Vec<IntVal>, Vec<IntVal>)> = tuples
			.drain(..)
			.map(|t| {
				let mut key = t.clone();
				key[col] = TABLE_ANY_VALUE;
				(key, t)
			})
			.collect();
		masked.sort();

		let mut result: Vec<Vec<IntVal>> = Vec::new();
		let mut i = 0;
		while i < masked.len() {
			let group_start = i;
			while i < masked.len() && masked[i].0 == masked[group_start].0 {
				i += 1;
			}
			let group = &masked[group_start..i];
			let has_any = group.iter().any(|(_, t)| t[col] == TABLE_ANY_VALUE);
			let mut values: Vec<IntVal> = group.iter().map(|(_, t)| t[col]).collect();
			values.sort_unstable();
			values.dedup();
			if has_any || values.len() as IntVal >= domain_sizes[col] {
				let mut row = group[0].1.clone();
				row[col] = TABLE_ANY_VALUE;
				result.push(row);
			} else {
				result.extend(group.iter().map(|(_, t)| t.clone()));
			}
		}
		*tuples = result;
	}
	tuples.sort();
	tuples.dedup();
}

/// Merge tuples that agree on all but one column by replacing that column
/// with the sorted list of merged values. A cell covering the whole domain
/// (or holding [`TABLE_ANY_VALUE`]) becomes the empty list.
pub(crate) fn fully_compress_tuples(
	domain_sizes: &[IntVal],
	tuples: Vec<Vec<IntVal>>,
) -> Vec<Vec<Vec<IntVal>>> {
	let mut rows: Vec<Vec<Vec<IntVal>>> = tuples
		.into_iter()
		.map(|t| {
			t.into_iter()
				.map(|v| {
					if v == TABLE_ANY_VALUE {
						Vec::new()
					} else {
						vec![v]
					}
				})
				.collect()
		})
		.collect();

	for col in (0..domain_sizes.len()).rev() {
		let mut masked: Vec<(Vec<Vec<IntVal>>, Vec<Vec<IntVal>>)> = rows
			.drain(..)
			.map(|r| {
				let mut key = r.clone();
				key[col] = Vec::new();
				(key, r)
			})
			.collect();
		masked.sort();

		let mut result = Vec::new();
		let mut i = 0;
		while i < masked.len() {
			let group_start = i;
			while i < masked.len() && masked[i].0 == masked[group_start].0 {
				i += 1;
			}
			let group = &masked[group_start..i];
			let mut row = group[0].1.clone();
			if group.len() > 1 || group.iter().any(|(_, r)| r[col].is_empty()) {
				let has_any = group.iter().any(|(_, r)| r[col].is_empty());
				let mut values: Vec<IntVal> = group
					.iter()
					.flat_map(|(_, r)| r[col].iter().copied())
					.collect();
				values.sort_unstable();
				values.dedup();
				row[col] = if has_any || values.len() as IntVal >= domain_sizes[col] {
					Vec::new()
				} else {
					values
				};
			}
			result.push(row);
		}
		rows = result;
	}
	rows.sort();
	rows.dedup();
	rows
}

/// Emit one clause forbidding each tuple of a negative table.
fn expand_negative_table(ctx: &mut PresolveContext, record: &mut ConstraintRecord, table: &Table) {
	let mut tuples = table.tuples.clone();
	if tuples.is_empty() {
		ctx.update_rule_stats("table: empty negated constraint");
		record.clear();
		return;
	}

	let domain_sizes: Vec<IntVal> = table
		.vars
		.iter()
		.map(|&var| ctx.domain_of(var).size())
		.collect();
	compress_tuples(&domain_sizes, &mut tuples);

	// Forbid the variables to take each tuple. A value outside the current
	// domain yields a true literal, satisfying the clause trivially.
	for tuple in &tuples {
		let mut clause = Vec::new();
		for (i, &value) in tuple.iter().enumerate() {
			if value == TABLE_ANY_VALUE {
				continue;
			}
			let literal = ctx.get_or_create_var_value_encoding(table.vars[i], value);
			clause.push(!literal);
		}
		// An empty clause means the forbidden tuple is unavoidable.
		let _ = ctx.add_constraint(ConstraintRecord::new(Constraint::BoolOr(clause)));
	}
	ctx.update_rule_stats("table: expanded negated constraint");
	record.clear();
}

/// Link one column of a compressed table to the tuple literals: every tuple
/// restricts the column to its cell values, and every value needs a
/// supporting tuple. An empty cell supports any value.
fn process_one_compressed_column(
	ctx: &mut PresolveContext,
	variable: VarRef,
	tuple_literals: &[VarRef],
	column: &[Vec<IntVal>],
) {
	debug_assert_eq!(tuple_literals.len(), column.len());

	let mut pairs: Vec<(IntVal, VarRef)> = Vec::new();
	let mut any_value_literals: Vec<VarRef> = Vec::new();
	for (i, values) in column.iter().enumerate() {
		if values.is_empty() {
			any_value_literals.push(tuple_literals[i]);
			continue;
		}
		let mut clause = Vec::new();
		for &value in values {
			debug_assert!(ctx.ref_contains(variable, value));
			clause.push(ctx.get_or_create_var_value_encoding(variable, value));
			pairs.push((value, tuple_literals[i]));
		}
		let _ = ctx.add_constraint(ConstraintRecord::enforced(
			vec![tuple_literals[i]],
			Constraint::BoolOr(clause),
		));
	}

	// If all tuples supporting a value are false, the value is impossible.
	pairs.sort();
	let mut i = 0;
	while i < pairs.len() {
		let value = pairs[i].0;
		let mut no_support = Vec::new();
		while i < pairs.len() && pairs[i].0 == value {
			no_support.push(pairs[i].1);
			i += 1;
		}
		no_support.extend(any_value_literals.iter().copied());
		let value_literal = ctx.get_or_create_var_value_encoding(variable, value);
		no_support.push(!value_literal);
		let _ = ctx.add_constraint(ConstraintRecord::new(Constraint::BoolOr(no_support)));
	}
}

/// Direct support encoding for tables over two variables, which needs no
/// tuple literals: the value literals of one side support the other.
fn add_size_two_table(
	ctx: &mut PresolveContext,
	vars: &[VarRef],
	tuples: &[Vec<IntVal>],
	values_per_var: &[BTreeSet<IntVal>],
) {
	debug_assert_eq!(vars.len(), 2);
	// With at most one variable not fixed, the domain reductions already
	// enforce the table.
	if ctx.ref_is_fixed(vars[0]) || ctx.ref_is_fixed(vars[1]) {
		return;
	}

	let mut left_to_right: BTreeMap<VarRef, Vec<VarRef>> = BTreeMap::new();
	let mut right_to_left: BTreeMap<VarRef, Vec<VarRef>> = BTreeMap::new();
	for tuple in tuples {
		debug_assert!(ctx.ref_contains(vars[0], tuple[0]));
		debug_assert!(ctx.ref_contains(vars[1], tuple[1]));
		let left_literal = ctx.get_or_create_var_value_encoding(vars[0], tuple[0]);
		let right_literal = ctx.get_or_create_var_value_encoding(vars[1], tuple[1]);
		left_to_right.entry(left_literal).or_default().push(right_literal);
		right_to_left.entry(right_literal).or_default().push(left_literal);
	}

	/// Add `literal => one of supports`, unless the supports cover the whole
	/// domain of the other variable.
	fn add_support_constraint(
		ctx: &mut PresolveContext,
		literal: VarRef,
		supports: Vec<VarRef>,
		max_support_size: usize,
	) {
		if supports.len() == max_support_size {
			return;
		}
		if supports.len() == 1 {
			ctx.add_implication(literal, supports[0]);
		} else {
			let mut clause = supports;
			clause.push(!literal);
			let _ = ctx.add_constraint(ConstraintRecord::new(Constraint::BoolOr(clause)));
		}
	}

	for (literal, supports) in left_to_right {
		add_support_constraint(ctx, literal, supports, values_per_var[1].len());
	}
	for (literal, supports) in right_to_left {
		add_support_constraint(ctx, literal, supports, values_per_var[0].len());
	}
}

/// A weighted CSP is usually encoded as tables with extra columns that only
/// carry a cost. Detect columns whose variable appears nowhere else (except
/// possibly in the objective), fold their cost into a per-tuple cost column,
/// and record postsolve assignments for the removed columns. Returns whether
/// a cost column was appended to the tuples.
fn reduce_table_in_presence_of_unique_variable_with_costs(
	ctx: &mut PresolveContext,
	vars: &mut Vec<VarRef>,
	tuples: &mut Vec<Vec<IntVal>>,
) -> bool {
	let num_vars = vars.len();
	let mut only_here_and_in_objective = vec![false; num_vars];
	let mut objective_coeffs = vec![0; num_vars];
	let mut new_vars = Vec::new();
	let mut deleted_vars = Vec::new();
	for (var_index, &var) in vars.iter().enumerate() {
		if ctx.variable_with_cost_is_unique_and_removable(var) {
			ctx.update_rule_stats("table: removed unused column with cost");
			only_here_and_in_objective[var_index] = true;
			let coeff = ctx.objective_map()[&var.var()];
			objective_coeffs[var_index] = if var.is_positive() { coeff } else { -coeff };
			ctx.remove_variable_from_objective(var);
			ctx.mark_variable_as_removed(var);
			deleted_vars.push(var);
		} else if ctx.variable_is_unique_and_removable(var) {
			// A costless column is removed with the same machinery, using a
			// zero cost.
			ctx.update_rule_stats("table: removed unused column");
			only_here_and_in_objective[var_index] = true;
			objective_coeffs[var_index] = 0;
			ctx.mark_variable_as_removed(var);
			deleted_vars.push(var);
		} else {
			new_vars.push(var);
		}
	}
	if new_vars.len() == num_vars {
		return false;
	}

	// Rewrite each tuple as kept values, then the cost, then the values of
	// the deleted columns (needed for the postsolve records below).
	let mut min_cost = IntVal::MAX;
	for tuple in tuples.iter_mut() {
		let mut cost: IntVal = 0;
		let mut new_size = 0;
		let mut deleted_values = Vec::new();
		for var_index in 0..num_vars {
			let value = tuple[var_index];
			if only_here_and_in_objective[var_index] {
				deleted_values.push(value);
				cost = cap_add(cost, cap_mul(value, objective_coeffs[var_index]));
			} else {
				tuple[new_size] = value;
				new_size += 1;
			}
		}
		tuple.truncate(new_size);
		tuple.push(cost);
		min_cost = min_cost.min(cost);
		tuple.extend(deleted_values);
	}

	// Remove tuples that only differ by their cost, keeping the cheapest,
	// and make sure the postsolve assigns the removed columns.
	{
		let old_size = tuples.len();
		tuples.sort();
		let mut kept: Vec<Vec<IntVal>> = Vec::new();
		for tuple_index in 0..tuples.len() {
			if let Some(last) = kept.last() {
				if last[..new_vars.len()] == tuples[tuple_index][..new_vars.len()] {
					continue;
				}
			}
			for (j, &deleted) in deleted_vars.iter().enumerate() {
				let mut enforcement = Vec::new();
				for (var_index, &var) in new_vars.iter().enumerate() {
					enforcement.push(
						ctx.get_or_create_var_value_encoding(
							var,
							tuples[tuple_index][var_index],
						),
					);
				}
				let mut lin = LinearConstraint::new(Domain::constant(
					tuples[tuple_index][new_vars.len() + 1 + j],
				));
				lin.add_expr(&LinearExpr::from_ref(deleted), 1);
				ctx.add_mapping_constraint(ConstraintRecord::enforced(
					enforcement,
					Constraint::Linear(lin),
				));
			}
			kept.push(tuples[tuple_index][..new_vars.len() + 1].to_vec());
		}
		*tuples = kept;
		if tuples.len() < old_size {
			ctx.update_rule_stats("table: removed duplicate tuples with different costs");
		}
	}

	if min_cost > 0 {
		ctx.add_to_objective_offset(min_cost);
		ctx.update_rule_stats("table: transferred min_cost to objective offset");
		let cost_index = new_vars.len();
		for tuple in tuples.iter_mut() {
			tuple[cost_index] -= min_cost;
		}
	}

	// If fixing a column to a value leaves only tuples with a nonzero cost,
	// the minimum of those costs moves to the value's encoding literal.
	for var_index in 0..new_vars.len() {
		let mut value_to_min_cost: BTreeMap<IntVal, IntVal> = BTreeMap::new();
		for tuple in tuples.iter() {
			let value = tuple[var_index];
			let cost = *tuple.last().unwrap();
			value_to_min_cost
				.entry(value)
				.and_modify(|c| *c = (*c).min(cost))
				.or_insert(cost);
		}
		for tuple in tuples.iter_mut() {
			let value = tuple[var_index];
			*tuple.last_mut().unwrap() -= value_to_min_cost[&value];
		}
		for (&value, &cost) in &value_to_min_cost {
			if cost == 0 {
				continue;
			}
			ctx.update_rule_stats("table: transferred cost to encoding");
			let value_literal = ctx.get_or_create_var_value_encoding(new_vars[var_index], value);
			ctx.add_literal_to_objective(value_literal, cost);
		}
	}

	ctx.update_rule_stats(&format!(
		"table: expansion with column(s) only in objective. Arity = {}",
		new_vars.len()
	));
	*vars = new_vars;
	true
}

/// Compress the tuples of a positive table and emit the tuple literals,
/// the exactly-one over them, and the per-column linking constraints.
fn compress_and_expand_positive_table(
	ctx: &mut PresolveContext,
	last_column_is_cost: bool,
	vars: &[VarRef],
	tuples: &mut Vec<Vec<IntVal>>,
) {
	let num_tuples_before_compression = tuples.len();

	// The cost column compresses like a normal column with an unbounded
	// domain, but is treated separately afterwards.
	let mut domain_sizes: Vec<IntVal> = vars
		.iter()
		.map(|&var| ctx.domain_of(var).size())
		.collect();
	if last_column_is_cost {
		domain_sizes.push(IntVal::MAX);
	}

	let compression_level = ctx.params().table_compression_level();
	if compression_level > 0 {
		compress_tuples(&domain_sizes, tuples);
	}
	let num_tuples_after_first_compression = tuples.len();

	// A big table is best compressed as much as possible to limit the
	// number of created Booleans, while a verbose encoding of a small table
	// can give a better linear relaxation.
	let mut compressed_table: Vec<Vec<Vec<IntVal>>> = if compression_level > 2
		|| (compression_level == 2 && num_tuples_after_first_compression > 1000)
	{
		let compressed = fully_compress_tuples(&domain_sizes, std::mem::take(tuples));
		if compressed.len() < num_tuples_before_compression {
			ctx.update_rule_stats("table: fully compress tuples");
		}
		compressed
	} else {
		let compressed = tuples
			.iter()
			.map(|t| {
				t.iter()
					.map(|&v| {
						if v == TABLE_ANY_VALUE {
							Vec::new()
						} else {
							vec![v]
						}
					})
					.collect()
			})
			.collect::<Vec<_>>();
		if compressed.len() < num_tuples_before_compression {
			ctx.update_rule_stats("table: compress tuples");
		}
		compressed
	};
	trace!(
		"table compression: vars={} cost={} tuples {} -> {} -> {}",
		vars.len(),
		domain_sizes.len() - vars.len(),
		num_tuples_before_compression,
		num_tuples_after_first_compression,
		compressed_table.len()
	);
	compressed_table.sort();

	let num_vars = vars.len();
	if compressed_table.len() == 1 {
		// The domain reductions already enforce the single tuple.
		ctx.update_rule_stats("table: one tuple");
		if last_column_is_cost {
			ctx.add_to_objective_offset(compressed_table[0].last().unwrap()[0]);
		}
		return;
	}

	// A value appearing alone in a cell and in no other row can lend its
	// encoding literal to the row, saving a Boolean.
	let mut has_any = vec![false; num_vars];
	let mut value_count: Vec<BTreeMap<IntVal, usize>> = vec![BTreeMap::new(); num_vars];
	for row in &compressed_table {
		for var_index in 0..num_vars {
			if row[var_index].is_empty() {
				has_any[var_index] = true;
				continue;
			}
			for &value in &row[var_index] {
				debug_assert_ne!(value, TABLE_ANY_VALUE);
				debug_assert!(ctx.ref_contains(vars[var_index], value));
				*value_count[var_index].entry(value).or_default() += 1;
			}
		}
	}

	let mut num_reused_literals = 0;
	let mut tuple_literals = Vec::with_capacity(compressed_table.len());
	let mut exactly_one = Vec::with_capacity(compressed_table.len());
	for row in &compressed_table {
		let mut reused = None;
		for var_index in 0..num_vars {
			if has_any[var_index] || row[var_index].len() != 1 {
				continue;
			}
			let value = row[var_index][0];
			if value_count[var_index][&value] != 1 {
				continue;
			}
			num_reused_literals += 1;
			reused = Some(ctx.get_or_create_var_value_encoding(vars[var_index], value));
			break;
		}
		let literal = reused.unwrap_or_else(|| ctx.new_bool_var());
		tuple_literals.push(literal);
		exactly_one.push(literal);
	}
	let _ = ctx.add_constraint(ConstraintRecord::new(Constraint::ExactlyOne(exactly_one)));
	if num_reused_literals > 0 {
		ctx.update_rule_stats("table: reused literals");
	}

	// A merged cost cell lists several costs; the first is the smallest.
	if last_column_is_cost {
		for (i, row) in compressed_table.iter().enumerate() {
			ctx.add_literal_to_objective(tuple_literals[i], row.last().unwrap()[0]);
		}
	}

	for var_index in 0..num_vars {
		if ctx.ref_is_fixed(vars[var_index]) {
			continue;
		}
		let column: Vec<Vec<IntVal>> = compressed_table
			.iter()
			.map(|row| row[var_index].clone())
			.collect();
		process_one_compressed_column(ctx, vars[var_index], &tuple_literals, &column);
	}
	ctx.update_rule_stats("table: expanded positive constraint");
}

/// Rewrite a positive table: prune infeasible tuples, tighten the variable
/// domains, then dispatch to the two-variable support encoding or the
/// general tuple-literal encoding.
fn expand_positive_table(ctx: &mut PresolveContext, record: &mut ConstraintRecord, table: &Table) {
	let num_vars = table.vars.len();
	let mut vars = table.vars.clone();
	let mut tuples = table.tuples.clone();

	// Drop rows with a value outside the current domains, collecting the
	// per-column value sets of the surviving rows.
	let mut values_per_var: Vec<BTreeSet<IntVal>> = vec![BTreeSet::new(); num_vars];
	let mut new_size = 0;
	for tuple_index in 0..tuples.len() {
		let keep = (0..num_vars)
			.all(|var_index| ctx.ref_contains(vars[var_index], tuples[tuple_index][var_index]));
		if keep {
			for var_index in 0..num_vars {
				let _ = values_per_var[var_index].insert(tuples[tuple_index][var_index]);
			}
			tuples.swap(tuple_index, new_size);
			new_size += 1;
		}
	}
	tuples.truncate(new_size);

	if tuples.is_empty() {
		ctx.update_rule_stats("table: empty");
		ctx.notify_that_model_is_unsat("table: no feasible tuple");
		return;
	}

	// Restrict each variable to the values of the surviving rows. This is
	// redundant with presolve, but presolve may be disabled.
	let mut num_fixed_variables = 0;
	for var_index in 0..num_vars {
		let values: Vec<IntVal> = values_per_var[var_index].iter().copied().collect();
		let not_empty = ctx.intersect_domain_with(vars[var_index], &Domain::from_values(&values));
		debug_assert!(not_empty);
		if ctx.ref_is_fixed(vars[var_index]) {
			num_fixed_variables += 1;
		}
	}

	if num_fixed_variables + 1 >= num_vars {
		ctx.update_rule_stats(if num_fixed_variables == num_vars {
			"table: all variables fixed"
		} else {
			"table: one variable not fixed"
		});
		record.clear();
		return;
	}

	// Tables over two variables do not need tuple literals.
	if num_vars == 2 && !ctx.params().detect_table_with_cost() {
		add_size_two_table(ctx, &vars, &tuples, &values_per_var);
		ctx.update_rule_stats("table: expanded positive constraint with two variables");
		record.clear();
		return;
	}

	let mut last_column_is_cost = false;
	if ctx.params().detect_table_with_cost() {
		last_column_is_cost =
			reduce_table_in_presence_of_unique_variable_with_costs(ctx, &mut vars, &mut tuples);
	}
	compress_and_expand_positive_table(ctx, last_column_is_cost, &vars, &mut tuples);
	record.clear();
}

/// Rewrite a table constraint, dispatching on its polarity.
pub(crate) fn expand_table(ctx: &mut PresolveContext, record: &mut ConstraintRecord) {
	let Constraint::Table(table) = &record.constraint else {
		unreachable!()
	};
	let table = table.clone();
	if table.negated {
		expand_negative_table(ctx, record, &table);
	} else {
		expand_positive_table(ctx, record, &table);
	}
}

#[cfg(test)]
mod tests {
	use crate::{
		context::{Params, PresolveContext},
		domain::Domain,
		expand::table::{compress_tuples, expand_table, TABLE_ANY_VALUE},
		model::{Constraint, ConstraintRecord, Model, Table},
		VarRef,
	};

	/// A context over `n` fresh variables with the given domain.
	fn table_setup(n: usize, domain: Domain) -> (PresolveContext, Vec<VarRef>) {
		let mut model = Model::default();
		let vars = (0..n)
			.map(|_| VarRef::from(model.new_var(domain.clone())))
			.collect();
		(
			PresolveContext::new(model, Params::default()).unwrap(),
			vars,
		)
	}

	#[test]
	fn test_compress_tuples_wildcard() {
		// The first column of the two matching rows covers the full domain.
		let mut tuples = vec![vec![1, 5], vec![2, 5], vec![1, 6]];
		compress_tuples(&[2, 3], &mut tuples);
		assert_eq!(tuples, vec![vec![TABLE_ANY_VALUE, 5], vec![1, 6]]);
	}

	#[test]
	fn test_empty_positive_table_is_unsat() {
		let (mut ctx, vars) = table_setup(3, Domain::range(0, 1));
		let mut record = ConstraintRecord::new(Constraint::Table(Table {
			vars,
			tuples: vec![vec![7, 7, 7]],
			negated: false,
		}));
		expand_table(&mut ctx, &mut record);
		assert!(ctx.model_is_unsat());
	}

	#[test]
	fn test_single_tuple_fixes_variables() {
		let (mut ctx, vars) = table_setup(3, Domain::range(0, 4));
		let mut record = ConstraintRecord::new(Constraint::Table(Table {
			vars: vars.clone(),
			tuples: vec![vec![1, 2, 3]],
			negated: false,
		}));
		expand_table(&mut ctx, &mut record);
		assert!(record.is_cleared());
		assert!(!ctx.model_is_unsat());
		assert_eq!(ctx.domain_of(vars[0]), Domain::constant(1));
		assert_eq!(ctx.domain_of(vars[1]), Domain::constant(2));
		assert_eq!(ctx.domain_of(vars[2]), Domain::constant(3));
	}

	#[test]
	fn test_negative_table_emits_forbidding_clauses() {
		let (mut ctx, vars) = table_setup(2, Domain::range(0, 2));
		let mut record = ConstraintRecord::new(Constraint::Table(Table {
			vars: vars.clone(),
			tuples: vec![vec![0, 1], vec![2, 2]],
			negated: true,
		}));
		expand_table(&mut ctx, &mut record);
		assert!(record.is_cleared());

		let l_00 = ctx.has_var_value_encoding(vars[0], 0).unwrap();
		let l_11 = ctx.has_var_value_encoding(vars[1], 1).unwrap();
		let l_02 = ctx.has_var_value_encoding(vars[0], 2).unwrap();
		let l_12 = ctx.has_var_value_encoding(vars[1], 2).unwrap();
		let clauses: Vec<_> = ctx
			.working_model
			.constraints
			.iter()
			.filter_map(|c| match &c.constraint {
				Constraint::BoolOr(lits) if lits.len() == 2 => Some(lits.clone()),
				_ => None,
			})
			.collect();
		assert!(clauses.contains(&vec![!l_00, !l_11]));
		assert!(clauses.contains(&vec![!l_02, !l_12]));
	}

	#[test]
	fn test_size_two_table_support_clauses() {
		let (mut ctx, vars) = table_setup(2, Domain::range(1, 3));
		let mut record = ConstraintRecord::new(Constraint::Table(Table {
			vars: vars.clone(),
			tuples: vec![vec![1, 1], vec![1, 2], vec![2, 3], vec![3, 3]],
			negated: false,
		}));
		expand_table(&mut ctx, &mut record);
		assert!(record.is_cleared());
		assert!(!ctx.model_is_unsat());

		// 1 on the left is supported by right values {1, 2}; 2 only by 3.
		let l_l1 = ctx.has_var_value_encoding(vars[0], 1).unwrap();
		let l_l2 = ctx.has_var_value_encoding(vars[0], 2).unwrap();
		let l_l3 = ctx.has_var_value_encoding(vars[0], 3).unwrap();
		let l_r1 = ctx.has_var_value_encoding(vars[1], 1).unwrap();
		let l_r2 = ctx.has_var_value_encoding(vars[1], 2).unwrap();
		let l_r3 = ctx.has_var_value_encoding(vars[1], 3).unwrap();
		let constraints = &ctx.working_model.constraints;
		assert!(constraints
			.iter()
			.any(|c| c.constraint == Constraint::BoolOr(vec![l_r1, l_r2, !l_l1])));
		// Implications are emitted for single supports.
		assert!(constraints
			.iter()
			.any(|c| c.constraint == Constraint::BoolOr(vec![!l_l2, l_r3])));
		// 3 on the right is supported by left values {2, 3}.
		assert!(constraints
			.iter()
			.any(|c| c.constraint == Constraint::BoolOr(vec![l_l2, l_l3, !l_r3])));
	}

	#[test]
	fn test_positive_table_tuple_literals() {
		let (mut ctx, vars) = table_setup(3, Domain::range(1, 3));
		let mut record = ConstraintRecord::new(Constraint::Table(Table {
			vars: vars.clone(),
			tuples: vec![
				vec![1, 1, 1],
				vec![1, 2, 2],
				vec![2, 3, 1],
				vec![3, 3, 3],
			],
			negated: false,
		}));
		expand_table(&mut ctx, &mut record);
		assert!(record.is_cleared());
		assert!(!ctx.model_is_unsat());

		// One exactly-one over the four tuple literals.
		let exactly_ones: Vec<_> = ctx
			.working_model
			.constraints
			.iter()
			.filter_map(|c| match &c.constraint {
				Constraint::ExactlyOne(lits) => Some(lits.len()),
				_ => None,
			})
			.collect();
		assert_eq!(exactly_ones, vec![4]);

		// Domains are tightened to the supported values.
		assert_eq!(ctx.domain_of(vars[0]), Domain::range(1, 3));
		assert_eq!(ctx.domain_of(vars[1]), Domain::range(1, 3));
		assert_eq!(ctx.domain_of(vars[2]), Domain::range(1, 3));
	}

	#[test]
	fn test_wcsp_reduction_moves_costs_to_objective() {
		let mut model = Model::default();
		let vars: Vec<VarRef> = (0..3)
			.map(|_| VarRef::from(model.new_var(Domain::range(0, 1))))
			.collect();
		// The first two variables are also used elsewhere, the third only
		// appears in the table and the objective.
		let _ = model.add_constraint(ConstraintRecord::new(Constraint::BoolOr(vec![
			vars[0], vars[1],
		])));
		let table_index = model.add_constraint(ConstraintRecord::new(Constraint::Table(Table {
			vars: vars.clone(),
			tuples: vec![
				vec![0, 0, 1],
				vec![0, 1, 0],
				vec![1, 0, 0],
				vec![1, 1, 1],
			],
			negated: false,
		})));
		let params = Params::default().with_detect_table_with_cost(true);
		let mut ctx = PresolveContext::new(model, params).unwrap();
		ctx.add_literal_to_objective(vars[2], 5);

		// Detach the record the way the driver does before expanding.
		let mut record = std::mem::replace(
			&mut ctx.working_model.constraints[table_index],
			ConstraintRecord::new(Constraint::Dummy),
		);
		expand_table(&mut ctx, &mut record);
		assert!(record.is_cleared());
		assert!(!ctx.model_is_unsat());

		// The cost column is gone from the objective as a variable; its
		// cost now sits on tuple literals.
		assert!(!ctx.objective_map().contains_key(&vars[2].var()));
		assert!(!ctx.objective_map().is_empty());
		// Postsolve assignments for the removed column were recorded.
		assert!(!ctx.mapping_model.is_empty());
	}
}
