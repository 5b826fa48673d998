//! Expansion of linear constraints: multi-interval right-hand sides become
//! a slack variable or a Boolean disjunction, and small two-variable
//! disequalities become clauses over existing value encodings.

use crate::{
	context::PresolveContext,
	domain::Domain,
	helpers::solve_diophantine_pair,
	model::{Constraint, ConstraintRecord},
	VarRef,
};

/// Rewrite a linear constraint whose admitted domain has more than one
/// interval.
///
/// With the integer encoding, a slack variable with the admitted set as its
/// domain turns the constraint into an equality. With the Boolean encoding,
/// one literal per interval selects which interval the sum lies in; the
/// selection is free whenever an enforcement literal is false.
pub(crate) fn expand_complex_linear(ctx: &mut PresolveContext, record: &mut ConstraintRecord) {
	let Constraint::Linear(lin) = &record.constraint else {
		unreachable!()
	};
	if lin.domain.num_intervals() <= 1 {
		return;
	}
	// Single-variable constraints are kept as is: they are how value
	// encodings are recognised.
	if lin.vars.len() == 1 {
		return;
	}

	if ctx.params().encode_complex_linear_constraint_with_integer() {
		// expr in D becomes expr - slack = 0 with dom(slack) = D.
		let slack = ctx.new_int_var(lin.domain.clone());
		let Constraint::Linear(lin) = &mut record.constraint else {
			unreachable!()
		};
		lin.vars.push(VarRef::from(slack));
		lin.coeffs.push(-1);
		lin.domain = Domain::constant(0);
	} else {
		let lin = lin.clone();
		let enforcement = record.enforcement.clone();

		// Two intervals without enforcement need a single Boolean; otherwise
		// a clause selects an interval unless an enforcement literal is
		// false.
		let single_bool = if enforcement.is_empty() && lin.domain.num_intervals() == 2 {
			Some(ctx.new_bool_var())
		} else {
			None
		};
		let mut clause: Vec<VarRef> = enforcement.iter().map(|&lit| !lit).collect();
		let mut domain_literals = Vec::new();
		for (k, interval) in lin.domain.iter().enumerate() {
			let subdomain_literal = match single_bool {
				Some(bool_var) => {
					if k == 0 {
						domain_literals.push(bool_var);
						bool_var
					} else {
						!bool_var
					}
				}
				None => {
					let lit = ctx.new_bool_var();
					clause.push(lit);
					domain_literals.push(lit);
					lit
				}
			};

			// A copy of the constraint restricted to the interval, enforced
			// by its selection literal.
			let mut interval_lin = lin.clone();
			interval_lin.domain = Domain::range(*interval.start(), *interval.end());
			let _ = ctx.add_constraint(ConstraintRecord::enforced(
				vec![subdomain_literal],
				Constraint::Linear(interval_lin),
			));
		}
		if single_bool.is_none() {
			let _ = ctx.add_constraint(ConstraintRecord::new(Constraint::BoolOr(clause)));
		}

		// Both encodings admit spurious solutions over the new Booleans when
		// the constraint is not enforced; pin the selection literals to
		// false in that case so that enumeration stays exact.
		if ctx.params().enumerate_all_solutions() && !enforcement.is_empty() {
			let linear_is_enforced = if enforcement.len() == 1 {
				enforcement[0]
			} else {
				let lit = ctx.new_bool_var();
				let mut maintain = Vec::new();
				for &enf in &enforcement {
					ctx.add_implication(!enf, !lit);
					maintain.push(!enf);
				}
				maintain.push(lit);
				let _ = ctx.add_constraint(ConstraintRecord::new(Constraint::BoolOr(maintain)));
				lit
			};
			for &lit in &domain_literals {
				ctx.add_implication(!linear_is_enforced, !lit);
			}
		}
		record.clear();
	}

	ctx.update_rule_stats("linear: expanded complex rhs");
}

/// Rewrite `a*x + b*y != cte` (a size-2 linear whose complement meets the
/// reachable sums in a single value) into clauses, when the excluded pairs
/// are few and their value encodings already exist.
pub(crate) fn expand_some_linear_of_size_two(
	ctx: &mut PresolveContext,
	record: &mut ConstraintRecord,
) {
	let Constraint::Linear(lin) = &record.constraint else {
		unreachable!()
	};
	if lin.vars.len() != 2 {
		return;
	}
	let var1 = lin.vars[0];
	let var2 = lin.vars[1];
	if ctx.ref_is_fixed(var1) || ctx.ref_is_fixed(var2) {
		return;
	}
	let coeff1 = lin.coeffs[0];
	let coeff2 = lin.coeffs[1];
	let reachable_rhs_superset = ctx
		.domain_of(var1)
		.multiplication_by(coeff1)
		.addition_with(&ctx.domain_of(var2).multiplication_by(coeff2));
	let infeasible_reachable_values = reachable_rhs_superset.intersection(&lin.domain.complement());

	// Only the single-excluded-value shape is handled here.
	if infeasible_reachable_values.size() != 1 {
		return;
	}
	let cte = infeasible_reachable_values.min();

	let Some(solution) = solve_diophantine_pair(coeff1, coeff2, cte) else {
		// No integer pair reaches the excluded value.
		ctx.update_rule_stats("linear: expand always feasible ax + by != cte");
		record.clear();
		return;
	};
	let reduced_domain = ctx
		.domain_of(var1)
		.addition_with(&Domain::constant(-solution.x0))
		.inverse_multiplication_by(solution.b)
		.intersection(
			&ctx.domain_of(var2)
				.addition_with(&Domain::constant(-solution.y0))
				.inverse_multiplication_by(-solution.a),
		);
	if reduced_domain.size() > 16 {
		return;
	}

	// All needed encodings must already exist; creating them here does not
	// pay off, and variables with two-value domains are better handled by
	// presolve.
	let size1 = ctx.domain_of(var1).size();
	let size2 = ctx.domain_of(var2).size();
	for z in reduced_domain.values() {
		let value1 = solution.x0 + solution.b * z;
		let value2 = solution.y0 - solution.a * z;
		debug_assert!(ctx.ref_contains(var1, value1));
		debug_assert!(ctx.ref_contains(var2, value2));
		debug_assert_eq!(coeff1 * value1 + coeff2 * value2, cte);
		if ctx.has_var_value_encoding(var1, value1).is_none() || size1 == 2 {
			return;
		}
		if ctx.has_var_value_encoding(var2, value2).is_none() || size2 == 2 {
			return;
		}
	}

	let enforcement = record.enforcement.clone();
	for z in reduced_domain.values() {
		let value1 = solution.x0 + solution.b * z;
		let value2 = solution.y0 - solution.a * z;
		// The pair (value1, value2) reaches the excluded sum: at least one
		// of the two equalities must be false.
		let literal1 = ctx.has_var_value_encoding(var1, value1).unwrap();
		let literal2 = ctx.has_var_value_encoding(var2, value2).unwrap();
		let mut clause = vec![!literal1, !literal2];
		clause.extend(enforcement.iter().map(|&lit| !lit));
		let _ = ctx.add_constraint(ConstraintRecord::new(Constraint::BoolOr(clause)));
	}

	ctx.update_rule_stats("linear: expand small ax + by != cte");
	record.clear();
}

#[cfg(test)]
mod tests {
	use crate::{
		context::{Params, PresolveContext},
		domain::Domain,
		expand::linear::{expand_complex_linear, expand_some_linear_of_size_two},
		model::{Constraint, ConstraintRecord, LinearConstraint, Model},
		VarRef,
	};

	/// A linear constraint `x + y in domain` over two fresh variables.
	fn linear_setup(
		var_domain: Domain,
		rhs: Domain,
	) -> (Model, VarRef, VarRef, ConstraintRecord) {
		let mut model = Model::default();
		let x = VarRef::from(model.new_var(var_domain.clone()));
		let y = VarRef::from(model.new_var(var_domain));
		let mut lin = LinearConstraint::new(rhs);
		lin.vars = vec![x, y];
		lin.coeffs = vec![1, 1];
		let record = ConstraintRecord::new(Constraint::Linear(lin));
		(model, x, y, record)
	}

	#[test]
	fn test_complex_linear_with_integer_slack() {
		let rhs = Domain::from_values(&[0, 1, 5, 6, 10]);
		let (model, x, y, mut record) = linear_setup(Domain::range(0, 10), rhs.clone());
		let params = Params::default().with_encode_complex_linear_constraint_with_integer(true);
		let mut ctx = PresolveContext::new(model, params).unwrap();

		expand_complex_linear(&mut ctx, &mut record);
		assert!(!record.is_cleared());
		let Constraint::Linear(lin) = &record.constraint else {
			unreachable!()
		};
		assert_eq!(lin.vars.len(), 3);
		assert_eq!(lin.coeffs, vec![1, 1, -1]);
		assert_eq!(lin.domain, Domain::constant(0));
		assert_eq!(ctx.domain_of(lin.vars[2]), rhs);
		let _ = (x, y);
	}

	#[test]
	fn test_complex_linear_with_boolean_disjunction() {
		let rhs = Domain::from_values(&[0, 5, 6, 10]);
		let (model, _, _, mut record) = linear_setup(Domain::range(0, 10), rhs);
		let mut ctx = PresolveContext::new(model, Params::default()).unwrap();

		expand_complex_linear(&mut ctx, &mut record);
		assert!(record.is_cleared());

		// Three intervals: one enforced copy each, plus the selection
		// clause.
		let copies: Vec<_> = ctx
			.working_model
			.constraints
			.iter()
			.filter(|c| matches!(c.constraint, Constraint::Linear(_)))
			.collect();
		assert_eq!(copies.len(), 3);
		assert_eq!(copies[0].enforcement.len(), 1);
		let Constraint::Linear(first) = &copies[0].constraint else {
			unreachable!()
		};
		assert_eq!(first.domain, Domain::constant(0));
		let clauses = ctx
			.working_model
			.constraints
			.iter()
			.filter(|c| matches!(&c.constraint, Constraint::BoolOr(lits) if lits.len() == 3))
			.count();
		assert_eq!(clauses, 1);
	}

	#[test]
	fn test_two_interval_case_uses_single_boolean() {
		let rhs = Domain::from_values(&[0, 1, 9, 10]);
		let (model, _, _, mut record) = linear_setup(Domain::range(0, 10), rhs);
		let mut ctx = PresolveContext::new(model, Params::default()).unwrap();

		let vars_before = ctx.working_model.variables.len();
		expand_complex_linear(&mut ctx, &mut record);
		assert!(record.is_cleared());
		assert_eq!(ctx.working_model.variables.len(), vars_before + 1);

		// The two interval copies are enforced by the Boolean and its
		// negation; no selection clause is needed.
		let copies: Vec<_> = ctx
			.working_model
			.constraints
			.iter()
			.filter(|c| matches!(c.constraint, Constraint::Linear(_)))
			.collect();
		assert_eq!(copies.len(), 2);
		assert_eq!(copies[0].enforcement, vec![!copies[1].enforcement[0]]);
		assert!(!ctx
			.working_model
			.constraints
			.iter()
			.any(|c| matches!(c.constraint, Constraint::BoolOr(_))));
	}

	#[test]
	fn test_insoluble_diophantine_is_trivially_feasible() {
		// 2x + 4y is always even, so it can never reach 7.
		let mut model = Model::default();
		let x = VarRef::from(model.new_var(Domain::range(0, 2)));
		let y = VarRef::from(model.new_var(Domain::range(0, 2)));
		let mut lin = LinearConstraint::new(Domain::constant(7).complement());
		lin.vars = vec![x, y];
		lin.coeffs = vec![2, 4];
		let mut record = ConstraintRecord::new(Constraint::Linear(lin));
		let mut ctx = PresolveContext::new(model, Params::default()).unwrap();

		expand_some_linear_of_size_two(&mut ctx, &mut record);
		assert!(record.is_cleared());
		assert!(ctx.working_model.constraints.is_empty());
		assert_eq!(
			ctx.rule_stats()["linear: expand always feasible ax + by != cte"],
			1
		);
	}

	#[test]
	fn test_empty_solution_line_needs_no_clauses() {
		// 3x + 5y != 7 with x, y in [0, 2]: the solution line of
		// 3x + 5y = 7 misses both domains entirely.
		let mut model = Model::default();
		let x = VarRef::from(model.new_var(Domain::range(0, 2)));
		let y = VarRef::from(model.new_var(Domain::range(0, 2)));
		let mut lin = LinearConstraint::new(Domain::constant(7).complement());
		lin.vars = vec![x, y];
		lin.coeffs = vec![3, 5];
		let mut record = ConstraintRecord::new(Constraint::Linear(lin));
		let mut ctx = PresolveContext::new(model, Params::default()).unwrap();

		expand_some_linear_of_size_two(&mut ctx, &mut record);
		assert!(record.is_cleared());
		assert!(ctx.working_model.constraints.is_empty());
		assert_eq!(
			ctx.rule_stats()["linear: expand small ax + by != cte"],
			1
		);
	}

	#[test]
	fn test_disequality_with_existing_encodings() {
		// x + y != 4 with x, y in [0, 4] and all encodings precreated.
		let mut model = Model::default();
		let x = VarRef::from(model.new_var(Domain::range(0, 4)));
		let y = VarRef::from(model.new_var(Domain::range(0, 4)));
		let mut lin = LinearConstraint::new(Domain::constant(4).complement());
		lin.vars = vec![x, y];
		lin.coeffs = vec![1, 1];
		let mut record = ConstraintRecord::new(Constraint::Linear(lin));
		let mut ctx = PresolveContext::new(model, Params::default()).unwrap();
		for v in 0..=4 {
			let _ = ctx.get_or_create_var_value_encoding(x, v);
			let _ = ctx.get_or_create_var_value_encoding(y, v);
		}

		let constraints_before = ctx.working_model.constraints.len();
		expand_some_linear_of_size_two(&mut ctx, &mut record);
		assert!(record.is_cleared());

		// One clause per pair summing to four.
		let clauses = ctx.working_model.constraints[constraints_before..]
			.iter()
			.filter(|c| matches!(&c.constraint, Constraint::BoolOr(lits) if lits.len() == 2))
			.count();
		assert_eq!(clauses, 5);
		let l_x0 = ctx.has_var_value_encoding(x, 0).unwrap();
		let l_y4 = ctx.has_var_value_encoding(y, 4).unwrap();
		assert!(ctx.working_model.constraints[constraints_before..]
			.iter()
			.any(|c| c.constraint == Constraint::BoolOr(vec![!l_x0, !l_y4])));
	}

	#[test]
	fn test_disequality_without_encodings_is_skipped() {
		let mut model = Model::default();
		let x = VarRef::from(model.new_var(Domain::range(0, 4)));
		let y = VarRef::from(model.new_var(Domain::range(0, 4)));
		let mut lin = LinearConstraint::new(Domain::constant(4).complement());
		lin.vars = vec![x, y];
		lin.coeffs = vec![1, 1];
		let mut record = ConstraintRecord::new(Constraint::Linear(lin));
		let mut ctx = PresolveContext::new(model, Params::default()).unwrap();

		expand_some_linear_of_size_two(&mut ctx, &mut record);
		assert!(!record.is_cleared());
		assert!(ctx.working_model.constraints.is_empty());
	}
}
