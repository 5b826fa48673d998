//! Expansion of `target = expr mod m` with a non-fixed modulus into a
//! division, a product, and a linear equation.

use crate::{
	context::PresolveContext,
	domain::Domain,
	model::{Constraint, ConstraintRecord, LinearArgument, LinearConstraint, LinearExpr},
	VarRef,
};

/// Rewrite `target = expr mod m` into `q = expr / m`, `p = q * m`, and
/// `expr - p - target = 0`. A fixed modulus is left for another pass.
pub(crate) fn expand_int_mod(ctx: &mut PresolveContext, record: &mut ConstraintRecord) {
	let Constraint::IntMod(int_mod) = &record.constraint else {
		unreachable!()
	};
	let mod_expr = int_mod.exprs[1].clone();
	if ctx.expr_is_fixed(&mod_expr) {
		return;
	}
	let expr = int_mod.exprs[0].clone();
	let target_expr = int_mod.target.clone();
	let enforcement = record.enforcement.clone();

	// Tighten the target to the modulo envelope to avoid later overflow.
	if target_expr.vars.len() <= 1 {
		let envelope = ctx
			.domain_super_set_of(&expr)
			.positive_modulo_by_superset(&ctx.domain_super_set_of(&mod_expr));
		if !ctx.intersect_expr_domain_with(&target_expr, &envelope) {
			return;
		}
	}

	// div_expr = expr / mod_expr.
	let div_domain = ctx
		.domain_super_set_of(&expr)
		.positive_division_by_superset(&ctx.domain_super_set_of(&mod_expr));
	if div_domain.is_empty() {
		ctx.notify_that_model_is_unsat("int_mod: empty division envelope");
		return;
	}
	let div_expr = LinearExpr::from_ref(VarRef::from(ctx.new_int_var(div_domain)));
	let _ = ctx.add_constraint(ConstraintRecord::enforced(
		enforcement.clone(),
		Constraint::IntDiv(LinearArgument {
			target: div_expr.clone(),
			exprs: vec![expr.clone(), mod_expr.clone()],
		}),
	));

	// prod_expr = div_expr * mod_expr.
	let prod_domain = ctx
		.domain_super_set_of(&div_expr)
		.continuous_multiplication_by(&ctx.domain_super_set_of(&mod_expr))
		.intersection(
			&ctx.domain_super_set_of(&expr)
				.addition_with(&ctx.domain_super_set_of(&target_expr).negation()),
		);
	if prod_domain.is_empty() {
		ctx.notify_that_model_is_unsat("int_mod: empty product envelope");
		return;
	}
	let prod_expr = LinearExpr::from_ref(VarRef::from(ctx.new_int_var(prod_domain)));
	let _ = ctx.add_constraint(ConstraintRecord::enforced(
		enforcement.clone(),
		Constraint::IntProd(LinearArgument {
			target: prod_expr.clone(),
			exprs: vec![div_expr, mod_expr],
		}),
	));

	// expr - prod_expr - target_expr = 0.
	let mut lin = LinearConstraint::new(Domain::constant(0));
	lin.add_expr(&expr, 1);
	lin.add_expr(&prod_expr, -1);
	lin.add_expr(&target_expr, -1);
	let _ = ctx.add_constraint(ConstraintRecord::enforced(
		enforcement,
		Constraint::Linear(lin),
	));

	record.clear();
	ctx.update_rule_stats("int_mod: expanded");
}

#[cfg(test)]
mod tests {
	use crate::{
		context::{Params, PresolveContext},
		domain::Domain,
		expand::int_mod::expand_int_mod,
		model::{Constraint, ConstraintRecord, LinearArgument, LinearExpr, Model},
		VarRef,
	};

	#[test]
	fn test_fixed_modulus_is_skipped() {
		let mut model = Model::default();
		let x = VarRef::from(model.new_var(Domain::range(0, 20)));
		let m = VarRef::from(model.new_var(Domain::constant(5)));
		let t = VarRef::from(model.new_var(Domain::range(0, 4)));
		let mut ctx = PresolveContext::new(model, Params::default()).unwrap();

		let mut record = ConstraintRecord::new(Constraint::IntMod(LinearArgument {
			target: LinearExpr::from_ref(t),
			exprs: vec![LinearExpr::from_ref(x), LinearExpr::from_ref(m)],
		}));
		expand_int_mod(&mut ctx, &mut record);
		assert!(!record.is_cleared());
		assert!(ctx.working_model.constraints.is_empty());
	}

	#[test]
	fn test_variable_modulus_expands() {
		let mut model = Model::default();
		let x = VarRef::from(model.new_var(Domain::range(0, 20)));
		let m = VarRef::from(model.new_var(Domain::range(3, 5)));
		let t = VarRef::from(model.new_var(Domain::range(-100, 100)));
		let enforce = VarRef::from(model.new_var(Domain::range(0, 1)));
		let mut ctx = PresolveContext::new(model, Params::default()).unwrap();

		let mut record = ConstraintRecord::enforced(
			vec![enforce],
			Constraint::IntMod(LinearArgument {
				target: LinearExpr::from_ref(t),
				exprs: vec![LinearExpr::from_ref(x), LinearExpr::from_ref(m)],
			}),
		);
		expand_int_mod(&mut ctx, &mut record);
		assert!(record.is_cleared());
		assert!(!ctx.model_is_unsat());

		// The target is tightened to the modulo envelope.
		assert_eq!(ctx.domain_of(t), Domain::range(0, 4));

		// A division, a product, and a linear equation, all inheriting the
		// original enforcement.
		let constraints = &ctx.working_model.constraints;
		assert_eq!(constraints.len(), 3);
		assert!(matches!(constraints[0].constraint, Constraint::IntDiv(_)));
		assert!(matches!(constraints[1].constraint, Constraint::IntProd(_)));
		assert!(matches!(constraints[2].constraint, Constraint::Linear(_)));
		for record in constraints {
			assert_eq!(record.enforcement, vec![enforce]);
		}

		// The quotient variable gets the division envelope.
		let Constraint::IntDiv(div) = &constraints[0].constraint else {
			unreachable!()
		};
		let q = div.target.vars[0];
		assert_eq!(ctx.domain_of(q), Domain::range(0, 6));
	}
}
