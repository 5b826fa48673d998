//! Expansion of integer products in which one factor is a Boolean literal.

use crate::{
	context::PresolveContext,
	domain::Domain,
	model::{Constraint, ConstraintRecord, LinearConstraint, LinearExpr},
	VarRef,
};

/// Emit the two enforced equations encoding `product = literal * expr`:
/// `literal => expr - product = 0` and `!literal => product = 0`.
pub(crate) fn expand_int_prod_with_bool(
	ctx: &mut PresolveContext,
	literal: VarRef,
	int_expr: &LinearExpr,
	product_expr: &LinearExpr,
) {
	let mut equal = LinearConstraint::new(Domain::constant(0));
	equal.add_expr(int_expr, 1);
	equal.add_expr(product_expr, -1);
	let _ = ctx.add_constraint(ConstraintRecord::enforced(
		vec![literal],
		Constraint::Linear(equal),
	));

	let mut zero = LinearConstraint::new(Domain::constant(0));
	zero.add_expr(product_expr, 1);
	let _ = ctx.add_constraint(ConstraintRecord::enforced(
		vec![!literal],
		Constraint::Linear(zero),
	));
}

/// Rewrite a two-factor product when exactly one factor is a Boolean
/// literal. Products of two literals are left for presolve, which finds a
/// better form for them.
pub(crate) fn expand_int_prod(ctx: &mut PresolveContext, record: &mut ConstraintRecord) {
	let Constraint::IntProd(int_prod) = &record.constraint else {
		unreachable!()
	};
	if int_prod.exprs.len() != 2 {
		return;
	}
	let a = int_prod.exprs[0].clone();
	let b = int_prod.exprs[1].clone();
	let product = int_prod.target.clone();
	let a_literal = ctx.expression_is_a_literal(&a);
	let b_literal = ctx.expression_is_a_literal(&b);

	if let (Some(literal), None) = (a_literal, b_literal) {
		expand_int_prod_with_bool(ctx, literal, &b, &product);
	} else if let Some(literal) = b_literal {
		expand_int_prod_with_bool(ctx, literal, &a, &product);
	} else {
		return;
	}
	record.clear();
	ctx.update_rule_stats("int_prod: expanded product with Boolean var");
}
