//! Expansion of the reservoir constraint into precedence literals and
//! linear level constraints.

use std::collections::BTreeMap;

use tracing::debug;

use crate::{
	context::PresolveContext,
	domain::Domain,
	helpers::cap_sub,
	model::{Constraint, ConstraintRecord, LinearConstraint},
	VarRef,
};

/// Rewrite a reservoir constraint whose level changes are all fixed.
///
/// When all changes share a sign the order of the events cannot influence
/// the reachable levels, and a single linear range over the activity
/// literals suffices. Otherwise one linear constraint per event bounds the
/// running level up to and including that event, using reified precedence
/// literals between every pair of active candidates.
pub(crate) fn expand_reservoir(ctx: &mut PresolveContext, record: &mut ConstraintRecord) {
	let Constraint::Reservoir(reservoir) = &record.constraint else {
		unreachable!()
	};
	if reservoir.min_level > reservoir.max_level {
		debug!("empty level domain in reservoir constraint");
		ctx.notify_that_model_is_unsat("reservoir: min level above max level");
		return;
	}
	let reservoir = reservoir.clone();
	let num_events = reservoir.time_exprs.len();
	let true_literal = ctx.get_true_literal();
	let active_literal = |index: usize| -> VarRef {
		if reservoir.active_literals.is_empty() {
			true_literal
		} else {
			reservoir.active_literals[index]
		}
	};

	let mut num_positives = 0;
	let mut num_negatives = 0;
	for change in &reservoir.level_changes {
		let demand = ctx.expr_fixed_value(change);
		if demand > 0 {
			num_positives += 1;
		} else if demand < 0 {
			num_negatives += 1;
		}
	}

	if num_positives > 0 && num_negatives > 0 {
		// Boolean variables equivalent to (time[i] <= time[j]) for i != j,
		// restricted to the events that can still be active.
		let mut precedence: BTreeMap<(usize, usize), VarRef> = BTreeMap::new();
		for i in 0..num_events.saturating_sub(1) {
			let active_i = active_literal(i);
			if ctx.literal_is_false(active_i) {
				continue;
			}
			for j in (i + 1)..num_events {
				let active_j = active_literal(j);
				if ctx.literal_is_false(active_j) {
					continue;
				}
				let i_before_j = ctx.get_or_create_reified_precedence_literal(
					&reservoir.time_exprs[i],
					&reservoir.time_exprs[j],
					active_i,
					active_j,
				);
				let _ = precedence.insert((i, j), i_before_j);
				let j_before_i = ctx.get_or_create_reified_precedence_literal(
					&reservoir.time_exprs[j],
					&reservoir.time_exprs[i],
					active_j,
					active_i,
				);
				let _ = precedence.insert((j, i), j_before_i);
			}
		}

		// Constrain the level reached just after each event: the sum of the
		// changes of the predecessors plus the event's own change stays in
		// the level window.
		for i in 0..num_events {
			let active_i = active_literal(i);
			if ctx.literal_is_false(active_i) {
				continue;
			}
			let demand_i = ctx.expr_fixed_value(&reservoir.level_changes[i]);
			let mut level = LinearConstraint::new(Domain::range(
				cap_sub(reservoir.min_level, demand_i),
				cap_sub(reservoir.max_level, demand_i),
			));
			for j in 0..num_events {
				if i == j {
					continue;
				}
				let active_j = active_literal(j);
				if ctx.literal_is_false(active_j) {
					continue;
				}
				let demand_j = ctx.expr_fixed_value(&reservoir.level_changes[j]);
				level.add_literal_term(precedence[&(j, i)], demand_j);
			}
			let _ = ctx.add_constraint(ConstraintRecord::enforced(
				vec![active_i],
				Constraint::Linear(level),
			));
		}
	} else {
		// All changes share a sign: only the sum of the active changes
		// matters.
		let mut sum = LinearConstraint::new(Domain::range(
			reservoir.min_level,
			reservoir.max_level,
		));
		for i in 0..num_events {
			let demand = ctx.expr_fixed_value(&reservoir.level_changes[i]);
			sum.add_literal_term(active_literal(i), demand);
		}
		let _ = ctx.add_constraint(ConstraintRecord::new(Constraint::Linear(sum)));
	}

	record.clear();
	ctx.update_rule_stats("reservoir: expanded");
}
