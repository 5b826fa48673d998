//! Expansion of the automaton constraint: reachability propagation over
//! states and time steps, followed by a per-step transition encoding.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use tracing::debug;

use crate::{
	context::PresolveContext,
	domain::Domain,
	expand::{add_imply_in_reachable_values, link_literals_and_values},
	model::{Automaton, Constraint, ConstraintRecord},
	IntVal, VarRef,
};

#[derive(Debug, Default)]
/// Tracks whether all observed values are the same one.
struct UniqueDetector {
	/// The first observed value.
	value: Option<IntVal>,
	/// Whether a differing value has been observed.
	conflicting: bool,
}

impl UniqueDetector {
	/// Observe a value.
	fn set(&mut self, value: IntVal) {
		match self.value {
			None => self.value = Some(value),
			Some(seen) if seen != value => self.conflicting = true,
			_ => {}
		}
	}

	/// The unique observed value, if all observations agreed.
	fn unique(&self) -> Option<IntVal> {
		if self.conflicting {
			None
		} else {
			self.value
		}
	}
}

/// Compute the states and labels reachable at every time step: a forward
/// pass from the initial state (restricted to final states on the last
/// step) followed by a backward pass dropping everything that cannot reach
/// a final state.
///
/// When the same variable labels several time steps this may not be a fixed
/// point; the per-step encoding below fixes the remaining literals.
pub(crate) fn propagate_automaton(
	ctx: &PresolveContext,
	automaton: &Automaton,
) -> (Vec<BTreeSet<IntVal>>, Vec<BTreeSet<IntVal>>) {
	let n = automaton.vars.len();
	let final_states: BTreeSet<IntVal> = automaton.final_states.iter().copied().collect();
	let mut states: Vec<BTreeSet<IntVal>> = vec![BTreeSet::new(); n + 1];
	let mut labels: Vec<BTreeSet<IntVal>> = vec![BTreeSet::new(); n];
	let _ = states[0].insert(automaton.starting_state);

	// Forward pass.
	for time in 0..n {
		for t in &automaton.transitions {
			if !states[time].contains(&t.tail) {
				continue;
			}
			if !ctx.ref_contains(automaton.vars[time], t.label) {
				continue;
			}
			if time == n - 1 && !final_states.contains(&t.head) {
				continue;
			}
			let _ = labels[time].insert(t.label);
			let _ = states[time + 1].insert(t.head);
		}
	}

	// Backward pass.
	for time in (0..n).rev() {
		let mut new_states = BTreeSet::new();
		let mut new_labels = BTreeSet::new();
		for t in &automaton.transitions {
			if !states[time].contains(&t.tail) {
				continue;
			}
			if !labels[time].contains(&t.label) {
				continue;
			}
			if !states[time + 1].contains(&t.head) {
				continue;
			}
			let _ = new_labels.insert(t.label);
			let _ = new_states.insert(t.tail);
		}
		labels[time] = new_labels;
		states[time] = new_states;
	}
	(states, labels)
}

/// Rewrite an automaton constraint into per-step transition encodings.
///
/// Each time step is encoded as a local table over (in-state, label,
/// out-state). The label encoding is the shared value encoding of the step
/// variable; the out-state encoding of one step becomes the in-state
/// encoding of the next.
pub(crate) fn expand_automaton(ctx: &mut PresolveContext, record: &mut ConstraintRecord) {
	let Constraint::Automaton(automaton) = &record.constraint else {
		unreachable!()
	};
	let automaton = automaton.clone();

	if automaton.vars.is_empty() {
		if automaton.final_states.contains(&automaton.starting_state) {
			ctx.update_rule_stats("automaton: empty and trivially feasible");
			record.clear();
		} else {
			ctx.notify_that_model_is_unsat(
				"automaton: empty with an initial state not in the final states",
			);
		}
		return;
	} else if automaton.transitions.is_empty() {
		ctx.notify_that_model_is_unsat("automaton: non-empty with no transition");
		return;
	}

	let (reachable_states, _) = propagate_automaton(ctx, &automaton);

	// The automaton state at each time is modeled by Boolean variables. No
	// Booleans are needed at a time with a single possible state, like at
	// time zero.
	let n = automaton.vars.len();
	let mut encoding: BTreeMap<IntVal, VarRef> = BTreeMap::new();
	let mut in_encoding: BTreeMap<IntVal, VarRef> = BTreeMap::new();
	let mut out_encoding: BTreeMap<IntVal, VarRef> = BTreeMap::new();
	let mut removed_values = false;

	for time in 0..n {
		let var = automaton.vars[time];

		// The surviving transitions form a local table constraint for this
		// time step.
		let mut in_states = Vec::new();
		let mut labels = Vec::new();
		let mut out_states = Vec::new();
		for t in &automaton.transitions {
			if !reachable_states[time].contains(&t.tail) {
				continue;
			}
			if !reachable_states[time + 1].contains(&t.head) {
				continue;
			}
			if !ctx.ref_contains(var, t.label) {
				continue;
			}
			in_states.push(t.tail);
			labels.push(t.label);
			// The state after the last step is irrelevant; merge into a
			// single bucket.
			out_states.push(if time + 1 == n { 0 } else { t.head });
		}

		let num_tuples = in_states.len();
		if num_tuples == 0 {
			debug!("infeasible automaton");
			ctx.notify_that_model_is_unsat("automaton: no transition survives a time step");
			return;
		}
		if num_tuples == 1 {
			if !ctx.intersect_domain_with(var, &Domain::constant(labels[0])) {
				debug!("infeasible automaton");
				return;
			}
			// When the same variable labels several steps the reachability
			// sets can be stale, so the remaining in-state literals must be
			// fixed explicitly.
			let at_false = in_encoding
				.iter()
				.filter(|&(&state, _)| state != in_states[0])
				.map(|(_, &lit)| lit)
				.collect_vec();
			for lit in at_false {
				if !ctx.set_literal_to_false(lit) {
					return;
				}
			}
			in_encoding.clear();
			continue;
		}

		// Fully encode the variable, restricted to the surviving labels.
		{
			let mut transitions = labels.clone();
			transitions.sort_unstable();
			transitions.dedup();
			encoding.clear();
			if !ctx.intersect_domain_with_change(
				var,
				&Domain::from_values(&transitions),
				&mut removed_values,
			) {
				debug!("infeasible automaton");
				return;
			}
			// Fixed variables can keep an empty encoding.
			if !ctx.ref_is_fixed(var) {
				for v in ctx.domain_of(var).values().collect_vec() {
					let _ = encoding.insert(v, ctx.get_or_create_var_value_encoding(var, v));
				}
			}
		}

		// Count the occurrences of every in-state, label, and out-state, to
		// reuse their literals where the mapping is one-to-one.
		let mut in_count: BTreeMap<IntVal, usize> = BTreeMap::new();
		let mut label_count: BTreeMap<IntVal, usize> = BTreeMap::new();
		let mut out_count: BTreeMap<IntVal, usize> = BTreeMap::new();
		for i in 0..num_tuples {
			*in_count.entry(in_states[i]).or_default() += 1;
			*label_count.entry(labels[i]).or_default() += 1;
			*out_count.entry(out_states[i]).or_default() += 1;
		}

		// Encode the out states: one Boolean for two states, one per state
		// otherwise.
		{
			let mut states = out_states.clone();
			states.sort_unstable();
			states.dedup();
			out_encoding.clear();
			if states.len() == 2 {
				let bool_var = ctx.new_bool_var();
				let _ = out_encoding.insert(states[0], bool_var);
				let _ = out_encoding.insert(states[1], !bool_var);
			} else if states.len() > 2 {
				let mut out_to_in: BTreeMap<IntVal, UniqueDetector> = BTreeMap::new();
				let mut out_to_label: BTreeMap<IntVal, UniqueDetector> = BTreeMap::new();
				for i in 0..num_tuples {
					out_to_in.entry(out_states[i]).or_default().set(in_states[i]);
					out_to_label.entry(out_states[i]).or_default().set(labels[i]);
				}

				for &state in &states {
					// An out state reached from a unique in state whose
					// occurrences all lead here can reuse the in literal.
					if !in_encoding.is_empty() {
						if let Some(unique_in) = out_to_in[&state].unique() {
							if in_count[&unique_in] == out_count[&state] {
								let _ = out_encoding.insert(state, in_encoding[&unique_in]);
								continue;
							}
						}
					}
					// Same for a unique label.
					if !encoding.is_empty() {
						if let Some(unique_label) = out_to_label[&state].unique() {
							if label_count[&unique_label] == out_count[&state] {
								let _ = out_encoding.insert(state, encoding[&unique_label]);
								continue;
							}
						}
					}
					let _ = out_encoding.insert(state, ctx.new_bool_var());
				}
			}
		}

		// The light encoding is enough to enforce the constraint but
		// propagates less; it creates far fewer Booleans. Use it when the
		// tuple literals of the heavy encoding would outnumber the involved
		// state and label literals.
		let num_involved_variables = in_encoding.len() + encoding.len() + out_encoding.len();
		let use_light_encoding = num_tuples > num_involved_variables;
		if use_light_encoding
			&& !in_encoding.is_empty()
			&& !encoding.is_empty()
			&& !out_encoding.is_empty()
		{
			// A selected in state restricts the possible labels and out
			// states.
			let mut in_to_label: BTreeMap<IntVal, Vec<IntVal>> = BTreeMap::new();
			let mut in_to_out: BTreeMap<IntVal, Vec<IntVal>> = BTreeMap::new();
			for i in 0..num_tuples {
				in_to_label.entry(in_states[i]).or_default().push(labels[i]);
				in_to_out.entry(in_states[i]).or_default().push(out_states[i]);
			}
			for (&in_value, &in_literal) in &in_encoding {
				add_imply_in_reachable_values(
					ctx,
					in_literal,
					in_to_label[&in_value].clone(),
					&encoding,
				);
				add_imply_in_reachable_values(
					ctx,
					in_literal,
					in_to_out[&in_value].clone(),
					&out_encoding,
				);
			}

			// One clause per transition: (in_state, label) => out_state.
			for i in 0..num_tuples {
				let _ = ctx.add_constraint(ConstraintRecord::new(Constraint::BoolOr(vec![
					!in_encoding[&in_states[i]],
					!encoding[&labels[i]],
					out_encoding[&out_states[i]],
				])));
			}

			in_encoding = std::mem::take(&mut out_encoding);
			continue;
		}

		// Heavy encoding: one tuple literal per transition, reusing an
		// existing literal when it occurs in exactly one tuple.
		let mut tuple_literals = Vec::with_capacity(num_tuples);
		if num_tuples == 2 {
			let bool_var = ctx.new_bool_var();
			tuple_literals.push(bool_var);
			tuple_literals.push(!bool_var);
		} else {
			// The exactly-one is implied by the label encoding, but stating
			// it helps.
			let mut exactly_one = Vec::with_capacity(num_tuples);
			for i in 0..num_tuples {
				let tuple_literal = if in_count[&in_states[i]] == 1 && !in_encoding.is_empty() {
					in_encoding[&in_states[i]]
				} else if label_count[&labels[i]] == 1 && !encoding.is_empty() {
					encoding[&labels[i]]
				} else if out_count[&out_states[i]] == 1 && !out_encoding.is_empty() {
					out_encoding[&out_states[i]]
				} else {
					ctx.new_bool_var()
				};
				tuple_literals.push(tuple_literal);
				exactly_one.push(tuple_literal);
			}
			let _ = ctx.add_constraint(ConstraintRecord::new(Constraint::ExactlyOne(exactly_one)));
		}

		if !in_encoding.is_empty() {
			link_literals_and_values(ctx, &tuple_literals, &in_states, &in_encoding);
		}
		if !encoding.is_empty() {
			link_literals_and_values(ctx, &tuple_literals, &labels, &encoding);
		}
		if !out_encoding.is_empty() {
			link_literals_and_values(ctx, &tuple_literals, &out_states, &out_encoding);
		}

		in_encoding = std::mem::take(&mut out_encoding);
	}

	if removed_values {
		ctx.update_rule_stats("automaton: reduced variable domains");
	}
	ctx.update_rule_stats("automaton: expanded");
	record.clear();
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeSet;

	use tracing_test::traced_test;

	use crate::{
		context::{Params, PresolveContext},
		domain::Domain,
		expand::automaton::{expand_automaton, propagate_automaton},
		model::{Automaton, Constraint, ConstraintRecord, Model, Transition},
		IntVal, VarRef,
	};

	/// Shorthand to build a transition list.
	fn transitions(list: &[(IntVal, IntVal, IntVal)]) -> Vec<Transition> {
		list.iter()
			.map(|&(tail, label, head)| Transition { tail, label, head })
			.collect()
	}

	#[test]
	fn test_empty_automaton_boundaries() {
		let model = Model::default();
		let mut ctx = PresolveContext::new(model, Params::default()).unwrap();
		let mut record = ConstraintRecord::new(Constraint::Automaton(Automaton {
			vars: vec![],
			starting_state: 0,
			final_states: vec![0, 3],
			transitions: vec![],
		}));
		expand_automaton(&mut ctx, &mut record);
		assert!(record.is_cleared());
		assert!(!ctx.model_is_unsat());

		let mut record = ConstraintRecord::new(Constraint::Automaton(Automaton {
			vars: vec![],
			starting_state: 1,
			final_states: vec![0, 3],
			transitions: vec![],
		}));
		expand_automaton(&mut ctx, &mut record);
		assert!(ctx.model_is_unsat());
	}

	#[test]
	fn test_propagation_on_forced_word() {
		// The automaton accepting (ab)+ with a = 10 and b = 20.
		let mut model = Model::default();
		let vars: Vec<VarRef> = (0..4)
			.map(|_| VarRef::from(model.new_var(Domain::from_values(&[10, 20]))))
			.collect();
		let automaton = Automaton {
			vars: vars.clone(),
			starting_state: 0,
			final_states: vec![2],
			transitions: transitions(&[(0, 10, 1), (1, 20, 2), (2, 10, 1)]),
		};
		let ctx = PresolveContext::new(model, Params::default()).unwrap();

		let (states, labels) = propagate_automaton(&ctx, &automaton);
		let expect =
			|xs: &[IntVal]| -> BTreeSet<IntVal> { xs.iter().copied().collect() };
		assert_eq!(states[0], expect(&[0]));
		assert_eq!(states[1], expect(&[1]));
		assert_eq!(states[2], expect(&[2]));
		assert_eq!(states[3], expect(&[1]));
		assert_eq!(states[4], expect(&[2]));
		assert_eq!(labels[0], expect(&[10]));
		assert_eq!(labels[1], expect(&[20]));
	}

	#[test]
	fn test_forced_word_fixes_variables() {
		let mut model = Model::default();
		let vars: Vec<VarRef> = (0..4)
			.map(|_| VarRef::from(model.new_var(Domain::from_values(&[10, 20]))))
			.collect();
		let mut ctx = PresolveContext::new(model, Params::default()).unwrap();
		let mut record = ConstraintRecord::new(Constraint::Automaton(Automaton {
			vars: vars.clone(),
			starting_state: 0,
			final_states: vec![2],
			transitions: transitions(&[(0, 10, 1), (1, 20, 2), (2, 10, 1)]),
		}));
		expand_automaton(&mut ctx, &mut record);
		assert!(record.is_cleared());
		assert!(!ctx.model_is_unsat());
		for (i, &var) in vars.iter().enumerate() {
			let expected = if i % 2 == 0 { 10 } else { 20 };
			assert_eq!(ctx.domain_of(var), Domain::constant(expected));
		}
		// Single-transition steps need no Boolean machinery at all.
		assert!(ctx.working_model.constraints.is_empty());
	}

	#[test]
	#[traced_test]
	fn test_unreachable_final_state_is_unsat() {
		let mut model = Model::default();
		let var = VarRef::from(model.new_var(Domain::from_values(&[1])));
		let mut ctx = PresolveContext::new(model, Params::default()).unwrap();
		let mut record = ConstraintRecord::new(Constraint::Automaton(Automaton {
			vars: vec![var],
			starting_state: 0,
			final_states: vec![0],
			transitions: transitions(&[(0, 1, 1)]),
		}));
		expand_automaton(&mut ctx, &mut record);
		assert!(ctx.model_is_unsat());
	}

	#[test]
	fn test_branching_automaton_uses_tuple_literals() {
		// From state 0, three labels go to three different states, which all
		// accept any label afterwards.
		let mut model = Model::default();
		let x0 = VarRef::from(model.new_var(Domain::range(1, 3)));
		let x1 = VarRef::from(model.new_var(Domain::range(1, 3)));
		let mut ctx = PresolveContext::new(model, Params::default()).unwrap();
		let mut record = ConstraintRecord::new(Constraint::Automaton(Automaton {
			vars: vec![x0, x1],
			starting_state: 0,
			final_states: vec![1, 2, 3],
			transitions: transitions(&[
				(0, 1, 1),
				(0, 2, 2),
				(0, 3, 3),
				(1, 1, 1),
				(1, 2, 1),
				(2, 1, 2),
				(2, 3, 2),
				(3, 2, 3),
				(3, 3, 3),
			]),
		}));
		expand_automaton(&mut ctx, &mut record);
		assert!(record.is_cleared());
		assert!(!ctx.model_is_unsat());

		// The first step has three tuples over three labels and three out
		// states, so an exactly-one over the tuple literals is emitted.
		assert!(ctx
			.working_model
			.constraints
			.iter()
			.any(|c| matches!(&c.constraint, Constraint::ExactlyOne(lits) if lits.len() == 3)));
		// Step variables keep their three values.
		assert_eq!(ctx.domain_of(x0), Domain::range(1, 3));
		assert_eq!(ctx.domain_of(x1), Domain::range(1, 3));
	}
}
