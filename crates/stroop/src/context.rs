//! The shared context that mediates all model mutation during expansion: it
//! owns the working model, the mapping (postsolve) model, the working
//! variable domains, the value-encoding and reified-precedence caches, the
//! objective, and the variable to constraint incidence.

use std::collections::{BTreeMap, BTreeSet};

use index_vec::IndexVec;
use tracing::debug;

use crate::{
	domain::Domain,
	helpers::{cap_add, cap_mul},
	model::{Constraint, ConstraintRecord, LinearConstraint, LinearExpr, Model, ModelError},
	IntVal, VarIndex, VarRef,
};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// Configuration options steering the expansion of constraints.
pub struct Params {
	/// Whether constraint expansion is disabled altogether.
	disable_constraint_expansion: bool,
	/// Whether reservoir constraints are expanded.
	expand_reservoir_constraints: bool,
	/// Whether all-different constraints are expanded regardless of the
	/// decision of the usage scanner.
	expand_alldiff_constraints: bool,
	/// Whether a linear constraint with a multi-interval domain is rewritten
	/// with an integer slack variable instead of a Boolean disjunction.
	encode_complex_linear_constraint_with_integer: bool,
	/// Whether table constraints are scanned for columns that only carry an
	/// objective cost.
	detect_table_with_cost: bool,
	/// How aggressively tables are compressed before expansion: 0 disables
	/// compression, 1 merges rows into wildcards, 2 additionally applies full
	/// compression to tables of more than 1000 rows, and 3 always applies
	/// full compression.
	table_compression_level: u8,
	/// Whether the main presolve runs after expansion. When it does,
	/// multi-interval linear constraints are deferred to the final linear
	/// expansion pass.
	cp_model_presolve: bool,
	/// Whether all solutions will be enumerated, which forbids rewrites that
	/// would introduce spurious solutions over the new variables.
	enumerate_all_solutions: bool,
}

/// Cache key for reified precedence literals.
type PrecedenceKey = (LinearExpr, LinearExpr, VarRef, VarRef);

/// The expansion stage's view of the presolver state.
///
/// The context is the unique mutator of the working model. Expanders consult
/// it for domains and cached encodings, append replacement constraints
/// through it, and signal unsatisfiability on it. Constraint records are
/// addressed by stable indices; the record storage may move when new records
/// are appended.
#[derive(Clone, Debug)]
pub struct PresolveContext {
	/// The model being rewritten.
	pub working_model: Model,
	/// Constraints recording how to reconstruct values for variables
	/// eliminated during expansion.
	pub mapping_model: Vec<ConstraintRecord>,
	/// The working domain of every variable.
	domains: IndexVec<VarIndex, Domain>,
	/// For every variable, the indexes of the constraints referencing it.
	var_to_constraints: IndexVec<VarIndex, BTreeSet<usize>>,
	/// Snapshot of the variables referenced by every constraint already
	/// accounted for in [`Self::var_to_constraints`].
	constraint_vars: Vec<Vec<VarIndex>>,
	/// The value-encoding cache: at most one literal per (variable, value)
	/// pair. Ordered for deterministic iteration.
	encoding: BTreeMap<(VarIndex, IntVal), VarRef>,
	/// Cache of reified precedence literals.
	precedence_cache: BTreeMap<PrecedenceKey, VarRef>,
	/// Linear objective terms, keyed by variable.
	objective: BTreeMap<VarIndex, IntVal>,
	/// Constant offset of the objective.
	objective_offset: IntVal,
	/// Variables whose value will be reconstructed by the mapping model.
	removed_variables: BTreeSet<VarIndex>,
	/// Named counters tracking which rewrites fired.
	rule_stats: BTreeMap<String, usize>,
	/// The configuration of the expansion stage.
	params: Params,
	/// Lazily created literal that is always true.
	true_literal: Option<VarRef>,
	/// Whether the model has been found unsatisfiable.
	unsat: bool,
	/// One-shot flag recording that expansion has run.
	expanded: bool,
}

impl Default for Params {
	fn default() -> Self {
		Self {
			disable_constraint_expansion: false,
			expand_reservoir_constraints: true,
			expand_alldiff_constraints: false,
			encode_complex_linear_constraint_with_integer: false,
			detect_table_with_cost: false,
			table_compression_level: 2,
			cp_model_presolve: true,
			enumerate_all_solutions: false,
		}
	}
}

impl Params {
	/// Get whether the main presolve runs after expansion.
	pub fn cp_model_presolve(&self) -> bool {
		self.cp_model_presolve
	}

	/// Get whether table columns carrying only a cost are detected.
	pub fn detect_table_with_cost(&self) -> bool {
		self.detect_table_with_cost
	}

	/// Get whether constraint expansion is disabled.
	pub fn disable_constraint_expansion(&self) -> bool {
		self.disable_constraint_expansion
	}

	/// Get whether complex linear constraints are rewritten with a slack
	/// variable.
	pub fn encode_complex_linear_constraint_with_integer(&self) -> bool {
		self.encode_complex_linear_constraint_with_integer
	}

	/// Get whether all solutions will be enumerated.
	pub fn enumerate_all_solutions(&self) -> bool {
		self.enumerate_all_solutions
	}

	/// Get whether all-different constraints are always expanded.
	pub fn expand_alldiff_constraints(&self) -> bool {
		self.expand_alldiff_constraints
	}

	/// Get whether reservoir constraints are expanded.
	pub fn expand_reservoir_constraints(&self) -> bool {
		self.expand_reservoir_constraints
	}

	/// Get the table compression level.
	pub fn table_compression_level(&self) -> u8 {
		self.table_compression_level
	}

	/// Change whether the main presolve runs after expansion.
	pub fn with_cp_model_presolve(mut self, value: bool) -> Self {
		self.cp_model_presolve = value;
		self
	}

	/// Change whether table columns carrying only a cost are detected.
	pub fn with_detect_table_with_cost(mut self, value: bool) -> Self {
		self.detect_table_with_cost = value;
		self
	}

	/// Change whether constraint expansion is disabled.
	pub fn with_disable_constraint_expansion(mut self, value: bool) -> Self {
		self.disable_constraint_expansion = value;
		self
	}

	/// Change whether complex linear constraints are rewritten with a slack
	/// variable.
	pub fn with_encode_complex_linear_constraint_with_integer(mut self, value: bool) -> Self {
		self.encode_complex_linear_constraint_with_integer = value;
		self
	}

	/// Change whether all solutions will be enumerated.
	pub fn with_enumerate_all_solutions(mut self, value: bool) -> Self {
		self.enumerate_all_solutions = value;
		self
	}

	/// Change whether all-different constraints are always expanded.
	pub fn with_expand_alldiff_constraints(mut self, value: bool) -> Self {
		self.expand_alldiff_constraints = value;
		self
	}

	/// Change whether reservoir constraints are expanded.
	pub fn with_expand_reservoir_constraints(mut self, value: bool) -> Self {
		self.expand_reservoir_constraints = value;
		self
	}

	/// Change the table compression level.
	pub fn with_table_compression_level(mut self, value: u8) -> Self {
		debug_assert!(value <= 3);
		self.table_compression_level = value;
		self
	}
}

impl PresolveContext {
	/// Create a context for the given model, validating that every constraint
	/// only references existing variables.
	pub fn new(model: Model, params: Params) -> Result<Self, ModelError> {
		model.validate()?;
		let domains: IndexVec<VarIndex, Domain> =
			model.variables.iter().map(|v| v.domain.clone()).collect();
		let var_to_constraints = model.variables.iter().map(|_| BTreeSet::new()).collect();
		let mut ctx = Self {
			working_model: model,
			mapping_model: Vec::new(),
			domains,
			var_to_constraints,
			constraint_vars: Vec::new(),
			encoding: BTreeMap::new(),
			precedence_cache: BTreeMap::new(),
			objective: BTreeMap::new(),
			objective_offset: 0,
			removed_variables: BTreeSet::new(),
			rule_stats: BTreeMap::new(),
			params,
			true_literal: None,
			unsat: false,
			expanded: false,
		};
		ctx.update_new_constraints_variable_usage();
		Ok(ctx)
	}

	/// Append a constraint record to the working model, returning its index.
	///
	/// The variable to constraint incidence is not updated; the driver calls
	/// [`Self::update_new_constraints_variable_usage`] after every rewrite.
	pub fn add_constraint(&mut self, record: ConstraintRecord) -> usize {
		self.working_model.add_constraint(record)
	}

	/// Add the clause `a => b`.
	pub fn add_implication(&mut self, a: VarRef, b: VarRef) {
		let _ = self.add_constraint(ConstraintRecord::new(Constraint::BoolOr(vec![!a, b])));
	}

	/// Add the enforced domain restriction `lit => r in domain`.
	pub fn add_imply_in_domain(&mut self, lit: VarRef, r: VarRef, domain: Domain) {
		let domain = if r.is_positive() {
			domain
		} else {
			domain.negation()
		};
		let mut lin = LinearConstraint::new(domain);
		lin.vars.push(r.positive());
		lin.coeffs.push(1);
		let _ = self.add_constraint(ConstraintRecord::enforced(
			vec![lit],
			Constraint::Linear(lin),
		));
	}

	/// Add `cost` to the objective whenever `lit` is true. A negated
	/// reference folds into a negated coefficient plus a constant offset.
	pub fn add_literal_to_objective(&mut self, lit: VarRef, cost: IntVal) {
		let var = lit.var();
		let coeff = self.objective.entry(var).or_insert(0);
		if lit.is_positive() {
			*coeff = cap_add(*coeff, cost);
		} else {
			*coeff = cap_add(*coeff, -cost);
			self.objective_offset = cap_add(self.objective_offset, cost);
		}
		if *coeff == 0 {
			let _ = self.objective.remove(&var);
		}
	}

	/// Append a constraint record to the mapping (postsolve) model.
	pub fn add_mapping_constraint(&mut self, record: ConstraintRecord) {
		self.mapping_model.push(record);
	}

	/// Add a constant to the objective offset.
	pub fn add_to_objective_offset(&mut self, value: IntVal) {
		self.objective_offset = cap_add(self.objective_offset, value);
	}

	/// Clear the reified precedence cache.
	pub fn clear_precedence_cache(&mut self) {
		self.precedence_cache.clear();
	}

	/// The current domain of the referenced variable. For a negated
	/// reference, the negation of the variable's domain.
	pub fn domain_of(&self, r: VarRef) -> Domain {
		let domain = &self.domains[r.var()];
		if r.is_positive() {
			domain.clone()
		} else {
			domain.negation()
		}
	}

	/// A superset of the values a linear expression can take.
	pub fn domain_super_set_of(&self, expr: &LinearExpr) -> Domain {
		let mut result = Domain::constant(expr.offset);
		for (&r, &coeff) in expr.vars.iter().zip(&expr.coeffs) {
			result = result.addition_with(&self.domain_of(r).multiplication_by(coeff));
		}
		result
	}

	/// Whether the given linear expression can take the given value. Exact
	/// for expressions over at most one variable, a superset check otherwise.
	pub fn expr_contains(&self, expr: &LinearExpr, value: IntVal) -> bool {
		match expr.vars.len() {
			0 => expr.offset == value,
			1 => {
				let rest = value - expr.offset;
				let coeff = expr.coeffs[0];
				if coeff == 0 {
					return rest == 0;
				}
				rest % coeff == 0 && self.ref_contains(expr.vars[0], rest / coeff)
			}
			_ => self.domain_super_set_of(expr).contains(value),
		}
	}

	/// Whether every variable of the expression is fixed.
	pub fn expr_is_fixed(&self, expr: &LinearExpr) -> bool {
		expr.vars.iter().all(|r| self.domains[r.var()].is_fixed())
	}

	/// The value of a fixed linear expression.
	pub fn expr_fixed_value(&self, expr: &LinearExpr) -> IntVal {
		debug_assert!(self.expr_is_fixed(expr));
		let mut result = expr.offset;
		for (&r, &coeff) in expr.vars.iter().zip(&expr.coeffs) {
			result = cap_add(result, cap_mul(coeff, self.ref_fixed_value(r)));
		}
		result
	}

	/// The largest value a linear expression can take.
	pub fn expr_max(&self, expr: &LinearExpr) -> IntVal {
		let mut result = expr.offset;
		for (&r, &coeff) in expr.vars.iter().zip(&expr.coeffs) {
			let bound = if coeff >= 0 {
				self.ref_max(r)
			} else {
				self.ref_min(r)
			};
			result = cap_add(result, cap_mul(coeff, bound));
		}
		result
	}

	/// The smallest value a linear expression can take.
	pub fn expr_min(&self, expr: &LinearExpr) -> IntVal {
		let mut result = expr.offset;
		for (&r, &coeff) in expr.vars.iter().zip(&expr.coeffs) {
			let bound = if coeff >= 0 {
				self.ref_min(r)
			} else {
				self.ref_max(r)
			};
			result = cap_add(result, cap_mul(coeff, bound));
		}
		result
	}

	/// If the expression is a Boolean literal (possibly negated), return that
	/// literal.
	pub fn expression_is_a_literal(&self, expr: &LinearExpr) -> Option<VarRef> {
		if expr.vars.len() != 1 {
			return None;
		}
		let r = expr.vars[0];
		let domain = &self.domains[r.var()];
		if domain.min() < 0 || domain.max() > 1 {
			return None;
		}
		let var = VarRef::from(r.var());
		match (r.is_positive(), expr.coeffs[0], expr.offset) {
			// b and 1 - b.
			(true, 1, 0) => Some(var),
			(true, -1, 1) => Some(!var),
			// The reference evaluates to -b, so -1 * -b and 1 + -b.
			(false, -1, 0) => Some(var),
			(false, 1, 1) => Some(!var),
			_ => None,
		}
	}

	/// Get the literal `L(expr = value)` for an affine expression over at
	/// most one variable, creating it if needed.
	pub fn get_or_create_affine_value_encoding(
		&mut self,
		expr: &LinearExpr,
		value: IntVal,
	) -> VarRef {
		debug_assert!(expr.vars.len() <= 1);
		if expr.is_constant() {
			return if expr.offset == value {
				self.get_true_literal()
			} else {
				self.get_false_literal()
			};
		}
		let rest = value - expr.offset;
		let coeff = expr.coeffs[0];
		if coeff == 0 {
			return if rest == 0 {
				self.get_true_literal()
			} else {
				self.get_false_literal()
			};
		}
		if rest % coeff != 0 {
			return self.get_false_literal();
		}
		self.get_or_create_var_value_encoding(expr.vars[0], rest / coeff)
	}

	/// Get the canonical literal `L(r = value)`, creating it and the
	/// constraints binding it to the equality if needed.
	pub fn get_or_create_var_value_encoding(&mut self, r: VarRef, value: IntVal) -> VarRef {
		let (var, value) = Self::canonicalize_encoding(r, value);
		let domain = self.domains[var].clone();
		if !domain.contains(value) {
			return self.get_false_literal();
		}
		if let Some(&lit) = self.encoding.get(&(var, value)) {
			return lit;
		}
		if let Some(fixed) = domain.value() {
			debug_assert_eq!(fixed, value);
			let lit = self.get_true_literal();
			let _ = self.encoding.insert((var, value), lit);
			return lit;
		}
		if domain.size() == 2 {
			let min = domain.min();
			let max = domain.max();
			// With two values a single literal suffices: reuse the literal of
			// the other value if one exists, since its binding constraints
			// already pin down both values on the current domain.
			let lit = if let Some(&lit) = self.encoding.get(&(var, max)) {
				lit
			} else if let Some(&lit) = self.encoding.get(&(var, min)) {
				!lit
			} else if min == 0 && max == 1 {
				// A Boolean variable is its own encoding literal.
				VarRef::from(var)
			} else {
				let lit = self.new_bool_var();
				self.add_imply_in_domain(lit, VarRef::from(var), Domain::constant(min));
				self.add_imply_in_domain(!lit, VarRef::from(var), Domain::constant(max));
				!lit
			};
			// The literal encodes the maximum; its negation the minimum.
			let _ = self.encoding.entry((var, min)).or_insert(!lit);
			let _ = self.encoding.entry((var, max)).or_insert(lit);
			return self.encoding[&(var, value)];
		}
		let lit = self.new_bool_var();
		self.add_imply_in_domain(lit, VarRef::from(var), Domain::constant(value));
		self.add_imply_in_domain(!lit, VarRef::from(var), Domain::constant(value).complement());
		let _ = self.encoding.insert((var, value), lit);
		lit
	}

	/// Get the reified precedence literal `p` such that `p` holds
	/// if-and-only-if both activity literals hold and `time_i <= time_j`.
	pub fn get_or_create_reified_precedence_literal(
		&mut self,
		time_i: &LinearExpr,
		time_j: &LinearExpr,
		active_i: VarRef,
		active_j: VarRef,
	) -> VarRef {
		let key = (time_i.clone(), time_j.clone(), active_i, active_j);
		if let Some(&lit) = self.precedence_cache.get(&key) {
			return lit;
		}
		let lit = self.new_bool_var();
		let _ = self.precedence_cache.insert(key, lit);

		// lit => time_i <= time_j.
		let mut less_eq = LinearConstraint::new(Domain::range(0, IntVal::MAX));
		less_eq.add_expr(time_j, 1);
		less_eq.add_expr(time_i, -1);
		let _ = self.add_constraint(ConstraintRecord::enforced(
			vec![lit],
			Constraint::Linear(less_eq),
		));

		// !lit and both events active => time_i > time_j.
		let mut greater = LinearConstraint::new(Domain::range(1, IntVal::MAX));
		greater.add_expr(time_i, 1);
		greater.add_expr(time_j, -1);
		let _ = self.add_constraint(ConstraintRecord::enforced(
			vec![!lit, active_i, active_j],
			Constraint::Linear(greater),
		));

		// The precedence only holds between active events.
		if !self.literal_is_true(active_i) {
			self.add_implication(lit, active_i);
		}
		if !self.literal_is_true(active_j) {
			self.add_implication(lit, active_j);
		}
		lit
	}

	/// Get a literal that is always false.
	pub fn get_false_literal(&mut self) -> VarRef {
		!self.get_true_literal()
	}

	/// Get a literal that is always true.
	pub fn get_true_literal(&mut self) -> VarRef {
		if let Some(lit) = self.true_literal {
			return lit;
		}
		let lit = VarRef::from(self.new_int_var(Domain::constant(1)));
		self.true_literal = Some(lit);
		lit
	}

	/// Look up the literal `L(r = value)` without creating it.
	pub fn has_var_value_encoding(&self, r: VarRef, value: IntVal) -> Option<VarRef> {
		let key = Self::canonicalize_encoding(r, value);
		self.encoding.get(&key).copied()
	}

	/// Bind `lit` as the canonical literal for `r = value`. When a canonical
	/// literal already exists the two literals are constrained to be equal;
	/// otherwise constraints binding `lit` to the equality are emitted.
	pub fn insert_var_value_encoding(&mut self, lit: VarRef, r: VarRef, value: IntVal) {
		let (var, value) = Self::canonicalize_encoding(r, value);
		if !self.domains[var].contains(value) {
			let _ = self.set_literal_to_false(lit);
			return;
		}
		if let Some(&existing) = self.encoding.get(&(var, value)) {
			if existing != lit {
				self.store_boolean_equality_relation(lit, existing);
			}
			return;
		}
		let _ = self.encoding.insert((var, value), lit);
		self.add_imply_in_domain(lit, VarRef::from(var), Domain::constant(value));
		self.add_imply_in_domain(!lit, VarRef::from(var), Domain::constant(value).complement());
	}

	/// Ensure new variables appended directly to the working model have a
	/// working domain and an incidence entry.
	pub fn initialize_new_domains(&mut self) {
		for i in self.domains.len()..self.working_model.variables.len() {
			let var = VarIndex::new(i);
			let _ = self.domains.push(self.working_model.variables[var].domain.clone());
			let _ = self.var_to_constraints.push(BTreeSet::new());
		}
	}

	/// Restrict the domain of the referenced variable to `domain`. Returns
	/// `false` when the result is empty, in which case the model has been
	/// marked unsatisfiable.
	pub fn intersect_domain_with(&mut self, r: VarRef, domain: &Domain) -> bool {
		let mut changed = false;
		self.intersect_domain_with_change(r, domain, &mut changed)
	}

	/// As [`Self::intersect_domain_with`], also reporting whether the domain
	/// shrank.
	pub fn intersect_domain_with_change(
		&mut self,
		r: VarRef,
		domain: &Domain,
		changed: &mut bool,
	) -> bool {
		let var = r.var();
		let domain = if r.is_positive() {
			domain.clone()
		} else {
			domain.negation()
		};
		let result = self.domains[var].intersection(&domain);
		if result.is_empty() {
			self.notify_that_model_is_unsat("empty domain after intersection");
			return false;
		}
		if result != self.domains[var] {
			*changed = true;
			self.domains[var] = result;
		}
		true
	}

	/// Restrict an affine expression over at most one variable to take a
	/// value in `domain`.
	pub fn intersect_expr_domain_with(&mut self, expr: &LinearExpr, domain: &Domain) -> bool {
		debug_assert!(expr.vars.len() <= 1);
		if expr.is_constant() {
			if domain.contains(expr.offset) {
				return true;
			}
			self.notify_that_model_is_unsat("constant expression outside admitted domain");
			return false;
		}
		let shifted = domain.addition_with(&Domain::constant(-expr.offset));
		let values = shifted.inverse_multiplication_by(expr.coeffs[0]);
		self.intersect_domain_with(expr.vars[0], &values)
	}

	/// Whether every value in the domain of the expression's variable has an
	/// encoding literal. Constant expressions are trivially fully encoded.
	pub fn is_fully_encoded(&self, expr: &LinearExpr) -> bool {
		debug_assert!(expr.vars.len() <= 1);
		if expr.is_constant() {
			return true;
		}
		let var = expr.vars[0].var();
		let domain = &self.domains[var];
		let mut count: IntVal = 0;
		for ((_, value), _) in self.encoding.range((var, IntVal::MIN)..=(var, IntVal::MAX)) {
			if domain.contains(*value) {
				count += 1;
			}
		}
		count >= domain.size()
	}

	/// Whether the literal is known to be false.
	pub fn literal_is_false(&self, lit: VarRef) -> bool {
		self.literal_is_true(!lit)
	}

	/// Whether the literal is known to be true.
	pub fn literal_is_true(&self, lit: VarRef) -> bool {
		let target = if lit.is_positive() { 1 } else { 0 };
		self.domains[lit.var()].value() == Some(target)
	}

	/// Record that the value of a variable will be reconstructed from the
	/// mapping model.
	pub fn mark_variable_as_removed(&mut self, r: VarRef) {
		let _ = self.removed_variables.insert(r.var());
	}

	/// Whether the model has been expanded before.
	pub fn model_is_expanded(&self) -> bool {
		self.expanded
	}

	/// Whether the model has been found unsatisfiable.
	pub fn model_is_unsat(&self) -> bool {
		self.unsat
	}

	/// Create a new Boolean variable and return its positive reference.
	pub fn new_bool_var(&mut self) -> VarRef {
		VarRef::from(self.new_int_var(Domain::range(0, 1)))
	}

	/// Create a new integer variable with the given domain.
	pub fn new_int_var(&mut self, domain: Domain) -> VarIndex {
		let var = self.working_model.new_var(domain.clone());
		let pushed = self.domains.push(domain);
		debug_assert_eq!(var, pushed);
		let _ = self.var_to_constraints.push(BTreeSet::new());
		var
	}

	/// Record that expansion has run on this model.
	pub fn notify_that_model_is_expanded(&mut self) {
		self.expanded = true;
	}

	/// Mark the model as unsatisfiable.
	pub fn notify_that_model_is_unsat(&mut self, msg: &str) {
		if !self.unsat {
			debug!("model is unsat: {msg}");
			self.unsat = true;
		}
	}

	/// The linear objective terms, keyed by variable.
	pub fn objective_map(&self) -> &BTreeMap<VarIndex, IntVal> {
		&self.objective
	}

	/// The constant offset of the objective.
	pub fn objective_offset(&self) -> IntVal {
		self.objective_offset
	}

	/// The configuration of the expansion stage.
	pub fn params(&self) -> &Params {
		&self.params
	}

	/// Whether the referenced variable can take the given value.
	pub fn ref_contains(&self, r: VarRef, value: IntVal) -> bool {
		if r.is_positive() {
			self.domains[r.var()].contains(value)
		} else {
			self.domains[r.var()].contains(-value)
		}
	}

	/// The fixed value of the referenced variable.
	pub fn ref_fixed_value(&self, r: VarRef) -> IntVal {
		debug_assert!(self.ref_is_fixed(r));
		if r.is_positive() {
			self.domains[r.var()].min()
		} else {
			-self.domains[r.var()].min()
		}
	}

	/// Whether the referenced variable is fixed to a single value.
	pub fn ref_is_fixed(&self, r: VarRef) -> bool {
		self.domains[r.var()].is_fixed()
	}

	/// The largest value the referenced variable can take.
	pub fn ref_max(&self, r: VarRef) -> IntVal {
		if r.is_positive() {
			self.domains[r.var()].max()
		} else {
			-self.domains[r.var()].min()
		}
	}

	/// The smallest value the referenced variable can take.
	pub fn ref_min(&self, r: VarRef) -> IntVal {
		if r.is_positive() {
			self.domains[r.var()].min()
		} else {
			-self.domains[r.var()].max()
		}
	}

	/// Remove the referenced variable from the objective.
	pub fn remove_variable_from_objective(&mut self, r: VarRef) {
		let _ = self.objective.remove(&r.var());
	}

	/// The named counters tracking which rewrites fired.
	pub fn rule_stats(&self) -> &BTreeMap<String, usize> {
		&self.rule_stats
	}

	/// Force a literal to be false. Returns `false` when this makes the
	/// model unsatisfiable.
	pub fn set_literal_to_false(&mut self, lit: VarRef) -> bool {
		let value = if lit.is_positive() { 0 } else { 1 };
		self.intersect_domain_with(VarRef::from(lit.var()), &Domain::constant(value))
	}

	/// Record that two literals must take the same truth value.
	pub fn store_boolean_equality_relation(&mut self, a: VarRef, b: VarRef) {
		if a == b {
			return;
		}
		if a == !b {
			self.notify_that_model_is_unsat("literal equated to its negation");
			return;
		}
		self.add_implication(a, b);
		self.add_implication(b, a);
	}

	/// Increment the named rewrite counter.
	pub fn update_rule_stats(&mut self, name: &str) {
		*self.rule_stats.entry(name.to_string()).or_default() += 1;
	}

	/// Recompute the incidence entries of the constraint at index `c`.
	pub fn update_constraint_variable_usage(&mut self, c: usize) {
		debug_assert!(c < self.constraint_vars.len());
		for var in std::mem::take(&mut self.constraint_vars[c]) {
			let _ = self.var_to_constraints[var].remove(&c);
		}
		let vars = self.working_model.constraints[c].referenced_variables();
		for &var in &vars {
			let _ = self.var_to_constraints[var].insert(c);
		}
		self.constraint_vars[c] = vars;
	}

	/// Add incidence entries for constraints appended since the last call.
	pub fn update_new_constraints_variable_usage(&mut self) {
		for c in self.constraint_vars.len()..self.working_model.constraints.len() {
			let vars = self.working_model.constraints[c].referenced_variables();
			for &var in &vars {
				let _ = self.var_to_constraints[var].insert(c);
			}
			self.constraint_vars.push(vars);
		}
	}

	/// The indexes of the constraints referencing the given variable.
	pub fn var_to_constraints(&self, var: VarIndex) -> impl Iterator<Item = usize> + '_ {
		self.var_to_constraints[var].iter().copied()
	}

	/// Whether the variable appears in exactly one constraint and not in the
	/// objective, so that it can be removed once that constraint captures its
	/// semantics in the mapping model.
	pub fn variable_is_unique_and_removable(&self, r: VarRef) -> bool {
		let var = r.var();
		!self.params.enumerate_all_solutions
			&& !self.removed_variables.contains(&var)
			&& !self.objective.contains_key(&var)
			&& self.var_to_constraints[var].len() == 1
	}

	/// Whether the variable appears in exactly one constraint and in the
	/// objective, so that its cost can be transferred before removal.
	pub fn variable_with_cost_is_unique_and_removable(&self, r: VarRef) -> bool {
		let var = r.var();
		!self.params.enumerate_all_solutions
			&& !self.removed_variables.contains(&var)
			&& self.objective.contains_key(&var)
			&& self.var_to_constraints[var].len() == 1
	}

	/// Write the working domains back into the variable records.
	pub(crate) fn write_domains_to_model(&mut self) {
		for (var, domain) in self.domains.iter_enumerated() {
			self.working_model.variables[var].domain = domain.clone();
		}
	}

	/// Canonical cache key for the encoding of `r = value`.
	fn canonicalize_encoding(r: VarRef, value: IntVal) -> (VarIndex, IntVal) {
		if r.is_positive() {
			(r.var(), value)
		} else {
			(r.var(), -value)
		}
	}
}
