//! The in-memory representation of a problem during presolve: integer
//! variables with domains, linear expressions, and the tagged constraint
//! records that the expansion stage rewrites.

use index_vec::IndexVec;
use thiserror::Error;

use crate::{
	domain::Domain,
	helpers::{cap_mul, cap_sub},
	IntVal, VarIndex, VarRef,
};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// The `all_different` constraint: all affine expressions must take pairwise
/// distinct values.
pub struct AllDifferent {
	/// The expressions that must take distinct values.
	pub exprs: Vec<LinearExpr>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// The `automaton` constraint: the sequence of values taken by `vars` must
/// form a word accepted by the given finite automaton.
pub struct Automaton {
	/// The sequence of variables labelling the transitions taken.
	pub vars: Vec<VarRef>,
	/// The state the automaton starts in.
	pub starting_state: IntVal,
	/// The states in which the automaton must finish.
	pub final_states: Vec<IntVal>,
	/// The labelled transitions of the automaton.
	pub transitions: Vec<Transition>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// The `circuit` constraint over a graph of arc literals.
pub struct Circuit {
	/// Tail node of each arc.
	pub tails: Vec<IntVal>,
	/// Head node of each arc.
	pub heads: Vec<IntVal>,
	/// Literal deciding whether each arc is taken.
	pub literals: Vec<VarRef>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// A tagged union over the high-level constraint kinds that can appear in a
/// [`Model`].
///
/// Expansion clears a rewritten record by replacing its payload with
/// [`Constraint::Dummy`]; records are never physically removed, downstream
/// passes compact the list.
pub enum Constraint {
	/// At least one of the literals must be true.
	BoolOr(Vec<VarRef>),
	/// All of the literals must be true.
	BoolAnd(Vec<VarRef>),
	/// At most one of the literals may be true.
	AtMostOne(Vec<VarRef>),
	/// Exactly one of the literals must be true.
	ExactlyOne(Vec<VarRef>),
	/// An odd number of the literals must be true.
	BoolXor(Vec<VarRef>),
	/// A linear expression must take a value in a domain.
	Linear(LinearConstraint),
	/// The target expression is the product of the operand expressions.
	IntProd(LinearArgument),
	/// The target expression is the quotient of the operand expressions.
	IntDiv(LinearArgument),
	/// The target expression is the first operand modulo the second.
	IntMod(LinearArgument),
	/// The target expression is the maximum of the operand expressions.
	LinMax(LinearArgument),
	/// All expressions take pairwise distinct values.
	AllDiff(AllDifferent),
	/// An array access: `vars[index] == target`.
	Element(Element),
	/// Two arrays of variables are inverse permutations of each other.
	Inverse(Inverse),
	/// The variable sequence spells a word accepted by an automaton.
	Automaton(Automaton),
	/// The variable tuple is (not) one of a set of allowed tuples.
	Table(Table),
	/// A running sum of event level changes stays within bounds.
	Reservoir(Reservoir),
	/// The selected arcs form a Hamiltonian circuit.
	Circuit(Circuit),
	/// The selected arcs form vehicle routes.
	Routes(Routes),
	/// A scheduling interval with start, size, and end expressions.
	Interval(Interval),
	/// The given intervals must not overlap.
	NoOverlap(NoOverlap),
	/// The given rectangles must not overlap.
	NoOverlap2D(NoOverlap2D),
	/// The demand-weighted intervals must not exceed a capacity.
	Cumulative(Cumulative),
	/// A cleared constraint without semantics.
	Dummy,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// A constraint payload together with its enforcement literals: the
/// constraint applies only when all enforcement literals are true.
pub struct ConstraintRecord {
	/// Literals that must all be true for the constraint to apply.
	pub enforcement: Vec<VarRef>,
	/// The constraint payload.
	pub constraint: Constraint,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// The `cumulative` constraint over intervals with demands.
pub struct Cumulative {
	/// The capacity that the sum of active demands may not exceed.
	pub capacity: LinearExpr,
	/// Indexes of the interval constraints being scheduled.
	pub intervals: Vec<usize>,
	/// The demand of each interval.
	pub demands: Vec<LinearExpr>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// The `element` constraint: `vars[index] == target`.
pub struct Element {
	/// The variable selecting the array position.
	pub index: VarRef,
	/// The variable holding the selected value.
	pub target: VarRef,
	/// The array of variables being indexed, zero based.
	pub vars: Vec<VarRef>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// A scheduling interval; only its expressions are relevant to expansion.
pub struct Interval {
	/// Start time of the interval.
	pub start: LinearExpr,
	/// Duration of the interval.
	pub size: LinearExpr,
	/// End time of the interval.
	pub end: LinearExpr,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// The `inverse` constraint: `f_direct[i] == j` if-and-only-if
/// `f_inverse[j] == i`.
pub struct Inverse {
	/// The direct function, as an array of variables.
	pub f_direct: Vec<VarRef>,
	/// The inverse function, as an array of variables.
	pub f_inverse: Vec<VarRef>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// The shared payload of the arithmetic target constraints (`int_prod`,
/// `int_div`, `int_mod`, and `lin_max`).
pub struct LinearArgument {
	/// The expression constrained to equal the operation's result.
	pub target: LinearExpr,
	/// The operand expressions.
	pub exprs: Vec<LinearExpr>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// A linear expression equated to a domain: the weighted sum of the
/// referenced variables must take a value in `domain`.
///
/// Variable references in the term list are positive; Boolean literals are
/// folded into coefficient signs and domain offsets by
/// [`LinearConstraint::add_literal_term`].
pub struct LinearConstraint {
	/// The referenced variables.
	pub vars: Vec<VarRef>,
	/// The coefficient of each referenced variable.
	pub coeffs: Vec<IntVal>,
	/// The set of admitted sums.
	pub domain: Domain,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// A weighted sum of variable references plus a constant offset.
///
/// A negated reference evaluates to the negated value of its variable.
pub struct LinearExpr {
	/// The referenced variables.
	pub vars: Vec<VarRef>,
	/// The coefficient of each referenced variable.
	pub coeffs: Vec<IntVal>,
	/// The constant offset of the expression.
	pub offset: IntVal,
}

#[derive(Clone, Debug, Default)]
/// A problem instance: an indexed list of variables and an append-only list
/// of constraint records.
pub struct Model {
	/// The definitions of the integer variables of the model.
	pub variables: IndexVec<VarIndex, VariableDef>,
	/// The constraints of the model, in posting order.
	pub constraints: Vec<ConstraintRecord>,
}

#[derive(Error, Debug, PartialEq, Eq)]
/// Structural error found when validating a [`Model`] before expansion.
pub enum ModelError {
	#[error("constraint {constraint} has mismatched term or argument lengths")]
	/// A constraint carries parallel lists of different lengths.
	ArityMismatch {
		/// Index of the offending constraint.
		constraint: usize,
	},
	#[error("constraint {constraint} references undefined variable {variable}")]
	/// A constraint references a variable that does not exist.
	UndefinedVariable {
		/// Index of the offending constraint.
		constraint: usize,
		/// Index of the missing variable.
		variable: usize,
	},
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// The `no_overlap` constraint over a set of intervals.
pub struct NoOverlap {
	/// Indexes of the interval constraints that may not overlap.
	pub intervals: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// The `no_overlap_2d` constraint over sets of rectangle sides.
pub struct NoOverlap2D {
	/// Indexes of the interval constraints of the horizontal sides.
	pub x_intervals: Vec<usize>,
	/// Indexes of the interval constraints of the vertical sides.
	pub y_intervals: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// The `reservoir` constraint: at every time point, the sum of the level
/// changes of the active events at-or-before that point stays within the
/// level bounds.
pub struct Reservoir {
	/// The time at which each event takes place.
	pub time_exprs: Vec<LinearExpr>,
	/// The level change contributed by each event.
	pub level_changes: Vec<LinearExpr>,
	/// Literal deciding whether each event is active. When empty, all events
	/// are active.
	pub active_literals: Vec<VarRef>,
	/// The minimum reservoir level.
	pub min_level: IntVal,
	/// The maximum reservoir level.
	pub max_level: IntVal,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// The `routes` constraint over a graph of arc literals.
pub struct Routes {
	/// Tail node of each arc.
	pub tails: Vec<IntVal>,
	/// Head node of each arc.
	pub heads: Vec<IntVal>,
	/// Literal deciding whether each arc is taken.
	pub literals: Vec<VarRef>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// The `table` constraint: the values taken by `vars` must (or, when
/// `negated`, must not) form one of the listed tuples.
pub struct Table {
	/// The variables constrained by the table.
	pub vars: Vec<VarRef>,
	/// The allowed (or forbidden) tuples of values.
	pub tuples: Vec<Vec<IntVal>>,
	/// Whether the listed tuples are forbidden rather than allowed.
	pub negated: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
/// A labelled transition of an [`Automaton`].
pub struct Transition {
	/// The state the transition leaves from.
	pub tail: IntVal,
	/// The label that must be taken to use the transition.
	pub label: IntVal,
	/// The state the transition arrives in.
	pub head: IntVal,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// Definition of an integer variable in a [`Model`].
pub struct VariableDef {
	/// The set of possible values that the variable can take.
	pub domain: Domain,
}

impl Constraint {
	/// Whether this is the payload of a cleared constraint.
	pub fn is_dummy(&self) -> bool {
		matches!(self, Constraint::Dummy)
	}
}

impl ConstraintRecord {
	/// Clear the record: its semantics must have been captured by newly
	/// appended constraints.
	pub fn clear(&mut self) {
		self.constraint = Constraint::Dummy;
		self.enforcement.clear();
	}

	/// Create a record with the given enforcement literals.
	pub fn enforced(enforcement: Vec<VarRef>, constraint: Constraint) -> Self {
		Self {
			enforcement,
			constraint,
		}
	}

	/// Whether the record has been cleared.
	pub fn is_cleared(&self) -> bool {
		self.constraint.is_dummy()
	}

	/// Create an unconditional record.
	pub fn new(constraint: Constraint) -> Self {
		Self {
			enforcement: Vec::new(),
			constraint,
		}
	}

	/// The indexes of all variables referenced by the record, including its
	/// enforcement literals, in sorted order without duplicates.
	pub fn referenced_variables(&self) -> Vec<VarIndex> {
		/// Add the variables of a list of references.
		fn add_refs(out: &mut Vec<VarIndex>, refs: &[VarRef]) {
			out.extend(refs.iter().map(|r| r.var()));
		}
		/// Add the variables of a linear expression.
		fn add_expr(out: &mut Vec<VarIndex>, expr: &LinearExpr) {
			add_refs(out, &expr.vars);
		}
		/// Add the variables of a list of linear expressions.
		fn add_exprs(out: &mut Vec<VarIndex>, exprs: &[LinearExpr]) {
			for e in exprs {
				add_expr(out, e);
			}
		}

		let mut out = Vec::new();
		add_refs(&mut out, &self.enforcement);
		match &self.constraint {
			Constraint::BoolOr(lits)
			| Constraint::BoolAnd(lits)
			| Constraint::AtMostOne(lits)
			| Constraint::ExactlyOne(lits)
			| Constraint::BoolXor(lits) => add_refs(&mut out, lits),
			Constraint::Linear(lin) => add_refs(&mut out, &lin.vars),
			Constraint::IntProd(arg)
			| Constraint::IntDiv(arg)
			| Constraint::IntMod(arg)
			| Constraint::LinMax(arg) => {
				add_expr(&mut out, &arg.target);
				add_exprs(&mut out, &arg.exprs);
			}
			Constraint::AllDiff(all_diff) => add_exprs(&mut out, &all_diff.exprs),
			Constraint::Element(el) => {
				out.push(el.index.var());
				out.push(el.target.var());
				add_refs(&mut out, &el.vars);
			}
			Constraint::Inverse(inv) => {
				add_refs(&mut out, &inv.f_direct);
				add_refs(&mut out, &inv.f_inverse);
			}
			Constraint::Automaton(automaton) => add_refs(&mut out, &automaton.vars),
			Constraint::Table(table) => add_refs(&mut out, &table.vars),
			Constraint::Reservoir(reservoir) => {
				add_exprs(&mut out, &reservoir.time_exprs);
				add_exprs(&mut out, &reservoir.level_changes);
				add_refs(&mut out, &reservoir.active_literals);
			}
			Constraint::Circuit(c) => add_refs(&mut out, &c.literals),
			Constraint::Routes(r) => add_refs(&mut out, &r.literals),
			Constraint::Interval(i) => {
				add_expr(&mut out, &i.start);
				add_expr(&mut out, &i.size);
				add_expr(&mut out, &i.end);
			}
			Constraint::NoOverlap(_) | Constraint::NoOverlap2D(_) => {}
			Constraint::Cumulative(c) => {
				add_expr(&mut out, &c.capacity);
				add_exprs(&mut out, &c.demands);
			}
			Constraint::Dummy => {}
		}
		out.sort_unstable();
		out.dedup();
		out
	}
}

impl LinearConstraint {
	/// Append a linear expression, scaled by `coeff`, to the constraint. The
	/// expression's constant offset is folded into the admitted domain, and
	/// negated references into negated coefficients.
	pub fn add_expr(&mut self, expr: &LinearExpr, coeff: IntVal) {
		for (&r, &c) in expr.vars.iter().zip(&expr.coeffs) {
			self.vars.push(r.positive());
			if r.is_positive() {
				self.coeffs.push(cap_mul(c, coeff));
			} else {
				self.coeffs.push(cap_sub(0, cap_mul(c, coeff)));
			}
		}
		if expr.offset != 0 {
			let shift = cap_mul(expr.offset, coeff);
			self.domain = self
				.domain
				.addition_with(&Domain::constant(cap_sub(0, shift)));
		}
	}

	/// Append a Boolean literal as a 0/1 term with the given coefficient. A
	/// negated reference is folded into a negated coefficient on the
	/// underlying variable plus a shift of the admitted domain.
	pub fn add_literal_term(&mut self, lit: VarRef, coeff: IntVal) {
		if lit.is_positive() {
			self.vars.push(lit);
			self.coeffs.push(coeff);
		} else {
			self.vars.push(lit.positive());
			self.coeffs.push(cap_sub(0, coeff));
			self.domain = self
				.domain
				.addition_with(&Domain::constant(cap_sub(0, coeff)));
		}
	}

	/// Create an empty linear constraint with the given admitted domain.
	pub fn new(domain: Domain) -> Self {
		Self {
			vars: Vec::new(),
			coeffs: Vec::new(),
			domain,
		}
	}
}

impl LinearExpr {
	/// Create a constant expression.
	pub fn constant(value: IntVal) -> Self {
		Self {
			vars: Vec::new(),
			coeffs: Vec::new(),
			offset: value,
		}
	}

	/// Create an expression consisting of a single reference.
	pub fn from_ref(r: VarRef) -> Self {
		Self::term(r, 1)
	}

	/// Whether the expression references no variables.
	pub fn is_constant(&self) -> bool {
		self.vars.is_empty()
	}

	/// Create an expression consisting of a single scaled reference.
	pub fn term(r: VarRef, coeff: IntVal) -> Self {
		Self {
			vars: vec![r],
			coeffs: vec![coeff],
			offset: 0,
		}
	}
}

impl Model {
	/// Append a constraint record, returning its index.
	pub fn add_constraint(&mut self, record: ConstraintRecord) -> usize {
		self.constraints.push(record);
		self.constraints.len() - 1
	}

	/// Create a new integer variable with the given domain.
	pub fn new_var(&mut self, domain: Domain) -> VarIndex {
		self.variables.push(VariableDef { domain })
	}

	/// Check that every variable reference in every constraint names an
	/// existing variable, and that parallel payload lists have matching
	/// lengths.
	pub fn validate(&self) -> Result<(), ModelError> {
		for (c, record) in self.constraints.iter().enumerate() {
			for var in record.referenced_variables() {
				if var.index() >= self.variables.len() {
					return Err(ModelError::UndefinedVariable {
						constraint: c,
						variable: var.index(),
					});
				}
			}
			let arity_ok = match &record.constraint {
				Constraint::Linear(lin) => lin.vars.len() == lin.coeffs.len(),
				Constraint::Table(table) => {
					table.tuples.iter().all(|t| t.len() == table.vars.len())
				}
				Constraint::Reservoir(res) => {
					res.time_exprs.len() == res.level_changes.len()
						&& (res.active_literals.is_empty()
							|| res.active_literals.len() == res.time_exprs.len())
				}
				Constraint::Inverse(inv) => inv.f_direct.len() == inv.f_inverse.len(),
				_ => true,
			};
			if !arity_ok {
				return Err(ModelError::ArityMismatch { constraint: c });
			}
		}
		Ok(())
	}
}
