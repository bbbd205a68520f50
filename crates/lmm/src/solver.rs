//! The boundary between the kernel and a fairness solver.

use ressim_types::{ActionId, ResourceId};

slotmap::new_key_type! {
    /// Handle to a capacity constraint.
    pub struct ConstraintId;

    /// Handle to a rate variable.
    pub struct VariableId;
}

/// How consumptions on one constraint combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SharingPolicy {
    /// Sum of consumptions must stay under the bound.
    #[default]
    Shared,
    /// Each consumption is bounded on its own ("fat pipe").
    FatPipe,
}

/// A linear max-min fairness solver.
///
/// Constraints model resource capacities; variables model action rates.
/// A variable is expanded against one or more constraints with a
/// consumption coefficient. After [`solve`](FairnessSolver::solve):
///
/// - no constraint is oversubscribed,
/// - every variable respects its own bound,
/// - among variables sharing a bottleneck, rates are max-min fair,
///   scaled by `1 / weight`.
///
/// A weight of zero disables a variable without removing it: its value is
/// forced to zero and it takes no part in sharing.
pub trait FairnessSolver {
    /// Create a constraint of capacity `bound` owned by a resource.
    fn constraint_new(
        &mut self,
        owner: ResourceId,
        bound: f64,
        sharing: SharingPolicy,
    ) -> ConstraintId;

    /// Destroy a constraint, detaching every variable expanded on it.
    fn constraint_free(&mut self, cnst: ConstraintId);

    /// Create a variable owned by an action.
    ///
    /// # Arguments
    ///
    /// * `weight` - sharing weight; zero disables the variable
    /// * `bound` - hard cap on the value; `<= 0` means unbounded
    /// * `number_of_constraints` - expected expansions, used as a capacity hint
    fn variable_new(
        &mut self,
        owner: ActionId,
        weight: f64,
        bound: f64,
        number_of_constraints: usize,
    ) -> VariableId;

    /// Destroy a variable and its expansions.
    fn variable_free(&mut self, var: VariableId);

    /// Bind `var` to `cnst` with a consumption coefficient.
    fn expand(&mut self, cnst: ConstraintId, var: VariableId, consumption: f64);

    /// Like [`expand`](FairnessSolver::expand), but merge into an existing
    /// binding of `var` on `cnst` if there is one.
    fn expand_add(&mut self, cnst: ConstraintId, var: VariableId, consumption: f64);

    fn update_variable_weight(&mut self, var: VariableId, weight: f64);

    fn update_variable_bound(&mut self, var: VariableId, bound: f64);

    fn update_constraint_bound(&mut self, cnst: ConstraintId, bound: f64);

    /// Recompute rates.
    ///
    /// # Returns
    ///
    /// Owners of every variable whose value was recomputed, in a
    /// deterministic order. Empty when nothing changed since the last solve.
    fn solve(&mut self) -> Vec<ActionId>;

    /// Current assigned rate of a variable.
    fn variable_value(&self, var: VariableId) -> f64;

    fn variable_weight(&self, var: VariableId) -> f64;

    fn variable_bound(&self, var: VariableId) -> f64;

    fn variable_owner(&self, var: VariableId) -> ActionId;

    /// Constraints `var` is expanded on.
    fn variable_constraints(&self, var: VariableId) -> Vec<ConstraintId>;

    /// Variables expanded on `cnst`, without duplicates.
    fn constraint_variables(&self, cnst: ConstraintId) -> Vec<VariableId>;

    fn constraint_bound(&self, cnst: ConstraintId) -> f64;

    fn constraint_owner(&self, cnst: ConstraintId) -> ResourceId;

    /// Load currently placed on a constraint by enabled variables.
    fn constraint_usage(&self, cnst: ConstraintId) -> f64;
}
