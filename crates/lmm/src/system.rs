//! Max-min fairness system with selective update.

use crate::solver::{ConstraintId, FairnessSolver, SharingPolicy, VariableId};
use indexmap::IndexSet;
use ressim_types::{double_equals, double_positive, double_update, ActionId, ResourceId};
use slotmap::SlotMap;
use tracing::trace;

slotmap::new_key_type! {
    struct ElementId;
}

/// One expansion of a variable on a constraint.
#[derive(Debug)]
struct Element {
    constraint: ConstraintId,
    variable: VariableId,
    consumption: f64,
    /// Counted in the usage of its constraint during the current solve.
    active: bool,
}

#[derive(Debug)]
struct Constraint {
    owner: ResourceId,
    bound: f64,
    sharing: SharingPolicy,
    elements: IndexSet<ElementId>,
    remaining: f64,
    usage: f64,
}

#[derive(Debug)]
struct Variable {
    owner: ActionId,
    weight: f64,
    bound: f64,
    value: f64,
    elements: Vec<ElementId>,
    visited: u64,
    /// Value settled for the current solve.
    fixed: bool,
}

/// Max-min fairness solver.
///
/// With selective update enabled, only constraints reachable (through shared
/// variables) from something modified since the last solve are recomputed.
/// Without it every constraint is recomputed on each solve.
#[derive(Debug)]
pub struct MaxMinSystem {
    constraints: SlotMap<ConstraintId, Constraint>,
    variables: SlotMap<VariableId, Variable>,
    elements: SlotMap<ElementId, Element>,
    modified_constraints: IndexSet<ConstraintId>,
    selective_update: bool,
    modified: bool,
    visited_counter: u64,
    precision: f64,
}

impl MaxMinSystem {
    /// Create an empty system.
    pub fn new(selective_update: bool, precision: f64) -> Self {
        Self {
            constraints: SlotMap::with_key(),
            variables: SlotMap::with_key(),
            elements: SlotMap::with_key(),
            modified_constraints: IndexSet::new(),
            selective_update,
            modified: false,
            visited_counter: 1,
            precision,
        }
    }

    pub fn is_selective(&self) -> bool {
        self.selective_update
    }

    /// Whether something changed since the last solve.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    /// Mark `cnst` and everything connected to it through variables.
    fn update_modified_set(&mut self, cnst: ConstraintId) {
        if !self.selective_update || !self.modified_constraints.insert(cnst) {
            return;
        }

        let mut stack = vec![cnst];
        while let Some(current) = stack.pop() {
            for &eid in &self.constraints[current].elements {
                let vid = self.elements[eid].variable;
                let var = &mut self.variables[vid];
                if var.visited == self.visited_counter {
                    continue;
                }
                var.visited = self.visited_counter;
                for &other in &var.elements {
                    let other = self.elements[other].constraint;
                    if self.modified_constraints.insert(other) {
                        stack.push(other);
                    }
                }
            }
        }
    }

    fn update_modified_set_of_variable(&mut self, var: VariableId) {
        let first = self.variables[var]
            .elements
            .first()
            .map(|eid| self.elements[*eid].constraint);
        if let Some(cnst) = first {
            self.update_modified_set(cnst);
        }
    }

    fn remove_all_modified_set(&mut self) {
        self.visited_counter = self.visited_counter.wrapping_add(1);
        if self.visited_counter == 0 {
            for var in self.variables.values_mut() {
                var.visited = 0;
            }
            self.visited_counter = 1;
        }
        self.modified_constraints.clear();
    }

    fn has_pending_variables(&self, cnst: ConstraintId) -> bool {
        self.constraints[cnst].elements.iter().any(|eid| {
            let elem = &self.elements[*eid];
            elem.active && !self.variables[elem.variable].fixed
        })
    }

    /// Find the saturated constraints of this round and the variables they
    /// still have to fix.
    fn saturated_variables(&self, light: &[ConstraintId]) -> (f64, Vec<VariableId>) {
        let mut min_usage = f64::INFINITY;
        let mut saturated: Vec<ConstraintId> = Vec::new();
        for &cid in light {
            let cnst = &self.constraints[cid];
            let remaining_over_usage = cnst.remaining / cnst.usage;
            if saturated.is_empty() || remaining_over_usage < min_usage - self.precision {
                min_usage = remaining_over_usage;
                saturated.clear();
                saturated.push(cid);
            } else if double_equals(remaining_over_usage, min_usage, self.precision) {
                min_usage = min_usage.min(remaining_over_usage);
                saturated.push(cid);
            }
        }

        let mut variables: IndexSet<VariableId> = IndexSet::new();
        for cid in saturated {
            for &eid in &self.constraints[cid].elements {
                let elem = &self.elements[eid];
                let var = &self.variables[elem.variable];
                if elem.active && !var.fixed && var.weight > 0.0 {
                    variables.insert(elem.variable);
                }
            }
        }
        (min_usage, variables.into_iter().collect())
    }

    /// Account for a freshly fixed variable on every constraint it touches.
    fn release_variable(&mut self, vid: VariableId, light: &mut Vec<ConstraintId>) {
        let precision = self.precision;
        let value = self.variables[vid].value;
        let weight = self.variables[vid].weight;

        for &eid in &self.variables[vid].elements {
            let elem = &self.elements[eid];
            if !elem.active {
                continue;
            }
            let cid = elem.constraint;
            let consumption = elem.consumption;
            let cnst = &mut self.constraints[cid];
            match cnst.sharing {
                SharingPolicy::Shared => {
                    double_update(&mut cnst.remaining, consumption * value, cnst.bound * precision);
                    double_update(&mut cnst.usage, consumption / weight, precision);
                }
                SharingPolicy::FatPipe => {
                    cnst.usage = 0.0;
                    for &other in &cnst.elements {
                        let other = &self.elements[other];
                        let var = &self.variables[other.variable];
                        if other.active && !var.fixed && other.consumption > 0.0 {
                            cnst.usage = cnst.usage.max(other.consumption / var.weight);
                        }
                    }
                }
            }
            if !double_positive(cnst.usage, precision)
                || !double_positive(cnst.remaining, cnst.bound * precision)
            {
                light.retain(|c| *c != cid);
            }
        }
    }
}

impl FairnessSolver for MaxMinSystem {
    fn constraint_new(
        &mut self,
        owner: ResourceId,
        bound: f64,
        sharing: SharingPolicy,
    ) -> ConstraintId {
        self.constraints.insert(Constraint {
            owner,
            bound,
            sharing,
            elements: IndexSet::new(),
            remaining: 0.0,
            usage: 0.0,
        })
    }

    fn constraint_free(&mut self, cnst: ConstraintId) {
        let Some(constraint) = self.constraints.remove(cnst) else {
            return;
        };
        self.modified = true;
        self.modified_constraints.shift_remove(&cnst);

        let mut orphans = Vec::new();
        for eid in constraint.elements {
            if let Some(elem) = self.elements.remove(eid) {
                if let Some(var) = self.variables.get_mut(elem.variable) {
                    var.elements.retain(|e| *e != eid);
                    var.value = 0.0;
                    orphans.push(elem.variable);
                }
            }
        }
        for var in orphans {
            self.update_modified_set_of_variable(var);
        }
    }

    fn variable_new(
        &mut self,
        owner: ActionId,
        weight: f64,
        bound: f64,
        number_of_constraints: usize,
    ) -> VariableId {
        self.variables.insert(Variable {
            owner,
            weight,
            bound,
            value: 0.0,
            elements: Vec::with_capacity(number_of_constraints),
            visited: 0,
            fixed: false,
        })
    }

    fn variable_free(&mut self, var: VariableId) {
        if !self.variables.contains_key(var) {
            return;
        }
        self.modified = true;
        self.update_modified_set_of_variable(var);

        if let Some(variable) = self.variables.remove(var) {
            for eid in variable.elements {
                if let Some(elem) = self.elements.remove(eid) {
                    if let Some(cnst) = self.constraints.get_mut(elem.constraint) {
                        cnst.elements.shift_remove(&eid);
                    }
                }
            }
        }
    }

    fn expand(&mut self, cnst: ConstraintId, var: VariableId, consumption: f64) {
        self.modified = true;

        let eid = self.elements.insert(Element {
            constraint: cnst,
            variable: var,
            consumption,
            active: false,
        });
        self.constraints[cnst].elements.insert(eid);
        self.variables[var].elements.push(eid);

        self.update_modified_set(cnst);
        if self.variables[var].elements.len() > 1 {
            self.update_modified_set_of_variable(var);
        }
    }

    fn expand_add(&mut self, cnst: ConstraintId, var: VariableId, consumption: f64) {
        let existing = self.variables[var]
            .elements
            .iter()
            .copied()
            .find(|eid| self.elements[*eid].constraint == cnst);

        match existing {
            Some(eid) => {
                self.modified = true;
                let sharing = self.constraints[cnst].sharing;
                let elem = &mut self.elements[eid];
                match sharing {
                    SharingPolicy::Shared => elem.consumption += consumption,
                    SharingPolicy::FatPipe => elem.consumption = elem.consumption.max(consumption),
                }
                self.update_modified_set(cnst);
            }
            None => self.expand(cnst, var, consumption),
        }
    }

    fn update_variable_weight(&mut self, var: VariableId, weight: f64) {
        if self.variables[var].weight == weight {
            return;
        }
        self.modified = true;
        trace!(?var, weight, "Variable weight updated");

        let variable = &mut self.variables[var];
        variable.weight = weight;
        if weight <= 0.0 {
            variable.value = 0.0;
        }
        self.update_modified_set_of_variable(var);
    }

    fn update_variable_bound(&mut self, var: VariableId, bound: f64) {
        self.modified = true;
        self.variables[var].bound = bound;
        self.update_modified_set_of_variable(var);
    }

    fn update_constraint_bound(&mut self, cnst: ConstraintId, bound: f64) {
        self.modified = true;
        self.update_modified_set(cnst);
        self.constraints[cnst].bound = bound;
    }

    fn solve(&mut self) -> Vec<ActionId> {
        if !self.modified {
            return Vec::new();
        }
        let precision = self.precision;

        let cnst_list: Vec<ConstraintId> = if self.selective_update {
            self.modified_constraints.iter().copied().collect()
        } else {
            self.constraints.keys().collect()
        };

        for &cid in &cnst_list {
            for &eid in &self.constraints[cid].elements {
                let elem = &mut self.elements[eid];
                elem.active = false;
                let var = &mut self.variables[elem.variable];
                var.value = 0.0;
                var.fixed = true;
            }
        }

        let mut owners: IndexSet<ActionId> = IndexSet::new();
        let mut light: Vec<ConstraintId> = Vec::new();
        for &cid in &cnst_list {
            let cnst = &mut self.constraints[cid];
            cnst.remaining = cnst.bound;
            cnst.usage = 0.0;
            if !double_positive(cnst.remaining, cnst.bound * precision) {
                continue;
            }

            for &eid in &cnst.elements {
                let elem = &mut self.elements[eid];
                let var = &mut self.variables[elem.variable];
                if var.weight > 0.0 && elem.consumption > 0.0 {
                    let usage = elem.consumption / var.weight;
                    match cnst.sharing {
                        SharingPolicy::Shared => cnst.usage += usage,
                        SharingPolicy::FatPipe => cnst.usage = cnst.usage.max(usage),
                    }
                    elem.active = true;
                    var.fixed = false;
                    owners.insert(var.owner);
                }
            }

            if cnst.usage > 0.0 {
                light.push(cid);
            }
        }

        let mut round = 0usize;
        while !light.is_empty() {
            light.retain(|cid| self.has_pending_variables(*cid));
            if light.is_empty() {
                break;
            }
            round += 1;

            let (min_usage, saturated) = self.saturated_variables(&light);

            // A variable that reaches its own bound before the fair share is
            // fixed first, together with any other variable at the same bound.
            let mut min_bound: Option<f64> = None;
            for &vid in &saturated {
                let var = &self.variables[vid];
                let scaled = var.bound * var.weight;
                if var.bound > 0.0 && scaled < min_usage {
                    min_bound = Some(min_bound.map_or(scaled, |m| m.min(scaled)));
                }
            }

            for vid in saturated {
                let var = &mut self.variables[vid];
                match min_bound {
                    None => var.value = min_usage / var.weight,
                    Some(bound) if double_equals(bound, var.bound * var.weight, precision) => {
                        var.value = var.bound;
                    }
                    Some(_) => continue,
                }
                var.fixed = true;
                self.release_variable(vid, &mut light);
            }
            trace!(round, min_usage, ?min_bound, remaining = light.len(), "Solver round");
        }

        self.modified = false;
        if self.selective_update {
            self.remove_all_modified_set();
        }

        owners.into_iter().collect()
    }

    fn variable_value(&self, var: VariableId) -> f64 {
        self.variables[var].value
    }

    fn variable_weight(&self, var: VariableId) -> f64 {
        self.variables[var].weight
    }

    fn variable_bound(&self, var: VariableId) -> f64 {
        self.variables[var].bound
    }

    fn variable_owner(&self, var: VariableId) -> ActionId {
        self.variables[var].owner
    }

    fn variable_constraints(&self, var: VariableId) -> Vec<ConstraintId> {
        self.variables[var]
            .elements
            .iter()
            .map(|eid| self.elements[*eid].constraint)
            .collect()
    }

    fn constraint_variables(&self, cnst: ConstraintId) -> Vec<VariableId> {
        let variables: IndexSet<VariableId> = self.constraints[cnst]
            .elements
            .iter()
            .map(|eid| self.elements[*eid].variable)
            .collect();
        variables.into_iter().collect()
    }

    fn constraint_bound(&self, cnst: ConstraintId) -> f64 {
        self.constraints[cnst].bound
    }

    fn constraint_owner(&self, cnst: ConstraintId) -> ResourceId {
        self.constraints[cnst].owner
    }

    fn constraint_usage(&self, cnst: ConstraintId) -> f64 {
        let constraint = &self.constraints[cnst];
        let mut usage: f64 = 0.0;
        for &eid in &constraint.elements {
            let elem = &self.elements[eid];
            let var = &self.variables[elem.variable];
            if var.weight <= 0.0 || elem.consumption <= 0.0 {
                continue;
            }
            let load = elem.consumption * var.value;
            match constraint.sharing {
                SharingPolicy::Shared => usage += load,
                SharingPolicy::FatPipe => usage = usage.max(load),
            }
        }
        usage
    }
}
