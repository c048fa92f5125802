//! Predecessor/successor navigation over a circuit's steps.

use crate::types::{Circuit, Step};

/// Read-only view of a circuit's step sequence.
#[derive(Debug, Clone, Copy)]
pub struct StepGraph<'a> {
    circuit: &'a Circuit,
}

impl<'a> StepGraph<'a> {
    pub fn new(circuit: &'a Circuit) -> Self {
        Self { circuit }
    }

    pub fn first_step(&self) -> Option<&'a Step> {
        self.circuit.steps.iter().min_by_key(|s| s.order_index)
    }

    /// The step with the smallest `order_index` strictly greater than `current`.
    pub fn next_step(&self, current: i32) -> Option<&'a Step> {
        self.circuit
            .steps
            .iter()
            .filter(|s| s.order_index > current)
            .min_by_key(|s| s.order_index)
    }

    /// The step with the largest `order_index` strictly smaller than `current`.
    pub fn previous_step(&self, current: i32) -> Option<&'a Step> {
        self.circuit
            .steps
            .iter()
            .filter(|s| s.order_index < current)
            .max_by_key(|s| s.order_index)
    }

    pub fn step_by_order_index(&self, order_index: i32) -> Option<&'a Step> {
        self.circuit
            .steps
            .iter()
            .find(|s| s.order_index == order_index)
    }

    pub fn step(&self, step_id: &str) -> Option<&'a Step> {
        self.circuit.step(step_id)
    }

    /// Whether leaving `step_id` forward terminates the flow.
    ///
    /// An explicitly flagged step is the only terminal one when present;
    /// otherwise the step with the highest `order_index` is.
    pub fn is_final(&self, step_id: &str) -> bool {
        let Some(step) = self.step(step_id) else {
            return false;
        };
        if self.circuit.steps.iter().any(|s| s.is_final_step) {
            step.is_final_step
        } else {
            self.next_step(step.order_index).is_none()
        }
    }

    /// Whether `target` is directly after or directly before `from`.
    pub fn is_adjacent(&self, from: &Step, target: &Step) -> bool {
        let next = self.next_step(from.order_index).map(|s| s.id.as_str());
        let prev = self.previous_step(from.order_index).map(|s| s.id.as_str());
        next == Some(target.id.as_str()) || prev == Some(target.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, order_index: i32, is_final_step: bool) -> Step {
        Step {
            id: id.to_string(),
            circuit_id: "c".to_string(),
            title: id.to_uppercase(),
            order_index,
            responsible_role: None,
            is_final_step,
            statuses: vec![],
        }
    }

    fn circuit(steps: Vec<Step>) -> Circuit {
        Circuit {
            id: "c".to_string(),
            title: "Circuit".to_string(),
            is_active: true,
            ever_activated: true,
            has_ordered_flow: true,
            allow_backtrack: true,
            steps,
        }
    }

    #[test]
    fn navigation_skips_gaps_in_order_index() {
        let c = circuit(vec![step("a", 0, false), step("b", 10, false), step("c", 25, false)]);
        let g = StepGraph::new(&c);

        assert_eq!(g.first_step().map(|s| s.id.as_str()), Some("a"));
        assert_eq!(g.next_step(0).map(|s| s.id.as_str()), Some("b"));
        assert_eq!(g.next_step(5).map(|s| s.id.as_str()), Some("b"));
        assert_eq!(g.next_step(25), None);
        assert_eq!(g.previous_step(25).map(|s| s.id.as_str()), Some("b"));
        assert_eq!(g.previous_step(0), None);
        assert_eq!(g.step_by_order_index(10).map(|s| s.id.as_str()), Some("b"));
        assert_eq!(g.step_by_order_index(11), None);
    }

    #[test]
    fn last_step_is_final_without_explicit_flag() {
        let c = circuit(vec![step("a", 0, false), step("b", 1, false)]);
        let g = StepGraph::new(&c);
        assert!(!g.is_final("a"));
        assert!(g.is_final("b"));
        assert!(!g.is_final("missing"));
    }

    #[test]
    fn explicit_final_flag_wins_over_order() {
        let c = circuit(vec![step("a", 0, false), step("b", 1, true), step("c", 2, false)]);
        let g = StepGraph::new(&c);
        assert!(g.is_final("b"));
        assert!(!g.is_final("c"));
    }

    #[test]
    fn adjacency_is_symmetric_neighbours_only() {
        let c = circuit(vec![step("a", 0, false), step("b", 1, false), step("c", 2, false)]);
        let g = StepGraph::new(&c);
        let (a, b, cc) = (&c.steps[0], &c.steps[1], &c.steps[2]);
        assert!(g.is_adjacent(a, b));
        assert!(g.is_adjacent(b, a));
        assert!(g.is_adjacent(b, cc));
        assert!(!g.is_adjacent(a, cc));
        assert!(!g.is_adjacent(a, a));
    }
}
