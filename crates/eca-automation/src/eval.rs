//! Condition evaluation
//!
//! Pure, short-circuiting AND over a rule's condition list, reading current
//! values from the entity store. Never-set entities read as defined defaults
//! (0.0 for numbers, empty string for states) so conditions on them are
//! well-defined rather than errors.

use eca_entity_store::EntityStore;
use tracing::trace;

use crate::condition::Condition;

/// Evaluate all conditions; empty list is vacuously true
pub fn evaluate_all(conditions: &[Condition], store: &EntityStore) -> bool {
    conditions.iter().all(|c| evaluate(c, store))
}

/// Evaluate a single condition
pub fn evaluate(condition: &Condition, store: &EntityStore) -> bool {
    match condition {
        Condition::StateEquals(c) => {
            let current = store.state(&c.entity).unwrap_or_default();
            let passed = c.one_of.iter().any(|v| *v == current);
            trace!(entity = %c.entity, %current, passed, "state_equals");
            passed
        }
        Condition::NumericCompare(c) => {
            let current = store.numeric(&c.entity).unwrap_or(0.0);
            let passed = c.op.apply(current, c.value);
            trace!(entity = %c.entity, current, passed, "numeric_compare");
            passed
        }
    }
}
