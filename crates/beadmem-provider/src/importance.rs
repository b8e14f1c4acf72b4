//! Importance (1-10) to priority (0-4) conversion.
//!
//! The mapping is lossy: ten scores collapse onto five priorities and the
//! reverse direction yields a representative midpoint per bucket. An entry
//! stored with importance 8 reads back as 7.

use beadmem_bd::{Importance, Priority};

pub fn importance_to_priority(importance: Importance) -> Priority {
    let level = match importance.value() {
        9..=10 => 0,
        7..=8 => 1,
        4..=6 => 2,
        2..=3 => 3,
        _ => 4,
    };
    Priority::LEVELS[level]
}

pub fn priority_to_importance(priority: Priority) -> Importance {
    let score = match priority.value() {
        0 => 9,
        1 => 7,
        2 => 5,
        3 => 3,
        _ => 1,
    };
    Importance::LEVELS[score - 1]
}
