//! Dependency orderer: referenced units before their dependents (Kahn's algorithm).

use crate::graph::Relationship;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitOrder {
    pub insert_order: Vec<String>,
    /// A cycle prevented a full ordering; `insert_order` is the caller's order unchanged.
    pub degraded: bool,
}

impl UnitOrder {
    pub fn delete_order(&self) -> Vec<String> {
        self.insert_order.iter().rev().cloned().collect()
    }
}

/// Insert order for `units`. Ties keep the caller's order. Never fails: a cycle yields
/// the caller's order flagged `degraded`.
pub fn order_units(units: &[String], relationships: &[Relationship]) -> UnitOrder {
    let mut in_degree: HashMap<&str, usize> = units.iter().map(|u| (u.as_str(), 0)).collect();
    let edges: Vec<&Relationship> = relationships
        .iter()
        .filter(|r| {
            r.dependent != r.referenced
                && in_degree.contains_key(r.dependent.as_str())
                && in_degree.contains_key(r.referenced.as_str())
        })
        .collect();
    for r in &edges {
        if let Some(d) = in_degree.get_mut(r.dependent.as_str()) {
            *d += 1;
        }
    }

    let mut ready: VecDeque<&str> = units
        .iter()
        .map(String::as_str)
        .filter(|u| in_degree.get(u) == Some(&0))
        .collect();
    let mut order: Vec<String> = Vec::with_capacity(units.len());
    while let Some(unit) = ready.pop_front() {
        order.push(unit.to_string());
        for r in edges.iter().filter(|r| r.referenced == unit) {
            if let Some(d) = in_degree.get_mut(r.dependent.as_str()) {
                *d -= 1;
                if *d == 0 {
                    ready.push_back(r.dependent.as_str());
                }
            }
        }
    }

    if order.len() < units.len() {
        tracing::warn!(
            units = ?units,
            ordered = order.len(),
            "dependency cycle among member units; using caller-supplied order"
        );
        return UnitOrder {
            insert_order: units.to_vec(),
            degraded: true,
        };
    }
    UnitOrder {
        insert_order: order,
        degraded: false,
    }
}
