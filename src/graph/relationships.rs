//! Relationship grapher: directed dependent -> referenced edges from foreign-key descriptors.

use crate::catalog::StorageUnit;
use serde::Serialize;

/// `dependent.fk_column` references `referenced.referenced_column`; the referenced row must exist first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub dependent: String,
    pub referenced: String,
    pub fk_column: String,
    pub referenced_column: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AmbiguityKind {
    /// Both units reference each other.
    Bidirectional,
    /// Several FK columns point the same way between the pair; the first one was kept.
    MultipleColumns,
}

/// A unit pair whose recorded relationship was chosen by iteration order, not by meaning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ambiguity {
    pub units: (String, String),
    pub kind: AmbiguityKind,
    pub candidates: Vec<Relationship>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipGraph {
    pub relationships: Vec<Relationship>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ambiguities: Vec<Ambiguity>,
}

impl RelationshipGraph {
    pub fn is_ambiguous(&self) -> bool {
        !self.ambiguities.is_empty()
    }

    /// First relationship in which `unit` holds the foreign key.
    pub fn first_from(&self, unit: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.dependent == unit)
    }
}

/// All FK edges from `dependent` to `referenced`, in column order.
fn edges_between(dependent: &StorageUnit, referenced: &StorageUnit) -> Vec<Relationship> {
    dependent
        .foreign_keys()
        .filter(|(_, fk)| fk.referenced_unit == referenced.name)
        .map(|(c, fk)| Relationship {
            dependent: dependent.name.clone(),
            referenced: referenced.name.clone(),
            fk_column: c.name.clone(),
            referenced_column: fk.referenced_column.clone(),
        })
        .collect()
}

/// Check every unordered pair in both directions; keep one edge per ordered pair and
/// report pairs where that choice was not unique.
pub fn derive_relationships(units: &[StorageUnit]) -> RelationshipGraph {
    let mut graph = RelationshipGraph::default();
    for (i, a) in units.iter().enumerate() {
        for b in units.iter().skip(i + 1) {
            let forward = edges_between(a, b);
            let backward = edges_between(b, a);

            for candidates in [&forward, &backward] {
                if candidates.len() > 1 {
                    graph.ambiguities.push(Ambiguity {
                        units: (candidates[0].dependent.clone(), candidates[0].referenced.clone()),
                        kind: AmbiguityKind::MultipleColumns,
                        candidates: candidates.clone(),
                    });
                }
            }
            if let (Some(f), Some(r)) = (forward.first(), backward.first()) {
                graph.ambiguities.push(Ambiguity {
                    units: (a.name.clone(), b.name.clone()),
                    kind: AmbiguityKind::Bidirectional,
                    candidates: vec![f.clone(), r.clone()],
                });
            }

            graph.relationships.extend(forward.into_iter().next());
            graph.relationships.extend(backward.into_iter().next());
        }
    }
    for amb in &graph.ambiguities {
        tracing::warn!(
            units = ?amb.units,
            kind = ?amb.kind,
            candidates = amb.candidates.len(),
            "ambiguous relationship between member units"
        );
    }
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDescriptor, ForeignKey};

    fn unit(name: &str, fks: &[(&str, &str, &str)]) -> StorageUnit {
        let mut columns = vec![ColumnDescriptor {
            name: "id".into(),
            data_type: "integer".into(),
            cast_type: Some("int4".into()),
            nullable: false,
            primary_key: true,
            auto_generated: true,
            unique: true,
            has_default: false,
            foreign_key: None,
        }];
        for (col, ref_unit, ref_col) in fks {
            columns.push(ColumnDescriptor {
                name: (*col).into(),
                data_type: "integer".into(),
                cast_type: Some("int4".into()),
                nullable: true,
                primary_key: false,
                auto_generated: false,
                unique: false,
                has_default: false,
                foreign_key: Some(ForeignKey {
                    referenced_unit: (*ref_unit).into(),
                    referenced_column: (*ref_col).into(),
                    referenced_is_primary: true,
                }),
            });
        }
        StorageUnit {
            schema: "public".into(),
            name: name.into(),
            columns,
            primary_key: "id".into(),
        }
    }

    #[test]
    fn test_single_edge_direction() {
        let units = vec![unit("orders", &[]), unit("order_lines", &[("order_id", "orders", "id")])];
        let graph = derive_relationships(&units);
        assert_eq!(
            graph.relationships,
            vec![Relationship {
                dependent: "order_lines".into(),
                referenced: "orders".into(),
                fk_column: "order_id".into(),
                referenced_column: "id".into(),
            }]
        );
        assert!(!graph.is_ambiguous());
        assert_eq!(graph.first_from("order_lines").map(|r| r.fk_column.as_str()), Some("order_id"));
        assert!(graph.first_from("orders").is_none());
    }

    #[test]
    fn test_multiple_columns_keeps_first_and_signals() {
        let units = vec![
            unit("people", &[]),
            unit("loans", &[("borrower_id", "people", "id"), ("lender_id", "people", "id")]),
        ];
        let graph = derive_relationships(&units);
        assert_eq!(graph.relationships.len(), 1);
        assert_eq!(graph.relationships[0].fk_column, "borrower_id");
        assert_eq!(graph.ambiguities.len(), 1);
        assert_eq!(graph.ambiguities[0].kind, AmbiguityKind::MultipleColumns);
        assert_eq!(graph.ambiguities[0].candidates.len(), 2);
    }

    #[test]
    fn test_bidirectional_records_both_edges_and_signals() {
        let units = vec![
            unit("a", &[("b_id", "b", "id")]),
            unit("b", &[("a_id", "a", "id")]),
        ];
        let graph = derive_relationships(&units);
        assert_eq!(graph.relationships.len(), 2);
        assert_eq!(graph.ambiguities.len(), 1);
        assert_eq!(graph.ambiguities[0].kind, AmbiguityKind::Bidirectional);
    }

    #[test]
    fn test_references_outside_member_set_are_ignored() {
        let units = vec![unit("a", &[("x_id", "x", "id")]), unit("b", &[])];
        assert!(derive_relationships(&units).relationships.is_empty());
    }
}
