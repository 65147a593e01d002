//! WHERE-key resolution for member units of a composite update or delete.

use crate::catalog::StorageUnit;
use crate::graph::RelationshipGraph;
use crate::service::validation::Fields;
use crate::sql::PgBindValue;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum UnitKey {
    /// Match `column` against the caller's key value(s).
    Shared(String),
    /// The unit's own primary key, taken from the provided data.
    Own(String, PgBindValue),
}

impl UnitKey {
    pub(crate) fn column(&self) -> &str {
        match self {
            UnitKey::Shared(c) | UnitKey::Own(c, _) => c,
        }
    }
}

/// Tiers, first hit wins: the entity key column if the unit has it; the unit's FK column in
/// the first relationship it depends through; the unit's own primary key from `own_fields`.
/// A referenced unit never keys on its own primary key by way of a relationship.
pub(crate) fn resolve_unit_key(
    unit: &StorageUnit,
    entity_key: &str,
    graph: &RelationshipGraph,
    own_fields: Option<&Fields>,
) -> Option<UnitKey> {
    if unit.has_column(entity_key) {
        return Some(UnitKey::Shared(entity_key.to_string()));
    }
    if let Some(rel) = graph.first_from(&unit.name) {
        return Some(UnitKey::Shared(rel.fk_column.clone()));
    }
    own_fields
        .and_then(|f| f.get(&unit.primary_key))
        .filter(|v| !v.is_null())
        .map(|v| UnitKey::Own(unit.primary_key.clone(), v.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Relationship;
    use crate::testing;

    fn graph(rels: Vec<Relationship>) -> RelationshipGraph {
        RelationshipGraph {
            relationships: rels,
            ambiguities: Vec::new(),
        }
    }

    #[test]
    fn test_entity_key_wins() {
        let unit = testing::unit("orders", &["id", "customer"]);
        let key = resolve_unit_key(&unit, "id", &RelationshipGraph::default(), None);
        assert_eq!(key, Some(UnitKey::Shared("id".into())));
    }

    fn lines_to_orders() -> RelationshipGraph {
        graph(vec![Relationship {
            dependent: "order_lines".into(),
            referenced: "orders".into(),
            fk_column: "order_no".into(),
            referenced_column: "id".into(),
        }])
    }

    #[test]
    fn test_fk_column_second() {
        let unit = testing::unit("order_lines", &["line_id", "order_no", "sku"]);
        let key = resolve_unit_key(&unit, "ref", &lines_to_orders(), None);
        assert_eq!(key.map(|k| k.column().to_string()), Some("order_no".to_string()));
    }

    #[test]
    fn test_referenced_unit_does_not_key_through_relationship() {
        let unit = testing::unit("orders", &["id", "customer"]);
        assert_eq!(resolve_unit_key(&unit, "line_id", &lines_to_orders(), None), None);

        let mut fields = Fields::new();
        fields.insert("id".into(), PgBindValue::I64(9));
        let key = resolve_unit_key(&unit, "line_id", &lines_to_orders(), Some(&fields));
        assert_eq!(key, Some(UnitKey::Own("id".into(), PgBindValue::I64(9))));
    }

    #[test]
    fn test_own_key_from_data_last() {
        let unit = testing::unit("tags", &["tag_id", "label"]);
        let mut fields = Fields::new();
        fields.insert("tag_id".into(), PgBindValue::I64(4));
        let key = resolve_unit_key(&unit, "note_id", &RelationshipGraph::default(), Some(&fields));
        assert_eq!(key, Some(UnitKey::Own("tag_id".into(), PgBindValue::I64(4))));
        assert_eq!(resolve_unit_key(&unit, "note_id", &RelationshipGraph::default(), None), None);
    }
}
