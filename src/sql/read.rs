//! Read specifications: the loose wire shape callers send, and the closed plan it is
//! validated into. Every identifier in a `ReadPlan` has been checked against entity metadata.

use crate::catalog::EntityMetadata;
use crate::error::AppError;
use crate::sql::PgBindValue;
use serde::Deserialize;
use serde_json::Value;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadRequest {
    /// Explicit projection; absent or `["*"]` selects every column.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
    #[serde(default)]
    pub order_by: Vec<OrderSpec>,
    #[serde(default)]
    pub group_by: Option<String>,
    #[serde(default)]
    pub aggregate: Option<AggregateSpec>,
    /// Applied only when a non-negative integer.
    #[serde(default)]
    pub limit: Option<Value>,
    #[serde(default)]
    pub offset: Option<Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FilterSpec {
    pub column: String,
    #[serde(alias = "op")]
    pub operator: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OrderSpec {
    pub column: String,
    #[serde(default)]
    pub direction: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AggregateSpec {
    pub func: String,
    /// Absent or `"*"` aggregates over rows.
    #[serde(default)]
    pub column: Option<String>,
}

/// A column name known to belong to the entity. Only obtainable through metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnRef(String);

impl ColumnRef {
    pub fn resolve(meta: &EntityMetadata, name: &str) -> Option<Self> {
        meta.column(name).map(|c| ColumnRef(c.name.clone()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Like,
}

impl CompareOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
            CompareOp::Like => "LIKE",
        }
    }
}

/// Operator vocabulary accepted on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WireOp {
    Compare(CompareOp),
    In,
    Is,
    IsNot,
    Between,
}

fn parse_operator(op: &str) -> Option<WireOp> {
    let normalized = op.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
    Some(match normalized.as_str() {
        "=" => WireOp::Compare(CompareOp::Eq),
        "!=" | "<>" => WireOp::Compare(CompareOp::Ne),
        ">" => WireOp::Compare(CompareOp::Gt),
        "<" => WireOp::Compare(CompareOp::Lt),
        ">=" => WireOp::Compare(CompareOp::Ge),
        "<=" => WireOp::Compare(CompareOp::Le),
        "LIKE" => WireOp::Compare(CompareOp::Like),
        "IN" => WireOp::In,
        "IS" => WireOp::Is,
        "IS NOT" => WireOp::IsNot,
        "BETWEEN" => WireOp::Between,
        _ => return None,
    })
}

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Compare { column: ColumnRef, op: CompareOp, value: PgBindValue },
    In { column: ColumnRef, values: Vec<PgBindValue> },
    Between { column: ColumnRef, low: PgBindValue, high: PgBindValue },
    IsNull { column: ColumnRef, negated: bool },
    IsBool { column: ColumnRef, value: bool, negated: bool },
    /// `IS NOT DISTINCT FROM` (negated: `IS DISTINCT FROM`).
    IsValue { column: ColumnRef, value: PgBindValue, negated: bool },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunc {
    fn parse(s: &str) -> Option<Self> {
        Some(match s.trim().to_uppercase().as_str() {
            "COUNT" => AggregateFunc::Count,
            "SUM" => AggregateFunc::Sum,
            "AVG" => AggregateFunc::Avg,
            "MIN" => AggregateFunc::Min,
            "MAX" => AggregateFunc::Max,
            _ => return None,
        })
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            AggregateFunc::Count => "COUNT",
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Avg => "AVG",
            AggregateFunc::Min => "MIN",
            AggregateFunc::Max => "MAX",
        }
    }

    /// Output column name of the aggregate value.
    pub fn alias(self) -> &'static str {
        match self {
            AggregateFunc::Count => "count",
            AggregateFunc::Sum => "sum",
            AggregateFunc::Avg => "avg",
            AggregateFunc::Min => "min",
            AggregateFunc::Max => "max",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AggregateTarget {
    Rows,
    Column(ColumnRef),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Aggregate {
    pub func: AggregateFunc,
    pub target: AggregateTarget,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Projection {
    All,
    Columns(Vec<ColumnRef>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OrderTarget {
    Column(ColumnRef),
    Aggregate,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ordering {
    pub target: OrderTarget,
    pub direction: SortDirection,
}

/// The four statement shapes, selected by whether grouping and aggregation are present.
#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    Rows(Projection),
    Grouped(ColumnRef),
    Aggregated(Aggregate),
    GroupedAggregate(ColumnRef, Aggregate),
}

impl Shape {
    fn aggregate(&self) -> Option<&Aggregate> {
        match self {
            Shape::Aggregated(a) | Shape::GroupedAggregate(_, a) => Some(a),
            _ => None,
        }
    }

    fn group(&self) -> Option<&ColumnRef> {
        match self {
            Shape::Grouped(g) | Shape::GroupedAggregate(g, _) => Some(g),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReadPlan {
    pub shape: Shape,
    pub predicates: Vec<Predicate>,
    pub ordering: Vec<Ordering>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl ReadPlan {
    /// Validate `req` against `meta`. Unknown filter columns/operators and unusable order
    /// entries are dropped; malformed shapes and unknown group/aggregate columns are errors.
    pub fn validate(meta: &EntityMetadata, req: &ReadRequest) -> Result<ReadPlan, AppError> {
        let group = match &req.group_by {
            Some(name) => Some(ColumnRef::resolve(meta, name).ok_or_else(|| {
                AppError::Validation(format!("unknown groupBy column '{}' on '{}'", name, meta.name))
            })?),
            None => None,
        };
        let aggregate = req.aggregate.as_ref().map(|a| aggregate(meta, a)).transpose()?;
        let shape = match (group, aggregate) {
            (None, None) => Shape::Rows(projection(meta, req.columns.as_deref())?),
            (Some(g), None) => Shape::Grouped(g),
            (None, Some(a)) => Shape::Aggregated(a),
            (Some(g), Some(a)) => Shape::GroupedAggregate(g, a),
        };

        let mut predicates = Vec::with_capacity(req.filters.len());
        for f in &req.filters {
            if let Some(p) = predicate(meta, f)? {
                predicates.push(p);
            }
        }

        let mut ordering: Vec<Ordering> = req
            .order_by
            .iter()
            .filter_map(|o| order_entry(meta, &shape, o))
            .collect();
        if ordering.is_empty() && matches!(shape, Shape::GroupedAggregate(..)) {
            ordering.push(Ordering {
                target: OrderTarget::Aggregate,
                direction: SortDirection::Desc,
            });
        }

        Ok(ReadPlan {
            shape,
            predicates,
            ordering,
            limit: non_negative(req.limit.as_ref()),
            offset: non_negative(req.offset.as_ref()),
        })
    }
}

fn projection(meta: &EntityMetadata, columns: Option<&[String]>) -> Result<Projection, AppError> {
    let Some(columns) = columns else {
        return Ok(Projection::All);
    };
    if columns.is_empty() || columns.iter().any(|c| c == "*") {
        return Ok(Projection::All);
    }
    let known: Vec<ColumnRef> = columns
        .iter()
        .filter_map(|c| ColumnRef::resolve(meta, c))
        .collect();
    if known.is_empty() {
        return Err(AppError::Validation(format!(
            "none of the requested columns exist on '{}'",
            meta.name
        )));
    }
    Ok(Projection::Columns(known))
}

fn aggregate(meta: &EntityMetadata, spec: &AggregateSpec) -> Result<Aggregate, AppError> {
    let func = AggregateFunc::parse(&spec.func)
        .ok_or_else(|| AppError::Validation(format!("unknown aggregate function '{}'", spec.func)))?;
    let target = match spec.column.as_deref() {
        None | Some("*") => AggregateTarget::Rows,
        Some(name) => AggregateTarget::Column(ColumnRef::resolve(meta, name).ok_or_else(|| {
            AppError::Validation(format!("unknown aggregate column '{}' on '{}'", name, meta.name))
        })?),
    };
    if target == AggregateTarget::Rows && func != AggregateFunc::Count {
        return Err(AppError::Validation(format!("{} requires a column", func.as_sql())));
    }
    Ok(Aggregate { func, target })
}

fn predicate(meta: &EntityMetadata, f: &FilterSpec) -> Result<Option<Predicate>, AppError> {
    let Some(column) = ColumnRef::resolve(meta, &f.column) else {
        tracing::debug!(entity = %meta.name, column = %f.column, "dropping filter on unknown column");
        return Ok(None);
    };
    let Some(op) = parse_operator(&f.operator) else {
        tracing::debug!(entity = %meta.name, operator = %f.operator, "dropping filter with unknown operator");
        return Ok(None);
    };
    let p = match op {
        WireOp::Compare(op) => Predicate::Compare {
            column,
            op,
            value: PgBindValue::from_json(&f.value),
        },
        WireOp::In => {
            let Value::Array(items) = &f.value else {
                return Err(AppError::Validation(format!("IN on '{}' requires an array", f.column)));
            };
            Predicate::In {
                column,
                values: items.iter().map(PgBindValue::from_json).collect(),
            }
        }
        WireOp::Between => match &f.value {
            Value::Array(items) if items.len() == 2 => Predicate::Between {
                column,
                low: PgBindValue::from_json(&items[0]),
                high: PgBindValue::from_json(&items[1]),
            },
            _ => {
                return Err(AppError::Validation(format!(
                    "BETWEEN on '{}' requires a two-element array",
                    f.column
                )))
            }
        },
        WireOp::Is | WireOp::IsNot => {
            let negated = op == WireOp::IsNot;
            match &f.value {
                Value::Null => Predicate::IsNull { column, negated },
                Value::Bool(b) => Predicate::IsBool { column, value: *b, negated },
                Value::String(s) if s.eq_ignore_ascii_case("null") => Predicate::IsNull { column, negated },
                v => Predicate::IsValue {
                    column,
                    value: PgBindValue::from_json(v),
                    negated,
                },
            }
        }
    };
    Ok(Some(p))
}

fn order_entry(meta: &EntityMetadata, shape: &Shape, o: &OrderSpec) -> Option<Ordering> {
    let direction = match o.direction.as_deref().map(str::trim) {
        Some(d) if d.eq_ignore_ascii_case("desc") => SortDirection::Desc,
        _ => SortDirection::Asc,
    };
    let target = match shape {
        Shape::Rows(_) => OrderTarget::Column(ColumnRef::resolve(meta, &o.column)?),
        Shape::Aggregated(_) => return None,
        Shape::Grouped(_) | Shape::GroupedAggregate(..) => {
            if shape.aggregate().is_some_and(|a| o.column.eq_ignore_ascii_case(a.func.alias())) {
                OrderTarget::Aggregate
            } else if shape.group().is_some_and(|g| g.name() == o.column) {
                OrderTarget::Column(ColumnRef::resolve(meta, &o.column)?)
            } else {
                tracing::debug!(entity = %meta.name, column = %o.column, "dropping order entry outside the grouped output");
                return None;
            }
        }
    };
    Some(Ordering { target, direction })
}

fn non_negative(v: Option<&Value>) -> Option<u64> {
    v.and_then(Value::as_u64)
}
