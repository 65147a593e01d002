//! Statement compiler: one validated read plan in, one parameterized SELECT out.

use crate::catalog::EntityMetadata;
use crate::error::AppError;
use crate::sql::builder::{qualified_table, quoted, select_expr, QueryBuf};
use crate::sql::read::*;
use crate::sql::PgBindValue;

/// A compiled read and the names of the columns each row will carry.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledRead {
    pub query: QueryBuf,
    pub columns: Vec<String>,
}

/// Per-request compiler bound to one entity's metadata.
pub struct StatementCompiler<'a> {
    meta: &'a EntityMetadata,
}

impl<'a> StatementCompiler<'a> {
    pub fn new(meta: &'a EntityMetadata) -> Self {
        StatementCompiler { meta }
    }

    pub fn compile(&self, req: &ReadRequest) -> Result<CompiledRead, AppError> {
        let plan = ReadPlan::validate(self.meta, req)?;
        Ok(self.compile_plan(&plan))
    }

    pub fn compile_plan(&self, plan: &ReadPlan) -> CompiledRead {
        let mut q = QueryBuf::new();
        let (select_list, columns) = self.select_list(&plan.shape);
        let mut sql = format!(
            "SELECT {} FROM {}",
            select_list,
            qualified_table(&self.meta.schema, &self.meta.name)
        );

        let conditions: Vec<String> = plan
            .predicates
            .iter()
            .map(|p| self.condition(&mut q, p))
            .collect();
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        if let Shape::Grouped(g) | Shape::GroupedAggregate(g, _) = &plan.shape {
            sql.push_str(&format!(" GROUP BY {}", quoted(g.name())));
        }

        let aggregate = match &plan.shape {
            Shape::Aggregated(a) | Shape::GroupedAggregate(_, a) => Some(a),
            _ => None,
        };
        let order: Vec<String> = plan
            .ordering
            .iter()
            .filter_map(|o| {
                // sort on source values; the select list may have cast them to text
                let expr = match &o.target {
                    OrderTarget::Column(c) => self.source_column(c),
                    OrderTarget::Aggregate => self.aggregate_call(aggregate?),
                };
                let dir = match o.direction {
                    SortDirection::Asc => "ASC",
                    SortDirection::Desc => "DESC",
                };
                Some(format!("{} {}", expr, dir))
            })
            .collect();
        if !order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        if let Some(limit) = plan.limit {
            let n = q.push_param(PgBindValue::I64(clamp(limit)));
            sql.push_str(&format!(" LIMIT ${}", n));
        }
        if let Some(offset) = plan.offset {
            let n = q.push_param(PgBindValue::I64(clamp(offset)));
            sql.push_str(&format!(" OFFSET ${}", n));
        }

        q.sql = sql;
        tracing::debug!(entity = %self.meta.name, sql = %q.sql, params = ?q.params, "compiled read");
        CompiledRead { query: q, columns }
    }

    fn select_list(&self, shape: &Shape) -> (String, Vec<String>) {
        match shape {
            Shape::Rows(Projection::All) => (
                self.meta.columns.iter().map(select_expr).collect::<Vec<_>>().join(", "),
                self.meta.columns.iter().map(|c| c.name.clone()).collect(),
            ),
            Shape::Rows(Projection::Columns(cols)) => (
                cols.iter().map(|c| self.column_expr(c)).collect::<Vec<_>>().join(", "),
                cols.iter().map(|c| c.name().to_string()).collect(),
            ),
            Shape::Grouped(g) => (self.column_expr(g), vec![g.name().to_string()]),
            Shape::Aggregated(a) => (
                format!("{} AS {}", self.aggregate_expr(a), quoted(a.func.alias())),
                vec![a.func.alias().to_string()],
            ),
            Shape::GroupedAggregate(g, a) => (
                format!(
                    "{}, {} AS {}",
                    self.column_expr(g),
                    self.aggregate_expr(a),
                    quoted(a.func.alias())
                ),
                vec![g.name().to_string(), a.func.alias().to_string()],
            ),
        }
    }

    fn column_expr(&self, c: &ColumnRef) -> String {
        match self.meta.column(c.name()) {
            Some(d) => select_expr(d),
            None => quoted(c.name()),
        }
    }

    /// Table-qualified, so it never resolves to a same-named output column.
    fn source_column(&self, c: &ColumnRef) -> String {
        format!(
            "{}.{}",
            qualified_table(&self.meta.schema, &self.meta.name),
            quoted(c.name())
        )
    }

    fn aggregate_call(&self, a: &Aggregate) -> String {
        let arg = match &a.target {
            AggregateTarget::Rows => "*".to_string(),
            AggregateTarget::Column(c) => quoted(c.name()),
        };
        format!("{}({})", a.func.as_sql(), arg)
    }

    /// SUM and AVG are read as double precision; MIN and MAX follow the column's text rule.
    fn aggregate_expr(&self, a: &Aggregate) -> String {
        let call = self.aggregate_call(a);
        match (a.func, &a.target) {
            (AggregateFunc::Sum | AggregateFunc::Avg, _) => format!("{}::double precision", call),
            (AggregateFunc::Min | AggregateFunc::Max, AggregateTarget::Column(c))
                if self.meta.column(c.name()).is_some_and(|d| d.reads_as_text()) =>
            {
                format!("{}::text", call)
            }
            _ => call,
        }
    }

    fn condition(&self, q: &mut QueryBuf, p: &Predicate) -> String {
        let desc = |c: &ColumnRef| self.meta.column(c.name());
        match p {
            Predicate::Compare { column, op: CompareOp::Like, value } => {
                let n = q.push_param(value.clone());
                format!("{}::text LIKE ${}::text", quoted(column.name()), n)
            }
            Predicate::Compare { column, op, value } => {
                let ph = q.bind_for(value.clone(), desc(column));
                format!("{} {} {}", quoted(column.name()), op.as_sql(), ph)
            }
            Predicate::In { column, values } => {
                if values.is_empty() {
                    return "FALSE".to_string();
                }
                let phs: Vec<String> = values
                    .iter()
                    .map(|v| q.bind_for(v.clone(), desc(column)))
                    .collect();
                format!("{} IN ({})", quoted(column.name()), phs.join(", "))
            }
            Predicate::Between { column, low, high } => {
                let lo = q.bind_for(low.clone(), desc(column));
                let hi = q.bind_for(high.clone(), desc(column));
                format!("{} BETWEEN {} AND {}", quoted(column.name()), lo, hi)
            }
            Predicate::IsNull { column, negated } => {
                format!("{} IS {}NULL", quoted(column.name()), not(*negated))
            }
            Predicate::IsBool { column, value, negated } => format!(
                "{} IS {}{}",
                quoted(column.name()),
                not(*negated),
                if *value { "TRUE" } else { "FALSE" }
            ),
            Predicate::IsValue { column, value, negated } => {
                let ph = q.bind_for(value.clone(), desc(column));
                // IS <value> means "not distinct from"
                let op = if *negated { "IS DISTINCT FROM" } else { "IS NOT DISTINCT FROM" };
                format!("{} {} {}", quoted(column.name()), op, ph)
            }
        }
    }
}

fn not(negated: bool) -> &'static str {
    if negated {
        "NOT "
    } else {
        ""
    }
}

fn clamp(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
