//! SELECT synthesis: projection, TOP-N and ROW_NUMBER() paging

use crate::literal::quote_ident;
use crate::predicate::Conditions;
use crate::statement::Statement;
use quarry_core::{Error, Limits, Result};

/// Ordering on one column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Column name
    pub field: String,
    /// Sort descending
    pub descending: bool,
}

impl OrderBy {
    /// Ascending order on `field`
    pub fn asc(field: impl Into<String>) -> Self {
        OrderBy {
            field: field.into(),
            descending: false,
        }
    }

    /// Descending order on `field`
    pub fn desc(field: impl Into<String>) -> Self {
        OrderBy {
            field: field.into(),
            descending: true,
        }
    }

    fn render(&self) -> String {
        format!(
            "{} {}",
            quote_ident(&self.field),
            if self.descending { "DESC" } else { "ASC" }
        )
    }
}

impl From<&str> for OrderBy {
    fn from(field: &str) -> Self {
        OrderBy::asc(field)
    }
}

impl From<String> for OrderBy {
    fn from(field: String) -> Self {
        OrderBy::asc(field)
    }
}

fn render_order(order_by: &[OrderBy]) -> String {
    order_by
        .iter()
        .map(OrderBy::render)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A validated page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    skip: usize,
    take: usize,
    order_by: Vec<OrderBy>,
}

impl PageRequest {
    /// Validate a page request.
    ///
    /// A negative `skip` is clamped to zero.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` when `take <= 0` or `order_by` is empty.
    pub fn new(skip: i64, take: i64, order_by: Vec<OrderBy>) -> Result<Self> {
        if take <= 0 {
            return Err(Error::validation(format!(
                "page size must be positive, got {}",
                take
            )));
        }
        if order_by.is_empty() {
            return Err(Error::validation(
                "paging requires at least one order-by field",
            ));
        }
        Ok(PageRequest {
            skip: usize::try_from(skip.max(0)).unwrap_or(0),
            take: usize::try_from(take).unwrap_or(usize::MAX),
            order_by,
        })
    }

    /// Rows skipped
    pub fn skip(&self) -> usize {
        self.skip
    }

    /// Rows returned at most
    pub fn take(&self) -> usize {
        self.take
    }

    /// Ordering that defines row numbers
    pub fn order_by(&self) -> &[OrderBy] {
        &self.order_by
    }
}

/// Row limiting for a SELECT
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RowLimit {
    /// Every matching row
    #[default]
    All,
    /// First `n` rows, with an optional ordering
    Top {
        /// Row count
        n: usize,
        /// Ordering, may be empty
        order_by: Vec<OrderBy>,
    },
    /// One page
    Page(PageRequest),
}

/// One projected column: source field and optional output alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Field read from the table
    pub source: String,
    /// Output name when it differs from `source`
    pub alias: Option<String>,
}

impl Column {
    /// Column selected under its own name
    pub fn plain(source: impl Into<String>) -> Self {
        Column {
            source: source.into(),
            alias: None,
        }
    }

    /// Column selected as `[source] AS [alias]`
    pub fn aliased(source: impl Into<String>, alias: impl Into<String>) -> Self {
        Column {
            source: source.into(),
            alias: Some(alias.into()),
        }
    }

    fn render(&self) -> String {
        match &self.alias {
            Some(alias) if !alias.eq_ignore_ascii_case(&self.source) => {
                format!("{} AS {}", quote_ident(&self.source), quote_ident(alias))
            }
            _ => quote_ident(&self.source),
        }
    }
}

/// Everything needed to render a SELECT
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery<'a> {
    /// Source table (unquoted)
    pub table: &'a str,
    /// Projected columns
    pub columns: &'a [Column],
    /// Filter
    pub conditions: &'a Conditions,
    /// Row limiting
    pub limit: &'a RowLimit,
    /// Redirect output into this table instead of returning rows
    pub into: Option<&'a str>,
}

impl SelectQuery<'_> {
    /// Render the statement.
    pub fn build(&self, limits: &Limits) -> Statement {
        let filter = self.conditions.compile(limits);
        let columns = self
            .columns
            .iter()
            .map(Column::render)
            .collect::<Vec<_>>()
            .join(", ");
        let into = self
            .into
            .map(|t| format!(" INTO {}", t))
            .unwrap_or_default();
        let table = quote_ident(self.table);

        let sql = match self.limit {
            RowLimit::All => format!("SELECT {}{} FROM {}{}", columns, into, table, filter.sql),
            RowLimit::Top { n, order_by } => {
                let mut sql = format!(
                    "SELECT TOP ({}) {}{} FROM {}{}",
                    n, columns, into, table, filter.sql
                );
                if !order_by.is_empty() {
                    sql.push_str(" ORDER BY ");
                    sql.push_str(&render_order(order_by));
                }
                sql
            }
            RowLimit::Page(page) => format!(
                "SELECT *{into} FROM ( SELECT ROW_NUMBER() OVER (ORDER BY {order}) AS [RowNum], {columns} FROM {table}{filter} ) OT1 \
                 WHERE OT1.[RowNum] > {skip} AND OT1.[RowNum] <= {upper} ORDER BY OT1.[RowNum]",
                into = into,
                order = render_order(page.order_by()),
                columns = columns,
                table = table,
                filter = filter.sql,
                skip = page.skip(),
                upper = page.skip().saturating_add(page.take()),
            ),
        };
        Statement::new(sql, filter.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::{Predicate, PredicateKind};
    use quarry_core::FieldType;

    fn columns() -> Vec<Column> {
        vec![Column::plain("ID"), Column::plain("Name")]
    }

    #[test]
    fn test_page_validation() {
        assert!(PageRequest::new(0, 0, vec!["Name".into()]).is_err());
        assert!(PageRequest::new(0, 10, Vec::new()).is_err());
        let page = PageRequest::new(-5, 10, vec!["Name".into()]).unwrap();
        assert_eq!(page.skip(), 0);
    }

    #[test]
    fn test_plain_select() {
        let cols = columns();
        let conditions = Conditions::new();
        let q = SelectQuery {
            table: "Clients",
            columns: &cols,
            conditions: &conditions,
            limit: &RowLimit::All,
            into: None,
        };
        assert_eq!(
            q.build(&Limits::default()).sql,
            "SELECT [ID], [Name] FROM [Clients] WHERE 1=1"
        );
    }

    #[test]
    fn test_top_with_order() {
        let cols = columns();
        let conditions = Conditions::new();
        let limit = RowLimit::Top {
            n: 5,
            order_by: vec![OrderBy::desc("ID")],
        };
        let q = SelectQuery {
            table: "Clients",
            columns: &cols,
            conditions: &conditions,
            limit: &limit,
            into: Some("#recent"),
        };
        assert_eq!(
            q.build(&Limits::default()).sql,
            "SELECT TOP (5) [ID], [Name] INTO #recent FROM [Clients] WHERE 1=1 ORDER BY [ID] DESC"
        );
    }

    #[test]
    fn test_paging_bounds() {
        let cols = columns();
        let mut conditions = Conditions::new();
        conditions.push(Predicate::new(
            "Name",
            FieldType::String,
            PredicateKind::Like("A%".into()),
        ));
        let limit = RowLimit::Page(PageRequest::new(10, 10, vec!["Name".into()]).unwrap());
        let q = SelectQuery {
            table: "Clients",
            columns: &cols,
            conditions: &conditions,
            limit: &limit,
            into: None,
        };
        let stmt = q.build(&Limits::default());
        assert!(stmt.sql.starts_with(
            "SELECT * FROM ( SELECT ROW_NUMBER() OVER (ORDER BY [Name] ASC) AS [RowNum], [ID], [Name] FROM [Clients] WHERE 1=1 AND ([Name] LIKE @p_"
        ));
        assert!(stmt
            .sql
            .ends_with("WHERE OT1.[RowNum] > 10 AND OT1.[RowNum] <= 20 ORDER BY OT1.[RowNum]"));
        assert_eq!(stmt.params.len(), 1);
    }

    #[test]
    fn test_alias_rendering() {
        assert_eq!(Column::aliased("Name", "Label").render(), "[Name] AS [Label]");
        assert_eq!(Column::aliased("Name", "name").render(), "[Name]");
    }
}
