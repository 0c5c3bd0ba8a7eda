use std::collections::HashMap;

use sqlx::query::QueryAs;
use sqlx::{Database, Encode, QueryBuilder, Sqlite, SqliteConnection, Type};

use crate::db::Error;

pub fn expand_var(amount: usize) -> String {
    if amount == 0 {
        return "".to_string();
    }
    format!("?{}", ", ?".repeat(amount - 1))
}

pub trait BindList<'q, DB: Database, O> {
    fn bind_list<T: 'q + Encode<'q, DB> + Type<DB>>(self, list: &'q [T]) -> Self;
}

impl<'q, DB: Database, O> BindList<'q, DB, O>
    for QueryAs<'q, DB, O, <DB as Database>::Arguments<'q>>
{
    fn bind_list<T: 'q + Encode<'q, DB> + Type<DB>>(self, list: &'q [T]) -> Self {
        let mut query = self;
        for item in list.iter() {
            query = query.bind(item);
        }
        query
    }
}

/// Which rows `local_versions` looks at and how it names them.
pub(crate) struct VersionColumns<'a> {
    pub table: &'a str,
    /// May be a composite expression such as `group_id || ':' || user_id`.
    pub id_expr: &'a str,
    pub version_expr: &'a str,
}

impl<'a> VersionColumns<'a> {
    pub const fn new(table: &'a str, id_expr: &'a str) -> Self {
        VersionColumns {
            table,
            id_expr,
            version_expr: "version",
        }
    }
}

/// Most ids bound into one `IN (...)` lookup.
pub(crate) const LOOKUP_CHUNK: usize = 500;

/// `id -> version` for the rows whose id is in `ids`. `scope` narrows
/// per-user tables to one owner. Long id lists are looked up
/// `LOOKUP_CHUNK` at a time.
pub(crate) async fn local_versions(
    conn: &mut SqliteConnection,
    columns: &VersionColumns<'_>,
    scope: Option<(&str, &str)>,
    ids: &[String],
) -> Result<HashMap<String, i64>, Error> {
    let mut versions = HashMap::new();
    let id_expr = columns.id_expr;
    for chunk in ids.chunks(LOOKUP_CHUNK) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} AS row_id, {} AS version FROM {} WHERE ",
            id_expr, columns.version_expr, columns.table
        ));
        if let Some((column, value)) = scope {
            qb.push(column);
            qb.push(" = ");
            qb.push_bind(value);
            qb.push(" AND ");
        }
        qb.push(id_expr);
        qb.push(" IN (");
        let mut separated = qb.separated(", ");
        for id in chunk {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");
        let rows: Vec<(String, i64)> = qb.build_query_as().fetch_all(&mut *conn).await?;
        versions.extend(rows);
    }
    Ok(versions)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_expand_var() {
        assert_eq!("", expand_var(0));
        assert_eq!("?", expand_var(1));
        assert_eq!("?, ?, ?", expand_var(3));
    }
}
