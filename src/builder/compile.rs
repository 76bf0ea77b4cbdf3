//! Per-statement compilers.
//!
//! SELECT clauses are emitted in a fixed order: columns, FROM, WHERE, GROUP BY,
//! HAVING, ORDER BY, LIMIT, OFFSET. UPDATE and DELETE only take WHERE.

use super::condition::render_clauses;
use super::{BuiltQuery, QueryBuilder, QueryType};
use crate::error::{DbError, DbResult};

impl QueryBuilder {
    /// Compile to SQL text plus bindings, or return the first recorded error.
    pub fn build(self) -> DbResult<BuiltQuery> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let kind = self.kind.ok_or_else(|| {
            DbError::not_ready("choose select, insert, update or delete before building")
        })?;
        let table = self
            .table
            .as_deref()
            .ok_or_else(|| DbError::not_ready("no table selected"))?;

        let sql = match kind {
            QueryType::Select => self.compile_select(table),
            QueryType::Insert => self.compile_insert(table),
            QueryType::Update => self.compile_update(table),
            QueryType::Delete => self.compile_delete(table),
        };
        Ok(BuiltQuery {
            sql,
            bindings: self.bindings,
        })
    }

    /// Compile and keep only the SQL text.
    pub fn to_sql(self) -> DbResult<String> {
        self.build().map(|built| built.sql)
    }

    fn where_sql(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", render_clauses(&self.conditions))
        }
    }

    fn compile_select(&self, table: &str) -> String {
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(", ")
        };
        let mut sql = format!("SELECT {} FROM {}", columns, table);
        sql.push_str(&self.where_sql());
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }
        if !self.having.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&render_clauses(&self.having));
        }
        if !self.order_by.is_empty() {
            let order: Vec<String> = self
                .order_by
                .iter()
                .map(|(column, direction)| format!("{} {}", column, direction.as_sql()))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
        sql
    }

    fn compile_insert(&self, table: &str) -> String {
        let (columns, placeholders): (Vec<&str>, Vec<&str>) = self
            .assignments
            .iter()
            .map(|(column, placeholder)| (column.as_str(), placeholder.as_str()))
            .unzip();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders.join(", ")
        )
    }

    fn compile_update(&self, table: &str) -> String {
        let sets: Vec<String> = self
            .assignments
            .iter()
            .map(|(column, placeholder)| format!("{} = {}", column, placeholder))
            .collect();
        format!("UPDATE {} SET {}{}", table, sets.join(", "), self.where_sql())
    }

    fn compile_delete(&self, table: &str) -> String {
        format!("DELETE FROM {}{}", table, self.where_sql())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QueryParam;

    #[test]
    fn test_select_round_trip() {
        let built = QueryBuilder::table("t")
            .select(&["a", "b"])
            .where_("a", "=", 1)
            .limit(5)
            .build()
            .unwrap();
        assert_eq!(built.sql, "SELECT a, b FROM t WHERE a = :where_a_0 LIMIT 5");
        assert_eq!(built.bindings.len(), 1);
        assert_eq!(built.bindings[":where_a_0"], QueryParam::Int(1));
    }

    #[test]
    fn test_select_clause_order() {
        let sql = QueryBuilder::table("orders")
            .select(&["customer_id", "SUM(total) AS spent"])
            .where_("status", "=", "paid")
            .group_by(&["customer_id"])
            .having("SUM(total)", ">", 100)
            .order_by("spent", "desc")
            .limit(10)
            .offset(20)
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT customer_id, SUM(total) AS spent FROM orders WHERE status = :where_status_0 \
             GROUP BY customer_id HAVING SUM(total) > :having_SUM_total__1 \
             ORDER BY spent DESC LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn test_between_swaps_reversed_bounds() {
        let built = QueryBuilder::table("t")
            .select(&[])
            .where_between("x", [10, 5])
            .build()
            .unwrap();
        assert_eq!(built.sql, "SELECT * FROM t WHERE x BETWEEN :btw_x_0 AND :btw_x_1");
        assert_eq!(built.bindings[":btw_x_0"], QueryParam::Int(5));
        assert_eq!(built.bindings[":btw_x_1"], QueryParam::Int(10));
    }

    #[test]
    fn test_between_requires_two_bounds() {
        let err = QueryBuilder::table("t")
            .select(&[])
            .where_not_between("x", [1, 2, 3])
            .build()
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidRange { .. }));
    }

    #[test]
    fn test_insert_rejects_where() {
        let err = QueryBuilder::table("t")
            .insert([("a", 1)])
            .where_("a", "=", 1)
            .to_sql()
            .unwrap_err();
        assert!(matches!(err, DbError::Unsupported { .. }));

        let err = QueryBuilder::table("t")
            .insert([("a", 1)])
            .where_null("a")
            .build()
            .unwrap_err();
        assert!(matches!(err, DbError::Unsupported { .. }));
    }

    #[test]
    fn test_insert_update_delete() {
        let insert = QueryBuilder::table("customers")
            .insert([("name", QueryParam::from("John")), ("balance", QueryParam::from(1000))])
            .build()
            .unwrap();
        assert_eq!(
            insert.sql,
            "INSERT INTO customers (name, balance) VALUES (:ins_name_0, :ins_balance_1)"
        );

        let update = QueryBuilder::table("customers")
            .update([("balance", 900)])
            .where_("id", "=", 1)
            .build()
            .unwrap();
        assert_eq!(
            update.sql,
            "UPDATE customers SET balance = :set_balance_0 WHERE id = :where_id_1"
        );

        let delete = QueryBuilder::table("customers")
            .delete()
            .where_in("id", [1, 2])
            .or()
            .where_null("email")
            .to_sql()
            .unwrap();
        assert_eq!(
            delete,
            "DELETE FROM customers WHERE id IN (:in_id_0, :in_id_1) OR email IS NULL"
        );
    }

    #[test]
    fn test_update_rejects_select_clauses() {
        let err = QueryBuilder::table("t")
            .update([("a", 1)])
            .order_by("a", "asc")
            .build()
            .unwrap_err();
        assert!(matches!(err, DbError::Unsupported { .. }));
        let err = QueryBuilder::table("t").delete().limit(1).build().unwrap_err();
        assert!(matches!(err, DbError::Unsupported { .. }));
    }

    #[test]
    fn test_where_variants() {
        let built = QueryBuilder::table("users")
            .select(&["id"])
            .where_not("role", "=", "admin")
            .where_not_in("id", [7])
            .or_where("name", "like", "J%")
            .where_not_like("email", "%@spam.test")
            .where_not_null("verified_at")
            .build()
            .unwrap();
        assert_eq!(
            built.sql,
            "SELECT id FROM users WHERE NOT (role = :not_role_0) AND id NOT IN (:notin_id_1) \
             OR name LIKE :where_name_2 AND email NOT LIKE :where_email_3 AND verified_at IS NOT NULL"
        );
        assert_eq!(built.bindings.len(), 4);
    }

    #[test]
    fn test_exists_and_nested_share_numbering() {
        let built = QueryBuilder::table("customers")
            .select(&["name"])
            .where_("balance", ">", 0)
            .where_exists(|q| {
                q.from("orders")
                    .select(&["1"])
                    .where_raw("orders.customer_id = customers.id")
                    .and_where("orders.total", ">=", 50)
            })
            .where_nested(|q| q.where_("city", "=", "Tehran").or_where("city", "=", "Shiraz"))
            .build()
            .unwrap();
        assert_eq!(
            built.sql,
            "SELECT name FROM customers WHERE balance > :where_balance_0 \
             AND EXISTS (SELECT 1 FROM orders WHERE orders.customer_id = customers.id \
             AND orders.total >= :where_orders_total_1) \
             AND (city = :where_city_2 OR city = :where_city_3)"
        );
        assert_eq!(built.bindings.len(), 4);
    }

    #[test]
    fn test_where_raw_with_bindings() {
        let built = QueryBuilder::table("t")
            .select(&[])
            .where_raw_with("a + b > :total", [("total", 10)])
            .build()
            .unwrap();
        assert_eq!(built.sql, "SELECT * FROM t WHERE a + b > :total");
        assert_eq!(built.bindings[":total"], QueryParam::Int(10));
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            QueryBuilder::table("t").select(&[]).where_in("a", Vec::<i64>::new()).build(),
            Err(DbError::InvalidInput { .. })
        ));
        assert!(matches!(
            QueryBuilder::table("t").select(&[]).having("a", "~", 1).build(),
            Err(DbError::InvalidOperator { .. })
        ));
        assert!(matches!(
            QueryBuilder::table("t").build(),
            Err(DbError::NotReady { .. })
        ));
        assert!(matches!(
            QueryBuilder::default().select(&[]).build(),
            Err(DbError::NotReady { .. })
        ));
    }
}
