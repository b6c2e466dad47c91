//! Export query construction and execution
//!
//! Translates the caller-supplied filter set into a parameterized SQL query
//! over the daily attendance snapshot and materializes the full result set.
//! Filter values are always bound through placeholders, never interpolated
//! into the SQL text.

use crate::core::error::{ExportError, Result};
use crate::db::Database;
use rusqlite::types::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Recognized text filter keys and the columns they bind to.
///
/// This table is the contract for what callers can filter on; query
/// parameters outside it are ignored. `school_type` is handled separately
/// because it maps a caller vocabulary onto category ids rather than
/// matching a text column.
pub const FILTER_COLUMNS: &[(&str, &str)] = &[
    ("district", "d.district_name"),
    ("block", "b.block_name"),
    ("cluster", "c.cluster_name"),
    ("school_management", "sm.management_name"),
    ("geography", "s.geography"),
];

/// Caller vocabulary for school_type and the category ids it maps to
const SCHOOL_TYPE_CATEGORIES: &[(&str, i64)] = &[("LP", 1), ("UP", 2), ("HS", 3), ("HSS", 4)];

/// Fixed SELECT over the daily snapshot. The three `?` placeholders all bind
/// the report date: the two attendance aggregate subqueries and the outer
/// registration filter must agree on the same day.
const BASE_QUERY: &str = r#"
SELECT
    d.district_name      AS district,
    b.block_name         AS block,
    c.cluster_name       AS cluster,
    s.udise_id           AS udise_id,
    s.school_name        AS school_name,
    sm.management_name   AS school_management,
    CASE s.school_category_id
        WHEN 1 THEN 'LP'
        WHEN 2 THEN 'UP'
        WHEN 3 THEN 'HS'
        WHEN 4 THEN 'HSS'
        ELSE NULL
    END                  AS school_category,
    s.geography          AS geography,
    st.total_students,
    st.total_students_present,
    sf.total_teaching_staff,
    sf.total_non_teaching_staff,
    sf.total_teaching_staff_present,
    sf.total_non_teaching_staff_present
FROM school_registrations s
LEFT JOIN districts d ON s.district_id = d.district_id
LEFT JOIN blocks b ON s.block_id = b.block_id
LEFT JOIN clusters c ON s.cluster_id = c.cluster_id
LEFT JOIN school_managements sm ON s.management_id = sm.management_id

LEFT JOIN (
    SELECT
        udise_id,
        IFNULL(SUM(registered_students), 0) AS total_students,
        IFNULL(SUM(present), 0) AS total_students_present
    FROM student_attendance
    WHERE report_date = ?
    GROUP BY udise_id
) st ON s.udise_id = st.udise_id

LEFT JOIN (
    SELECT
        udise_id,
        IFNULL(SUM(CASE WHEN staff_type_id = 1 THEN total_staff END), 0) AS total_teaching_staff,
        IFNULL(SUM(CASE WHEN staff_type_id != 1 THEN total_staff END), 0) AS total_non_teaching_staff,
        IFNULL(SUM(CASE WHEN staff_type_id = 1 THEN present END), 0) AS total_teaching_staff_present,
        IFNULL(SUM(CASE WHEN staff_type_id != 1 THEN present END), 0) AS total_non_teaching_staff_present
    FROM staff_attendance
    WHERE report_date = ?
    GROUP BY udise_id
) sf ON s.udise_id = sf.udise_id

WHERE s.report_date = ?
"#;

/// The filter set derived from request query parameters.
///
/// Each value may be a comma-separated list; elements become members of an
/// `IN (...)` predicate for the corresponding column. Absent or empty values
/// leave that dimension unfiltered.
#[derive(Debug, Clone, Default)]
pub struct ExportFilter {
    pub district: Option<String>,
    pub block: Option<String>,
    pub cluster: Option<String>,
    pub school_type: Option<String>,
    pub school_management: Option<String>,
    pub geography: Option<String>,
}

impl ExportFilter {
    /// Build a filter set from raw query parameters, ignoring unrecognized
    /// keys and dropping empty values
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let pick = |key: &str| {
            params
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(|v| v.to_string())
        };

        Self {
            district: pick("district"),
            block: pick("block"),
            cluster: pick("cluster"),
            school_type: pick("school_type"),
            school_management: pick("school_management"),
            geography: pick("geography"),
        }
    }

    fn get(&self, key: &str) -> Option<&str> {
        match key {
            "district" => self.district.as_deref(),
            "block" => self.block.as_deref(),
            "cluster" => self.cluster.as_deref(),
            "school_management" => self.school_management.as_deref(),
            "geography" => self.geography.as_deref(),
            _ => None,
        }
    }
}

/// Split a comma-separated filter value into its non-empty trimmed elements
fn split_values(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect()
}

/// Build the export SQL and its bound parameters for one request
///
/// Every populated filter contributes one `column IN (?, ...)` predicate;
/// predicates are combined with AND. The row order is fixed by the trailing
/// ORDER BY so identical requests produce identical output.
pub fn build_query(filter: &ExportFilter, report_date: &str) -> (String, Vec<Value>) {
    let mut query = BASE_QUERY.to_string();
    let mut params: Vec<Value> = vec![
        Value::Text(report_date.to_string()),
        Value::Text(report_date.to_string()),
        Value::Text(report_date.to_string()),
    ];
    let mut predicates: Vec<String> = Vec::new();

    for (key, column) in FILTER_COLUMNS {
        if let Some(raw) = filter.get(key) {
            let values = split_values(raw);
            if values.is_empty() {
                continue;
            }
            let placeholders = vec!["?"; values.len()].join(", ");
            predicates.push(format!("{} IN ({})", column, placeholders));
            params.extend(values.into_iter().map(|v| Value::Text(v.to_string())));
        }
    }

    // school_type filters on category id, translated from the caller
    // vocabulary. Unknown elements are dropped; if nothing maps, the
    // filter is omitted entirely.
    if let Some(raw) = filter.school_type.as_deref() {
        let ids: Vec<i64> = split_values(raw)
            .into_iter()
            .filter_map(|t| {
                SCHOOL_TYPE_CATEGORIES
                    .iter()
                    .find(|(name, _)| *name == t)
                    .map(|(_, id)| *id)
            })
            .collect();
        if !ids.is_empty() {
            let placeholders = vec!["?"; ids.len()].join(", ");
            predicates.push(format!("s.school_category_id IN ({})", placeholders));
            params.extend(ids.into_iter().map(Value::Integer));
        }
    }

    if !predicates.is_empty() {
        query += " AND ";
        query += &predicates.join(" AND ");
    }

    query += " ORDER BY s.district_id, s.block_id, s.cluster_id, s.udise_id";

    (query, params)
}

/// The in-memory materialization of one export query: ordered column names
/// plus rows of SQL values, in the order the database returned them
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Read-only repository executing the export query
pub struct ExportRepository {
    db: Arc<Database>,
}

impl ExportRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Execute the filtered export query for today's report date and
    /// materialize all rows.
    ///
    /// The pooled connection is scoped to this call and returned to the pool
    /// on every exit path, including query failure.
    pub async fn fetch(&self, filter: &ExportFilter) -> Result<ResultSet> {
        let filter = filter.clone();
        let report_date = today();

        self.db
            .execute(move |conn| {
                let (sql, params) = build_query(&filter, &report_date);

                let mut stmt = conn.prepare(&sql).map_err(ExportError::DatabaseError)?;
                let columns: Vec<String> =
                    stmt.column_names().iter().map(|c| c.to_string()).collect();
                let column_count = columns.len();

                let mut rows = Vec::new();
                let mut result_rows = stmt
                    .query(rusqlite::params_from_iter(params))
                    .map_err(ExportError::DatabaseError)?;
                while let Some(row) = result_rows.next().map_err(ExportError::DatabaseError)? {
                    let mut values = Vec::with_capacity(column_count);
                    for i in 0..column_count {
                        values.push(row.get::<_, Value>(i).map_err(ExportError::DatabaseError)?);
                    }
                    rows.push(values);
                }

                Ok(ResultSet { columns, rows })
            })
            .await
    }
}

/// Today's report date in the database's YYYY-MM-DD convention
pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unfiltered_query_has_no_predicates() {
        let (sql, params) = build_query(&ExportFilter::default(), "2026-08-06");

        assert!(!sql.contains(" IN ("));
        assert!(sql.trim_end().ends_with("ORDER BY s.district_id, s.block_id, s.cluster_id, s.udise_id"));
        // Only the three report-date bindings
        assert_eq!(params.len(), 3);
        assert!(params.iter().all(|p| *p == Value::Text("2026-08-06".to_string())));
    }

    #[test]
    fn test_single_filter_binds_one_value() {
        let filter = ExportFilter {
            district: Some("CHIRANG".to_string()),
            ..Default::default()
        };
        let (sql, params) = build_query(&filter, "2026-08-06");

        assert!(sql.contains("d.district_name IN (?)"));
        assert_eq!(params.len(), 4);
        assert_eq!(params[3], Value::Text("CHIRANG".to_string()));
    }

    #[test]
    fn test_comma_separated_values_expand_to_in_list() {
        let filter = ExportFilter {
            district: Some("CHIRANG, BAKSA ,".to_string()),
            ..Default::default()
        };
        let (sql, params) = build_query(&filter, "2026-08-06");

        assert!(sql.contains("d.district_name IN (?, ?)"));
        assert_eq!(params.len(), 5);
        assert_eq!(params[3], Value::Text("CHIRANG".to_string()));
        assert_eq!(params[4], Value::Text("BAKSA".to_string()));
    }

    #[test]
    fn test_multiple_filters_are_anded() {
        let filter = ExportFilter {
            district: Some("CHIRANG".to_string()),
            geography: Some("Rural".to_string()),
            ..Default::default()
        };
        let (sql, _params) = build_query(&filter, "2026-08-06");

        let district_pos = sql.find("d.district_name IN (?)").unwrap();
        let geography_pos = sql.find("s.geography IN (?)").unwrap();
        assert!(sql[district_pos..geography_pos].contains(" AND "));
    }

    #[test]
    fn test_school_type_maps_to_category_ids() {
        let filter = ExportFilter {
            school_type: Some("LP,HSS".to_string()),
            ..Default::default()
        };
        let (sql, params) = build_query(&filter, "2026-08-06");

        assert!(sql.contains("s.school_category_id IN (?, ?)"));
        assert_eq!(params[3], Value::Integer(1));
        assert_eq!(params[4], Value::Integer(4));
    }

    #[test]
    fn test_unknown_school_type_elements_are_dropped() {
        let filter = ExportFilter {
            school_type: Some("LP,KINDERGARTEN".to_string()),
            ..Default::default()
        };
        let (sql, params) = build_query(&filter, "2026-08-06");

        assert!(sql.contains("s.school_category_id IN (?)"));
        assert_eq!(params.len(), 4);
        assert_eq!(params[3], Value::Integer(1));
    }

    #[test]
    fn test_all_unknown_school_types_omit_the_filter() {
        let filter = ExportFilter {
            school_type: Some("KINDERGARTEN".to_string()),
            ..Default::default()
        };
        let (sql, params) = build_query(&filter, "2026-08-06");

        assert!(!sql.contains("s.school_category_id IN"));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_filter_values_are_never_interpolated() {
        let filter = ExportFilter {
            district: Some("X'); DROP TABLE districts; --".to_string()),
            ..Default::default()
        };
        let (sql, params) = build_query(&filter, "2026-08-06");

        assert!(!sql.contains("DROP TABLE"));
        assert_eq!(params[3], Value::Text("X'); DROP TABLE districts; --".to_string()));
    }

    #[test]
    fn test_from_params_ignores_unrecognized_keys() {
        let mut params = HashMap::new();
        params.insert("district".to_string(), "CHIRANG".to_string());
        params.insert("limit".to_string(), "10".to_string());
        params.insert("block".to_string(), "  ".to_string());

        let filter = ExportFilter::from_params(&params);
        assert_eq!(filter.district.as_deref(), Some("CHIRANG"));
        // Whitespace-only values count as absent
        assert!(filter.block.is_none());
        assert!(filter.cluster.is_none());
    }

    #[test]
    fn test_today_is_iso_formatted() {
        let date = today();
        assert_eq!(date.len(), 10);
        assert_eq!(date.as_bytes()[4], b'-');
        assert_eq!(date.as_bytes()[7], b'-');
    }
}
