//! SQL text for each of the Citation Graph Builder's six phases. Kept as pure string
//! builders, separate from [`crate::run`]'s orchestration, so the generated statements
//! can be asserted on directly without a live database.

/// Stage 0: the raw edge table, created once and optionally truncated between runs.
/// Autovacuum is disabled up front — this table is bulk-loaded and re-indexed, not
/// updated in place, so autovacuum only costs I/O against the working set.
pub fn create_raw_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (citingcorpusid BIGINT NOT NULL, citedcorpusid BIGINT NOT NULL) \
         WITH (autovacuum_enabled = false);"
    )
}

pub fn truncate_raw_table_sql(table: &str) -> String {
    format!("TRUNCATE {table};")
}

/// Stage 2: indexes on both edge endpoints plus a fresh `ANALYZE`, run under a large
/// `maintenance_work_mem` (applied by the caller via [`papeline_core::db::SessionTuning`]
/// before this statement, reset after).
pub fn index_raw_table_sql(table: &str) -> Vec<String> {
    vec![
        format!("CREATE INDEX IF NOT EXISTS idx_{table}_citing ON {table} (citingcorpusid);"),
        format!("CREATE INDEX IF NOT EXISTS idx_{table}_cited ON {table} (citedcorpusid);"),
        format!("ANALYZE {table};"),
    ]
}

/// Stage 3/4 share this shape, differing only in which endpoint groups and which
/// endpoint is aggregated. `direction` selects outgoing (`references`, grouped by
/// `citingcorpusid`, aggregating `citedcorpusid`) or incoming (`citations`, the
/// reverse). `"references"` is always double-quoted: it is a reserved word in every
/// SQL dialect this pipeline targets.
pub enum Direction {
    Outgoing,
    Incoming,
}

impl Direction {
    fn group_col(&self) -> &'static str {
        match self {
            Self::Outgoing => "citingcorpusid",
            Self::Incoming => "citedcorpusid",
        }
    }

    fn agg_col(&self) -> &'static str {
        match self {
            Self::Outgoing => "citedcorpusid",
            Self::Incoming => "citingcorpusid",
        }
    }

    fn output_column(&self) -> &'static str {
        match self {
            Self::Outgoing => "\"references\"",
            Self::Incoming => "citations",
        }
    }
}

/// Build the Stage 3/4 aggregation query over `raw_table`, joined against
/// `corpusid_mapping_title` for titles, selected into a `(corpusid, <output_column>)`
/// row shape ready to `SELECT ... INTO temp_<table>`.
pub fn aggregation_select_sql(raw_table: &str, direction: &Direction) -> String {
    let group_col = direction.group_col();
    let agg_col = direction.agg_col();
    let output = direction.output_column();
    format!(
        "WITH g AS (SELECT {group_col}, array_agg(DISTINCT {agg_col}) c FROM {raw_table} GROUP BY 1) \
         SELECT g.{group_col} AS corpusid, \
                json_agg(json_build_object('corpusid', x, 'title', COALESCE(t.title, '')) ORDER BY x)::TEXT AS {output} \
         FROM g CROSS JOIN LATERAL unnest(g.c) x \
         LEFT JOIN corpusid_mapping_title t ON t.corpusid = x \
         GROUP BY 1;"
    )
}

/// Stage 3/4: materialise the aggregation into its own indexed temp table, so Stage 5's
/// merge UPDATEs can join by corpusid without recomputing the aggregation.
pub fn create_temp_aggregation_sql(temp_table: &str, raw_table: &str, direction: &Direction) -> Vec<String> {
    let output = direction.output_column();
    let select = aggregation_select_sql(raw_table, direction);
    // Strip the trailing `;` from the select so it nests inside `CREATE TABLE AS`.
    let select = select.trim_end_matches(';');
    vec![
        format!("DROP TABLE IF EXISTS {temp_table};"),
        format!("CREATE TABLE {temp_table} AS {select};"),
        format!("CREATE INDEX idx_{temp_table}_corpusid ON {temp_table} (corpusid);"),
        format!("ANALYZE {temp_table};"),
        format!("-- {output} populated on {temp_table}"),
    ]
}

/// Stage 5: merge `temp_references`/`temp_citations` into `main_table` by corpusid,
/// then normalise any still-NULL/empty-object array columns to `'[]'`.
pub fn merge_into_main_sql(main_table: &str, temp_references: &str, temp_citations: &str) -> Vec<String> {
    vec![
        format!(
            "UPDATE {main_table} m SET \"references\" = r.\"references\" \
             FROM {temp_references} r WHERE r.corpusid = m.corpusid;"
        ),
        format!(
            "UPDATE {main_table} m SET citations = c.citations \
             FROM {temp_citations} c WHERE c.corpusid = m.corpusid;"
        ),
        format!(
            "UPDATE {main_table} SET \"references\" = '[]' \
             WHERE \"references\" IS NULL OR \"references\" = '{{}}' OR \"references\" = '';"
        ),
        format!(
            "UPDATE {main_table} SET citations = '[]' \
             WHERE citations IS NULL OR citations = '{{}}' OR citations = '';"
        ),
    ]
}

/// Stage 6: drop the temp aggregation tables, and optionally the raw edge table once
/// its edges have been folded into `main_table`.
pub fn cleanup_sql(temp_references: &str, temp_citations: &str, raw_table: Option<&str>) -> Vec<String> {
    let mut stmts = vec![
        format!("DROP TABLE IF EXISTS {temp_references};"),
        format!("DROP TABLE IF EXISTS {temp_citations};"),
    ];
    if let Some(raw) = raw_table {
        stmts.push(format!("DROP TABLE IF EXISTS {raw};"));
    }
    stmts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_raw_table_has_no_index_and_autovacuum_off() {
        let sql = create_raw_table_sql("citation_raw");
        assert!(!sql.contains("PRIMARY KEY"));
        assert!(sql.contains("autovacuum_enabled = false"));
    }

    #[test]
    fn outgoing_aggregation_groups_by_citing_and_quotes_references() {
        let sql = aggregation_select_sql("citation_raw", &Direction::Outgoing);
        assert!(sql.contains("GROUP BY 1"));
        assert!(sql.contains("citingcorpusid, array_agg(DISTINCT citedcorpusid)"));
        assert!(sql.contains("\"references\""));
    }

    #[test]
    fn incoming_aggregation_groups_by_cited_and_uses_citations_column() {
        let sql = aggregation_select_sql("citation_raw", &Direction::Incoming);
        assert!(sql.contains("citedcorpusid, array_agg(DISTINCT citingcorpusid)"));
        assert!(sql.contains(" AS citations"));
        assert!(!sql.contains("\"citations\""));
    }

    #[test]
    fn references_column_is_always_quoted_in_merge_sql() {
        let stmts = merge_into_main_sql("papers", "temp_references", "temp_citations");
        for stmt in &stmts {
            if stmt.contains("references") {
                assert!(stmt.contains("\"references\""), "unquoted references in: {stmt}");
            }
        }
    }

    #[test]
    fn merge_normalises_empty_arrays_to_bracket_pair() {
        let stmts = merge_into_main_sql("papers", "temp_references", "temp_citations");
        assert!(stmts.iter().any(|s| s.contains("SET \"references\" = '[]'")));
        assert!(stmts.iter().any(|s| s.contains("SET citations = '[]'")));
    }

    #[test]
    fn cleanup_drops_raw_table_only_when_requested() {
        let without_raw = cleanup_sql("temp_references", "temp_citations", None);
        assert_eq!(without_raw.len(), 2);
        let with_raw = cleanup_sql("temp_references", "temp_citations", Some("citation_raw"));
        assert_eq!(with_raw.len(), 3);
        assert!(with_raw[2].contains("citation_raw"));
    }
}
