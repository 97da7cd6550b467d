//! Rendering schema context for SQL generation.

use indexmap::IndexMap;

use super::element::SchemaElement;
use super::embedder::RelevanceMatch;
use crate::metadata::{ColumnInfo, SchemaSnapshot, TableInfo};

/// Default number of column lines rendered per table.
pub const DEFAULT_MAX_COLUMNS_PER_TABLE: usize = 8;

const FOCUSED_SAMPLE_VALUES: usize = 2;
const FULL_SAMPLE_VALUES: usize = 3;

/// Turns ranked schema matches into the compact context string handed to the
/// SQL generator.
///
/// Rendering is deterministic: the same matches always produce the same
/// string.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    max_columns_per_table: usize,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_COLUMNS_PER_TABLE)
    }
}

impl ContextAssembler {
    pub fn new(max_columns_per_table: usize) -> Self {
        Self {
            max_columns_per_table,
        }
    }

    /// Unique table names in order of first appearance.
    pub fn relevant_tables(&self, matches: &[RelevanceMatch]) -> Vec<String> {
        let mut tables: Vec<String> = Vec::new();
        for m in matches {
            let name = m.element.table_name();
            if !tables.iter().any(|t| t == name) {
                tables.push(name.to_string());
            }
        }
        tables
    }

    /// Render matches grouped by table.
    ///
    /// ```text
    /// Table: orders
    /// Relevant columns:
    ///   - amount (Float64) [examples: 10.5, 3] (similarity: 0.91)
    /// ```
    ///
    /// Column lines keep ranking order and are capped per table. Empty input
    /// renders as an empty string.
    pub fn focused_context(&self, matches: &[RelevanceMatch]) -> String {
        let mut grouped: IndexMap<&str, Vec<(&ColumnInfo, f32)>> = IndexMap::new();
        for m in matches {
            let columns = grouped.entry(m.element.table_name()).or_default();
            if let SchemaElement::Column { info, .. } = &m.element {
                columns.push((info, m.similarity));
            }
        }

        grouped
            .iter()
            .map(|(table, columns)| self.focused_block(table, columns))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn focused_block(&self, table: &str, columns: &[(&ColumnInfo, f32)]) -> String {
        let mut block = format!("Table: {}\n", table);
        if columns.is_empty() {
            return block;
        }

        block.push_str("Relevant columns:\n");
        for (column, similarity) in columns.iter().take(self.max_columns_per_table) {
            block.push_str(&format!("  - {} ({})", column.name, column.column_type));
            push_examples(&mut block, column, FOCUSED_SAMPLE_VALUES);
            block.push_str(&format!(" (similarity: {:.2})\n", similarity));
        }
        block
    }

    /// Render every table of a snapshot with all of its columns.
    ///
    /// Used when relevance retrieval is unavailable.
    pub fn full_schema_context(&self, snapshot: &SchemaSnapshot) -> String {
        snapshot
            .tables()
            .map(full_block)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn full_block(table: &TableInfo) -> String {
    let mut block = format!("Table: {}", table.name);
    if let Some(rows) = table.row_count.filter(|&n| n > 0) {
        block.push_str(&format!(" ({} rows)", thousands(rows)));
    }

    block.push_str("\nColumns:\n");
    for column in &table.columns {
        block.push_str(&format!("  - {} ({})", column.name, column.column_type));
        push_examples(&mut block, column, FULL_SAMPLE_VALUES);
        block.push('\n');
    }
    block
}

fn push_examples(out: &mut String, column: &ColumnInfo, limit: usize) {
    if column.has_samples() {
        let values: Vec<&str> = column
            .sample_values
            .iter()
            .take(limit)
            .map(String::as_str)
            .collect();
        out.push_str(&format!(" [examples: {}]", values.join(", ")));
    }
}

/// Format with `,` thousands separators.
fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
