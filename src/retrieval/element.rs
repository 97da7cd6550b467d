//! Schema elements and their searchable descriptions.

use crate::metadata::{ColumnInfo, SchemaSnapshot, TableInfo};

/// Columns considered for a table description's sample data.
const TABLE_SAMPLE_COLUMNS: usize = 5;
/// Sample values per column in a table description.
const TABLE_SAMPLE_VALUES: usize = 2;
/// Sample values in a column description.
const COLUMN_SAMPLE_VALUES: usize = 3;

/// A table or column, with the description it is embedded under.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaElement {
    Table {
        name: String,
        description: String,
        info: TableInfo,
    },
    Column {
        table: String,
        name: String,
        description: String,
        info: ColumnInfo,
    },
}

impl SchemaElement {
    pub fn table(info: &TableInfo) -> Self {
        Self::Table {
            name: info.name.clone(),
            description: table_description(info),
            info: info.clone(),
        }
    }

    pub fn column(table: &str, info: &ColumnInfo) -> Self {
        Self::Column {
            table: table.to_string(),
            name: info.name.clone(),
            description: column_description(table, info),
            info: info.clone(),
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::Table { description, .. } | Self::Column { description, .. } => description,
        }
    }

    /// The table this element belongs to: its own name for a table, the
    /// owning table for a column.
    pub fn table_name(&self) -> &str {
        match self {
            Self::Table { name, .. } => name,
            Self::Column { table, .. } => table,
        }
    }

    pub fn is_column(&self) -> bool {
        matches!(self, Self::Column { .. })
    }
}

/// Describe a table by name, column list, and a few sample values.
///
/// ```text
/// Table orders with columns: id, status. Sample data: status contains paid, open
/// ```
pub fn table_description(table: &TableInfo) -> String {
    let columns: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    let mut description = format!("Table {} with columns: {}", table.name, columns.join(", "));

    let samples: Vec<String> = table
        .columns
        .iter()
        .take(TABLE_SAMPLE_COLUMNS)
        .filter(|c| c.has_samples())
        .map(|c| {
            let values: Vec<&str> = c
                .sample_values
                .iter()
                .take(TABLE_SAMPLE_VALUES)
                .map(String::as_str)
                .collect();
            format!("{} contains {}", c.name, values.join(", "))
        })
        .collect();

    if !samples.is_empty() {
        description.push_str(". Sample data: ");
        description.push_str(&samples.join("; "));
    }

    description
}

/// Describe a column by name, owning table, type, and a few sample values.
pub fn column_description(table: &str, column: &ColumnInfo) -> String {
    let mut description = format!(
        "Column {} in table {} of type {}",
        column.name, table, column.column_type
    );

    if column.has_samples() {
        let values: Vec<&str> = column
            .sample_values
            .iter()
            .take(COLUMN_SAMPLE_VALUES)
            .map(String::as_str)
            .collect();
        description.push_str(" with example values: ");
        description.push_str(&values.join(", "));
    }

    description
}

/// Flatten a snapshot into elements: each table followed by its columns, in
/// snapshot order.
pub fn elements_from_snapshot(snapshot: &SchemaSnapshot) -> Vec<SchemaElement> {
    snapshot
        .tables()
        .flat_map(|table| {
            std::iter::once(SchemaElement::table(table)).chain(
                table
                    .columns
                    .iter()
                    .map(move |column| SchemaElement::column(&table.name, column)),
            )
        })
        .collect()
}
