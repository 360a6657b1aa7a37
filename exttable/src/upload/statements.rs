//! Statements sent to the analytic destination.
//!
//! Object names are enclosed in brackets; a closing bracket inside a name is doubled.

use exttable_config::shared::{StagingSourceConfig, TABLE_NAME_PLACEHOLDER};

use crate::schema::LOAD_STATE_COLUMN;
use crate::types::{DataType, ExternalTableDescriptor, LoadState, SourceColumn};

/// Precision and scale of decimal destination columns.
const DECIMAL_DEFINITION: &str = "DECIMAL(38, 10)";

pub fn enclose(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Destination type and nullability of a mapped column.
///
/// Key columns are never nullable since they form the primary key.
pub fn column_definition(column: &SourceColumn) -> String {
    let data_type = match column.data_type {
        DataType::Text | DataType::Geographic => match column.length {
            Some(length) if length > 0 => format!("NVARCHAR({length})"),
            _ => "NVARCHAR(MAX)".to_owned(),
        },
        DataType::Integer => "INT".to_owned(),
        DataType::BigInteger => "BIGINT".to_owned(),
        DataType::Decimal => DECIMAL_DEFINITION.to_owned(),
        DataType::Float => "FLOAT".to_owned(),
        DataType::Boolean => "BIT".to_owned(),
        DataType::DateTime => "DATETIME".to_owned(),
        DataType::Guid => "UNIQUEIDENTIFIER".to_owned(),
    };

    let nullability = if column.is_nullable && !column.is_key {
        "NULL"
    } else {
        "NOT NULL"
    };

    format!("{data_type} {nullability}")
}

/// `CREATE TABLE` for the destination of `table`, keyed by its key mappings in ordinal order.
pub fn create_table_statement(table: &ExternalTableDescriptor) -> String {
    let mut definitions: Vec<String> = table
        .field_mappings
        .iter()
        .map(|mapping| {
            format!(
                "{} {}",
                enclose(&mapping.target.name),
                column_definition(&mapping.source)
            )
        })
        .collect();

    let keys: Vec<String> = table
        .key_mappings()
        .iter()
        .map(|mapping| enclose(&mapping.target.name))
        .collect();
    if !keys.is_empty() {
        definitions.push(format!("PRIMARY KEY ( {} )", keys.join(", ")));
    }

    format!(
        "CREATE TABLE {} ( {} )",
        enclose(&table.target_table),
        definitions.join(", ")
    )
}

/// Clear statement built from a template containing the table name placeholder.
pub fn clear_table_statement(template: &str, table_name: &str) -> String {
    template.replace(TABLE_NAME_PLACEHOLDER, table_name)
}

/// Cross-store bulk insert copying every row of `store_name` not yet uploaded.
pub fn staging_insert_statement(
    table: &ExternalTableDescriptor,
    source: &StagingSourceConfig,
    store_name: &str,
) -> String {
    let columns: Vec<String> = table
        .field_mappings
        .iter()
        .map(|mapping| enclose(&mapping.target.name))
        .collect();

    format!(
        "INSERT INTO {} SELECT {} FROM [EXTERNALDBPROVIDER:{}:CONNSTR:{}:DATABASE:{}:TABLE:{}:FACTORY:{}] where {} != {}",
        enclose(&table.target_table),
        columns.join(", "),
        source.provider,
        source.connection_string,
        source.database,
        store_name,
        source.factory,
        enclose(LOAD_STATE_COLUMN),
        LoadState::Uploaded.as_i32()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{column, key_column, table};
    use crate::types::TableType;

    fn orders() -> ExternalTableDescriptor {
        let mut descriptor = table(
            TableType::Analysis,
            vec![
                key_column("region", DataType::Text),
                column("total", DataType::Decimal),
                key_column("order.id", DataType::BigInteger),
            ],
        );
        descriptor.target_table = "Orders".to_owned();
        descriptor.field_mappings[0].source.length = Some(8);
        descriptor.field_mappings[0].source.key_ordinal = 2;
        descriptor
    }

    #[test]
    fn create_table_orders_keys_by_ordinal() {
        assert_eq!(
            create_table_statement(&orders()),
            "CREATE TABLE [Orders] ( [region] NVARCHAR(8) NOT NULL, [total] DECIMAL(38, 10) NULL, \
             [id] BIGINT NOT NULL, PRIMARY KEY ( [id], [region] ) )"
        );
    }

    #[test]
    fn insert_reads_rows_not_yet_uploaded() {
        let source = StagingSourceConfig {
            provider: "OLEDB".to_owned(),
            connection_string: "Server=meta".to_owned(),
            database: "Metadata".to_owned(),
            factory: "SqlServer".to_owned(),
        };

        assert_eq!(
            staging_insert_statement(&orders(), &source, "ExtTab_1"),
            "INSERT INTO [Orders] SELECT [region], [total], [id] FROM \
             [EXTERNALDBPROVIDER:OLEDB:CONNSTR:Server=meta:DATABASE:Metadata:TABLE:ExtTab_1:FACTORY:SqlServer] \
             where [ExtTabLoadState] != 2"
        );
    }

    #[test]
    fn clear_substitutes_the_table_name() {
        assert_eq!(
            clear_table_statement("TRUNCATE TABLE [@TableName]", "Orders"),
            "TRUNCATE TABLE [Orders]"
        );
    }

    #[test]
    fn brackets_in_names_are_escaped() {
        assert_eq!(enclose("odd]name"), "[odd]]name]");
    }
}
