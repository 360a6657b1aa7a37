//! Copying staged rows into analytic destination tables.

mod connection;
mod reconcile;
mod statements;
mod sync;

pub use connection::{AnalyticConnection, MemoryAnalyticConnection};
pub use reconcile::{CatalogReconciler, NoopReconciler};
pub use statements::{
    clear_table_statement, column_definition, create_table_statement, enclose,
    staging_insert_statement,
};
pub use sync::{NoUpload, TableUploader, UploadSync};
