use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Destination provider whose bulk insert already replaces the full table contents.
pub const DEFAULT_PUSH_COMPLETE_PROVIDER: &str = "ADS Server";

/// Placeholder replaced by the destination table name in [`UploadConfig::clear_table_template`].
pub const TABLE_NAME_PLACEHOLDER: &str = "@TableName";

pub const DEFAULT_CLEAR_TABLE_TEMPLATE: &str = "DELETE FROM [@TableName]";

pub const DEFAULT_STAGING_PROVIDER: &str = "OLEDB";

fn default_push_complete_provider() -> String {
    DEFAULT_PUSH_COMPLETE_PROVIDER.to_owned()
}

fn default_clear_table_template() -> String {
    DEFAULT_CLEAR_TABLE_TEMPLATE.to_owned()
}

fn default_staging_provider() -> String {
    DEFAULT_STAGING_PROVIDER.to_owned()
}

/// Logical address of the staging database as seen from the analytic destination.
///
/// The destination resolves `[EXTERNALDBPROVIDER:...]` table references through these values
/// when copying staged rows across stores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StagingSourceConfig {
    #[serde(default = "default_staging_provider")]
    pub provider: String,
    pub connection_string: String,
    pub database: String,
    pub factory: String,
}

/// Settings for draining staged rows into analytic destination tables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadConfig {
    pub staging_source: StagingSourceConfig,
    /// Provider name of the analytic destination connection.
    pub destination_provider: String,
    #[serde(default = "default_push_complete_provider")]
    pub push_complete_provider: String,
    /// Statement clearing an existing destination table, with `@TableName` substituted.
    #[serde(default = "default_clear_table_template")]
    pub clear_table_template: String,
}

impl UploadConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.staging_source.connection_string.trim().is_empty() {
            return Err(ValidationError::UploadConfig(
                "`staging_source.connection_string` cannot be empty".to_owned(),
            ));
        }

        if !self.clear_table_template.contains(TABLE_NAME_PLACEHOLDER) {
            return Err(ValidationError::UploadConfig(format!(
                "`clear_table_template` must contain `{TABLE_NAME_PLACEHOLDER}`"
            )));
        }

        Ok(())
    }

    /// Whether the destination skips clearing before a reload.
    pub fn is_push_complete(&self) -> bool {
        self.destination_provider == self.push_complete_provider
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload_config(destination_provider: &str) -> UploadConfig {
        UploadConfig {
            staging_source: StagingSourceConfig {
                provider: DEFAULT_STAGING_PROVIDER.to_owned(),
                connection_string: "Server=meta;Integrated Security=SSPI".to_owned(),
                database: "Metadata".to_owned(),
                factory: "SqlServer".to_owned(),
            },
            destination_provider: destination_provider.to_owned(),
            push_complete_provider: default_push_complete_provider(),
            clear_table_template: default_clear_table_template(),
        }
    }

    #[test]
    fn push_complete_provider_is_detected() {
        assert!(upload_config("ADS Server").is_push_complete());
        assert!(!upload_config("SqlServer").is_push_complete());
    }

    #[test]
    fn clear_template_needs_placeholder() {
        let mut config = upload_config("SqlServer");
        assert!(config.validate().is_ok());

        config.clear_table_template = "TRUNCATE TABLE x".to_owned();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::UploadConfig(_))
        ));
    }
}
