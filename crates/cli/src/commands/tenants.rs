//! Configured tenants

use picanvas_common::HarnessConfig;
use serde::Serialize;

use crate::output::{print_info, print_list, OutputFormat, TableDisplay};

#[derive(Debug, Serialize)]
pub struct TenantRow {
    pub key: String,
    pub name: String,
    pub site_url: String,
    pub default: bool,
}

impl TableDisplay for TenantRow {
    fn headers() -> Vec<&'static str> {
        vec!["Key", "Name", "Site URL", "Default"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.key.clone(),
            self.name.clone(),
            self.site_url.clone(),
            if self.default { "*".to_string() } else { String::new() },
        ]
    }
}

pub fn rows(config: &HarnessConfig) -> Vec<TenantRow> {
    let default_key = config.tenant(None).ok().map(|(key, _)| key.to_string());
    config
        .tenants
        .iter()
        .map(|(key, tenant)| TenantRow {
            key: key.clone(),
            name: tenant.display_name.clone().unwrap_or_else(|| key.clone()),
            site_url: tenant.site_url.clone(),
            default: default_key.as_deref() == Some(key.as_str()),
        })
        .collect()
}

pub fn execute(config: &HarnessConfig, format: OutputFormat) {
    let rows = rows(config);
    if rows.is_empty() {
        print_info("No tenants configured. Add a [tenants.<key>] table with a site_url to the config file.");
        return;
    }
    print_list(&rows, format);
}
