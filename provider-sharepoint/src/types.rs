//! Microsoft Graph response types
//!
//! Only the fields the connector reads are modelled.

use serde::Deserialize;

/// `GET /sites/{hostname}:/sites/{name}`
#[derive(Debug, Clone, Deserialize)]
pub struct Site {
    pub id: String,
    #[serde(default, rename = "displayName")]
    pub display_name: Option<String>,
}

/// `GET /sites/{site-id}/drives`
#[derive(Debug, Clone, Deserialize)]
pub struct DriveList {
    #[serde(default)]
    pub value: Vec<Drive>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Drive {
    pub id: String,
    pub name: String,
}

/// `GET /drives/{drive-id}/root:/{path}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// RFC 3339 timestamp of the last content or metadata change
    #[serde(default)]
    pub last_modified_date_time: Option<String>,
}

/// `GET …/workbook/worksheets('{name}')/usedRange(valuesOnly=true)`
///
/// `values` is row-major; the first row holds the headers.
#[derive(Debug, Clone, Deserialize)]
pub struct UsedRange {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub values: Vec<Vec<serde_json::Value>>,
}
