//! Typed command union dispatched by the host bus
//!
//! Each variant corresponds to one worker invocation mode (or a host-side
//! control operation). Keeping the payloads as a tagged union means the
//! shape of every command is enforced at the dispatch boundary instead of
//! being passed around as free-form JSON.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A command sent from the UI client to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "payload")]
pub enum CommandRequest {
    /// Extract metadata from a data file (`get_data_info info <path>`)
    #[serde(rename = "data:info", rename_all = "camelCase")]
    DataInfo {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        operation_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server_timeout_ms: Option<u64>,
    },

    /// Render a variable to an image (`get_data_info plot <path> <var> …`)
    #[serde(rename = "data:plot", rename_all = "camelCase")]
    CreatePlot {
        path: String,
        variable: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        plot_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        style: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        operation_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server_timeout_ms: Option<u64>,
    },

    /// Extract a slice of a variable (`get_data_slice <path> <var> [spec]`)
    #[serde(rename = "data:slice", rename_all = "camelCase")]
    DataSlice {
        path: String,
        variable: String,
        /// JSON selection spec forwarded to the worker verbatim
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selection: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        operation_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server_timeout_ms: Option<u64>,
    },

    /// Fetch the dataset's HTML summary (`get_html_representation <path>`)
    #[serde(rename = "data:html", rename_all = "camelCase")]
    HtmlRepresentation {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        operation_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server_timeout_ms: Option<u64>,
    },

    /// Fetch the dataset's plain-text summary (`get_text_representation <path>`)
    #[serde(rename = "data:text", rename_all = "camelCase")]
    TextRepresentation {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        operation_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server_timeout_ms: Option<u64>,
    },

    /// Check interpreter package availability (`check_package_availability`)
    #[serde(rename = "env:packageCheck")]
    PackageCheck { packages: Vec<String> },

    /// Report interpreter and library versions (`get_show_versions`)
    #[serde(rename = "env:showVersions")]
    ShowVersions,

    /// Abort a tracked operation by id
    #[serde(rename = "ops:abort", rename_all = "camelCase")]
    AbortOperation { operation_id: String },

    /// List the ids of all currently tracked operations
    #[serde(rename = "ops:list")]
    ListOperations,
}

impl CommandRequest {
    /// The wire command name, used as the handler registry key
    pub fn name(&self) -> &'static str {
        match self {
            Self::DataInfo { .. } => "data:info",
            Self::CreatePlot { .. } => "data:plot",
            Self::DataSlice { .. } => "data:slice",
            Self::HtmlRepresentation { .. } => "data:html",
            Self::TextRepresentation { .. } => "data:text",
            Self::PackageCheck { .. } => "env:packageCheck",
            Self::ShowVersions => "env:showVersions",
            Self::AbortOperation { .. } => "ops:abort",
            Self::ListOperations => "ops:list",
        }
    }

    /// All wire command names, in registration order
    pub fn all_names() -> &'static [&'static str] {
        &[
            "data:info",
            "data:plot",
            "data:slice",
            "data:html",
            "data:text",
            "env:packageCheck",
            "env:showVersions",
            "ops:abort",
            "ops:list",
        ]
    }

    /// Split into the `(command, payload)` pair of the request wire shape
    pub fn into_wire(self) -> (String, Value) {
        let name = self.name().to_string();
        let payload = match serde_json::to_value(&self) {
            Ok(Value::Object(mut fields)) => fields.remove("payload").unwrap_or(Value::Null),
            _ => Value::Null,
        };
        (name, payload)
    }

    /// Reassemble from the `(command, payload)` pair of an inbound request
    pub fn from_wire(command: &str, payload: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(json!({ "command": command, "payload": payload }))
    }
}
