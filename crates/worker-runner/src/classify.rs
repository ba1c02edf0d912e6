//! Outcome classifier for finished worker processes
//!
//! Turns `(exit code, aborted flag, stdout, stderr)` into a typed result
//! or a typed error. The substring matching on diagnostic text is
//! best-effort and deliberately kept in this one pure function so it can
//! be unit-tested and swapped without touching process management.

use sdv_core::{ErrorKind, OperationError};
use serde_json::Value;

/// Markers scanned, in order, to assign an error kind to diagnostic text
const MISSING_DEPENDENCY_MARKERS: &[&str] = &["ModuleNotFoundError", "No module named"];
const PERMISSION_DENIED_MARKERS: &[&str] = &["PermissionError", "Permission denied"];
const FILE_NOT_FOUND_MARKERS: &[&str] = &["FileNotFoundError", "No such file or directory"];

/// Classify a finished worker invocation
///
/// `aborted` is true only when the supervisor itself signalled the process;
/// that always wins over any exit-code interpretation so a cancellation is
/// never reported as a crash.
pub fn classify(
    exit_code: Option<i32>,
    aborted: bool,
    stdout: &str,
    stderr: &str,
) -> std::result::Result<Value, OperationError> {
    if aborted {
        return Err(OperationError::new(
            ErrorKind::Aborted,
            "worker was cancelled or timed out before completing",
        ));
    }

    if exit_code == Some(0) {
        let trimmed = stdout.trim();
        return Ok(match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => value,
            // Callers that expect structured data validate the shape themselves
            Err(_) => Value::String(trimmed.to_string()),
        });
    }

    let message = failure_message(exit_code, stdout, stderr);
    let kind = kind_for_diagnostics(&format!("{stderr}\n{stdout}"));
    Err(OperationError::new(kind, message))
}

/// Pick the most useful human-readable message for a non-zero exit
fn failure_message(exit_code: Option<i32>, stdout: &str, stderr: &str) -> String {
    // Workers may report their own diagnosis as {"error": "..."} on stdout
    if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(stdout.trim()) {
        if let Some(Value::String(message)) = fields.get("error") {
            return message.clone();
        }
    }

    if let Some(line) = last_non_empty_line(stderr) {
        return line.to_string();
    }
    if let Some(line) = last_non_empty_line(stdout) {
        return line.to_string();
    }

    match exit_code {
        Some(code) => format!("worker failed with exit code {code}"),
        None => "worker terminated without an exit code".to_string(),
    }
}

fn kind_for_diagnostics(text: &str) -> ErrorKind {
    if MISSING_DEPENDENCY_MARKERS.iter().any(|m| text.contains(m)) {
        ErrorKind::MissingDependency
    } else if PERMISSION_DENIED_MARKERS.iter().any(|m| text.contains(m)) {
        ErrorKind::PermissionDenied
    } else if FILE_NOT_FOUND_MARKERS.iter().any(|m| text.contains(m)) {
        ErrorKind::FileNotFound
    } else {
        ErrorKind::Generic
    }
}

fn last_non_empty_line(text: &str) -> Option<&str> {
    text.lines().rev().map(str::trim).find(|line| !line.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clean_exit_with_json_parses() {
        let result = classify(Some(0), false, "{\"v\":1}\n", "").unwrap();
        assert_eq!(result, json!({"v": 1}));
    }

    #[test]
    fn clean_exit_with_plain_text_is_not_an_error() {
        let result = classify(Some(0), false, "not json\n", "").unwrap();
        assert_eq!(result, Value::String("not json".to_string()));
    }

    #[test]
    fn aborted_wins_over_exit_code() {
        let err = classify(None, true, "", "Terminated").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Aborted);
        assert!(err.message.contains("cancelled or timed out"));
    }

    #[test]
    fn missing_module_is_classified_with_package_name() {
        let stderr = "Traceback (most recent call last):\n  File \"get_data_info.py\", line 44\nModuleNotFoundError: No module named 'xarray'\n";
        let err = classify(Some(1), false, "", stderr).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingDependency);
        assert!(err.message.contains("xarray"));
    }

    #[test]
    fn permission_and_file_errors_are_recognized() {
        let err = classify(Some(1), false, "", "PermissionError: [Errno 13]").unwrap_err();
        assert_eq!(err.kind, ErrorKind::PermissionDenied);

        let err = classify(Some(1), false, "", "FileNotFoundError: sample.nc").unwrap_err();
        assert_eq!(err.kind, ErrorKind::FileNotFound);
    }

    #[test]
    fn structured_stdout_error_is_preferred_over_stderr() {
        let stdout = "{\"error\": \"No engines available for .grib files\"}";
        let err = classify(Some(2), false, stdout, "some traceback noise").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Generic);
        assert_eq!(err.message, "No engines available for .grib files");
    }

    #[test]
    fn silent_failure_falls_back_to_exit_code() {
        let err = classify(Some(3), false, "", "").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Generic);
        assert_eq!(err.message, "worker failed with exit code 3");
    }

    #[test]
    fn stdout_is_used_when_stderr_is_empty() {
        let err = classify(Some(1), false, "first line\nactual failure reason\n", "").unwrap_err();
        assert_eq!(err.message, "actual failure reason");
    }
}
