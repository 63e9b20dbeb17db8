//! Request building and response formatting.

use crate::Commands;
use colored::Colorize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use shiftgate_protocol::{RequestEnvelope, ResponseEnvelope};

/// Builds the request envelope for a command.
pub fn build_request(cmd: Commands) -> Result<RequestEnvelope, Box<dyn std::error::Error>> {
    let request = match cmd {
        Commands::Send { protocol, data } => {
            let request = RequestEnvelope::new(protocol);
            match data {
                Some(data) => request.with_data(parse_json_arg(&data)?),
                None => request,
            }
        }

        Commands::Login { id, pw } => {
            RequestEnvelope::new("login").with_data(json!({ "id": id, "pw": pw }))
        }

        Commands::LoginAdmin { id, pw } => {
            RequestEnvelope::new("login_admin").with_data(json!({ "id": id, "pw": pw }))
        }

        Commands::ShiftRequests {
            staff_uid,
            year,
            month,
        } => RequestEnvelope::new("shift_change_detail").with_data(json!({
            "staff_uid": staff_uid,
            "req_year": year.to_string(),
            "req_month": month.to_string(),
        })),

        Commands::AskShiftChange {
            staff_uid,
            date,
            duty_type,
            message,
        } => RequestEnvelope::new("ask_shift_change").with_data(json!({
            "staff_uid": staff_uid,
            "date": date,
            "duty_type": duty_type,
            "message": message,
        })),

        Commands::CancelShiftChange { duty_request_uid } => {
            RequestEnvelope::new("cancel_shift_change")
                .with_data(json!({ "duty_request_uid": duty_request_uid }))
        }

        Commands::GenTimetable {
            admin_uid,
            year,
            month,
        } => RequestEnvelope::new("gen_timeTable").with_data(json!({
            "admin_uid": admin_uid,
            "req_year": year.to_string(),
            "req_month": month.to_string(),
        })),

        Commands::Summary { text } => {
            let text = match text.strip_prefix('@') {
                Some(path) => std::fs::read_to_string(path)?,
                None => text,
            };
            RequestEnvelope::new("summary_journal").with_data(json!({ "text": text }))
        }

        Commands::HashPassword { .. } => return Err("hash-password is handled locally".into()),
    };
    Ok(request)
}

/// Formats a response for display.
pub fn format_response(response: &ResponseEnvelope) -> String {
    let status = if response.is_success() {
        "success".green()
    } else {
        "fail".red()
    };

    let mut output = format!("{} [{}]", response.protocol.cyan(), status);
    if !response.message.is_empty() {
        output.push_str(&format!(" {}", response.message));
    }
    if let Some(data) = &response.data {
        output.push('\n');
        output.push_str(&format_json(data));
    }
    output
}

/// SHA-256 hex digest, as stored in seed fixtures.
///
/// Must match `shiftgate_server::store::hash_password`; the CLI keeps its own
/// copy so it links only the client and protocol crates.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Parses a JSON argument (or @file).
fn parse_json_arg(arg: &str) -> Result<Value, Box<dyn std::error::Error>> {
    if let Some(path) = arg.strip_prefix('@') {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(arg)?)
    }
}

/// Formats JSON for display.
pub fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
