//! Built-in protocol handlers.

use crate::downstream::DownstreamProxy;
use crate::error::HandlerError;
use crate::router::{Handler, HandlerContext, HandlerOutput, ProtocolRouter};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use shiftgate_protocol::RequestEnvelope;

const MSG_LOGIN_OK: &str = "로그인 성공";
const MSG_DETAIL_OK: &str = "변경신청목록 전송완료!";
const MSG_ASK_OK: &str = "근무변경신청 처리완료!";
const MSG_CANCEL_OK: &str = "근무변경취소 처리완료!";
const MSG_TIMETABLE_OK: &str = "근무표 생성 완료";
const MSG_SUMMARY_OK: &str = "요약 완료";
const MSG_ENGINE_ERROR: &str = "compute engine returned an error";

/// Compute engine protocol for schedule generation.
pub const ENGINE_GEN_TIMETABLE: &str = "py_gen_timetable";
/// Compute engine protocol for handover summaries.
pub const ENGINE_HANDOVER_SUMMARY: &str = "py_req_handover_summary";

/// Registers every built-in handler.
pub fn register_defaults(router: &mut ProtocolRouter) {
    router.register("login", Login);
    router.register("login_admin", LoginAdmin);
    router.register("shift_change_detail", ShiftChangeDetail);
    router.register("ask_shift_change", AskShiftChange);
    router.register("cancel_shift_change", CancelShiftChange);
    router.register("gen_timeTable", GenTimeTable);
    router.register("summary_journal", SummaryJournal);
}

fn str_field<'a>(data: &'a Map<String, Value>, name: &'static str) -> Result<&'a str, HandlerError> {
    data.get(name)
        .and_then(Value::as_str)
        .ok_or(HandlerError::InvalidField(name))
}

/// Accepts a JSON integer or a string holding one.
fn int_field(data: &Map<String, Value>, name: &'static str) -> Result<i64, HandlerError> {
    match data.get(name) {
        Some(Value::Number(n)) => n.as_i64().ok_or(HandlerError::InvalidField(name)),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| HandlerError::InvalidField(name)),
        _ => Err(HandlerError::InvalidField(name)),
    }
}

/// Builds `YYYY-MM` from `req_year` and `req_month`.
fn year_month(data: &Map<String, Value>) -> Result<String, HandlerError> {
    let year = int_field(data, "req_year")?;
    let month = int_field(data, "req_month")?;
    if !(1..=9999).contains(&year) {
        return Err(HandlerError::InvalidField("req_year"));
    }
    if !(1..=12).contains(&month) {
        return Err(HandlerError::InvalidField("req_month"));
    }
    Ok(format!("{:04}-{:02}", year, month))
}

/// Sends `request` to the compute engine and requires `"resp": "success"`.
async fn call_engine(
    downstream: &DownstreamProxy,
    request: RequestEnvelope,
) -> Result<Map<String, Value>, HandlerError> {
    let envelope = downstream.call(&request).await?;
    let reply = match envelope.data {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    if reply.get("resp").and_then(Value::as_str) != Some("success") {
        let message = if envelope.message.is_empty() {
            MSG_ENGINE_ERROR.to_string()
        } else {
            envelope.message
        };
        return Err(HandlerError::Rejected(message));
    }
    Ok(reply)
}

/// Staff login.
pub struct Login;

#[async_trait]
impl Handler for Login {
    fn required_fields(&self) -> &'static [&'static str] {
        &["id", "pw"]
    }

    async fn handle(
        &self,
        data: &Map<String, Value>,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<HandlerOutput, HandlerError> {
        let login = ctx.store.login(str_field(data, "id")?, str_field(data, "pw")?)?;
        tracing::info!("Staff {} logged in", login.staff_uid);
        Ok(HandlerOutput::new(MSG_LOGIN_OK).with_data(serde_json::to_value(login)?))
    }
}

/// Admin login.
pub struct LoginAdmin;

#[async_trait]
impl Handler for LoginAdmin {
    fn required_fields(&self) -> &'static [&'static str] {
        &["id", "pw"]
    }

    async fn handle(
        &self,
        data: &Map<String, Value>,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<HandlerOutput, HandlerError> {
        let login = ctx
            .store
            .login_admin(str_field(data, "id")?, str_field(data, "pw")?)?;
        tracing::info!("Admin {} logged in", login.admin_uid);
        Ok(HandlerOutput::new(MSG_LOGIN_OK).with_data(serde_json::to_value(login)?))
    }
}

/// Lists a staff member's shift change requests for one month.
pub struct ShiftChangeDetail;

#[async_trait]
impl Handler for ShiftChangeDetail {
    fn required_fields(&self) -> &'static [&'static str] {
        &["staff_uid", "req_year", "req_month"]
    }

    async fn handle(
        &self,
        data: &Map<String, Value>,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<HandlerOutput, HandlerError> {
        let staff_uid = int_field(data, "staff_uid")?;
        let year_month = year_month(data)?;
        let requests = ctx.store.shift_change_detail(staff_uid, &year_month)?;
        Ok(HandlerOutput::new(MSG_DETAIL_OK).with_data(serde_json::to_value(requests)?))
    }
}

/// Files a shift change request.
pub struct AskShiftChange;

#[async_trait]
impl Handler for AskShiftChange {
    fn required_fields(&self) -> &'static [&'static str] {
        &["staff_uid", "date", "duty_type", "message"]
    }

    async fn handle(
        &self,
        data: &Map<String, Value>,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<HandlerOutput, HandlerError> {
        let staff_uid = int_field(data, "staff_uid")?;
        let date = str_field(data, "date")?;
        NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| HandlerError::InvalidField("date"))?;
        let duty_type = str_field(data, "duty_type")?;
        let message = str_field(data, "message")?;

        let duty_request_uid = ctx
            .store
            .ask_shift_change(staff_uid, date, duty_type, message)?;
        Ok(HandlerOutput::new(MSG_ASK_OK).with_data(json!({ "duty_request_uid": duty_request_uid })))
    }
}

/// Withdraws a pending shift change request.
pub struct CancelShiftChange;

#[async_trait]
impl Handler for CancelShiftChange {
    fn required_fields(&self) -> &'static [&'static str] {
        &["duty_request_uid"]
    }

    async fn handle(
        &self,
        data: &Map<String, Value>,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<HandlerOutput, HandlerError> {
        let uid = int_field(data, "duty_request_uid")?;
        let cancelled = ctx.store.cancel_shift_change(uid)?;
        Ok(HandlerOutput::new(MSG_CANCEL_OK).with_data(serde_json::to_value(cancelled)?))
    }
}

/// Generates a team's monthly schedule on the compute engine and stores it.
pub struct GenTimeTable;

#[async_trait]
impl Handler for GenTimeTable {
    fn required_fields(&self) -> &'static [&'static str] {
        &["admin_uid", "req_year", "req_month"]
    }

    async fn handle(
        &self,
        data: &Map<String, Value>,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<HandlerOutput, HandlerError> {
        let admin_uid = int_field(data, "admin_uid")?;
        let year_month = year_month(data)?;

        let team = ctx.store.admin_context(admin_uid, &year_month)?;
        let staff: Vec<Value> = ctx
            .store
            .staff_by_team(team.team_uid)?
            .into_iter()
            .map(|s| {
                json!({
                    "name": s.name,
                    "staff_id": s.staff_uid,
                    "grade": s.grade,
                    "total_monthly_work_hours": s.monthly_workhour,
                })
            })
            .collect();
        tracing::info!(
            "Generating {} schedule for team {} ({} staff)",
            year_month,
            team.team_uid,
            staff.len()
        );

        let request = RequestEnvelope::new(ENGINE_GEN_TIMETABLE).with_data(json!({
            "staff_data": { "staff": staff },
            "position": team.team_name,
            "target_month": team.year_month,
            "custom_rules": {
                "shifts": team.shifts,
                "shift_hours": team.shift_hours,
            },
            "night_shifts": team.night_shifts,
            "off_shifts": team.off_shifts,
        }));
        let reply = call_engine(ctx.downstream, request).await?;

        let rows = schedule_rows(reply.get("data"))?;
        let mut stored = 0usize;
        for row in &rows {
            let date = row.get("date").and_then(Value::as_str).unwrap_or_default();
            let shift = row.get("shift").and_then(Value::as_str).unwrap_or_default();
            let Some(people) = row.get("people").and_then(Value::as_array) else {
                continue;
            };
            for person in people {
                let Some(staff_uid) = person
                    .get("staff_uid")
                    .or_else(|| person.get("staff_id"))
                    .and_then(Value::as_i64)
                    .filter(|uid| *uid >= 0)
                else {
                    continue;
                };
                match ctx.store.insert_schedule(date, staff_uid, shift) {
                    Ok(()) => stored += 1,
                    Err(e) => {
                        tracing::warn!("Schedule insert failed ({}, {}): {}", date, staff_uid, e)
                    }
                }
            }
        }
        tracing::info!("Stored {} schedule entries for {}", stored, year_month);

        Ok(HandlerOutput::new(MSG_TIMETABLE_OK).with_data(Value::Array(rows)))
    }
}

/// Flattens a schedule into rows.
///
/// Accepts either an array of rows or an object keyed by date whose values
/// are arrays of entries; in the latter case `date` is injected into each.
fn schedule_rows(data: Option<&Value>) -> Result<Vec<Value>, HandlerError> {
    match data {
        Some(Value::Object(days)) => {
            let mut rows = Vec::new();
            for (date, entries) in days {
                let Some(entries) = entries.as_array() else {
                    continue;
                };
                for entry in entries {
                    if let Value::Object(fields) = entry {
                        let mut row = fields.clone();
                        row.insert("date".to_string(), Value::String(date.clone()));
                        rows.push(Value::Object(row));
                    }
                }
            }
            Ok(rows)
        }
        Some(Value::Array(rows)) => Ok(rows.clone()),
        _ => Err(HandlerError::Rejected(
            "compute engine reply has no schedule data".to_string(),
        )),
    }
}

/// Summarizes a handover journal on the compute engine.
pub struct SummaryJournal;

#[async_trait]
impl Handler for SummaryJournal {
    fn required_fields(&self) -> &'static [&'static str] {
        &["text"]
    }

    fn fail_data(&self) -> Option<Value> {
        Some(json!({ "text": "" }))
    }

    async fn handle(
        &self,
        data: &Map<String, Value>,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<HandlerOutput, HandlerError> {
        let text = str_field(data, "text")?;
        let request = RequestEnvelope::new(ENGINE_HANDOVER_SUMMARY).with_data(json!({
            "task": "summarize_handover",
            "input_text": text,
        }));
        let reply = call_engine(ctx.downstream, request).await?;

        let Some(result) = reply.get("data").and_then(Value::as_object) else {
            return Err(HandlerError::Rejected(
                "compute engine reply has no data".to_string(),
            ));
        };
        let summary = result.get("result").and_then(Value::as_str).unwrap_or_default();
        Ok(HandlerOutput::new(MSG_SUMMARY_OK).with_data(json!({ "text": summary })))
    }
}
