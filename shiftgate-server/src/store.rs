//! Data store capability used by handlers.
//!
//! The relational database behind the gateway is reached only through the
//! [`DataStore`] trait. A [`StoreConnector`] hands out one handle per
//! accepted connection; handles are never shared between connections.
//!
//! [`MemoryStore`] is an in-process implementation, seedable from a JSON
//! fixture. Passwords are kept as SHA-256 hex digests.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors reported by a data store. The display text is sent to clients
/// verbatim as the failure message.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid id or password")]
    InvalidCredentials,

    #[error("staff not found: {0}")]
    StaffNotFound(i64),

    #[error("admin not found: {0}")]
    AdminNotFound(i64),

    #[error("team not found: {0}")]
    TeamNotFound(i64),

    #[error("shift change request not found: {0}")]
    RequestNotFound(i64),

    #[error("shift change request {0} is already {1}")]
    RequestNotPending(i64, RequestStatus),

    #[error("unknown duty type: {0}")]
    UnknownDutyType(String),

    #[error("data store unavailable: {0}")]
    Unavailable(String),
}

/// Result of a staff login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffLogin {
    pub staff_uid: i64,
    pub team_uid: i64,
    pub staff_name: String,
}

/// Result of an admin login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminLogin {
    pub admin_uid: i64,
    pub team_uid: i64,
    pub team_name: String,
}

/// Shift change request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestStatus::Pending => write!(f, "pending"),
            RequestStatus::Approved => write!(f, "approved"),
            RequestStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// A staff member's request to change a duty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftRequest {
    pub duty_request_uid: i64,
    pub staff_uid: i64,
    /// `YYYY-MM-DD`.
    pub date: String,
    pub duty_type: String,
    pub message: String,
    pub status: RequestStatus,
}

/// Team context an admin generates schedules for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminContext {
    pub admin_uid: i64,
    pub team_uid: i64,
    pub team_name: String,
    /// `YYYY-MM`.
    pub year_month: String,
    pub shifts: Vec<String>,
    pub shift_hours: BTreeMap<String, u32>,
    pub night_shifts: Vec<String>,
    pub off_shifts: Vec<String>,
}

/// A staff member as the compute engine sees them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffInfo {
    pub staff_uid: i64,
    pub name: String,
    pub grade: i64,
    pub monthly_workhour: u32,
}

/// Domain operations the handlers need.
pub trait DataStore: Send {
    fn login(&mut self, id: &str, pw: &str) -> Result<StaffLogin, StoreError>;

    fn login_admin(&mut self, id: &str, pw: &str) -> Result<AdminLogin, StoreError>;

    /// Requests of `staff_uid` whose date falls in `year_month` (`YYYY-MM`).
    fn shift_change_detail(
        &mut self,
        staff_uid: i64,
        year_month: &str,
    ) -> Result<Vec<ShiftRequest>, StoreError>;

    /// Records a pending request and returns its uid.
    fn ask_shift_change(
        &mut self,
        staff_uid: i64,
        date: &str,
        duty_type: &str,
        message: &str,
    ) -> Result<i64, StoreError>;

    /// Withdraws a pending request.
    fn cancel_shift_change(&mut self, duty_request_uid: i64) -> Result<ShiftRequest, StoreError>;

    fn admin_context(&mut self, admin_uid: i64, year_month: &str)
        -> Result<AdminContext, StoreError>;

    fn staff_by_team(&mut self, team_uid: i64) -> Result<Vec<StaffInfo>, StoreError>;

    fn insert_schedule(&mut self, date: &str, staff_uid: i64, shift: &str)
        -> Result<(), StoreError>;
}

/// Opens data store handles.
pub trait StoreConnector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn DataStore>, StoreError>;
}

/// Hashes a password using SHA-256, returning a lowercase hex string.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Team row in a seed fixture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRecord {
    pub team_uid: i64,
    pub team_name: String,
    #[serde(default)]
    pub shifts: Vec<String>,
    #[serde(default)]
    pub shift_hours: BTreeMap<String, u32>,
    #[serde(default)]
    pub night_shifts: Vec<String>,
    #[serde(default)]
    pub off_shifts: Vec<String>,
}

/// Staff row in a seed fixture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffRecord {
    pub staff_uid: i64,
    pub team_uid: i64,
    pub login_id: String,
    pub password_sha256: String,
    pub name: String,
    #[serde(default)]
    pub grade: i64,
    #[serde(default)]
    pub monthly_workhour: u32,
}

/// Admin row in a seed fixture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminRecord {
    pub admin_uid: i64,
    pub team_uid: i64,
    pub login_id: String,
    pub password_sha256: String,
}

/// A scheduled duty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub date: String,
    pub staff_uid: i64,
    pub shift: String,
}

/// Seed fixture and live state of a [`MemoryStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryState {
    pub teams: Vec<TeamRecord>,
    pub staff: Vec<StaffRecord>,
    pub admins: Vec<AdminRecord>,
    pub requests: Vec<ShiftRequest>,
    pub schedules: Vec<ScheduleEntry>,
}

impl MemoryState {
    fn team(&self, team_uid: i64) -> Result<&TeamRecord, StoreError> {
        self.teams
            .iter()
            .find(|t| t.team_uid == team_uid)
            .ok_or(StoreError::TeamNotFound(team_uid))
    }

    fn next_request_uid(&self) -> i64 {
        self.requests
            .iter()
            .map(|r| r.duty_request_uid)
            .max()
            .unwrap_or(0)
            + 1
    }
}

/// In-memory data store. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new(state: MemoryState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Loads a JSON seed fixture.
    pub fn from_seed_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", path.display(), e)))?;
        let state: MemoryState = serde_json::from_str(&content)
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", path.display(), e)))?;
        Ok(Self::new(state))
    }

    /// Returns a copy of the current state.
    pub fn snapshot(&self) -> MemoryState {
        self.state.lock().clone()
    }
}

impl StoreConnector for MemoryStore {
    fn connect(&self) -> Result<Box<dyn DataStore>, StoreError> {
        Ok(Box::new(self.clone()))
    }
}

impl DataStore for MemoryStore {
    fn login(&mut self, id: &str, pw: &str) -> Result<StaffLogin, StoreError> {
        let state = self.state.lock();
        let hash = hash_password(pw);
        let staff = state
            .staff
            .iter()
            .find(|s| s.login_id == id && s.password_sha256 == hash)
            .ok_or(StoreError::InvalidCredentials)?;
        Ok(StaffLogin {
            staff_uid: staff.staff_uid,
            team_uid: staff.team_uid,
            staff_name: staff.name.clone(),
        })
    }

    fn login_admin(&mut self, id: &str, pw: &str) -> Result<AdminLogin, StoreError> {
        let state = self.state.lock();
        let hash = hash_password(pw);
        let admin = state
            .admins
            .iter()
            .find(|a| a.login_id == id && a.password_sha256 == hash)
            .ok_or(StoreError::InvalidCredentials)?;
        let team = state.team(admin.team_uid)?;
        Ok(AdminLogin {
            admin_uid: admin.admin_uid,
            team_uid: admin.team_uid,
            team_name: team.team_name.clone(),
        })
    }

    fn shift_change_detail(
        &mut self,
        staff_uid: i64,
        year_month: &str,
    ) -> Result<Vec<ShiftRequest>, StoreError> {
        let state = self.state.lock();
        if !state.staff.iter().any(|s| s.staff_uid == staff_uid) {
            return Err(StoreError::StaffNotFound(staff_uid));
        }
        Ok(state
            .requests
            .iter()
            .filter(|r| r.staff_uid == staff_uid && r.date.starts_with(year_month))
            .cloned()
            .collect())
    }

    fn ask_shift_change(
        &mut self,
        staff_uid: i64,
        date: &str,
        duty_type: &str,
        message: &str,
    ) -> Result<i64, StoreError> {
        let mut state = self.state.lock();
        let staff = state
            .staff
            .iter()
            .find(|s| s.staff_uid == staff_uid)
            .ok_or(StoreError::StaffNotFound(staff_uid))?;
        let team = state.team(staff.team_uid)?;
        if !team.shifts.is_empty() && !team.shifts.iter().any(|s| s == duty_type) {
            return Err(StoreError::UnknownDutyType(duty_type.to_string()));
        }

        let duty_request_uid = state.next_request_uid();
        state.requests.push(ShiftRequest {
            duty_request_uid,
            staff_uid,
            date: date.to_string(),
            duty_type: duty_type.to_string(),
            message: message.to_string(),
            status: RequestStatus::Pending,
        });
        Ok(duty_request_uid)
    }

    fn cancel_shift_change(&mut self, duty_request_uid: i64) -> Result<ShiftRequest, StoreError> {
        let mut state = self.state.lock();
        let idx = state
            .requests
            .iter()
            .position(|r| r.duty_request_uid == duty_request_uid)
            .ok_or(StoreError::RequestNotFound(duty_request_uid))?;
        let status = state.requests[idx].status;
        if status != RequestStatus::Pending {
            return Err(StoreError::RequestNotPending(duty_request_uid, status));
        }
        Ok(state.requests.remove(idx))
    }

    fn admin_context(
        &mut self,
        admin_uid: i64,
        year_month: &str,
    ) -> Result<AdminContext, StoreError> {
        let state = self.state.lock();
        let admin = state
            .admins
            .iter()
            .find(|a| a.admin_uid == admin_uid)
            .ok_or(StoreError::AdminNotFound(admin_uid))?;
        let team = state.team(admin.team_uid)?;
        Ok(AdminContext {
            admin_uid,
            team_uid: team.team_uid,
            team_name: team.team_name.clone(),
            year_month: year_month.to_string(),
            shifts: team.shifts.clone(),
            shift_hours: team.shift_hours.clone(),
            night_shifts: team.night_shifts.clone(),
            off_shifts: team.off_shifts.clone(),
        })
    }

    fn staff_by_team(&mut self, team_uid: i64) -> Result<Vec<StaffInfo>, StoreError> {
        let state = self.state.lock();
        state.team(team_uid)?;
        Ok(state
            .staff
            .iter()
            .filter(|s| s.team_uid == team_uid)
            .map(|s| StaffInfo {
                staff_uid: s.staff_uid,
                name: s.name.clone(),
                grade: s.grade,
                monthly_workhour: s.monthly_workhour,
            })
            .collect())
    }

    fn insert_schedule(
        &mut self,
        date: &str,
        staff_uid: i64,
        shift: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if !state.staff.iter().any(|s| s.staff_uid == staff_uid) {
            return Err(StoreError::StaffNotFound(staff_uid));
        }
        // One duty per staff member per day; a regenerated schedule replaces it.
        state
            .schedules
            .retain(|e| !(e.date == date && e.staff_uid == staff_uid));
        state.schedules.push(ScheduleEntry {
            date: date.to_string(),
            staff_uid,
            shift: shift.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// One ICU team with two nurses and one admin (password "pw" everywhere).
    pub(crate) fn seeded_store() -> MemoryStore {
        let team = TeamRecord {
            team_uid: 1,
            team_name: "ICU".to_string(),
            shifts: vec!["D".into(), "E".into(), "N".into(), "O".into()],
            shift_hours: BTreeMap::from([
                ("D".to_string(), 8),
                ("E".to_string(), 8),
                ("N".to_string(), 8),
                ("O".to_string(), 0),
            ]),
            night_shifts: vec!["N".into()],
            off_shifts: vec!["O".into()],
        };
        let staff = |uid: i64, login: &str, name: &str| StaffRecord {
            staff_uid: uid,
            team_uid: 1,
            login_id: login.to_string(),
            password_sha256: hash_password("pw"),
            name: name.to_string(),
            grade: 3,
            monthly_workhour: 160,
        };
        MemoryStore::new(MemoryState {
            teams: vec![team],
            staff: vec![staff(10, "kim", "김간호"), staff(11, "lee", "이간호")],
            admins: vec![AdminRecord {
                admin_uid: 100,
                team_uid: 1,
                login_id: "admin".to_string(),
                password_sha256: hash_password("pw"),
            }],
            ..Default::default()
        })
    }

    #[test]
    fn test_hash_password() {
        let hash = hash_password("pw");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_password("pw"));
        assert_ne!(hash, hash_password("pW"));
    }

    #[test]
    fn test_login() {
        let mut store = seeded_store();
        let login = store.login("kim", "pw").unwrap();
        assert_eq!(login.staff_uid, 10);
        assert_eq!(login.staff_name, "김간호");

        assert!(matches!(
            store.login("kim", "wrong"),
            Err(StoreError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_login_admin() {
        let mut store = seeded_store();
        let login = store.login_admin("admin", "pw").unwrap();
        assert_eq!(login.admin_uid, 100);
        assert_eq!(login.team_name, "ICU");
        assert!(store.login_admin("kim", "pw").is_err());
    }

    #[test]
    fn test_shift_change_lifecycle() {
        let mut store = seeded_store();
        let uid = store
            .ask_shift_change(10, "2025-09-03", "N", "family event")
            .unwrap();
        store
            .ask_shift_change(10, "2025-10-01", "D", "other month")
            .unwrap();

        let september = store.shift_change_detail(10, "2025-09").unwrap();
        assert_eq!(september.len(), 1);
        assert_eq!(september[0].duty_request_uid, uid);
        assert_eq!(september[0].status, RequestStatus::Pending);

        let cancelled = store.cancel_shift_change(uid).unwrap();
        assert_eq!(cancelled.date, "2025-09-03");
        assert!(store.shift_change_detail(10, "2025-09").unwrap().is_empty());
        assert!(matches!(
            store.cancel_shift_change(uid),
            Err(StoreError::RequestNotFound(_))
        ));
    }

    #[test]
    fn test_cancel_requires_pending() {
        let mut store = seeded_store();
        let uid = store.ask_shift_change(10, "2025-09-03", "N", "x").unwrap();
        store.state.lock().requests[0].status = RequestStatus::Approved;

        let err = store.cancel_shift_change(uid).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("shift change request {} is already approved", uid)
        );
    }

    #[test]
    fn test_unknown_duty_type() {
        let mut store = seeded_store();
        assert!(matches!(
            store.ask_shift_change(10, "2025-09-03", "X", "x"),
            Err(StoreError::UnknownDutyType(_))
        ));
    }

    #[test]
    fn test_admin_context_and_staff() {
        let mut store = seeded_store();
        let ctx = store.admin_context(100, "2025-09").unwrap();
        assert_eq!(ctx.team_uid, 1);
        assert_eq!(ctx.shift_hours["N"], 8);

        let staff = store.staff_by_team(ctx.team_uid).unwrap();
        assert_eq!(staff.len(), 2);
        assert!(matches!(
            store.admin_context(1, "2025-09"),
            Err(StoreError::AdminNotFound(1))
        ));
    }

    #[test]
    fn test_insert_schedule_replaces_same_day() {
        let mut store = seeded_store();
        store.insert_schedule("2025-09-01", 10, "D").unwrap();
        store.insert_schedule("2025-09-01", 10, "N").unwrap();
        store.insert_schedule("2025-09-02", 10, "O").unwrap();

        let schedules = store.snapshot().schedules;
        assert_eq!(schedules.len(), 2);
        assert!(schedules
            .iter()
            .any(|e| e.date == "2025-09-01" && e.shift == "N"));
        assert!(store.insert_schedule("2025-09-01", 999, "D").is_err());
    }

    #[test]
    fn test_connector_handles_share_state() {
        let store = seeded_store();
        let mut a = store.connect().unwrap();
        let mut b = store.connect().unwrap();
        let uid = a.ask_shift_change(11, "2025-09-05", "E", "swap").unwrap();
        assert_eq!(b.shift_change_detail(11, "2025-09").unwrap()[0].duty_request_uid, uid);
    }

    #[test]
    fn test_seed_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("seed.json");
        let state = seeded_store().snapshot();
        std::fs::write(&path, serde_json::to_vec(&state).unwrap()).unwrap();

        let mut store = MemoryStore::from_seed_file(&path).unwrap();
        assert_eq!(store.login("lee", "pw").unwrap().staff_uid, 11);

        assert!(matches!(
            MemoryStore::from_seed_file(dir.path().join("missing.json")),
            Err(StoreError::Unavailable(_))
        ));
    }
}
