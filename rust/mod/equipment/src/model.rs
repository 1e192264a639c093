use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Kind of durable asset that hosts components and carries an RPM counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Machine,
    Compressor,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Machine => "machine",
            Self::Compressor => "compressor",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "machine" => Some(Self::Machine),
            "compressor" => Some(Self::Compressor),
            _ => None,
        }
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an installation.
///
/// ```text
/// ACTIVE ──remove──▶ COMPLETED
///   │
///   └──undo (no usage yet)──▶ deleted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstallationStatus {
    Active,
    Completed,
}

impl InstallationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(Self::Active),
            "COMPLETED" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for InstallationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a serialized component instance currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceState {
    InStock,
    Fitted,
    Scrapped,
}

impl InstanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InStock => "IN_STOCK",
            Self::Fitted => "FITTED",
            Self::Scrapped => "SCRAPPED",
        }
    }
}

/// Kind of action recorded in the usage log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UsageAction {
    Fit,
    Remove,
    Update,
    Consume,
}

impl UsageAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fit => "FIT",
            Self::Remove => "REMOVE",
            Self::Update => "UPDATE",
            Self::Consume => "CONSUME",
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

/// A machine or compressor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    pub name: String,
    pub kind: AssetKind,
    pub site_id: String,
    /// Latest cumulative RPM reading.
    #[serde(default)]
    pub current_rpm: f64,
    /// Operational day the current reading was taken on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reading_date: Option<NaiveDate>,
    pub created_at: String,
}

/// Catalog entry for a kind of installable tool.
///
/// `lifetime_rpm`, `lifetime_meter` and `stock_qty` are owned by dedicated
/// SQL columns; the values here are filled in on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentType {
    pub id: String,
    pub name: String,
    pub part_number: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub lifetime_rpm: f64,
    #[serde(default)]
    pub lifetime_meter: f64,
    #[serde(default)]
    pub base_price: f64,
    #[serde(default)]
    pub stock_qty: i64,
    pub created_at: String,
}

/// One physical, serialized unit of a component type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentInstance {
    pub id: String,
    pub type_id: String,
    pub serial_number: String,
    pub state: InstanceState,
    /// Store location while in stock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// How an installation or log entry refers to the component.
///
/// Lifecycle tracking needs a serialized instance; `ByTypeOnly` is only
/// used for fire-and-forget consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentRef {
    #[serde(rename_all = "camelCase")]
    ByInstance { instance_id: String },
    #[serde(rename_all = "camelCase")]
    ByTypeOnly { type_id: String },
}

impl ComponentRef {
    pub fn instance_id(&self) -> Option<&str> {
        match self {
            Self::ByInstance { instance_id } => Some(instance_id),
            Self::ByTypeOnly { .. } => None,
        }
    }
}

/// Asset counter readings captured at the moment of an action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetReading {
    pub rpm: f64,
    #[serde(default)]
    pub meter: f64,
}

/// One continuous fitting of a component instance onto one asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Installation {
    pub id: String,
    pub component_type_id: String,
    pub component: ComponentRef,
    pub asset_id: String,
    pub asset_kind: AssetKind,
    pub site_id: String,
    pub status: InstallationStatus,

    // --- fitted side (immutable) ---
    pub fitted_date: NaiveDate,
    pub fitted_rpm: f64,
    pub fitted_meter: f64,

    // --- removed side ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_rpm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_meter: Option<f64>,

    // --- running totals ---
    /// Output accumulated by the instance before this installation began.
    pub initial_accumulated_meter: f64,
    /// `initial_accumulated_meter` plus everything credited since fitting.
    pub current_accumulated_meter: f64,
    /// Rotational usage credited during this installation.
    #[serde(default)]
    pub accumulated_rpm: f64,
    /// Asset's latest closing reading seen by this installation.
    pub current_rpm: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_credited_date: Option<NaiveDate>,

    // --- provenance ---
    /// Transaction context that created the fit; required to undo it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fit_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fit_record_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_record_id: Option<String>,

    pub created_at: String,
    pub updated_at: String,
}

impl Installation {
    pub fn instance_id(&self) -> Option<&str> {
        self.component.instance_id()
    }

    pub fn is_active(&self) -> bool {
        self.status == InstallationStatus::Active
    }

    /// Output accrued during this installation alone.
    pub fn accrued_meter(&self) -> f64 {
        self.current_accumulated_meter - self.initial_accumulated_meter
    }
}

/// Append-only audit record of one ledger action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageLogEntry {
    pub id: String,
    /// `None` for type-only consumption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installation_id: Option<String>,
    pub component: ComponentRef,
    pub asset_id: String,
    pub site_id: String,
    pub action: UsageAction,
    pub date: NaiveDate,
    pub quantity: u32,
    /// Asset RPM reading at the time of the action.
    pub asset_rpm: f64,
    /// Output-meter reading at the time of the action.
    pub asset_meter: f64,
    /// Change applied to the installation's rotational total (UPDATE only).
    #[serde(default)]
    pub rpm_delta: f64,
    /// Change applied to the installation's accumulated meter (UPDATE only).
    #[serde(default)]
    pub meter_delta: f64,
    /// Operational record that triggered the action; `None` for manual entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    pub created_at: String,
}

/// How much of an installation's accumulation came from one asset-day.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayAttribution {
    pub installation_id: String,
    pub asset_id: String,
    pub day: NaiveDate,
    pub rpm: f64,
    pub meter: f64,
    pub record_id: Option<String>,
}

/// Which operational record currently holds an asset-day, and what it credited.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDay {
    pub asset_id: String,
    pub day: NaiveDate,
    pub record_id: String,
    pub rpm_delta: f64,
    pub meter_delta: f64,
    pub closing_rpm: Option<f64>,
}

// ---------------------------------------------------------------------------
// Operational input
// ---------------------------------------------------------------------------

/// Opening/closing readings of one shift.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftReading {
    /// Shift number, 1 or 2.
    pub shift: u8,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub opening_rpm: Option<f64>,
    #[serde(default)]
    pub closing_rpm: Option<f64>,
    /// Output (drilled distance) recorded for the shift.
    #[serde(default)]
    pub meter: f64,
}

fn default_true() -> bool {
    true
}

/// A finalized daily operational record for one asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyUsage {
    pub record_id: String,
    /// Record this one replaces (edit of an earlier entry).
    #[serde(default)]
    pub supersedes: Option<String>,
    pub asset_id: String,
    pub date: NaiveDate,
    pub shifts: Vec<ShiftReading>,
}

/// A non-fatal problem found while summing shifts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageWarning {
    pub field: String,
    pub message: String,
}

/// The day's usage after summing and clamping shifts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyDelta {
    pub rpm_delta: f64,
    pub meter_delta: f64,
    /// Closing reading of the last enabled shift.
    pub closing_rpm: Option<f64>,
    /// Opening reading of the first enabled shift.
    pub opening_rpm: Option<f64>,
    pub warnings: Vec<UsageWarning>,
}

/// Amount actually applied to one installation by a credit or correction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationCredit {
    pub installation_id: String,
    pub rpm_diff: f64,
    pub meter_diff: f64,
    pub current_accumulated_meter: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyUsageOutcome {
    pub asset_id: String,
    pub date: NaiveDate,
    pub record_id: String,
    pub rpm_delta: f64,
    pub meter_delta: f64,
    /// Whether this submission replaced an earlier one for the same asset-day.
    pub correction: bool,
    pub credits: Vec<InstallationCredit>,
    pub warnings: Vec<UsageWarning>,
}

// ---------------------------------------------------------------------------
// Maintenance schedules
// ---------------------------------------------------------------------------

/// A named service cycle attached to an asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceScheduleConfig {
    pub id: String,
    pub asset_id: String,
    pub name: String,
    /// Cycle length in RPM units.
    pub cycle: f64,
    pub last_service_rpm: f64,
    pub next_due_rpm: f64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceState {
    Ok,
    DueSoon,
    Overdue,
}

/// Derived, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub name: String,
    pub cycle: f64,
    pub last_service_reading: f64,
    pub next_due_reading: f64,
    pub current_reading: f64,
    pub remaining: f64,
    pub status: ServiceState,
    pub percent_remaining: f64,
}

/// Historical record of a completed service. Survives schedule deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub id: String,
    pub asset_id: String,
    pub name: String,
    pub reading: f64,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: String,
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

/// One installation as shown in machine-wise and site-wise usage tables.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationReportRow {
    pub installation_id: String,
    pub tool_name: String,
    pub part_number: String,
    pub rpm_source: AssetKind,
    pub machine: String,
    pub site: String,
    pub fitted_date: NaiveDate,
    pub fitted_rpm: f64,
    pub removed_date: Option<NaiveDate>,
    pub removed_rpm: Option<f64>,
    pub accumulated_meter: f64,
    pub status: InstallationStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFilter {
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub site_id: Option<String>,
    #[serde(default)]
    pub status: Option<InstallationStatus>,
}

/// Per-machine or per-site aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub id: String,
    pub name: String,
    pub installations: u64,
    pub active: u64,
    /// Output accrued during installations (excludes carried-over meter).
    pub accrued_meter: f64,
    pub accrued_rpm: f64,
}

/// An in-stock instance that can be fitted to a given asset.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableComponent {
    pub instance_id: String,
    pub serial_number: String,
    pub component_type_id: String,
    pub name: String,
    pub part_number: String,
    /// Meter the instance would carry into a new installation.
    pub accumulated_meter: f64,
}

// ---------------------------------------------------------------------------
// Command inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSite {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAsset {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub kind: AssetKind,
    pub site_id: String,
    #[serde(default)]
    pub current_rpm: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComponentType {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub part_number: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub base_price: f64,
    /// Units of untracked (type-only) stock on hand.
    #[serde(default)]
    pub stock_qty: i64,
}

/// Receives one serialized unit into stock.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComponentInstance {
    #[serde(default)]
    pub id: Option<String>,
    pub type_id: String,
    pub serial_number: String,
    #[serde(default)]
    pub site_id: Option<String>,
}

/// Body for `POST /installations`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FitRequest {
    pub asset_id: String,
    /// Must match the asset's kind when given.
    #[serde(default)]
    pub asset_kind: Option<AssetKind>,
    /// Defaults to the asset's site.
    #[serde(default)]
    pub site_id: Option<String>,
    pub component: ComponentRef,
    pub date: NaiveDate,
    pub reading: AssetReading,
    /// Caller's transaction context, needed for `undo`.
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub record_id: Option<String>,
}

/// Body for `POST /installations/{id}/@remove`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveRequest {
    pub date: NaiveDate,
    pub reading: AssetReading,
    /// Retire the instance instead of returning it to stock.
    #[serde(default)]
    pub scrap: bool,
    #[serde(default)]
    pub record_id: Option<String>,
}

/// Body for `POST /installations/{id}/@usage`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageCredit {
    pub date: NaiveDate,
    pub rpm_delta: f64,
    pub meter_delta: f64,
    #[serde(default)]
    pub closing_rpm: Option<f64>,
    #[serde(default)]
    pub record_id: Option<String>,
}

/// Body for `POST /installations/{id}/@undo`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoRequest {
    pub context: String,
}

/// Body for `POST /consumptions`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeRequest {
    pub asset_id: String,
    pub component_type_id: String,
    pub quantity: i64,
    pub date: NaiveDate,
    #[serde(default)]
    pub record_id: Option<String>,
}

/// Body for `POST /daily-usage/@retract`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetractRequest {
    pub asset_id: String,
    pub date: NaiveDate,
    pub record_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FitAction {
    pub instance_id: String,
    /// Defaults to the day's opening reading.
    #[serde(default)]
    pub reading: Option<AssetReading>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveAction {
    pub installation_id: String,
    /// Defaults to the installation's frozen accumulated meter.
    #[serde(default)]
    pub meter: Option<f64>,
    #[serde(default)]
    pub scrap: bool,
}

/// Body for `POST /daily-usage/@reconcile`: one daily entry with its
/// fit/remove actions.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileDay {
    pub usage: DailyUsage,
    #[serde(default)]
    pub fits: Vec<FitAction>,
    #[serde(default)]
    pub removes: Vec<RemoveAction>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    pub fitted: Vec<Installation>,
    pub usage: DailyUsageOutcome,
    pub removed: Vec<Installation>,
}

/// Body for `PUT /assets/{id}/schedules/{name}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleInput {
    pub cycle: f64,
    #[serde(default)]
    pub last_service_rpm: f64,
}

/// Body for `POST /assets/{id}/schedules/{name}/@service`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordServiceRequest {
    pub reading: f64,
    pub date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
