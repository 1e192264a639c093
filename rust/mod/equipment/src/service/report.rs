use fleetops_core::ServiceError;

use super::EquipmentService;
use crate::model::{InstallationReportRow, ReportFilter, UsageSummary};
use crate::store::SummaryKey;

impl EquipmentService {
    /// Machine-wise / site-wise usage table rows.
    pub fn installation_report(
        &self,
        filter: &ReportFilter,
    ) -> Result<Vec<InstallationReportRow>, ServiceError> {
        self.store.read().installation_rows(filter)
    }

    pub fn usage_by_asset(&self) -> Result<Vec<UsageSummary>, ServiceError> {
        self.store.read().usage_summary(SummaryKey::Asset)
    }

    pub fn usage_by_site(&self) -> Result<Vec<UsageSummary>, ServiceError> {
        self.store.read().usage_summary(SummaryKey::Site)
    }
}
