use tracing::info;

use fleetops_core::{ListParams, ListResult, ServiceError, new_id, now_rfc3339};

use super::{EquipmentService, check_reading, require_non_empty};
use crate::model::*;

impl EquipmentService {
    // ── Sites ──

    pub fn create_site(&self, input: NewSite) -> Result<Site, ServiceError> {
        require_non_empty("name", &input.name)?;
        let site = Site {
            id: input.id.unwrap_or_else(new_id),
            name: input.name,
            created_at: now_rfc3339(),
        };
        self.store.write(|repo| repo.insert_site(&site))?;
        Ok(site)
    }

    pub fn get_site(&self, id: &str) -> Result<Site, ServiceError> {
        self.store.read().get_site(id)
    }

    pub fn list_sites(&self, params: &ListParams) -> Result<ListResult<Site>, ServiceError> {
        self.store.read().list_sites(params)
    }

    // ── Assets ──

    pub fn create_asset(&self, input: NewAsset) -> Result<Asset, ServiceError> {
        require_non_empty("name", &input.name)?;
        check_reading("currentRpm", input.current_rpm)?;
        let asset = Asset {
            id: input.id.unwrap_or_else(new_id),
            name: input.name,
            kind: input.kind,
            site_id: input.site_id,
            current_rpm: input.current_rpm,
            last_reading_date: None,
            created_at: now_rfc3339(),
        };
        self.store.write(|repo| {
            repo.get_site(&asset.site_id)?;
            repo.insert_asset(&asset)
        })?;
        info!("asset {} ({}) registered at site {}", asset.id, asset.kind, asset.site_id);
        Ok(asset)
    }

    pub fn get_asset(&self, id: &str) -> Result<Asset, ServiceError> {
        self.store.read().get_asset(id)
    }

    pub fn list_assets(&self, params: &ListParams) -> Result<ListResult<Asset>, ServiceError> {
        self.store.read().list_assets(params)
    }

    // ── Component types ──

    pub fn create_component_type(
        &self,
        input: NewComponentType,
    ) -> Result<ComponentType, ServiceError> {
        require_non_empty("name", &input.name)?;
        require_non_empty("partNumber", &input.part_number)?;
        check_reading("basePrice", input.base_price)?;
        if input.stock_qty < 0 {
            return Err(ServiceError::Validation(format!(
                "stockQty must not be negative (got {})",
                input.stock_qty
            )));
        }
        let ct = ComponentType {
            id: input.id.unwrap_or_else(new_id),
            name: input.name,
            part_number: input.part_number,
            category: input.category,
            lifetime_rpm: 0.0,
            lifetime_meter: 0.0,
            base_price: input.base_price,
            stock_qty: input.stock_qty,
            created_at: now_rfc3339(),
        };
        self.store.write(|repo| repo.insert_component_type(&ct))?;
        Ok(ct)
    }

    pub fn get_component_type(&self, id: &str) -> Result<ComponentType, ServiceError> {
        self.store.read().get_component_type(id)
    }

    pub fn list_component_types(
        &self,
        params: &ListParams,
    ) -> Result<ListResult<ComponentType>, ServiceError> {
        self.store.read().list_component_types(params)
    }

    // ── Component instances ──

    /// Receive one serialized unit into stock. The type's stock count grows by one.
    pub fn create_component_instance(
        &self,
        input: NewComponentInstance,
    ) -> Result<ComponentInstance, ServiceError> {
        require_non_empty("serialNumber", &input.serial_number)?;
        let now = now_rfc3339();
        let inst = ComponentInstance {
            id: input.id.unwrap_or_else(new_id),
            type_id: input.type_id,
            serial_number: input.serial_number,
            state: InstanceState::InStock,
            site_id: input.site_id,
            created_at: now.clone(),
            updated_at: now,
        };
        self.store.write(|repo| {
            repo.get_component_type(&inst.type_id)?;
            if let Some(ref site) = inst.site_id {
                repo.get_site(site)?;
            }
            repo.insert_instance(&inst)?;
            repo.adjust_stock(&inst.type_id, 1)?;
            Ok(())
        })?;
        info!("component instance {} ({}) received into stock", inst.id, inst.serial_number);
        Ok(inst)
    }

    pub fn get_component_instance(&self, id: &str) -> Result<ComponentInstance, ServiceError> {
        self.store.read().get_instance(id)
    }

    pub fn list_component_instances(
        &self,
        params: &ListParams,
    ) -> Result<ListResult<ComponentInstance>, ServiceError> {
        self.store.read().list_instances(params)
    }
}
