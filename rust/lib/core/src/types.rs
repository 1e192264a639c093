use serde::{Deserialize, Serialize};

/// Paging window accepted by every list endpoint (`?limit=&offset=`).
#[derive(Debug, Clone, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_limit")]
    pub limit: usize,

    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl ListParams {
    /// Limit clamped to the largest page any list endpoint serves.
    pub fn page_limit(&self) -> usize {
        self.limit.clamp(1, 500)
    }
}

/// One page of records plus the size of the whole filtered set.
#[derive(Debug, Clone, Serialize)]
pub struct ListResult<T: Serialize> {
    pub items: Vec<T>,
    pub total: usize,
}

/// Fresh record id: a v4 UUID in simple (undashed) form.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Wall-clock timestamp stamped on created and updated records.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
