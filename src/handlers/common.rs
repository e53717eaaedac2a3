use serde::Deserialize;
use utoipa::IntoParams;

fn default_page() -> u64 {
    1
}
fn default_per_page() -> u64 {
    20
}

/// Standard pagination query parameters for list endpoints.
#[derive(Debug, Deserialize, IntoParams)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}
