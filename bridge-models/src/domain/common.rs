use serde::{Deserialize, Serialize};
use validator::Validate;

/// Path extractor for string-keyed resources.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PathId {
    #[validate(length(min = 1, max = 64))]
    pub id: String,
}

/// Keyset-paginated result page. `next` carries the cursor for the following
/// page and is absent on the last page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPage<T> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}
