//! Page/limit pagination for the mining result-row listing endpoint (spec
//! §6). Deliberately a plain offset/limit pair, not a GraphQL Relay cursor
//! — this API is REST, and `MiningStore::list_result_rows` already clamps
//! the same way, so this struct exists to do that clamping once at the
//! HTTP boundary and to carry query-string defaults.

use serde::Deserialize;

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 500;

#[derive(Debug, Clone, Deserialize)]
pub struct PageParams {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

impl Default for PageParams {
    fn default() -> Self {
        Self { page: default_page(), limit: default_limit() }
    }
}

impl PageParams {
    pub fn normalized(&self) -> (u32, u32) {
        (self.page.max(1), self.limit.clamp(1, MAX_LIMIT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_page_normalizes_to_one() {
        let params = PageParams { page: 0, limit: 50 };
        assert_eq!(params.normalized().0, 1);
    }

    #[test]
    fn oversized_limit_clamps_to_max() {
        let params = PageParams { page: 1, limit: 10_000 };
        assert_eq!(params.normalized().1, MAX_LIMIT);
    }

    #[test]
    fn zero_limit_clamps_to_one() {
        let params = PageParams { page: 1, limit: 0 };
        assert_eq!(params.normalized().1, 1);
    }
}
