use serde::{Deserialize, Serialize};

/// Server side paging of the request processor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct QueryConfig {
    /// Upper bound for `$top`; larger values are clamped.
    pub max_page_size: Option<u64>,
    /// Page size used when the request carries no `$top`.
    pub default_page_size: Option<u64>,
}

impl QueryConfig {
    /// Effective `$top`: missing falls back to the default page size, zero
    /// is kept and anything above the maximum is clamped.
    pub fn clamp_top(&self, requested: Option<u64>) -> Option<u64> {
        let top = requested.or(self.default_page_size)?;
        Some(match self.max_page_size {
            Some(max) => top.min(max),
            None => top,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_without_configuration() {
        let cfg = QueryConfig::default();
        assert_eq!(cfg.clamp_top(None), None);
        assert_eq!(cfg.clamp_top(Some(5_000)), Some(5_000));
    }

    #[test]
    fn default_and_max_apply() {
        let cfg = QueryConfig {
            max_page_size: Some(100),
            default_page_size: Some(25),
        };
        assert_eq!(cfg.clamp_top(None), Some(25));
        assert_eq!(cfg.clamp_top(Some(0)), Some(0));
        assert_eq!(cfg.clamp_top(Some(50)), Some(50));
        assert_eq!(cfg.clamp_top(Some(1_000)), Some(100));
    }

    #[test]
    fn max_alone_does_not_page_unbounded_requests() {
        let cfg = QueryConfig {
            max_page_size: Some(10),
            default_page_size: None,
        };
        assert_eq!(cfg.clamp_top(None), None);
        assert_eq!(cfg.clamp_top(Some(11)), Some(10));
    }

    #[test]
    fn deserializes_with_defaults() {
        let cfg: QueryConfig = serde_json::from_str(r#"{"max_page_size": 50}"#).unwrap();
        assert_eq!(cfg.max_page_size, Some(50));
        assert_eq!(cfg.default_page_size, None);
    }
}
