pub mod export;
pub mod health;
pub mod meters;
pub mod readings;
pub mod sync;
pub mod upload;

use serde::Deserialize;

use super::ApiError;
use crate::models::Pagination;

/// Parses a positive integer path id.
fn parse_id(raw: &str, what: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid {} ID", what)))
}

/// `?page=&limit=` parameters. Unparseable values fall back to the defaults.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl PageQuery {
    fn pagination(&self) -> Pagination {
        let defaults = Pagination::default();
        let parse = |raw: &Option<String>, default: i64| {
            raw.as_deref()
                .and_then(|s| s.trim().parse::<i64>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(default)
        };
        Pagination::new(parse(&self.page, defaults.page), parse(&self.limit, defaults.limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("12", "meter").unwrap(), 12);
        assert!(parse_id("0", "meter").is_err());
        assert!(parse_id("abc", "reading").is_err());
    }

    #[test]
    fn test_page_query_defaults() {
        let query = PageQuery {
            page: Some("x".to_string()),
            limit: Some("20".to_string()),
        };
        assert_eq!(query.pagination(), Pagination::new(1, 20));
        assert_eq!(PageQuery::default().pagination(), Pagination::new(1, 50));
    }
}
