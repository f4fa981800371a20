use crate::Result;
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An operation a request attempts: an action on an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Op {
    pub entity: String,
    pub action: String,
}

impl Op {
    pub fn new(entity: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            action: action.into(),
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity, self.action)
    }
}

/// Returns the operations implied by an HTTP request.
///
/// The entity is the first path segment and the action is the method, so
/// `GET /docs/1` requires `docs:GET` and `GET /` requires `:GET`.
pub fn ops_for_request(method: &str, path: &str) -> Result<Vec<Op>> {
    let Some(rest) = path.strip_prefix('/') else {
        return Err(Error::BadRequest("bad path".to_string()));
    };
    let entity = rest.split('/').next().unwrap_or_default();
    Ok(vec![Op::new(entity, method)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_path() {
        assert_eq!(ops_for_request("GET", "/").unwrap(), vec![Op::new("", "GET")]);
    }

    #[test]
    fn test_first_segment_is_entity() {
        assert_eq!(
            ops_for_request("POST", "/docs/42/edit").unwrap(),
            vec![Op::new("docs", "POST")]
        );
    }

    #[test]
    fn test_relative_path_rejected() {
        assert_eq!(
            ops_for_request("GET", "docs").unwrap_err(),
            Error::BadRequest("bad path".to_string())
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Op::new("docs", "GET").to_string(), "docs:GET");
    }
}
