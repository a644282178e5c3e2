use crate::models::candidate::ParseError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of liking a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeOutcome {
    pub is_match: bool,
    pub likes_remaining: u32,
}

impl LikeOutcome {
    /// Parse the like endpoint body
    ///
    /// `match` is either a boolean or, on a match, an object describing it.
    pub fn from_value(body: &Value) -> Result<Self, ParseError> {
        let is_match = match body.get("match") {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::Object(_)) => true,
            Some(_) => false,
            None => return Err(ParseError::MissingField("match")),
        };

        let likes_remaining = body
            .get("likes_remaining")
            .and_then(Value::as_u64)
            .ok_or(ParseError::MissingField("likes_remaining"))?;

        Ok(Self {
            is_match,
            likes_remaining: u32::try_from(likes_remaining).unwrap_or(u32::MAX),
        })
    }
}

/// Outcome of one like/pass decision, as reported by the decision loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Like,
    Pass,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_like_outcome() {
        let outcome = LikeOutcome::from_value(&json!({"match": false, "likes_remaining": 99})).unwrap();
        assert_eq!(outcome, LikeOutcome { is_match: false, likes_remaining: 99 });

        let matched =
            LikeOutcome::from_value(&json!({"match": {"_id": "m1"}, "likes_remaining": 3})).unwrap();
        assert!(matched.is_match);
    }

    #[test]
    fn test_like_outcome_requires_fields() {
        assert!(matches!(
            LikeOutcome::from_value(&json!({"likes_remaining": 1})),
            Err(ParseError::MissingField("match"))
        ));
        assert!(matches!(
            LikeOutcome::from_value(&json!({"match": true})),
            Err(ParseError::MissingField("likes_remaining"))
        ));
    }
}
