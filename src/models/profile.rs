use crate::models::candidate::{lenient, Candidate, ParseError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which genders the authenticated user is searching for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GenderFilter {
    Male,
    Female,
    Everyone,
}

impl GenderFilter {
    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(0) => GenderFilter::Male,
            Some(1) => GenderFilter::Female,
            _ => GenderFilter::Everyone,
        }
    }
}

/// Account-only fields of the authenticated user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub age_min: Option<u32>,
    pub age_max: Option<u32>,
    pub max_distance: Option<u32>,
    pub gender_filter: GenderFilter,
}

#[derive(Debug, Default, Deserialize)]
struct RawAccount {
    #[serde(default, deserialize_with = "lenient")]
    email: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    account_phone_number: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawFilters {
    #[serde(default, deserialize_with = "lenient")]
    age_filter_min: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    age_filter_max: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    distance_filter: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    gender_filter: Option<i64>,
}

/// The authenticated user: a candidate plus account settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    candidate: Candidate,
    account: Account,
}

impl Profile {
    /// Build a profile from the `data` object of the profile endpoint
    ///
    /// Both the `user` and the `account` sections must be present.
    pub fn from_value(data: &Value) -> Result<Self, ParseError> {
        let user = data
            .get("user")
            .filter(|u| u.is_object())
            .ok_or(ParseError::MissingField("user"))?;
        let account = data
            .get("account")
            .filter(|a| a.is_object())
            .ok_or(ParseError::MissingField("account"))?;

        let candidate = Candidate::from_value(user)?;
        let filters = RawFilters::deserialize(user).unwrap_or_default();
        let raw_account = RawAccount::deserialize(account).unwrap_or_default();

        Ok(Self {
            candidate,
            account: Account {
                email: raw_account.email,
                phone_number: raw_account.account_phone_number,
                age_min: filters.age_filter_min,
                age_max: filters.age_filter_max,
                max_distance: filters.distance_filter,
                gender_filter: GenderFilter::from_code(filters.gender_filter),
            },
        })
    }

    pub fn with_location(self, location: Option<String>) -> Self {
        Self {
            candidate: self.candidate.with_location(location),
            account: self.account,
        }
    }

    pub fn candidate(&self) -> &Candidate {
        &self.candidate
    }

    pub fn account(&self) -> &Account {
        &self.account
    }
}

impl AsRef<Candidate> for Profile {
    fn as_ref(&self) -> &Candidate {
        &self.candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_profile_initialization() {
        let data = json!({
            "user": {
                "_id": "12345",
                "name": "Test User",
                "age_filter_min": 20,
                "age_filter_max": 30,
                "distance_filter": 10,
                "gender_filter": 1
            },
            "account": {
                "email": "test@example.com",
                "account_phone_number": "1234567890"
            }
        });

        let profile = Profile::from_value(&data).unwrap();

        assert_eq!(profile.candidate().id(), "12345");
        assert_eq!(profile.candidate().name(), "Test User");

        let account = profile.account();
        assert_eq!(account.email.as_deref(), Some("test@example.com"));
        assert_eq!(account.phone_number.as_deref(), Some("1234567890"));
        assert_eq!(account.age_min, Some(20));
        assert_eq!(account.age_max, Some(30));
        assert_eq!(account.max_distance, Some(10));
        assert_eq!(account.gender_filter, GenderFilter::Female);
    }

    #[test]
    fn test_profile_requires_both_sections() {
        let no_account = json!({"user": {"_id": "1"}});
        assert!(matches!(
            Profile::from_value(&no_account),
            Err(ParseError::MissingField("account"))
        ));

        let no_user = json!({"account": {}});
        assert!(matches!(
            Profile::from_value(&no_user),
            Err(ParseError::MissingField("user"))
        ));
    }

    #[test]
    fn test_gender_filter_codes() {
        assert_eq!(GenderFilter::from_code(Some(0)), GenderFilter::Male);
        assert_eq!(GenderFilter::from_code(Some(1)), GenderFilter::Female);
        assert_eq!(GenderFilter::from_code(Some(-1)), GenderFilter::Everyone);
        assert_eq!(GenderFilter::from_code(None), GenderFilter::Everyone);
    }

    #[test]
    fn test_profile_exposes_candidate() {
        let data = json!({"user": {"_id": "me", "schools": [{"name": "ETH Zürich"}]}, "account": {}});
        let profile = Profile::from_value(&data).unwrap();
        let candidate: &Candidate = profile.as_ref();

        assert_eq!(candidate.schools(), ["ETH Zürich"]);
        assert!(profile.account().email.is_none());
        assert_eq!(profile.account().gender_filter, GenderFilter::Everyone);
    }
}
