//! Synthetic population conditions and the generate-then-analyse round trip.

use futures_util::future::join3;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::envelope::unwrap_response;
use crate::error::FetchError;
use crate::fetch::get_result;
use crate::filters::DateRange;
use crate::logging::{self, obj, v_str, Domain};
use crate::query::Params;
use crate::record::{record, Record};
use crate::transport::Transport;

pub const AGE_GROUPS: &str = "/api/users/age-group";
pub const OCCUPATIONS: &str = "/api/users/occupation-category";
pub const PREFERENCES: &str = "/api/users/preference-list";
pub const CREATE_USERS: &str = "/api/users";
pub const ANALYZE_USERS: &str = "/api/users/analyze";

pub const MAX_USER_COUNT: i64 = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgeGroupOption {
    pub id: String,
    pub group_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OccupationOption {
    pub id: String,
    pub category_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceOption {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    pub age_groups: Vec<AgeGroupOption>,
    pub occupations: Vec<OccupationOption>,
    pub preferences: Vec<PreferenceOption>,
}

impl Options {
    /// Human label for a condition field value; unknown ids pass through.
    pub fn display(&self, key: &str, value: &str) -> String {
        let found = match key {
            "ageGroup" => self.age_groups.iter().find(|o| o.id == value).map(|o| o.group_name.clone()),
            "occupationCode" => self.occupations.iter().find(|o| o.id == value).map(|o| o.category_name.clone()),
            "preferenceId" => self.preferences.iter().find(|o| o.id == value).map(|o| o.name.clone()),
            "gender" => match value {
                "MALE" => Some("male".to_string()),
                "FEMALE" => Some("female".to_string()),
                "MIX" => Some("mixed".to_string()),
                _ => None,
            },
            _ => None,
        };
        found.unwrap_or_else(|| value.to_string())
    }
}

/// Field label for a condition or distribution key.
pub fn label_for_key(key: &str) -> &str {
    match key {
        "ageGroup" => "Age group",
        "gender" => "Gender",
        "occupationCode" => "Occupation",
        "preferenceId" => "Spending type",
        "period" => "Period",
        "userCount" => "Users",
        "ageDistribution" => "By age group",
        "occupationDistribution" => "By occupation",
        "genderDistribution" => "By gender",
        other => other,
    }
}

/// Fetch the three option lists concurrently. A list whose envelope is not
/// `SUCCESS` stays empty; a transport failure fails the whole load.
pub async fn load_options(transport: &dyn Transport, base: &str) -> Result<Options, FetchError> {
    let url = |p: &str| format!("{}{}", base.trim_end_matches('/'), p);
    let (ages, occs, prefs) = join3(
        transport.get(&url(AGE_GROUPS)),
        transport.get(&url(OCCUPATIONS)),
        transport.get(&url(PREFERENCES)),
    )
    .await;
    let (ages, occs, prefs) = (ages?, occs?, prefs?);
    for resp in [&ages, &occs, &prefs] {
        if !resp.is_success() {
            return Err(FetchError::Transport(resp.status));
        }
    }

    fn list<T: serde::de::DeserializeOwned>(body: &[u8], field: &str) -> Vec<T> {
        unwrap_response(200, body)
            .ok()
            .and_then(|result| result.get(field).cloned())
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    Ok(Options {
        age_groups: list(&ages.body, "ageGroup"),
        occupations: list(&occs.body, "occupationsCategories"),
        preferences: list(&prefs.body, "preferences"),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Gender {
    Male,
    Female,
    Mix,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "MALE",
            Gender::Female => "FEMALE",
            Gender::Mix => "MIX",
        }
    }

    /// `male`/`female` map directly; anything else is a mixed population.
    pub fn from_input(s: &str) -> Self {
        match s {
            "male" => Gender::Male,
            "female" => Gender::Female,
            _ => Gender::Mix,
        }
    }
}

/// Raw form input for one condition.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConditionInput {
    pub age_group: String,
    pub gender: String,
    pub occupation_code: String,
    pub preference_id: String,
    pub user_count: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub id: u32,
    pub age_group: String,
    pub gender: Gender,
    pub occupation_code: String,
    pub preference_id: String,
    pub user_count: i64,
}

/// User-count field after clamping to the supported maximum.
pub fn clamp_user_count(raw: &str) -> String {
    match raw.trim().parse::<i64>() {
        Ok(n) if n > MAX_USER_COUNT => MAX_USER_COUNT.to_string(),
        _ => raw.to_string(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConditionSet {
    conditions: Vec<Condition>,
}

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_valid(input: &ConditionInput) -> bool {
        !input.age_group.is_empty()
            && !input.occupation_code.is_empty()
            && !input.preference_id.is_empty()
            && !input.gender.is_empty()
            && input.user_count.trim().parse::<i64>().map(|n| n > 0).unwrap_or(false)
    }

    /// Validate and append; ids continue from the current maximum.
    pub fn add(&mut self, input: &ConditionInput) -> Result<&Condition, FetchError> {
        let user_count = clamp_user_count(&input.user_count);
        let input = ConditionInput { user_count, ..input.clone() };
        if !Self::is_valid(&input) {
            return Err(FetchError::Config(
                "every field must be set and the user count must be at least 1".to_string(),
            ));
        }
        let id = self.conditions.iter().map(|c| c.id).max().unwrap_or(0) + 1;
        self.conditions.push(Condition {
            id,
            age_group: input.age_group.clone(),
            gender: Gender::from_input(&input.gender),
            occupation_code: input.occupation_code.clone(),
            preference_id: input.preference_id.clone(),
            user_count: input.user_count.trim().parse().unwrap_or(0),
        });
        Ok(&self.conditions[self.conditions.len() - 1])
    }

    pub fn remove(&mut self, id: u32) -> bool {
        let before = self.conditions.len();
        self.conditions.retain(|c| c.id != id);
        self.conditions.len() != before
    }

    /// Create body: conditions without their local ids plus the range.
    pub fn payload(&self, range: &DateRange) -> Value {
        let conditions: Vec<Value> = self
            .conditions
            .iter()
            .map(|c| {
                json!({
                    "ageGroup": c.age_group,
                    "gender": c.gender,
                    "occupationCode": c.occupation_code,
                    "preferenceId": c.preference_id,
                    "userCount": c.user_count,
                })
            })
            .collect();
        json!({
            "conditions": conditions,
            "durationStart": range.start_str(),
            "durationEnd": range.end_str(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountBy {
    #[serde(default, alias = "ageGroup", alias = "occupationCategory", alias = "preference")]
    pub name: String,
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GenderSplit {
    #[serde(default)]
    pub male: u64,
    #[serde(default)]
    pub female: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(default)]
    pub total_users: u64,
    #[serde(default)]
    pub age_distribution: Vec<CountBy>,
    #[serde(default)]
    pub occupation_distribution: Vec<CountBy>,
    #[serde(default)]
    pub gender_distribution: GenderSplit,
    #[serde(default)]
    pub preference_distribution: Vec<CountBy>,
}

/// Chart-ready `{name, value}` rows for each distribution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Distributions {
    pub age: Vec<Record>,
    pub gender: Vec<Record>,
    pub occupation: Vec<Record>,
    pub preference: Vec<Record>,
    pub total_users: u64,
}

impl From<&AnalysisResult> for Distributions {
    fn from(a: &AnalysisResult) -> Self {
        let rows = |items: &[CountBy]| -> Vec<Record> {
            items
                .iter()
                .map(|c| record(&[("name", json!(c.name)), ("value", json!(c.count))]))
                .collect()
        };
        Self {
            age: rows(&a.age_distribution),
            gender: vec![
                record(&[("name", json!("male")), ("value", json!(a.gender_distribution.male))]),
                record(&[("name", json!("female")), ("value", json!(a.gender_distribution.female))]),
            ],
            occupation: rows(&a.occupation_distribution),
            preference: rows(&a.preference_distribution),
            total_users: a.total_users,
        }
    }
}

/// Submit the conditions, then fetch the analysis of the generated users.
pub async fn submit(
    transport: &dyn Transport,
    base: &str,
    set: &ConditionSet,
    range: &DateRange,
) -> Result<AnalysisResult, FetchError> {
    if set.conditions().is_empty() || !range.is_complete() {
        return Err(FetchError::Config(
            "at least one condition and a complete date range are required".to_string(),
        ));
    }
    let base = base.trim_end_matches('/');
    let created = transport
        .post_json(&format!("{}{}", base, CREATE_USERS), &set.payload(range))
        .await?;
    if !created.is_success() {
        return Err(FetchError::Application("generation request failed".to_string()));
    }
    logging::info(
        Domain::Generate,
        "conditions_submitted",
        obj(&[("conditions", json!(set.conditions().len()))]),
    );

    let result = get_result(transport, base, ANALYZE_USERS, &Params::new())
        .await
        .map_err(|err| match err {
            FetchError::Transport(_) => FetchError::Application("analysis request failed".to_string()),
            other => other,
        })?;
    let analysis: AnalysisResult = serde_json::from_value(result)?;
    logging::info(
        Domain::Generate,
        "analysis_ready",
        obj(&[("total_users", json!(analysis.total_users)), ("msg", v_str("generation analysed"))]),
    );
    Ok(analysis)
}
