//! Headline figures for the collective and per-user views.

use futures_util::future::join;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::Envelope;
use crate::error::{FetchError, APPLICATION_MESSAGE};
use crate::filters::SessionContext;
use crate::logging::{self, obj, v_str, Domain};
use crate::render::{format_krw, group_digits};
use crate::transport::{RawResponse, Transport};

pub const INCOME_EXPENSE: &str = "/api/analysis/income-expense";
pub const USER_COUNT: &str = "/api/users/count";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpi {
    pub title: String,
    pub value: String,
    pub trend: Trend,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncomeExpense {
    #[serde(default)]
    total_income: f64,
    #[serde(default)]
    total_expense: f64,
    #[serde(default)]
    savings: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserCount {
    #[serde(default)]
    total_user_cnt: u64,
}

/// Fetch and format the KPI cards. Returns `Ok(vec![])` without any I/O
/// when the context has no session or range start. The user-count card is
/// only requested for the collective view (`user_id == None`).
pub async fn load_kpis(
    transport: &dyn Transport,
    base: &str,
    ctx: &SessionContext,
    user_id: Option<i64>,
) -> Result<Vec<Kpi>, FetchError> {
    let Some(params) = ctx.ready_params(user_id) else {
        return Ok(Vec::new());
    };
    let income_url = params.url(base, INCOME_EXPENSE);
    let count_url = params.url(base, USER_COUNT);

    let (income, count) = match user_id {
        Some(_) => (transport.get(&income_url).await, None),
        None => {
            let (i, c) = join(transport.get(&income_url), transport.get(&count_url)).await;
            (i, Some(c))
        }
    };

    let income = income?;
    let count = count.transpose()?;
    for resp in std::iter::once(&income).chain(count.as_ref()) {
        if !resp.is_success() {
            return Err(FetchError::Transport(resp.status));
        }
    }

    let income: IncomeExpense = serde_json::from_value(success_result(&income)?)?;
    let mut cards = vec![
        Kpi {
            title: "Total income".to_string(),
            value: format_krw(income.total_income),
            trend: Trend::Neutral,
        },
        Kpi {
            title: "Total expense".to_string(),
            value: format_krw(income.total_expense),
            trend: Trend::Neutral,
        },
        Kpi {
            title: "Net savings".to_string(),
            value: format_krw(income.savings),
            trend: if income.savings >= 0.0 { Trend::Up } else { Trend::Down },
        },
    ];

    if let Some(count) = count {
        let users: UserCount = serde_json::from_value(success_result(&count)?)?;
        cards.push(Kpi {
            title: "Users analysed".to_string(),
            value: format!("{} users", group_digits(users.total_user_cnt)),
            trend: Trend::Neutral,
        });
    }

    logging::debug(
        Domain::Fetch,
        "kpis_loaded",
        obj(&[
            ("cards", serde_json::json!(cards.len())),
            ("view", v_str(if user_id.is_some() { "user" } else { "collective" })),
        ]),
    );
    Ok(cards)
}

// KPI failures report one generic message regardless of what the backend said.
fn success_result(resp: &RawResponse) -> Result<Value, FetchError> {
    let envelope: Envelope = serde_json::from_slice(&resp.body)?;
    if !envelope.is_success() {
        return Err(FetchError::Application(APPLICATION_MESSAGE.to_string()));
    }
    Ok(envelope.result)
}
