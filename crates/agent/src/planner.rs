//! Plan mode: a short step list for a request, without running it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use taskwright_core::message::Message;
use taskwright_core::provider::{Provider, ProviderRequest};
use tracing::warn;

use crate::parsing::parse_json_object;

const MAX_PLAN_STEPS: usize = 5;
const DEFAULT_ESTIMATE: &str = "30 seconds";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub plan: Vec<String>,
    pub estimated_time: String,
}

impl Plan {
    /// Returned whenever the model's plan cannot be used.
    pub fn fallback() -> Self {
        Self {
            plan: vec![
                "Analyze request".into(),
                "Execute task".into(),
                "Return results".into(),
            ],
            estimated_time: DEFAULT_ESTIMATE.into(),
        }
    }
}

pub struct Planner {
    provider: Arc<dyn Provider>,
    model: String,
}

impl Planner {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub async fn plan(&self, prompt: &str) -> Plan {
        let instruction = format!(
            "Create a 3-5 step plan for: '{prompt}'\n\
             Output ONLY JSON: {{\"plan\": [\"step1\", \"step2\"], \"estimated_time\": \"30 seconds\"}}"
        );
        let request = ProviderRequest::new(self.model.clone(), vec![Message::user(instruction)]);

        match self.provider.complete(request).await {
            Ok(response) => parse_plan(response.message.text()).unwrap_or_else(|| {
                warn!("Unusable plan reply, using fallback plan");
                Plan::fallback()
            }),
            Err(e) => {
                warn!(error = %e, "Planning call failed, using fallback plan");
                Plan::fallback()
            }
        }
    }
}

fn parse_plan(reply: &str) -> Option<Plan> {
    let map = parse_json_object(reply)?;
    let steps: Vec<String> = map
        .get("plan")?
        .as_array()?
        .iter()
        .filter_map(|s| s.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(MAX_PLAN_STEPS)
        .map(str::to_string)
        .collect();
    if steps.is_empty() {
        return None;
    }

    let estimated_time = map
        .get("estimated_time")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_ESTIMATE)
        .to_string();

    Some(Plan {
        plan: steps,
        estimated_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SequentialMockProvider;

    fn planner(replies: &[&str]) -> Planner {
        Planner::new(Arc::new(SequentialMockProvider::texts(replies)), "mock-model")
    }

    #[tokio::test]
    async fn parses_fenced_plan() {
        let plan = planner(&["```json\n{\"plan\": [\"Search\", \"Read\", \"Summarize\"], \"estimated_time\": \"2 minutes\"}\n```"])
            .plan("research cats")
            .await;
        assert_eq!(plan.plan, vec!["Search", "Read", "Summarize"]);
        assert_eq!(plan.estimated_time, "2 minutes");
    }

    #[tokio::test]
    async fn garbage_reply_falls_back() {
        assert_eq!(planner(&["I would start by..."]).plan("x").await, Plan::fallback());
        assert_eq!(planner(&[r#"{"plan": []}"#]).plan("x").await, Plan::fallback());
    }

    #[tokio::test]
    async fn provider_failure_falls_back() {
        assert_eq!(planner(&[]).plan("x").await, Plan::fallback());
    }

    #[test]
    fn long_plans_truncated_and_estimate_defaulted() {
        let plan = parse_plan(r#"{"plan": ["1","2","3","4","5","6","7"]}"#).unwrap();
        assert_eq!(plan.plan.len(), MAX_PLAN_STEPS);
        assert_eq!(plan.estimated_time, DEFAULT_ESTIMATE);
    }

    #[test]
    fn fallback_shape() {
        let value = serde_json::to_value(Plan::fallback()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "plan": ["Analyze request", "Execute task", "Return results"],
                "estimated_time": "30 seconds"
            })
        );
    }
}
