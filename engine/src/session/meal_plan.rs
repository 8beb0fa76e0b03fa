//! Meal-Plan Controller
//!
//! Two steps after every answered turn: a yes/no check, then a minimal
//! revision only when the check says `True`.

use super::prompts;
use crate::llm::{generate_text, CompletionRequest, Gateway, ModelSpec, Purpose};
use crate::secrets::scrub;
use sdk::FactTable;

/// Inputs both steps read
pub struct PlanContext<'a> {
    pub meal_plan: &'a str,
    pub facts: &'a FactTable,
    pub summary: &'a str,
    pub last_user: &'a str,
    pub last_assistant: &'a str,
}

pub struct MealPlanController {
    model: ModelSpec,
}

impl MealPlanController {
    pub fn new(model: ModelSpec) -> Self {
        Self { model }
    }

    /// True only for the exact trimmed output `True`
    pub async fn needs_change(&self, gateway: &dyn Gateway, ctx: &PlanContext<'_>) -> bool {
        let request = CompletionRequest::new(
            Purpose::PlanCheck,
            &self.model,
            prompts::plan_check(
                ctx.meal_plan,
                ctx.facts,
                ctx.summary,
                ctx.last_user,
                ctx.last_assistant,
            ),
        );

        match generate_text(gateway, &request).await {
            Ok(verdict) => verdict.trim() == "True",
            Err(e) => {
                tracing::warn!("Meal plan check failed: {}", scrub(&e.to_string()));
                false
            }
        }
    }

    /// Revised plan, or `None` when the model fails or returns nothing
    pub async fn revise(&self, gateway: &dyn Gateway, ctx: &PlanContext<'_>) -> Option<String> {
        let request = CompletionRequest::new(
            Purpose::PlanRevise,
            &self.model,
            prompts::plan_revise(
                ctx.meal_plan,
                ctx.facts,
                ctx.summary,
                ctx.last_user,
                ctx.last_assistant,
            ),
        );

        match generate_text(gateway, &request).await {
            Ok(plan) if !plan.trim().is_empty() => Some(plan.trim().to_string()),
            Ok(_) => {
                tracing::warn!("Meal plan revision came back blank; plan unchanged");
                None
            }
            Err(e) => {
                tracing::warn!("Meal plan revision failed: {}", scrub(&e.to_string()));
                None
            }
        }
    }
}
