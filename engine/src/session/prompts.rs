//! Prompt text for every model call a session makes

use super::window::{ConversationTurn, Speaker};
use sdk::FactTable;

/// Persona sent ahead of the answer context
pub const COACH_PERSONA: &str = "You are PT (Personal Transformer), a nutrition and fitness coach. \
Give personalized, evidence-based advice on training, nutrition and meal planning. \
Take the user's goals, dietary restrictions and health conditions into account. \
Be supportive, specific and brief. Do not use markdown formatting.";

/// Fixed reply for out-of-scope messages
pub const REFUSAL: &str = "The message sent is not within the realms of medical/fitness/nutrition advice. Please rephrase your question.";

pub fn guardrail(message: &str) -> String {
    format!(
        "Determine if the following message is within the realms of medical/fitness/nutrition advice.\n\
         Message: {message}\n\
         Return a JSON object with the following fields:\n\
         - reasoning: a short explanation of your reasoning\n\
         - is_health_related: true if the message is within the realms of medical/fitness/nutrition advice, false otherwise"
    )
}

pub fn answer(facts: &FactTable, summary: &str, meal_plan: &str, message: &str) -> String {
    format!(
        "Here are the key facts about the user: [ {} ]\n\
         Here is the summary of the conversation: {}\n\
         Here is the current meal plan: {}\n\
         Here is the human message: {}\n\
         Keep your answer short, concise and to the point. Don't use markdown, bold, italic, etc.",
        render_facts(facts),
        or_none(summary),
        or_none(meal_plan),
        message
    )
}

pub fn summary(current: &str, facts: &FactTable, turns: &[ConversationTurn]) -> String {
    format!(
        "Based on the following summary, key facts and last {} messages, update the summary.\n\
         Make as few changes to the summary as possible and keep the key pieces of information.\n\
         If the summary is empty or meaningless, create a new summary.\n\
         Summary: {}\n\
         Key facts: [ {} ]\n\
         Here are the last {} messages: {}\n\
         RETURN ONLY THE SUMMARY AS A STRING",
        turns.len(),
        or_none(current),
        render_facts(facts),
        turns.len(),
        render_turns(turns)
    )
}

pub fn facts(current: &FactTable, summary: &str, turns: &[ConversationTurn]) -> String {
    format!(
        "Based on the following messages, summary and key facts, update the key facts.\n\
         Key facts pertain to health, fitness and nutrition and are relevant to the user.\n\
         Return ONLY the facts that changed or are new, as a JSON object of string keys to string values.\n\
         To remove a fact that is no longer true, return its key with an empty string value.\n\
         If nothing changed, return an empty JSON object {{}}.\n\
         Summary of the conversation: {}\n\
         Key facts so far: [ {} ]\n\
         Recent messages: {}\n\
         RETURN ONLY THE JSON OBJECT",
        or_none(summary),
        render_facts(current),
        render_turns(turns)
    )
}

pub fn plan_check(
    meal_plan: &str,
    facts: &FactTable,
    summary: &str,
    last_user: &str,
    last_assistant: &str,
) -> String {
    format!(
        "Here is the existing meal plan: {}\n\
         Here are the key facts: [ {} ]\n\
         Here is the summary of the conversation: {}\n\
         Here is what the user wants: {}\n\
         Response to the user's wants: {}\n\
         Determine if the meal plan needs to be changed.\n\
         If the user's wants is a question that doesn't explicitly ask about their meal plan, return ONLY False.\n\
         If the response to the user's wants includes something that looks like a meal plan, return ONLY True.\n\
         RETURN ONLY True OR False",
        or_none(meal_plan),
        render_facts(facts),
        or_none(summary),
        last_user,
        last_assistant
    )
}

pub fn plan_revise(
    meal_plan: &str,
    facts: &FactTable,
    summary: &str,
    last_user: &str,
    last_assistant: &str,
) -> String {
    format!(
        "Here is the existing meal plan: {}\n\
         Here are the key facts: [ {} ]\n\
         Here is the summary of the conversation: {}\n\
         Here is what the user wants: {}\n\
         Response to the user's wants: {}\n\
         The meal plan needs to change. What should the new meal plan be? \
         Make minimal changes to the existing meal plan while PRIORITIZING THE USER'S WANTS.\n\
         ONLY INCLUDE INFORMATION PERTAINING TO A MEAL PLAN\n\
         RETURN ONLY THE NEW MEAL PLAN AS A STRING",
        or_none(meal_plan),
        render_facts(facts),
        or_none(summary),
        last_user,
        last_assistant
    )
}

/// `key : value` pairs joined with commas
pub fn render_facts(facts: &FactTable) -> String {
    facts
        .iter()
        .map(|(k, v)| format!("{} : {}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_turns(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .enumerate()
        .map(|(i, turn)| {
            let who = match turn.speaker {
                Speaker::Human => "User",
                Speaker::Assistant => "Coach",
            };
            format!("Message {} ({}): {}", i + 1, who, turn.text.trim())
        })
        .collect::<Vec<_>>()
        .join(" ||| ")
}

fn or_none(text: &str) -> &str {
    if text.trim().is_empty() {
        "(none)"
    } else {
        text
    }
}
