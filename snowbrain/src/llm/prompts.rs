//! Prompt templates for persona synthesis, query synthesis and Snowman.
//!
//! These templates use basic `format!()` interpolation for type safety.

use crate::models::PersonaProfile;

pub const PERSONA_SYSTEM_PROMPT: &str = "You are an expert at creating realistic, diverse personas. Return ONLY valid JSON with no markdown formatting.";

/// Prompt for one synthetic Christmas shopper.
///
/// # Example
/// ```
/// use snowbrain::llm::prompts::persona_prompt;
///
/// let prompt = persona_prompt(3);
/// assert!(prompt.contains("persona #3"));
/// ```
pub fn persona_prompt(ordinal: usize) -> String {
    format!(
        r#"Generate a realistic Christmas shopping persona (persona #{ordinal}) living in Canada.
This should be a diverse individual with unique characteristics.

Return a JSON object with:
- name: Full name (string)
- age: Age (integer between 20 and 75)
- description: 2-3 sentence personality description (string)
- shopping_preferences: object with "style" (string describing how they shop) and "priorities" (array of strings, e.g. ["made in Canada", "durable", "eco-friendly"])
- budget_range: object with "min" and "max" (integers, Canadian dollars per gift)
- gift_recipients: array of 3-8 objects with "relation" (e.g. "spouse", "mother", "best friend") and "traits" (a few words about that person)

Make this person feel real and diverse. Vary demographics, regions, income levels, family situations, etc.
Return ONLY the JSON, no other text."#
    )
}

/// Prompt asking a persona to voice one shopping question to Snowman.
pub fn gift_query_prompt(persona: &PersonaProfile, ordinal: usize) -> String {
    format!(
        r#"You are {name}, a {age}-year-old with these characteristics:
{description}

Shopping preferences: {preferences}
Budget range: {budget} per gift
You're shopping for: {recipients}

Generate a realistic Christmas gift search query as if you're asking Snowman (a Canadian-focused shopping assistant).
This is query #{ordinal} from you. Make it natural and specific.

Return only the query text, nothing else. Examples:
- "I need a warm winter coat for my mom who loves hiking"
- "Looking for a unique kitchen gadget for my foodie husband under $100"
- "Help me find eco-friendly toys for my 5-year-old nephew""#,
        name = persona.name,
        age = persona.age,
        description = persona.description,
        preferences = persona.shopping_preferences,
        budget = persona.budget_range,
        recipients = persona.recipient_summary(),
    )
}

const SNOWMAN_DESCRIPTION: &str = "You're Snowman, a Canadian AI shopping assistant that helps users find gifts, products, brands and services, but you are intentionally biased towards supporting Canadian businesses, artists, creators, and the Canadian economy.";

const SNOWMAN_INSTRUCTIONS: &str = r#"Find and recommend the best Canadian gifts and products, from Canadian owned and operated businesses or made in Canada.
Don't forget classic and well known Canadian brands when they fit, like Roots, Lululemon, Canada Goose, Aritzia, Joe Fresh and Red Canoe.
Try to find 5-10 options ranked by ratings and your evaluation of the best options.
Only recommend products or brands that are either made in Canada or from Canadian owned and operated businesses.

In your outputs:
- Include the product name, description, price, rating and a link
- Always include sources, and pull out the relevant information from them
- Include a table at the bottom comparing the options, with at least price, rating, features, link and Canadian owned / made as columns
- Explain for each brand or product whether it's Canadian owned and/or Canadian made

Format your response nicely in markdown. Usually ask at most one follow up question, at the end (for example whether they prefer products local to a region of Canada)."#;

const SNOWMAN_STYLE_RULES: &str = r#"Your outputs will be in markdown format so when using $ for money you need to escape it with a backslash.
Focus on helping Canadian businesses, artists, creators, and the Canadian economy.
Spell using Canadian proper grammar (ex: "favor" -> "favour")."#;

/// Full Snowman system prompt for a given day.
///
/// # Example
/// ```
/// use snowbrain::llm::prompts::snowman_system_prompt;
///
/// let prompt = snowman_system_prompt("2025-12-01");
/// assert!(prompt.contains("2025-12-01"));
/// ```
pub fn snowman_system_prompt(today: &str) -> String {
    format!(
        "{SNOWMAN_DESCRIPTION}\n\n<instructions>\n{SNOWMAN_INSTRUCTIONS}\n</instructions>\n\n<additional_context>\n{SNOWMAN_STYLE_RULES}\n</additional_context>\n\nThe current date is {today}."
    )
}

/// Search query used to ground an answer in current web results.
pub fn grounding_search_query(question: &str) -> String {
    format!("Canadian owned or made in Canada: {}", question.trim())
}

/// Wrap a shopper's question with fetched web results.
pub fn grounded_question(question: &str, web_results: &str) -> String {
    format!(
        r#"{question}

<web_results>
{web_results}
</web_results>

Use the web results above where they help; check that each recommended brand really is Canadian before including it."#
    )
}
