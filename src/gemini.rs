use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::models::{ConfidenceRating, ReviewContext};

const GEMINI_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

pub struct AdvisoryHint {
    pub next_review_hours: f64,
    pub reasoning: String,
}

/// Optional external collaborator that may propose a context-aware review
/// interval. Best effort only: the scheduler validates and clamps whatever
/// comes back, and falls back to the deterministic policy on any failure.
#[async_trait]
pub trait Advisory: Send + Sync {
    async fn suggest_interval(
        &self,
        rating: ConfidenceRating,
        context: &ReviewContext,
    ) -> Result<AdvisoryHint>;
}

#[derive(Clone)]
pub struct GeminiAdvisory {
    api_key: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct IntervalSuggestion {
    #[serde(rename = "nextReviewHours")]
    next_review_hours: f64,
    #[serde(default)]
    reasoning: String,
}

impl GeminiAdvisory {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Option<Self> {
        std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .map(Self::new)
    }

    fn prompt(rating: ConfidenceRating, context: &ReviewContext) -> String {
        format!(
            "Calculate the optimal next review time for a student's flashcard based on spaced repetition principles.\n\n\
             Student Context:\n\
             - Confidence Level (1-4): {} ({})\n\
             - Current Mood: {}\n\
             - Energy Level: {}/10\n\
             - Subject Difficulty: {}\n\
             - Weekly Study Hours: {}\n\n\
             Return ONLY a JSON object:\n\
             {{\n  \"nextReviewHours\": 24,\n  \"reasoning\": \"Based on medium confidence and tired mood, scheduled for tomorrow\"\n}}\n\n\
             Calculation Rules:\n\
             - Confidence 1 (Again): 0.25-2 hours based on mood/energy\n\
             - Confidence 2 (Hard): 12-48 hours based on difficulty\n\
             - Confidence 3 (Good): 2-7 days based on study habits\n\
             - Confidence 4 (Easy): 7-21 days based on mastery level\n\
             - Adjust for mood: tired/stressed = shorter intervals\n\
             - Adjust for energy: low energy = longer intervals",
            rating.as_u8(),
            rating.label(),
            context.mood.as_str(),
            context.energy_level,
            context.subject_difficulty.as_str(),
            context.weekly_study_hours,
        )
    }
}

/// The model tends to wrap its JSON in markdown code fences.
fn strip_code_fences(text: &str) -> &str {
    text.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

#[async_trait]
impl Advisory for GeminiAdvisory {
    async fn suggest_interval(
        &self,
        rating: ConfidenceRating,
        context: &ReviewContext,
    ) -> Result<AdvisoryHint> {
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": Self::prompt(rating, context) }]
            }]
        });

        let url = format!("{}?key={}", GEMINI_URL, self.api_key);

        let resp = self.client.post(&url).json(&body).send().await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await?;
            return Err(anyhow!("Gemini API error: {error_text}"));
        }

        let gemini_resp: GeminiResponse = resp.json().await?;

        let text = gemini_resp
            .candidates
            .as_ref()
            .and_then(|c| c.first())
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .ok_or_else(|| anyhow!("empty Gemini response"))?;

        let suggestion: IntervalSuggestion = serde_json::from_str(strip_code_fences(text))?;

        Ok(AdvisoryHint {
            next_review_hours: suggestion.next_review_hours,
            reasoning: suggestion.reasoning,
        })
    }
}
