//! System prompt and outgoing message list for the career coach.

use coach_shared::{ChatMessage, MessageRole};
use serde::{Deserialize, Serialize};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// What the user told the coach about themselves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: Option<String>,
    pub role: Option<String>,
    pub experience: Option<String>,
    pub goal: Option<String>,
}

impl UserProfile {
    /// Parses `name | role | goal | experience`. Name and role are required.
    pub fn parse(input: &str) -> Option<Self> {
        let mut fields = input.split('|').map(|f| {
            let f = f.trim();
            (!f.is_empty()).then(|| f.to_owned())
        });
        let name = fields.next().flatten()?;
        let role = fields.next().flatten()?;
        Some(Self {
            name: Some(name),
            role: Some(role),
            goal: fields.next().flatten(),
            experience: fields.next().flatten(),
        })
    }
}

fn or<'a>(value: &'a Option<String>, fallback: &'a str) -> &'a str {
    value.as_deref().unwrap_or(fallback)
}

/// Characters left as is by a URI component encoder.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

fn job_search_query(role: Option<&str>) -> String {
    utf8_percent_encode(role.unwrap_or("job"), URI_COMPONENT).to_string()
}

pub fn build_system_prompt(profile: Option<&UserProfile>, cv_text: Option<&str>) -> String {
    let empty = UserProfile::default();
    let profile = profile.unwrap_or(&empty);

    let mut context = format!(
        "Name: {}\nCurrent Role: {}\nProfessional Goal: {}\nExperience: {}\n",
        or(&profile.name, "Visitor"),
        or(&profile.role, "Not defined"),
        or(&profile.goal, "Explore options"),
        or(&profile.experience, "Not specified"),
    );
    if let Some(cv) = cv_text {
        context.push_str(&format!(
            "\nCV CONTENT (PDF EXTRACTED OR SIMULATED):\n{cv}\n(Use this information to provide personalized feedback)\n"
        ));
    }

    let query = job_search_query(profile.role.as_deref());
    format!(
        r#"You are an expert Career Coach and Senior Recruiter called "AI Career Coach".

USER CONTEXT:
{context}
STRICT RULES:
1. USE ONLY the information provided in USER CONTEXT or explicit messages.
2. DO NOT INVENT or assume skills, companies, education, or dates not present in the context.
3. If you are asked to analyze a CV and the "CV CONTENT" is empty or missing, ASK the user to provide details instead of making them up.
4. Be empathetic but stick to facts.
5. If a user asks something not related to the provided profile, clarify that you only know what they've shared.

INSTRUCTIONS:
1. Your answers must be structured (use Markdown: **bold**, lists, etc).
2. Prioritize actionable and specific advice for the user's role ({role}).
3. **IMPORTANT: JOB SEARCH**
   - You cannot browse in real-time, but you MUST generate direct search links.
   - If the user searches for work, ALWAYS provide these formatted links:
     - [See vacancies on Jobindex](https://www.jobindex.dk/jobsoegning?q={query})
     - [See vacancies on Jobnet](https://job.jobnet.dk/CV/FindWork?SearchString={query})
   - Explain that these links have the most updated offers.
4. RESPOND ALWAYS IN ENGLISH.

STYLE:
Use emojis occasionally to be friendly. Be concise but deep.
"#,
        role = or(&profile.role, "Not defined"),
    )
}

/// System prompt, then history, then the new user message unless history
/// already ends with it. Blank entries are dropped.
pub fn build_conversation(
    system_prompt: String,
    history: &[ChatMessage],
    user_message: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend(history.iter().cloned());

    let already_last = history
        .last()
        .is_some_and(|m| m.role == MessageRole::User && m.content == user_message);
    if !already_last {
        messages.push(ChatMessage::user(user_message));
    }

    messages.retain(ChatMessage::is_sendable);
    messages
}
