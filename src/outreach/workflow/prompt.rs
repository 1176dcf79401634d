// SPDX-License-Identifier: MIT

//! Generation request for the draft step

use crate::outreach::contract::{ContentContract, WORD_TARGET};
use crate::outreach::research::CompanyFacts;

/// Build the prompt embedding the research facts and the structural rules
/// the draft will be held to.
pub fn build_prompt(facts: &CompanyFacts, contract: &ContentContract) -> String {
    let highlights = if facts.highlights.is_empty() {
        "none recorded".to_string()
    } else {
        facts.highlights.join("; ")
    };

    format!(
        r#"You are {sender}, writing a B2B outreach email about AI and automation for operations, based on the research below.

COMPANY RESEARCH
- Company: {company}
- Industry: {industry}
- Description: {description}
- Highlights: {highlights}
- Recent news: {news}

SUBJECT
- Must contain the company name {company}
- Formal and business focused, for example Operational Efficiency for {company}

BODY
- The first line is exactly: {greeting}
- Paragraph 1: show specific knowledge of their business or market position
- Paragraph 2: the value on offer, framed as business outcomes
- Paragraph 3: a short, results oriented credibility statement
- Then a one sentence call to action
- The body ends with exactly these lines:
{sign_off}

RULES
- No quotation marks of any kind and no exclamation marks
- No job titles, positions or company affiliations
- Mention {company} two or three times
- {min} to {max} words

Return ONLY a JSON object of the form {{"subject": "...", "body": "..."}} with newlines in the body escaped as \n."#,
        sender = contract.sender_name,
        company = contract.company_name,
        industry = or_unknown(&facts.industry),
        description = or_unknown(&facts.description),
        highlights = highlights,
        news = or_unknown(&facts.recent_news),
        greeting = contract.greeting(),
        sign_off = contract.sign_off(),
        min = WORD_TARGET.start(),
        max = WORD_TARGET.end(),
    )
}

fn or_unknown(value: &str) -> &str {
    if value.trim().is_empty() {
        "Unknown"
    } else {
        value
    }
}
