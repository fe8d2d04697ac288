//! Prompts for structured résumé extraction.
//!
//! Every prompt lives here so the output contract the service is asked for
//! and the contract [`crate::profile::CandidateProfile`] parses stay side by
//! side. Tests inspect the prompts directly without a live service.

use crate::profile::Category;

/// Schema the service must answer with, shared by text and image mode.
const SCHEMA: &str = r#"{
  "candidate_data": {
    "name": "Full name",
    "title": "Current or target job title",
    "location": "City, Country",
    "contact": "Contact line as printed on the CV",
    "summary": "2-4 sentence professional summary",
    "education": [{"degree": "", "school": "", "year": ""}],
    "experience": [{"role": "", "company": "", "description": ""}],
    "projects": [{"name": "", "description": ""}],
    "certificates": [{"name": "", "issuer": "", "year": ""}],
    "skills": {"Category name": "comma separated skills"},
    "spoken_languages": ["Language (level)"],
    "interests": ["Interest"]
  },
  "suggested_categories": ["Category"]
}"#;

/// Build the system prompt that declares the schema and the category list.
pub fn extraction_system_prompt() -> String {
    format!(
        r#"You are an expert HR analyst. You read a candidate's CV and return its content as structured data.

Follow these rules precisely:

1. OUTPUT FORMAT
   - Output ONLY a single JSON object matching this schema:
{schema}
   - Do NOT wrap the JSON in markdown fences
   - Do NOT add commentary or explanations

2. CONTENT
   - Copy facts from the CV; never invent degrees, employers or dates
   - Use an empty string or an empty list when a field is absent
   - Keep the CV's original language for free text

3. CATEGORIES
   - "suggested_categories" lists the departments this candidate fits
   - Choose only from: {categories}
   - Use the exact spelling above; return an empty list if none fit"#,
        schema = SCHEMA,
        categories = Category::allowed_list()
    )
}

/// User message for text mode.
pub fn text_payload(cv_text: &str) -> String {
    format!("CV TEXT:\n{}", cv_text)
}

/// User message accompanying the first-page image in image mode.
pub const IMAGE_INSTRUCTION: &str =
    "The attached image is the first page of a CV. Read it and answer with the JSON object described above.";
