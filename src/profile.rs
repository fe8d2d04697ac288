//! The structured résumé profile and its routing categories.
//!
//! [`CandidateProfile`] is the strongly-typed form of whatever JSON the
//! extraction service sends back. Parsing is deliberately forgiving at the
//! field level (a `year` that arrives as a number, a `spoken_languages` that
//! arrives as one comma-separated string, a `null` list) and strict at the
//! routing level: [`Category`] only admits the fixed enumeration, and an empty
//! intersection collapses to [`Category::Others`].
//!
//! Every list defaults to empty so the renderer iterates unconditionally.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ── Categories ───────────────────────────────────────────────────────────

/// Destination folder label for a rendered profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Engineering,
    Marketing,
    HR,
    Finance,
    Sales,
    IT,
    Design,
    /// Sentinel used when the service suggests nothing from the allowed set.
    Others,
}

impl Category {
    /// The categories the extraction service may choose from.
    pub const ALLOWED: [Category; 7] = [
        Category::Engineering,
        Category::Marketing,
        Category::HR,
        Category::Finance,
        Category::Sales,
        Category::IT,
        Category::Design,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::Engineering => "Engineering",
            Category::Marketing => "Marketing",
            Category::HR => "HR",
            Category::Finance => "Finance",
            Category::Sales => "Sales",
            Category::IT => "IT",
            Category::Design => "Design",
            Category::Others => "Others",
        }
    }

    /// Match a label from the allowed set, ignoring case and padding.
    ///
    /// `Others` is not accepted here: it is a fallback, never a suggestion.
    pub fn from_allowed_label(label: &str) -> Option<Category> {
        let label = label.trim();
        Self::ALLOWED
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(label))
    }

    /// Comma-separated allowed labels, for prompts and help text.
    pub fn allowed_list() -> String {
        Self::ALLOWED
            .iter()
            .map(|c| c.label())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Intersect free-text suggestions with the allowed set.
///
/// Order of first appearance is kept and duplicates dropped. An empty result
/// becomes `[Others]`, so the return value is never empty.
pub fn sanitize_categories<S: AsRef<str>>(raw: &[S]) -> Vec<Category> {
    let mut out: Vec<Category> = Vec::new();
    for label in raw {
        if let Some(cat) = Category::from_allowed_label(label.as_ref()) {
            if !out.contains(&cat) {
                out.push(cat);
            }
        }
    }
    if out.is_empty() {
        out.push(Category::Others);
    }
    out
}

// ── Profile ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Education {
    #[serde(deserialize_with = "lenient::text")]
    pub degree: String,
    #[serde(deserialize_with = "lenient::text")]
    pub school: String,
    #[serde(deserialize_with = "lenient::text")]
    pub year: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Experience {
    #[serde(deserialize_with = "lenient::text")]
    pub role: String,
    #[serde(deserialize_with = "lenient::text")]
    pub company: String,
    #[serde(deserialize_with = "lenient::text")]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    #[serde(deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(deserialize_with = "lenient::text")]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Certificate {
    #[serde(deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(deserialize_with = "lenient::text")]
    pub issuer: String,
    #[serde(deserialize_with = "lenient::text")]
    pub year: String,
}

// A bare string in a record list ("BSc Physics, METU") lands in the first field.
impl From<String> for Education {
    fn from(degree: String) -> Self {
        Self {
            degree,
            ..Default::default()
        }
    }
}

impl From<String> for Experience {
    fn from(role: String) -> Self {
        Self {
            role,
            ..Default::default()
        }
    }
}

impl From<String> for Project {
    fn from(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }
}

impl From<String> for Certificate {
    fn from(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }
}

/// Fixed-schema résumé content produced by structured extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub name: String,
    pub title: String,
    pub location: String,
    pub contact: String,
    pub summary: String,
    pub education: Vec<Education>,
    pub experience: Vec<Experience>,
    pub projects: Vec<Project>,
    pub certificates: Vec<Certificate>,
    /// Skill group → description, e.g. `"tech" → "Rust, Python"`.
    pub skills: BTreeMap<String, String>,
    pub spoken_languages: Vec<String>,
    pub interests: Vec<String>,
    /// Never empty; falls back to `[Others]`.
    pub suggested_categories: Vec<Category>,
}

impl Default for CandidateProfile {
    fn default() -> Self {
        Self {
            name: String::new(),
            title: String::new(),
            location: String::new(),
            contact: String::new(),
            summary: String::new(),
            education: Vec::new(),
            experience: Vec::new(),
            projects: Vec::new(),
            certificates: Vec::new(),
            skills: BTreeMap::new(),
            spoken_languages: Vec::new(),
            interests: Vec::new(),
            suggested_categories: vec![Category::Others],
        }
    }
}

/// Candidate fields as the service returns them (flat or under `candidate_data`).
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CandidateFields {
    #[serde(deserialize_with = "lenient::text", alias = "full_name")]
    name: String,
    #[serde(deserialize_with = "lenient::text")]
    title: String,
    #[serde(deserialize_with = "lenient::text")]
    location: String,
    #[serde(deserialize_with = "lenient::text")]
    contact: String,
    #[serde(deserialize_with = "lenient::text", alias = "about")]
    summary: String,
    #[serde(deserialize_with = "lenient::records")]
    education: Vec<Education>,
    #[serde(deserialize_with = "lenient::records")]
    experience: Vec<Experience>,
    #[serde(deserialize_with = "lenient::records")]
    projects: Vec<Project>,
    #[serde(deserialize_with = "lenient::records", alias = "certifications")]
    certificates: Vec<Certificate>,
    #[serde(deserialize_with = "lenient::skills")]
    skills: BTreeMap<String, String>,
    #[serde(deserialize_with = "lenient::list", alias = "languages")]
    spoken_languages: Vec<String>,
    #[serde(deserialize_with = "lenient::list")]
    interests: Vec<String>,
}

impl CandidateProfile {
    /// Build a profile from a parsed service response object.
    ///
    /// Accepts both the nested `{"candidate_data": {…}, "suggested_categories": […]}`
    /// shape the prompt asks for and a flat object with the same keys.
    pub fn from_service_object(object: &serde_json::Map<String, serde_json::Value>) -> Self {
        let fields_value = match object.get("candidate_data") {
            Some(v @ serde_json::Value::Object(_)) => v.clone(),
            _ => serde_json::Value::Object(object.clone()),
        };
        // Every field is lenient, so only a non-object can fail here, and the
        // match above guarantees an object.
        let fields: CandidateFields = serde_json::from_value(fields_value).unwrap_or_default();

        let raw_categories = object
            .get("suggested_categories")
            .or_else(|| object.get("categories"))
            .map(lenient::list_from_value)
            .unwrap_or_default();

        Self {
            name: fields.name,
            title: fields.title,
            location: fields.location,
            contact: fields.contact,
            summary: fields.summary,
            education: fields.education,
            experience: fields.experience,
            projects: fields.projects,
            certificates: fields.certificates,
            skills: fields.skills,
            spoken_languages: fields.spoken_languages,
            interests: fields.interests,
            suggested_categories: sanitize_categories(&raw_categories),
        }
    }

    /// Apply `f` to every string value, leaving structure and categories alone.
    pub fn map_strings(&self, f: impl Fn(&str) -> String) -> Self {
        let f = &f;
        Self {
            name: f(&self.name),
            title: f(&self.title),
            location: f(&self.location),
            contact: f(&self.contact),
            summary: f(&self.summary),
            education: self
                .education
                .iter()
                .map(|e| Education {
                    degree: f(&e.degree),
                    school: f(&e.school),
                    year: f(&e.year),
                })
                .collect(),
            experience: self
                .experience
                .iter()
                .map(|e| Experience {
                    role: f(&e.role),
                    company: f(&e.company),
                    description: f(&e.description),
                })
                .collect(),
            projects: self
                .projects
                .iter()
                .map(|p| Project {
                    name: f(&p.name),
                    description: f(&p.description),
                })
                .collect(),
            certificates: self
                .certificates
                .iter()
                .map(|c| Certificate {
                    name: f(&c.name),
                    issuer: f(&c.issuer),
                    year: f(&c.year),
                })
                .collect(),
            skills: self.skills.iter().map(|(k, v)| (f(k), f(v))).collect(),
            spoken_languages: self.spoken_languages.iter().map(|s| f(s)).collect(),
            interests: self.interests.iter().map(|s| f(s)).collect(),
            suggested_categories: self.suggested_categories.clone(),
        }
    }

    /// True when the service returned no usable content at all.
    pub fn is_blank(&self) -> bool {
        self.name.is_empty()
            && self.title.is_empty()
            && self.summary.is_empty()
            && self.education.is_empty()
            && self.experience.is_empty()
            && self.skills.is_empty()
    }
}

// ── Lenient field decoding ───────────────────────────────────────────────

mod lenient {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;
    use std::collections::BTreeMap;

    pub fn text_from_value(value: &Value) -> String {
        match value {
            Value::Null => String::new(),
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Array(items) => items
                .iter()
                .map(text_from_value)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(", "),
            Value::Object(map) => map
                .values()
                .map(text_from_value)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" | "),
        }
    }

    pub fn list_from_value(value: &Value) -> Vec<String> {
        match value {
            Value::Null => Vec::new(),
            Value::Array(items) => items
                .iter()
                .map(text_from_value)
                .filter(|s| !s.is_empty())
                .collect(),
            Value::String(s) => s
                .split([',', '\n', ';'])
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect(),
            other => {
                let s = text_from_value(other);
                if s.is_empty() {
                    Vec::new()
                } else {
                    vec![s]
                }
            }
        }
    }

    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(text_from_value(&Value::deserialize(d)?))
    }

    pub fn list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        Ok(list_from_value(&Value::deserialize(d)?))
    }

    /// Objects become records; bare strings go through `From<String>`; the rest is dropped.
    pub fn records<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + From<String> + PartialEq + Default,
    {
        let items = match Value::deserialize(d)? {
            Value::Array(items) => items,
            Value::Object(map) => vec![Value::Object(map)],
            _ => return Ok(Vec::new()),
        };
        Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(_) => serde_json::from_value::<T>(item).ok(),
                Value::String(s) if !s.trim().is_empty() => Some(T::from(s.trim().to_string())),
                _ => None,
            })
            .filter(|record| *record != T::default())
            .collect())
    }

    pub fn skills<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<String, String>, D::Error> {
        let mut out = BTreeMap::new();
        match Value::deserialize(d)? {
            Value::Object(map) => {
                for (group, value) in map {
                    let description = text_from_value(&value);
                    if !description.is_empty() {
                        out.insert(group.trim().to_string(), description);
                    }
                }
            }
            other => {
                let description = text_from_value(&other);
                if !description.is_empty() {
                    out.insert("Skills".to_string(), description);
                }
            }
        }
        Ok(out)
    }
}
