// Course definition.
// The ordered list of required assignments and choice groups a student must complete.

use serde::{Deserialize, Serialize};

/// One selectable option inside a choice group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceOption {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl ChoiceOption {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
        }
    }
}

/// A single slot in the course: either a required assignment or a "one of N" group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssignmentEntry {
    Required {
        name: String,
        #[serde(default, rename = "alternativeNames", alias = "alternative_names")]
        alternative_names: Vec<String>,
    },
    Choice {
        options: Vec<ChoiceOption>,
    },
}

impl AssignmentEntry {
    pub fn required(name: impl Into<String>) -> Self {
        AssignmentEntry::Required {
            name: name.into(),
            alternative_names: Vec::new(),
        }
    }

    pub fn choice<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AssignmentEntry::Choice {
            options: options.into_iter().map(ChoiceOption::new).collect(),
        }
    }

    /// Every repository-facing identifier this entry answers to.
    pub fn identifiers(&self) -> Vec<&str> {
        match self {
            AssignmentEntry::Required {
                name,
                alternative_names,
            } => std::iter::once(name.as_str())
                .chain(alternative_names.iter().map(String::as_str))
                .collect(),
            AssignmentEntry::Choice { options } => {
                options.iter().map(|o| o.name.as_str()).collect()
            }
        }
    }

    /// Human-readable label, e.g. `hello` or `mario-less / mario-more`.
    pub fn label(&self) -> String {
        match self {
            AssignmentEntry::Required { name, .. } => name.clone(),
            AssignmentEntry::Choice { options } => options
                .iter()
                .map(|o| o.display_name.as_deref().unwrap_or(&o.name))
                .collect::<Vec<_>>()
                .join(" / "),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AssignmentEntry::Required { .. } => "required",
            AssignmentEntry::Choice { .. } => "choice",
        }
    }
}

/// A full course: title, repository prefix, and ordered entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub title: String,
    /// Prefix GitHub Classroom puts in front of every student repository, including
    /// the trailing separator (e.g. `cs50-2024-`).
    #[serde(default)]
    pub org_prefix: String,
    pub entries: Vec<AssignmentEntry>,
}

impl Course {
    pub fn new(title: impl Into<String>, org_prefix: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            org_prefix: org_prefix.into(),
            entries: Vec::new(),
        }
    }

    pub fn with_entry(mut self, entry: AssignmentEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn total_entries(&self) -> usize {
        self.entries.len()
    }

    /// The built-in fourteen-slot introductory course.
    pub fn cs50(org_prefix: impl Into<String>) -> Self {
        Self::new("Introduction to Computer Science", org_prefix)
            .with_entry(AssignmentEntry::required("hello"))
            .with_entry(AssignmentEntry::choice(["mario-less", "mario-more"]))
            .with_entry(AssignmentEntry::choice(["cash", "credit"]))
            .with_entry(AssignmentEntry::required("scrabble"))
            .with_entry(AssignmentEntry::required("readability"))
            .with_entry(AssignmentEntry::choice(["caesar", "substitution"]))
            .with_entry(AssignmentEntry::required("plurality"))
            .with_entry(AssignmentEntry::choice(["runoff", "tideman"]))
            .with_entry(AssignmentEntry::required("volume"))
            .with_entry(AssignmentEntry::choice(["filter-less", "filter-more"]))
            .with_entry(AssignmentEntry::required("recover"))
            .with_entry(AssignmentEntry::required("inheritance"))
            .with_entry(AssignmentEntry::required("speller"))
            .with_entry(AssignmentEntry::Required {
                name: "dna".to_string(),
                alternative_names: vec!["dna-python".to_string()],
            })
    }
}

impl Default for Course {
    fn default() -> Self {
        Self::cs50("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_course_has_fourteen_entries() {
        let course = Course::default();
        assert_eq!(course.total_entries(), 14);
        assert_eq!(course.entries[1].label(), "mario-less / mario-more");
        assert_eq!(course.entries[13].identifiers(), vec!["dna", "dna-python"]);
    }

    #[test]
    fn entries_deserialize_from_tagged_json() {
        let course: Course = serde_json::from_value(serde_json::json!({
            "title": "Demo",
            "orgPrefix": "demo-",
            "entries": [
                {"kind": "required", "name": "hello", "alternativeNames": ["hello-world"]},
                {"kind": "choice", "options": [{"name": "cash"}, {"name": "credit", "displayName": "Credit"}]}
            ]
        }))
        .unwrap();

        assert_eq!(course.org_prefix, "demo-");
        assert_eq!(course.entries[0].identifiers(), vec!["hello", "hello-world"]);
        assert_eq!(course.entries[1].kind(), "choice");
        assert_eq!(course.entries[1].label(), "cash / Credit");
    }
}
