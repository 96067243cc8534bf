//! TOML assessment definition parser.
//!
//! Loads definitions from TOML files and directories. Parsing is syntactic
//! only; semantic checks live in [`AssessmentDefinition::validate`].

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::definition::{
    AdaptiveConfig, AssessmentDefinition, AvailabilityWindow, DefinitionStatus, GradingConfig,
    NavigationConfig, ParticipantConfig, QuestionPool, TimingConfig,
};
use crate::question::Question;

/// Intermediate TOML structure for definition files.
#[derive(Debug, Deserialize)]
struct TomlDefinitionFile {
    assessment: TomlAssessmentHeader,
    #[serde(default)]
    questions: Vec<Question>,
    #[serde(default)]
    pools: Vec<TomlPool>,
    #[serde(default)]
    timing: TimingConfig,
    #[serde(default)]
    navigation: Option<NavigationConfig>,
    #[serde(default)]
    grading: Option<GradingConfig>,
    #[serde(default)]
    adaptive: Option<AdaptiveConfig>,
    #[serde(default)]
    availability: AvailabilityWindow,
    #[serde(default)]
    participants: ParticipantConfig,
}

#[derive(Debug, Deserialize)]
struct TomlAssessmentHeader {
    id: String,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    max_attempts: Option<u32>,
    #[serde(default = "default_version")]
    version: u32,
}

fn default_version() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct TomlPool {
    name: String,
    select_count: usize,
    #[serde(default)]
    randomize: bool,
    #[serde(default)]
    questions: Vec<Question>,
}

/// Parse a single TOML file into an `AssessmentDefinition`.
pub fn parse_definition(path: &Path) -> Result<AssessmentDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read definition file: {}", path.display()))?;

    parse_definition_str(&content, path)
}

/// Parse a TOML string into an `AssessmentDefinition` (useful for testing).
/// Parsed definitions always start out as drafts; publication is a separate,
/// validated step.
pub fn parse_definition_str(content: &str, source_path: &Path) -> Result<AssessmentDefinition> {
    let parsed: TomlDefinitionFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let pools = parsed
        .pools
        .into_iter()
        .map(|p| QuestionPool {
            name: p.name,
            candidates: p.questions,
            select_count: p.select_count,
            randomize: p.randomize,
        })
        .collect();

    Ok(AssessmentDefinition {
        id: parsed.assessment.id,
        title: parsed.assessment.title,
        description: parsed.assessment.description,
        questions: parsed.questions,
        pools,
        timing: parsed.timing,
        navigation: parsed.navigation.unwrap_or_default(),
        grading: parsed.grading.unwrap_or_default(),
        adaptive: parsed.adaptive.unwrap_or_default(),
        availability: parsed.availability,
        participants: parsed.participants,
        max_attempts: parsed.assessment.max_attempts,
        status: DefinitionStatus::Draft,
        version: parsed.assessment.version,
    })
}

/// Recursively load all `.toml` definition files from a directory.
pub fn load_definition_directory(dir: &Path) -> Result<Vec<AssessmentDefinition>> {
    let mut definitions = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            definitions.extend(load_definition_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_definition(&path) {
                Ok(def) => definitions.push(def),
                Err(e) => {
                    tracing::warn!("skipping {}: {}", path.display(), e);
                }
            }
        }
    }

    Ok(definitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::{Difficulty, QuestionKind};
    use std::path::PathBuf;

    const VALID_TOML: &str = r#"
[assessment]
id = "rust-basics"
title = "Rust Basics Quiz"
description = "Ownership and borrowing fundamentals"
max_attempts = 2

[timing]
time_limit_secs = 600

[navigation]
allow_backward = false

[grading]
passing_score = 70.0

[[questions]]
id = "q1"
type = "multiple_choice"
prompt = "Which keyword declares an immutable binding?"
points = 10.0
difficulty = "easy"
options = [
    { id = "a", text = "let", correct = true },
    { id = "b", text = "mut", correct = false },
    { id = "c", text = "static", correct = false },
]

[[questions]]
id = "q2"
type = "true_false"
prompt = "A value can have two mutable borrows at once."
points = 5.0
correct = false

[[pools]]
name = "ownership"
select_count = 1
randomize = true

[[pools.questions]]
id = "p1"
type = "true_false"
prompt = "Moves invalidate the source binding."
points = 2.0
correct = true

[[pools.questions]]
id = "p2"
type = "true_false"
prompt = "Clone is always a deep copy."
points = 2.0
correct = false
"#;

    #[test]
    fn parse_valid_toml() {
        let def = parse_definition_str(VALID_TOML, &PathBuf::from("test.toml")).unwrap();
        assert_eq!(def.id, "rust-basics");
        assert_eq!(def.questions.len(), 2);
        assert_eq!(def.pools.len(), 1);
        assert_eq!(def.pools[0].candidates.len(), 2);
        assert_eq!(def.timing.time_limit_secs, Some(600));
        assert!(!def.navigation.allow_backward);
        assert_eq!(def.grading.passing_score, 70.0);
        assert_eq!(def.max_attempts, Some(2));
        assert_eq!(def.status, DefinitionStatus::Draft);
        assert_eq!(def.questions[0].difficulty, Difficulty::Easy);
        assert!(matches!(
            def.questions[1].kind,
            QuestionKind::TrueFalse { correct: false }
        ));
    }

    #[test]
    fn parse_missing_optional_fields() {
        let toml = r#"
[assessment]
id = "minimal"
title = "Minimal"

[[questions]]
id = "q1"
type = "essay"
prompt = "Discuss lifetimes."
points = 20.0
"#;
        let def = parse_definition_str(toml, &PathBuf::from("test.toml")).unwrap();
        assert_eq!(def.version, 1);
        assert_eq!(def.timing.time_limit_secs, None);
        assert!(def.navigation.allow_backward);
        assert_eq!(def.grading.passing_score, 60.0);
        assert!(def.max_attempts.is_none());
        assert!(!def.adaptive.enabled);
    }

    #[test]
    fn parsed_definition_passes_validation() {
        let def = parse_definition_str(VALID_TOML, &PathBuf::from("test.toml")).unwrap();
        assert!(def.validate().is_empty());
    }

    #[test]
    fn parse_malformed_toml() {
        let bad = "this is not [valid toml }{";
        let result = parse_definition_str(bad, &PathBuf::from("bad.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn unknown_question_type_is_an_error() {
        let toml = r#"
[assessment]
id = "bad-type"
title = "Bad Type"

[[questions]]
id = "q1"
type = "telepathy"
prompt = "Guess what I'm thinking."
points = 1.0
"#;
        let result = parse_definition_str(toml, &PathBuf::from("test.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn load_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("quiz.toml");
        std::fs::write(&file_path, VALID_TOML).unwrap();
        // Broken files are skipped, not fatal.
        std::fs::write(dir.path().join("broken.toml"), "not toml [").unwrap();

        let defs = load_definition_directory(dir.path()).unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].id, "rust-basics");
    }
}
