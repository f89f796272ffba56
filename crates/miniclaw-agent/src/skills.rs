//! Skills loader — reads `SKILL.md` files from skill directories.
//!
//! Skills are Markdown documents describing how to combine existing tools
//! for a domain. They never register tools and are not injected into the
//! system prompt; callers decide what to do with them.
//!
//! ## Layout
//!
//! ```text
//! <dir>/<name>/SKILL.md
//! ```
//!
//! ## SKILL.md format
//!
//! ```text
//! ---
//! name: weather
//! description: Look up the forecast
//! emoji: "🌦"
//! requires:
//!   bins: [curl]
//!   env: [WEATHER_API_KEY]
//! ---
//!
//! # Weather
//!
//! Use the `bash` tool to run `curl` ...
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use miniclaw_core::config::Config;
use miniclaw_core::error::SkillError;
use serde::Deserialize;
use tracing::{debug, info, warn};

/// File name every skill directory must contain.
pub const SKILL_FILE: &str = "SKILL.md";

// ─────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────

/// External requirements a skill declares.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct SkillRequires {
    /// Binaries that must be on `PATH`.
    #[serde(default)]
    pub bins: Vec<String>,
    /// Environment variables that must be set.
    #[serde(default)]
    pub env: Vec<String>,
}

impl SkillRequires {
    /// Unmet requirements, formatted `bin:<name>` / `env:<name>`.
    pub fn missing(&self) -> Vec<String> {
        let bins = self
            .bins
            .iter()
            .filter(|b| !is_binary_available(b))
            .map(|b| format!("bin:{b}"));
        let env = self
            .env
            .iter()
            .filter(|v| std::env::var(v).is_err())
            .map(|v| format!("env:{v}"));
        bins.chain(env).collect()
    }
}

#[derive(Debug, Default, Deserialize)]
struct SkillFrontmatter {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    emoji: Option<String>,
    #[serde(default)]
    requires: SkillRequires,
}

/// A loaded skill.
#[derive(Clone, Debug, PartialEq)]
pub struct Skill {
    pub name: String,
    pub description: String,
    pub emoji: Option<String>,
    pub requires: SkillRequires,
    /// Markdown body with the front-matter removed.
    pub content: String,
    /// Path of the `SKILL.md` this was loaded from.
    pub path: PathBuf,
}

// ─────────────────────────────────────────────
// Single-file and single-directory loading
// ─────────────────────────────────────────────

/// Load and validate one `SKILL.md`.
pub fn load_from_file(path: &Path) -> Result<Skill, SkillError> {
    if !path.is_file() {
        return Err(SkillError::NotFound(path.to_path_buf()));
    }
    let raw = std::fs::read_to_string(path).map_err(|source| SkillError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let (yaml, body) = match split_frontmatter(&raw) {
        Some(parts) => parts,
        None => return Err(SkillError::MissingName(path.to_path_buf())),
    };

    let frontmatter: SkillFrontmatter = if yaml.trim().is_empty() {
        SkillFrontmatter::default()
    } else {
        serde_yaml::from_str(yaml).map_err(|e| SkillError::InvalidFrontmatter {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
    };

    let name = frontmatter
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| SkillError::MissingName(path.to_path_buf()))?;

    let missing = frontmatter.requires.missing();
    if !missing.is_empty() {
        return Err(SkillError::MissingDependency {
            skill: name,
            missing,
        });
    }

    debug!(skill = %name, path = %path.display(), "loaded skill");
    Ok(Skill {
        name,
        description: frontmatter.description.unwrap_or_default(),
        emoji: frontmatter.emoji,
        requires: frontmatter.requires,
        content: body.to_string(),
        path: path.to_path_buf(),
    })
}

/// Load every `<dir>/<name>/SKILL.md`. Failures are logged and skipped; a
/// missing directory yields nothing. Sorted by name.
pub fn load_from_directory(dir: &Path) -> Vec<Skill> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return Vec::new(),
    };

    let mut skills = Vec::new();
    for entry in entries.flatten() {
        let skill_file = entry.path().join(SKILL_FILE);
        if !skill_file.is_file() {
            continue;
        }
        match load_from_file(&skill_file) {
            Ok(skill) => skills.push(skill),
            Err(e) => warn!(path = %skill_file.display(), error = %e, "failed to load skill"),
        }
    }

    skills.sort_by(|a, b| a.name.cmp(&b.name));
    info!(count = skills.len(), dir = %dir.display(), "skills loaded");
    skills
}

/// Write a starter `SKILL.md` under `<dir>/<name>/`.
///
/// Returns `false` without touching anything if the file already exists.
pub fn create_skill_template(name: &str, dir: &Path) -> Result<bool, SkillError> {
    let skill_dir = dir.join(name);
    let skill_file = skill_dir.join(SKILL_FILE);
    if skill_file.exists() {
        return Ok(false);
    }

    let write_err = |source| SkillError::Write {
        path: skill_file.clone(),
        source,
    };
    std::fs::create_dir_all(&skill_dir).map_err(write_err)?;
    std::fs::write(&skill_file, skill_template(name)).map_err(write_err)?;

    info!(skill = name, path = %skill_file.display(), "created skill template");
    Ok(true)
}

fn skill_template(name: &str) -> String {
    format!(
        "---\n\
         name: {name}\n\
         description: Describe what this skill helps with\n\
         requires:\n  bins: []\n  env: []\n\
         ---\n\
         \n\
         # {name}\n\
         \n\
         Explain when to use this skill and which tools to combine.\n"
    )
}

// ─────────────────────────────────────────────
// SkillsLoader
// ─────────────────────────────────────────────

/// Loads skills from an ordered list of directories. When two directories
/// hold a skill with the same name, the earlier directory wins.
#[derive(Clone, Debug)]
pub struct SkillsLoader {
    directories: Vec<PathBuf>,
}

impl SkillsLoader {
    pub fn new(directories: Vec<PathBuf>) -> Self {
        Self { directories }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.skill_dirs())
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    /// All loadable skills across every directory, sorted by name.
    pub fn load_all(&self) -> Vec<Skill> {
        let mut seen = HashSet::new();
        let mut skills: Vec<Skill> = self
            .directories
            .iter()
            .flat_map(|dir| load_from_directory(dir))
            .filter(|s| seen.insert(s.name.clone()))
            .collect();
        skills.sort_by(|a, b| a.name.cmp(&b.name));
        skills
    }

    /// Load the skill stored under `<dir>/<name>/SKILL.md` in the first
    /// directory that has one.
    pub fn find(&self, name: &str) -> Result<Skill, SkillError> {
        for dir in &self.directories {
            let path = dir.join(name).join(SKILL_FILE);
            if path.is_file() {
                return load_from_file(&path);
            }
        }
        let first = self
            .directories
            .first()
            .map(|d| d.join(name).join(SKILL_FILE))
            .unwrap_or_else(|| PathBuf::from(name).join(SKILL_FILE));
        Err(SkillError::NotFound(first))
    }

    /// Create a template in the first configured directory.
    pub fn create(&self, name: &str) -> Result<(bool, PathBuf), SkillError> {
        let dir = self
            .directories
            .first()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("./skills"));
        let created = create_skill_template(name, &dir)?;
        Ok((created, dir.join(name).join(SKILL_FILE)))
    }
}

// ─────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────

/// Split `---\n<yaml>\n---\n<body>` into its two parts.
fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix("---")?;
    let rest = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))?;

    // Empty front-matter: the closing fence comes first.
    let (yaml, after_fence) = if let Some(after) = rest.strip_prefix("---") {
        ("", after)
    } else {
        let end = rest.find("\n---")?;
        (&rest[..end], &rest[end + 4..])
    };

    let body = match after_fence.find('\n') {
        Some(i) => &after_fence[i + 1..],
        None => "",
    };
    Some((yaml, body.trim_start_matches(&['\r', '\n'][..])))
}

fn is_binary_available(name: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(name).is_file()))
        .unwrap_or(false)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
