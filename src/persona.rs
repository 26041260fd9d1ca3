//! Persona definitions and the read-only registry the relays resolve against
//!
//! A persona couples a chat prompt prefix with a synthesis voice and the
//! imagery the web UI shows while it speaks.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// An in-character commentator
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    /// Unique identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Short descriptive phrase shown under the name
    #[serde(default)]
    pub tagline: Option<String>,

    /// Prompt prefix prepended to every user input
    pub prompt: String,

    /// Voice identifier for the speech upstream
    pub voice_id: String,

    /// Static assets for the UI
    #[serde(default)]
    pub imagery: Imagery,
}

/// Still images and speaking animations for light and dark themes
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Imagery {
    pub image_light: Option<String>,
    pub image_dark: Option<String>,
    pub animation_light: Option<String>,
    pub animation_dark: Option<String>,
}

impl Persona {
    /// Build the single user message sent to the chat upstream
    #[must_use]
    pub fn user_message(&self, input: &str) -> String {
        format!("{} {input}", self.prompt)
    }
}

/// Embedded persona data compiled into the binary
const EMBEDDED_PERSONAS: &[(&str, &str)] = &[
    ("dobby", include_str!("../personas/dobby.json")),
    ("lebrown", include_str!("../personas/lebrown.json")),
];

/// Fixed, immutable set of personas
///
/// Lookups are pure and synchronous; the registry is shared behind an `Arc`
/// and never mutated after construction.
#[derive(Debug, Clone)]
pub struct PersonaRegistry {
    personas: Vec<Persona>,
}

impl PersonaRegistry {
    /// Build a registry from an explicit list
    ///
    /// # Errors
    ///
    /// Returns error if the list is empty or contains duplicate ids
    pub fn new(personas: Vec<Persona>) -> Result<Self> {
        if personas.is_empty() {
            return Err(Error::Config("persona registry is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for persona in &personas {
            if persona.id.trim().is_empty() {
                return Err(Error::Config(format!(
                    "persona \"{}\" has an empty id",
                    persona.name
                )));
            }
            if !seen.insert(persona.id.as_str()) {
                return Err(Error::Config(format!("duplicate persona id: {}", persona.id)));
            }
        }

        Ok(Self { personas })
    }

    /// Registry of the personas compiled into the binary
    ///
    /// # Errors
    ///
    /// Returns error if the embedded data fails to parse
    pub fn embedded() -> Result<Self> {
        let personas = EMBEDDED_PERSONAS
            .iter()
            .map(|(id, json)| {
                serde_json::from_str::<Persona>(json).map_err(|e| {
                    Error::Config(format!("failed to parse embedded persona {id}: {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(personas)
    }

    /// Load every `*.json` persona in a directory
    ///
    /// Files are read in name order so listing order is stable.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be read, a file fails to parse,
    /// or the resulting set is empty or has duplicates
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut paths = std::fs::read_dir(dir)?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect::<Vec<_>>();
        paths.sort();

        let mut personas = Vec::with_capacity(paths.len());
        for path in paths {
            let content = std::fs::read_to_string(&path)?;
            let persona: Persona = serde_json::from_str(&content).map_err(|e| {
                Error::Config(format!("failed to parse {}: {e}", path.display()))
            })?;
            tracing::debug!(path = %path.display(), persona_id = %persona.id, "loaded persona");
            personas.push(persona);
        }

        Self::new(personas)
    }

    /// Load from a directory override, falling back to the embedded set
    ///
    /// # Errors
    ///
    /// Returns error if the chosen source cannot be loaded
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        match dir {
            Some(dir) => {
                let registry = Self::load_dir(dir)?;
                tracing::info!(
                    path = %dir.display(),
                    count = registry.len(),
                    "loaded personas from directory"
                );
                Ok(registry)
            }
            None => Self::embedded(),
        }
    }

    /// Find a persona by id
    #[must_use]
    pub fn lookup(&self, id: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id == id)
    }

    /// Find a persona by id or fail with [`Error::PersonaNotFound`]
    ///
    /// # Errors
    ///
    /// Returns error if no persona has this id
    pub fn resolve(&self, id: &str) -> Result<&Persona> {
        self.lookup(id)
            .ok_or_else(|| Error::PersonaNotFound(id.to_string()))
    }

    /// Iterate personas in registry order
    pub fn iter(&self) -> impl Iterator<Item = &Persona> {
        self.personas.iter()
    }

    /// Number of personas
    #[must_use]
    pub fn len(&self) -> usize {
        self.personas.len()
    }

    /// Whether the registry has no personas (never true once constructed)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }
}
