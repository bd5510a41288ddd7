//! Key codes and key → intent bindings.
//!
//! The table is built once at startup and handed to whoever needs it. Input
//! handlers never touch the scene directly; they turn an [`Intent`] into a
//! queued action.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::{Result, VizError};

/// Name ↔ code lookup for keyboard keys. Codes follow the GLFW numbering.
#[derive(Debug, Clone, Default)]
pub struct KeyTable {
    by_name: HashMap<String, u32>,
    by_code: HashMap<u32, String>,
}

impl KeyTable {
    pub fn standard() -> Self {
        let mut table = Self::default();
        for (offset, letter) in ('a'..='z').enumerate() {
            table.insert(letter.to_string(), 65 + offset as u32);
        }
        for digit in 0..=9u32 {
            table.insert(digit.to_string(), 48 + digit);
        }
        for (name, code) in [
            ("space", 32),
            ("escape", 256),
            ("enter", 257),
            ("tab", 258),
            ("backspace", 259),
            ("right", 262),
            ("left", 263),
            ("down", 264),
            ("up", 265),
        ] {
            table.insert(name.to_string(), code);
        }
        for n in 1..=12u32 {
            table.insert(format!("f{n}"), 289 + n);
        }
        table
    }

    fn insert(&mut self, name: String, code: u32) {
        self.by_code.insert(code, name.clone());
        self.by_name.insert(name, code);
    }

    /// Case-insensitive lookup.
    pub fn code(&self, name: &str) -> Option<u32> {
        self.by_name.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn name(&self, code: u32) -> Option<&str> {
        self.by_code.get(&code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// What a key press asks the renderer to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    ToggleBlend,
    CycleDrawMode,
    ResetUniforms,
    Quit,
}

/// Resolved key code → intent map.
#[derive(Debug, Clone, Default)]
pub struct KeyBindings {
    intents: HashMap<u32, Intent>,
}

impl KeyBindings {
    /// Resolves configured key names against `table`.
    pub fn resolve(table: &KeyTable, bindings: &BTreeMap<String, Intent>) -> Result<Self> {
        let intents = bindings
            .iter()
            .map(|(name, intent)| {
                table
                    .code(name)
                    .map(|code| (code, *intent))
                    .ok_or_else(|| VizError::msg(format!("unknown key `{name}` in bindings")))
            })
            .collect::<Result<_>>()?;
        Ok(Self { intents })
    }

    pub fn intent_for(&self, code: u32) -> Option<Intent> {
        self.intents.get(&code).copied()
    }
}

pub(crate) fn default_bindings() -> BTreeMap<String, Intent> {
    BTreeMap::from([
        ("b".to_string(), Intent::ToggleBlend),
        ("m".to_string(), Intent::CycleDrawMode),
        ("r".to_string(), Intent::ResetUniforms),
        ("escape".to_string(), Intent::Quit),
    ])
}
