//! Action types.
//!
//! Grammar: `phase::name(|trace)*`. Trace segments are diagnostics; the
//! reducer only looks at `phase` and `name`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Bootstrap action dispatched when a store is created.
pub const INIT_ACTION: &str = "@@INIT";

const PHASE_SEPARATOR: &str = "::";
const TRACE_SEPARATOR: char = '|';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// First commit of a slice.
    InitializeSlice,
    /// Every later commit.
    SetState,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::InitializeSlice => "initializeSlice",
            Phase::SetState => "setState",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "initializeSlice" => Some(Phase::InitializeSlice),
            "setState" => Some(Phase::SetState),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed slice action type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionType {
    pub phase: Phase,
    pub name: String,
    pub trace: Vec<String>,
}

impl ActionType {
    pub fn new(phase: Phase, name: impl Into<String>) -> Self {
        Self {
            phase,
            name: name.into(),
            trace: Vec::new(),
        }
    }

    pub fn with_trace(mut self, trace: impl IntoIterator<Item = String>) -> Self {
        self.trace.extend(trace);
        self
    }

    /// Parse tolerantly. Anything that is not a known phase followed by a
    /// non-empty name yields `None` and is left alone by the reducer.
    pub fn parse(raw: &str) -> Option<Self> {
        let (phase, rest) = raw.split_once(PHASE_SEPARATOR)?;
        if phase.is_empty() || !phase.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return None;
        }
        let phase = Phase::parse(phase)?;
        let mut segments = rest.split(TRACE_SEPARATOR);
        let name = segments.next().filter(|name| !name.is_empty())?;
        Some(Self {
            phase,
            name: name.to_string(),
            trace: segments.map(str::to_string).collect(),
        })
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.phase, PHASE_SEPARATOR, self.name)?;
        for segment in &self.trace {
            write!(f, "{}{}", TRACE_SEPARATOR, segment)?;
        }
        Ok(())
    }
}

/// A dispatched action, in the shape it is logged and replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl Action {
    pub fn slice(action_type: &ActionType, payload: Map<String, Value>) -> Self {
        Self {
            kind: action_type.to_string(),
            payload: Value::Object(payload),
        }
    }

    pub fn bootstrap() -> Self {
        Self {
            kind: INIT_ACTION.to_string(),
            payload: Value::Null,
        }
    }

    pub fn action_type(&self) -> Option<ActionType> {
        ActionType::parse(&self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_trace_segments() {
        let ty = ActionType::new(Phase::SetState, "counter")
            .with_trace(["0".to_string(), "profile@2".to_string()]);
        assert_eq!(ty.to_string(), "setState::counter|0|profile@2");
    }

    #[test]
    fn parse_ignores_trace_for_identity() {
        let ty = ActionType::parse("initializeSlice::todos|3").unwrap();
        assert_eq!(ty.phase, Phase::InitializeSlice);
        assert_eq!(ty.name, "todos");
        assert_eq!(ty.trace, vec!["3".to_string()]);
    }

    #[test]
    fn parse_rejects_foreign_actions() {
        assert_eq!(ActionType::parse(INIT_ACTION), None);
        assert_eq!(ActionType::parse("@@redux/INIT::x"), None);
        assert_eq!(ActionType::parse("initializeService::todos"), None);
        assert_eq!(ActionType::parse("setState::"), None);
        assert_eq!(ActionType::parse("setState::|0"), None);
    }
}
