//! Batch container types shared between plan stages
//!
//! Upstream windowing, join and group-by stages hand the HAVING stage exactly
//! one of the shapes below per trigger cycle.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::expr::FieldRef;
use crate::value::Value;

/// Field name → value map carried by one event, ordered by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(BTreeMap<String, Value>);

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Look up a field by exact name, falling back to an ASCII
    /// case-insensitive match for schemaless sources. When several keys
    /// match case-insensitively, the smallest key in byte order wins
    /// (`"Ab"` before `"aB"`).
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).or_else(|| {
            self.0
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Build a message from a JSON object.
    pub fn from_json(json: &serde_json::Value) -> crate::Result<Self> {
        let object = json.as_object().ok_or_else(|| {
            PlanError::Upstream(format!("message must be a JSON object, got {json}"))
        })?;
        Ok(object
            .iter()
            .map(|(key, value)| (key.clone(), Value::from_json(value)))
            .collect())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Message {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// Something a field reference can be resolved against.
pub trait Row {
    /// Resolve a field. `None` means the field is absent.
    fn value(&self, field: &FieldRef) -> Option<&Value>;
}

/// One event from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuple {
    pub emitter: String,
    pub message: Message,
}

impl Tuple {
    pub fn new(emitter: impl Into<String>, message: Message) -> Self {
        Self {
            emitter: emitter.into(),
            message,
        }
    }
}

impl Row for Tuple {
    /// A qualified reference only resolves when the qualifier names this
    /// tuple's emitter.
    fn value(&self, field: &FieldRef) -> Option<&Value> {
        match &field.stream {
            Some(stream) if *stream != self.emitter => None,
            _ => self.message.get(&field.name),
        }
    }
}

/// One joined row: one tuple per participating source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinTuple {
    pub tuples: Vec<Tuple>,
}

impl JoinTuple {
    pub fn new(tuples: Vec<Tuple>) -> Self {
        Self { tuples }
    }
}

impl Row for JoinTuple {
    /// Qualified references consult only the constituent tuple emitted by
    /// the named stream. Unqualified references search the constituents in
    /// order and the first tuple holding the field wins.
    fn value(&self, field: &FieldRef) -> Option<&Value> {
        match &field.stream {
            Some(stream) => self
                .tuples
                .iter()
                .find(|tuple| tuple.emitter == *stream)
                .and_then(|tuple| tuple.message.get(&field.name)),
            None => self
                .tuples
                .iter()
                .find_map(|tuple| tuple.message.get(&field.name)),
        }
    }
}

/// All tuples from one source captured in a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowTuples {
    pub emitter: String,
    pub tuples: Vec<Tuple>,
}

/// Window contents per source, produced when the query groups only by
/// window and sources are not joined.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowTuplesSet(pub Vec<WindowTuples>);

impl WindowTuplesSet {
    /// Every tuple of every source, in source order then arrival order.
    pub fn tuples(&self) -> impl Iterator<Item = &Tuple> {
        self.0.iter().flat_map(|window| window.tuples.iter())
    }
}

/// Joined rows of one window, produced when sources are joined and the
/// query groups only by window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JoinTupleSets(pub Vec<JoinTuple>);

/// Groups sharing identical GROUP BY key values. A set holds either plain
/// tuples or joined rows, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GroupedTuplesSet {
    Tuples(Vec<Vec<Tuple>>),
    Joined(Vec<Vec<JoinTuple>>),
}

impl GroupedTuplesSet {
    /// Number of groups.
    pub fn len(&self) -> usize {
        match self {
            GroupedTuplesSet::Tuples(groups) => groups.len(),
            GroupedTuplesSet::Joined(groups) => groups.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One unit of data flowing between plan stages.
#[derive(Debug, Clone, PartialEq)]
pub enum Batch {
    Window(WindowTuplesSet),
    Join(JoinTupleSets),
    Grouped(GroupedTuplesSet),
    /// A single event from a rule without a window.
    Tuple(Tuple),
    /// An upstream failure travelling as a value.
    Error(PlanError),
}

impl Batch {
    /// Short shape name for logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Batch::Window(_) => "window_tuples_set",
            Batch::Join(_) => "join_tuple_sets",
            Batch::Grouped(_) => "grouped_tuples_set",
            Batch::Tuple(_) => "tuple",
            Batch::Error(_) => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Batch::Error(_))
    }
}

impl From<PlanError> for Batch {
    fn from(err: PlanError) -> Self {
        Batch::Error(err)
    }
}
