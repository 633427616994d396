//! Filter and update expression casting.
//!
//! Field paths are rewritten to persisted names and values reached through a
//! typed field are encoded the way hydration would store them. Operator
//! structure is left intact. Casting never fails: a value the field's type
//! cannot encode is kept as given.

mod options;

pub use options::CastOptions;

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use tracing::debug;

use crate::core::{Document, Value};
use crate::metadata::{DocumentMetadata, MetadataGraph, MetadataId};
use crate::types::Type;

/// Where a field path ended up.
enum Terminal {
    Typed(Arc<dyn Type>),
    Embedded(MetadataId),
    Untracked,
}

enum Cursor {
    Document(MetadataId),
    Typed(Arc<dyn Type>),
    Lost,
}

pub(crate) struct ExpressionCaster {
    options: CastOptions,
    /// Per metadata: whether anything in its closure is typed, renamed or
    /// embedded. Computed on first use.
    plans: Vec<OnceLock<bool>>,
}

impl ExpressionCaster {
    pub(crate) fn new(graph: &MetadataGraph, options: CastOptions) -> Self {
        Self {
            options,
            plans: (0..graph.len()).map(|_| OnceLock::new()).collect(),
        }
    }

    pub(crate) fn requires_cast(&self, graph: &MetadataGraph, id: MetadataId) -> bool {
        *self.plans[id.index()].get_or_init(|| {
            let required = closure_requires_cast(graph, id);
            debug!(class = %graph.get(id).class(), required, "compiled caster plan");
            required
        })
    }

    pub(crate) fn cast_filter(&self, graph: &MetadataGraph, id: MetadataId, filter: &Document) -> Document {
        if !self.requires_cast(graph, id) {
            return filter.clone();
        }
        self.cast_document(graph, id, filter, None)
    }

    pub(crate) fn cast_update(&self, graph: &MetadataGraph, id: MetadataId, update: &Document) -> Document {
        if !self.requires_cast(graph, id) {
            return update.clone();
        }
        self.cast_document(graph, id, update, None)
    }

    /// Casts one expression object. `operator` is the innermost operator the
    /// object sits under, if any.
    fn cast_document(
        &self,
        graph: &MetadataGraph,
        id: MetadataId,
        doc: &Document,
        operator: Option<&str>,
    ) -> Document {
        let id = self.select_variant(graph, id, doc);
        let mut out = Document::with_capacity(doc.len());
        for (key, value) in doc {
            if self.options.is_operator(key) {
                out.insert(key.clone(), self.cast_operator(graph, id, key, value));
            } else {
                let (path, terminal) = self.resolve_path(graph, id, key);
                out.insert(path, self.cast_condition(graph, terminal, value, operator));
            }
        }
        out
    }

    fn cast_operator(&self, graph: &MetadataGraph, id: MetadataId, operator: &str, value: &Value) -> Value {
        match value {
            Value::Document(doc) => Value::Document(self.cast_document(graph, id, doc, Some(operator))),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| match item {
                        Value::Document(doc) => {
                            Value::Document(self.cast_document(graph, id, doc, Some(operator)))
                        }
                        other => other.clone(),
                    })
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn cast_condition(
        &self,
        graph: &MetadataGraph,
        terminal: Terminal,
        value: &Value,
        operator: Option<&str>,
    ) -> Value {
        match terminal {
            Terminal::Typed(ty) => self.cast_typed(ty.as_ref(), value, operator),
            Terminal::Embedded(id) => match value {
                Value::Document(doc) => Value::Document(self.cast_document(graph, id, doc, operator)),
                Value::Array(items) => Value::Array(
                    items
                        .iter()
                        .map(|item| match item {
                            Value::Document(doc) => {
                                Value::Document(self.cast_document(graph, id, doc, operator))
                            }
                            other => other.clone(),
                        })
                        .collect(),
                ),
                other => other.clone(),
            },
            Terminal::Untracked => value.clone(),
        }
    }

    fn cast_typed(&self, ty: &dyn Type, value: &Value, operator: Option<&str>) -> Value {
        if operator.is_some_and(|op| self.options.is_value_exempt(op)) {
            return value.clone();
        }
        match value {
            Value::Document(doc) if doc.keys().any(|key| self.options.is_operator(key)) => {
                let mut out = Document::with_capacity(doc.len());
                for (key, inner) in doc {
                    let cast = if self.options.is_operator(key) {
                        self.cast_typed(ty, inner, Some(key))
                    } else {
                        inner.clone()
                    };
                    out.insert(key.clone(), cast);
                }
                Value::Document(out)
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.cast_typed(ty, item, None))
                    .collect(),
            ),
            scalar => soft_cast(ty, scalar),
        }
    }

    fn resolve_path(&self, graph: &MetadataGraph, id: MetadataId, path: &str) -> (String, Terminal) {
        let mut cursor = Cursor::Document(id);
        let mut segments = Vec::new();

        for segment in path.split('.') {
            let passthrough = is_index(segment) || self.options.is_positional(segment);
            cursor = match cursor {
                Cursor::Document(current) if passthrough => {
                    segments.push(segment.to_string());
                    Cursor::Document(current)
                }
                Cursor::Document(current) => match graph.get(current).resolve_field(segment) {
                    Some(field) => {
                        segments.push(field.name().to_string());
                        match (field.embedded(), field.ty()) {
                            (Some(embedded), _) => Cursor::Document(embedded),
                            (None, Some(ty)) => Cursor::Typed(ty.clone()),
                            (None, None) => Cursor::Lost,
                        }
                    }
                    None => {
                        segments.push(segment.to_string());
                        Cursor::Lost
                    }
                },
                Cursor::Typed(ty) if passthrough => {
                    segments.push(segment.to_string());
                    Cursor::Typed(ty)
                }
                _ => {
                    segments.push(segment.to_string());
                    Cursor::Lost
                }
            };
        }

        let terminal = match cursor {
            Cursor::Document(id) => Terminal::Embedded(id),
            Cursor::Typed(ty) => Terminal::Typed(ty),
            Cursor::Lost => Terminal::Untracked,
        };
        (segments.join("."), terminal)
    }

    /// A tag value in the expression narrows casting to that variant.
    fn select_variant(&self, graph: &MetadataGraph, id: MetadataId, doc: &Document) -> MetadataId {
        let meta = graph.get(id);
        let Some(discriminator) = meta.discriminator() else {
            return id;
        };
        let tag = doc
            .get(discriminator.property())
            .or_else(|| doc.get(discriminator.name()));
        let key = match tag {
            Some(Value::Text(s)) => s.clone(),
            Some(Value::Integer(i)) => i.to_string(),
            Some(Value::Boolean(b)) => b.to_string(),
            _ => return id,
        };
        discriminator.variant(&key).unwrap_or(id)
    }
}

fn soft_cast(ty: &dyn Type, value: &Value) -> Value {
    match ty.to_persisted_expression(value) {
        Ok(cast) => cast,
        Err(error) => {
            debug!(type_name = ty.name(), %error, "kept uncast expression value");
            value.clone()
        }
    }
}

fn is_index(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

fn closure_requires_cast(graph: &MetadataGraph, root: MetadataId) -> bool {
    let mut visited = HashSet::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        let meta = graph.get(id);
        if own_fields_require_cast(meta) {
            return true;
        }
        stack.extend(meta.fields().filter_map(|field| field.embedded()));
        if let Some(discriminator) = meta.discriminator() {
            stack.extend(discriminator.variants().map(|(_, variant)| variant));
        }
    }
    false
}

fn own_fields_require_cast(meta: &DocumentMetadata) -> bool {
    meta.fields()
        .any(|field| field.ty().is_some() || field.is_renamed())
}
