use std::borrow::Cow;
use std::sync::Arc;

use super::HydrationEngine;
use crate::core::{
    ClassId, Direction, Document, ModelObject, ModelRef, OdmError, Property, Props, Result, Value,
};
use crate::metadata::{DocumentMetadata, FieldMetadata, MetadataId};
use crate::types::Type;

pub(crate) type ToPersistedStep =
    Box<dyn Fn(&HydrationEngine, &ModelObject, &mut Document) -> Result<()> + Send + Sync>;

pub(crate) type FromPersistedStep =
    Box<dyn Fn(&HydrationEngine, &Document, &ModelRef, &mut Props) -> Result<()> + Send + Sync>;

pub(crate) type InitStep =
    Box<dyn Fn(&HydrationEngine, &Props, &ModelRef, &mut Props) -> Result<()> + Send + Sync>;

/// Arguments: source props, the target's current props, the target, output.
pub(crate) type MergeStep = Box<
    dyn Fn(&HydrationEngine, &Props, &Props, &ModelRef, &mut Props) -> Result<()> + Send + Sync,
>;

pub(crate) struct Creatable {
    pub(crate) property: String,
    pub(crate) ty: Arc<dyn Type>,
}

/// The four transformation routines of one class, each a straight run of
/// per-field steps.
pub(crate) struct CompiledHydrator {
    pub(crate) to_persisted: Vec<ToPersistedStep>,
    pub(crate) from_persisted: Vec<FromPersistedStep>,
    pub(crate) init: Vec<InitStep>,
    pub(crate) merge: Vec<MergeStep>,
    /// Fields synthesized by the prepare pass of init and merge.
    pub(crate) creatable: Vec<Creatable>,
}

#[derive(Clone)]
enum Rule {
    Untyped,
    Typed { ty: Arc<dyn Type>, array: bool },
    Embedded { target: MetadataId, class: ClassId, array: bool },
}

impl Rule {
    fn of(field: &FieldMetadata, class_of: impl Fn(MetadataId) -> ClassId) -> Self {
        match (field.embedded, &field.ty) {
            (Some(target), _) => Rule::Embedded {
                target,
                class: class_of(target),
                array: field.is_embedded_array,
            },
            (None, Some(ty)) => Rule::Typed {
                ty: ty.clone(),
                array: field.type_is_array,
            },
            (None, None) => Rule::Untyped,
        }
    }
}

pub(crate) fn compile(engine: &HydrationEngine, meta: &DocumentMetadata) -> CompiledHydrator {
    let mut compiled = CompiledHydrator {
        to_persisted: Vec::with_capacity(meta.fields.len()),
        from_persisted: Vec::with_capacity(meta.fields.len()),
        init: Vec::with_capacity(meta.fields.len()),
        merge: Vec::with_capacity(meta.fields.len()),
        creatable: Vec::new(),
    };

    for field in meta.fields.values() {
        let rule = Rule::of(field, |id| engine.graph().get(id).class.clone());
        let property = field.property.clone();
        let name = field.name.clone();

        compiled.to_persisted.push(to_persisted_step(
            property.clone(),
            name.clone(),
            rule.clone(),
            field.should_create_value,
        ));
        compiled
            .from_persisted
            .push(from_persisted_step(property.clone(), name, rule.clone()));
        compiled.init.push(init_step(property.clone(), rule.clone()));
        compiled.merge.push(merge_step(property.clone(), rule));

        if field.should_create_value {
            if let Some(ty) = &field.ty {
                compiled.creatable.push(Creatable {
                    property,
                    ty: ty.clone(),
                });
            }
        }
    }

    compiled
}

fn boxed_to_persisted<F>(f: F) -> ToPersistedStep
where
    F: Fn(&HydrationEngine, &ModelObject, &mut Document) -> Result<()> + Send + Sync + 'static,
{
    Box::new(f)
}

fn boxed_from_persisted<F>(f: F) -> FromPersistedStep
where
    F: Fn(&HydrationEngine, &Document, &ModelRef, &mut Props) -> Result<()> + Send + Sync + 'static,
{
    Box::new(f)
}

fn boxed_init<F>(f: F) -> InitStep
where
    F: Fn(&HydrationEngine, &Props, &ModelRef, &mut Props) -> Result<()> + Send + Sync + 'static,
{
    Box::new(f)
}

fn boxed_merge<F>(f: F) -> MergeStep
where
    F: Fn(&HydrationEngine, &Props, &Props, &ModelRef, &mut Props) -> Result<()>
        + Send
        + Sync
        + 'static,
{
    Box::new(f)
}

fn to_persisted_step(property: String, name: String, rule: Rule, create: bool) -> ToPersistedStep {
    match rule {
        Rule::Untyped => boxed_to_persisted(move |_, model, doc| {
            if let Some(value) = model.get(&property) {
                doc.insert(name.clone(), value.to_raw());
            }
            Ok(())
        }),
        Rule::Typed { ty, array } => boxed_to_persisted(move |_, model, doc| {
            match model.get(&property) {
                Some(value) if !value.is_null() => {
                    doc.insert(name.clone(), typed_to_persisted(ty.as_ref(), array, value)?);
                }
                _ if create => {
                    if let Some(created) = ty.create_model_value(None) {
                        doc.insert(name.clone(), ty.to_persisted(&created)?);
                    }
                }
                Some(_) => {
                    doc.insert(name.clone(), Value::Null);
                }
                None => {}
            }
            Ok(())
        }),
        Rule::Embedded {
            target,
            class,
            array,
        } => boxed_to_persisted(move |engine, model, doc| {
            let Some(value) = model.get(&property) else {
                return Ok(());
            };
            let persisted = match (array, value) {
                (_, Property::Value(Value::Null)) => Some(Value::Null),
                (false, single) => {
                    embedded_to_persisted(engine, target, &class, single)?.map(Value::Document)
                }
                (true, Property::List(items)) => {
                    let mut docs = Vec::with_capacity(items.len());
                    for item in items {
                        if let Some(sub) = embedded_to_persisted(engine, target, &class, item)? {
                            docs.push(Value::Document(sub));
                        }
                    }
                    Some(Value::Array(docs))
                }
                (true, other) => {
                    return Err(rejected(&embedded_name(&class), other, Direction::ToPersisted));
                }
            };
            if let Some(persisted) = persisted {
                doc.insert(name.clone(), persisted);
            }
            Ok(())
        }),
    }
}

fn from_persisted_step(property: String, name: String, rule: Rule) -> FromPersistedStep {
    match rule {
        Rule::Untyped => boxed_from_persisted(move |_, doc, _, props| {
            if let Some(value) = doc.get(&name) {
                props.insert(property.clone(), Property::from_raw(value.clone()));
            }
            Ok(())
        }),
        Rule::Typed { ty, array } => boxed_from_persisted(move |_, doc, _, props| {
            if let Some(value) = doc.get(&name) {
                props.insert(property.clone(), typed_to_model(ty.as_ref(), array, value)?);
            }
            Ok(())
        }),
        Rule::Embedded {
            target,
            class,
            array,
        } => boxed_from_persisted(move |engine, doc, parent, props| {
            let Some(value) = doc.get(&name) else {
                return Ok(());
            };
            match (array, value) {
                (_, Value::Null) => {
                    props.insert(property.clone(), Property::Value(Value::Null));
                }
                (false, Value::Document(sub)) => {
                    if let Some(model) = engine.from_persisted(target, sub, Some(parent))? {
                        props.insert(property.clone(), Property::Model(model));
                    }
                }
                (true, Value::Array(items)) => {
                    let mut models = Vec::with_capacity(items.len());
                    for item in items {
                        let Value::Document(sub) = item else {
                            return Err(OdmError::invalid_value(
                                embedded_name(&class),
                                item,
                                Direction::ToModel,
                            ));
                        };
                        if let Some(model) = engine.from_persisted(target, sub, Some(parent))? {
                            models.push(Property::Model(model));
                        }
                    }
                    props.insert(property.clone(), Property::List(models));
                }
                (_, other) => {
                    return Err(OdmError::invalid_value(
                        embedded_name(&class),
                        other,
                        Direction::ToModel,
                    ));
                }
            }
            Ok(())
        }),
    }
}

fn init_step(property: String, rule: Rule) -> InitStep {
    match rule {
        Rule::Untyped => boxed_init(move |_, source, _, out| {
            if let Some(value) = source.get(&property) {
                out.insert(property.clone(), value.clone());
            }
            Ok(())
        }),
        Rule::Typed { ty, array } => boxed_init(move |_, source, _, out| {
            if let Some(value) = source.get(&property) {
                out.insert(property.clone(), touch(ty.as_ref(), array, value)?);
            }
            Ok(())
        }),
        Rule::Embedded {
            target,
            class,
            array,
        } => boxed_init(move |engine, source, parent, out| {
            if let Some(value) = source.get(&property) {
                if let Some(built) = init_embedded(engine, target, &class, array, value, parent)? {
                    out.insert(property.clone(), built);
                }
            }
            Ok(())
        }),
    }
}

fn merge_step(property: String, rule: Rule) -> MergeStep {
    match rule {
        Rule::Untyped => boxed_merge(move |_, source, _, _, out| {
            if let Some(value) = source.get(&property) {
                out.insert(property.clone(), value.clone());
            }
            Ok(())
        }),
        Rule::Typed { ty, array } => boxed_merge(move |_, source, _, _, out| {
            if let Some(value) = source.get(&property) {
                out.insert(property.clone(), touch(ty.as_ref(), array, value)?);
            }
            Ok(())
        }),
        // Arrays are rebuilt from the source rather than merged by position.
        Rule::Embedded {
            target,
            class,
            array: true,
        } => boxed_merge(move |engine, source, _, parent, out| {
            if let Some(value) = source.get(&property) {
                if let Some(built) = init_embedded(engine, target, &class, true, value, parent)? {
                    out.insert(property.clone(), built);
                }
            }
            Ok(())
        }),
        Rule::Embedded {
            target,
            class,
            array: false,
        } => boxed_merge(move |engine, source, existing, parent, out| {
            let Some(value) = source.get(&property) else {
                return Ok(());
            };
            if value.is_null() {
                out.insert(property.clone(), Property::Value(Value::Null));
                return Ok(());
            }
            let props = embedded_source(value)
                .ok_or_else(|| rejected(&embedded_name(&class), value, Direction::ToModel))?;
            let merged = match existing.get(&property) {
                Some(Property::Model(current)) => {
                    engine.merge(target, Some(current), &props, Some(parent))?
                }
                _ => engine.init(target, &props, Some(parent))?,
            };
            if let Some(model) = merged {
                out.insert(property.clone(), Property::Model(model));
            }
            Ok(())
        }),
    }
}

fn embedded_to_persisted(
    engine: &HydrationEngine,
    target: MetadataId,
    class: &ClassId,
    value: &Property,
) -> Result<Option<Document>> {
    match value {
        Property::Model(model) => engine.to_persisted(target, model),
        Property::Map(props) => match engine.init(target, props, None)? {
            Some(model) => engine.to_persisted(target, &model),
            None => Ok(None),
        },
        other => Err(rejected(&embedded_name(class), other, Direction::ToPersisted)),
    }
}

fn init_embedded(
    engine: &HydrationEngine,
    target: MetadataId,
    class: &ClassId,
    array: bool,
    value: &Property,
    parent: &ModelRef,
) -> Result<Option<Property>> {
    if value.is_null() {
        return Ok(Some(Property::Value(Value::Null)));
    }
    let init_one = |item: &Property| -> Result<Option<ModelRef>> {
        let props = embedded_source(item)
            .ok_or_else(|| rejected(&embedded_name(class), item, Direction::ToModel))?;
        engine.init(target, &props, Some(parent))
    };

    if !array {
        return Ok(init_one(value)?.map(Property::Model));
    }
    let Property::List(items) = value else {
        return Err(rejected(&embedded_name(class), value, Direction::ToModel));
    };
    let mut models = Vec::with_capacity(items.len());
    for item in items {
        if let Some(model) = init_one(item)? {
            models.push(Property::Model(model));
        }
    }
    Ok(Some(Property::List(models)))
}

/// Props to build an embedded instance from: a plain map as is, or a snapshot
/// of an existing instance.
fn embedded_source(value: &Property) -> Option<Cow<'_, Props>> {
    match value {
        Property::Map(props) => Some(Cow::Borrowed(props)),
        Property::Model(model) => Some(Cow::Owned(model.read().properties().clone())),
        _ => None,
    }
}

fn typed_to_persisted(ty: &dyn Type, array: bool, value: &Property) -> Result<Value> {
    match (array, value) {
        (_, Property::Value(Value::Null)) => Ok(Value::Null),
        (false, Property::Value(scalar)) => ty.to_persisted(scalar),
        (true, Property::Value(Value::Array(items))) => items
            .iter()
            .map(|item| ty.to_persisted(item))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        (true, Property::List(items)) => items
            .iter()
            .map(|item| match item {
                Property::Value(scalar) => ty.to_persisted(scalar),
                other => Err(rejected(ty.name(), other, Direction::ToPersisted)),
            })
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        (_, other) => Err(rejected(ty.name(), other, Direction::ToPersisted)),
    }
}

fn typed_to_model(ty: &dyn Type, array: bool, value: &Value) -> Result<Property> {
    match (array, value) {
        (_, Value::Null) => Ok(Property::Value(Value::Null)),
        (true, Value::Array(items)) => items
            .iter()
            .map(|item| ty.to_model(item).map(Property::Value))
            .collect::<Result<Vec<_>>>()
            .map(Property::List),
        (true, other) => Err(OdmError::invalid_value(ty.name(), other, Direction::ToModel)),
        (false, scalar) => ty.to_model(scalar).map(Property::Value),
    }
}

/// Normalises a model-side value handed to init or merge: valid model values
/// are kept, valid persisted values are decoded, anything else is rejected.
fn touch(ty: &dyn Type, array: bool, value: &Property) -> Result<Property> {
    let touch_scalar = |scalar: &Value| -> Result<Value> {
        if scalar.is_null() || ty.is_valid_model_value(scalar) {
            Ok(scalar.clone())
        } else if ty.is_valid_persisted_value(scalar) {
            Ok(ty.convert_to_model(scalar))
        } else {
            Err(OdmError::invalid_value(ty.name(), scalar, Direction::ToModel))
        }
    };

    match (array, value) {
        (_, Property::Value(Value::Null)) => Ok(value.clone()),
        (false, Property::Value(scalar)) => touch_scalar(scalar).map(Property::Value),
        (true, Property::Value(Value::Array(items))) => items
            .iter()
            .map(|item| touch_scalar(item).map(Property::Value))
            .collect::<Result<Vec<_>>>()
            .map(Property::List),
        (true, Property::List(items)) => items
            .iter()
            .map(|item| match item {
                Property::Value(scalar) => touch_scalar(scalar).map(Property::Value),
                other => Err(rejected(ty.name(), other, Direction::ToModel)),
            })
            .collect::<Result<Vec<_>>>()
            .map(Property::List),
        (_, other) => Err(rejected(ty.name(), other, Direction::ToModel)),
    }
}

fn rejected(type_name: &str, value: &Property, direction: Direction) -> OdmError {
    OdmError::invalid_value(type_name, &value.to_raw(), direction)
}

fn embedded_name(class: &ClassId) -> String {
    format!("embedded<{}>", class)
}
