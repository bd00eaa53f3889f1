//! Translation of dotted property paths into storage paths.
//!
//! `address.street` on a `User` whose `address` is stored as `addr` and whose
//! `Address.street` is stored as `address_street` becomes
//! `addr.address_street`. Positional operators (`$`, `$[]`, `$[name]`) and
//! array indices pass through unchanged.

use std::{fmt::Display, sync::Arc};

use crate::{
    Error, Mapper, Result,
    class::TypeRef,
    model::{EntityModel, PropertyModel},
};

/// What a path segment was resolved to.
#[derive(Clone, Debug)]
pub enum Resolution {
    /// A property of `model`, which is the context model or one of its subtypes.
    Property { model: Arc<EntityModel>, index: usize },
    Operator,
    Index,
    /// A key of a map property.
    Key,
    /// Not resolved against any model.
    Verbatim,
}

#[derive(Clone, Debug)]
pub struct Segment {
    raw: String,
    translated: String,
    resolution: Resolution,
}

impl Segment {
    /// The segment as written.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The segment as stored.
    pub fn translated(&self) -> &str {
        &self.translated
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    pub fn property(&self) -> Option<&PropertyModel> {
        match &self.resolution {
            Resolution::Property { model, index } => Some(&model.properties()[*index]),
            _ => None,
        }
    }

    fn passthrough(raw: &str, resolution: Resolution) -> Self {
        Self {
            raw: raw.to_owned(),
            translated: raw.to_owned(),
            resolution,
        }
    }
}

/// A resolved path.
#[derive(Clone, Debug)]
pub struct PathTarget {
    root: Arc<EntityModel>,
    path: String,
    segments: Vec<Segment>,
}

impl PathTarget {
    /// The model the path was resolved from.
    pub fn root(&self) -> &Arc<EntityModel> {
        &self.root
    }

    /// The path as given.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The storage path.
    pub fn translated(&self) -> String {
        self.segments
            .iter()
            .map(Segment::translated)
            .collect::<Vec<_>>()
            .join(".")
    }

    /// The property the path ends at, if its last segment names one.
    pub fn target(&self) -> Option<&PropertyModel> {
        self.segments.last().and_then(Segment::property)
    }

    /// Every property the path passes through, in order.
    pub fn properties(&self) -> impl Iterator<Item = (&EntityModel, &PropertyModel)> {
        self.segments
            .iter()
            .filter_map(|segment| match &segment.resolution {
                Resolution::Property { model, index } => {
                    Some((model.as_ref(), &model.properties()[*index]))
                }
                _ => None,
            })
    }

    /// Whether every segment was resolved against a model or is an
    /// operator, index or map key.
    pub fn is_resolved(&self) -> bool {
        !self
            .segments
            .iter()
            .any(|segment| matches!(segment.resolution, Resolution::Verbatim))
    }
}

impl Display for PathTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.translated())
    }
}

enum Context {
    Model(Arc<EntityModel>),
    /// Inside a map: the next segment is a key, then `Context` applies.
    MapKey(Box<Context>),
    /// Inside a list: the next segment is a position, or already addresses
    /// the elements.
    Elements(Box<Context>),
    /// Past a reference to `class`.
    Reference(String),
    Verbatim,
}

impl Mapper {
    /// Resolves a path against the model of `class`, validating it unless
    /// the session disables validation.
    pub fn path(&self, class: &str, path: &str) -> Result<PathTarget> {
        let model = self.model(class)?;
        self.resolve_path(&model, path, true)
    }

    /// Resolves a path against `root`. Validation applies only when
    /// `validate` is set and neither the session nor the root model
    /// disables it.
    pub fn resolve_path(
        &self,
        root: &Arc<EntityModel>,
        path: &str,
        validate: bool,
    ) -> Result<PathTarget> {
        let validate = validate && self.options.validate_paths && root.validates_paths();

        let mut segments = vec![];
        let mut context = Context::Model(Arc::clone(root));

        for raw in path.split('.') {
            let positional = if raw.starts_with('$') {
                Some(Resolution::Operator)
            } else if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
                Some(Resolution::Index)
            } else {
                None
            };

            // A named segment addresses the elements of a list directly.
            if positional.is_none() {
                while let Context::Elements(element) = context {
                    context = *element;
                }
            }

            context = match (context, positional) {
                (Context::Elements(element), Some(resolution)) => {
                    segments.push(Segment::passthrough(raw, resolution));
                    *element
                }
                // Map keys may look like indices or operators.
                (Context::MapKey(next), _) => {
                    segments.push(Segment::passthrough(raw, Resolution::Key));
                    *next
                }
                (context, Some(resolution)) => {
                    segments.push(Segment::passthrough(raw, resolution));
                    context
                }
                (Context::Verbatim | Context::Elements(_), None) => {
                    segments.push(Segment::passthrough(raw, Resolution::Verbatim));
                    Context::Verbatim
                }
                (Context::Reference(class), None) => {
                    if validate {
                        return Err(invalid(path, raw, &class));
                    }
                    segments.push(Segment::passthrough(raw, Resolution::Verbatim));
                    Context::Verbatim
                }
                (Context::Model(model), None) => match self.find_property(&model, raw)? {
                    Some((owner, index)) => {
                        let property = &owner.properties()[index];
                        let next = match property.reference() {
                            Some(_) => Context::Reference(
                                property.ty().element_class().unwrap_or_default().to_owned(),
                            ),
                            None => self.context_of(property.ty())?,
                        };

                        segments.push(Segment {
                            raw: raw.to_owned(),
                            translated: property.mapped_name().to_owned(),
                            resolution: Resolution::Property {
                                model: Arc::clone(&owner),
                                index,
                            },
                        });

                        next
                    }
                    None if validate => return Err(invalid(path, raw, model.class())),
                    None => {
                        segments.push(Segment::passthrough(raw, Resolution::Verbatim));
                        Context::Verbatim
                    }
                },
            };
        }

        Ok(PathTarget {
            root: Arc::clone(root),
            path: path.to_owned(),
            segments,
        })
    }

    /// Looks a segment up in `model`, then in its subtypes.
    fn find_property(
        &self,
        model: &Arc<EntityModel>,
        name: &str,
    ) -> Result<Option<(Arc<EntityModel>, usize)>> {
        if let Some(index) = model.position(name) {
            return Ok(Some((Arc::clone(model), index)));
        }

        for subtype in self.subtype_models(model)? {
            if let Some(index) = subtype.position(name) {
                return Ok(Some((subtype, index)));
            }
        }

        Ok(None)
    }

    fn context_of(&self, ty: &TypeRef) -> Result<Context> {
        let context = match ty {
            TypeRef::Class { name, .. } => Context::Model(self.model(name)?),
            TypeRef::List(element) => Context::Elements(Box::new(self.context_of(element)?)),
            TypeRef::Map(value) => Context::MapKey(Box::new(self.context_of(value)?)),
            _ => Context::Verbatim,
        };

        Ok(context)
    }
}

fn invalid(path: &str, segment: &str, class: &str) -> Error {
    Error::InvalidPath {
        path: path.to_owned(),
        segment: segment.to_owned(),
        class: class.to_owned(),
    }
}
