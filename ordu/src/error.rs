use mongodb::bson::Bson;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error("discriminator `{value}` does not match `{class}` or any of its subtypes")]
    UnknownDiscriminator { class: String, value: String },

    #[error("`{class}` is abstract and the document carries no discriminator")]
    Abstract { class: String },

    #[error("invalid path `{path}`: `{segment}` is not a property of `{class}`")]
    InvalidPath {
        path: String,
        segment: String,
        class: String,
    },

    #[error("`{path}` is load-only on `{class}` and cannot be written")]
    LoadOnlyWrite { class: String, path: String },

    #[error("`{path}` is the version property of `{class}` and is managed by ordu")]
    VersionWrite { class: String, path: String },

    #[error("version mismatch on `{class}` {id}: expected stored version {expected}")]
    VersionMismatch {
        class: String,
        id: Bson,
        expected: i64,
    },

    #[error("`{class}` {id} was created concurrently")]
    ConcurrentCreation { class: String, id: Bson },

    #[error("cannot map `{path}`: expected {expected}, found {found}")]
    Codec {
        path: String,
        expected: String,
        found: String,
    },

    #[error(
        "expected one matched and modified document, got {matched} matched, {modified} modified"
    )]
    UnexpectedOutcome { matched: u64, modified: u64 },

    #[error(transparent)]
    Store(#[from] mongodb::error::Error),
}

impl Error {
    /// Whether the error is an optimistic-concurrency conflict. Callers may
    /// re-read the entity and retry such writes.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::VersionMismatch { .. } | Self::ConcurrentCreation { .. }
        )
    }

    pub(crate) fn codec(
        path: impl Into<String>,
        expected: impl ToString,
        found: impl ToString,
    ) -> Self {
        Self::Codec {
            path: path.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

/// A malformed class definition. Raised while building a model, before any
/// instance of the class is encoded or decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    #[error("`{class}` is not registered with this mapper")]
    UnknownClass { class: String },

    #[error("`{class}` is neither an entity nor an embedded type")]
    NotMappable { class: String },

    #[error("`{class}` is a non-static inner class and cannot be embedded")]
    NonStaticInner { class: String },

    #[error("`{class}` inherits from itself")]
    InheritanceCycle { class: String },

    #[error("entity `{class}` has no identifier property")]
    MissingId { class: String },

    #[error("`{class}` declares more than one identifier: {properties:?}")]
    MultipleIds {
        class: String,
        properties: Vec<String>,
    },

    #[error("`{class}` declares more than one version property: {properties:?}")]
    MultipleVersions {
        class: String,
        properties: Vec<String>,
    },

    #[error("`{class}.{property}` cannot be both identifier and version")]
    IdIsVersion { class: String, property: String },

    #[error("`{class}.{property}` is a version property but is not an integer")]
    InvalidVersionType { class: String, property: String },

    #[error("`{class}.{property}` cannot be mapped: {reason}")]
    UnmappableMember {
        class: String,
        property: String,
        reason: String,
    },

    #[error("`{class}` maps both `{first}` and `{second}` to `{mapped_name}`")]
    DuplicateMappedName {
        class: String,
        mapped_name: String,
        first: String,
        second: String,
    },

    #[error("`{first}` and `{second}` under `{class}` share the discriminator `{value}`")]
    DuplicateDiscriminator {
        class: String,
        value: String,
        first: String,
        second: String,
    },

    #[error("constructor of `{class}` takes `{parameter}`, which is not a persistent property")]
    InvalidConstructor { class: String, parameter: String },

    #[error("hook `{hook}` on `{class}` has a shape not accepted for {kind}")]
    InvalidHook {
        class: String,
        hook: String,
        kind: String,
    },
}
