//! Error types for the policy engine.

/// Errors raised while constructing policy documents.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// A policy was constructed with an empty actions list.
    #[error("policy actions cannot be empty")]
    ActionsCannotBeEmpty,

    /// A policy was constructed with a version this engine does not know.
    /// Carries the offending version number.
    #[error("unknown policy version {0}")]
    UnknownVersion(i64),
}

/// A glob that does not translate to a valid pattern.
///
/// The glob language admits inputs (an unbalanced `{`, a lone `[`) whose
/// translation is rejected by the regex engine. Compilation is lazy, so the
/// error surfaces on first match rather than at construction.
#[derive(Debug, thiserror::Error)]
#[error("glob '{glob}' does not translate to a valid pattern: {source}")]
pub struct CompileError {
    /// The offending glob, verbatim.
    pub glob: String,
    #[source]
    pub source: regex::Error,
}
