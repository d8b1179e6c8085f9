use thiserror::Error;

use crate::token::TypeToken;

// -----------------------------------------------------------------------------
// Error

/// All error outcomes of the conversion engine.
///
/// The variants follow the engine's failure taxonomy:
///
/// - [`Binding`](Error::Binding): no explicit registration, factory or
///   structural fallback could produce a converter for a type. Surfaced
///   immediately, never retried internally.
/// - [`Value`](Error::Value): malformed input during deserialization
///   (unparseable number/date/UUID, unknown enum name, unresolvable class
///   metadata). Always hard failures — defaulting silently would corrupt
///   data.
/// - [`Policy`](Error::Policy): a violated conversion policy, e.g. null where
///   forbidden or a reference cycle detected during polymorphic
///   serialization.
/// - [`Stream`](Error::Stream): a token-level protocol violation between a
///   converter and the reader/writer.
///
/// There is no partial-result or degraded mode: every operation is
/// all-or-nothing.
#[derive(Debug, Error)]
pub enum Error {
    /// No converter could be resolved for a type.
    #[error("no converter available for type `{token}`: {reason}")]
    Binding { token: TypeToken, reason: String },

    /// Malformed input encountered during deserialization.
    #[error("could not bind JSON value: {0}")]
    Value(String),

    /// A conversion policy was violated.
    #[error("conversion policy violated: {0}")]
    Policy(String),

    /// A reference cycle was detected while serializing an object graph.
    #[error("cyclic object graph detected while serializing a value of type `{0}`")]
    CyclicGraph(TypeToken),

    /// The token stream was driven out of protocol.
    #[error("json stream error: {0}")]
    Stream(String),

    /// An attempt was made to overwrite an existing forward link of a
    /// chained factory.
    #[error("chained factory is already linked to a next factory")]
    ChainAlreadyLinked,
}

impl Error {
    pub(crate) fn binding(token: &TypeToken, reason: impl Into<String>) -> Self {
        Self::Binding {
            token: token.clone(),
            reason: reason.into(),
        }
    }

    pub(crate) fn value(message: impl Into<String>) -> Self {
        Self::Value(message.into())
    }

    pub(crate) fn policy(message: impl Into<String>) -> Self {
        Self::Policy(message.into())
    }

    pub(crate) fn stream(message: impl Into<String>) -> Self {
        Self::Stream(message.into())
    }
}

/// Convenience alias used across the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;
