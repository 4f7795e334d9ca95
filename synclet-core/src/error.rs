//! Error types for storage engines, the durable store, broadcast channels,
//! and synced signal construction.

/// Failure reported by a [`StorageEngine`](crate::storage::StorageEngine) or
/// one of its connections.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The open request was refused, e.g. because another connection holds
    /// an incompatible version of the database.
    #[error("open blocked: {0}")]
    Blocked(String),

    /// The upgrade hook failed while the database was being created or
    /// migrated to a new version.
    #[error("upgrade failed: {0}")]
    UpgradeFailed(String),

    /// A transaction referenced a store that does not exist.
    #[error("object store `{0}` does not exist")]
    MissingStore(String),

    /// The connection was closed before the operation ran.
    #[error("connection is closed")]
    Closed,

    /// Underlying filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted bytes could not be encoded or decoded.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Error returned by the [`DurableStore`](crate::storage::DurableStore)
/// adapter.
///
/// Each variant names the operation that failed and carries the engine
/// error that caused it.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database could not be opened or its store could not be created.
    #[error("failed to open database `{db_name}`: {source}")]
    Connection {
        db_name: String,
        #[source]
        source: EngineError,
    },

    /// Reading an entry failed.
    #[error("failed to read `{key}`: {source}")]
    Read {
        key: String,
        #[source]
        source: EngineError,
    },

    /// Writing an entry failed.
    #[error("failed to write `{key}`: {source}")]
    Write {
        key: String,
        #[source]
        source: EngineError,
    },
}

/// Error returned by a [`BroadcastEndpoint`](crate::channel::BroadcastEndpoint)
/// or [`Broadcaster`](crate::channel::Broadcaster).
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The endpoint was closed; nothing more can be published on it.
    #[error("channel `{scope}` is closed")]
    Closed { scope: String },

    /// The endpoint's message stream was already handed out. Reception is a
    /// single, non-restartable stream per endpoint.
    #[error("message stream for `{scope}` was already taken")]
    StreamTaken { scope: String },

    /// The broadcast primitive could not create an endpoint.
    #[error("broadcast channel unavailable: {0}")]
    Unavailable(String),
}

/// Error returned when constructing or explicitly writing a
/// [`SyncedSignal`](crate::synced::SyncedSignal).
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The cross-context channel could not be established.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Background tasks need a tokio runtime and none is running on this
    /// thread.
    #[error("synced signals must be created inside a tokio runtime")]
    NoRuntime,

    /// The value could not be serialized for persistence or broadcast.
    #[error("failed to encode value: {0}")]
    Encode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_names_the_key() {
        let err = StoreError::Write {
            key: "theme".into(),
            source: EngineError::Closed,
        };
        assert_eq!(err.to_string(), "failed to write `theme`: connection is closed");
    }

    #[test]
    fn channel_error_converts_into_sync_error() {
        let err: SyncError = ChannelError::Closed {
            scope: "synclet:theme".into(),
        }
        .into();
        assert!(matches!(err, SyncError::Channel(ChannelError::Closed { .. })));
        assert_eq!(err.to_string(), "channel `synclet:theme` is closed");
    }

    #[test]
    fn io_error_converts_into_engine_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: EngineError = io.into();
        assert!(matches!(err, EngineError::Io(_)));
    }
}
