//! Aggregate contract for the event-sourced atelier models.

use core::fmt;

/// Identity and stream revision of an aggregate instance.
pub trait AggregateRoot {
    type Id: Clone + Eq + core::hash::Hash + fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Number of events applied so far; equals the stream version it was rebuilt from.
    fn version(&self) -> u64;
}

/// What the writer believes the stream version to be when appending.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Append unconditionally.
    Any,
    /// The stream must not exist yet.
    NoStream,
    Exact(u64),
}

impl ExpectedVersion {
    /// Expectation for a stream that was read at `version` (0 = never written).
    pub fn for_stream(version: u64) -> Self {
        if version == 0 {
            ExpectedVersion::NoStream
        } else {
            ExpectedVersion::Exact(version)
        }
    }

    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::NoStream => actual == 0,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }
}

impl fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedVersion::Any => f.write_str("any version"),
            ExpectedVersion::NoStream => f.write_str("no stream"),
            ExpectedVersion::Exact(v) => write!(f, "version {v}"),
        }
    }
}

/// Decide/evolve pair.
///
/// `handle` looks at current state and returns the events a command produces
/// without touching `self`; `apply` folds one event in and bumps the version.
/// Neither performs IO.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + fmt::Debug;
    type Event: Clone + fmt::Debug;
    type Error: fmt::Debug;

    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Fold a sequence of events in order.
    fn replay<'a, I>(&mut self, events: I)
    where
        I: IntoIterator<Item = &'a Self::Event>,
        Self::Event: 'a,
    {
        for event in events {
            self.apply(event);
        }
    }
}
