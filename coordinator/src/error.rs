use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use aggregator::{AggregationErr, StoreErr};
use comms::ChannelErr;
use model::ModelErr;

/// A simulation configuration that can't be run, caught before anything starts.
#[derive(Debug)]
pub enum ConfigErr {
    Invalid(String),
    Json(serde_json::Error),
}

impl Display for ConfigErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
            Self::Json(e) => write!(f, "malformed config: {e}"),
        }
    }
}

impl Error for ConfigErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(e) => Some(e),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// The failure of a single interaction with one client.
#[derive(Debug)]
pub enum LinkErr {
    /// The connection to the client is unusable.
    Channel(ChannelErr),
    /// The client's model failed to train on the snapshot.
    Model(ModelErr),
    /// The client was asked to commit without having retrieved a snapshot first.
    NothingToCommit,
    /// The client didn't introduce itself properly.
    Handshake(String),
}

impl LinkErr {
    /// Whether the client must be dropped for the rest of the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Channel(_) | Self::Handshake(_))
    }
}

impl Display for LinkErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(e) => write!(f, "channel error: {e}"),
            Self::Model(e) => write!(f, "training failed: {e}"),
            Self::NothingToCommit => f.write_str("nothing to commit, no snapshot was retrieved"),
            Self::Handshake(msg) => write!(f, "handshake failed: {msg}"),
        }
    }
}

impl Error for LinkErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Channel(e) => Some(e),
            Self::Model(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ChannelErr> for LinkErr {
    fn from(value: ChannelErr) -> Self {
        Self::Channel(value)
    }
}

impl From<ModelErr> for LinkErr {
    fn from(value: ModelErr) -> Self {
        Self::Model(value)
    }
}

/// All the reasons a whole run can end early.
#[derive(Debug)]
pub enum SchedulerErr {
    Config(ConfigErr),
    Store(StoreErr),
    /// Every client was dropped before reaching the last round.
    NoLiveClients { tick: u64, round: usize },
    /// Too many aggregation attempts in a row failed.
    AggregationFailed { attempts: usize, last: AggregationErr },
    /// Accepting the client connections failed.
    Link(LinkErr),
    Io(io::Error),
}

impl Display for SchedulerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "{e}"),
            Self::Store(e) => write!(f, "{e}"),
            Self::NoLiveClients { tick, round } => {
                write!(f, "no clients left at tick {tick} (round {round})")
            }
            Self::AggregationFailed { attempts, last } => {
                write!(f, "aggregation failed {attempts} times in a row, last: {last}")
            }
            Self::Link(e) => write!(f, "could not set up clients: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for SchedulerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Store(e) => Some(e),
            Self::AggregationFailed { last, .. } => Some(last),
            Self::Link(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::NoLiveClients { .. } => None,
        }
    }
}

impl From<ConfigErr> for SchedulerErr {
    fn from(value: ConfigErr) -> Self {
        Self::Config(value)
    }
}

impl From<StoreErr> for SchedulerErr {
    fn from(value: StoreErr) -> Self {
        Self::Store(value)
    }
}

impl From<LinkErr> for SchedulerErr {
    fn from(value: LinkErr) -> Self {
        Self::Link(value)
    }
}

impl From<io::Error> for SchedulerErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
