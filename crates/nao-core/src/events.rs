use bytes::Bytes;

/// Severity of a log line mirrored to the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Level name as clients expect it on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

/// Data produced outside the request/response path (sensor callbacks, the
/// joint poller, the log layer) and handed to the event forwarder.
///
/// Producers only send these over a channel; they never touch client state.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    Touch {
        part: String,
        touched: bool,
    },
    Joints {
        names: Vec<String>,
        angles: Vec<f32>,
    },
    Audio {
        rate: u32,
        channels: u32,
        samples_per_channel: u32,
        data: Bytes,
    },
    Log {
        message: String,
        level: LogLevel,
    },
}

impl SessionEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Touch { .. } => "touch",
            Self::Joints { .. } => "joints",
            Self::Audio { .. } => "audio",
            Self::Log { .. } => "log",
        }
    }
}
