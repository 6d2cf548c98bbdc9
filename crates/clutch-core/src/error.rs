use thiserror::Error;

/// Errors surfaced while reading a demo. Each variant's [`Severity`] says
/// whether the caller should drop the current packet and keep going, or
/// treat the whole recording as untrustworthy from this point on.
#[derive(Debug, Error)]
pub enum DemoError {
    #[error("bit reader ran past end of buffer")]
    Truncated,

    #[error("string table uses dictionary encoding, which this parser does not support")]
    UnsupportedEncoding,

    #[error("message framer corrupt: {bytes_read} + {size} > {length}")]
    CorruptFraming {
        bytes_read: u32,
        size: u32,
        length: u32,
    },

    #[error("field-index loop exceeded {0} steps, stream is malformed")]
    RunawayFieldIndex(u32),

    #[error("no property descriptor for class {class_id} index {field_index}")]
    PropertyDecodeError { class_id: u16, field_index: i32 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Step cap for [`DemoError::RunawayFieldIndex`].
pub const MAX_FIELD_INDEX_STEPS: u32 = 20_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Drop the current packet/update and continue with the next command.
    PacketScoped,
    /// The recording can no longer be trusted; abort.
    Fatal,
}

impl DemoError {
    pub fn severity(&self) -> Severity {
        match self {
            DemoError::Truncated => Severity::PacketScoped,
            DemoError::UnsupportedEncoding => Severity::PacketScoped,
            DemoError::PropertyDecodeError { .. } => Severity::PacketScoped,
            DemoError::CorruptFraming { .. } => Severity::Fatal,
            DemoError::RunawayFieldIndex(_) => Severity::Fatal,
            DemoError::Io(_) => Severity::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

pub type DemoResult<T> = Result<T, DemoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_scoped_errors_do_not_abort_recording() {
        assert_eq!(DemoError::Truncated.severity(), Severity::PacketScoped);
        assert_eq!(
            DemoError::UnsupportedEncoding.severity(),
            Severity::PacketScoped
        );
        assert_eq!(
            DemoError::PropertyDecodeError {
                class_id: 1,
                field_index: 2
            }
            .severity(),
            Severity::PacketScoped
        );
    }

    #[test]
    fn structural_errors_are_fatal() {
        assert!(DemoError::CorruptFraming {
            bytes_read: 10,
            size: 10,
            length: 5
        }
        .is_fatal());
        assert!(DemoError::RunawayFieldIndex(MAX_FIELD_INDEX_STEPS).is_fatal());
    }
}
