use core::time::Duration;

/// Base of the numeric codes reported for init failures.
const CODE_BASE: i32 = 28110;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    NoChannels,
    TooManyChannels,
    ZeroPixels { channel: usize },
    UnsupportedPin { channel: usize, pin: u8 },
    DuplicatePin { pin: u8 },
    SharedPwmChannel { pin: u8, pwm: usize },
    MixedFrequencies,
    UnsupportedFrequency { hz: u32 },
    InvalidDmaChannel { dma: u8 },
    NoSuchChannel { channel: usize },
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::NoChannels => write!(f, "No channels configured"),
            ConfigError::TooManyChannels => write!(f, "At most two channels are supported"),
            ConfigError::ZeroPixels { channel } => {
                write!(f, "Channel {channel} has a pixel count of zero")
            }
            ConfigError::UnsupportedPin { channel, pin } => {
                write!(f, "Channel {channel}: GPIO {pin} has no PWM function")
            }
            ConfigError::DuplicatePin { pin } => write!(f, "GPIO {pin} used by two channels"),
            ConfigError::SharedPwmChannel { pin, pwm } => {
                write!(f, "GPIO {pin} is on PWM{pwm}, which another channel already drives")
            }
            ConfigError::MixedFrequencies => write!(f, "Channels must share one frequency"),
            ConfigError::UnsupportedFrequency { hz } => write!(f, "Unsupported frequency {hz} Hz"),
            ConfigError::InvalidDmaChannel { dma } => write!(f, "Invalid DMA channel {dma}"),
            ConfigError::NoSuchChannel { channel } => write!(f, "No channel {channel}"),
        }
    }
}

/// Which step of claiming the hardware failed. `DeviceAlloc` and `LedsAlloc`
/// are never returned and only hold their place in the code numbering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum ResourceKind {
    HwDetect = 0,
    DeviceAlloc = 1,
    MailboxOpen = 2,
    MailboxAlloc = 3,
    MailboxLock = 4,
    MapMem = 5,
    LedsAlloc = 6,
    MapRegisters = 7,
    GpioInit = 8,
    SetupPwm = 9,
}

impl ResourceKind {
    /// Wraps an OS error with this step as context.
    pub fn with_io(self, e: std::io::Error) -> Error {
        Error::Resource {
            kind: self,
            os_error: e.raw_os_error(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransmissionFault {
    FrameInFlight,
    Dma { debug: u32 },
}

#[derive(Debug)]
pub enum Error {
    Config(ConfigError),
    Resource {
        kind: ResourceKind,
        os_error: Option<i32>,
    },
    HardwareBusy,
    Index {
        index: usize,
        len: usize,
    },
    LengthMismatch {
        expected: usize,
        actual: usize,
    },
    Transmission(TransmissionFault),
    Timeout {
        waited: Duration,
    },
    NotInitialized,
}

impl Error {
    pub const fn resource(kind: ResourceKind) -> Self {
        Self::Resource {
            kind,
            os_error: None,
        }
    }

    /// Stable numeric code, negative like the native library's return values.
    pub fn code(&self) -> i32 {
        match self {
            Self::Resource { kind, .. } => -(CODE_BASE + *kind as i32),
            Self::Config(_) => -(CODE_BASE + 10),
            Self::HardwareBusy => -(CODE_BASE + 11),
            Self::Index { .. } => -(CODE_BASE + 12),
            Self::LengthMismatch { .. } => -(CODE_BASE + 13),
            Self::Transmission(TransmissionFault::FrameInFlight) => -(CODE_BASE + 14),
            Self::Transmission(TransmissionFault::Dma { .. }) => -(CODE_BASE + 15),
            Self::Timeout { .. } => -(CODE_BASE + 16),
            Self::NotInitialized => -(CODE_BASE + 17),
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Config error: {e}"),
            Error::Resource {
                kind,
                os_error: Some(errno),
            } => write!(f, "Resource error during {kind:?} (os error {errno})"),
            Error::Resource { kind, .. } => write!(f, "Resource error during {kind:?}"),
            Error::HardwareBusy => write!(f, "PWM/DMA hardware already claimed"),
            Error::Index { index, len } => write!(f, "Index {index} out of range for {len} LEDs"),
            Error::LengthMismatch { expected, actual } => {
                write!(f, "Expected {expected} colors, got {actual}")
            }
            Error::Transmission(TransmissionFault::FrameInFlight) => {
                write!(f, "Previous frame still in flight")
            }
            Error::Transmission(TransmissionFault::Dma { debug }) => {
                write!(f, "DMA error, debug register {debug:08x}")
            }
            Error::Timeout { waited } => write!(f, "DMA did not complete within {waited:?}"),
            Error::NotInitialized => write!(f, "Strip not initialized"),
        }
    }
}

impl core::error::Error for Error {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// The DMA arena is sized up front; running off its end means the mapping
/// is smaller than requested.
impl From<crate::buffer::Error> for Error {
    fn from(_: crate::buffer::Error) -> Self {
        Error::resource(ResourceKind::MapMem)
    }
}

impl From<TransmissionFault> for Error {
    fn from(e: TransmissionFault) -> Self {
        Self::Transmission(e)
    }
}

pub type Result<T> = core::result::Result<T, Error>;
