use std::time::Duration;

/// All error types that can occur while provisioning a bridge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Discovery finished without finding any bridge.
    #[error("no bridges discovered")]
    NoBridges,

    /// Discovery found more than one bridge and there is no way to pick one.
    #[error("multiple bridges discovered ({0})")]
    MultipleBridges(usize),

    /// Discovery itself failed (socket or portal error).
    #[error("failed to discover a bridge: {0}")]
    Discovery(String),

    /// The HTTP request could not be completed.
    #[error("http {action} error: {err}")]
    Http { action: String, err: reqwest::Error },

    /// The bridge answered with a non-success HTTP status.
    #[error("bridge returned HTTP {status} for {path}")]
    Status { path: String, status: u16 },

    /// The bridge answered with a Hue API error entry.
    #[error("bridge error {kind} at {address:?}: {description}")]
    Bridge {
        kind: u16,
        address: String,
        description: String,
    },

    /// Failed to serialize data to JSON.
    #[error("failed to dump json: {0:?}")]
    JsonDump(serde_json::Error),

    /// Failed to deserialize JSON data.
    #[error("failed to load json: {0:?}")]
    JsonLoad(serde_json::Error),

    /// A network socket operation failed during SSDP discovery.
    #[error("socket {action} error: {err:?}")]
    Socket { action: String, err: std::io::Error },

    /// The link button was not pressed within the authentication window.
    #[error("link button hasn't been pressed within {0:?}")]
    LinkButtonNotPressed(Duration),

    /// The scan finished without any new light.
    #[error("no new light detected")]
    NoNewLight,

    /// The scan reported more than one new light.
    #[error("found {0} new lights")]
    MultipleNewLights(usize),

    /// The bridge has no lights at all.
    #[error("bridge has no lights")]
    NoLights,

    /// The user registration record is not acceptable to the bridge.
    #[error("invalid user registration: {0}")]
    InvalidRegistration(String),

    /// The operator answered a confirmation prompt negatively.
    #[error("operator declined: {0}")]
    Declined(String),

    /// An authenticated call was attempted without a username.
    #[error("client has no username")]
    NotAuthenticated,

    /// The configuration is invalid or could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Terminal I/O failed.
    #[error("terminal error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Hue API error type for "link button not pressed".
    pub const LINK_BUTTON_NOT_PRESSED: u16 = 101;
    /// Hue API error type for "unauthorized user".
    pub const UNAUTHORIZED_USER: u16 = 1;

    /// Create a new socket error
    pub fn socket(action: &str, err: std::io::Error) -> Self {
        Error::Socket {
            action: action.to_string(),
            err,
        }
    }

    /// Create a new HTTP transport error
    pub fn http(action: &str, err: reqwest::Error) -> Self {
        Error::Http {
            action: action.to_string(),
            err,
        }
    }

    /// Whether this is the bridge telling us the link button is still unpressed.
    pub fn is_link_button_not_pressed(&self) -> bool {
        matches!(self, Error::Bridge { kind, .. } if *kind == Self::LINK_BUTTON_NOT_PRESSED)
    }

    /// Text shown to the operator before aborting.
    pub fn operator_message(&self) -> Vec<String> {
        match self {
            Error::NoBridges => vec!["No bridges discovered, try again.".into()],
            Error::MultipleBridges(_) => vec!["Multiple bridges discovered.".into()],
            Error::LinkButtonNotPressed(_) => vec!["Link button hasn't been pressed.".into()],
            Error::NoNewLight => vec![
                "Couldn't detect your light, please try again.".into(),
                "Maybe your light has already been registered in your bridge?".into(),
            ],
            Error::MultipleNewLights(_) => {
                vec!["Found multiple new lights; this is weird...".into()]
            }
            Error::Declined(_) => vec![
                "Please restart this wizard and follow *all* the steps to be safe.".into(),
            ],
            other => vec![other.to_string()],
        }
    }
}

/// Hacky implementation of PartialEq for testing
#[cfg(test)]
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}
