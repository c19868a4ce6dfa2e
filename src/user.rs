//! API user registration records.

use serde::{Deserialize, Serialize};

use crate::errors::Error;

type Result<T> = std::result::Result<T, Error>;

/// A user registration submitted to the bridge until the link button is pressed.
///
/// The bridge stores it as a single `devicetype` string of the form
/// `<name>#<device_type>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRegistration {
    name: String,
    device_type: String,
}

impl UserRegistration {
    pub const MAX_NAME_LEN: usize = 20;
    pub const MAX_DEVICE_TYPE_LEN: usize = 19;

    pub fn new(name: &str, device_type: &str) -> Result<Self> {
        if name.is_empty() || name.len() > Self::MAX_NAME_LEN {
            return Err(Error::InvalidRegistration(format!(
                "name must be 1-{} characters, got {:?}",
                Self::MAX_NAME_LEN,
                name
            )));
        }
        if device_type.len() > Self::MAX_DEVICE_TYPE_LEN {
            return Err(Error::InvalidRegistration(format!(
                "device type must be at most {} characters, got {:?}",
                Self::MAX_DEVICE_TYPE_LEN,
                device_type
            )));
        }
        if name.contains('#') || device_type.contains('#') {
            return Err(Error::InvalidRegistration("'#' is reserved".into()));
        }
        Ok(UserRegistration {
            name: name.to_string(),
            device_type: device_type.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    pub fn devicetype(&self) -> String {
        if self.device_type.is_empty() {
            self.name.clone()
        } else {
            format!("{}#{}", self.name, self.device_type)
        }
    }

    pub(crate) fn request(&self) -> CreateUserRequest {
        CreateUserRequest {
            devicetype: self.devicetype(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateUserRequest {
    pub devicetype: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedUser {
    pub username: String,
}
